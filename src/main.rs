//! companion-daemon: Background daemon for a voice-first chat companion
//!
//! This daemon provides:
//! - A conversational engine with cloud, local and contextual strategies
//! - A speech session state machine driven by an attached recognizer client
//! - IPC server for chat and recognizer clients

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use companion::capability::ModelDirLoader;
use companion::config::Config;
use companion::engine::{CloudChat, Engine, HttpCloudClient};
use companion::events::SessionEvent;
use companion::ipc::{BroadcastRecognizer, Server, Services};
use companion::lifecycle::ShutdownSignal;
use companion::state::{SessionHandle, SpeechSession};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "companion-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, persona = %config.persona, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    let cloud = Arc::new(HttpCloudClient::new(&config.cloud_provider));
    if let Some(key) = &config.api_key {
        cloud.set_api_key(&config.cloud_provider, key).await;
    }
    let engine = Arc::new(Engine::new(config.engine_settings(), cloud));

    // Speech session -> IPC server (for broadcasting session events)
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    // IPC server -> speech session
    let (session_handle, session_rx) = SessionHandle::channel(32);

    let recognizer = BroadcastRecognizer::new(event_tx.clone());
    let mut session = SpeechSession::new(
        Arc::new(recognizer.clone()),
        engine.clone(),
        config.session,
        event_tx.clone(),
    );

    let server = Server::new(
        &config.socket_path,
        Services {
            engine: engine.clone(),
            session: session_handle,
            recognizer,
            event_tx: event_tx.clone(),
        },
    )?;

    // Load model capabilities in the background; until then they report Loading
    let loader = ModelDirLoader::new(&config.model_dir, &config.local_model);
    let loading_engine = engine.clone();
    tokio::spawn(async move {
        let warnings = loading_engine.initialize(&loader).await;
        info!(degraded = warnings.len(), "capability initialization finished");
    });

    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the speech session (processes recognizer inputs)
        _ = session.run(session_rx) => {
            info!("speech session exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC server's view of the session state current
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(SessionEvent::StateChanged { to, .. }) => {
                        server_for_events.set_listening(to).await;
                    }
                    Ok(event) => {
                        info!(%event, "session event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("session event handler exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "signal handling failed"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("companion-daemon stopped");

    Ok(())
}
