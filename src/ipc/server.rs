//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! speech session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::events::SessionEvent;
use crate::state::{ListeningState, SessionHandle, SessionInput};

use super::protocol::{DaemonStatus, Notification, Request, Response};
use super::recognizer::BroadcastRecognizer;

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Everything request handlers act on
#[derive(Clone)]
pub struct Services {
    pub engine: Arc<Engine>,
    pub session: SessionHandle,
    pub recognizer: BroadcastRecognizer,
    pub event_tx: broadcast::Sender<SessionEvent>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    services: Services,
    shutdown_tx: broadcast::Sender<()>,
}

/// Per-connection state
#[derive(Debug, Default)]
struct ClientContext {
    /// Set while this connection is the attached recognizer
    recognizer_token: Option<u64>,
}

/// Shared server state
struct ServerState {
    start_time: std::time::Instant,
    /// Last state reported by the speech session
    listening: ListeningState,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, services: Services) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            start_time: std::time::Instant::now(),
            listening: ListeningState::Idle,
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            services,
            shutdown_tx,
        })
    }

    /// Update the listening state reported in status responses
    pub async fn set_listening(&self, listening: ListeningState) {
        let mut state = self.state.write().await;
        let old = state.listening;
        state.listening = listening;

        if old != listening {
            debug!(from = %old, to = %listening, "IPC server: listening state updated");
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let services = self.services.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, services) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        services: Services,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;
        let mut context = ClientContext::default();

        let result = async {
            while let Some(body) = Self::read_message(&mut reader).await? {
                let response = match serde_json::from_slice::<Request>(&body) {
                    Ok(request) => {
                        debug!(?request, "received request");
                        let (response, subscribe) =
                            Self::process_request(request, &state, &services, &mut context)
                                .await;
                        if subscribe && forwarder.is_none() {
                            debug!("client subscribed to notifications");
                            forwarder = Some(Self::spawn_forwarder(
                                services.event_tx.subscribe(),
                                Arc::clone(&writer),
                            ));
                        }
                        response
                    }
                    Err(e) => {
                        warn!(%e, "failed to parse request");
                        Response::Error {
                            code: "bad_request".into(),
                            message: e.to_string(),
                        }
                    }
                };

                Self::send_message(&mut *writer.lock().await, &response).await?;
            }
            debug!("client disconnected");
            Ok::<(), anyhow::Error>(())
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        if let Some(token) = context.recognizer_token {
            if services.recognizer.detach_if_current(token) {
                if let Err(e) = services.session.send(SessionInput::Stop).await {
                    debug!(?e, "session gone while releasing recognizer");
                }
            }
        }
        result
    }

    /// Push session events to a subscribed client until it goes away
    fn spawn_forwarder(
        mut event_rx: broadcast::Receiver<SessionEvent>,
        writer: Arc<Mutex<OwnedWriteHalf>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        let note = Notification::SessionEvent { event };
                        if let Err(e) = Self::send_message(&mut *writer.lock().await, &note).await {
                            debug!(?e, "notification write failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Read one length-prefixed message. Returns `None` when the client is gone.
    async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];

        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;
        Ok(Some(msg_buf))
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        services: &Services,
        context: &mut ClientContext,
    ) -> (Response, bool) {
        let engine = &services.engine;

        let response = match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let (listening, uptime_secs) = {
                    let state = state.read().await;
                    (state.listening, state.start_time.elapsed().as_secs())
                };
                Response::Status(DaemonStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    listening,
                    recognizer_attached: services.recognizer.is_attached(),
                    provider: engine.provider_selection().await,
                    capabilities: engine.capability_snapshot().await,
                    uptime_secs,
                })
            }

            Request::GetConfig => Response::Config(engine.config().await),

            Request::Chat { text } => Response::Reply {
                text: engine.respond(&text).await,
            },

            Request::SetMode { mode } => match engine.set_mode(&mode).await {
                Ok(()) => Response::Ok,
                Err(e) => Response::rejected(e.code(), e),
            },

            Request::SwitchProvider { provider } => {
                match engine.switch_provider(&provider).await {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::rejected(e.code(), e),
                }
            }

            Request::SetApiKey { provider, key } => {
                if engine.set_api_key(&provider, &key).await {
                    Response::Ok
                } else {
                    Response::rejected(
                        "unknown_provider",
                        format!("unknown provider: {provider}"),
                    )
                }
            }

            Request::SetLocalGeneration { enabled } => {
                engine.set_use_local_model(enabled);
                Response::Ok
            }

            Request::ClearHistory => {
                engine.clear_history().await;
                Response::Ok
            }

            // The recognizer client needs start/stop commands, so attaching subscribes
            Request::AttachRecognizer { continuous } => {
                context.recognizer_token = Some(services.recognizer.attach(continuous));
                return (Response::Ok, true);
            }

            Request::DetachRecognizer => {
                context.recognizer_token = None;
                services.recognizer.detach();
                Self::forward(services, SessionInput::Stop).await
            }

            Request::StartListening => match services.session.request(SessionInput::Start).await {
                Ok(Ok(())) => Response::Ok,
                Ok(Err(e)) => Response::rejected(e.code(), e),
                Err(e) => Self::session_unavailable(e),
            },

            Request::StopListening => Self::forward(services, SessionInput::Stop).await,

            Request::PermissionResult { granted, error } => {
                let input = if granted {
                    SessionInput::PermissionGranted
                } else {
                    SessionInput::PermissionDenied(
                        error.unwrap_or(crate::error::PermissionErrorKind::NotAllowed),
                    )
                };
                Self::forward(services, input).await
            }

            Request::Recognition { event } => Self::forward(services, event.into()).await,

            Request::Subscribe => return (Response::Subscribed, true),
        };

        (response, false)
    }

    async fn forward(services: &Services, input: SessionInput) -> Response {
        match services.session.send(input).await {
            Ok(()) => Response::Ok,
            Err(e) => Self::session_unavailable(e),
        }
    }

    fn session_unavailable(e: anyhow::Error) -> Response {
        error!(?e, "speech session unavailable");
        Response::Error {
            code: "session_unavailable".into(),
            message: e.to_string(),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSettings, HttpCloudClient};
    use crate::prompt::ConversationMode;
    use crate::state::{SessionTimings, SpeechSession};

    struct Fixture {
        services: Services,
        state: Arc<RwLock<ServerState>>,
        events: broadcast::Receiver<SessionEvent>,
    }

    fn fixture() -> Fixture {
        let (event_tx, events) = broadcast::channel(64);
        let engine = Arc::new(Engine::new(
            EngineSettings::default(),
            Arc::new(HttpCloudClient::new("openai")),
        ));
        let recognizer = BroadcastRecognizer::new(event_tx.clone());
        let (session, commands) = SessionHandle::channel(8);
        let mut speech = SpeechSession::new(
            Arc::new(recognizer.clone()),
            engine.clone(),
            SessionTimings::default(),
            event_tx.clone(),
        );
        tokio::spawn(async move { speech.run(commands).await });

        Fixture {
            services: Services {
                engine,
                session,
                recognizer,
                event_tx,
            },
            state: Arc::new(RwLock::new(ServerState {
                start_time: std::time::Instant::now(),
                listening: ListeningState::Idle,
            })),
            events,
        }
    }

    async fn process(f: &Fixture, request: Request) -> Response {
        let mut context = ClientContext::default();
        Server::process_request(request, &f.state, &f.services, &mut context)
            .await
            .0
    }

    fn temp_socket_path() -> PathBuf {
        std::env::temp_dir().join(format!(
            "companion-test-{}-{}.sock",
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    async fn round_trip(client: &mut UnixStream, request: &Request) -> Response {
        Server::send_message(client, request).await.unwrap();
        let body = Server::read_message(client).await.unwrap().unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_configuration_requests() {
        let f = fixture();

        assert_eq!(
            process(&f, Request::SetMode { mode: "assistant".into() }).await,
            Response::Ok
        );
        assert_eq!(f.services.engine.mode().await, ConversationMode::Assistant);

        let rejected = process(&f, Request::SetMode { mode: "loud".into() }).await;
        assert!(matches!(rejected, Response::Rejected { ref code, .. } if code == "invalid_mode"));
        assert_eq!(f.services.engine.mode().await, ConversationMode::Assistant);

        let rejected = process(
            &f,
            Request::SwitchProvider {
                provider: "skynet".into(),
            },
        )
        .await;
        assert!(
            matches!(rejected, Response::Rejected { ref code, .. } if code == "provider_switch_failed")
        );

        let Response::Config(config) = process(&f, Request::GetConfig).await else {
            panic!("expected config response");
        };
        assert!(!config.using_cloud);
        assert!(config.configured);
    }

    #[tokio::test]
    async fn test_chat_uses_contextual_reply() {
        let f = fixture();
        let response = process(
            &f,
            Request::Chat {
                text: "5 plus 3".into(),
            },
        )
        .await;
        assert_eq!(
            response,
            Response::Reply {
                text: "5 plus 3 equals 8.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_start_listening_without_recognizer_is_rejected() {
        let f = fixture();
        let response = process(&f, Request::StartListening).await;
        assert!(matches!(response, Response::Rejected { ref code, .. } if code == "unsupported"));
    }

    #[tokio::test]
    async fn test_attached_recognizer_can_start_listening() {
        let mut f = fixture();
        assert_eq!(
            process(&f, Request::AttachRecognizer { continuous: false }).await,
            Response::Ok
        );
        assert_eq!(process(&f, Request::StartListening).await, Response::Ok);

        let requested = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let Ok(SessionEvent::PermissionRequested { retry: false }) =
                    f.events.recv().await
                {
                    break;
                }
            }
        })
        .await;
        assert!(requested.is_ok());

        let Response::Status(status) = process(&f, Request::GetStatus).await else {
            panic!("expected status response");
        };
        assert!(status.recognizer_attached);
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let f = fixture();
        let socket_path = temp_socket_path();
        let server = Arc::new(Server::new(&socket_path, f.services.clone()).unwrap());
        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        Server::send_message(&mut client, &Request::Ping).await.unwrap();
        let body = Server::read_message(&mut client).await.unwrap().unwrap();
        let response: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(response, Response::Pong);

        let garbage = b"{\"type\":\"fly\"}";
        client
            .write_all(&(garbage.len() as u32).to_le_bytes())
            .await
            .unwrap();
        client.write_all(garbage).await.unwrap();
        let body = Server::read_message(&mut client).await.unwrap().unwrap();
        let response: Response = serde_json::from_slice(&body).unwrap();
        assert!(matches!(response, Response::Error { ref code, .. } if code == "bad_request"));

        server.shutdown().await;
        task.abort();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_attach_subscribes_connection() {
        let f = fixture();
        let mut context = ClientContext::default();
        let (response, subscribe) = Server::process_request(
            Request::AttachRecognizer { continuous: true },
            &f.state,
            &f.services,
            &mut context,
        )
        .await;
        assert_eq!(response, Response::Ok);
        assert!(subscribe);
        assert!(context.recognizer_token.is_some());

        Server::process_request(Request::DetachRecognizer, &f.state, &f.services, &mut context)
            .await;
        assert!(context.recognizer_token.is_none());
        assert!(!f.services.recognizer.is_attached());
    }

    #[tokio::test]
    async fn test_recognizer_released_when_client_disconnects() {
        let f = fixture();
        let socket_path = temp_socket_path();
        let server = Arc::new(Server::new(&socket_path, f.services.clone()).unwrap());
        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        let response = round_trip(&mut client, &Request::AttachRecognizer { continuous: false }).await;
        assert_eq!(response, Response::Ok);
        assert!(f.services.recognizer.is_attached());

        drop(client);
        let released = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while f.services.recognizer.is_attached() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(released.is_ok());

        let response = process(&f, Request::StartListening).await;
        assert!(matches!(response, Response::Rejected { ref code, .. } if code == "unsupported"));

        server.shutdown().await;
        task.abort();
    }

    #[tokio::test]
    async fn test_other_client_disconnect_keeps_recognizer() {
        let f = fixture();
        let socket_path = temp_socket_path();
        let server = Arc::new(Server::new(&socket_path, f.services.clone()).unwrap());
        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let mut recognizer_client = UnixStream::connect(&socket_path).await.unwrap();
        let response = round_trip(
            &mut recognizer_client,
            &Request::AttachRecognizer { continuous: false },
        )
        .await;
        assert_eq!(response, Response::Ok);

        let mut chat_client = UnixStream::connect(&socket_path).await.unwrap();
        assert_eq!(round_trip(&mut chat_client, &Request::Ping).await, Response::Pong);
        drop(chat_client);

        // Still answered by the attached client's connection afterwards
        assert_eq!(
            round_trip(&mut recognizer_client, &Request::Ping).await,
            Response::Pong
        );
        assert!(f.services.recognizer.is_attached());

        server.shutdown().await;
        task.abort();
    }
}
