//! Core speech session implementation
//!
//! Handles transitions between Idle, RequestingPermission, Listening,
//! Processing and Error based on inputs translated from the host recognizer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{PermissionErrorKind, RecognitionErrorKind, SessionError};
use crate::events::SessionEvent;

use super::transcript::{RecognitionEvent, TranscriptAccumulator};

/// Shown once an error has been displayed long enough
pub const IDLE_PROMPT: &str = "Click the microphone to start speaking";

pub const PERMISSION_RECOVERED_MESSAGE: &str = "Microphone access granted. Please try again.";

pub const START_FAILED_MESSAGE: &str = "Failed to start speech recognition. Please try again.";

pub const UNSUPPORTED_MESSAGE: &str = "Speech recognition is not supported by the attached client.";

/// The five states of a speech session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningState {
    /// Not listening, waiting for a start request
    Idle,
    /// Waiting for the host to report microphone access
    RequestingPermission,
    /// Recognition is (or is about to be) running
    Listening,
    /// A final transcript is with the responder
    Processing,
    /// An error message is on display
    Error,
}

impl Default for ListeningState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for ListeningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListeningState::Idle => write!(f, "Idle"),
            ListeningState::RequestingPermission => write!(f, "RequestingPermission"),
            ListeningState::Listening => write!(f, "Listening"),
            ListeningState::Processing => write!(f, "Processing"),
            ListeningState::Error => write!(f, "Error"),
        }
    }
}

/// Display delays used by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Between permission grant and starting recognition
    pub start_delay: Duration,
    /// Between a reply and hiding the transcript
    pub hide_delay: Duration,
    /// How long an error message stays up before returning to Idle
    pub error_display: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_millis(100),
            hide_delay: Duration::from_millis(3000),
            error_display: Duration::from_millis(4000),
        }
    }
}

/// A speech recognizer the session can drive
///
/// Results and errors come back as [`SessionInput`]s; this trait only carries
/// commands towards the host.
pub trait RecognitionSource: Send + Sync {
    fn is_available(&self) -> bool;

    /// Continuous sources keep recognizing after a final result
    fn is_continuous(&self) -> bool {
        false
    }

    fn start(&self) -> anyhow::Result<()>;

    fn stop(&self);
}

/// Turns a final transcript into a reply
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, text: &str) -> String;
}

#[async_trait]
impl Responder for Engine {
    async fn respond(&self, text: &str) -> String {
        Engine::respond(self, text).await
    }
}

/// Host events translated into session inputs
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// User asked to start listening
    Start,
    /// User asked to stop listening
    Stop,
    PermissionGranted,
    PermissionDenied(PermissionErrorKind),
    /// An interim or final recognition result
    Recognized(RecognitionEvent),
    Error(RecognitionErrorKind),
    /// The recognizer reported that it ended
    Ended,
}

impl SessionInput {
    pub fn interim(text: impl Into<String>) -> Self {
        Self::Recognized(RecognitionEvent::interim(text))
    }

    pub fn final_transcript(text: impl Into<String>) -> Self {
        Self::Recognized(RecognitionEvent::final_result(text))
    }
}

/// An input queued for the session loop, optionally awaiting its outcome
#[derive(Debug)]
pub struct SessionCommand {
    input: SessionInput,
    reply: Option<oneshot::Sender<Result<(), SessionError>>>,
}

/// Sending side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Create a handle and the receiver to pass to [`SpeechSession::run`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue an input without waiting for it to be handled
    pub async fn send(&self, input: SessionInput) -> anyhow::Result<()> {
        self.tx
            .send(SessionCommand { input, reply: None })
            .await
            .map_err(|_| anyhow::anyhow!("speech session is not running"))
    }

    /// Queue an input and wait for the session's verdict on it
    pub async fn request(&self, input: SessionInput) -> anyhow::Result<Result<(), SessionError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand {
                input,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| anyhow::anyhow!("speech session is not running"))?;
        reply_rx
            .await
            .context("speech session dropped the request")
    }
}

#[derive(Debug, Default)]
struct Deadlines {
    start_recognition: Option<Instant>,
    hide_transcript: Option<Instant>,
    reset_error: Option<Instant>,
}

impl Deadlines {
    fn next(&self) -> Option<Instant> {
        [
            self.start_recognition,
            self.hide_transcript,
            self.reset_error,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

/// Clear `slot` and return true if its deadline has passed
fn take_due(slot: &mut Option<Instant>, now: Instant) -> bool {
    match *slot {
        Some(deadline) if deadline <= now => {
            *slot = None;
            true
        }
        _ => false,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The state machine for one listening surface
pub struct SpeechSession {
    state: ListeningState,
    /// Time when current non-Idle state was entered
    state_entered_at: Option<Instant>,
    source: Arc<dyn RecognitionSource>,
    responder: Arc<dyn Responder>,
    transcript: TranscriptAccumulator,
    timings: SessionTimings,
    deadlines: Deadlines,
    /// A `not-allowed` error re-requested permission and awaits the answer
    permission_retry: bool,
    /// The source was started for the current activation
    recognition_started: bool,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SpeechSession {
    pub fn new(
        source: Arc<dyn RecognitionSource>,
        responder: Arc<dyn Responder>,
        timings: SessionTimings,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: ListeningState::Idle,
            state_entered_at: None,
            source,
            responder,
            transcript: TranscriptAccumulator::new(),
            timings,
            deadlines: Deadlines::default(),
            permission_retry: false,
            recognition_started: false,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> ListeningState {
        self.state
    }

    pub fn transcript(&self) -> &TranscriptAccumulator {
        &self.transcript
    }

    /// Run the session, processing queued inputs and display deadlines
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("speech session started in Idle state");

        loop {
            let deadline = self.deadlines.next();
            tokio::select! {
                command = commands.recv() => {
                    let Some(SessionCommand { input, reply }) = command else {
                        break;
                    };
                    let result = self.handle_input(input).await;
                    if let Err(e) = &result {
                        debug!(%e, "session input rejected");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                _ = wait_until(deadline) => {
                    self.on_timer(Instant::now());
                }
            }
        }

        info!("speech session stopped");
    }

    /// Handle one input. Only `Start` can be rejected.
    pub async fn handle_input(&mut self, input: SessionInput) -> Result<(), SessionError> {
        match input {
            SessionInput::Start => return self.handle_start(),
            SessionInput::Stop => self.handle_stop(),
            SessionInput::PermissionGranted => self.handle_permission_granted(),
            SessionInput::PermissionDenied(kind) => self.handle_permission_denied(kind),
            SessionInput::Recognized(event) => self.handle_result(event).await,
            SessionInput::Error(kind) => self.handle_error(kind),
            SessionInput::Ended => self.handle_ended(),
        }
        Ok(())
    }

    /// Fire every deadline that has passed by `now`
    pub fn on_timer(&mut self, now: Instant) {
        if take_due(&mut self.deadlines.start_recognition, now) {
            self.start_recognition();
        }

        if take_due(&mut self.deadlines.hide_transcript, now) {
            self.emit(SessionEvent::TranscriptHidden);
        }

        if take_due(&mut self.deadlines.reset_error, now) && self.state == ListeningState::Error {
            self.permission_retry = false;
            self.transition_to(ListeningState::Idle);
            self.emit(SessionEvent::ErrorCleared {
                prompt: IDLE_PROMPT.to_string(),
            });
        }
    }

    fn handle_start(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, ListeningState::Idle | ListeningState::Error) {
            return Err(SessionError::AlreadyActive);
        }

        if !self.source.is_available() {
            warn!("start requested without an available recognition source");
            self.emit(SessionEvent::Unsupported {
                message: UNSUPPORTED_MESSAGE.to_string(),
            });
            return Err(SessionError::Unsupported);
        }

        self.deadlines = Deadlines::default();
        self.permission_retry = false;
        self.transcript.clear();
        self.transition_to(ListeningState::RequestingPermission);
        self.emit(SessionEvent::PermissionRequested { retry: false });
        Ok(())
    }

    fn handle_stop(&mut self) {
        match self.state {
            ListeningState::Listening | ListeningState::RequestingPermission => {
                if self.state == ListeningState::Listening {
                    self.source.stop();
                }
                self.deadlines.start_recognition = None;
                self.transcript.clear();
                self.transition_to(ListeningState::Idle);
                self.emit(SessionEvent::TranscriptHidden);
                info!("listening stopped by user");
            }
            _ => debug!(state = %self.state, "stop ignored"),
        }
    }

    fn handle_permission_granted(&mut self) {
        match self.state {
            ListeningState::RequestingPermission => {
                self.transition_to(ListeningState::Listening);
                self.deadlines.start_recognition = Some(Instant::now() + self.timings.start_delay);
            }
            ListeningState::Error if self.permission_retry => {
                self.permission_retry = false;
                info!("microphone access recovered");
                self.emit(SessionEvent::ErrorShown {
                    message: PERMISSION_RECOVERED_MESSAGE.to_string(),
                });
            }
            _ => debug!(state = %self.state, "ignoring permission grant"),
        }
    }

    fn handle_permission_denied(&mut self, kind: PermissionErrorKind) {
        match self.state {
            ListeningState::RequestingPermission => {
                warn!(?kind, "microphone permission denied");
                self.enter_error(kind.user_message());
            }
            ListeningState::Error if self.permission_retry => {
                self.permission_retry = false;
                debug!(?kind, "permission re-request denied");
            }
            _ => debug!(state = %self.state, "ignoring permission denial"),
        }
    }

    async fn handle_result(&mut self, event: RecognitionEvent) {
        if self.state != ListeningState::Listening {
            debug!(state = %self.state, "ignoring recognition result");
            return;
        }

        debug!(
            result_index = event.result_index,
            is_final = event.is_final,
            "recognition result"
        );
        self.transcript.apply(&event);
        self.emit(SessionEvent::TranscriptUpdated {
            text: self.transcript.display_text().to_string(),
            is_final: self.transcript.has_final(),
        });

        if let Some(utterance) = self.transcript.take_utterance() {
            self.dispatch(utterance).await;
        }
    }

    /// Hand one utterance to the responder. Inputs queue while this runs.
    async fn dispatch(&mut self, text: String) {
        self.transition_to(ListeningState::Processing);
        self.emit(SessionEvent::UtteranceDispatched { text: text.clone() });

        let reply = self.responder.respond(&text).await;
        self.emit(SessionEvent::ReplyReady { text: reply });

        if self.source.is_continuous() {
            self.transition_to(ListeningState::Listening);
            return;
        }

        self.source.stop();
        self.transition_to(ListeningState::Idle);
        self.deadlines.hide_transcript = Some(Instant::now() + self.timings.hide_delay);
    }

    fn handle_error(&mut self, kind: RecognitionErrorKind) {
        warn!(error = %kind, state = %self.state, "speech recognition error");
        self.enter_error(kind.user_message());

        if kind == RecognitionErrorKind::NotAllowed && !self.permission_retry {
            self.permission_retry = true;
            self.emit(SessionEvent::PermissionRequested { retry: true });
        }
    }

    fn handle_ended(&mut self) {
        match self.state {
            ListeningState::Listening if self.recognition_started => {
                self.deadlines.start_recognition = None;
                self.transcript.clear();
                self.transition_to(ListeningState::Idle);
            }
            _ => debug!(
                state = %self.state,
                started = self.recognition_started,
                "recognition end acknowledged"
            ),
        }
    }

    fn start_recognition(&mut self) {
        if self.state != ListeningState::Listening {
            return;
        }

        match self.source.start() {
            Ok(()) => {
                self.recognition_started = true;
                debug!("recognition source started");
            }
            Err(e) => {
                warn!(?e, "failed to start speech recognition");
                self.enter_error(START_FAILED_MESSAGE.to_string());
            }
        }
    }

    fn enter_error(&mut self, message: String) {
        self.deadlines.start_recognition = None;
        self.deadlines.hide_transcript = None;
        self.transcript.clear();

        if self.state != ListeningState::Error {
            self.transition_to(ListeningState::Error);
        }
        self.emit(SessionEvent::ErrorShown { message });
        self.deadlines.reset_error = Some(Instant::now() + self.timings.error_display);
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: ListeningState) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        if matches!(
            new_state,
            ListeningState::Idle | ListeningState::RequestingPermission | ListeningState::Error
        ) {
            self.recognition_started = false;
        }
        self.state_entered_at = if new_state != ListeningState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        self.emit(SessionEvent::StateChanged {
            from: old_state,
            to: new_state,
            duration_ms,
        });
    }

    fn emit(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        let _ = self.event_tx.send(event);
    }
}
