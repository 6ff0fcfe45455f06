//! Chat session controller.
//!
//! [`SessionController`] owns the conversation log and the connection and
//! processing state machines, and drives three kinds of backend traffic:
//!
//! - admission checks when a wallet connects,
//! - a periodic heartbeat while connected or queued ([`heartbeat`]),
//! - chat turns, which may start a background image job ([`poller`]).
//!
//! Admission, heartbeat and chat requests are serialized through one
//! [`RequestSerializer`]. State lives behind a plain mutex that is never held
//! across an await; every mutation publishes a fresh [`SessionSnapshot`] on a
//! watch channel.
//!
//! Background tasks hold only a weak reference to the controller, so dropping
//! the last handle tears everything down.

pub mod heartbeat;
pub mod log;
pub mod message;
pub mod poller;
pub mod serializer;
pub mod state;

use crate::api::{Admission, ChatApi, ChatReply, ChatRequest};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::identity::SessionIdentity;
use crate::speech::{self, SpeechFragment, VoiceSink};
use crate::wallet::{WalletEvent, WalletInfo, format_address};
use heartbeat::{ActivityClock, HeartbeatMonitor, TickControl};
use self::log::{GREETING_ID, MessageLog};
use message::{Message, Role};
use poller::{ImagePoller, PollOutcome};
use serializer::RequestSerializer;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use state::{ConnectionState, ProcessingState, SessionSnapshot};

/// Shown when a chat request fails without a server-provided message.
pub const GENERIC_ERROR: &str =
    "Sorry, an error occurred while processing the message. Please try again.";
/// Shown when the server reports a failed image job.
pub const IMAGE_FAILED: &str = "Image generation failed, please try again.";
/// Shown when the image job status cannot be fetched.
pub const IMAGE_STATUS_ERROR: &str = "Error checking image generation status";
/// Transient status line shown while an image job runs.
pub const GENERATING_STATUS: &str = "🎨 Generating image...";

/// What happened to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Not submitted: empty text, busy, or not admitted.
    Ignored,
    /// Assistant replied and the turn is over.
    Replied,
    /// Assistant replied and an image job is being polled.
    Generating,
    /// The persona asked for a payment.
    PaymentRequested,
    /// The session was put back in the queue.
    Queued,
    /// The turn ended with an error message.
    Failed,
    /// The session was reset while the request was in flight; the reply was
    /// dropped.
    Superseded,
}

struct SessionState {
    log: MessageLog,
    connection: ConnectionState,
    queue_position: u32,
    processing: ProcessingState,
    pending_request: Option<String>,
    status_message: Option<u64>,
    identity: SessionIdentity,
    wallet_info: Option<WalletInfo>,
    /// The backend has admitted this session at least once since the last
    /// reset; a later "inactive, not queued" heartbeat means the session was
    /// lost.
    was_active: bool,
    /// Bumped on every conversation reset to invalidate in-flight replies.
    epoch: u64,
}

impl SessionState {
    fn new(identity: SessionIdentity, greeting: &str) -> Self {
        Self {
            log: MessageLog::new(greeting),
            connection: ConnectionState::NotConnected,
            queue_position: 0,
            processing: ProcessingState::Idle,
            pending_request: None,
            status_message: None,
            identity,
            wallet_info: None,
            was_active: false,
            epoch: 0,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.log.messages().to_vec(),
            connection: self.connection,
            queue_position: self.queue_position,
            processing: self.processing,
            pending_request: self.pending_request.clone(),
        }
    }

    fn append(&mut self, build: impl FnOnce(u64) -> Message) -> u64 {
        let id = self.log.next_id();
        self.log.append(build(id));
        id
    }

    fn return_to_idle(&mut self) {
        self.processing = ProcessingState::Idle;
        self.pending_request = None;
    }

    fn can_chat(&self) -> bool {
        self.processing.is_idle() && self.connection == ConnectionState::Ready
    }
}

struct Inner {
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    voice: Arc<dyn VoiceSink>,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
    serializer: RequestSerializer,
    heartbeat: HeartbeatMonitor,
    poller: ImagePoller,
    activity: ActivityClock,
}

impl Inner {
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut state);
        self.snapshots.send_replace(state.snapshot());
        out
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Clear the log back to the greeting and abandon the current turn.
    ///
    /// A turn still waiting on an image job gets its closing fragment here,
    /// since the cancelled poll will never deliver one.
    fn reset_conversation(&self, state: &mut SessionState) {
        if state.pending_request.is_some() {
            self.voice.speak(SpeechFragment {
                content: String::new(),
                finish: true,
            });
        }
        state.log.reset();
        state.return_to_idle();
        state.status_message = None;
        state.epoch += 1;
        self.poller.cancel();
    }

    fn enter_queue(&self, state: &mut SessionState, position: u32) {
        self.reset_conversation(state);
        state.connection = ConnectionState::Queuing;
        state.queue_position = position;
        state.was_active = false;
    }

    fn speak(&self, fragments: Vec<SpeechFragment>) {
        for fragment in fragments {
            self.voice.speak(fragment);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.heartbeat.stop();
        self.poller.cancel();
    }
}

fn final_fragment(text: &str) -> SpeechFragment {
    SpeechFragment {
        content: speech::normalize_numbers(text),
        finish: true,
    }
}

/// Handle to one chat session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("SessionController")
            .field("connection", &snapshot.connection)
            .field("processing", &snapshot.processing)
            .field("messages", &snapshot.messages.len())
            .finish()
    }
}

impl SessionController {
    /// Create a controller in the not-connected state with a greeting-only log.
    pub fn new(
        config: ClientConfig,
        identity: SessionIdentity,
        api: Arc<dyn ChatApi>,
        voice: Arc<dyn VoiceSink>,
    ) -> Self {
        let activity = ActivityClock::new();
        let heartbeat = HeartbeatMonitor::new(
            config.heartbeat.interval(),
            config.heartbeat.activity_timeout(),
            activity.clone(),
        );
        let state = SessionState::new(identity, &config.persona.greeting);
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                voice,
                state: Mutex::new(state),
                snapshots,
                serializer: RequestSerializer::new(),
                heartbeat,
                poller: ImagePoller::new(),
                activity,
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read(SessionState::snapshot)
    }

    /// Receiver that sees a new snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Durable session id.
    pub fn session_id(&self) -> String {
        self.inner.read(|s| s.identity.session_id.clone())
    }

    /// Connected wallet address.
    pub fn wallet_address(&self) -> Option<String> {
        self.inner.read(|s| s.identity.wallet_address.clone())
    }

    /// Metadata of the connected wallet.
    pub fn wallet_info(&self) -> Option<WalletInfo> {
        self.inner.read(|s| s.wallet_info.clone())
    }

    /// Whether the heartbeat loop is running.
    pub fn is_heartbeat_running(&self) -> bool {
        self.inner.heartbeat.is_running()
    }

    /// Configuration the controller was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// React to a wallet connecting or disconnecting.
    pub async fn handle_wallet_event(&self, event: WalletEvent) -> ConnectionState {
        match event {
            WalletEvent::Connected { address, info } => {
                info!(address = %format_address(&address), "wallet connected");
                self.inner.update(|s| {
                    s.identity.wallet_address = Some(address);
                    s.wallet_info = info;
                });
                self.check_admission().await
            }
            WalletEvent::Disconnected => {
                self.disconnect();
                ConnectionState::NotConnected
            }
        }
    }

    /// Ask the backend whether this session may chat and update the
    /// connection state accordingly.
    ///
    /// Does nothing without a connected wallet.
    pub async fn check_admission(&self) -> ConnectionState {
        let session_id = self.inner.read(|s| {
            s.identity
                .wallet_address
                .is_some()
                .then(|| s.identity.session_id.clone())
        });
        let Some(session_id) = session_id else {
            debug!("admission check skipped: no wallet");
            return ConnectionState::NotConnected;
        };

        let api = &self.inner.api;
        let result: Result<Admission> = self
            .inner
            .serializer
            .with_lock(|| api.initial_connection(&session_id))
            .await;

        let (connection, heartbeat) = self.inner.update(|s| {
            if s.identity.wallet_address.is_none() {
                debug!("wallet disconnected during admission check");
                return (s.connection, None);
            }
            match result {
                Ok(Admission::Admitted) => {
                    if s.connection == ConnectionState::Queuing && s.processing.is_idle() {
                        self.inner.reset_conversation(s);
                    }
                    s.connection = ConnectionState::Ready;
                    s.queue_position = 0;
                    s.was_active = true;
                    info!("session admitted");
                    (ConnectionState::Ready, Some(true))
                }
                Ok(Admission::Queued { position }) => {
                    self.inner.enter_queue(s, position);
                    info!(position, "session queued");
                    (ConnectionState::Queuing, Some(true))
                }
                Ok(Admission::Inactive) => {
                    self.inner.enter_queue(s, 0);
                    info!("session inactive, waiting in queue");
                    (ConnectionState::Queuing, Some(true))
                }
                Err(e) => {
                    warn!(error = %e, "admission check failed");
                    s.connection = ConnectionState::NotConnected;
                    s.queue_position = 0;
                    s.was_active = false;
                    (ConnectionState::NotConnected, Some(false))
                }
            }
        });

        match heartbeat {
            Some(true) => self.start_heartbeat(),
            Some(false) => self.inner.heartbeat.stop(),
            None => {}
        }
        connection
    }

    fn disconnect(&self) {
        info!("wallet disconnected");
        self.inner.heartbeat.stop();
        self.inner.update(|s| {
            self.inner.reset_conversation(s);
            s.identity.wallet_address = None;
            s.wallet_info = None;
            s.connection = ConnectionState::NotConnected;
            s.queue_position = 0;
            s.was_active = false;
        });
    }

    fn start_heartbeat(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.heartbeat.start(move || {
            let weak = weak.clone();
            async move {
                match SessionController::from_weak(&weak) {
                    Some(controller) => controller.heartbeat_tick().await,
                    None => TickControl::Stop,
                }
            }
        });
    }

    async fn heartbeat_tick(&self) -> TickControl {
        let session_id = self.inner.read(|s| {
            (s.connection != ConnectionState::NotConnected).then(|| s.identity.session_id.clone())
        });
        let Some(session_id) = session_id else {
            return TickControl::Stop;
        };

        let api = &self.inner.api;
        let result = self
            .inner
            .serializer
            .with_lock(|| api.heartbeat(&session_id))
            .await;
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
                return TickControl::Continue;
            }
        };

        self.inner.update(|s| {
            if s.connection == ConnectionState::NotConnected {
                return TickControl::Stop;
            }
            if status.active {
                if s.connection == ConnectionState::Queuing {
                    info!("admitted from queue");
                    if s.processing.is_idle() {
                        self.inner.reset_conversation(s);
                    }
                }
                s.connection = ConnectionState::Ready;
                s.queue_position = 0;
                s.was_active = true;
                TickControl::Continue
            } else if status.in_queue {
                if s.connection == ConnectionState::Ready {
                    info!(position = status.position, "moved back to queue");
                    self.inner.reset_conversation(s);
                }
                s.connection = ConnectionState::Queuing;
                s.queue_position = status.position;
                s.was_active = false;
                TickControl::Continue
            } else if s.was_active && s.connection == ConnectionState::Ready {
                warn!("session lost, returning to queue");
                self.inner.enter_queue(s, 0);
                TickControl::Stop
            } else {
                TickControl::Continue
            }
        })
    }

    /// Submit a user message, optionally with the hash of a fee payment.
    ///
    /// Ignored unless the session is admitted and idle, or if `text` is blank.
    pub async fn send_message(&self, text: &str, pay_fee_hash: Option<&str>) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }
        let pay_fee_hash = pay_fee_hash.map(str::trim).filter(|h| !h.is_empty());

        let prepared = self.inner.update(|s| {
            if !s.can_chat() {
                return None;
            }
            let history = s.log.history();
            s.append(|id| Message::text(id, Role::User, text));
            match pay_fee_hash {
                Some(hash) => {
                    s.append(|id| Message::transaction(id, hash));
                    s.processing = ProcessingState::Minting;
                }
                None => s.processing = ProcessingState::Thinking,
            }
            let request = ChatRequest {
                message: text.to_owned(),
                conversation_history: history,
                session_id: s.identity.session_id.clone(),
                wallet_address: s.identity.wallet_address.clone(),
                request_id: s.pending_request.clone(),
                pay_fee_hash: pay_fee_hash.map(str::to_owned),
            };
            Some((request, s.epoch))
        });
        let Some((request, epoch)) = prepared else {
            debug!("message ignored: session busy or not admitted");
            return SendOutcome::Ignored;
        };

        self.inner.activity.touch();
        let api = &self.inner.api;
        let result = self
            .inner
            .serializer
            .with_lock(|| api.chat(&request))
            .await;
        self.inner.activity.touch();
        self.apply_chat_result(result, epoch)
    }

    /// Drop the most recent log entry and submit `text` again.
    ///
    /// The greeting is never removed, and nothing is removed when the message
    /// would be ignored.
    pub async fn retry_message(&self, text: &str) -> SendOutcome {
        let allowed = self.inner.update(|s| {
            if !s.can_chat() || text.trim().is_empty() {
                return false;
            }
            if s.log.last().is_some_and(|m| m.id != GREETING_ID) {
                s.log.remove_last();
            }
            true
        });
        if !allowed {
            return SendOutcome::Ignored;
        }
        self.send_message(text, None).await
    }

    fn apply_chat_result(&self, result: Result<ChatReply>, epoch: u64) -> SendOutcome {
        let (outcome, fragments, poll) = self.inner.update(|s| {
            if s.epoch != epoch {
                debug!("session reset during chat request, dropping reply");
                return (SendOutcome::Superseded, Vec::new(), None);
            }
            match result {
                Ok(ChatReply::Payment { request, content }) => {
                    info!(chain_id = request.chain_id, price = %request.price, "payment requested");
                    let fragments = speech::fragments_for(&content, true);
                    s.append(|id| Message::payment(id, content, request));
                    s.return_to_idle();
                    (SendOutcome::PaymentRequested, fragments, None)
                }
                Ok(ChatReply::Queued { position }) => {
                    info!(position, "chat answered with queue position");
                    self.inner.enter_queue(s, position);
                    (SendOutcome::Queued, Vec::new(), None)
                }
                Ok(ChatReply::Error { message }) => {
                    warn!(%message, "server rejected chat message");
                    let fragments = vec![final_fragment(&message)];
                    s.append(|id| Message::error(id, message));
                    s.return_to_idle();
                    (SendOutcome::Failed, fragments, None)
                }
                Ok(ChatReply::Reply {
                    content,
                    request_id: Some(request_id),
                }) => {
                    let fragments = speech::fragments_for(&content, false);
                    s.append(|id| Message::text(id, Role::Assistant, content));
                    let status = s.append(|id| Message::text(id, Role::System, GENERATING_STATUS));
                    s.status_message = Some(status);
                    s.processing = ProcessingState::Generating;
                    s.pending_request = Some(request_id.clone());
                    (SendOutcome::Generating, fragments, Some(request_id))
                }
                Ok(ChatReply::Reply {
                    content,
                    request_id: None,
                }) => {
                    let fragments = speech::fragments_for(&content, true);
                    s.append(|id| Message::text(id, Role::Assistant, content));
                    s.return_to_idle();
                    (SendOutcome::Replied, fragments, None)
                }
                Err(e) => {
                    warn!(error = %e, transport = e.is_transport(), "chat request failed");
                    s.append(|id| Message::error(id, GENERIC_ERROR));
                    s.return_to_idle();
                    (SendOutcome::Failed, vec![final_fragment(GENERIC_ERROR)], None)
                }
            }
        });

        if outcome == SendOutcome::Queued && !self.inner.heartbeat.is_running() {
            self.start_heartbeat();
        }
        self.inner.speak(fragments);
        if let Some(request_id) = poll {
            self.start_image_poll(request_id);
        }
        outcome
    }

    fn start_image_poll(&self, request_id: String) {
        info!(%request_id, "polling image generation");
        let cancel = self.inner.poller.begin(&request_id);
        let api = Arc::clone(&self.inner.api);
        let session_id = self.session_id();
        let interval = self.inner.config.poller.interval();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Some(outcome) =
                poller::poll_until_done(api.as_ref(), &session_id, &request_id, interval, &cancel)
                    .await
            else {
                return;
            };
            if let Some(controller) = SessionController::from_weak(&weak) {
                controller.finish_image_job(&request_id, outcome, &cancel);
            }
        });
    }

    fn finish_image_job(&self, request_id: &str, outcome: PollOutcome, cancel: &CancellationToken) {
        let fragments = self.inner.update(|s| {
            if cancel.is_cancelled() || s.pending_request.as_deref() != Some(request_id) {
                debug!(%request_id, "stale image job result discarded");
                return None;
            }
            if let Some(status) = s.status_message.take() {
                s.log.remove_by_id(status);
            }
            let fragments = match outcome {
                PollOutcome::Completed(content) => {
                    info!(%request_id, "image generation completed");
                    let fragments =
                        speech::fragments_for(&speech::strip_image_markup(&content), true);
                    s.append(|id| Message::text(id, Role::Assistant, content));
                    fragments
                }
                PollOutcome::Failed => {
                    warn!(%request_id, "image generation failed");
                    s.append(|id| Message::error(id, IMAGE_FAILED));
                    vec![final_fragment(IMAGE_FAILED)]
                }
                PollOutcome::Unreachable(_) => {
                    s.append(|id| Message::error(id, IMAGE_STATUS_ERROR));
                    vec![final_fragment(IMAGE_STATUS_ERROR)]
                }
            };
            s.return_to_idle();
            Some(fragments)
        });

        if let Some(fragments) = fragments {
            self.inner.poller.finish(request_id);
            self.inner.speak(fragments);
        }
    }

    /// Stop the heartbeat and any image polling.
    pub fn shutdown(&self) {
        self.inner.heartbeat.stop();
        self.inner.poller.cancel();
        info!("session shut down");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::api::HttpChatApi;
    use crate::config::ApiConfig;
    use crate::speech::ChannelVoiceSink;

    fn offline_controller() -> (SessionController, tokio::sync::mpsc::UnboundedReceiver<SpeechFragment>) {
        let mut config = ClientConfig::default();
        config.api = ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        };
        let api = HttpChatApi::new(config.api.clone()).unwrap();
        let (voice, rx) = ChannelVoiceSink::new();
        let controller = SessionController::new(
            config,
            SessionIdentity::new("session-1"),
            Arc::new(api),
            Arc::new(voice),
        );
        (controller, rx)
    }

    #[tokio::test]
    async fn starts_not_connected_with_greeting() {
        let (controller, _rx) = offline_controller();
        let snap = controller.snapshot();
        assert_eq!(snap.connection, ConnectionState::NotConnected);
        assert_eq!(snap.processing, ProcessingState::Idle);
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].content, crate::config::DEFAULT_GREETING);
        assert!(!controller.is_heartbeat_running());
    }

    #[tokio::test]
    async fn send_is_ignored_until_admitted() {
        let (controller, mut rx) = offline_controller();
        assert_eq!(controller.send_message("hi", None).await, SendOutcome::Ignored);
        assert_eq!(controller.retry_message("hi").await, SendOutcome::Ignored);
        assert_eq!(controller.snapshot().messages.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_leaves_session_not_connected() {
        let (controller, _rx) = offline_controller();
        let state = controller
            .handle_wallet_event(WalletEvent::Connected {
                address: "0x1234567890abcdef".into(),
                info: None,
            })
            .await;
        assert_eq!(state, ConnectionState::NotConnected);
        assert_eq!(controller.wallet_address().as_deref(), Some("0x1234567890abcdef"));
        assert!(!controller.is_heartbeat_running());
    }

    #[tokio::test]
    async fn disconnect_clears_wallet() {
        let (controller, _rx) = offline_controller();
        controller
            .handle_wallet_event(WalletEvent::Connected {
                address: "0xabc".into(),
                info: Some(WalletInfo {
                    name: "MetaMask".into(),
                    icon: "data:".into(),
                }),
            })
            .await;
        assert!(controller.wallet_info().is_some());
        let state = controller.handle_wallet_event(WalletEvent::Disconnected).await;
        assert_eq!(state, ConnectionState::NotConnected);
        assert!(controller.wallet_address().is_none());
        assert!(controller.wallet_info().is_none());
    }

    #[test]
    fn failure_fragment_is_final_and_normalized() {
        let f = final_fragment("Try again in 5 minutes.");
        assert!(f.finish);
        assert_eq!(f.content, "Try again in five minutes.");
    }
}
