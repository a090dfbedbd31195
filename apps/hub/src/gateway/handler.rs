//! Routing of decoded validator frames.
//!
//! Transport-agnostic: the listener hands every text or binary frame to
//! [`MessageRouter`] together with the connection's [`Session`]. Nothing in
//! here ever terminates a connection; a bad frame is logged and dropped.

use guardian_proto::protocol::decode_binary_frame;
use guardian_proto::{
    FrameError, HubMessage, PublicKey, RegisterRequest, ValidateReport, ValidatorMessage,
    decode_frame,
};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::session::{Session, SessionIdentity};
use crate::auth::{AuthError, RegistrationVerifier};
use crate::correlator::{CallbackCorrelator, Resolution};
use crate::registry::{ValidatorEntry, ValidatorRegistry};
use crate::store::{IdentityStore, NewTick, ResultSink, Tick};

/// Why a `validate` frame had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The connection is not the live registration of any validator
    Unregistered,
    /// Unknown, already answered, or swept task id
    NoMatchingTask,
    Expired,
    /// The task was sent to a different validator
    WrongValidator,
}

/// What handling a single frame did
#[derive(Debug)]
pub enum FrameOutcome {
    Registered { public_key: PublicKey, replaced: bool },
    Refused(AuthError),
    /// Signature was fine but the identity store failed; not admitted
    IdentityUnavailable,
    Recorded(Tick),
    /// The task was consumed but the tick could not be saved
    PersistFailed,
    Ignored(IgnoreReason),
    Dropped(FrameError),
}

pub struct MessageRouter {
    registry: Arc<ValidatorRegistry>,
    correlator: Arc<CallbackCorrelator>,
    verifier: RegistrationVerifier,
    identities: Arc<dyn IdentityStore>,
    sink: Arc<dyn ResultSink>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ValidatorRegistry>,
        correlator: Arc<CallbackCorrelator>,
        verifier: RegistrationVerifier,
        identities: Arc<dyn IdentityStore>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self { registry, correlator, verifier, identities, sink }
    }

    pub async fn handle_text(&self, session: &mut Session, text: &str) -> FrameOutcome {
        match decode_frame::<ValidatorMessage>(text) {
            Ok(message) => self.dispatch(session, message).await,
            Err(e) => self.drop_frame(session, e),
        }
    }

    pub async fn handle_binary(&self, session: &mut Session, bytes: &[u8]) -> FrameOutcome {
        match decode_binary_frame::<ValidatorMessage>(bytes) {
            Ok(message) => self.dispatch(session, message).await,
            Err(e) => self.drop_frame(session, e),
        }
    }

    async fn dispatch(&self, session: &mut Session, message: ValidatorMessage) -> FrameOutcome {
        match message {
            ValidatorMessage::Register(request) => self.handle_register(session, request).await,
            ValidatorMessage::Validate(report) => self.handle_validate(session, report).await,
        }
    }

    fn drop_frame(&self, session: &Session, error: FrameError) -> FrameOutcome {
        warn!(conn = %session.id(), "Dropping frame: {}", error);
        FrameOutcome::Dropped(error)
    }

    /// Verify, persist the identity, admit, then acknowledge.
    pub async fn handle_register(&self, session: &mut Session, request: RegisterRequest) -> FrameOutcome {
        let public_key = match self.verifier.verify(&request) {
            Ok(key) => key,
            Err(e) => {
                warn!(conn = %session.id(), addr = %session.addr(), "Registration refused: {}", e);
                return FrameOutcome::Refused(e);
            }
        };

        // The socket peer wins over whatever the validator claims
        let ip = session.addr().ip().to_string();
        let record = match self.identities.upsert(&public_key, &ip, &request.location).await {
            Ok(record) => record,
            Err(e) => {
                warn!(validator = %public_key, "Failed to store validator identity: {:#}", e);
                return FrameOutcome::IdentityUnavailable;
            }
        };

        let entry = ValidatorEntry {
            public_key,
            validator_id: record.id,
            location: request.location,
            connected_at: SystemTime::now(),
            connection: session.handle().clone(),
        };

        let replaced = self.registry.admit(entry).await;
        session.bind(SessionIdentity { public_key, validator_id: record.id });

        let replaced = match replaced {
            Some(old) if old.connection.id() != session.id() => {
                info!(validator = %public_key, "Registration supersedes {}", old.connection.id());
                true
            }
            _ => false,
        };

        info!(
            validator = %public_key,
            conn = %session.id(),
            id = %record.id,
            claimed_ip = request.ip.as_deref().unwrap_or("-"),
            "Validator registered"
        );

        let ack = HubMessage::Registered { validator_id: record.id.to_string() };
        if let Err(e) = session.handle().send(ack) {
            debug!("Could not acknowledge registration: {}", e);
        }

        FrameOutcome::Registered { public_key, replaced }
    }

    /// Resolve the task and persist one tick for it.
    pub async fn handle_validate(&self, session: &mut Session, report: ValidateReport) -> FrameOutcome {
        let Some(identity) = self.live_identity(session).await else {
            debug!(conn = %session.id(), "Ignoring validate from unregistered connection");
            return FrameOutcome::Ignored(IgnoreReason::Unregistered);
        };

        let task = match self.correlator.resolve(&report.id, &identity.public_key).await {
            Resolution::Resolved(task) => task,
            Resolution::Unknown => {
                debug!(task = %report.id, "No pending task for reply");
                return FrameOutcome::Ignored(IgnoreReason::NoMatchingTask);
            }
            Resolution::Expired => {
                debug!(task = %report.id, "Reply arrived after the task expired");
                return FrameOutcome::Ignored(IgnoreReason::Expired);
            }
            Resolution::WrongValidator => {
                warn!(task = %report.id, validator = %identity.public_key, "Reply for a task sent elsewhere");
                return FrameOutcome::Ignored(IgnoreReason::WrongValidator);
            }
        };

        let tick = NewTick {
            validator_id: identity.validator_id,
            target_id: task.target_id,
            status: report.status,
            latency_ms: report.latency,
            status_code: report.status_code,
            timestamp: SystemTime::now(),
        };

        match self.sink.record(tick).await {
            Ok(tick) => {
                debug!(target_url = %task.target_url, status = %tick.status, latency = tick.latency_ms, "Tick recorded");
                FrameOutcome::Recorded(tick)
            }
            Err(e) => {
                warn!(target_url = %task.target_url, "Failed to record tick: {:#}", e);
                FrameOutcome::PersistFailed
            }
        }
    }

    /// The session identity, but only while this connection is still the
    /// registered one for that key.
    async fn live_identity(&self, session: &Session) -> Option<SessionIdentity> {
        let identity = session.identity()?;
        let entry = self.registry.get(&identity.public_key).await?;
        (entry.connection.id() == session.id()).then_some(identity)
    }

    pub async fn on_disconnect(&self, session: &Session) {
        if let Some(entry) = self.registry.remove(session.id()).await {
            info!(validator = %entry.public_key, conn = %session.id(), "Validator disconnected");
        } else {
            debug!(conn = %session.id(), "Connection closed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::correlator::PendingTask;
    use crate::registry::ConnectionHandle;
    use crate::registry::tests::test_addr;
    use crate::store::{MemoryStore, MonitoredTarget};
    use guardian_proto::crypto::{generate_keypair, sign_registration};
    use guardian_proto::{KeyPair, TaskId, TickStatus, encode_frame};
    use std::time::Duration;
    use tokio::sync::mpsc;

    pub(crate) struct Fixture {
        pub(crate) router: MessageRouter,
        pub(crate) registry: Arc<ValidatorRegistry>,
        correlator: Arc<CallbackCorrelator>,
        store: Arc<MemoryStore>,
        target: MonitoredTarget,
    }

    pub(crate) fn fixture() -> Fixture {
        let target = MonitoredTarget::new("https://a.example", "acct");
        let store = Arc::new(MemoryStore::with_targets(vec![target.clone()]));
        let registry = Arc::new(ValidatorRegistry::new());
        let correlator = Arc::new(CallbackCorrelator::new());
        let router = MessageRouter::new(
            registry.clone(),
            correlator.clone(),
            RegistrationVerifier::new(Duration::from_secs(60)),
            store.clone(),
            store.clone(),
        );
        Fixture { router, registry, correlator, store, target }
    }

    pub(crate) fn session() -> (Session, mpsc::Receiver<HubMessage>) {
        let (handle, rx) = ConnectionHandle::channel(test_addr());
        (Session::new(handle), rx)
    }

    pub(crate) async fn register(f: &Fixture, session: &mut Session, keypair: &KeyPair) -> FrameOutcome {
        let frame = encode_frame(&ValidatorMessage::Register(sign_registration(keypair, "eu", None))).unwrap();
        f.router.handle_text(session, &frame).await
    }

    async fn pending(f: &Fixture, validator: PublicKey) -> TaskId {
        let id = TaskId::new();
        let task = PendingTask {
            target_id: f.target.id,
            target_url: f.target.url.clone(),
            validator,
            dispatched_at: SystemTime::now(),
        };
        assert!(f.correlator.register(id, task, Duration::from_secs(30)).await);
        id
    }

    fn report(id: TaskId) -> ValidateReport {
        ValidateReport {
            validator_id: "whatever-the-validator-thinks".into(),
            id,
            status_code: 200,
            latency: 42,
            status: TickStatus::Good,
        }
    }

    #[tokio::test]
    async fn test_register_admits_and_acks() {
        let f = fixture();
        let keypair = generate_keypair();
        let (mut s, mut rx) = session();

        let outcome = register(&f, &mut s, &keypair).await;
        assert!(matches!(outcome, FrameOutcome::Registered { replaced: false, .. }));
        assert_eq!(f.registry.len().await, 1);

        let record = f.store.validator(&keypair.public_key()).await.unwrap();
        assert_eq!(record.ip, "127.0.0.1");
        match rx.try_recv().unwrap() {
            HubMessage::Registered { validator_id } => assert_eq!(validator_id, record.id.to_string()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tampered_register_is_refused() {
        let f = fixture();
        let keypair = generate_keypair();
        let (mut s, mut rx) = session();

        let mut request = sign_registration(&keypair, "eu", None);
        request.message = request.message.replace("Register", "register");

        let outcome = f.router.handle_register(&mut s, request).await;
        assert!(matches!(outcome, FrameOutcome::Refused(AuthError::BadSignature)));
        assert!(f.registry.is_empty().await);
        assert!(s.identity().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reregister_on_new_connection_replaces() {
        let f = fixture();
        let keypair = generate_keypair();
        let (mut first, _rx1) = session();
        let (mut second, _rx2) = session();

        register(&f, &mut first, &keypair).await;
        let outcome = register(&f, &mut second, &keypair).await;

        assert!(matches!(outcome, FrameOutcome::Registered { replaced: true, .. }));
        assert_eq!(f.registry.len().await, 1);

        // The superseded connection can no longer resolve tasks
        let id = pending(&f, keypair.public_key()).await;
        let outcome = f.router.handle_validate(&mut first, report(id)).await;
        assert!(matches!(outcome, FrameOutcome::Ignored(IgnoreReason::Unregistered)));

        // Closing the old socket leaves the new registration in place
        f.router.on_disconnect(&first).await;
        assert_eq!(f.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_validate_records_tick_once() {
        let f = fixture();
        let keypair = generate_keypair();
        let (mut s, _rx) = session();
        register(&f, &mut s, &keypair).await;

        let id = pending(&f, keypair.public_key()).await;
        let frame = encode_frame(&ValidatorMessage::Validate(report(id))).unwrap();

        let outcome = f.router.handle_text(&mut s, &frame).await;
        let FrameOutcome::Recorded(tick) = outcome else {
            panic!("expected a recorded tick, got {outcome:?}");
        };
        assert_eq!(tick.target_id, f.target.id);
        assert_eq!(tick.validator_id, s.identity().unwrap().validator_id);
        assert_eq!(tick.latency_ms, 42);

        let outcome = f.router.handle_text(&mut s, &frame).await;
        assert!(matches!(outcome, FrameOutcome::Ignored(IgnoreReason::NoMatchingTask)));
        assert_eq!(f.store.tick_count().await, 1);
    }

    #[tokio::test]
    async fn test_validate_before_register_is_ignored() {
        let f = fixture();
        let (mut s, _rx) = session();
        let id = pending(&f, generate_keypair().public_key()).await;

        let outcome = f.router.handle_validate(&mut s, report(id)).await;
        assert!(matches!(outcome, FrameOutcome::Ignored(IgnoreReason::Unregistered)));
        assert_eq!(f.correlator.len().await, 1);
    }

    #[tokio::test]
    async fn test_reply_from_other_validator_is_ignored() {
        let f = fixture();
        let owner = generate_keypair();
        let intruder = generate_keypair();
        let (mut s, _rx) = session();
        register(&f, &mut s, &intruder).await;

        let id = pending(&f, owner.public_key()).await;
        let outcome = f.router.handle_validate(&mut s, report(id)).await;

        assert!(matches!(outcome, FrameOutcome::Ignored(IgnoreReason::WrongValidator)));
        assert_eq!(f.correlator.len().await, 1);
        assert_eq!(f.store.tick_count().await, 0);
    }

    #[tokio::test]
    async fn test_reply_for_deleted_target_consumes_task() {
        let f = fixture();
        let keypair = generate_keypair();
        let (mut s, _rx) = session();
        register(&f, &mut s, &keypair).await;

        let id = pending(&f, keypair.public_key()).await;
        f.store.remove_target(f.target.id).await;

        let outcome = f.router.handle_validate(&mut s, report(id)).await;
        assert!(matches!(outcome, FrameOutcome::PersistFailed));
        assert!(f.correlator.is_empty().await);
    }

    #[tokio::test]
    async fn test_bad_frames_are_dropped() {
        let f = fixture();
        let (mut s, _rx) = session();

        assert!(matches!(
            f.router.handle_text(&mut s, "not json").await,
            FrameOutcome::Dropped(FrameError::Malformed(_))
        ));
        assert!(matches!(
            f.router.handle_text(&mut s, r#"{"type":"subscribe"}"#).await,
            FrameOutcome::Dropped(FrameError::UnknownType(_))
        ));
        assert!(matches!(
            f.router.handle_text(&mut s, r#"{"type":"validate","ID":"nope"}"#).await,
            FrameOutcome::Dropped(FrameError::Invalid { .. })
        ));
        assert!(matches!(
            f.router.handle_binary(&mut s, &[0xff, 0xfe]).await,
            FrameOutcome::Dropped(FrameError::NotUtf8)
        ));
    }

    #[tokio::test]
    async fn test_binary_register_is_accepted() {
        let f = fixture();
        let keypair = generate_keypair();
        let (mut s, _rx) = session();

        let frame = encode_frame(&ValidatorMessage::Register(sign_registration(&keypair, "eu", None))).unwrap();
        let outcome = f.router.handle_binary(&mut s, frame.as_bytes()).await;

        assert!(matches!(outcome, FrameOutcome::Registered { .. }));
    }
}
