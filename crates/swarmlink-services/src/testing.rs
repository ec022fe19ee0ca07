//! In-memory collaborators for tests.
//!
//! `MockSignaling` plays the rendezvous service, `MockTransport` a link,
//! and `MockEngine` the transfer client. Each records what was asked of it
//! so tests can assert on calls rather than on log output.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for the integration test crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use swarmlink_core::{restore_filter, Credential, OfferId, PeerId, Topic, TransportConfig};

use crate::engine::{ResourceEvent, TransferEngine};
use crate::signaling::{Advertisement, InboundAnswer, Registration, SignalingClient, SignalingError};
use crate::transport::{Connection, ConnectionEvent, PeerTransport, TransportError};

/// Build an advertisement from `peer` for `topic`.
pub fn ad(peer: &str, topic: &str) -> Advertisement {
    Advertisement {
        offer_id: OfferId::new(format!("offer-{peer}-{topic}")),
        peer_id: PeerId::new(peer),
        topics: vec![Topic::new(topic)],
        description: format!("sdp:{peer}"),
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

pub struct MockTransport {
    remote: PeerId,
    events: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
    sent: Mutex<Vec<Bytes>>,
}

impl MockTransport {
    /// A transport and the connection wrapping it.
    pub fn pair(remote: PeerId) -> (Arc<Self>, Connection) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            remote,
            events: Mutex::new(Some(tx)),
            close_calls: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        });
        let conn = Connection::new(transport.clone(), rx);
        (transport, conn)
    }

    /// Deliver a lifecycle event as the remote side would.
    pub fn emit(&self, event: ConnectionEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.events.lock().is_none()
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    fn remote(&self) -> &PeerId {
        &self.remote
    }

    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(data);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("injected close failure".into()));
        }
        match self.events.lock().take() {
            Some(tx) => {
                let _ = tx.send(ConnectionEvent::Close);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}

// ── Signaling ─────────────────────────────────────────────────────────────────

/// How `MockSignaling::answer` treats a given remote peer.
#[derive(Clone, Default)]
pub enum AnswerPlan {
    /// Handshake succeeds and the link opens immediately.
    #[default]
    Open,
    /// `answer` itself fails.
    Reject,
    /// Handshake starts, then the link reports an error.
    ErrorEvent,
    /// `answer` blocks until the gate is notified, then opens.
    Gated(Arc<Notify>),
    /// Handshake starts; the test emits events through the transport.
    Pending,
}

#[derive(Default)]
struct SignalingState {
    ads: HashMap<Topic, Vec<Advertisement>>,
    fail_register: bool,
    fail_create: bool,
    discover_failures: usize,
    fail_cancel: HashSet<OfferId>,
    plans: HashMap<PeerId, AnswerPlan>,
    created: Vec<(Topic, OfferId)>,
    cancel_attempts: Vec<OfferId>,
    discover_calls: Vec<(Vec<Topic>, usize)>,
    answered: Vec<PeerId>,
    transports: HashMap<PeerId, Vec<Arc<MockTransport>>>,
    answers_tx: Option<mpsc::UnboundedSender<InboundAnswer>>,
    registrations: Vec<Option<Credential>>,
}

/// Rendezvous service held in memory.
///
/// `discover` drops advertisements matching the exclusion filter, then
/// returns at most `limit` of the rest in the order they were set.
#[derive(Default)]
pub struct MockSignaling {
    state: Mutex<SignalingState>,
    next_offer: AtomicU64,
}

impl MockSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_ads(&self, topic: &str, ads: Vec<Advertisement>) {
        self.state.lock().ads.insert(Topic::new(topic), ads);
    }

    pub fn set_plan(&self, peer: &str, plan: AnswerPlan) {
        self.state.lock().plans.insert(PeerId::new(peer), plan);
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.state.lock().fail_register = fail;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    /// Make the next `n` discover calls fail.
    pub fn fail_next_discovers(&self, n: usize) {
        self.state.lock().discover_failures = n;
    }

    pub fn fail_cancel_of(&self, offer: &OfferId) {
        self.state.lock().fail_cancel.insert(offer.clone());
    }

    pub fn created_offers(&self) -> Vec<(Topic, OfferId)> {
        self.state.lock().created.clone()
    }

    pub fn cancel_attempts(&self) -> Vec<OfferId> {
        self.state.lock().cancel_attempts.clone()
    }

    pub fn discover_calls(&self) -> Vec<(Vec<Topic>, usize)> {
        self.state.lock().discover_calls.clone()
    }

    /// Peers passed to `answer`, in call order.
    pub fn answered(&self) -> Vec<PeerId> {
        self.state.lock().answered.clone()
    }

    /// Every transport created for `peer`, outbound and inbound.
    pub fn transports_for(&self, peer: &str) -> Vec<Arc<MockTransport>> {
        self.state
            .lock()
            .transports
            .get(&PeerId::new(peer))
            .cloned()
            .unwrap_or_default()
    }

    pub fn registrations(&self) -> Vec<Option<Credential>> {
        self.state.lock().registrations.clone()
    }

    /// Simulate `remote` answering one of our offers for `topic`.
    ///
    /// Returns the transport, or `None` if nobody registered.
    pub fn inject_answer(
        &self,
        topic: &str,
        offer_id: &OfferId,
        remote: &str,
        open: bool,
    ) -> Option<Arc<MockTransport>> {
        let remote = PeerId::new(remote);
        let (transport, connection) = MockTransport::pair(remote.clone());
        let mut state = self.state.lock();
        let tx = state.answers_tx.clone()?;
        state
            .transports
            .entry(remote.clone())
            .or_default()
            .push(transport.clone());
        drop(state);

        if open {
            transport.emit(ConnectionEvent::Open);
        }
        tx.send(InboundAnswer {
            topic: Topic::new(topic),
            offer_id: offer_id.clone(),
            remote,
            connection,
        })
        .ok()?;
        Some(transport)
    }
}

#[async_trait]
impl SignalingClient for MockSignaling {
    async fn register(&self, credential: Option<Credential>) -> Result<Registration, SignalingError> {
        let mut state = self.state.lock();
        state.registrations.push(credential.clone());
        if state.fail_register {
            return Err(SignalingError::Request("injected register failure".into()));
        }
        let credential = credential.unwrap_or_else(|| {
            Credential::new(
                PeerId::new(format!("peer-{:016x}", rand::random::<u64>())),
                &rand::random::<[u8; 16]>(),
            )
        });
        let (tx, rx) = mpsc::unbounded_channel();
        state.answers_tx = Some(tx);
        Ok(Registration {
            credential,
            answers: rx,
        })
    }

    async fn create_offers(
        &self,
        topic: &Topic,
        _ttl: Duration,
        count: usize,
    ) -> Result<Vec<OfferId>, SignalingError> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(SignalingError::Request("injected create failure".into()));
        }
        let ids: Vec<OfferId> = (0..count)
            .map(|_| OfferId::new(format!("own-{}", self.next_offer.fetch_add(1, Ordering::SeqCst))))
            .collect();
        state
            .created
            .extend(ids.iter().map(|id| (topic.clone(), id.clone())));
        Ok(ids)
    }

    async fn cancel_offer(&self, offer: &OfferId) -> Result<(), SignalingError> {
        let mut state = self.state.lock();
        state.cancel_attempts.push(offer.clone());
        if state.fail_cancel.contains(offer) {
            return Err(SignalingError::UnknownOffer(offer.clone()));
        }
        Ok(())
    }

    async fn discover(
        &self,
        topics: &[Topic],
        limit: usize,
        exclude: &[u8],
    ) -> Result<Vec<Advertisement>, SignalingError> {
        let mut state = self.state.lock();
        state.discover_calls.push((topics.to_vec(), limit));
        if state.discover_failures > 0 {
            state.discover_failures -= 1;
            return Err(SignalingError::Request("injected discover failure".into()));
        }
        let seen = if exclude.is_empty() {
            None
        } else {
            Some(restore_filter(exclude).ok_or_else(|| {
                SignalingError::Request("unreadable exclusion filter".into())
            })?)
        };
        Ok(topics
            .iter()
            .filter_map(|t| state.ads.get(t))
            .flatten()
            .filter(|ad| !seen.as_ref().is_some_and(|f| f.test(ad.peer_id.as_bytes())))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn answer(
        &self,
        ad: &Advertisement,
        _transport: &TransportConfig,
    ) -> Result<Connection, SignalingError> {
        let plan = {
            let mut state = self.state.lock();
            state.answered.push(ad.peer_id.clone());
            state.plans.get(&ad.peer_id).cloned().unwrap_or_default()
        };

        if let AnswerPlan::Reject = plan {
            return Err(SignalingError::Request(format!("{} refused", ad.peer_id)));
        }
        if let AnswerPlan::Gated(gate) = &plan {
            gate.notified().await;
        }

        let (transport, connection) = MockTransport::pair(ad.peer_id.clone());
        self.state
            .lock()
            .transports
            .entry(ad.peer_id.clone())
            .or_default()
            .push(transport.clone());

        match plan {
            AnswerPlan::Open | AnswerPlan::Gated(_) => transport.emit(ConnectionEvent::Open),
            AnswerPlan::ErrorEvent => transport.emit(ConnectionEvent::Error("ice failed".into())),
            AnswerPlan::Pending | AnswerPlan::Reject => {}
        }
        Ok(connection)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Transfer client stand-in: emits resource events, collects peers.
pub struct MockEngine {
    tx: Mutex<mpsc::UnboundedSender<ResourceEvent>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ResourceEvent>>>,
    peers: Mutex<Vec<(Topic, PeerId)>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(Some(rx)),
            peers: Mutex::new(Vec::new()),
        })
    }

    pub fn add_resource(&self, topic: &str) {
        let _ = self.tx.lock().send(ResourceEvent::Added(Topic::new(topic)));
    }

    pub fn remove_resource(&self, topic: &str) {
        let _ = self.tx.lock().send(ResourceEvent::Removed(Topic::new(topic)));
    }

    /// Peers injected for `topic`, in arrival order.
    pub fn peers_for(&self, topic: &str) -> Vec<PeerId> {
        let topic = Topic::new(topic);
        self.peers
            .lock()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn injected(&self) -> usize {
        self.peers.lock().len()
    }
}

impl TransferEngine for MockEngine {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ResourceEvent> {
        if let Some(rx) = self.rx.lock().take() {
            return rx;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock() = tx;
        rx
    }

    fn add_peer(&self, topic: &Topic, peer: &PeerId, _transport: Arc<dyn PeerTransport>) {
        self.peers.lock().push((topic.clone(), peer.clone()));
    }
}
