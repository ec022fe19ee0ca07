//! RendezvousManager — the host-facing entry point.
//!
//! Registers with the signaling service, then runs two listener tasks: one
//! follows the transfer engine's resource events, the other accepts answers
//! to our offers. Both stop on the shutdown broadcast sent by `destroy`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use swarmlink_core::{bloom_factory, Credential, FilterFactory, PeerId, RendezvousConfig, Topic};

use crate::connector;
use crate::context::Shared;
use crate::engine::{ResourceEvent, TransferEngine};
use crate::scheduler::{self, PassOutcome};
use crate::signaling::{InboundAnswer, Registration, SignalingClient};

/// Snapshot of discovery state for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub active_resources: usize,
    pub own_id: Option<PeerId>,
    pub server_address: String,
    pub active_timers: usize,
    pub resources: Vec<ResourceStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub resource_id: Topic,
    /// Connected peers.
    pub peer_count: usize,
    /// Peers discovered or still handshaking.
    pub connecting: usize,
    /// Our own offers currently published.
    pub offers: usize,
}

pub struct RendezvousManager {
    /// `None` when registration failed.
    shared: Option<Arc<Shared>>,
    credential: Option<Credential>,
    server_address: String,
    shutdown: broadcast::Sender<()>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl RendezvousManager {
    /// Register and start listening, with Bloom filters sized from config.
    ///
    /// Without a `credential` the one at `identity.credential_path` is tried.
    /// If registration fails the manager is inert: every operation is a
    /// no-op and [`is_active`](Self::is_active) reports false.
    pub async fn start(
        config: RendezvousConfig,
        signaling: Arc<dyn SignalingClient>,
        engine: Arc<dyn TransferEngine>,
        credential: Option<Credential>,
    ) -> Self {
        let filters = bloom_factory(&config.dedup);
        Self::start_with_filters(config, signaling, engine, credential, filters).await
    }

    pub async fn start_with_filters(
        config: RendezvousConfig,
        signaling: Arc<dyn SignalingClient>,
        engine: Arc<dyn TransferEngine>,
        credential: Option<Credential>,
        filters: FilterFactory,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let server_address = config.server.address.clone();
        let presented = credential.or_else(|| load_credential(&config));

        let Registration {
            credential,
            answers,
        } = match signaling.register(presented).await {
            Ok(registration) => registration,
            Err(e) => {
                tracing::error!(
                    server = %server_address,
                    error = %e,
                    "signaling registration failed, discovery disabled"
                );
                return Self {
                    shared: None,
                    credential: None,
                    server_address,
                    shutdown,
                    listeners: Mutex::new(Vec::new()),
                    destroyed: AtomicBool::new(false),
                };
            }
        };

        persist_credential(&config, &credential);
        let own_id = credential.peer_id.clone();
        tracing::info!(peer = own_id.short(), server = %server_address, "registered with signaling service");

        let events = engine.subscribe();
        let shared = Arc::new(Shared::new(config, own_id, signaling, engine, filters));
        let listeners = vec![
            tokio::spawn(resource_loop(shared.clone(), events, shutdown.subscribe())),
            tokio::spawn(answer_loop(shared.clone(), answers, shutdown.subscribe())),
        ];

        Self {
            shared: Some(shared),
            credential: Some(credential),
            server_address,
            shutdown,
            listeners: Mutex::new(listeners),
            destroyed: AtomicBool::new(false),
        }
    }

    fn live(&self) -> Option<&Arc<Shared>> {
        if self.destroyed.load(Ordering::Acquire) {
            return None;
        }
        self.shared.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.live().is_some()
    }

    pub fn own_id(&self) -> Option<&PeerId> {
        self.credential.as_ref().map(|c| &c.peer_id)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Start discovery for a topic. Returns false if it was already tracked
    /// or the manager is not active.
    pub fn add_resource(&self, topic: impl Into<Topic>) -> bool {
        let topic = topic.into();
        match self.live() {
            Some(shared) => shared.add_resource(topic),
            None => {
                tracing::debug!(topic = %topic, "manager inactive, ignoring resource");
                false
            }
        }
    }

    /// Stop discovery for a topic and release everything it holds.
    pub async fn remove_resource(&self, topic: impl Into<Topic>) -> bool {
        let topic = topic.into();
        match &self.shared {
            Some(shared) => shared.remove_resource(&topic).await,
            None => false,
        }
    }

    /// Connected peers for a topic; 0 when it is not tracked.
    pub fn peer_count(&self, topic: impl Into<Topic>) -> usize {
        let topic = topic.into();
        self.shared
            .as_ref()
            .and_then(|s| s.registry.peer_count(&topic))
            .unwrap_or(0)
    }

    pub fn list_resources(&self) -> Vec<Topic> {
        self.shared
            .as_ref()
            .map(|s| s.registry.list())
            .unwrap_or_default()
    }

    /// Run a discovery pass now instead of waiting for the next tick.
    pub async fn discover_peers(&self, topic: impl Into<Topic>) -> Option<PassOutcome> {
        let topic = topic.into();
        let shared = self.live()?;
        let Some(resource) = shared.registry.get(&topic) else {
            tracing::info!(topic = %topic, "discover requested for unknown resource");
            return None;
        };
        Some(scheduler::run_pass(shared, &resource).await)
    }

    pub async fn stats(&self) -> Stats {
        let Some(shared) = &self.shared else {
            return Stats {
                active_resources: 0,
                own_id: None,
                server_address: self.server_address.clone(),
                active_timers: 0,
                resources: Vec::new(),
            };
        };

        let mut resources = Vec::new();
        for resource in shared.registry.snapshot() {
            let (peer_count, connecting) = {
                let state = resource.lock();
                (state.peers.connected(), state.peers.pending())
            };
            resources.push(ResourceStats {
                resource_id: resource.topic().clone(),
                peer_count,
                connecting,
                offers: shared.offers.tracked(resource.topic()).await,
            });
        }

        Stats {
            active_resources: resources.len(),
            own_id: Some(shared.own_id.clone()),
            server_address: self.server_address.clone(),
            active_timers: shared.live_timers.load(Ordering::SeqCst),
            resources,
        }
    }

    /// Stop listening and tear down every resource. Safe to call twice.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(());

        let listeners = std::mem::take(&mut *self.listeners.lock());
        for handle in listeners {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "listener task failed");
            }
        }

        let Some(shared) = &self.shared else {
            return;
        };
        let topics = shared.registry.list();
        for topic in &topics {
            shared.remove_resource(topic).await;
        }
        tracing::info!(resources = topics.len(), "rendezvous manager destroyed");
    }
}

async fn resource_loop(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<ResourceEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("resource listener shutting down");
                return;
            }
            event = events.recv() => {
                match event {
                    Some(ResourceEvent::Added(topic)) => {
                        shared.add_resource(topic);
                    }
                    Some(ResourceEvent::Removed(topic)) => {
                        shared.remove_resource(&topic).await;
                    }
                    None => {
                        tracing::info!("engine event stream closed");
                        return;
                    }
                }
            }
        }
    }
}

async fn answer_loop(
    shared: Arc<Shared>,
    mut answers: mpsc::UnboundedReceiver<InboundAnswer>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("answer listener shutting down");
                return;
            }
            answer = answers.recv() => {
                match answer {
                    Some(answer) => {
                        tokio::spawn(connector::accept_inbound(shared.clone(), answer));
                    }
                    None => {
                        tracing::info!("signaling answer stream closed");
                        return;
                    }
                }
            }
        }
    }
}

fn load_credential(config: &RendezvousConfig) -> Option<Credential> {
    let path = config.identity.credential_path.as_deref()?;
    match Credential::load(path) {
        Ok(credential) => credential,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable credential");
            None
        }
    }
}

fn persist_credential(config: &RendezvousConfig, credential: &Credential) {
    let Some(path) = config.identity.credential_path.as_deref() else {
        return;
    };
    if let Err(e) = credential.save(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to persist credential");
    }
}
