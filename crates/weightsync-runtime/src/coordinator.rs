//! Sync Coordinator
//!
//! Drains inbound weight records into the local store while the link is
//! usable and republishes the full list after every append.

use std::fmt;
use std::sync::Arc;

use futures::stream::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use weightsync_core::{
    LocalStore, PlatformEvent, SessionConfig, SyncError, SyncResult, WeightRecord,
};

use crate::channel::ObjectTransferChannel;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No usable link, nothing is forwarded
    #[default]
    Idle,
    /// Link usable, inbound records are persisted
    Draining,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Draining => write!(f, "draining"),
        }
    }
}

// ----------------------------------------------------------------------------
// Coordinator
// ----------------------------------------------------------------------------

pub struct SyncCoordinator {
    channel: ObjectTransferChannel,
    store: Arc<LocalStore>,
    config: SessionConfig,
    weights: watch::Sender<Vec<WeightRecord>>,
    state: watch::Sender<SyncState>,
}

impl SyncCoordinator {
    /// Create a coordinator; the weight list starts as the store's contents
    pub fn new(channel: ObjectTransferChannel, store: Arc<LocalStore>) -> Self {
        let (weights, _) = watch::channel(store.load_all());
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            channel,
            store,
            config: SessionConfig::default(),
            weights,
            state,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Latest stored weight list, replayed to new subscribers
    pub fn weights(&self) -> watch::Receiver<Vec<WeightRecord>> {
        self.weights.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn channel(&self) -> &ObjectTransferChannel {
        &self.channel
    }

    /// Run until the platform's event source closes
    ///
    /// Activation changes and inbound deliveries are handled strictly in the
    /// order the platform delivered them. Deliveries that arrive while idle
    /// are not forwarded and interactive ones go unanswered.
    pub async fn run(&self) {
        let session = self.channel.session();

        // Subscribe before the snapshot and before activating so no change is
        // missed
        let mut events = session.inbound_events();
        self.link_changed(session.activation_state().is_activated());
        if self.config.activate_on_start {
            session.activate();
        }

        while let Some(event) = events.next().await {
            match event {
                PlatformEvent::ActivationChanged(state) => self.link_changed(state.is_activated()),
                event if self.is_draining() => {
                    if let Some(record) = self.channel.accept::<WeightRecord>(event) {
                        self.persist(record);
                    }
                }
                _ => trace!("inbound delivery while idle, not forwarded"),
            }
        }

        info!("platform event source closed, coordinator stopping");
        self.transition(SyncState::Idle);
    }

    /// Spawn onto the current tokio runtime
    pub fn spawn(self) -> CoordinatorHandle {
        let weights = self.weights();
        let state = self.state();
        let task = tokio::spawn(async move { self.run().await });
        CoordinatorHandle {
            weights,
            state,
            task,
        }
    }

    fn persist(&self, record: WeightRecord) {
        debug!(weight = record.weight(), time = %record.time(), "weight record received");
        self.store.append(record);
        self.weights.send_replace(self.store.load_all());
    }

    fn is_draining(&self) -> bool {
        *self.state.borrow() == SyncState::Draining
    }

    fn link_changed(&self, usable: bool) {
        debug!(usable, "link usability changed");
        if usable {
            self.transition(SyncState::Draining);
        } else {
            self.transition(SyncState::Idle);
        }
    }

    fn transition(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "sync state changed");
        }
    }
}

impl fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("state", &*self.state.borrow())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Coordinator Handle
// ----------------------------------------------------------------------------

/// Handle to a spawned coordinator
#[derive(Debug)]
pub struct CoordinatorHandle {
    weights: watch::Receiver<Vec<WeightRecord>>,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn weights(&self) -> watch::Receiver<Vec<WeightRecord>> {
        self.weights.clone()
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the coordinator to stop on its own
    pub async fn wait(self) -> SyncResult<()> {
        self.task
            .await
            .map_err(|e| SyncError::channel_error(format!("coordinator task failed: {}", e)))
    }

    /// Stop the coordinator, dropping any inbound subscription
    pub async fn shutdown(self) -> SyncResult<()> {
        info!("shutting down sync coordinator");
        self.task.abort();
        match self.task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(SyncError::channel_error(format!(
                "coordinator task failed: {}",
                e
            ))),
        }
    }
}
