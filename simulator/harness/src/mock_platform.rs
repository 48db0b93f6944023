//! Mock Paired-Device Platform
//!
//! Deterministic stand-in for the platform session primitive. Pairing,
//! installation and reachability are plain flags the test flips; activation
//! state is a `watch` snapshot plus an event on the same `broadcast` as
//! inbound traffic, so changes and messages keep their relative order. Two
//! mocks can be paired so that one side's sends arrive as the other side's
//! inbound events.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, trace};
use weightsync_core::{
    ActivationState, InboundMessage, Payload, PlatformConfig, PlatformError, PlatformEvent,
    ReplyHandle, SessionPlatform,
};

// ----------------------------------------------------------------------------
// Mock Platform Configuration
// ----------------------------------------------------------------------------

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockPlatformConfig {
    /// Capacity of the inbound event broadcast
    pub event_buffer_size: usize,
    /// Initial pairing flag
    pub paired: bool,
    /// Initial companion-app flag
    pub app_installed: bool,
    /// Initial reachability flag
    pub reachable: bool,
    /// Whether `activate()` moves the state to `Activated` by itself
    pub activate_on_request: bool,
    /// Simulated delay before an interactive message reaches the peer
    pub latency_ms: u64,
}

impl Default for MockPlatformConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 64,
            paired: true,
            app_installed: true,
            reachable: true,
            activate_on_request: false,
            latency_ms: 0,
        }
    }
}

impl MockPlatformConfig {
    /// Paired and reachable, activation granted on request
    pub fn ideal() -> Self {
        Self {
            activate_on_request: true,
            ..Self::default()
        }
    }

    /// No paired device
    pub fn unpaired() -> Self {
        Self {
            paired: false,
            app_installed: false,
            reachable: false,
            ..Self::default()
        }
    }

    /// Paired with the app installed, peer not live
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::default()
        }
    }

    /// Take the buffer size from the sync configuration
    pub fn from_platform_config(config: &PlatformConfig) -> Self {
        Self {
            event_buffer_size: config.event_buffer_size,
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MockPlatformStats {
    pub activations: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub messages_refused: AtomicU64,
    pub replies_received: AtomicU64,
    pub contexts_sent: AtomicU64,
    pub contexts_delivered: AtomicU64,
}

impl MockPlatformStats {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Mock Platform Implementation
// ----------------------------------------------------------------------------

struct Inner {
    config: MockPlatformConfig,
    state: watch::Sender<ActivationState>,
    events: broadcast::Sender<PlatformEvent>,
    paired: AtomicBool,
    app_installed: AtomicBool,
    reachable: AtomicBool,
    peer: OnceLock<Weak<Inner>>,
    sent: Mutex<Vec<Payload>>,
    contexts: Mutex<Vec<Payload>>,
    received_context: Mutex<Option<Payload>>,
    stats: MockPlatformStats,
}

/// Mock platform session for tests and the simulator
#[derive(Clone)]
pub struct MockPlatform {
    inner: Arc<Inner>,
}

impl MockPlatform {
    pub fn new(config: MockPlatformConfig) -> Self {
        let (state, _) = watch::channel(ActivationState::NotActivated);
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            inner: Arc::new(Inner {
                paired: AtomicBool::new(config.paired),
                app_installed: AtomicBool::new(config.app_installed),
                reachable: AtomicBool::new(config.reachable),
                config,
                state,
                events,
                peer: OnceLock::new(),
                sent: Mutex::new(Vec::new()),
                contexts: Mutex::new(Vec::new()),
                received_context: Mutex::new(None),
                stats: MockPlatformStats::default(),
            }),
        }
    }

    /// Two mocks wired to each other: the phone and the watch
    pub fn paired_pair(config: MockPlatformConfig) -> (Self, Self) {
        let phone = Self::new(config.clone());
        let watch = Self::new(config);
        let _ = phone.inner.peer.set(Arc::downgrade(&watch.inner));
        let _ = watch.inner.peer.set(Arc::downgrade(&phone.inner));
        (phone, watch)
    }

    pub fn config(&self) -> &MockPlatformConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &MockPlatformStats {
        &self.inner.stats
    }

    // ------------------------------------------------------------------------
    // Platform-side controls
    // ------------------------------------------------------------------------

    /// Publish an activation state change; repeated values are not re-notified
    pub fn set_activation_state(&self, next: ActivationState) {
        self.inner.set_activation_state(next);
    }

    pub fn set_paired(&self, paired: bool) {
        self.inner.paired.store(paired, Ordering::SeqCst);
    }

    pub fn set_app_installed(&self, installed: bool) {
        self.inner.app_installed.store(installed, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of live inbound subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// Inject an interactive message as if the peer sent it
    ///
    /// The returned receiver resolves with the local reply, or errors if every
    /// subscriber dropped the message without replying.
    pub fn deliver_message(&self, payload: Payload) -> oneshot::Receiver<Payload> {
        self.inner.deliver_message(payload)
    }

    /// Inject an application-context delivery as if the peer pushed it
    pub fn deliver_application_context(&self, payload: Payload) {
        self.inner.deliver_application_context(payload);
    }

    /// Every payload this side sent interactively, in order
    pub fn sent_messages(&self) -> Vec<Payload> {
        lock(&self.inner.sent).clone()
    }

    /// Every application context this side published, in order
    pub fn application_contexts(&self) -> Vec<Payload> {
        lock(&self.inner.contexts).clone()
    }

    /// Latest application context received from the peer
    pub fn received_application_context(&self) -> Option<Payload> {
        lock(&self.inner.received_context).clone()
    }

    fn peer(&self) -> Option<Arc<Inner>> {
        self.inner.peer.get().and_then(Weak::upgrade)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new(MockPlatformConfig::default())
    }
}

impl Inner {
    fn set_activation_state(&self, next: ActivationState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "mock activation state changed");
            let _ = self.events.send(PlatformEvent::ActivationChanged(next));
        }
    }

    fn deliver_message(&self, payload: Payload) -> oneshot::Receiver<Payload> {
        let (reply, receiver) = ReplyHandle::channel();
        let event = PlatformEvent::Message(InboundMessage { payload, reply });
        match self.events.send(event) {
            Ok(subscribers) => {
                self.stats.messages_delivered.fetch_add(1, Ordering::Relaxed);
                trace!(subscribers, "mock message delivered");
            }
            Err(_) => debug!("mock message delivered with no subscribers"),
        }
        receiver
    }

    fn deliver_application_context(&self, payload: Payload) {
        *lock(&self.received_context) = Some(payload.clone());
        if self
            .events
            .send(PlatformEvent::ApplicationContext(payload))
            .is_ok()
        {
            self.stats.contexts_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("mock application context delivered with no subscribers");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl SessionPlatform for MockPlatform {
    fn activate(&self) {
        self.inner.stats.activations.fetch_add(1, Ordering::Relaxed);
        if self.inner.config.activate_on_request {
            self.inner.set_activation_state(ActivationState::Activated);
        }
    }

    fn activation_state(&self) -> watch::Receiver<ActivationState> {
        self.inner.state.subscribe()
    }

    fn is_paired(&self) -> bool {
        self.inner.paired.load(Ordering::SeqCst)
    }

    fn is_app_installed(&self) -> bool {
        self.inner.app_installed.load(Ordering::SeqCst)
    }

    fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    async fn send_message(&self, payload: Payload) -> Result<Payload, PlatformError> {
        if !self.is_reachable() {
            self.inner.stats.messages_refused.fetch_add(1, Ordering::Relaxed);
            return Err(PlatformError::NotReachable);
        }

        lock(&self.inner.sent).push(payload.clone());
        self.inner.stats.messages_sent.fetch_add(1, Ordering::Relaxed);

        if self.inner.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.inner.config.latency_ms)).await;
        }

        let Some(peer) = self.peer() else {
            // Unwired mock: the platform acknowledges on the peer's behalf
            self.inner.stats.replies_received.fetch_add(1, Ordering::Relaxed);
            return Ok(Payload::acknowledgment());
        };

        let reply = peer.deliver_message(payload);
        match reply.await {
            Ok(reply) => {
                self.inner.stats.replies_received.fetch_add(1, Ordering::Relaxed);
                Ok(reply)
            }
            Err(_) => Err(PlatformError::ReplyDropped),
        }
    }

    fn update_application_context(&self, payload: Payload) -> Result<(), PlatformError> {
        if !self.is_paired() || !self.is_app_installed() {
            return Err(PlatformError::Rejected {
                reason: "no paired companion app".to_string(),
            });
        }

        lock(&self.inner.contexts).push(payload.clone());
        self.inner.stats.contexts_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(peer) = self.peer() {
            peer.deliver_application_context(payload);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.inner.events.subscribe()
    }
}

impl fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPlatform")
            .field("state", &*self.inner.state.borrow())
            .field("paired", &self.is_paired())
            .field("app_installed", &self.is_app_installed())
            .field("reachable", &self.is_reachable())
            .field("wired", &self.peer().is_some())
            .finish()
    }
}
