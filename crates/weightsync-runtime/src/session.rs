//! Connectivity Session
//!
//! Adapts the platform's pairwise session into an observable link: a
//! replay-latest "link usable" stream, derived link tiers, checked session
//! handles, and the raw inbound message stream.

use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace, warn};
use weightsync_core::{
    ActivationState, ConnectivityError, InboundMessage, Payload, PlatformError, PlatformEvent,
    SessionPlatform,
};

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Link quality tiers, derived from platform flags on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkState {
    /// No pairing capability on this device
    Unsupported,
    Unpaired,
    /// Paired, companion app absent
    AppNotInstalled,
    /// Valid session; context updates allowed
    Paired,
    /// Valid and live; interactive messaging allowed
    Reachable,
}

impl LinkState {
    pub fn permits_messaging(&self) -> bool {
        matches!(self, LinkState::Reachable)
    }

    pub fn permits_context_update(&self) -> bool {
        matches!(self, LinkState::Paired | LinkState::Reachable)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Unsupported => write!(f, "unsupported"),
            LinkState::Unpaired => write!(f, "unpaired"),
            LinkState::AppNotInstalled => write!(f, "app-not-installed"),
            LinkState::Paired => write!(f, "paired"),
            LinkState::Reachable => write!(f, "reachable"),
        }
    }
}

// ----------------------------------------------------------------------------
// Session Handles
// ----------------------------------------------------------------------------

/// Proof that the device was paired with the companion app installed when the
/// handle was taken
#[derive(Clone)]
pub struct SessionHandle {
    platform: Arc<dyn SessionPlatform>,
}

impl SessionHandle {
    /// Replace the latest application context (last value wins)
    pub fn update_application_context(&self, payload: Payload) -> Result<(), PlatformError> {
        self.platform.update_application_context(payload)
    }

    /// Upgrade to a reachable handle if the peer is live right now
    pub fn into_reachable(self) -> Result<ReachableSession, ConnectivityError> {
        if self.platform.is_reachable() {
            Ok(ReachableSession {
                platform: self.platform,
            })
        } else {
            Err(ConnectivityError::NoReachableSession)
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

/// A valid session whose peer was reachable when the handle was taken
#[derive(Clone)]
pub struct ReachableSession {
    platform: Arc<dyn SessionPlatform>,
}

impl ReachableSession {
    /// Send an interactive message and wait for the peer's reply
    pub async fn send_message(&self, payload: Payload) -> Result<Payload, PlatformError> {
        self.platform.send_message(payload).await
    }

    pub fn update_application_context(&self, payload: Payload) -> Result<(), PlatformError> {
        self.platform.update_application_context(payload)
    }
}

impl fmt::Debug for ReachableSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachableSession").finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Connectivity Session
// ----------------------------------------------------------------------------

/// Observable wrapper around the process-wide platform session
#[derive(Clone)]
pub struct ConnectivitySession {
    platform: Option<Arc<dyn SessionPlatform>>,
}

impl ConnectivitySession {
    /// Wrap the platform session acquired at startup
    pub fn new(platform: Arc<dyn SessionPlatform>) -> Self {
        Self {
            platform: Some(platform),
        }
    }

    /// Session for a device without pairing capability
    pub fn unsupported() -> Self {
        Self { platform: None }
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_some()
    }

    /// Ask the platform to establish or resume the session; results arrive on
    /// `link_usable_stream`
    pub fn activate(&self) {
        match &self.platform {
            Some(platform) => {
                debug!("requesting session activation");
                platform.activate();
            }
            None => trace!("activation requested on unsupported device"),
        }
    }

    /// Current activation state snapshot
    pub fn activation_state(&self) -> ActivationState {
        let Some(platform) = &self.platform else {
            return ActivationState::NotActivated;
        };
        *platform.activation_state().borrow()
    }

    /// Current link tier snapshot
    pub fn link_state(&self) -> LinkState {
        let Some(platform) = &self.platform else {
            return LinkState::Unsupported;
        };
        if !platform.is_paired() {
            LinkState::Unpaired
        } else if !platform.is_app_installed() {
            LinkState::AppNotInstalled
        } else if !platform.is_reachable() {
            LinkState::Paired
        } else {
            LinkState::Reachable
        }
    }

    /// Whether the link is usable, starting with the current value and then
    /// once per activation-state notification
    ///
    /// Derived from activation only; reachability is not consulted. A quick
    /// usable/unusable flap yields both values.
    pub fn link_usable_stream(&self) -> BoxStream<'static, bool> {
        if !self.is_supported() {
            return stream::once(future::ready(false))
                .chain(stream::pending())
                .boxed();
        }

        // Subscribe before the snapshot so no change falls in between
        let changes = self.inbound_events();
        let current = self.activation_state().is_activated();
        stream::once(future::ready(current))
            .chain(changes.filter_map(|event| async move {
                match event {
                    PlatformEvent::ActivationChanged(state) => {
                        trace!(%state, "activation state observed");
                        Some(state.is_activated())
                    }
                    _ => None,
                }
            }))
            .boxed()
    }

    /// Handle requiring a paired device with the companion app installed
    pub fn current_session_handle(&self) -> Result<SessionHandle, ConnectivityError> {
        match &self.platform {
            Some(platform) if self.link_state().permits_context_update() => Ok(SessionHandle {
                platform: Arc::clone(platform),
            }),
            _ => Err(ConnectivityError::NoValidSession),
        }
    }

    /// Handle additionally requiring the peer to be reachable
    pub fn current_reachable_handle(&self) -> Result<ReachableSession, ConnectivityError> {
        let handle = self.current_session_handle()?;
        if self.link_state().permits_messaging() {
            handle.into_reachable()
        } else {
            Err(ConnectivityError::NoReachableSession)
        }
    }

    /// Every platform event, activation changes included, in delivery order
    ///
    /// The subscription is taken when this is called, not on first poll.
    pub fn inbound_events(&self) -> BoxStream<'static, PlatformEvent> {
        let Some(platform) = &self.platform else {
            return stream::pending().boxed();
        };

        let receiver = platform.subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "inbound subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("inbound event source closed");
                        return None;
                    }
                }
            }
        })
        .boxed()
    }

    /// Every raw interactive message from the peer; each carries a reply handle
    /// that must be used
    pub fn inbound_messages(&self) -> BoxStream<'static, InboundMessage> {
        self.inbound_events()
            .filter_map(|event| async move {
                match event {
                    PlatformEvent::Message(message) => Some(message),
                    _ => None,
                }
            })
            .boxed()
    }
}

impl fmt::Debug for ConnectivitySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivitySession")
            .field("supported", &self.is_supported())
            .field("link_state", &self.link_state())
            .finish()
    }
}
