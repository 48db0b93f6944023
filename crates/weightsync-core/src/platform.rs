//! Paired-Device Platform Capability
//!
//! The platform session primitive is consumed, never redesigned. This module
//! describes the capabilities the sync stack needs from it as a trait so the
//! real platform binding and the test harness are interchangeable.
//!
//! Notifications are exposed as channel producers rather than delegate
//! callbacks: activation state is a replay-latest `watch` for snapshots, and
//! every notification (activation changes included) is a discrete event on one
//! multicast `broadcast`, in the order the platform delivered it.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot, watch};

use crate::errors::PlatformError;
use crate::transfer::Payload;

// ----------------------------------------------------------------------------
// Activation State
// ----------------------------------------------------------------------------

/// Session activation as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    #[default]
    NotActivated,
    Inactive,
    Activated,
}

impl ActivationState {
    pub fn is_activated(&self) -> bool {
        matches!(self, ActivationState::Activated)
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationState::NotActivated => write!(f, "not-activated"),
            ActivationState::Inactive => write!(f, "inactive"),
            ActivationState::Activated => write!(f, "activated"),
        }
    }
}

// ----------------------------------------------------------------------------
// Reply Handle
// ----------------------------------------------------------------------------

/// One-shot reply callback attached to an inbound interactive message
///
/// Cloneable so every subscriber of the inbound broadcast sees it; only the
/// first `reply` reaches the peer.
#[derive(Clone)]
pub struct ReplyHandle {
    sender: Arc<Mutex<Option<oneshot::Sender<Payload>>>>,
}

impl ReplyHandle {
    /// Create a handle and the receiver the sending side waits on
    pub fn channel() -> (Self, oneshot::Receiver<Payload>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
            receiver,
        )
    }

    /// Send the reply. Returns false if a reply was already sent or the peer
    /// stopped waiting.
    pub fn reply(&self, payload: Payload) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => sender.send(payload).is_ok(),
            None => false,
        }
    }

    pub fn is_replied(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("replied", &self.is_replied())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Inbound Events
// ----------------------------------------------------------------------------

/// An interactive message from the peer; the peer blocks until `reply` is used
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Payload,
    pub reply: ReplyHandle,
}

/// Discrete notifications delivered in platform order
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// Activation state changed; one event per change
    ActivationChanged(ActivationState),
    /// Interactive message expecting a reply
    Message(InboundMessage),
    /// Latest application context pushed by the peer (no reply)
    ApplicationContext(Payload),
}

// ----------------------------------------------------------------------------
// Platform Trait
// ----------------------------------------------------------------------------

/// Capabilities of the platform's pairwise session primitive
///
/// Implementations are process-wide: acquired once at startup and shared as
/// `Arc<dyn SessionPlatform>`.
#[async_trait]
pub trait SessionPlatform: Send + Sync {
    /// Request that the platform establish or resume the session
    fn activate(&self);

    /// Activation state, replaying the latest value to new subscribers
    ///
    /// Use for snapshots only; changes in between polls coalesce. Ordered
    /// per-change notifications arrive on `subscribe`.
    fn activation_state(&self) -> watch::Receiver<ActivationState>;

    fn is_paired(&self) -> bool;

    fn is_app_installed(&self) -> bool;

    fn is_reachable(&self) -> bool;

    /// Send an interactive message and wait for the peer's reply
    async fn send_message(&self, payload: Payload) -> Result<Payload, PlatformError>;

    /// Replace the latest application context (last value wins, no reply)
    fn update_application_context(&self, payload: Payload) -> Result<(), PlatformError>;

    /// Subscribe to activation changes, inbound messages and context
    /// deliveries as one ordered event sequence
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;
}
