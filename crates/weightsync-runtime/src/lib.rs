//! Weight Sync Runtime
//!
//! Async orchestration on top of `weightsync-core`: the connectivity session
//! adapter, the typed object transfer channel, and the coordinator that
//! drains inbound weight records into the local store.
//!
//! ## Architecture
//!
//! ```text
//! SessionPlatform ──► ConnectivitySession ──► ObjectTransferChannel ──► SyncCoordinator
//!   (watch/broadcast)    (link stream,          (routing key,             (idle/draining,
//!                         handles)               ack, decode)              store, republish)
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod channel;
pub mod coordinator;
pub mod session;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::{create_test_node, SyncBuilder, SyncNode};
pub use channel::{default_registry, Delivery, ObjectTransferChannel};
pub use coordinator::{CoordinatorHandle, SyncCoordinator, SyncState};
pub use session::{ConnectivitySession, LinkState, ReachableSession, SessionHandle};

pub use weightsync_core::{
    ConnectivityError, LocalStore, Payload, SyncConfig, SyncError, SyncResult, TransferError,
    TransferObject, WeightRecord,
};
