//! Weight Sync Core
//!
//! This crate provides the foundational types for moving weight measurements
//! between a phone and its paired watch: the `WeightRecord` entity, the typed
//! `TransferObject` protocol over string-keyed payloads, the `SessionPlatform`
//! capability the link is adapted from, and the append-only `LocalStore`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod platform;
pub mod record;
pub mod store;
pub mod transfer;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    ChannelConfig, PlatformConfig, SessionConfig, StoreConfig, SyncConfig, UnknownKeyPolicy,
    DEFAULT_WEIGHTS_KEY,
};
pub use errors::{
    ConfigError, ConnectivityError, PlatformError, StoreError, SyncError, SyncResult,
    TransferError,
};
pub use platform::{ActivationState, InboundMessage, PlatformEvent, ReplyHandle, SessionPlatform};
pub use record::WeightRecord;
pub use store::{FileSettings, LocalStore, MemorySettings, SettingsStore};
pub use transfer::{Payload, RouteStatus, TransferObject, TransferRegistry, ACK_KEY};
