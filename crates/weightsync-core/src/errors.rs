//! Error types for weight sync
//!
//! This module contains the error taxonomy shared by the store, the transfer
//! protocol and the connectivity session, and the `SyncError` type that
//! unifies them.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Link-state errors raised when a session handle is requested
///
/// Both variants are recoverable: callers wait for the link to become usable
/// and try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    /// Device not paired, or the companion app is not installed
    #[error("No valid session: device not paired or companion app missing")]
    NoValidSession,
    /// Paired, but the companion app is not currently live
    #[error("No reachable session: paired device is not currently reachable")]
    NoReachableSession,
}

/// Errors reported by the paired-device platform primitive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Peer is not reachable")]
    NotReachable,
    #[error("Peer dropped the message without replying")]
    ReplyDropped,
    #[error("No reply from peer after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Platform rejected the request: {reason}")]
    Rejected { reason: String },
}

/// Errors from the typed object transfer protocol
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("Failed to encode payload for key {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode payload for key {key}: {source}")]
    Decode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Routing key {key} already registered by {existing}, cannot register {incoming}")]
    RoutingKeyCollision {
        key: &'static str,
        existing: &'static str,
        incoming: &'static str,
    },
}

impl TransferError {
    /// Whether a send that failed with this error may succeed later or over
    /// the context-update path
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            TransferError::Connectivity(_) | TransferError::Platform(_)
        )
    }

    /// The connectivity error this transfer error wraps, if any
    pub fn connectivity(&self) -> Option<ConnectivityError> {
        match self {
            TransferError::Connectivity(err) => Some(*err),
            _ => None,
        }
    }
}

/// Errors from the local settings store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to encode stored weights: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Weight {weight} cannot be stored losslessly")]
    NonFiniteWeight { weight: f64 },

    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Top-level error for weight sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Internal task or channel failure
    #[error("Channel error: {message}")]
    Channel { message: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl SyncError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        SyncError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SyncError::Config(ConfigError::Invalid {
            reason: reason.into(),
        })
    }
}

impl StoreError {
    /// Create an unavailable-store error with a reason
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }
}

impl ConfigError {
    /// Create an invalid-configuration error with a reason
    pub fn invalid<T: Into<String>>(reason: T) -> Self {
        ConfigError::Invalid {
            reason: reason.into(),
        }
    }
}

/// Result alias for weight sync operations
pub type SyncResult<T> = core::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_classification() {
        let err = TransferError::from(ConnectivityError::NoReachableSession);
        assert!(err.is_link_failure());
        assert_eq!(err.connectivity(), Some(ConnectivityError::NoReachableSession));

        let err = TransferError::from(PlatformError::ReplyDropped);
        assert!(err.is_link_failure());
        assert_eq!(err.connectivity(), None);

        let err = TransferError::RoutingKeyCollision {
            key: "Weight",
            existing: "A",
            incoming: "B",
        };
        assert!(!err.is_link_failure());
    }

    #[test]
    fn test_sync_error_conversions() {
        let err: SyncError = ConnectivityError::NoValidSession.into();
        assert!(matches!(
            err,
            SyncError::Connectivity(ConnectivityError::NoValidSession)
        ));

        let err = SyncError::config_error("empty key");
        assert!(err.to_string().contains("empty key"));
    }
}
