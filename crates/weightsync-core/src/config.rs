//! Centralized Configuration Management
//!
//! This module consolidates the configuration structures used by the store,
//! the transfer channel, the connectivity session and the platform adapters.
//! All sections carry serde defaults so a partial TOML file is enough.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Settings key the weight log is persisted under
pub const DEFAULT_WEIGHTS_KEY: &str = "StoredWeights";

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// Configuration for the local weight store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Settings key holding the JSON-encoded weight log
    pub weights_key: String,
    /// Directory for file-backed settings (None = in-memory settings)
    pub settings_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            weights_key: DEFAULT_WEIGHTS_KEY.to_string(),
            settings_dir: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// How inbound payload keys that no registered transfer type claims are logged
///
/// Either way the payload is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyPolicy {
    /// Drop quietly (trace level)
    #[default]
    Ignore,
    /// Drop and emit a warning
    Warn,
}

/// Configuration for the typed object transfer channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Upper bound on waiting for the peer's reply to an interactive message
    pub reply_timeout_ms: u64,
    /// Logging policy for inbound keys no transfer type is registered for
    pub unknown_key_policy: UnknownKeyPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 10_000, // platform interactive messages time out well before this
            unknown_key_policy: UnknownKeyPolicy::Ignore,
        }
    }
}

impl ChannelConfig {
    /// Reply timeout as a duration
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            reply_timeout_ms: 1_000,
            unknown_key_policy: UnknownKeyPolicy::Warn,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration for session lifecycle and send policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Request activation when the coordinator starts
    pub activate_on_start: bool,
    /// Fall back to an application-context update when an interactive send fails
    pub context_fallback: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            activate_on_start: true,
            context_fallback: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Platform Configuration
// ----------------------------------------------------------------------------

/// Configuration for platform adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Buffer size for the inbound event broadcast (Platform → subscribers)
    pub event_buffer_size: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for one device's sync stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub store: StoreConfig,
    pub channel: ChannelConfig,
    pub session: SessionConfig,
    pub platform: PlatformConfig,
}

impl SyncConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            store: StoreConfig::default(),
            channel: ChannelConfig::testing(),
            session: SessionConfig::default(),
            platform: PlatformConfig {
                event_buffer_size: 256,
            },
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check invariants the rest of the stack relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.weights_key.trim().is_empty() {
            return Err(ConfigError::invalid("store.weights_key must not be empty"));
        }
        if self.channel.reply_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "channel.reply_timeout_ms must be greater than zero",
            ));
        }
        if self.platform.event_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "platform.event_buffer_size must be greater than zero",
            ));
        }
        Ok(())
    }
}
