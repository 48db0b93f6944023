//! Data-Driven Scenario Configuration
//!
//! Scenarios are TOML files describing a phone/watch pair, a sequence of link
//! changes and weight entries, and the checks to run once the sequence ends.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weightsync_core::ActivationState;

// ----------------------------------------------------------------------------
// Core Scenario Configuration
// ----------------------------------------------------------------------------

/// Complete scenario loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub metadata: ScenarioMetadata,
    /// Initial link flags for both devices
    #[serde(default)]
    pub link: LinkSetup,
    pub sequence: Vec<TestStep>,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub name: String,
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pause after each step so the coordinator can catch up
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_settle_ms() -> u64 {
    20
}

/// Which side of the pair an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Phone,
    Watch,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Phone => write!(f, "phone"),
            Device::Watch => write!(f, "watch"),
        }
    }
}

/// Initial platform flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSetup {
    pub paired: bool,
    pub reachable: bool,
    /// Whether the platform grants activation as soon as it is requested
    pub auto_activate: bool,
}

impl Default for LinkSetup {
    fn default() -> Self {
        Self {
            paired: true,
            reachable: true,
            auto_activate: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Test Sequence Definition
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    pub name: String,
    #[serde(flatten)]
    pub action: TestAction,
}

/// Actions a step can perform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestAction {
    /// Platform reports a new activation state
    SetActivation {
        device: Device,
        state: ActivationState,
    },
    SetReachable {
        device: Device,
        reachable: bool,
    },
    /// Pairing and companion-app installation together
    SetPaired {
        device: Device,
        paired: bool,
    },
    /// Watch enters a weight and sends it to the phone
    SendWeight {
        weight: f64,
        #[serde(default)]
        time: Option<DateTime<Utc>>,
    },
    /// Watch publishes a weight as application context only
    UpdateContext {
        weight: f64,
        #[serde(default)]
        time: Option<DateTime<Utc>>,
    },
    /// Raw interactive message delivered to the phone
    DeliverRaw {
        key: String,
        body: String,
    },
    Wait {
        duration_ms: u64,
    },
    LogCheckpoint {
        message: String,
    },
}

// ----------------------------------------------------------------------------
// Validation Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub final_checks: Vec<ValidationCheck>,
}

/// Outcome of a send step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Message,
    ApplicationContext,
    NoValidSession,
    NoReachableSession,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationCheck {
    /// Phone store holds exactly these weights, in order
    StoredWeights { expected: Vec<f64> },
    StoredCount { expected_count: usize },
    /// Whether the phone coordinator is draining
    SyncState { draining: bool },
    /// How a named send step was delivered
    Delivery {
        step: String,
        expected: DeliveryOutcome,
    },
    /// Application contexts published by the watch
    ContextsSent { expected_count: usize },
}

impl ScenarioConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: ScenarioConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading scenario {}", path.display()))
    }

    /// Check step names and references before anything runs
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sequence.is_empty() {
            bail!("Scenario '{}' has no steps", self.metadata.name);
        }

        let mut names = HashSet::new();
        for step in &self.sequence {
            if !names.insert(step.name.as_str()) {
                bail!("Duplicate step name: {}", step.name);
            }
            match &step.action {
                TestAction::SendWeight { weight, .. } | TestAction::UpdateContext { weight, .. }
                    if !weight.is_finite() =>
                {
                    bail!("Step '{}' has a non-finite weight", step.name);
                }
                _ => {}
            }
        }

        for check in &self.validation.final_checks {
            if let ValidationCheck::Delivery { step, .. } = check {
                let is_send = self.sequence.iter().any(|s| {
                    s.name == *step && matches!(s.action, TestAction::SendWeight { .. })
                });
                if !is_send {
                    bail!("Delivery check references unknown send step '{}'", step);
                }
            }
        }
        Ok(())
    }
}
