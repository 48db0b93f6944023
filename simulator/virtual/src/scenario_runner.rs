//! Scenario Runner
//!
//! Wires a mock phone/watch pair, runs the phone's sync coordinator, plays the
//! scenario's steps against it and evaluates the final checks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use weightsync_core::{ConnectivityError, Payload, SyncConfig, TransferError, WeightRecord};
use weightsync_harness::{MockPlatform, MockPlatformConfig};
use weightsync_runtime::{Delivery, SyncBuilder, SyncNode, SyncState};

use crate::scenario_config::{
    DeliveryOutcome, Device, LinkSetup, ScenarioConfig, TestAction, ValidationCheck,
};

const RAW_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// Report
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub description: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario_name: String,
    pub scenario_version: String,
    pub duration_secs: f64,
    pub steps: Vec<StepResult>,
    pub checks: Vec<CheckResult>,
    /// Final contents of the phone store
    pub stored_weights: Vec<WeightRecord>,
}

impl ScenarioReport {
    pub fn is_success(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|check| check.passed).count();
        format!(
            "{}: {}/{} checks passed",
            self.scenario_name,
            passed,
            self.checks.len()
        )
    }
}

// ----------------------------------------------------------------------------
// Runner
// ----------------------------------------------------------------------------

pub struct ScenarioRunner {
    sync_config: SyncConfig,
    data_dir: Option<PathBuf>,
}

struct Pair {
    phone: MockPlatform,
    watch: MockPlatform,
}

impl Pair {
    fn device(&self, device: Device) -> &MockPlatform {
        match device {
            Device::Phone => &self.phone,
            Device::Watch => &self.watch,
        }
    }
}

impl ScenarioRunner {
    pub fn new(sync_config: SyncConfig) -> Self {
        Self {
            sync_config,
            data_dir: None,
        }
    }

    /// Persist the phone store under this directory instead of in memory
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }

    pub async fn run(&self, scenario: &ScenarioConfig) -> anyhow::Result<ScenarioReport> {
        let started = Instant::now();
        info!(scenario = %scenario.metadata.name, "running scenario");

        let (phone, watch) = MockPlatform::paired_pair(self.mock_config(&scenario.link));
        let pair = Pair { phone, watch };

        let mut phone_config = self.sync_config.clone();
        if let Some(dir) = &self.data_dir {
            phone_config.store.settings_dir = Some(dir.clone());
        }
        let phone_node = SyncBuilder::new(Arc::new(pair.phone.clone()))
            .with_config(phone_config)
            .build()?;

        let mut watch_config = self.sync_config.clone();
        watch_config.store.settings_dir = None;
        let watch_node = SyncBuilder::new(Arc::new(pair.watch.clone()))
            .with_config(watch_config)
            .build()?;

        let handle = phone_node.start();
        watch_node.session().activate();

        let settle = Duration::from_millis(scenario.metadata.settle_ms);
        tokio::time::sleep(settle).await;

        let mut steps = Vec::with_capacity(scenario.sequence.len());
        let mut deliveries = HashMap::new();
        for step in &scenario.sequence {
            let (outcome, delivery) = self.execute(&step.action, &pair, &watch_node).await;
            debug!(step = %step.name, %outcome, "step executed");
            if let Some(delivery) = delivery {
                deliveries.insert(step.name.clone(), delivery);
            }
            steps.push(StepResult {
                name: step.name.clone(),
                outcome,
            });
            tokio::time::sleep(settle).await;
        }

        let draining = *handle.state().borrow() == SyncState::Draining;
        let stored_weights = phone_node.store().load_all();
        let checks = scenario
            .validation
            .final_checks
            .iter()
            .map(|check| evaluate(check, &stored_weights, draining, &deliveries, &pair))
            .collect();

        handle.shutdown().await?;

        let report = ScenarioReport {
            scenario_name: scenario.metadata.name.clone(),
            scenario_version: scenario.metadata.version.clone(),
            duration_secs: started.elapsed().as_secs_f64(),
            steps,
            checks,
            stored_weights,
        };
        info!(summary = %report.summary(), "scenario finished");
        Ok(report)
    }

    fn mock_config(&self, link: &LinkSetup) -> MockPlatformConfig {
        MockPlatformConfig {
            paired: link.paired,
            app_installed: link.paired,
            reachable: link.reachable,
            activate_on_request: link.auto_activate,
            ..MockPlatformConfig::from_platform_config(&self.sync_config.platform)
        }
    }

    async fn execute(
        &self,
        action: &TestAction,
        pair: &Pair,
        watch_node: &SyncNode,
    ) -> (String, Option<DeliveryOutcome>) {
        match action {
            TestAction::SetActivation { device, state } => {
                pair.device(*device).set_activation_state(*state);
                (format!("{} activation {}", device, state), None)
            }
            TestAction::SetReachable { device, reachable } => {
                pair.device(*device).set_reachable(*reachable);
                (format!("{} reachable={}", device, reachable), None)
            }
            TestAction::SetPaired { device, paired } => {
                let platform = pair.device(*device);
                platform.set_paired(*paired);
                platform.set_app_installed(*paired);
                (format!("{} paired={}", device, paired), None)
            }
            TestAction::SendWeight { weight, time } => {
                let record = WeightRecord::new(*weight, time.unwrap_or_else(Utc::now));
                let outcome = delivery_outcome(watch_node.publish(&record).await);
                (format!("{:?}", outcome), Some(outcome))
            }
            TestAction::UpdateContext { weight, time } => {
                let record = WeightRecord::new(*weight, time.unwrap_or_else(Utc::now));
                match watch_node.channel().update_context(&record) {
                    Ok(()) => ("context updated".to_string(), None),
                    Err(err) => (format!("context update failed: {}", err), None),
                }
            }
            TestAction::DeliverRaw { key, body } => {
                let reply = pair
                    .phone
                    .deliver_message(Payload::single(key.clone(), body.clone().into_bytes()));
                match tokio::time::timeout(RAW_REPLY_TIMEOUT, reply).await {
                    Ok(Ok(reply)) if reply.is_acknowledgment() => ("acknowledged".to_string(), None),
                    Ok(Ok(reply)) => (format!("replied {}", reply), None),
                    Ok(Err(_)) | Err(_) => ("unanswered".to_string(), None),
                }
            }
            TestAction::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                (format!("waited {}ms", duration_ms), None)
            }
            TestAction::LogCheckpoint { message } => {
                info!(checkpoint = %message);
                ("logged".to_string(), None)
            }
        }
    }
}

fn delivery_outcome(result: Result<Delivery, TransferError>) -> DeliveryOutcome {
    match result {
        Ok(Delivery::Message) => DeliveryOutcome::Message,
        Ok(Delivery::ApplicationContext) => DeliveryOutcome::ApplicationContext,
        Err(err) => match err.connectivity() {
            Some(ConnectivityError::NoValidSession) => DeliveryOutcome::NoValidSession,
            Some(ConnectivityError::NoReachableSession) => DeliveryOutcome::NoReachableSession,
            None => {
                warn!(error = %err, "send failed");
                DeliveryOutcome::Failed
            }
        },
    }
}

fn evaluate(
    check: &ValidationCheck,
    stored: &[WeightRecord],
    draining: bool,
    deliveries: &HashMap<String, DeliveryOutcome>,
    pair: &Pair,
) -> CheckResult {
    match check {
        ValidationCheck::StoredWeights { expected } => {
            let actual: Vec<f64> = stored.iter().map(WeightRecord::weight).collect();
            CheckResult {
                description: "stored weights".to_string(),
                passed: actual == *expected,
                detail: format!("expected {:?}, found {:?}", expected, actual),
            }
        }
        ValidationCheck::StoredCount { expected_count } => CheckResult {
            description: "stored count".to_string(),
            passed: stored.len() == *expected_count,
            detail: format!("expected {}, found {}", expected_count, stored.len()),
        },
        ValidationCheck::SyncState { draining: expected } => CheckResult {
            description: "sync state".to_string(),
            passed: draining == *expected,
            detail: format!("expected draining={}, found draining={}", expected, draining),
        },
        ValidationCheck::Delivery { step, expected } => {
            let actual = deliveries.get(step);
            CheckResult {
                description: format!("delivery of '{}'", step),
                passed: actual == Some(expected),
                detail: format!("expected {:?}, found {:?}", expected, actual),
            }
        }
        ValidationCheck::ContextsSent { expected_count } => {
            let sent = pair.watch.application_contexts().len();
            CheckResult {
                description: "contexts sent".to_string(),
                passed: sent == *expected_count,
                detail: format!("expected {}, found {}", expected_count, sent),
            }
        }
    }
}
