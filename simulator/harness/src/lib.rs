//! Weight Sync Harness
//!
//! Test and simulation support: a mock of the paired-device platform that
//! implements `SessionPlatform`, with controllable link flags, injectable
//! inbound traffic, and recorded outbound traffic.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weightsync_harness::{MockPlatform, MockPlatformConfig};
//! use weightsync_runtime::{ConnectivitySession, ObjectTransferChannel, WeightRecord};
//!
//! let (phone, watch) = MockPlatform::paired_pair(MockPlatformConfig::ideal());
//! let watch_channel = ObjectTransferChannel::new(ConnectivitySession::new(Arc::new(watch)));
//! watch_channel.send(&WeightRecord::now(70.5)).await?;
//! ```

pub mod mock_platform;

pub use mock_platform::{MockPlatform, MockPlatformConfig, MockPlatformStats};
