//! Integration tests for the session, transfer channel and coordinator
//!
//! Every test drives the stack through `MockPlatform`; the tokio test runtime
//! is single-threaded, so spawned coordinators only run while the test awaits.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::watch;
use weightsync_core::{
    ActivationState, ChannelConfig, MemorySettings, PlatformError, SessionConfig,
};
use weightsync_harness::{MockPlatform, MockPlatformConfig, MockPlatformStats};
use weightsync_runtime::{
    ConnectivityError, ConnectivitySession, Delivery, LinkState, LocalStore,
    ObjectTransferChannel, Payload, SyncCoordinator, SyncState, TransferError, TransferObject,
    WeightRecord,
};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(2);

fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 5, 10, 8, 30, 0).unwrap()
}

fn t2() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 5, 10, 9, 15, 0).unwrap()
}

fn weight_payload(weight: f64, time: DateTime<Utc>) -> Payload {
    WeightRecord::new(weight, time).to_payload().unwrap()
}

fn channel_for(platform: &MockPlatform) -> ObjectTransferChannel {
    ObjectTransferChannel::new(ConnectivitySession::new(Arc::new(platform.clone())))
}

fn memory_store() -> Arc<LocalStore> {
    Arc::new(LocalStore::new(MemorySettings::new()))
}

fn passive_config() -> SessionConfig {
    SessionConfig {
        activate_on_start: false,
        ..SessionConfig::default()
    }
}

async fn wait_until<T>(receiver: &mut watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    tokio::time::timeout(WAIT, receiver.wait_for(predicate))
        .await
        .expect("timed out waiting for watch value")
        .expect("watch sender dropped");
}

// ----------------------------------------------------------------------------
// Connectivity Session
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_link_usable_stream_follows_activation() {
    let platform = MockPlatform::default();
    let session = ConnectivitySession::new(Arc::new(platform.clone()));

    let mut usable = session.link_usable_stream();
    assert_eq!(usable.next().await, Some(false));

    platform.set_activation_state(ActivationState::Activated);
    assert_eq!(usable.next().await, Some(true));

    // A late subscriber sees the current value first
    let mut late = session.link_usable_stream();
    assert_eq!(late.next().await, Some(true));

    platform.set_activation_state(ActivationState::Inactive);
    assert_eq!(usable.next().await, Some(false));
    assert_eq!(late.next().await, Some(false));
}

#[tokio::test]
async fn test_link_usable_stream_reports_every_flap() {
    let platform = MockPlatform::default();
    let session = ConnectivitySession::new(Arc::new(platform.clone()));

    let mut usable = session.link_usable_stream();
    assert_eq!(usable.next().await, Some(false));

    // Both changes land before the next poll
    platform.set_activation_state(ActivationState::Activated);
    platform.set_activation_state(ActivationState::Inactive);
    assert_eq!(usable.next().await, Some(true));
    assert_eq!(usable.next().await, Some(false));

    let quiet = tokio::time::timeout(Duration::from_millis(20), usable.next()).await;
    assert!(quiet.is_err());
}

#[tokio::test]
async fn test_link_usable_ignores_reachability() {
    let platform = MockPlatform::new(MockPlatformConfig::unreachable());
    platform.set_activation_state(ActivationState::Activated);
    let session = ConnectivitySession::new(Arc::new(platform));

    assert_eq!(session.link_state(), LinkState::Paired);
    assert_eq!(session.link_usable_stream().next().await, Some(true));
}

#[test]
fn test_session_handles_follow_link_tiers() {
    let platform = MockPlatform::new(MockPlatformConfig::unpaired());
    let session = ConnectivitySession::new(Arc::new(platform.clone()));
    assert_eq!(session.link_state(), LinkState::Unpaired);
    assert_eq!(
        session.current_session_handle().unwrap_err(),
        ConnectivityError::NoValidSession
    );

    platform.set_paired(true);
    assert_eq!(session.link_state(), LinkState::AppNotInstalled);
    assert!(session.current_session_handle().is_err());

    platform.set_app_installed(true);
    assert_eq!(session.link_state(), LinkState::Paired);
    assert!(session.current_session_handle().is_ok());
    assert_eq!(
        session.current_reachable_handle().unwrap_err(),
        ConnectivityError::NoReachableSession
    );

    platform.set_reachable(true);
    assert_eq!(session.link_state(), LinkState::Reachable);
    assert!(session.current_reachable_handle().is_ok());
}

#[tokio::test]
async fn test_inbound_messages_carry_reply_handle() {
    let platform = MockPlatform::default();
    let session = ConnectivitySession::new(Arc::new(platform.clone()));
    let mut inbound = session.inbound_messages();

    platform.deliver_application_context(Payload::single("Other", b"1".to_vec()));
    let reply = platform.deliver_message(Payload::single("Other", b"2".to_vec()));

    let message = inbound.next().await.unwrap();
    assert_eq!(message.payload.get("Other"), Some(&b"2"[..]));
    assert!(message.reply.reply(Payload::new()));
    assert_eq!(reply.await.unwrap(), Payload::new());
}

// ----------------------------------------------------------------------------
// Object Transfer Channel
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_send_when_unreachable_has_no_effect() {
    let platform = MockPlatform::new(MockPlatformConfig::unreachable());
    let channel = channel_for(&platform);
    let store = memory_store();

    let err = channel
        .send(&WeightRecord::new(80.0, t1()))
        .await
        .unwrap_err();

    assert_eq!(err.connectivity(), Some(ConnectivityError::NoReachableSession));
    assert!(platform.sent_messages().is_empty());
    assert!(platform.application_contexts().is_empty());
    assert_eq!(MockPlatformStats::get(&platform.stats().messages_sent), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_send_without_valid_session_leaves_store_unaffected() {
    let platform = MockPlatform::new(MockPlatformConfig::unpaired());
    let channel = channel_for(&platform);
    let store = memory_store();
    store.append(WeightRecord::new(70.0, t1()));

    let err = channel
        .send(&WeightRecord::new(80.0, t2()))
        .await
        .unwrap_err();

    assert_eq!(err.connectivity(), Some(ConnectivityError::NoValidSession));
    assert!(platform.sent_messages().is_empty());
    assert_eq!(store.load_all(), vec![WeightRecord::new(70.0, t1())]);
}

#[tokio::test]
async fn test_send_wraps_record_under_routing_key() {
    let platform = MockPlatform::default();
    let channel = channel_for(&platform);

    channel.send(&WeightRecord::new(70.5, t1())).await.unwrap();

    let sent = platform.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 1);
    let decoded: serde_json::Value = serde_json::from_slice(sent[0].get("Weight").unwrap()).unwrap();
    assert_eq!(
        decoded,
        serde_json::json!({ "weight": 70.5, "time": "2018-05-10T08:30:00Z" })
    );
}

#[tokio::test]
async fn test_foreign_key_yields_nothing_but_is_acknowledged() {
    let platform = MockPlatform::default();
    let channel = channel_for(&platform);
    let mut weights = channel.receive_stream::<WeightRecord>();

    let foreign = platform.deliver_message(Payload::single("Goal", br#"{"target":65}"#.to_vec()));
    let malformed = platform.deliver_message(Payload::single("Weight", b"not json".to_vec()));
    let valid = platform.deliver_message(weight_payload(70.5, t1()));

    // Only the valid record comes through
    assert_eq!(weights.next().await, Some(WeightRecord::new(70.5, t1())));

    assert!(foreign.await.unwrap().is_acknowledgment());
    assert!(malformed.await.unwrap().is_acknowledgment());
    assert!(valid.await.unwrap().is_acknowledgment());
}

#[tokio::test]
async fn test_application_context_uses_same_decode_path() {
    let platform = MockPlatform::default();
    let channel = channel_for(&platform);
    let mut weights = channel.receive_stream::<WeightRecord>();

    platform.deliver_application_context(weight_payload(71.0, t2()));
    assert_eq!(weights.next().await, Some(WeightRecord::new(71.0, t2())));
}

#[tokio::test]
async fn test_update_context_requires_only_pairing() {
    let platform = MockPlatform::new(MockPlatformConfig::unreachable());
    let channel = channel_for(&platform);

    channel.update_context(&WeightRecord::new(70.5, t1())).unwrap();
    channel.update_context(&WeightRecord::new(71.0, t2())).unwrap();

    let contexts = platform.application_contexts();
    assert_eq!(contexts.len(), 2);
    assert_eq!(contexts[1], weight_payload(71.0, t2()));

    let unpaired = MockPlatform::new(MockPlatformConfig::unpaired());
    let err = channel_for(&unpaired)
        .update_context(&WeightRecord::new(70.5, t1()))
        .unwrap_err();
    assert_eq!(err.connectivity(), Some(ConnectivityError::NoValidSession));
}

#[tokio::test(start_paused = true)]
async fn test_send_times_out_when_peer_never_replies() {
    let (phone, watch) = MockPlatform::paired_pair(MockPlatformConfig::default());

    // Subscribed but never polled, so the message is never answered
    let phone_session = ConnectivitySession::new(Arc::new(phone.clone()));
    let _silent = phone_session.inbound_messages();

    let channel = channel_for(&watch).with_config(ChannelConfig::testing());
    let err = channel
        .send(&WeightRecord::new(70.5, t1()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::Platform(PlatformError::Timeout { duration_ms: 1000 })
    ));
}

#[tokio::test]
async fn test_send_to_peer_without_listener_reports_dropped_reply() {
    let (_phone, watch) = MockPlatform::paired_pair(MockPlatformConfig::default());
    let channel = channel_for(&watch);

    let err = channel
        .send(&WeightRecord::new(70.5, t1()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Platform(PlatformError::ReplyDropped)
    ));
    assert!(err.is_link_failure());
}

// ----------------------------------------------------------------------------
// Sync Coordinator
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_drain_scenario_false_true_false() {
    let platform = MockPlatform::default();
    let store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&platform), Arc::clone(&store))
        .with_config(passive_config())
        .spawn();

    let mut state = handle.state();
    let mut weights = handle.weights();

    platform.set_activation_state(ActivationState::Activated);
    wait_until(&mut state, |s| *s == SyncState::Draining).await;

    let first = platform.deliver_message(weight_payload(70.5, t1()));
    let second = platform.deliver_message(weight_payload(71.0, t2()));
    assert!(first.await.unwrap().is_acknowledgment());
    assert!(second.await.unwrap().is_acknowledgment());
    wait_until(&mut weights, |w| w.len() == 2).await;

    platform.set_activation_state(ActivationState::Inactive);
    wait_until(&mut state, |s| *s == SyncState::Idle).await;

    // The idle coordinator does not answer, so the peer's send fails
    let late = platform.deliver_message(weight_payload(72.0, t2()));
    assert!(late.await.is_err());

    let expected = vec![WeightRecord::new(70.5, t1()), WeightRecord::new(71.0, t2())];
    assert_eq!(store.load_all(), expected);
    assert_eq!(*handle.weights().borrow(), expected);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_record_before_link_loss_is_stored_and_acknowledged() {
    let platform = MockPlatform::default();
    let store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&platform), Arc::clone(&store))
        .with_config(passive_config())
        .spawn();
    let mut state = handle.state();

    platform.set_activation_state(ActivationState::Activated);
    wait_until(&mut state, |s| *s == SyncState::Draining).await;

    // All three are pending before the coordinator runs again
    let before = platform.deliver_message(weight_payload(70.5, t1()));
    platform.set_activation_state(ActivationState::Inactive);
    let after = platform.deliver_message(weight_payload(71.0, t2()));

    assert!(before.await.unwrap().is_acknowledgment());
    assert!(after.await.is_err());
    wait_until(&mut state, |s| *s == SyncState::Idle).await;
    assert_eq!(store.load_all(), vec![WeightRecord::new(70.5, t1())]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_link_flap_while_idle_forwards_nothing() {
    let platform = MockPlatform::default();
    let store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&platform), Arc::clone(&store))
        .with_config(passive_config())
        .spawn();
    tokio::task::yield_now().await;

    platform.set_activation_state(ActivationState::Activated);
    platform.set_activation_state(ActivationState::Inactive);
    let reply = platform.deliver_message(weight_payload(70.5, t1()));

    assert!(reply.await.is_err());
    assert!(store.is_empty());
    assert_eq!(*handle.state().borrow(), SyncState::Idle);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_records_are_both_stored() {
    let platform = MockPlatform::default();
    platform.set_activation_state(ActivationState::Activated);
    let store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&platform), Arc::clone(&store))
        .with_config(passive_config())
        .spawn();
    let mut state = handle.state();
    let mut weights = handle.weights();
    wait_until(&mut state, |s| *s == SyncState::Draining).await;

    platform.deliver_message(weight_payload(70.5, t1()));
    platform.deliver_application_context(weight_payload(70.5, t1()));
    wait_until(&mut weights, |w| w.len() == 2).await;

    assert_eq!(store.load_all()[0], store.load_all()[1]);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_activate_on_start() {
    let platform = MockPlatform::new(MockPlatformConfig::ideal());
    let handle = SyncCoordinator::new(channel_for(&platform), memory_store()).spawn();
    let mut state = handle.state();

    wait_until(&mut state, |s| *s == SyncState::Draining).await;
    assert_eq!(MockPlatformStats::get(&platform.stats().activations), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_coordinator_reactivates_after_link_returns() {
    let platform = MockPlatform::default();
    let store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&platform), Arc::clone(&store))
        .with_config(passive_config())
        .spawn();
    let mut state = handle.state();
    let mut weights = handle.weights();

    for (round, weight) in [70.0, 71.0, 72.0].into_iter().enumerate() {
        platform.set_activation_state(ActivationState::Activated);
        wait_until(&mut state, |s| *s == SyncState::Draining).await;

        platform.deliver_message(weight_payload(weight, t1()));
        wait_until(&mut weights, |w| w.len() == round + 1).await;

        platform.set_activation_state(ActivationState::Inactive);
        wait_until(&mut state, |s| *s == SyncState::Idle).await;
    }

    let stored: Vec<f64> = store.load_all().iter().map(WeightRecord::weight).collect();
    assert_eq!(stored, vec![70.0, 71.0, 72.0]);
    handle.shutdown().await.unwrap();
}

// ----------------------------------------------------------------------------
// Phone/Watch End To End
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_watch_send_reaches_phone_store() {
    let (phone, watch) = MockPlatform::paired_pair(MockPlatformConfig::ideal());
    let phone_store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&phone), Arc::clone(&phone_store)).spawn();
    let mut state = handle.state();
    wait_until(&mut state, |s| *s == SyncState::Draining).await;

    let watch_channel = channel_for(&watch);
    let delivery = watch_channel
        .send_or_update_context(&WeightRecord::new(70.5, t1()))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Message);

    let mut weights = handle.weights();
    wait_until(&mut weights, |w| w.len() == 1).await;
    assert_eq!(phone_store.load_all(), vec![WeightRecord::new(70.5, t1())]);
    assert_eq!(MockPlatformStats::get(&watch.stats().replies_received), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_watch_falls_back_to_context() {
    let (phone, watch) = MockPlatform::paired_pair(MockPlatformConfig::ideal());
    let phone_store = memory_store();
    let handle = SyncCoordinator::new(channel_for(&phone), Arc::clone(&phone_store)).spawn();
    let mut state = handle.state();
    wait_until(&mut state, |s| *s == SyncState::Draining).await;

    watch.set_reachable(false);
    let delivery = channel_for(&watch)
        .send_or_update_context(&WeightRecord::new(71.0, t2()))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::ApplicationContext);
    assert!(watch.sent_messages().is_empty());

    let mut weights = handle.weights();
    wait_until(&mut weights, |w| w.len() == 1).await;
    assert_eq!(phone_store.load_all(), vec![WeightRecord::new(71.0, t2())]);
    assert_eq!(
        phone.received_application_context(),
        Some(weight_payload(71.0, t2()))
    );

    handle.shutdown().await.unwrap();
}
