//! Send engine tests through the async driver.
//!
//! The transport answers instantly unless scripted otherwise and retry waits
//! run on virtual time, so a send that retries for a minute completes at
//! once while `SimEnv::elapsed` still reports the full minute.

use std::{sync::Arc, time::Duration};

use parlor_client::{
    ClientError, Room, RoomConfig, RoomDriver, RoomNotification, Services, TransportError,
};
use parlor_core::compose;
use parlor_harness::{Fault, ScriptedTransport, SimEnv, TestCrypto, fixtures};
use parlor_proto::{EventStatus, RoomId, TransactionId, UserId, event_type};
use serde_json::json;

type Driver = RoomDriver<SimEnv, ScriptedTransport>;

fn me() -> UserId {
    UserId::new("@me:parlor.test")
}

fn room_id() -> RoomId {
    RoomId::new("!room:parlor.test")
}

async fn open(services: Services<ScriptedTransport>, env: &SimEnv) -> Driver {
    RoomDriver::open(env.clone(), services, room_id(), me(), RoomConfig::default()).await
}

async fn setup() -> (SimEnv, Arc<ScriptedTransport>, Driver) {
    let env = SimEnv::new();
    let transport = Arc::new(ScriptedTransport::new(env.clone(), me()));
    let driver = open(Services::new(Arc::clone(&transport)), &env).await;
    (env, transport, driver)
}

fn transient() -> Fault {
    Fault::Fail(TransportError::Transient { reason: "502 bad gateway".to_owned() })
}

/// Yield until the room has `count` pending sends.
async fn wait_for_pending(driver: &Driver, count: usize) {
    while driver.with_room(Room::pending_sends).await != count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let (env, transport, driver) = setup().await;
    transport.push_send_faults(&transient(), 3);

    let event_id = driver.send_message(compose::text("hello")).await.unwrap();

    assert_eq!(transport.attempts(), 4);
    assert_eq!(env.elapsed(), Duration::from_secs(3));
    let last = driver.last_event().await.unwrap();
    assert_eq!(last.event_id(), &event_id);
    assert_eq!(last.status(), EventStatus::Sent);
}

#[tokio::test]
async fn persistent_transient_failure_gives_up_at_deadline() {
    let (env, transport, driver) = setup().await;
    let mut notifications = driver.subscribe();
    transport.push_send_faults(&transient(), 100);

    let err = driver.send_message(compose::text("hello")).await.unwrap_err();

    let ClientError::SendFailed { txn_id, reason } = err else {
        panic!("expected SendFailed");
    };
    assert!(reason.contains("deadline"));
    // One attempt at every retry tick from 0s through 60s inclusive.
    assert_eq!(transport.attempts(), 61);
    assert_eq!(env.elapsed(), Duration::from_secs(60));
    assert_eq!(driver.last_event().await.unwrap().status(), EventStatus::Failed);
    assert!(driver.with_room(|room| room.failed_send(&txn_id).is_some()).await);

    let failures: Vec<_> = notifications
        .drain()
        .into_iter()
        .filter(|notification| matches!(notification, RoomNotification::SendFailed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn unanswered_attempt_fails_once_the_deadline_passes() {
    let (env, transport, driver) = setup().await;
    transport.push_send_fault(Fault::Hang);
    let mut notifications = driver.subscribe();

    let sender = driver.clone();
    let task = tokio::spawn(async move { sender.send_message(compose::text("stuck")).await });
    wait_for_pending(&driver, 1).await;

    env.advance(Duration::from_secs(59));
    tokio::task::yield_now().await;
    assert!(!task.is_finished());
    assert_eq!(driver.last_event().await.unwrap().status(), EventStatus::Sending);

    env.advance(Duration::from_secs(1));
    let err = task.await.unwrap().unwrap_err();

    let ClientError::SendFailed { txn_id, reason } = err else {
        panic!("expected SendFailed");
    };
    assert!(reason.contains("deadline"));
    assert_eq!(transport.attempts(), 1);
    assert_eq!(driver.last_event().await.unwrap().status(), EventStatus::Failed);
    assert_eq!(driver.with_room(Room::pending_sends).await, 0);
    assert!(driver.with_room(|room| room.failed_send(&txn_id).is_some()).await);
    let failures = notifications
        .drain()
        .into_iter()
        .filter(|notification| matches!(notification, RoomNotification::SendFailed { .. }))
        .count();
    assert_eq!(failures, 1);

    // The transport answers again, so a manual resend goes through.
    driver.resend(&txn_id).await.unwrap();
    assert_eq!(driver.last_event().await.unwrap().status(), EventStatus::Sent);
}

#[tokio::test]
async fn rejection_fails_on_first_attempt() {
    let (env, transport, driver) = setup().await;
    transport.push_send_fault(Fault::Fail(TransportError::Rejected {
        errcode: "M_FORBIDDEN".to_owned(),
    }));

    let err = driver.send_message(compose::text("hello")).await.unwrap_err();

    assert!(matches!(err, ClientError::SendFailed { .. }));
    assert_eq!(transport.attempts(), 1);
    assert_eq!(env.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn invalid_content_creates_no_echo() {
    let (_, transport, driver) = setup().await;

    let err = driver.send_message(compose::text("  ")).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidContent { .. }));
    assert!(driver.last_event().await.is_none());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn cancel_settles_a_hanging_send_and_allows_resend() {
    let (_, transport, driver) = setup().await;
    transport.push_send_fault(Fault::Hang);
    let txn_id = TransactionId::new("txn-hang");

    let sender = driver.clone();
    let send_txn = txn_id.clone();
    let content = json!({"msgtype": "m.text", "body": "stuck"});
    let task = tokio::spawn(async move {
        sender.send(event_type::MESSAGE, content, Some(send_txn)).await
    });
    wait_for_pending(&driver, 1).await;

    driver.cancel_send(&txn_id).await.unwrap();
    let outcome = task.await.unwrap();

    assert!(matches!(outcome, Err(ClientError::SendCancelled { txn_id: t }) if t == txn_id));
    assert_eq!(driver.last_event().await.unwrap().status(), EventStatus::Failed);
    assert_eq!(driver.with_room(Room::pending_sends).await, 0);

    let event_id = driver.resend(&txn_id).await.unwrap();
    let last = driver.last_event().await.unwrap();
    assert_eq!(last.event_id(), &event_id);
    assert_eq!(last.raw_content()["body"], "stuck");
    assert!(matches!(driver.resend(&txn_id).await, Err(ClientError::UnknownTransaction { .. })));
}

#[tokio::test]
async fn duplicate_transaction_does_not_send_twice() {
    let (_, transport, driver) = setup().await;
    transport.push_send_fault(Fault::Hang);
    let txn_id = TransactionId::new("txn-dup");
    let content = json!({"msgtype": "m.text", "body": "once"});

    let sender = driver.clone();
    let (first_txn, first_content) = (txn_id.clone(), content.clone());
    let first = tokio::spawn(async move {
        sender.send(event_type::MESSAGE, first_content, Some(first_txn)).await
    });
    wait_for_pending(&driver, 1).await;

    let duplicate = driver.send(event_type::MESSAGE, content, Some(txn_id.clone())).await;
    assert!(matches!(duplicate, Err(ClientError::SendCancelled { .. })));
    assert_eq!(driver.with_room(Room::pending_sends).await, 1);

    driver.cancel_send(&txn_id).await.unwrap();
    assert!(matches!(first.await.unwrap(), Err(ClientError::SendCancelled { .. })));
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn concurrent_sends_keep_issue_order() {
    let (_, transport, driver) = setup().await;
    transport.set_latency(Duration::from_millis(250));
    transport.push_send_faults(&transient(), 2);
    let mut notifications = driver.subscribe();

    let mut tasks = Vec::new();
    for index in 0..4 {
        let sender = driver.clone();
        let content = compose::text(format!("message {index}"));
        tasks.push(tokio::spawn(async move { sender.send_message(content).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let echoes: Vec<_> = notifications
        .drain()
        .into_iter()
        .filter_map(|notification| match notification {
            RoomNotification::Timeline { events, .. } => Some(events),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(echoes.len(), 4);
    assert!(echoes.windows(2).all(|pair| pair[0].ordering_key() < pair[1].ordering_key()));

    // The last issued send stays the preview, whatever order the server
    // acknowledged them in.
    let last = driver.last_event().await.unwrap();
    assert_eq!(last.ordering_key(), echoes[3].ordering_key());
    assert_eq!(last.status(), EventStatus::Sent);
}

#[tokio::test]
async fn sync_echo_confirms_at_echo_key() {
    let (env, transport, driver) = setup().await;
    let event_id = driver.send_message(compose::text("hello")).await.unwrap();
    let key = driver.last_event().await.unwrap().ordering_key();

    env.advance(Duration::from_secs(30));
    driver.sync(transport.sync_update(&room_id())).await.unwrap();

    let last = driver.last_event().await.unwrap();
    assert_eq!(last.event_id(), &event_id);
    assert_eq!(last.ordering_key(), key);
    assert_eq!(last.status(), EventStatus::Synced);
    assert_eq!(driver.with_room(Room::pending_sends).await, 0);
}

#[tokio::test]
async fn encrypted_room_sends_sealed_and_shows_plaintext() {
    let env = SimEnv::new();
    let transport = Arc::new(ScriptedTransport::new(env.clone(), me()));
    let services =
        Services::new(Arc::clone(&transport)).with_crypto(Arc::new(TestCrypto::new("s1")));
    let driver = open(services, &env).await;

    let encryption =
        fixtures::state(event_type::ENCRYPTION, "", &me(), json!({"algorithm": "m.megolm.v1"}));
    driver.sync(fixtures::state_update(vec![encryption])).await.unwrap();
    driver.send_message(compose::text("secret")).await.unwrap();

    let delivered = transport.delivered();
    assert_eq!(delivered[0].event_type, event_type::ENCRYPTED);
    assert_eq!(delivered[0].content["session_id"], "s1");
    assert_eq!(driver.last_event().await.unwrap().event_type(), event_type::MESSAGE);

    // The synced copy arrives sealed and is opened before it replaces the echo.
    driver.sync(transport.sync_update(&room_id())).await.unwrap();
    let last = driver.last_event().await.unwrap();
    assert_eq!(last.event_type(), event_type::MESSAGE);
    assert_eq!(last.raw_content()["body"], "secret");
    assert_eq!(last.status(), EventStatus::Synced);
}

#[tokio::test]
async fn reset_cancels_running_sends() {
    let (_, transport, driver) = setup().await;
    transport.push_send_fault(Fault::Hang);

    let sender = driver.clone();
    let task = tokio::spawn(async move { sender.send_message(compose::text("hello")).await });
    wait_for_pending(&driver, 1).await;

    driver.reset().await.unwrap();

    assert!(matches!(task.await.unwrap(), Err(ClientError::SendCancelled { .. })));
    assert!(driver.last_event().await.is_none());
}
