//! Permission-gated room administration.

use std::sync::Arc;

use parlor_client::{ClientError, RoomConfig, RoomDriver, Services, TransportError};
use parlor_core::{PowerAction, compose};
use parlor_harness::{Call, Fault, ScriptedTransport, SimEnv, fixtures};
use parlor_proto::{EventId, RoomId, UserId, event_type};
use serde_json::json;

type Driver = RoomDriver<SimEnv, ScriptedTransport>;

fn me() -> UserId {
    UserId::new("@me:parlor.test")
}

fn admin() -> UserId {
    UserId::new("@admin:parlor.test")
}

fn room_id() -> RoomId {
    RoomId::new("!mod:parlor.test")
}

async fn open() -> (Arc<ScriptedTransport>, Driver) {
    let env = SimEnv::new();
    let transport = Arc::new(ScriptedTransport::new(env.clone(), me()));
    let services = Services::new(Arc::clone(&transport));
    let driver = RoomDriver::open(env, services, room_id(), me(), RoomConfig::default()).await;
    (transport, driver)
}

/// Power levels giving the local user `level`, with the usual thresholds.
async fn with_level(driver: &Driver, level: i64) {
    let thresholds =
        json!({"kick": 50, "ban": 50, "invite": 0, "redact": 50, "state_default": 50});
    let levels = fixtures::power_levels(&admin(), &[(&admin(), 100), (&me(), level)], thresholds);
    driver.sync(fixtures::state_update(vec![levels])).await.unwrap();
}

#[tokio::test]
async fn rooms_without_power_levels_allow_everything() {
    let (transport, driver) = open().await;

    driver.set_name("Anything").await.unwrap();
    driver.kick(&admin(), None).await.unwrap();

    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn low_level_user_is_refused_before_any_call() {
    let (transport, driver) = open().await;
    with_level(&driver, 0).await;

    assert!(!driver.can_perform(PowerAction::Kick).await);
    assert!(!driver.can_send_state("org.example.widget").await);
    assert!(driver.can_send("org.example.ping").await);
    assert!(matches!(driver.set_name("Nope").await, Err(ClientError::PermissionDenied { .. })));
    assert!(matches!(
        driver.kick(&admin(), Some("bye")).await,
        Err(ClientError::PermissionDenied { .. })
    ));
    assert!(matches!(driver.ban(&admin(), None).await, Err(ClientError::PermissionDenied { .. })));
    assert!(transport.calls().is_empty());

    // Inviting needs no level.
    let guest = UserId::new("@guest:parlor.test");
    driver.invite(&guest).await.unwrap();
    assert_eq!(transport.calls(), vec![Call::Invite { room_id: room_id(), user_id: guest }]);
}

#[tokio::test]
async fn moderator_actions_reach_the_server() {
    let (transport, driver) = open().await;
    with_level(&driver, 50).await;
    let target = UserId::new("@spammer:parlor.test");

    driver.set_topic("Rules apply").await.unwrap();
    driver.kick(&target, Some("spam")).await.unwrap();
    driver.ban(&target, None).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(
        &calls[0],
        Call::SetState { event_type: ty, content, .. }
            if ty == event_type::TOPIC && content["topic"] == "Rules apply"
    ));
    assert_eq!(calls[1], Call::Kick { room_id: room_id(), user_id: target.clone() });
    assert_eq!(calls[2], Call::Ban { room_id: room_id(), user_id: target });
}

#[tokio::test]
async fn redacting_others_needs_the_redact_level() {
    let (transport, driver) = open().await;
    with_level(&driver, 0).await;
    driver.sync(fixtures::state_update(vec![fixtures::name(&admin(), "Admins")])).await.unwrap();
    let theirs = driver
        .with_room(|room| room.store().get(event_type::NAME, "").unwrap().event_id().clone())
        .await;

    assert!(matches!(
        driver.redact(&theirs, None).await,
        Err(ClientError::PermissionDenied { event_type: ty }) if ty == "redact"
    ));
    assert!(transport.calls().is_empty());

    // Own events, and events the room does not hold, go to the server.
    let mine = driver.send_message(compose::text("oops")).await.unwrap();
    driver.redact(&mine, Some("typo")).await.unwrap();
    let elsewhere = EventId::new("$not-resident");
    driver.redact(&elsewhere, None).await.unwrap();
    assert_eq!(
        transport.calls(),
        vec![
            Call::Redact { room_id: room_id(), event_id: mine, reason: Some("typo".to_owned()) },
            Call::Redact { room_id: room_id(), event_id: elsewhere, reason: None },
        ]
    );
}

#[tokio::test]
async fn kicking_someone_already_gone_succeeds() {
    let (transport, driver) = open().await;
    transport.push_call_fault(Fault::Fail(TransportError::NotFound));

    driver.kick(&UserId::new("@gone:parlor.test"), None).await.unwrap();
}

#[tokio::test]
async fn power_level_changes_are_bounded_by_own_level() {
    let (transport, driver) = open().await;
    with_level(&driver, 50).await;
    let member = UserId::new("@member:parlor.test");

    // Raising someone above yourself or touching a higher user is refused.
    assert!(driver.set_power_level(&member, 100).await.is_err());
    assert!(driver.set_power_level(&admin(), 0).await.is_err());
    assert!(transport.calls().is_empty());

    driver.set_power_level(&member, 50).await.unwrap();
    let calls = transport.calls();
    let Call::SetState { event_type: ty, content, .. } = &calls[0] else {
        panic!("expected a state call");
    };
    assert_eq!(ty, event_type::POWER_LEVELS);
    assert_eq!(content["users"][member.as_str()], 50);
    assert_eq!(content["users"][admin().as_str()], 100);
}
