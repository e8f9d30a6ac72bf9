mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ct200_bridge::{
    Bridge, Error, Event, GlobalKind, HeatingState, Method, RefreshClass, TemperatureUnit,
    ZoneMode,
};
use serde_json::json;

use common::{MockTransport, credentials, eventually};

fn three_zone_bridge(transport: &MockTransport) -> Bridge<MockTransport> {
    Bridge::builder(transport.clone(), credentials())
        .zone(1, "Living room")
        .zone(2, "Bedroom")
        .zone(3, "Office")
        .build()
        .expect("build should succeed")
}

async fn connected(transport: &MockTransport) -> Bridge<MockTransport> {
    let bridge = three_zone_bridge(transport);
    bridge.connect().await.expect("connect should succeed");
    bridge
}

fn script_device(transport: &MockTransport) {
    transport.script_value(
        "/zones/list",
        json!([
            {"id": 1, "name": "Living room", "temp": 20.5, "status": "heat request"},
            {"id": 2, "name": "Bedroom", "temp": 18.0, "status": "idle"},
            {"id": 3, "name": "Office", "temp": 19.0, "status": "idle"}
        ]),
    );
    transport.script_value("/system/sensors/humidity/indoor_h1", json!(44.0));
    transport.script_value("/gateway/localisation", json!("Celsius"));
    transport.script_value("/system/awayMode/enabled", json!("false"));
    for (id, setpoint, mode) in [(1, 21.0, "clock"), (2, 17.5, "manual"), (3, 19.5, "clock")] {
        transport.script_value(&format!("/zones/zn{id}/temperatureHeatingSetpoint"), json!(setpoint));
        transport.script_value(&format!("/zones/zn{id}/userMode"), json!(mode));
    }
}

#[tokio::test]
async fn connect_failure_is_surfaced() {
    let transport = MockTransport::new();
    transport.refuse_connect("authentication failed");
    let bridge = three_zone_bridge(&transport);

    let err = bridge.connect().await.unwrap_err();
    assert!(matches!(err, Error::Transport(ref m) if m.contains("authentication")));

    let err = bridge.start().await.unwrap_err();
    assert!(matches!(err, Error::NotConnected), "expected NotConnected, got {err:?}");
    let err = bridge.set_away_mode(true).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn startup_rebuilds_cache_from_full_query() {
    let transport = MockTransport::new();
    script_device(&transport);
    let bridge = connected(&transport).await;

    bridge.start().await.unwrap();

    let living = bridge.zone_snapshot(1).unwrap();
    assert_eq!(living.name, "Living room");
    assert_eq!(living.current_temp, 20.5);
    assert_eq!(living.heating, HeatingState::Heat);
    assert_eq!(living.wanted_temp, 21.0);
    assert_eq!(living.mode, ZoneMode::Auto);

    let bedroom = bridge.zone_snapshot(2).unwrap();
    assert_eq!(bedroom.heating, HeatingState::Off);
    assert_eq!(bedroom.mode, ZoneMode::Manual);
    assert_eq!(bedroom.wanted_temp, 17.5);

    let global = bridge.global_snapshot();
    assert_eq!(global.humidity, 44.0);
    assert_eq!(global.localization, TemperatureUnit::Celsius);
    assert!(!global.away);
    assert!(bridge.is_polling());

    // zones, humidity, localization, away, and setpoint + mode per zone
    assert_eq!(transport.sent().len(), 4 + 3 * 2);
}

#[tokio::test]
async fn away_disabled_skips_away_query() {
    let transport = MockTransport::new();
    script_device(&transport);
    let bridge = Bridge::builder(transport.clone(), credentials())
        .zone(1, "Living room")
        .away_enabled(false)
        .build()
        .unwrap();
    bridge.connect().await.unwrap();
    bridge.start().await.unwrap();

    assert_eq!(transport.sent_count(Method::Get, "/system/awayMode/enabled"), 0);
    assert_eq!(transport.sent_count(Method::Get, "/zones/list"), 1);
}

#[tokio::test]
async fn localization_reaches_all_zones_in_one_update() {
    let transport = MockTransport::new();
    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(vec![]));
    let seen_clone = seen.clone();
    let bridge = Bridge::builder(transport.clone(), credentials())
        .zone(1, "Living room")
        .zone(2, "Bedroom")
        .zone(3, "Office")
        .on_event(move |event| {
            if let Event::DisplayUnitChanged { zone_id, unit: TemperatureUnit::Fahrenheit } = event {
                seen_clone.lock().unwrap().push(*zone_id);
            }
        })
        .build()
        .unwrap();
    bridge.connect().await.unwrap();

    transport.push(json!({"id": "/gateway/localisation", "value": "Fahrenheit"}));

    eventually(|| bridge.display_unit() == TemperatureUnit::Fahrenheit).await;
    for zone in bridge.zones() {
        assert_eq!(zone.display_unit, TemperatureUnit::Fahrenheit, "zone {}", zone.id);
    }
    let mut ids = seen.lock().unwrap().clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn reply_for_unknown_zone_is_discarded() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    let before = bridge.zones();

    transport.push(json!({"id": "/zones/zn99/temperatureHeatingSetpoint", "value": 30.0}));
    transport.push(json!({"id": "/zones/zn99/userMode", "value": "clock"}));
    // Marker: replies are routed in order, so once this lands the others have too.
    transport.push(json!({"id": "/system/sensors/humidity/indoor_h1", "value": 51.0}));

    eventually(|| bridge.humidity() == 51.0).await;
    assert_eq!(bridge.zones(), before);
}

#[tokio::test]
async fn rejected_write_keeps_cached_setpoint() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.push(json!({"id": "/zones/zn1/temperatureHeatingSetpoint", "value": 21.0}));
    eventually(|| bridge.zone_snapshot(1).unwrap().wanted_temp == 21.0).await;

    transport.script(
        Method::Put,
        "/zones/zn1/manualTemperatureHeating",
        json!({"id": "/zones/zn1/manualTemperatureHeating", "status": "error"}),
    );
    let err = bridge.set_zone_target(1, 25.0).await.unwrap_err();

    assert!(matches!(err, Error::WriteRejected { ref status, .. } if status == "error"), "got {err:?}");
    assert_eq!(bridge.zone_snapshot(1).unwrap().wanted_temp, 21.0);
    assert_eq!(
        transport.sent_count(Method::Get, "/zones/zn1/temperatureHeatingSetpoint"),
        0,
        "no follow-up refresh after a rejected write"
    );
}

#[tokio::test]
async fn accepted_write_refreshes_from_device() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.script(
        Method::Put,
        "/zones/zn2/manualTemperatureHeating",
        json!({"id": "/zones/zn2/manualTemperatureHeating", "status": "ok"}),
    );
    transport.script_value("/zones/zn2/temperatureHeatingSetpoint", json!(22.5));

    bridge.set_zone_target(2, 22.5).await.unwrap();

    let put = transport
        .sent()
        .into_iter()
        .find(|r| r.method == Method::Put)
        .unwrap();
    assert_eq!(put.endpoint, "/zones/zn2/manualTemperatureHeating");
    assert_eq!(put.body, Some(json!({"value": 22.5})));
    eventually(|| bridge.zone_snapshot(2).unwrap().wanted_temp == 22.5).await;
}

#[tokio::test]
async fn mode_write_sends_device_vocabulary() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.script(
        Method::Put,
        "/zones/zn3/userMode",
        json!({"id": "/zones/zn3/userMode", "status": "ok"}),
    );
    transport.script_value("/zones/zn3/userMode", json!("clock"));
    transport.script_value("/zones/zn3/temperatureHeatingSetpoint", json!(18.0));

    bridge.set_zone_mode(3, ZoneMode::Auto).await.unwrap();

    let put = transport.sent().into_iter().find(|r| r.method == Method::Put).unwrap();
    assert_eq!(put.body, Some(json!({"value": "clock"})));
    eventually(|| {
        let zone = bridge.zone_snapshot(3).unwrap();
        zone.mode == ZoneMode::Auto && zone.wanted_temp == 18.0
    })
    .await;
}

#[tokio::test]
async fn away_write_refreshes_every_setpoint() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.script(
        Method::Put,
        "/system/awayMode/enabled",
        json!({"id": "/system/awayMode/enabled", "status": "ok"}),
    );

    bridge.set_away_mode(true).await.unwrap();

    let put = transport.sent().into_iter().find(|r| r.method == Method::Put).unwrap();
    assert_eq!(put.body, Some(json!({"value": "true"})));
    eventually(|| {
        (1..=3).all(|id| {
            transport.sent_count(Method::Get, &format!("/zones/zn{id}/temperatureHeatingSetpoint")) == 1
        })
    })
    .await;
}

#[tokio::test]
async fn writes_to_unknown_zone_rejected_locally() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;

    let err = bridge.set_zone_target(9, 20.0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidZone(9)));
    assert!(matches!(bridge.target_temperature(9), Err(Error::InvalidZone(9))));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn display_unit_write_never_reaches_device() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;

    let err = bridge.set_display_unit(TemperatureUnit::Fahrenheit).unwrap_err();
    assert!(matches!(err, Error::ReadOnly(_)));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn getter_returns_stale_value_while_refresh_in_flight() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.push(json!({"id": "/zones/zn1/temperatureHeatingSetpoint", "value": 19.5}));
    eventually(|| bridge.zone_snapshot(1).unwrap().wanted_temp == 19.5).await;

    // No scripted reply: the refresh stays outstanding.
    assert_eq!(bridge.target_temperature(1).unwrap(), 19.5);
    eventually(|| transport.sent_count(Method::Get, "/zones/zn1/temperatureHeatingSetpoint") == 1).await;
    assert_eq!(bridge.zone_snapshot(1).unwrap().wanted_temp, 19.5);

    transport.push(json!({"id": "/zones/zn1/temperatureHeatingSetpoint", "value": 20.0}));
    eventually(|| bridge.zone_snapshot(1).unwrap().wanted_temp == 20.0).await;
    assert_eq!(bridge.target_temperature(1).unwrap(), 20.0);
}

#[tokio::test]
async fn global_refresh_targets_single_endpoint() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.script_value("/system/sensors/humidity/indoor_h1", json!(38.5));

    bridge.request_global_refresh(GlobalKind::Humidity);
    eventually(|| bridge.humidity() == 38.5).await;

    bridge.request_zone_refresh(2).unwrap();
    eventually(|| transport.sent_count(Method::Get, "/zones/zn2/userMode") == 1).await;
    assert_eq!(transport.sent_count(Method::Get, "/gateway/localisation"), 0);
    assert!(matches!(bridge.request_zone_refresh(42), Err(Error::InvalidZone(42))));
}

#[tokio::test]
async fn zone_list_push_guards_spurious_readings() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;

    transport.push(json!({"id": "/zones/list", "value": [{"id": 1, "temp": 21.0, "status": "idle"}]}));
    eventually(|| bridge.current_temperature(1).unwrap() == 21.0).await;

    transport.push(json!({"id": "/zones/list", "value": [{"id": 1, "temp": 127.5, "status": "heat request"}]}));
    eventually(|| bridge.heating_state(1).unwrap() == HeatingState::Heat).await;
    assert_eq!(bridge.current_temperature(1).unwrap(), 21.0);
}

#[tokio::test]
async fn away_getter_reads_cache_and_refreshes() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.push(json!({"id": "/system/awayMode/enabled", "value": "true"}));
    eventually(|| bridge.global_snapshot().away).await;

    assert!(bridge.away_mode());
    eventually(|| transport.sent_count(Method::Get, "/system/awayMode/enabled") == 1).await;
}

#[tokio::test(start_paused = true)]
async fn poller_ticks_each_class_on_its_own_interval() {
    let transport = MockTransport::new();
    script_device(&transport);
    let bridge = Bridge::builder(transport.clone(), credentials())
        .zone(1, "Living room")
        .zone_interval(Duration::from_secs(60))
        .aux_interval(Duration::from_secs(300))
        .build()
        .unwrap();
    assert_eq!(bridge.poll_interval(RefreshClass::Zones), Duration::from_secs(60));
    bridge.connect().await.unwrap();
    bridge.start().await.unwrap();
    assert_eq!(transport.sent_count(Method::Get, "/zones/list"), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    eventually(|| transport.sent_count(Method::Get, "/zones/list") == 2).await;
    assert_eq!(transport.sent_count(Method::Get, "/gateway/localisation"), 1);

    tokio::time::sleep(Duration::from_secs(240)).await;
    eventually(|| transport.sent_count(Method::Get, "/gateway/localisation") == 2).await;
    assert_eq!(transport.sent_count(Method::Get, "/system/sensors/humidity/indoor_h1"), 2);

    bridge.shutdown();
    assert!(!bridge.is_polling());
}

#[tokio::test(start_paused = true)]
async fn failed_poll_waits_for_next_tick() {
    let transport = MockTransport::new();
    let bridge = Bridge::builder(transport.clone(), credentials())
        .zone(1, "Living room")
        .zone_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    bridge.connect().await.unwrap();
    bridge.request_global_refresh(GlobalKind::Localization);
    eventually(|| transport.sent_count(Method::Get, "/gateway/localisation") == 1).await;

    transport.fail(Method::Get, "/gateway/localisation", Error::RateLimited);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Nothing retried on its own.
    assert_eq!(transport.sent_count(Method::Get, "/gateway/localisation"), 1);
}

#[tokio::test]
async fn mode_write_acknowledged_with_echoed_value() {
    let transport = MockTransport::new();
    script_device(&transport);
    transport.script(
        Method::Put,
        "/zones/zn1/userMode",
        json!({"id": "/zones/zn1/userMode", "value": "clock", "status": "ok"}),
    );
    let bridge = connected(&transport).await;

    tokio::time::timeout(Duration::from_secs(2), bridge.set_zone_mode(1, ZoneMode::Auto))
        .await
        .expect("write should be answered")
        .unwrap();
    eventually(|| bridge.zone_snapshot(1).unwrap().mode == ZoneMode::Auto).await;
}

#[test]
fn getters_callable_from_threads_outside_the_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let transport = MockTransport::new();
    script_device(&transport);
    let bridge = three_zone_bridge(&transport);
    runtime.block_on(bridge.connect()).unwrap();

    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                assert_eq!(bridge.target_temperature(1).unwrap(), 10.0);
                assert!(!bridge.away_mode());
                bridge.request_zone_refresh(2).unwrap();
            })
            .join()
            .expect("getters must not panic off the runtime");
    });

    runtime.block_on(eventually(|| {
        transport.sent_count(Method::Get, "/zones/zn1/temperatureHeatingSetpoint") == 1
            && transport.sent_count(Method::Get, "/zones/zn2/userMode") == 1
    }));
    runtime.block_on(eventually(|| bridge.zone_snapshot(1).unwrap().wanted_temp == 21.0));
}

#[tokio::test]
async fn advance_schedule_applies_next_setpoint() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.script_value("/zones/zn1/nextSetpoint", json!(16.5));
    transport.script(
        Method::Put,
        "/zones/zn1/manualTemperatureHeating",
        json!({"id": "/zones/zn1/manualTemperatureHeating", "status": "ok"}),
    );
    transport.script_value("/zones/zn1/temperatureHeatingSetpoint", json!(16.5));

    assert_eq!(bridge.advance_schedule(1).await.unwrap(), 16.5);

    let put = transport.sent().into_iter().find(|r| r.method == Method::Put).unwrap();
    assert_eq!(put.endpoint, "/zones/zn1/manualTemperatureHeating");
    assert_eq!(put.body, Some(json!({"value": 16.5})));
    eventually(|| bridge.zone_snapshot(1).unwrap().wanted_temp == 16.5).await;
}

#[tokio::test]
async fn advance_schedule_rejects_unusable_setpoint() {
    let transport = MockTransport::new();
    let bridge = connected(&transport).await;
    transport.script_value("/zones/zn2/nextSetpoint", json!("none"));

    let err = bridge.advance_schedule(2).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    assert_eq!(transport.sent_count(Method::Put, "/zones/zn2/manualTemperatureHeating"), 0);
    assert!(matches!(bridge.advance_schedule(9).await, Err(Error::InvalidZone(9))));
}
