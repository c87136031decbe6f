//! End-to-end tests through the wired pipeline.

use super::*;
use serde_json::{Value, json};

fn pipeline() -> Pipeline {
    Pipeline::with_json_decoder(Registry::from_identities([
        DeviceIdentity::new("123", "V1"),
        DeviceIdentity::new("456", "V2"),
    ]))
}

#[test]
fn test_status_merge_scenario() {
    let p = pipeline();

    p.router.route("ind/123/status", br#"{"battery": 80}"#);
    let rec = p.query.by_logical_id(Category::Status, "V1").unwrap();
    assert_eq!(rec.hardware_id, "123");
    assert_eq!(rec.logical_id, "V1");
    assert_eq!(Value::Object(rec.fields), json!({"battery": 80}));

    p.router
        .route("ind/123/status", br#"{"battery": null, "signal": 5}"#);
    let rec = p.query.by_logical_id(Category::Status, "V1").unwrap();
    assert_eq!(Value::Object(rec.fields), json!({"battery": 80, "signal": 5}));
}

#[test]
fn test_unknown_device_frame_is_dropped() {
    let p = pipeline();
    p.router.route("ind/123/status", br#"{"battery": 80}"#);
    let before = p.query.all_of(Category::Status);

    p.router.route("ind/999/x", br#"{"battery": 1}"#);
    p.router.route("ind/999/status", br#"{"battery": 1}"#);

    assert_eq!(p.query.all_of(Category::Status), before);
    assert!(p.cache.get(Category::Status, "999").is_none());
}

#[test]
fn test_combined_before_login() {
    let p = pipeline();
    p.router.route("ind/123/status", br#"{"battery": 80}"#);

    let combined = p.query.combined_by_logical_id("V1");
    assert_eq!(combined.status.unwrap().fields["battery"], 80);
    assert!(combined.login.is_none());
    assert!(combined.gps.is_none());

    let json = serde_json::to_value(p.query.combined_by_logical_id("V2")).unwrap();
    assert_eq!(json, json!({"status": null, "login": null, "gps": null}));
}

#[test]
fn test_cross_category_independence() {
    let p = pipeline();
    p.router.route("ind/123/login", br#"{"user": "amy"}"#);
    p.router.route("ind/123/gps", br#"{"lat": 48.2, "lon": 16.3}"#);
    let login = p.cache.get(Category::Login, "123");
    let gps = p.cache.get(Category::Gps, "123");

    p.router
        .route("ind/123/status", br#"{"user": "mallory", "lat": 0.0}"#);

    assert_eq!(p.cache.get(Category::Login, "123"), login);
    assert_eq!(p.cache.get(Category::Gps, "123"), gps);
    assert_eq!(p.cache.get(Category::Status, "123").unwrap().fields["user"], "mallory");
}

#[test]
fn test_devices_are_independent() {
    let p = pipeline();
    p.router.route("ind/123/gps", br#"{"lat": 1.0}"#);
    p.router.route("ind/456/gps", br#"{"lat": 2.0}"#);
    p.router.route("ind/456/gps", br#"{"lat": null, "lon": 3.0}"#);

    let all = p.query.all_of(Category::Gps);
    assert_eq!(all.len(), 2);
    assert_eq!(Value::Object(all["123"].fields.clone()), json!({"lat": 1.0}));
    assert_eq!(
        Value::Object(all["456"].fields.clone()),
        json!({"lat": 2.0, "lon": 3.0})
    );
}

#[test]
fn test_identity_from_payload_overrides_registry() {
    let p = pipeline();
    p.router
        .route("ind/123/status", br#"{"veloId": "V1-new", "battery": 50}"#);
    p.router.route("ind/123/status", br#"{"battery": 40}"#);

    let rec = p.cache.get(Category::Status, "123").unwrap();
    assert_eq!(rec.logical_id, "V1-new");
    assert_eq!(rec.fields["battery"], 40);
    assert!(!rec.fields.contains_key("veloId"));
    assert!(p.query.by_logical_id(Category::Status, "V1").is_none());
}

#[test]
fn test_padded_roster_row_and_numeric_payload_identity() {
    let p = Pipeline::with_json_decoder(Registry::from_identities([DeviceIdentity::new(
        " 456 ", "V2",
    )]));

    p.router.route("ind/456/login", br#"{"fw": "1.0"}"#);
    let rec = p.cache.get(Category::Login, "456").unwrap();
    assert_eq!(rec.hardware_id, "456");

    p.router
        .route("ind/456/status", br#"{"imei": 351234567890123, "battery": 5}"#);
    let rec = p.cache.get(Category::Status, "456").unwrap();
    assert_eq!(rec.hardware_id, "351234567890123");
    assert_eq!(rec.logical_id, "V2");
    assert_eq!(Value::Object(rec.fields), json!({"battery": 5}));
}

#[test]
fn test_bad_frames_do_not_disturb_state() {
    let p = pipeline();
    p.router.route("ind/123/status", br#"{"battery": 80}"#);
    let before = p.cache.get(Category::Status, "123");

    p.router.route("ind/123/status", b"\xff\xfe");
    p.router.route("ind/123/status", b"[1, 2]");
    p.router.route("ind/123/unknown", br#"{"battery": 1}"#);

    assert_eq!(p.cache.get(Category::Status, "123"), before);
}

#[tokio::test]
async fn test_observers_receive_merged_records_in_order() {
    let p = pipeline();
    let mut status = p.distributor.subscribe(Category::Status);
    let mut gps = p.distributor.subscribe(Category::Gps);

    p.router.route("ind/123/status", br#"{"battery": 80}"#);
    p.router
        .route("ind/123/status", br#"{"battery": null, "signal": 5}"#);
    p.router.route("ind/999/status", br#"{"battery": 1}"#);

    let first = status.recv().await.unwrap();
    assert_eq!(Value::Object(first.record.fields), json!({"battery": 80}));
    let second = status.recv().await.unwrap();
    assert_eq!(
        Value::Object(second.record.fields),
        json!({"battery": 80, "signal": 5})
    );
    assert!(status.try_recv().is_err());
    assert!(gps.try_recv().is_err());
}

#[test]
fn test_merge_from_parallel_writers() {
    let p = pipeline();
    let key = DeviceKey::new("123");

    std::thread::scope(|s| {
        for worker in 0..4 {
            let cache = p.cache.clone();
            let key = key.clone();
            s.spawn(move || {
                for i in 0..50 {
                    let fragment = Fragment::new(Category::Status)
                        .with_field(format!("w{worker}"), i)
                        .with_field("shared", Value::Null);
                    cache.merge(&key, &fragment).unwrap();
                }
            });
        }
    });

    let rec = p.cache.get(Category::Status, "123").unwrap();
    for worker in 0..4 {
        assert_eq!(rec.fields[&format!("w{worker}")], 49);
    }
    assert!(!rec.fields.contains_key("shared"));
}
