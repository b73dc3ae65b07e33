//! End-to-end HTTP tests over the in-memory adapters.

use axum_test::TestServer;
use roverd_core::autoconf::AutoconfManager;
use roverd_core::blob::FilesystemApkStorage;
use roverd_core::jobs::{JobLog, JobUpdater, JobUpdaterConfig, TracingEventSink};
use roverd_core::mapping::MappingManager;
use roverd_core::mitm::{LatestDataMap, MitmIngest, TelemetryQueue};
use roverd_core::persistence::Repositories;
use roverd_core::persistence::memory::MemoryStore;
use roverd_model::{
    Area, AreaId, AreaMode, Device, DeviceId, DeviceSettings, Geofence, GeofenceId, GeofenceKind,
    Walker, WalkerAlgo, WalkerArea, WalkerAreaId, WalkerId,
};
use roverd_server::websocket::WsRegistry;
use roverd_server::{AppState, routes};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    server: TestServer,
    queue: Arc<TelemetryQueue>,
    _tmp: TempDir,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    *store.geofences.write() = vec![Geofence {
        id: GeofenceId(1),
        name: "test".to_string(),
        kind: GeofenceKind::Polygon,
        data: "[test]\n0.0,0.0\n0.0,1.0\n1.0,1.0\n1.0,0.0\n".to_string(),
    }];
    *store.areas.write() = vec![Area::for_mode(
        AreaId(1),
        "mon-a",
        AreaMode::MonMitm,
        GeofenceId(1),
    )];
    *store.walkers.write() = vec![Walker {
        id: WalkerId(1),
        name: "w1".to_string(),
    }];
    *store.walker_areas.write() = vec![WalkerArea {
        id: WalkerAreaId(1),
        walker_id: WalkerId(1),
        area_id: AreaId(1),
        algo_type: WalkerAlgo::Idle,
        algo_value: String::new(),
        max_walkers: None,
        order: 0,
    }];
    *store.devices.write() = vec![Device {
        id: DeviceId(1),
        name: "atv01".to_string(),
        walker_id: WalkerId(1),
        pool_id: None,
        settings: DeviceSettings {
            ggl_login_mail: Some("scan01@example.com".to_string()),
            ..DeviceSettings::default()
        },
    }];

    let repos = Repositories {
        config: store.clone(),
        auth: store.clone(),
        pogoauth: store.clone(),
        routecalc: store.clone(),
        observations: store.clone(),
        autoconfig: store.clone(),
        apk_blobs: store.clone(),
    };

    let tmp = TempDir::new().unwrap();
    let mapping = MappingManager::new(repos.clone()).await.unwrap();
    mapping.start_route_managers().await.unwrap();

    let queue = Arc::new(TelemetryQueue::new(64));
    let ingest = Arc::new(MitmIngest::new(
        Arc::new(LatestDataMap::new()),
        queue.clone(),
        0,
        false,
    ));
    let registry = Arc::new(WsRegistry::new());
    let apk = Arc::new(
        FilesystemApkStorage::open(tmp.path().join("apks"))
            .await
            .unwrap(),
    );
    let job_log = Arc::new(JobLog::open(tmp.path().join("update_log.json")).await.unwrap());
    let jobs = JobUpdater::new(
        JobUpdaterConfig::default(),
        registry.clone(),
        apk.clone(),
        job_log,
        Arc::new(TracingEventSink),
    );

    let state = AppState {
        mapping,
        ingest,
        queue: queue.clone(),
        registry,
        autoconf: Arc::new(AutoconfManager::new(repos.autoconfig.clone())),
        apk,
        jobs,
        status_password: Some("hunter2".to_string()),
        advertise: "127.0.0.1:8080".to_string(),
    };

    Harness {
        server: TestServer::new(routes::create_router(state)).unwrap(),
        queue,
        _tmp: tmp,
    }
}

#[tokio::test]
async fn unhandled_proto_type_is_dropped_end_to_end() {
    let h = harness().await;
    let baseline = h
        .server
        .get("/get_latest_mitm")
        .add_header("Origin", "atv01")
        .await
        .json::<Value>();

    let response = h
        .server
        .post("/")
        .add_header("Origin", "atv01")
        .json(&json!({"type": 999, "timestamp": 100, "lat": 0.5, "lng": 0.5}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["dropped_type"], 1);
    assert!(h.queue.is_empty());

    let latest = h
        .server
        .get("/get_latest_mitm")
        .add_header("Origin", "atv01")
        .await;
    latest.assert_status_ok();
    assert_eq!(latest.json::<Value>(), baseline);

    let status = h
        .server
        .get("/status")
        .add_header("Authorization", "hunter2")
        .await;
    assert!(status.json::<Value>()["devices"][0]["last_data_ts"].is_null());
}

#[tokio::test]
async fn accepted_records_reach_latest_map_and_queue() {
    let h = harness().await;

    let response = h
        .server
        .post("/")
        .add_header("Origin", "atv01")
        .json(&json!([
            {"type": 106, "timestamp": 100, "lat": 0.5, "lng": 0.5},
            {"type": 102, "timestamp": 101, "lat": 0.5, "lng": 0.5},
        ]))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["accepted"], 2);
    assert_eq!(h.queue.len(), 2);

    let status = h
        .server
        .get("/status")
        .add_header("Authorization", "hunter2")
        .await;
    let devices = status.json::<Value>();
    assert!(devices["devices"][0]["last_data_ts"].as_i64().is_some());
}

#[tokio::test]
async fn unknown_origin_is_rejected() {
    let h = harness().await;
    let response = h
        .server
        .post("/")
        .add_header("Origin", "ghost")
        .json(&json!({"type": 106, "timestamp": 1}))
        .await;
    response.assert_status_not_found();

    let missing = h
        .server
        .post("/")
        .json(&json!({"type": 106, "timestamp": 1}))
        .await;
    missing.assert_status_bad_request();
}

#[tokio::test]
async fn status_requires_the_configured_password() {
    let h = harness().await;
    h.server.get("/status").await.assert_status_unauthorized();
    h.server
        .get("/status")
        .add_header("Authorization", "wrong")
        .await
        .assert_status_unauthorized();

    let ok = h
        .server
        .get("/status")
        .add_header("Authorization", "hunter2")
        .await;
    ok.assert_status_ok();
    let body: Value = ok.json();
    assert!(body["devices"].is_array());
    assert_eq!(body["queued_jobs"], 0);
}

#[tokio::test]
async fn autoconfig_session_walks_the_full_lifecycle() {
    let h = harness().await;

    let registered = h.server.post("/autoconfig/register").await;
    registered.assert_status(axum::http::StatusCode::CREATED);
    let session: i64 = registered.text().parse().unwrap();

    h.server
        .post("/autoconfig/mymac")
        .add_header("Session-Id", session.to_string())
        .text("de:ad:be:ef:00:01")
        .await
        .assert_status_ok();
    let mac = h
        .server
        .get("/autoconfig/mymac")
        .add_header("Session-Id", session.to_string())
        .await;
    assert_eq!(mac.text(), "de:ad:be:ef:00:01");

    assert_eq!(
        h.server
            .get(&format!("/autoconfig/{session}/status"))
            .await
            .text(),
        "pending"
    );

    h.server
        .post(&format!("/autoconfig/{session}/decide"))
        .text("accepted,atv01")
        .await
        .assert_status_ok();
    assert_eq!(
        h.server
            .get(&format!("/autoconfig/{session}/origin"))
            .await
            .text(),
        "atv01"
    );
    assert_eq!(
        h.server
            .get(&format!("/autoconfig/{session}/google"))
            .await
            .text(),
        "scan01@example.com"
    );
    let rgc = h.server.get(&format!("/autoconfig/{session}/rgc")).await;
    assert!(rgc.text().contains("ws://127.0.0.1:8080/ws"));

    h.server
        .delete(&format!("/autoconfig/{session}/complete"))
        .await
        .assert_status_ok();
    h.server
        .get(&format!("/autoconfig/{session}/status"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn error_log_line_blocks_session_completion() {
    let h = harness().await;
    let session: i64 = h
        .server
        .post("/autoconfig/register")
        .await
        .text()
        .parse()
        .unwrap();

    h.server
        .post(&format!("/autoconfig/{session}/log"))
        .text("4,provisioning exploded")
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    assert_eq!(
        h.server
            .get(&format!("/autoconfig/{session}/status"))
            .await
            .text(),
        "failed"
    );
    h.server
        .delete(&format!("/autoconfig/{session}/complete"))
        .await
        .assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn apk_lookup_distinguishes_unsupported_keys_from_missing_packages() {
    let h = harness().await;
    h.server
        .get("/mad_apk/pogo/arm64_v8a")
        .await
        .assert_status_not_found();
    h.server
        .get("/mad_apk/floppy/arm64_v8a")
        .await
        .assert_status(axum::http::StatusCode::NOT_ACCEPTABLE);
    h.server
        .get("/mad_apk/pogo/arm64_v8a/download")
        .await
        .assert_status_not_found();
}
