//! Port file → poller → store → HTTP, with a scripted FSUIPC link.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use http::{Request, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

use simdata_core::config::{self, PollerConfig};
use simdata_core::{Catalog, Encoding, RawValue, ReadingStore, Result, SimDataError, Source};
use simdata_feeder::{CycleOutcome, FsuipcAdapter, OffsetLink, Poller, PollerState, TelemetrySource};
use simdata_server::web::{self, AppState};

/// Offset link that answers every batch with the same raw altitude.
#[derive(Clone)]
struct FakeFsuipc {
    altitude_raw: i64,
    fail: Arc<Mutex<bool>>,
    requests: Arc<Mutex<Vec<(u32, Encoding)>>>,
}

impl FakeFsuipc {
    fn new(altitude_raw: i64) -> Self {
        FakeFsuipc {
            altitude_raw,
            fail: Arc::new(Mutex::new(false)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl OffsetLink for FakeFsuipc {
    fn open(&mut self, requests: &[(u32, Encoding)]) -> Result<()> {
        *self.requests.lock().unwrap() = requests.to_vec();
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<RawValue>> {
        if *self.fail.lock().unwrap() {
            return Err(SimDataError::Vendor("simulator closed".into()));
        }
        let requests = self.requests.lock().unwrap();
        Ok(requests
            .iter()
            .map(|(offset, _)| match offset {
                0x0570 => RawValue::Int(self.altitude_raw),
                _ => RawValue::Int(0),
            })
            .collect())
    }

    fn close(&mut self) {}
}

fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        interval_ms: 10,
        idle_tick_ms: 10,
        backoff_ms: 10,
        mock: false,
    }
}

fn app_state(store: Arc<ReadingStore>) -> Arc<AppState> {
    Arc::new(AppState {
        store,
        static_dir: std::env::temp_dir().join("simdata-no-assets"),
    })
}

async fn get_json(state: Arc<AppState>, uri: &str) -> serde_json::Value {
    let response = web::build_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[test]
fn test_port_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("port.txt");

    assert_eq!(config::load_port(&path), 8989);

    std::fs::write(&path, "9999").unwrap();
    assert_eq!(config::load_port(&path), 9999);

    std::fs::write(&path, "abc").unwrap();
    assert_eq!(config::load_port(&path), 8989);
}

#[test]
fn test_missing_offsets_file_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fsuipc_offsets.json");

    let catalog = Catalog::load_or_init(&path);
    assert!(path.exists());
    assert_eq!(catalog.len(), 9);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.as_object().unwrap().len(), 9);
    assert_eq!(written["altitude_ft"]["offset"], "0x0570");

    assert_eq!(Catalog::load_or_init(&path), catalog);
}

#[tokio::test]
async fn test_idle_reading_before_polling() {
    let store = Arc::new(ReadingStore::new());
    let json = get_json(app_state(store), "/data").await;
    assert_eq!(json["altitude_ft"], 0.0);
    assert_eq!(json["source"], "idle");
}

#[tokio::test]
async fn test_single_cycle_publishes_scaled_altitude() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::load_or_init(&dir.path().join("fsuipc_offsets.json"));
    let store = Arc::new(ReadingStore::new());
    let adapter = FsuipcAdapter::with_link(FakeFsuipc::new(229_376), catalog);

    let mut poller = Poller::new(
        Arc::clone(&store),
        vec![Box::new(adapter)],
        fast_poller_config(),
    );
    poller.warm_up();
    assert_eq!(poller.cycle(), CycleOutcome::Published(Source::Fsuipc));

    let json = get_json(app_state(store), "/data").await;
    assert_eq!(json["altitude_ft"], 3.5);
    assert_eq!(json["source"], "fsuipc");
}

#[tokio::test]
async fn test_failed_batch_marks_unavailable() {
    let link = FakeFsuipc::new(229_376);
    let fail = Arc::clone(&link.fail);
    let store = Arc::new(ReadingStore::new());
    let adapter = FsuipcAdapter::with_link(link, Catalog::defaults());
    assert!(adapter.available());

    let mut poller = Poller::new(
        Arc::clone(&store),
        vec![Box::new(adapter)],
        fast_poller_config(),
    );
    assert_eq!(poller.cycle(), CycleOutcome::Published(Source::Fsuipc));

    *fail.lock().unwrap() = true;
    assert_eq!(poller.cycle(), CycleOutcome::Unavailable);

    let json = get_json(app_state(store), "/data").await;
    assert_eq!(json["source"], "unavailable");
    assert_eq!(json["altitude_ft"], 3.5);
}

#[tokio::test]
async fn test_served_over_tcp_with_background_poller() {
    let dir = tempfile::tempdir().unwrap();
    let port_file = dir.path().join("port.txt");
    std::fs::write(&port_file, "9999").unwrap();
    assert_eq!(config::effective_port(None, &port_file), 9999);

    let store = Arc::new(ReadingStore::new());
    let adapter = FsuipcAdapter::with_link(FakeFsuipc::new(229_376), Catalog::defaults());
    let poller = Poller::new(
        Arc::clone(&store),
        vec![Box::new(adapter)],
        fast_poller_config(),
    );
    let mut handle = poller.spawn().unwrap();
    assert_eq!(handle.state(), PollerState::ArmedIdle);

    // Override to port 0 so parallel test runs don't collide.
    let port = config::effective_port(Some(0), &port_file);
    let listener = web::bind("127.0.0.1", port).await.unwrap();
    let addr = listener.local_addr().unwrap();
    assert_ne!(addr.port(), 0);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(web::serve(listener, app_state(Arc::clone(&store)), async move {
        let _ = stop_rx.await;
    }));

    handle.start();
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.snapshot().source != Source::Fsuipc && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /data HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.to_ascii_lowercase().contains("cache-control: no-store"));
    let body = raw.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["altitude_ft"], 3.5);
    assert_eq!(json["source"], "fsuipc");

    handle.shutdown();
    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
