use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{SecondsFormat, Utc};
use pi_gpiod::{
    create_app, AppState, Bank, DeviceInfo, ErrorHandler, GpioConfig, GpioManager, LogFiles,
    ServiceStats, ServiceStatus, SimulatedGpio, WebConfig,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    state: AppState,
    sim: SimulatedGpio,
    storage: PathBuf,
    log_dir: PathBuf,
}

impl TestApp {
    fn new(tag: &str) -> Self {
        let storage = std::env::temp_dir().join(format!(
            "pi_gpiod_http_{}_{}.json",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&storage);
        let log_dir = std::env::temp_dir().join(format!(
            "pi_gpiod_http_logs_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&log_dir);

        let sim = SimulatedGpio::new();
        let errors = ErrorHandler::default();
        let gpio = Arc::new(GpioManager::new(
            GpioConfig::default().with_sticky_high_input_ms(0),
            Some(Box::new(sim.clone())),
            errors.clone(),
        ));
        gpio.configure_pins().expect("Should configure simulated pins");

        let state = AppState {
            gpio,
            stats: Arc::new(ServiceStats::new()),
            errors,
            device: Arc::new(DeviceInfo::with_serial("00000000cafe", &storage)),
            status: Arc::new(ServiceStatus::new()),
            logs: Some(LogFiles::new(&log_dir)),
        };
        let app = create_app(&WebConfig::default(), state.clone());
        Self {
            app,
            state,
            sim,
            storage,
            log_dir,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .expect("Router should answer");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let json = serde_json::from_slice(&bytes).expect("Body should be JSON");
        (status, json)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.storage);
        let _ = std::fs::remove_dir_all(&self.log_dir);
    }
}

#[tokio::test]
async fn test_gpio_read() {
    let test = TestApp::new("read");
    test.sim.set_input(2, true);
    test.state.gpio.poll_once().unwrap();

    let (status, json) = test.get("/gpio/read").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"]["success"], 1);
    assert_eq!(json["output"]["input1"], "10000000");
    assert_eq!(json["output"]["input2"], "00000000");
    assert_eq!(json["output"]["output"], "00000000");

    assert_eq!(json["service"]["name"], "pi_gpiod");
    assert_eq!(json["device"]["serial"], "00000000cafe");
    assert_eq!(json["device"]["name"], "00000000CAFE");
    assert_eq!(json["request"]["handler"], "gpio");
    assert_eq!(json["request"]["command"], "read");
    assert!(json["request"]["elapsedMS"].is_u64());
}

#[tokio::test]
async fn test_gpio_write_stages_output() {
    let test = TestApp::new("write");

    let (status, json) = test.get("/gpio/write?output=11000011").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"]["success"], 1);
    assert_eq!(json["request"]["output"], "11000011");
    assert_eq!(test.state.gpio.bank(Bank::Output), "00000000");

    test.state.gpio.poll_once().unwrap();
    assert_eq!(test.state.gpio.bank(Bank::Output), "11000011");
    assert!(test.sim.level(10) && test.sim.level(19));
}

#[tokio::test]
async fn test_gpio_readwrite_returns_previous_banks() {
    let test = TestApp::new("readwrite");

    let (status, json) = test.get("/gpio/ReadWrite?output=11111111").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"]["output"], "00000000");

    test.state.gpio.poll_once().unwrap();
    let (_, json) = test.get("/gpio/read").await;
    assert_eq!(json["output"]["output"], "11111111");
}

#[tokio::test]
async fn test_gpio_write_validation() {
    let test = TestApp::new("validation");

    for uri in [
        "/gpio/write",
        "/gpio/write?output=1",
        "/gpio/write?output=1234567a",
    ] {
        let (status, json) = test.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["output"]["success"], 0);
        assert_eq!(json["output"]["code"], 1);
        assert_eq!(json["errors"][0]["type"], "InvalidArgument");
    }
    assert_eq!(test.state.errors.cache().len(), 3);
}

#[tokio::test]
async fn test_unknown_commands() {
    let test = TestApp::new("unknown");

    let (status, json) = test.get("/gpio/blink").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["errors"][0]["type"], "NotFound");

    let (status, json) = test.get("/video/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["request"]["handler"], "video");
}

#[tokio::test]
async fn test_ping_and_stats() {
    let test = TestApp::new("stats");
    test.state.gpio.poll_once().unwrap();

    let (status, json) = test.get("/statistics/ping?log=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "Down");

    test.get("/gpio/write?output=xx").await;

    let (status, json) = test.get("/statistics/getstats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["gpio"]["input1"], "00000000");
    let cps = json["gpio"]["cps"].as_str().expect("cps is a string");
    assert!(cps.contains('.'));
    assert_eq!(cps.split('.').nth(1).map(str::len), Some(1));

    let commands = json["commands"].as_array().expect("commands list");
    let ping = commands
        .iter()
        .find(|c| c["name"] == "/statistics/ping")
        .expect("ping was logged");
    assert_eq!(ping["isPing"], true);
    assert!(commands.iter().any(|c| c["name"] == "/gpio/write"));

    let errors = json["errors"].as_array().expect("error report");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["type"], "InvalidArgument");
}

#[tokio::test]
async fn test_set_device_name() {
    let test = TestApp::new("rename");

    let (status, json) = test.get("/config/setdevicename?name=garage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"]["name"], "garage");
    assert_eq!(json["device"]["name"], "garage");

    let stored = std::fs::read_to_string(&test.storage).expect("Name should be persisted");
    let stored: Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored["deviceName"], "garage");

    let (status, _) = test.get("/config/setdevicename").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_logs() {
    let test = TestApp::new("logs");
    let now = Utc::now();
    let line = |minutes_ago: i64, message: &str| {
        let at = now - chrono::Duration::minutes(minutes_ago);
        format!("{}  INFO {}", at.to_rfc3339_opts(SecondsFormat::Micros, true), message)
    };

    std::fs::create_dir_all(&test.log_dir).unwrap();
    let old_day = (now - chrono::Duration::days(10)).date_naive();
    std::fs::write(
        test.log_dir.join(LogFiles::file_name(old_day)),
        format!("{}\n", line(10 * 24 * 60, "old")),
    )
    .unwrap();
    std::fs::write(
        test.log_dir.join(LogFiles::file_name(now.date_naive())),
        [line(30, "a"), line(3, "b"), line(1, "c")].join("\n"),
    )
    .unwrap();

    let (status, json) = test.get("/statistics/getlogs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"]["maxLines"], 1000);
    assert_eq!(json["output"]["count"], 3);
    assert!(json["output"]["lines"][0].as_str().unwrap().ends_with(" a"));

    let (_, json) = test.get("/statistics/getlogs?maxLines=2").await;
    let lines = json["output"]["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].as_str().unwrap().ends_with(" b"));
    assert!(lines[1].as_str().unwrap().ends_with(" c"));
    assert_eq!(json["request"]["maxLines"], "2");

    let (_, json) = test.get("/statistics/getlogs?minutes=2").await;
    assert_eq!(json["output"]["count"], 1);

    let (_, json) = test.get("/statistics/getlogs?minutes=20000").await;
    assert_eq!(json["output"]["count"], 4);
    assert!(json["output"]["lines"][0].as_str().unwrap().ends_with(" old"));

    let (_, json) = test.get("/statistics/getstats").await;
    let commands = json["commands"].as_array().expect("commands list");
    assert!(commands.iter().any(|c| c["name"] == "/statistics/getlogs"));
}

#[tokio::test]
async fn test_get_logs_disabled() {
    let mut test = TestApp::new("nologs");
    test.state.logs = None;
    test.app = create_app(&WebConfig::default(), test.state.clone());

    let (status, json) = test.get("/statistics/getlogs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["errors"][0]["type"], "NotFound");
}
