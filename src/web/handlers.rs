//! HTTP handlers for the `gpio`, `statistics` and `config` command groups.
//!
//! Every response shares one JSON envelope: `service`, `device` and `request`
//! objects describing who answered what, plus the command's `output`.

use crate::device::{self, DeviceInfo, ServiceStatus};
use crate::error::{Result, ServiceError};
use crate::gpio::{Bank, GpioManager};
use crate::health::ErrorHandler;
use crate::logs::{LogFiles, LogQuery};
use crate::stats::ServiceStats;
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

type Params = HashMap<String, String>;

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub gpio: Arc<GpioManager>,
    pub stats: Arc<ServiceStats>,
    pub errors: ErrorHandler,
    pub device: Arc<DeviceInfo>,
    pub status: Arc<ServiceStatus>,
    /// Daily log files, `None` when logging to the console only
    pub logs: Option<LogFiles>,
}

/// What a command produced: its `output` object plus any extra top-level keys.
struct Reply {
    output: Value,
    extra: Map<String, Value>,
}

impl Reply {
    fn success(fields: Value) -> Self {
        let mut output = json!({ "success": 1 });
        if let (Some(output), Value::Object(fields)) = (output.as_object_mut(), fields) {
            output.extend(fields);
        }
        Self {
            output,
            extra: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// `/gpio/:command`
pub async fn gpio(
    State(state): State<AppState>,
    Path(command): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
) -> Response {
    dispatch(&state, "gpio", &command, params, &uri, gpio_command)
}

/// `/statistics/:command`
///
/// `getlogs` reads files, so it is dispatched on the blocking pool.
pub async fn statistics(
    State(state): State<AppState>,
    Path(command): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
) -> Response {
    if !command.eq_ignore_ascii_case("getlogs") {
        return dispatch(&state, "statistics", &command, params, &uri, statistics_command);
    }

    let blocking = state.clone();
    let task = tokio::task::spawn_blocking(move || {
        dispatch(&blocking, "statistics", &command, params, &uri, statistics_command)
    });
    match task.await {
        Ok(response) => response,
        Err(e) => {
            error!("getlogs task failed: {}", e);
            let err = report(
                &state,
                ServiceError::system_error(format!("Reading logs failed: {}", e)),
            );
            (
                status_for(&err),
                Json(json!({
                    "output": { "success": 0, "code": 1, "message": err.to_string() },
                    "errors": [{ "type": err.kind(), "message": err.to_string() }],
                })),
            )
                .into_response()
        }
    }
}

/// `/config/:command`
pub async fn config(
    State(state): State<AppState>,
    Path(command): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
) -> Response {
    dispatch(&state, "config", &command, params, &uri, config_command)
}

/// Requests outside every known handler.
pub async fn fallback(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    uri: Uri,
) -> Response {
    let mut segments = uri.path().trim_matches('/').splitn(2, '/');
    let handler = segments.next().unwrap_or_default().to_string();
    let command = segments.next().unwrap_or_default().to_string();
    dispatch(&state, &handler, &command, params, &uri, |state, _, _| {
        Err(report(
            state,
            ServiceError::not_found(format!("Handler '{}' not found", handler)),
        ))
    })
}

fn dispatch<F>(
    state: &AppState,
    handler: &str,
    command: &str,
    params: Params,
    uri: &Uri,
    run: F,
) -> Response
where
    F: FnOnce(&AppState, &str, &Params) -> Result<Reply>,
{
    let started = Instant::now();
    if wants_logging(&params) {
        info!("Handling request: {}", uri);
    }

    let command = command.to_lowercase();
    let result = run(state, &command, &params);

    let elapsed = started.elapsed();
    let name = format!("/{}/{}", handler, command);
    let is_ping = handler == "statistics" && command == "ping";
    state.stats.log_command(&name, elapsed, is_ping);
    debug!("{} handled in {:?}", name, elapsed);

    let mut request = Map::new();
    request.insert("handler".to_string(), json!(handler));
    request.insert("command".to_string(), json!(command));
    for (key, value) in &params {
        request.insert(key.clone(), json!(value));
    }
    request.insert("elapsedMS".to_string(), json!(elapsed.as_millis() as u64));

    let mut body = Map::new();
    body.insert("service".to_string(), service_summary(&state.device));
    body.insert("device".to_string(), json!(state.device.summary()));
    body.insert("request".to_string(), Value::Object(request));

    let status = match result {
        Ok(reply) => {
            body.extend(reply.extra);
            body.insert("output".to_string(), reply.output);
            StatusCode::OK
        }
        Err(err) => {
            body.insert(
                "output".to_string(),
                json!({ "success": 0, "code": 1, "message": err.to_string() }),
            );
            body.insert(
                "errors".to_string(),
                json!([{ "type": err.kind(), "message": err.to_string() }]),
            );
            status_for(&err)
        }
    };

    (status, Json(Value::Object(body))).into_response()
}

fn gpio_command(state: &AppState, command: &str, params: &Params) -> Result<Reply> {
    match command {
        "read" => Ok(Reply::success(read_banks(&state.gpio))),
        "write" => {
            let value = required(state, params, "output")?;
            state.gpio.set_bank(Bank::Output, value)?;
            Ok(Reply::success(json!({})))
        }
        "readwrite" => {
            let value = required(state, params, "output")?;
            let banks = read_banks(&state.gpio);
            state.gpio.set_bank(Bank::Output, value)?;
            Ok(Reply::success(banks))
        }
        _ => Err(unknown_command(state, "gpio", command)),
    }
}

fn statistics_command(state: &AppState, command: &str, params: &Params) -> Result<Reply> {
    match command {
        "ping" => Ok(Reply::success(json!({})).with("state", json!(state.status.state()))),
        "getstats" => {
            let summary = state.stats.summary();
            Ok(Reply::success(json!({}))
                .with("state", json!(state.status.state()))
                .with("commands", json!(summary.commands))
                .with("operations", json!(summary.operations))
                .with("gpio", json!(state.gpio.runtime_statistics()))
                .with("errors", json!(state.errors.cache().report())))
        }
        "getlogs" => {
            let Some(logs) = &state.logs else {
                return Err(report(
                    state,
                    ServiceError::not_found("Log files are not enabled"),
                ));
            };
            let query = LogQuery::parse(
                params.get("maxLines").map(String::as_str),
                params.get("minutes").map(String::as_str),
            );
            let lines = logs.tail(query).map_err(|e| report(state, e))?;
            Ok(Reply::success(json!({
                "maxLines": query.max_lines,
                "minutes": query.minutes,
                "count": lines.len(),
                "lines": lines,
            })))
        }
        _ => Err(unknown_command(state, "statistics", command)),
    }
}

fn config_command(state: &AppState, command: &str, params: &Params) -> Result<Reply> {
    match command {
        "setdevicename" => {
            let name = required(state, params, "name")?;
            state
                .device
                .set_name(name)
                .map_err(|e| report(state, e))?;
            Ok(Reply::success(json!({ "name": state.device.name() })))
        }
        _ => Err(unknown_command(state, "config", command)),
    }
}

fn read_banks(gpio: &GpioManager) -> Value {
    json!({
        "input1": gpio.bank(Bank::Input1),
        "input2": gpio.bank(Bank::Input2),
        "output": gpio.bank(Bank::Output),
    })
}

fn service_summary(device: &DeviceInfo) -> Value {
    json!({
        "name": crate::SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "now": chrono::Utc::now().to_rfc3339(),
        "runningTime": device::format_running_time(device.running_time()),
        "memoryUsageMB": device.memory_usage_mb(),
    })
}

fn required<'a>(state: &AppState, params: &'a Params, name: &str) -> Result<&'a str> {
    match params.get(name) {
        Some(value) => Ok(value.as_str()),
        None => Err(report(
            state,
            ServiceError::invalid_argument(format!("Parameter '{}' is required", name)),
        )),
    }
}

fn unknown_command(state: &AppState, handler: &str, command: &str) -> ServiceError {
    report(
        state,
        ServiceError::not_found(format!("Command '{}' not found in handler '{}'", command, handler)),
    )
}

fn report(state: &AppState, err: ServiceError) -> ServiceError {
    state.errors.report(&err);
    err
}

fn wants_logging(params: &Params) -> bool {
    !matches!(
        params.get("log").map(|v| v.to_lowercase()).as_deref(),
        Some("0") | Some("false")
    )
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
