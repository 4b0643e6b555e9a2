//! The HTTP API: capture, replay, status and a couple of utility routes.
//!
//! All handlers receive the daemon state as `&mut`, handed down from the
//! accept loop. Nothing here is shared or locked; the single server thread
//! owns the state outright.

use parrot_shared::{IrDevice, SignalTrace};
use serde_json::json;

use crate::hw::StatusLed;
use crate::server::{HandlerError, Method, Request, Response, Router, RouterError};

/// Capture parameters used when a request does not override them.
#[derive(Debug, Clone, Copy)]
pub struct CaptureDefaults {
    pub window_us: u64,
    pub invert: bool,
}

/// Everything the handlers operate on.
pub struct AppState {
    device: Box<dyn IrDevice>,
    led: Option<Box<dyn StatusLed>>,
    led_lit: bool,
    defaults: CaptureDefaults,
    last_capture: Option<SignalTrace>,
}

impl AppState {
    pub fn new(
        device: Box<dyn IrDevice>,
        led: Option<Box<dyn StatusLed>>,
        defaults: CaptureDefaults,
    ) -> Self {
        AppState {
            device,
            led,
            led_lit: false,
            defaults,
            last_capture: None,
        }
    }
}

/// Builds the route table for `state`.
///
/// Routes that cannot work on this board (no receiver, no LED) are left
/// out entirely, so hitting them is an honest 404 instead of a runtime
/// failure. Registration errors mean conflicting routes and are a bug.
pub fn router(state: &AppState) -> Result<Router<AppState>, RouterError> {
    let mut router = Router::new();
    router.add(Method::Get, "/info", info)?;
    for method in &[Method::Get, Method::Post, Method::Put, Method::Delete] {
        router.add(*method, "/echo", echo)?;
    }
    if state.device.can_capture() {
        router.add(Method::Get, "/capture", capture)?;
        router.add(Method::Post, "/capture", capture)?;
        router.add(Method::Post, "/replay", replay)?;
        router.add(Method::Get, "/signal", signal)?;
    } else {
        log::warn!("no IR receiver configured, capture routes disabled");
    }
    if state.led.is_some() {
        router.add(Method::Get, "/light", light_status)?;
        router.add(Method::Post, "/light", light_set)?;
        router.add(Method::Get, "/light/on", light_on)?;
        router.add(Method::Get, "/light/off", light_off)?;
    }
    Ok(router)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn info(state: &mut AppState, _request: &Request) -> Result<Response, HandlerError> {
    Response::json(&json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "carrier_hz": state.device.carrier_hz(),
        "window_us": state.defaults.window_us,
        "invert": state.defaults.invert,
        "capture": state.device.can_capture(),
        "light": state.led.is_some(),
    }))
}

/// Runs a capture and keeps the result as the trace to replay.
///
/// Blocks for the whole window. `window_us` and `invert` can be overridden
/// per request through query parameters.
fn capture(state: &mut AppState, request: &Request) -> Result<Response, HandlerError> {
    let window_us = match request.query_param("window_us") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| HandlerError::BadRequest(format!("invalid window_us: {:?}", raw)))?,
        None => state.defaults.window_us,
    };
    let invert = match request.query_param("invert") {
        Some(raw) => parse_bool(raw)
            .ok_or_else(|| HandlerError::BadRequest(format!("invalid invert: {:?}", raw)))?,
        None => state.defaults.invert,
    };

    let trace = state
        .device
        .capture(window_us, invert)
        .map_err(|e| HandlerError::Internal(e.to_string()))?;

    let mut body = json!({
        "edges": trace.len(),
        "span_us": trace.span_us(),
        "window_us": window_us,
    });
    if trace.is_empty() {
        body["message"] = json!("No IR signals detected.");
    }
    state.last_capture = Some(trace);
    Response::json(&body)
}

/// Replays the last captured trace. Blocks for the trace's span.
fn replay(state: &mut AppState, _request: &Request) -> Result<Response, HandlerError> {
    let trace = match &state.last_capture {
        Some(trace) => trace,
        None => {
            return Response::json(&json!({
                "sent": false,
                "message": "No signal data to send.",
            }))
        }
    };
    state.device.replay(trace);
    if trace.is_empty() {
        Response::json(&json!({
            "sent": false,
            "message": "No signal data to send.",
        }))
    } else {
        Response::json(&json!({
            "sent": true,
            "edges": trace.len(),
            "span_us": trace.span_us(),
            "message": "IR signal sent successfully.",
        }))
    }
}

/// Dumps the stored trace as JSON.
fn signal(state: &mut AppState, _request: &Request) -> Result<Response, HandlerError> {
    match &state.last_capture {
        Some(trace) => Response::json(&json!({
            "edges": trace.len(),
            "span_us": trace.span_us(),
            "signal": trace,
        })),
        None => Response::json(&json!({
            "signal": serde_json::Value::Null,
            "message": "No IR signals detected.",
        })),
    }
}

fn set_light(state: &mut AppState, lit: bool) -> Result<Response, HandlerError> {
    let led = state
        .led
        .as_mut()
        .expect("light routes registered without an LED");
    led.set_lit(lit);
    state.led_lit = lit;
    Response::json(&json!({ "is_active": lit }))
}

/// Sets the LED from `state=on|off`, given as a query parameter or as a
/// JSON body of the shape `{"state": "on"}`.
fn light_set(state: &mut AppState, request: &Request) -> Result<Response, HandlerError> {
    let wanted = request.query_param("state").map(str::to_string).or_else(|| {
        request
            .json_body()
            .and_then(|v| v.get("state").and_then(|s| s.as_str().map(String::from)))
    });
    match wanted.as_deref() {
        Some("on") => set_light(state, true),
        Some("off") => set_light(state, false),
        _ => Err(HandlerError::BadRequest(
            "state must be \"on\" or \"off\"".to_string(),
        )),
    }
}

fn light_on(state: &mut AppState, _request: &Request) -> Result<Response, HandlerError> {
    set_light(state, true)
}

fn light_off(state: &mut AppState, _request: &Request) -> Result<Response, HandlerError> {
    set_light(state, false)
}

fn light_status(state: &mut AppState, _request: &Request) -> Result<Response, HandlerError> {
    Response::json(&json!({ "is_active": state.led_lit }))
}

/// Debug helper: renders the parsed request back at the caller.
fn echo(_state: &mut AppState, request: &Request) -> Result<Response, HandlerError> {
    let mut page = format!("<h1>Full Request</h1><pre>{} {}\n", request.method, request.path);
    if !request.query.is_empty() {
        page.push_str(&format!("query: {:?}\n", request.query));
    }
    for (name, value) in &request.headers {
        page.push_str(&format!("{}: {}\n", name, value));
    }
    if !request.body.is_empty() {
        page.push('\n');
        page.push_str(&request.body);
    }
    page.push_str("</pre>");
    Ok(Response::html(page))
}
