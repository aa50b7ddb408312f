use std::io::Read;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::display::BoardSnapshot;
use crate::settings::{MasjidSettings, parse_settings_document};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Requests the API hands to the control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    ReplaceSettings(MasjidSettings),
    SetAlertEnabled(bool),
}

#[derive(Debug)]
pub struct ApiSharedState {
    pub snapshot: Option<BoardSnapshot>,
    pub settings: MasjidSettings,
    total_requests: u64,
    server_started_unix_ms: i64,
}

impl Default for ApiSharedState {
    fn default() -> Self {
        Self {
            snapshot: None,
            settings: MasjidSettings::default(),
            total_requests: 0,
            server_started_unix_ms: Local::now().timestamp_millis(),
        }
    }
}

impl ApiSharedState {
    pub fn with_settings(settings: MasjidSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    pub state: Arc<Mutex<ApiSharedState>>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(
        config: ApiServerConfig,
        settings: MasjidSettings,
        commands: Sender<RuntimeCommand>,
    ) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        info!("local API listening on http://{bind}");
        let state = Arc::new(Mutex::new(ApiSharedState::with_settings(settings)));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join = thread::spawn(move || {
            run_server_loop(server, state_for_thread, commands, stop_for_thread)
        });

        Ok(Self {
            state,
            stop,
            http_join: Some(http_join),
        })
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(
    server: Server,
    state: Arc<Mutex<ApiSharedState>>,
    commands: Sender<RuntimeCommand>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state, &commands),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

#[derive(Debug)]
enum Reply {
    Json(u16, Value),
    Text(u16, String),
}

fn handle_request(
    mut request: tiny_http::Request,
    state: &Arc<Mutex<ApiSharedState>>,
    commands: &Sender<RuntimeCommand>,
) {
    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    let remote_ip = remote_addr.ip();
    if !is_local_network_ip(remote_ip) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let mut body = String::new();
    if let Err(err) = request
        .as_reader()
        .take(MAX_BODY_BYTES)
        .read_to_string(&mut body)
    {
        let _ = send_text(request, StatusCode(400), &format!("unreadable body: {err}"));
        return;
    }

    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);
    let base_url = request_base_url(&request);
    debug!("{method} {path} from {remote_ip}");

    let reply = match state.lock() {
        Ok(mut guard) => {
            guard.total_requests += 1;
            route(&method, path, query, &body, &base_url, &mut guard, commands)
        }
        Err(_) => Reply::Text(500, "internal state lock error".to_string()),
    };

    let _ = match reply {
        Reply::Json(status, payload) => send_json(request, StatusCode(status), &payload),
        Reply::Text(status, text) => send_text(request, StatusCode(status), &text),
    };
}

fn route(
    method: &Method,
    path: &str,
    query: &str,
    body: &str,
    base_url: &str,
    state: &mut ApiSharedState,
    commands: &Sender<RuntimeCommand>,
) -> Reply {
    match (method, path) {
        (Method::Get, "/v1") => Reply::Json(
            200,
            json!({
                "api_base": base_url,
                "state_url": format!("{base_url}/v1/state"),
                "settings_url": format!("{base_url}/v1/settings"),
                "alert_url": format!("{base_url}/v1/alert"),
                "health_url": format!("{base_url}/healthz"),
                "total_requests": state.total_requests,
                "server_started_unix_ms": state.server_started_unix_ms,
            }),
        ),
        (Method::Get, "/" | "/v1/state") => match state.snapshot.as_ref() {
            Some(snapshot) if snapshot.ready => json_reply(200, snapshot),
            Some(snapshot) => Reply::Json(
                503,
                json!({ "ready": false, "status": snapshot.status }),
            ),
            None => Reply::Json(503, json!({ "ready": false })),
        },
        (Method::Get, "/v1/settings") => json_reply(200, &state.settings),
        (Method::Put | Method::Post, "/v1/settings") => match parse_settings_document(body) {
            Ok(settings) => {
                if commands
                    .send(RuntimeCommand::ReplaceSettings(settings.clone()))
                    .is_err()
                {
                    return Reply::Text(503, "runtime is not accepting commands".to_string());
                }
                info!("settings update accepted over API");
                let reply = json_reply(202, &settings);
                state.settings = settings;
                reply
            }
            Err(err) => {
                warn!("rejected settings update: {err:#}");
                Reply::Text(400, format!("{err:#}"))
            }
        },
        (Method::Post, "/v1/alert") => {
            let Some(enabled) = query_param(query, "enabled").and_then(parse_bool) else {
                return Reply::Text(400, "expected ?enabled=true|false".to_string());
            };
            if commands
                .send(RuntimeCommand::SetAlertEnabled(enabled))
                .is_err()
            {
                return Reply::Text(503, "runtime is not accepting commands".to_string());
            }
            state.settings.alert_enabled = enabled;
            Reply::Json(202, json!({ "alert_enabled": enabled }))
        }
        (Method::Get, "/healthz") => Reply::Text(200, "ok".to_string()),
        (_, "/" | "/v1" | "/v1/state" | "/v1/settings" | "/v1/alert" | "/healthz") => {
            Reply::Text(405, "method not allowed".to_string())
        }
        _ => Reply::Text(404, "not found".to_string()),
    }
}

fn json_reply<T: Serialize>(status: u16, payload: &T) -> Reply {
    match serde_json::to_value(payload) {
        Ok(value) => Reply::Json(status, value),
        Err(err) => Reply::Text(500, format!("failed to encode response: {err}")),
    }
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn request_base_url(request: &tiny_http::Request) -> String {
    for header in request.headers() {
        if header.field.equiv("Host") {
            let host = header.value.as_str().trim();
            if !host.is_empty() {
                return format!("http://{host}");
            }
        }
    }
    "http://127.0.0.1:8099".to_string()
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if k == key {
            return Some(v);
        }
    }
    None
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
