/// Report HTTP endpoint
/// Minimal HTTP/1.1 surface: one request per connection, JSON bodies
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ReportError;
use crate::health::render_metrics;
use crate::jobs::{ReportJobManager, ReportStatus};
use crate::search::{self, SearchFilter};

/// Timeout for reading HTTP request (prevents slow-loris attacks)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest request head we read
const MAX_REQUEST_BYTES: usize = 8192;

/// A rendered HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    fn new(status: u16, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body,
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::new(status, "application/json", body),
            Err(e) => {
                error!("Failed to encode response: {}", e);
                Self::detail(500, "Failed to encode response")
            }
        }
    }

    fn detail(status: u16, message: &str) -> Self {
        Self::new(
            status,
            "application/json",
            json!({ "detail": message }).to_string(),
        )
    }

    fn from_error(err: &ReportError) -> Self {
        Self::detail(err.status_code(), &err.to_string())
    }

    fn with_header(mut self, name: &str, value: String) -> Self {
        self.headers.push((name.to_string(), value));
        self
    }

    pub fn to_http(&self) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("Connection: close\r\n\r\n");
        head + &self.body
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Bind `0.0.0.0:port` and serve until cancelled
pub async fn run_server(port: u16, manager: ReportJobManager, cancel_token: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind report server on port {}: {}", port, e);
            return;
        }
    };

    info!("Report server listening on http://0.0.0.0:{}", port);
    serve(listener, manager, cancel_token).await;
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, manager: ReportJobManager, cancel_token: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((mut socket, peer_addr)) => {
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_request(&mut socket, &manager).await {
                                debug!("Error handling request from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Report server shutting down");
                break;
            }
        }
    }
}

async fn handle_request(socket: &mut TcpStream, manager: &ReportJobManager) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];

    let n = match timeout(REQUEST_TIMEOUT, socket.read(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!("Request timeout after {:?}", REQUEST_TIMEOUT);
            return Ok(());
        }
    };

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let mut request_line = request
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace();
    let method = request_line.next().unwrap_or("GET");
    let target = request_line.next().unwrap_or("/");

    let response = route(method, target, manager);
    debug!("{} {} -> {}", method, target, response.status);

    socket.write_all(response.to_http().as_bytes()).await?;
    socket.flush().await?;
    Ok(())
}

/// Split a request target into its path and decoded query parameters
pub fn parse_target(target: &str) -> (&str, HashMap<String, String>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect();
    (path, params)
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Dispatch one request. Must run inside a tokio runtime since
/// `/trigger_report` spawns the report worker.
pub fn route(method: &str, target: &str, manager: &ReportJobManager) -> Response {
    let (path, params) = parse_target(target);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match (method, path) {
        ("POST", "/trigger_report") => trigger_report(manager),
        (_, "/trigger_report") => Response::detail(405, "Method Not Allowed"),
        ("POST", "/ingest") => match manager.reload() {
            Some(_) => Response::json(200, &json!({ "message": "Ingestion started" })),
            None => Response::detail(400, "No data directory configured"),
        },
        (_, "/ingest") => Response::detail(405, "Method Not Allowed"),
        ("GET", "/") => Response::json(200, &json!({ "message": "Store monitoring API is running" })),
        ("GET", "/get_report") => with_report_id(&params, |id| get_report(manager, id)),
        ("GET", "/reports") => list_reports(manager),
        ("GET", "/restaurants") => {
            with_report_id(&params, |id| list_restaurants(manager, id, &params))
        }
        ("GET", "/summary") => with_report_id(&params, |id| report_summary(manager, id)),
        ("GET", "/stats") => match manager.data().stats() {
            Ok(stats) => Response::json(200, &stats),
            Err(e) => Response::from_error(&e),
        },
        ("GET", "/health") => {
            let status = manager.metrics().status();
            Response::json(
                200,
                &json!({
                    "status": "healthy",
                    "timestamp": Utc::now(),
                    "reports_completed": status.reports_completed,
                    "reports_failed": status.reports_failed,
                    "last_report_time": status.last_report_time,
                    "last_report_ok": status.last_report_ok,
                }),
            )
        }
        ("GET", "/metrics") => Response::new(
            200,
            "text/plain; version=0.0.4",
            render_metrics(&manager.metrics().status()),
        ),
        ("GET", other) => match other.strip_prefix("/restaurant/") {
            Some(store_id) if !store_id.is_empty() && !store_id.contains('/') => {
                let store_id = decode(store_id);
                with_report_id(&params, |id| restaurant_details(manager, id, &store_id))
            }
            _ => Response::detail(404, "Not Found"),
        },
        _ => Response::detail(404, "Not Found"),
    }
}

fn with_report_id<F>(params: &HashMap<String, String>, handler: F) -> Response
where
    F: FnOnce(&str) -> Response,
{
    match params.get("report_id").filter(|id| !id.is_empty()) {
        Some(id) => handler(id),
        None => Response::detail(400, "Missing report_id query parameter"),
    }
}

fn trigger_report(manager: &ReportJobManager) -> Response {
    match manager.trigger() {
        Ok(report_id) => Response::json(200, &json!({ "report_id": report_id })),
        Err(e) => {
            error!("Failed to trigger report: {}", e);
            Response::detail(500, &format!("Error triggering report: {}", e))
        }
    }
}

fn get_report(manager: &ReportJobManager, report_id: &str) -> Response {
    match manager.status(report_id) {
        Ok(ReportStatus::NotFound) => Response::detail(404, "Report not found"),
        Ok(ReportStatus::Running) => Response::json(200, &json!({ "status": "Running" })),
        Ok(ReportStatus::Complete(payload)) => Response::new(200, "text/csv", payload.csv)
            .with_header(
                "Content-Disposition",
                format!("attachment; filename=report_{}.csv", report_id),
            ),
        Ok(ReportStatus::Failed(message)) => {
            Response::detail(500, &format!("Report generation failed: {}", message))
        }
        Err(e) => Response::from_error(&e),
    }
}

fn list_reports(manager: &ReportJobManager) -> Response {
    match manager.list() {
        Ok(reports) => Response::json(
            200,
            &json!({ "total_reports": reports.len(), "reports": reports }),
        ),
        Err(e) => Response::from_error(&e),
    }
}

fn list_restaurants(
    manager: &ReportJobManager,
    report_id: &str,
    params: &HashMap<String, String>,
) -> Response {
    let min_uptime = match params.get("min_uptime").map(|v| v.parse::<f64>()) {
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => return Response::detail(400, "min_uptime must be a number"),
        None => None,
    };
    let filter = SearchFilter {
        store_id: params.get("store_id").cloned().filter(|s| !s.is_empty()),
        min_uptime,
    };

    match manager.completed_report(report_id) {
        Ok(report) => Response::json(200, &search::restaurants(report_id, &report, &filter)),
        Err(e) => Response::from_error(&e),
    }
}

fn restaurant_details(manager: &ReportJobManager, report_id: &str, store_id: &str) -> Response {
    let report = match manager.completed_report(report_id) {
        Ok(report) => report,
        Err(e) => return Response::from_error(&e),
    };
    match search::store_details(report_id, &report, store_id) {
        Some(details) => Response::json(200, &details),
        None => Response::detail(404, &format!("Store {} not found in report", store_id)),
    }
}

fn report_summary(manager: &ReportJobManager, report_id: &str) -> Response {
    let report = match manager.completed_report(report_id) {
        Ok(report) => report,
        Err(e) => return Response::from_error(&e),
    };
    match search::summarize(report_id, &report) {
        Some(summary) => Response::json(200, &summary),
        None => Response::detail(400, "No store data in report"),
    }
}
