/// Health check HTTP endpoint
/// Exposes /health, /ready and /metrics so a kiosk supervisor can tell
/// whether the display is still reaching the queue backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timeout for reading HTTP request (prevents slow-loris attacks)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time copy of the display counters
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub polls_successful: u64,
    pub polls_failed: u64,
    /// Calls put on screen since startup
    pub announcements: u64,
    /// Unix epoch seconds of the last poll, 0 before the first one
    pub last_poll_time: u64,
    pub last_poll_ok: bool,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            polls_successful: 0,
            polls_failed: 0,
            announcements: 0,
            last_poll_time: 0,
            last_poll_ok: true,
        }
    }
}

/// Counters shared between the poller, the announcer and the server
#[derive(Debug)]
pub struct HealthMetrics {
    polls_successful: AtomicU64,
    polls_failed: AtomicU64,
    announcements: AtomicU64,
    last_poll_time: AtomicU64,
    last_poll_ok: AtomicBool,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            polls_successful: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            announcements: AtomicU64::new(0),
            last_poll_time: AtomicU64::new(0),
            last_poll_ok: AtomicBool::new(true),
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl HealthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll_success(&self) {
        self.polls_successful.fetch_add(1, Ordering::Relaxed);
        self.last_poll_time.store(unix_now(), Ordering::Relaxed);
        self.last_poll_ok.store(true, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
        self.last_poll_time.store(unix_now(), Ordering::Relaxed);
        self.last_poll_ok.store(false, Ordering::Relaxed);
    }

    pub fn record_announcement(&self) {
        self.announcements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            polls_successful: self.polls_successful.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            announcements: self.announcements.load(Ordering::Relaxed),
            last_poll_time: self.last_poll_time.load(Ordering::Relaxed),
            last_poll_ok: self.last_poll_ok.load(Ordering::Relaxed),
        }
    }
}

/// Run the health check HTTP server until `cancel_token` fires
pub async fn run_health_server(
    port: u16,
    metrics: Arc<HealthMetrics>,
    cancel_token: CancellationToken,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind health check server on port {}: {}", port, e);
            return;
        }
    };

    info!("Health check server listening on http://0.0.0.0:{}/health", port);
    serve(listener, metrics, cancel_token).await;
}

async fn serve(listener: TcpListener, metrics: Arc<HealthMetrics>, cancel_token: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((mut socket, peer_addr)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_request(&mut socket, &metrics).await {
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
                info!("Health check server shutting down");
                break;
            }
        }
    }
}

async fn handle_request(
    socket: &mut tokio::net::TcpStream,
    metrics: &HealthMetrics,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];

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
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let response = route(path, &metrics.status());

    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;

    Ok(())
}

fn route(path: &str, status: &HealthStatus) -> String {
    match path {
        "/health" | "/healthz" | "/health/" => build_health_response(status),
        // Ready until the first poll completes, then tracks the last poll
        "/ready" | "/readyz" | "/ready/" => {
            build_ready_response(status.last_poll_ok || status.last_poll_time == 0)
        }
        "/metrics" => build_metrics_response(status),
        _ => build_not_found_response(),
    }
}

fn http_response(code: u16, reason: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        code,
        reason,
        content_type,
        body.len(),
        body
    )
}

fn build_health_response(status: &HealthStatus) -> String {
    let body = format!(
        r#"{{"status":"healthy","polls_successful":{},"polls_failed":{},"announcements":{},"last_poll_time":{},"last_poll_ok":{}}}"#,
        status.polls_successful,
        status.polls_failed,
        status.announcements,
        status.last_poll_time,
        status.last_poll_ok
    );
    http_response(200, "OK", "application/json", &body)
}

fn build_ready_response(ready: bool) -> String {
    if ready {
        http_response(200, "OK", "application/json", r#"{"ready":true}"#)
    } else {
        http_response(503, "Service Unavailable", "application/json", r#"{"ready":false}"#)
    }
}

fn build_metrics_response(status: &HealthStatus) -> String {
    // Prometheus text exposition format
    let body = format!(
        "# HELP clinic_visor_polls_total Board status polls performed\n\
         # TYPE clinic_visor_polls_total counter\n\
         clinic_visor_polls_total{{result=\"success\"}} {}\n\
         clinic_visor_polls_total{{result=\"failure\"}} {}\n\
         # HELP clinic_visor_announcements_total Calls shown on the display\n\
         # TYPE clinic_visor_announcements_total counter\n\
         clinic_visor_announcements_total {}\n\
         # HELP clinic_visor_last_poll_timestamp Unix timestamp of last poll\n\
         # TYPE clinic_visor_last_poll_timestamp gauge\n\
         clinic_visor_last_poll_timestamp {}\n\
         # HELP clinic_visor_last_poll_ok Whether the last poll succeeded (1) or failed (0)\n\
         # TYPE clinic_visor_last_poll_ok gauge\n\
         clinic_visor_last_poll_ok {}\n",
        status.polls_successful,
        status.polls_failed,
        status.announcements,
        status.last_poll_time,
        u8::from(status.last_poll_ok)
    );
    http_response(200, "OK", "text/plain; version=0.0.4", &body)
}

fn build_not_found_response() -> String {
    http_response(404, "Not Found", "application/json", r#"{"error":"Not Found"}"#)
}
