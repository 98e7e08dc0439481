//! 核心中间件模块

use axum::{extract::Request, middleware::Next, response::Response};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// 请求日志记录
#[derive(Serialize)]
struct RequestLog {
    method: String,
    uri: String,
    status: u16,
    duration_ms: u64,
    user_agent: Option<String>,
}

/// 请求日志中间件
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let response = next.run(req).await;
    let status = response.status();

    let log = RequestLog {
        method: method.to_string(),
        uri: uri.to_string(),
        status: status.as_u16(),
        duration_ms: start.elapsed().as_millis() as u64,
        user_agent,
    };
    let line = serde_json::to_string(&log).unwrap_or_default();
    if status.is_server_error() {
        warn!("Request: {}", line);
    } else {
        info!("Request: {}", line);
    }

    response
}
