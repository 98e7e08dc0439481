//! 认证：会话守卫、登录/登出页面和路由保护中间件

pub mod handler;
pub mod session;
pub mod view;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::app::AppState;
use crate::core::CoreError;

pub use session::SessionGuard;

/// 从 Cookie 头中取出指定名称的值
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(name: &str, session_id: &str) -> String {
    format!("{}={}; HttpOnly; Path=/; SameSite=Lax", name, session_id)
}

pub fn clear_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", name)
}

/// 页面路由保护：未登录重定向到登录页
pub async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    // 初始会话检查完成前不渲染受保护内容
    state.sessions.wait_ready().await;

    let session = match cookie_value(req.headers(), &state.config.session.cookie_name) {
        Some(sid) => state.sessions.current(&sid).await,
        None => None,
    };
    match session {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            debug!("未登录访问 {}，重定向到登录页", req.uri());
            Redirect::to("/").into_response()
        }
    }
}

/// API 路由保护：接受会话 cookie 或 `Authorization: Bearer <会话 id>`
pub async fn require_api_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    state.sessions.wait_ready().await;

    let sid = bearer_token(req.headers())
        .or_else(|| cookie_value(req.headers(), &state.config.session.cookie_name))
        .ok_or(CoreError::Unauthorized)?;
    let session = state
        .sessions
        .current(&sid)
        .await
        .ok_or(CoreError::Unauthorized)?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sid=abc123; x=1"));
        assert_eq!(cookie_value(&headers, "sid").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sid="));
        assert_eq!(cookie_value(&headers, "sid"), None);
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s-1"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("s-1"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
