//! 登录 / 登出处理器

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tracing::warn;

use super::{clear_cookie, cookie_value, session_cookie, view};
use crate::app::layout::{Notice, NoticeQuery};
use crate::app::AppState;
use crate::infrastructure::identity::AuthError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// 登录页；已登录时直接进入列表
pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NoticeQuery>,
) -> Response {
    state.sessions.wait_ready().await;
    if let Some(sid) = cookie_value(&headers, &state.config.session.cookie_name) {
        if state.sessions.current(&sid).await.is_some() {
            return Redirect::to("/students").into_response();
        }
    }
    Html(view::login_page(query.notice(), "")).into_response()
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.sessions.login(form.email.trim(), &form.password).await {
        Ok(session) => {
            let cookie = session_cookie(&state.config.session.cookie_name, &session.id);
            (
                [(header::SET_COOKIE, cookie)],
                Redirect::to(&Notice::LoggedIn.redirect_to("/students")),
            )
                .into_response()
        }
        Err(e) => {
            // 对外只给出通用提示
            if !matches!(e, AuthError::InvalidCredentials) {
                warn!("登录失败 ({}): {}", state.sessions.provider_name(), e);
            }
            (
                StatusCode::UNAUTHORIZED,
                Html(view::login_page(Some(Notice::InvalidCredentials), &form.email)),
            )
                .into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie_name = &state.config.session.cookie_name;
    let session = match cookie_value(&headers, cookie_name) {
        Some(sid) => state.sessions.current(&sid).await,
        None => None,
    };
    let Some(session) = session else {
        return ([(header::SET_COOKIE, clear_cookie(cookie_name))], Redirect::to("/"))
            .into_response();
    };
    match state.sessions.logout(&session).await {
        Ok(()) => (
            [(header::SET_COOKIE, clear_cookie(cookie_name))],
            Redirect::to(&Notice::LoggedOut.redirect_to("/")),
        )
            .into_response(),
        Err(e) => {
            warn!("登出失败 ({}): {}", session.user().email, e);
            Redirect::to(&Notice::LogoutFailed.redirect_to("/students")).into_response()
        }
    }
}
