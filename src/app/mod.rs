//! 应用层：路由装配与共享状态

pub mod auth;
pub mod layout;
pub mod student;

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::core::middleware::request_logging_middleware;
use crate::infrastructure::config::Config;
use auth::SessionGuard;
use student::StudentService;

#[derive(Clone)]
pub struct AppState {
    pub students: StudentService,
    pub sessions: Arc<SessionGuard>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(students: StudentService, sessions: Arc<SessionGuard>, config: Arc<Config>) -> Self {
        Self {
            students,
            sessions,
            config,
        }
    }
}

/// 构建完整路由
pub fn build_router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/students", get(student::handler::list).post(student::handler::create))
        .route("/students/new", get(student::handler::new_form))
        .route(
            "/students/:id",
            get(student::handler::show).post(student::handler::update),
        )
        .route("/students/:id/edit", get(student::handler::edit_form))
        .route(
            "/students/:id/delete",
            get(student::handler::confirm_delete).post(student::handler::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api = Router::new()
        .route(
            "/api/students",
            get(student::api::list_students).post(student::api::create_student),
        )
        .route(
            "/api/students/:id",
            get(student::api::get_student)
                .put(student::api::update_student)
                .delete(student::api::delete_student),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_session,
        ));

    let timeout = Duration::from_secs(state.config.http.timeout_seconds);

    Router::new()
        .route("/", get(auth::handler::login_page).post(auth::handler::login))
        .route("/logout", post(auth::handler::logout))
        .route("/health", get(health))
        .merge(pages)
        .merge(api)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend": state.students.backend(),
        "students": state.students.list().len(),
        "sessionsReady": state.sessions.is_ready(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
