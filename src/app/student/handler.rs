//! 学生页面处理器
//!
//! 写操作成功后只重定向回列表，新数据由同步任务在收到后端通知后装入快照。

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use tracing::warn;
use validator::Validate;

use super::model::StudentFields;
use super::view::{self, FormMode};
use crate::app::layout::{Notice, NoticeQuery};
use crate::app::AppState;
use crate::infrastructure::identity::Session;

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<NoticeQuery>,
) -> Html<String> {
    let records = state.students.list();
    Html(view::list_page(session.user(), query.notice(), &records))
}

pub async fn new_form(Extension(session): Extension<Session>) -> Html<String> {
    Html(view::form_page(
        session.user(),
        FormMode::Add,
        &StudentFields::default(),
        None,
        None,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(fields): Form<StudentFields>,
) -> Response {
    let fields = fields.normalized();
    if let Err(errors) = fields.validate() {
        let html = view::form_page(session.user(), FormMode::Add, &fields, Some(&errors), None);
        return (StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response();
    }
    match state.students.create(fields.clone()).await {
        Ok(_) => Redirect::to(&Notice::StudentAdded.redirect_to("/students")).into_response(),
        Err(e) => {
            warn!("新增学生失败: {}", e);
            let html = view::form_page(
                session.user(),
                FormMode::Add,
                &fields,
                None,
                Some(Notice::SaveFailed),
            );
            (StatusCode::BAD_GATEWAY, Html(html)).into_response()
        }
    }
}

pub async fn show(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Response {
    match state.students.get(&id) {
        Some(record) => Html(view::form_page(
            session.user(),
            FormMode::View(&record.id),
            &record.fields,
            None,
            None,
        ))
        .into_response(),
        None => not_found(&session, &id),
    }
}

pub async fn edit_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Response {
    match state.students.get(&id) {
        Some(record) => Html(view::form_page(
            session.user(),
            FormMode::Edit(&record.id),
            &record.fields,
            None,
            None,
        ))
        .into_response(),
        None => not_found(&session, &id),
    }
}

pub async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Form(fields): Form<StudentFields>,
) -> Response {
    let fields = fields.normalized();
    if let Err(errors) = fields.validate() {
        let html = view::form_page(
            session.user(),
            FormMode::Edit(&id),
            &fields,
            Some(&errors),
            None,
        );
        return (StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response();
    }
    match state.students.update(&id, fields.clone()).await {
        Ok(()) => Redirect::to(&Notice::StudentUpdated.redirect_to("/students")).into_response(),
        Err(e) => {
            warn!("更新学生失败 ({}): {}", id, e);
            let html = view::form_page(
                session.user(),
                FormMode::Edit(&id),
                &fields,
                None,
                Some(Notice::SaveFailed),
            );
            (StatusCode::BAD_GATEWAY, Html(html)).into_response()
        }
    }
}

/// 删除确认页；取消只是回到列表，不触发任何写操作
pub async fn confirm_delete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Response {
    match state.students.get(&id) {
        Some(record) => Html(view::delete_page(session.user(), &record)).into_response(),
        None => not_found(&session, &id),
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    match state.students.delete(&id).await {
        Ok(()) => Redirect::to(&Notice::StudentDeleted.redirect_to("/students")),
        Err(e) => {
            warn!("删除学生失败 ({}): {}", id, e);
            Redirect::to(&Notice::DeleteFailed.redirect_to("/students"))
        }
    }
}

fn not_found(session: &Session, id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(view::not_found_page(session.user(), id)),
    )
        .into_response()
}
