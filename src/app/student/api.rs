//! 学生 JSON API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use validator::Validate;

use super::model::{StudentFields, StudentRecord};
use crate::app::AppState;
use crate::core::response::Accepted;
use crate::core::{ApiResponse, CoreError};

pub async fn list_students(State(state): State<AppState>) -> Json<ApiResponse<Vec<StudentRecord>>> {
    let records = state.students.list();
    Json(ApiResponse::success(records.as_ref().clone()))
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StudentRecord>>, CoreError> {
    let record = state
        .students
        .get(&id)
        .ok_or_else(|| CoreError::NotFound(format!("student {} not found", id)))?;
    Ok(Json(ApiResponse::success(record)))
}

/// 202：记录要等下一次同步才会出现在列表里
pub async fn create_student(
    State(state): State<AppState>,
    payload: Result<Json<StudentFields>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Accepted>>), CoreError> {
    let Json(fields) = payload?;
    let fields = fields.normalized();
    fields.validate()?;
    let id = state.students.create(fields).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(Accepted::new(id)))))
}

pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StudentFields>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Accepted>>), CoreError> {
    let Json(fields) = payload?;
    let fields = fields.normalized();
    fields.validate()?;
    state.students.update(&id, fields).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(Accepted::new(id)))))
}

pub async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<Accepted>>), CoreError> {
    state.students.delete(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(Accepted::new(id)))))
}
