//! 核心响应处理模块

use serde::Serialize;
use uuid::Uuid;

/// API 响应结构
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub request_id: String,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 写操作已提交、等待同步时的响应体
#[derive(Debug, Serialize)]
pub struct Accepted {
    pub id: String,
    pub status: &'static str,
}

impl Accepted {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: "pending_sync",
        }
    }
}
