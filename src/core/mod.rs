//! 核心 HTTP 层：错误响应、统一响应体和请求日志中间件

pub mod error;
pub mod middleware;
pub mod response;

pub use error::CoreError;
pub use response::ApiResponse;
