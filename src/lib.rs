//! # 学生信息管理后台
//!
//! 服务端渲染的学生记录增删改查面板，后端可在 Firestore、Supabase
//! 和进程内存储之间切换：
//! - `app`：路由、会话守卫、页面与 JSON API
//! - `core`：错误响应、统一响应体、请求日志
//! - `infrastructure`：配置、日志、存储与身份服务适配器

pub mod app;
pub mod core;
pub mod infrastructure;

pub use app::{build_router, AppState};
pub use infrastructure::config::Config;
