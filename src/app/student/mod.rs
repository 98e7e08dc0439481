//! 学生记录：模型、同步服务、页面与 JSON API

pub mod api;
pub mod handler;
pub mod model;
pub mod service;
pub mod view;

pub use model::{StudentFields, StudentRecord};
pub use service::{RecordError, StudentService, SyncHandle};
