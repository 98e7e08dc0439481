//! 基础设施层：配置、日志、存储后端与身份服务

pub mod config;
pub mod identity;
pub mod logger;
pub mod store;
