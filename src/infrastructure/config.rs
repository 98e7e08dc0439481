//! 配置基础设施
//!
//! 配置来自 TOML 文件（找不到时用默认值），后端连接凭据由环境变量覆盖。
//! 配置在 `main` 中构建一次并向下传递，不使用全局实例。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// 系统配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 服务配置
    pub http: HttpConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 后端选择
    pub backend: BackendConfig,
    /// Firestore / Firebase Auth 配置
    pub firestore: FirestoreConfig,
    /// Supabase 配置
    pub supabase: SupabaseConfig,
    /// 会话配置
    pub session: SessionConfig,
    /// 内存后端配置
    pub memory: MemoryConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// 绑定地址
    pub bind_address: String,
    /// 端口
    pub port: u16,
    /// 请求超时时间（秒）
    pub timeout_seconds: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    pub level: String,
    /// 是否启用控制台输出
    pub console_output: bool,
    /// 是否写入按日分割的日志文件
    pub file_output: bool,
    /// 日志目录
    pub log_path: PathBuf,
    /// 日志文件名前缀
    pub file_prefix: String,
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Firestore,
    Supabase,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" | "firebase" => Ok(BackendKind::Firestore),
            "supabase" => Ok(BackendKind::Supabase),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ConfigError::Validation(format!("未知的后端类型: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

/// Firestore 与 Firebase Auth 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub collection: String,
    /// Web API key（Firebase Auth 与 Firestore REST 共用）
    pub api_key: String,
    /// 可选的 OAuth 访问令牌，用于 Firestore 数据请求
    pub access_token: Option<String>,
    /// 变更监听的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// REST 根地址（可指向模拟器）
    pub firestore_url: String,
    pub auth_url: String,
    pub token_url: String,
}

/// Supabase 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// 项目地址，例如 https://xyz.supabase.co
    pub url: String,
    pub anon_key: String,
    pub schema: String,
    pub table: String,
    /// Realtime 心跳间隔（秒）
    pub heartbeat_seconds: u64,
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// 会话持久化文件；为空时只保存在内存中
    pub store_path: Option<PathBuf>,
}

/// 内存后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub users: Vec<MemoryUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUser {
    pub email: String,
    pub password: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            timeout_seconds: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_path: PathBuf::from("./logs"),
            file_prefix: "student-admin".to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
        }
    }
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: "(default)".to_string(),
            collection: "students".to_string(),
            api_key: String::new(),
            access_token: None,
            poll_interval_ms: 2000,
            firestore_url: "https://firestore.googleapis.com/v1".to_string(),
            auth_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_url: "https://securetoken.googleapis.com/v1".to_string(),
        }
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            schema: "public".to_string(),
            table: "students".to_string(),
            heartbeat_seconds: 25,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            store_path: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            users: vec![MemoryUser {
                email: "admin@example.com".to_string(),
                password: "admin123".to_string(),
            }],
        }
    }
}

impl Config {
    /// 从配置文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::FileRead(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 用环境变量覆盖凭据与关键参数
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("STUDENT_ADMIN_BACKEND") {
            self.backend.kind = kind.parse()?;
        }
        if let Some(port) = lookup("STUDENT_ADMIN_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::Validation(format!("无效的端口: {}", port)))?;
        }
        if let Some(v) = lookup("FIREBASE_API_KEY") {
            self.firestore.api_key = v;
        }
        if let Some(v) = lookup("FIREBASE_PROJECT_ID") {
            self.firestore.project_id = v;
        }
        if let Some(v) = lookup("FIRESTORE_ACCESS_TOKEN") {
            self.firestore.access_token = Some(v);
        }
        if let Some(v) = lookup("SUPABASE_URL") {
            self.supabase.url = v;
        }
        if let Some(v) = lookup("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = v;
        }
        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Validation("HTTP端口必须大于0".to_string()));
        }
        if self.http.bind_address.is_empty() {
            return Err(ConfigError::Validation("绑定地址不能为空".to_string()));
        }
        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::Validation("请求超时时间必须大于0".to_string()));
        }
        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::Validation("会话 cookie 名称不能为空".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "无效的日志级别: {}，有效值: {:?}",
                self.logging.level, valid_levels
            )));
        }

        match self.backend.kind {
            BackendKind::Firestore => {
                if self.firestore.project_id.is_empty() {
                    return Err(ConfigError::Missing("FIREBASE_PROJECT_ID"));
                }
                if self.firestore.api_key.is_empty() {
                    return Err(ConfigError::Missing("FIREBASE_API_KEY"));
                }
                if self.firestore.poll_interval_ms == 0 {
                    return Err(ConfigError::Validation("轮询间隔必须大于0".to_string()));
                }
            }
            BackendKind::Supabase => {
                if self.supabase.url.is_empty() {
                    return Err(ConfigError::Missing("SUPABASE_URL"));
                }
                if self.supabase.anon_key.is_empty() {
                    return Err(ConfigError::Missing("SUPABASE_ANON_KEY"));
                }
                if self.supabase.heartbeat_seconds == 0 {
                    return Err(ConfigError::Validation("心跳间隔必须大于0".to_string()));
                }
            }
            BackendKind::Memory => {
                if self.memory.users.is_empty() {
                    return Err(ConfigError::Validation("内存后端至少需要一个用户".to_string()));
                }
            }
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("文件读取错误: {0}")]
    FileRead(String),
    #[error("配置解析错误: {0}")]
    Parse(String),
    #[error("缺少必需的配置: {0}")]
    Missing(&'static str),
    #[error("配置验证错误: {0}")]
    Validation(String),
}

/// 从文件（或默认值）加载配置，再叠加环境变量并校验
///
/// 查找顺序：`STUDENT_ADMIN_CONFIG` 指定的路径、`config.toml`、`./config/config.toml`。
pub fn load_config() -> Result<Config, ConfigError> {
    let explicit = std::env::var("STUDENT_ADMIN_CONFIG").ok();
    let mut config = match explicit {
        Some(path) => {
            info!("从配置文件加载: {}", path);
            Config::load_from_file(&path)?
        }
        None => {
            let found = ["config.toml", "./config/config.toml"]
                .into_iter()
                .find(|p| Path::new(p).exists());
            match found {
                Some(path) => {
                    info!("从配置文件加载: {}", path);
                    Config::load_from_file(path)?
                }
                None => {
                    info!("未找到配置文件，使用默认配置");
                    Config::default()
                }
            }
        }
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
