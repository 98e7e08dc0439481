//! 学生记录存储端口
//!
//! 统一的 `list / create / update / delete / subscribe` 能力集，
//! 具体后端（Firestore、Supabase、内存）各自实现字段命名和日期的转换，
//! 上层服务不感知后端差异。

pub mod firestore;
pub mod memory;
pub mod realtime;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::app::student::model::{StudentFields, StudentRecord};
use crate::infrastructure::config::{BackendKind, Config};

pub use firestore::FirestoreStore;
pub use memory::{MemoryStore, NoticeStyle};
pub use supabase::SupabaseStore;

/// 存储层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("record {0} not found")]
    NotFound(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("subscription: {0}")]
    Subscription(String),
}

/// 后端推送的变更通知
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotice {
    /// 文档库风格：通知本身携带完整快照
    Snapshot(Vec<StudentRecord>),
    /// 关系库风格：只告知“有变化”，消费方需自行重新读取
    Changed,
}

/// 一个常驻订阅；丢弃即释放（后台任务随之终止）
pub struct ChangeFeed {
    rx: mpsc::UnboundedReceiver<ChangeNotice>,
    worker: Option<AbortHandle>,
}

impl ChangeFeed {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeNotice>, worker: Option<AbortHandle>) -> Self {
        Self { rx, worker }
    }

    /// 等待下一条通知；订阅断开时返回 `None`
    pub async fn next(&mut self) -> Option<ChangeNotice> {
        self.rx.recv().await
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// 学生记录存储端口
#[async_trait]
pub trait StudentStore: Send + Sync + 'static {
    /// 后端名称（日志与健康检查用）
    fn backend(&self) -> &'static str;

    /// 读取整个集合
    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError>;

    /// 插入一条记录，返回后端分配的 id
    async fn create(
        &self,
        fields: &StudentFields,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    /// 按 id 整体替换用户字段
    async fn update(
        &self,
        id: &str,
        fields: &StudentFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 按 id 删除
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// 订阅整个集合的所有变更（无过滤）
    async fn subscribe(&self) -> Result<ChangeFeed, StoreError>;
}

/// 按配置构建存储后端
pub fn build_store(config: &Config) -> Arc<dyn StudentStore> {
    match config.backend.kind {
        BackendKind::Firestore => Arc::new(FirestoreStore::new(config.firestore.clone())),
        BackendKind::Supabase => Arc::new(SupabaseStore::new(config.supabase.clone())),
        BackendKind::Memory => Arc::new(MemoryStore::new(NoticeStyle::Changed)),
    }
}

/// 把非 2xx 响应转换为 `StoreError::Backend`
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(StoreError::Backend {
        status: status.as_u16(),
        message,
    })
}
