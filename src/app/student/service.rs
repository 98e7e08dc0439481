//! 学生记录同步服务
//!
//! 维护一份与远端集合实时同步的内存快照，并把增删改直接写到远端。
//! 写操作不做乐观更新：本地快照只在收到远端的变更通知之后才刷新，
//! 因此每次写入后会有一个网络往返量级的短暂过期窗口。

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::model::{StudentFields, StudentRecord};
use crate::infrastructure::store::{ChangeFeed, ChangeNotice, StoreError, StudentStore};

pub type Snapshot = Arc<Vec<StudentRecord>>;

/// 记录操作错误
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// 增删改失败；本地没有需要回滚的状态
    #[error("write failed: {0}")]
    Write(#[source] StoreError),

    /// 读取或订阅失败；保留上一份快照
    #[error("read failed: {0}")]
    Read(#[source] StoreError),
}

#[derive(Clone)]
pub struct StudentService {
    store: Arc<dyn StudentStore>,
    snapshot: Arc<watch::Sender<Snapshot>>,
}

/// 常驻订阅的句柄；释放或丢弃即取消订阅
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn release(self) {
        // Drop 中 abort
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl StudentService {
    pub fn new(store: Arc<dyn StudentStore>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            store,
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// 当前快照；首次同步完成前为空
    pub fn list(&self) -> Snapshot {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn get(&self, id: &str) -> Option<StudentRecord> {
        self.snapshot.borrow().iter().find(|r| r.id == id).cloned()
    }

    /// 订阅快照变化
    pub fn changes(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    pub async fn create(&self, fields: StudentFields) -> Result<String, RecordError> {
        let id = self
            .store
            .create(&fields, Utc::now())
            .await
            .map_err(RecordError::Write)?;
        info!("已提交新增学生: {} ({})", fields.name, id);
        Ok(id)
    }

    pub async fn update(&self, id: &str, fields: StudentFields) -> Result<(), RecordError> {
        self.store
            .update(id, &fields, Utc::now())
            .await
            .map_err(RecordError::Write)?;
        info!("已提交学生更新: {}", id);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), RecordError> {
        self.store.delete(id).await.map_err(RecordError::Write)?;
        info!("已提交学生删除: {}", id);
        Ok(())
    }

    /// 全量重新读取并替换快照；失败时保留旧快照
    pub async fn sync_now(&self) -> Result<(), RecordError> {
        let rows = self.store.list().await.map_err(RecordError::Read)?;
        self.install(rows);
        Ok(())
    }

    /// 建立常驻订阅（整个集合、所有事件类型）并完成首次读取
    pub async fn activate(&self) -> Result<SyncHandle, RecordError> {
        // 先订阅再读取，读取期间发生的变更不会丢
        let feed = self.store.subscribe().await.map_err(RecordError::Read)?;
        if let Err(e) = self.sync_now().await {
            warn!("首次同步失败，等待下一次变更通知: {}", e);
        }
        info!("已订阅 {} 学生集合的变更", self.backend());
        let task = tokio::spawn(run_sync(self.clone(), feed));
        Ok(SyncHandle { task })
    }

    fn install(&self, rows: Vec<StudentRecord>) {
        debug!("安装新快照，共 {} 条记录", rows.len());
        self.snapshot.send_replace(Arc::new(rows));
    }
}

async fn run_sync(service: StudentService, mut feed: ChangeFeed) {
    while let Some(notice) = feed.next().await {
        match notice {
            ChangeNotice::Snapshot(rows) => service.install(rows),
            // 每条通知都全量重新读取，不做增量合并。
            // 集合很大或写入频繁时这是扩展性瓶颈。
            ChangeNotice::Changed => {
                if let Err(e) = service.sync_now().await {
                    warn!("同步读取失败，保留上一份快照: {}", e);
                }
            }
        }
    }
    // 不重连
    warn!("变更订阅已结束，保留最后一份快照");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::{MemoryStore, NoticeStyle};
    use std::time::Duration;

    fn fields(name: &str) -> StudentFields {
        StudentFields {
            name: name.to_string(),
            ..Default::default()
        }
    }

    async fn next_snapshot(rx: &mut watch::Receiver<Snapshot>) -> Snapshot {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("timed out waiting for sync")
            .unwrap();
        Arc::clone(&rx.borrow_and_update())
    }

    #[tokio::test]
    async fn test_list_empty_before_activation() {
        let store = Arc::new(MemoryStore::new(NoticeStyle::Changed));
        store.create(&fields("a"), Utc::now()).await.unwrap();
        let service = StudentService::new(store);
        assert!(service.list().is_empty());
    }

    #[tokio::test]
    async fn test_write_is_not_optimistic() {
        let store = Arc::new(MemoryStore::new(NoticeStyle::Changed));
        let service = StudentService::new(store);
        // 未激活：没有订阅，快照不会因写入而变化
        service.create(fields("a")).await.unwrap();
        assert!(service.list().is_empty());
        service.sync_now().await.unwrap();
        assert_eq!(service.list().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_notices_installed_directly() {
        let store = Arc::new(MemoryStore::new(NoticeStyle::Snapshot));
        let service = StudentService::new(store);
        let _handle = service.activate().await.unwrap();
        let mut rx = service.changes();
        rx.borrow_and_update();

        service.create(fields("a")).await.unwrap();
        let snap = next_snapshot(&mut rx).await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].fields.name, "a");
    }

    #[tokio::test]
    async fn test_release_stops_subscription() {
        let store = Arc::new(MemoryStore::new(NoticeStyle::Changed));
        let service = StudentService::new(store.clone());
        let handle = service.activate().await.unwrap();
        assert!(handle.is_active());
        handle.release();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.subscriber_count(), 0);
    }
}
