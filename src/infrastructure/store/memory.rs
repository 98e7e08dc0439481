//! 进程内存储（开发模式与测试）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ChangeFeed, ChangeNotice, StoreError, StudentStore};
use crate::app::student::model::{StudentFields, StudentRecord};

/// 变更通知的形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeStyle {
    /// 像 Firestore 一样推送完整快照
    Snapshot,
    /// 像 Supabase Realtime 一样只推送空事件
    Changed,
}

#[derive(Default)]
struct Inner {
    rows: Vec<StudentRecord>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeNotice>>,
}

/// 内存存储：按插入顺序保存记录，每次写入后通知所有订阅者
pub struct MemoryStore {
    style: NoticeStyle,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(style: NoticeStyle) -> Self {
        Self {
            style,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// 以当前状态向所有订阅者再广播一次
    pub fn notify_all(&self) {
        let mut inner = self.lock();
        Self::broadcast(self.style, &mut inner);
    }

    /// 当前活跃订阅数
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // 持锁期间不会 panic，中毒后继续使用内部数据
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(style: NoticeStyle, inner: &mut Inner) {
        let notice = match style {
            NoticeStyle::Snapshot => ChangeNotice::Snapshot(inner.rows.clone()),
            NoticeStyle::Changed => ChangeNotice::Changed,
        };
        inner
            .subscribers
            .retain(|tx| tx.send(notice.clone()).is_ok());
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError> {
        Ok(self.lock().rows.clone())
    }

    async fn create(
        &self,
        fields: &StudentFields,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let mut inner = self.lock();
        inner.rows.push(StudentRecord {
            id: id.clone(),
            fields: fields.clone(),
            created_at: Some(created_at),
            updated_at: None,
        });
        Self::broadcast(self.style, &mut inner);
        Ok(id)
    }

    async fn update(
        &self,
        id: &str,
        fields: &StudentFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let row = inner
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.fields = fields.clone();
        row.updated_at = Some(updated_at);
        Self::broadcast(self.style, &mut inner);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let before = inner.rows.len();
        inner.rows.retain(|r| r.id != id);
        if inner.rows.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::broadcast(self.style, &mut inner);
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Ok(ChangeFeed::new(rx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str) -> StudentFields {
        StudentFields {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let store = MemoryStore::new(NoticeStyle::Changed);
        let a = store.create(&fields("a"), Utc::now()).await.unwrap();
        let b = store.create(&fields("b"), Utc::now()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_style_pushes_rows() {
        let store = MemoryStore::new(NoticeStyle::Snapshot);
        let mut feed = store.subscribe().await.unwrap();
        store.create(&fields("a"), Utc::now()).await.unwrap();
        match feed.next().await {
            Some(ChangeNotice::Snapshot(rows)) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let store = MemoryStore::new(NoticeStyle::Changed);
        let err = store.delete("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = store.update("nope", &fields("x"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dropped_feed_is_pruned() {
        let store = MemoryStore::new(NoticeStyle::Changed);
        let feed = store.subscribe().await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(feed);
        assert_eq!(store.subscriber_count(), 0);
    }
}
