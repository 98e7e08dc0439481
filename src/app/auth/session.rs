//! 会话守卫
//!
//! 当前用户状态只由身份服务的会话变更事件填充；启动时先恢复持久化的会话，
//! 完成之前受保护的页面一律等待，避免先渲染出未登录状态。

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::infrastructure::identity::{
    AuthError, IdentityClient, ListenerId, Session, SessionEvent,
};

type SessionMap = Arc<RwLock<HashMap<String, Session>>>;

pub struct SessionGuard {
    client: Arc<IdentityClient>,
    sessions: SessionMap,
    ready: watch::Sender<bool>,
    store_path: Option<PathBuf>,
    listener: ListenerId,
    /// 串行化令牌续期，同一会话只会被续期一次
    refresh_lock: Mutex<()>,
}

impl SessionGuard {
    pub fn new(client: Arc<IdentityClient>, store_path: Option<PathBuf>) -> Self {
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
        let map = Arc::clone(&sessions);
        let listener = client.on_session_change(move |event| {
            let mut map = map.write().unwrap_or_else(|e| e.into_inner());
            match event {
                SessionEvent::SignedIn(session) => {
                    map.insert(session.id.clone(), session.clone());
                }
                // 已登出的会话不因迟到的续期结果复活
                SessionEvent::TokenRefreshed(session) => {
                    if let Some(current) = map.get_mut(&session.id) {
                        *current = session.clone();
                    }
                }
                SessionEvent::SignedOut { session_id } => {
                    map.remove(session_id);
                }
            }
        });
        let (ready, _) = watch::channel(false);
        Self {
            client,
            sessions,
            ready,
            store_path,
            listener,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    /// 初始会话检查：恢复持久化的会话，过期的尝试续期，失败的丢弃
    pub async fn init(&self) {
        for session in self.load_persisted().await {
            let expired = session.is_expired(Utc::now());
            self.client.restore(session.clone());
            if !expired {
                continue;
            }
            if let Err(e) = self.client.refresh(&session).await {
                warn!("持久化会话无法续期，已丢弃 ({}): {}", session.user().email, e);
                self.client.expire(&session);
            }
        }
        self.persist().await;
        info!("初始会话检查完成，恢复 {} 个会话", self.session_count());
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// 等待初始会话检查完成
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // 发送端与 self 同寿命，wait_for 不会因关闭而失败
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.client.sign_in(email, password).await?;
        self.persist().await;
        Ok(session)
    }

    pub async fn logout(&self, session: &Session) -> Result<(), AuthError> {
        self.client.sign_out(session).await?;
        self.persist().await;
        Ok(())
    }

    /// 查找会话；访问令牌过期时自动续期，续期失败则结束会话
    pub async fn current(&self, session_id: &str) -> Option<Session> {
        let session = self.lookup(session_id)?;
        if !session.is_expired(Utc::now()) {
            return Some(session);
        }
        let _refreshing = self.refresh_lock.lock().await;
        // 等锁期间会话可能已被续期或登出
        let session = self.lookup(session_id)?;
        if !session.is_expired(Utc::now()) {
            return Some(session);
        }
        let result = match self.client.refresh(&session).await {
            // 续期期间登出的会话不再返回
            Ok(_) => self.lookup(session_id),
            Err(e) => {
                warn!("会话续期失败 ({}): {}", session.user().email, e);
                self.client.expire(&session);
                None
            }
        };
        self.persist().await;
        result
    }

    fn lookup(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn load_persisted(&self) -> Vec<Session> {
        let Some(path) = &self.store_path else {
            return Vec::new();
        };
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("读取会话文件失败 {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("会话文件格式错误 {}: {}", path.display(), e);
            Vec::new()
        })
    }

    async fn persist(&self) {
        let Some(path) = &self.store_path else {
            return;
        };
        let sessions: Vec<Session> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let content = match serde_json::to_string_pretty(&sessions) {
            Ok(content) => content,
            Err(e) => {
                warn!("会话序列化失败: {}", e);
                return;
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("创建会话目录失败 {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = tokio::fs::write(path, content).await {
            warn!("写入会话文件失败 {}: {}", path.display(), e);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.client.remove_listener(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::MemoryUser;
    use crate::infrastructure::identity::{
        AuthUser, Credentials, IdentityProvider, MemoryIdentity,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 只有第一次续期成功且较慢，之后的续期全部失败
    struct SlowOnceRefresh {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for SlowOnceRefresh {
        fn name(&self) -> &'static str {
            "slow-once"
        }

        async fn sign_in(&self, email: &str, _password: &str) -> Result<Credentials, AuthError> {
            Ok(Credentials {
                user: AuthUser {
                    uid: "u1".to_string(),
                    email: email.to_string(),
                },
                access_token: "first".to_string(),
                refresh_token: Some("r".to_string()),
                expires_at: Utc::now() - chrono::Duration::seconds(1),
            })
        }

        async fn sign_out(&self, _credentials: &Credentials) -> Result<(), AuthError> {
            Ok(())
        }

        async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
            if self.refreshes.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(AuthError::SessionExpired);
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Credentials {
                access_token: "second".to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(3600),
                ..credentials.clone()
            })
        }
    }

    fn client() -> Arc<IdentityClient> {
        Arc::new(IdentityClient::new(Arc::new(MemoryIdentity::new(vec![
            MemoryUser {
                email: "admin@example.com".to_string(),
                password: "secret".to_string(),
            },
        ]))))
    }

    #[tokio::test]
    async fn test_login_and_logout_update_state() {
        let guard = SessionGuard::new(client(), None);
        guard.init().await;

        let session = guard.login("admin@example.com", "secret").await.unwrap();
        assert_eq!(guard.current(&session.id).await, Some(session.clone()));

        guard.logout(&session).await.unwrap();
        assert!(guard.current(&session.id).await.is_none());
        assert_eq!(guard.session_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let guard = SessionGuard::new(client(), None);
        let mut session = guard.login("admin@example.com", "secret").await.unwrap();
        session.credentials.expires_at = Utc::now() - chrono::Duration::seconds(1);
        // 通过事件注入一个已过期的会话
        guard.client.restore(session.clone());

        let current = guard.current(&session.id).await.unwrap();
        assert_eq!(current.id, session.id);
        assert!(!current.is_expired(Utc::now()));
        assert_ne!(current.credentials.access_token, session.credentials.access_token);
    }

    #[tokio::test]
    async fn test_sessions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let first = SessionGuard::new(client(), Some(path.clone()));
        first.init().await;
        let session = first.login("admin@example.com", "secret").await.unwrap();
        drop(first);

        let second = SessionGuard::new(client(), Some(path));
        assert!(!second.is_ready());
        second.init().await;
        assert!(second.is_ready());
        assert_eq!(second.current(&session.id).await.map(|s| s.id), Some(session.id));
    }

    #[tokio::test]
    async fn test_concurrent_access_refreshes_once() {
        let provider = Arc::new(SlowOnceRefresh {
            refreshes: AtomicUsize::new(0),
        });
        let guard = SessionGuard::new(Arc::new(IdentityClient::new(provider.clone())), None);
        guard.init().await;
        let session = guard.login("admin@example.com", "pw").await.unwrap();

        let (a, b) = tokio::join!(guard.current(&session.id), guard.current(&session.id));
        assert_eq!(a.unwrap().credentials.access_token, "second");
        assert_eq!(b.unwrap().credentials.access_token, "second");
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(guard.session_count(), 1);
    }

    #[tokio::test]
    async fn test_late_refresh_does_not_revive_logged_out_session() {
        let guard = SessionGuard::new(client(), None);
        guard.init().await;
        let session = guard.login("admin@example.com", "secret").await.unwrap();
        guard.logout(&session).await.unwrap();

        guard.client.refresh(&session).await.unwrap();
        assert_eq!(guard.session_count(), 0);
        assert!(guard.current(&session.id).await.is_none());
    }
}
