//! 身份认证端口
//!
//! `IdentityProvider` 是托管身份服务的适配器接口；`IdentityClient` 在其之上
//! 分配本地会话 id，并在登录、登出、令牌刷新时通知所有会话变更监听者。

pub mod firebase;
pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::infrastructure::config::{BackendKind, Config};

pub use firebase::FirebaseAuth;
pub use memory::MemoryIdentity;
pub use supabase::SupabaseAuth;

/// 认证错误
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("session expired")]
    SessionExpired,

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("identity provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("decode: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

/// 身份服务签发的令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: AuthUser,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// 本地会话：会话 id 写入 cookie，刷新令牌后保持不变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(flatten)]
    pub credentials: Credentials,
}

impl Session {
    pub fn user(&self) -> &AuthUser {
        &self.credentials.user
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.credentials.expires_at <= now
    }
}

/// 会话变更事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut { session_id: String },
    TokenRefreshed(Session),
}

/// 托管身份服务适配器
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials, AuthError>;

    async fn sign_out(&self, credentials: &Credentials) -> Result<(), AuthError>;

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError>;
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// 监听者句柄，用于取消监听
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub struct IdentityClient {
    provider: Arc<dyn IdentityProvider>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl IdentityClient {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// 注册会话变更回调（登录、登出、令牌刷新时同步调用）
    pub fn on_session_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| *lid != id);
    }

    fn emit(&self, event: SessionEvent) {
        // 先复制监听者列表，回调里可以再注册/取消监听
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let credentials = self.provider.sign_in(email, password).await?;
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            credentials,
        };
        info!("用户已登录: {}", session.user().email);
        self.emit(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    pub async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        self.provider.sign_out(&session.credentials).await?;
        info!("用户已登出: {}", session.user().email);
        self.emit(SessionEvent::SignedOut {
            session_id: session.id.clone(),
        });
        Ok(())
    }

    pub async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let credentials = self.provider.refresh(&session.credentials).await?;
        let refreshed = Session {
            id: session.id.clone(),
            credentials,
        };
        debug!("会话令牌已刷新: {}", refreshed.user().email);
        self.emit(SessionEvent::TokenRefreshed(refreshed.clone()));
        Ok(refreshed)
    }

    /// 恢复一个仍然有效的持久化会话
    pub fn restore(&self, session: Session) {
        debug!("恢复会话: {}", session.user().email);
        self.emit(SessionEvent::SignedIn(session));
    }

    /// 本地结束一个无法续期的会话（不调用身份服务）
    pub fn expire(&self, session: &Session) {
        info!("会话已过期: {}", session.user().email);
        self.emit(SessionEvent::SignedOut {
            session_id: session.id.clone(),
        });
    }
}

/// 按配置构建身份服务适配器
pub fn build_identity(config: &Config) -> Arc<dyn IdentityProvider> {
    match config.backend.kind {
        BackendKind::Firestore => Arc::new(FirebaseAuth::new(config.firestore.clone())),
        BackendKind::Supabase => Arc::new(SupabaseAuth::new(config.supabase.clone())),
        BackendKind::Memory => Arc::new(MemoryIdentity::new(config.memory.users.clone())),
    }
}

/// 由有效期秒数计算过期时间
pub(crate) fn expires_in(seconds: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::MemoryUser;
    use std::sync::Mutex;

    fn client() -> IdentityClient {
        IdentityClient::new(Arc::new(MemoryIdentity::new(vec![MemoryUser {
            email: "a@example.com".to_string(),
            password: "pw".to_string(),
        }])))
    }

    #[tokio::test]
    async fn test_events_fire_in_order() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_session_change(move |event| {
            let tag = match event {
                SessionEvent::SignedIn(_) => "in",
                SessionEvent::SignedOut { .. } => "out",
                SessionEvent::TokenRefreshed(_) => "refresh",
            };
            sink.lock().unwrap().push(tag);
        });

        let session = client.sign_in("a@example.com", "pw").await.unwrap();
        let refreshed = client.refresh(&session).await.unwrap();
        assert_eq!(refreshed.id, session.id);
        client.sign_out(&refreshed).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["in", "refresh", "out"]);
    }

    #[tokio::test]
    async fn test_failed_sign_in_emits_nothing() {
        let client = client();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        client.on_session_change(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let err = client.sign_in("a@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_removed_listener_is_silent() {
        let client = client();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = client.on_session_change(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        client.remove_listener(id);
        client.sign_in("a@example.com", "pw").await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
