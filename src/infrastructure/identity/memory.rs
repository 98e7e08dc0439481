//! 进程内身份服务（开发模式与测试）

use async_trait::async_trait;
use uuid::Uuid;

use super::{expires_in, AuthError, AuthUser, Credentials, IdentityProvider};
use crate::infrastructure::config::MemoryUser;

/// 令牌有效期（秒）
const TOKEN_TTL: i64 = 3600;

pub struct MemoryIdentity {
    users: Vec<MemoryUser>,
}

impl MemoryIdentity {
    pub fn new(users: Vec<MemoryUser>) -> Self {
        Self { users }
    }

    fn issue(user: AuthUser) -> Credentials {
        Credentials {
            user,
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            expires_at: expires_in(TOKEN_TTL),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials, AuthError> {
        let user = self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()) && u.password == password)
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(Self::issue(AuthUser {
            uid: format!("mem-{}", user.email.to_ascii_lowercase()),
            email: user.email.clone(),
        }))
    }

    async fn sign_out(&self, _credentials: &Credentials) -> Result<(), AuthError> {
        Ok(())
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        if credentials.refresh_token.is_none() {
            return Err(AuthError::SessionExpired);
        }
        Ok(Self::issue(credentials.user.clone()))
    }
}
