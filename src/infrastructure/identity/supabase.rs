//! Supabase Auth（GoTrue）适配器

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{expires_in, AuthError, AuthUser, Credentials, IdentityProvider};
use crate::infrastructure::config::SupabaseConfig;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

pub struct SupabaseAuth {
    http: reqwest::Client,
    config: Arc<SupabaseConfig>,
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<TokenResponse, AuthError> {
        let resp = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.anon_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| AuthError::Decode(e.to_string()));
        }
        // GoTrue 对错误的邮箱/密码和失效的刷新令牌都返回 400
        if status.as_u16() == 400 {
            return Err(match grant_type {
                "password" => AuthError::InvalidCredentials,
                _ => AuthError::SessionExpired,
            });
        }
        Err(AuthError::Provider {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        })
    }
}

impl From<TokenResponse> for Credentials {
    fn from(body: TokenResponse) -> Self {
        Credentials {
            user: AuthUser {
                uid: body.user.id,
                email: body.user.email.unwrap_or_default(),
            },
            access_token: body.access_token,
            refresh_token: Some(body.refresh_token),
            expires_at: expires_in(body.expires_in),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials, AuthError> {
        let body = self
            .token("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(body.into())
    }

    async fn sign_out(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let resp = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;
        let status = resp.status();
        // 令牌已失效时服务端会话本来就不存在了
        if status.is_success() || status.as_u16() == 401 {
            return Ok(());
        }
        Err(AuthError::Provider {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        })
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or(AuthError::SessionExpired)?;
        let body = self
            .token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        Ok(body.into())
    }
}
