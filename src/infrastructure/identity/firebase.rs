//! Firebase Auth（Identity Toolkit REST）适配器

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{expires_in, AuthError, AuthUser, Credentials, IdentityProvider};
use crate::infrastructure::config::FirestoreConfig;

/// 这些错误码都表示邮箱或密码不对，统一为无效凭据，不泄露细节
const CREDENTIAL_ERRORS: [&str; 5] = [
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "USER_DISABLED",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct FirebaseAuth {
    http: reqwest::Client,
    config: Arc<FirestoreConfig>,
}

impl FirebaseAuth {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }
}

fn parse_ttl(raw: &str) -> Result<i64, AuthError> {
    raw.parse()
        .map_err(|_| AuthError::Decode(format!("invalid expiresIn: {}", raw)))
}

/// 把错误响应映射为 `AuthError`
async fn auth_error(resp: reqwest::Response) -> AuthError {
    let status = resp.status().as_u16();
    let message = resp
        .json::<ErrorBody>()
        .await
        .map(|b| b.error.message)
        .unwrap_or_default();
    // 错误码后面可能跟着 " : 说明"
    let code = message.split(':').next().unwrap_or_default().trim();
    if CREDENTIAL_ERRORS.contains(&code) {
        AuthError::InvalidCredentials
    } else if code == "TOKEN_EXPIRED" || code == "INVALID_REFRESH_TOKEN" {
        AuthError::SessionExpired
    } else {
        AuthError::Provider { status, message }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Credentials, AuthError> {
        let url = format!(
            "{}/accounts:signInWithPassword",
            self.config.auth_url.trim_end_matches('/')
        );
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(auth_error(resp).await);
        }
        let body: SignInResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(Credentials {
            user: AuthUser {
                uid: body.local_id,
                email: body.email,
            },
            access_token: body.id_token,
            refresh_token: Some(body.refresh_token),
            expires_at: expires_in(parse_ttl(&body.expires_in)?),
        })
    }

    async fn sign_out(&self, _credentials: &Credentials) -> Result<(), AuthError> {
        // Firebase 的登出只是丢弃本地令牌
        Ok(())
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or(AuthError::SessionExpired)?;
        let url = format!("{}/token", self.config.token_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(auth_error(resp).await);
        }
        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(Credentials {
            user: credentials.user.clone(),
            access_token: body.id_token,
            refresh_token: Some(body.refresh_token),
            expires_at: expires_in(parse_ttl(&body.expires_in)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_response_shape() {
        let body: SignInResponse = serde_json::from_str(
            r#"{"kind":"identitytoolkit#VerifyPasswordResponse","localId":"u1","email":"a@b.c",
                "displayName":"","idToken":"tok","registered":true,"refreshToken":"ref","expiresIn":"3600"}"#,
        )
        .unwrap();
        assert_eq!(body.local_id, "u1");
        assert_eq!(parse_ttl(&body.expires_in).unwrap(), 3600);
    }

    #[test]
    fn test_bad_ttl_is_decode_error() {
        assert!(matches!(parse_ttl("soon"), Err(AuthError::Decode(_))));
    }
}
