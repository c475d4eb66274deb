use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use skyway_core::identity::{AuthProvider, AuthSession, AuthUser};
use skyway_core::CoreError;

use crate::error::StoreError;

/// Client for the hosted identity service (GoTrue-style endpoints).
pub struct HttpAuthProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl From<RemoteUser> for AuthUser {
    fn from(u: RemoteUser) -> Self {
        AuthUser {
            id: u.id,
            email: u.email.unwrap_or_default(),
            full_name: u.user_metadata.get("full_name").and_then(Value::as_str).map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteSession {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    user: RemoteUser,
}

impl From<RemoteSession> for AuthSession {
    fn from(s: RemoteSession) -> Self {
        AuthSession {
            access_token: s.access_token,
            refresh_token: s.refresh_token,
            expires_in: s.expires_in,
            user: s.user.into(),
        }
    }
}

impl HttpAuthProvider {
    /// `base_url` is the auth root, e.g. `https://xyz.supabase.co/auth/v1`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("skyway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
    }

    async fn call(&self, request: RequestBuilder, email: &str) -> Result<Value, CoreError> {
        let resp = request.send().await.map_err(StoreError::from)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(StoreError::from)?;
        if !(200..300).contains(&status) {
            return Err(map_error(status, &body, email));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| CoreError::IdentityError(format!("Malformed auth response: {}", e)))
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthSession, CoreError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        let value = self.call(self.post("/signup").json(&body), email).await?;

        // With email confirmation on, the service returns the bare user
        if value.get("access_token").is_none() {
            info!("Sign-up pending email confirmation");
            return Err(CoreError::IdentityError(
                "Check your inbox to confirm your email address, then sign in".to_string(),
            ));
        }
        let session: RemoteSession = serde_json::from_value(value)
            .map_err(|e| CoreError::IdentityError(format!("Malformed auth response: {}", e)))?;
        Ok(session.into())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, CoreError> {
        let body = json!({ "email": email, "password": password });
        let value = self
            .call(self.post("/token?grant_type=password").json(&body), email)
            .await?;
        let session: RemoteSession = serde_json::from_value(value)
            .map_err(|e| CoreError::IdentityError(format!("Malformed auth response: {}", e)))?;
        Ok(session.into())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), CoreError> {
        if let Err(e) = self.call(self.post("/logout").bearer_auth(access_token), "").await {
            // The local session is dropped regardless
            warn!("Remote sign-out failed: {}", e);
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, CoreError> {
        let request = self
            .http
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token);
        let value = self.call(request, "").await?;
        let user: RemoteUser = serde_json::from_value(value)
            .map_err(|e| CoreError::IdentityError(format!("Malformed auth response: {}", e)))?;
        Ok(user.into())
    }
}

/// Turns an identity-service error body into the error the customer sees.
fn map_error(status: u16, body: &str, email: &str) -> CoreError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let message = ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(Value::as_str))
        .unwrap_or(body)
        .to_string();
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("already registered") || lowered.contains("already exists") {
        return CoreError::AccountExists(email.to_string());
    }
    if lowered.contains("invalid login credentials") || lowered.contains("invalid_grant") {
        return CoreError::InvalidCredentials;
    }
    match status {
        400 | 422 => CoreError::ValidationError(message),
        401 | 403 => CoreError::IdentityError("Session is invalid or has expired".to_string()),
        _ => CoreError::IdentityError(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_error(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#, "a@b.co"),
            CoreError::InvalidCredentials
        ));
        assert!(matches!(
            map_error(422, r#"{"code":422,"msg":"User already registered"}"#, "a@b.co"),
            CoreError::AccountExists(email) if email == "a@b.co"
        ));
        assert!(matches!(
            map_error(422, r#"{"msg":"Password should be at least 6 characters"}"#, ""),
            CoreError::ValidationError(_)
        ));
        assert!(matches!(map_error(401, "", ""), CoreError::IdentityError(_)));
        assert!(matches!(map_error(502, "bad gateway", ""), CoreError::IdentityError(m) if m == "bad gateway"));
    }

    #[test]
    fn test_user_metadata_name() {
        let user: RemoteUser = serde_json::from_value(json!({
            "id": "8b0c",
            "email": "asha@example.com",
            "user_metadata": { "full_name": "Asha Rao" }
        }))
        .unwrap();
        let user = AuthUser::from(user);
        assert_eq!(user.full_name.as_deref(), Some("Asha Rao"));
    }
}
