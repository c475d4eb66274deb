use serde::{Deserialize, Serialize};
use async_trait::async_trait;

use crate::passenger::validate_email;
use crate::CoreError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub user: AuthUser,
}

/// The hosted identity service. Tokens it issues are bearer JWTs that the
/// API validates locally with the shared project secret.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthSession, CoreError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, CoreError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), CoreError>;

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, CoreError>;
}

/// Checked before anything is sent to the provider.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), CoreError> {
    validate_email(email).map_err(|msg| CoreError::ValidationError(msg.to_string()))?;
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("asha@example.com", "correct-horse").is_ok());
        assert!(validate_credentials("asha@example.com", "short").is_err());
        assert!(validate_credentials("asha", "correct-horse").is_err());
    }
}
