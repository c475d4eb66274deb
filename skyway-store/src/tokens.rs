//! Access tokens issued by the identity service: HS256 JWTs signed with the
//! project secret, audience `authenticated`.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skyway_core::identity::AuthUser;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    pub aud: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(default)]
    pub app_metadata: Value,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AccessClaims {
    /// Role granted by the platform operator (`app_metadata.role`).
    pub fn app_role(&self) -> Option<&str> {
        self.app_metadata.get("role").and_then(Value::as_str)
    }

    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata.get("full_name").and_then(Value::as_str)
    }
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: String,
    audience: String,
    ttl_seconds: u64,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>, audience: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            secret: secret.into(),
            audience: audience.into(),
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn issue(&self, user: &AuthUser, app_role: Option<&str>) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: "authenticated".to_string(),
            aud: self.audience.clone(),
            exp: (now + Duration::seconds(self.ttl_seconds as i64)).timestamp() as usize,
            iat: now.timestamp() as usize,
            app_metadata: match app_role {
                Some(role) => json!({ "role": role }),
                None => json!({}),
            },
            user_metadata: json!({ "full_name": user.full_name }),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
    }

    /// Signature, expiry and audience are all checked.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);
        let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            id: "8b0c6a8e".to_string(),
            email: "asha@example.com".to_string(),
            full_name: Some("Asha Rao".to_string()),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = TokenSigner::new("secret", "authenticated", 60);
        let token = signer.issue(&user(), Some("admin")).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "8b0c6a8e");
        assert_eq!(claims.app_role(), Some("admin"));
        assert_eq!(claims.full_name(), Some("Asha Rao"));
    }

    #[test]
    fn test_wrong_secret_or_audience_rejected() {
        let token = TokenSigner::new("secret", "authenticated", 60).issue(&user(), None).unwrap();
        assert!(TokenSigner::new("other", "authenticated", 60).verify(&token).is_err());
        assert!(TokenSigner::new("secret", "service_role", 60).verify(&token).is_err());
    }
}
