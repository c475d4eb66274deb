use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::passenger::{validate_name, validate_phone, normalize_phone, FieldError, ValidationErrors};
use crate::pnr::random_code;

/// A row of the `profiles` table, keyed by the auth provider's user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub full_name: String,
    pub phone: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>, email: Option<String>, full_name: impl Into<String>, referred_by: Option<String>) -> Self {
        let full_name = full_name.into();
        Self {
            id: id.into(),
            email,
            referral_code: generate_referral_code(&full_name),
            full_name,
            phone: None,
            referred_by,
            created_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: ProfileUpdate) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        if let Some(name) = &update.full_name {
            if let Err(msg) = validate_name(name) {
                errors.push(FieldError::new("full_name", msg));
            }
        }
        if let Some(phone) = &update.phone {
            if let Err(msg) = validate_phone(phone) {
                errors.push(FieldError::new("phone", msg));
            }
        }
        ValidationErrors::into_result(errors)?;

        if let Some(name) = update.full_name {
            self.full_name = name.trim().to_string();
        }
        if let Some(phone) = update.phone {
            self.phone = Some(normalize_phone(&phone));
        }
        Ok(())
    }
}

/// Four letters from the name (padded with `X`) followed by four random
/// characters, e.g. `ASHA7K2P`.
pub fn generate_referral_code(full_name: &str) -> String {
    let mut prefix: String = full_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(4)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while prefix.len() < 4 {
        prefix.push('X');
    }
    format!("{}{}", prefix, random_code(&mut rand::thread_rng(), 4))
}
