use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub payment: PaymentConfig,
    pub upi: UpiConfig,
    pub flight_data: FeedConfig,
    pub train_data: FeedConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 120 }

/// Hosted database REST endpoint. No url selects the in-memory backend.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatastoreConfig {
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    /// Service-role key used for server-side writes; falls back to `api_key`.
    pub service_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Identity service base, e.g. `https://xyz.supabase.co/auth/v1`.
    pub url: Option<String>,
    pub jwt_secret: String,
    #[serde(default = "default_audience")]
    pub jwt_audience: String,
    #[serde(default)]
    pub admin_emails: Vec<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
}

fn default_audience() -> String { "authenticated".to_string() }
fn default_token_ttl() -> u64 { 3600 }

impl AuthConfig {
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    pub key_id: String,
    /// Empty selects the offline gateway (orders are minted locally).
    #[serde(default)]
    pub key_secret: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_url() -> String { "https://api.razorpay.com".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct UpiConfig {
    pub vpa: String,
    pub payee_name: String,
}

/// Third-party live data feed.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    /// No key means the feed is never called and fallback data is served.
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub booking_window_seconds: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub tax_rate: f64,
    pub convenience_fee_minor: i64,
    #[serde(default = "default_rounding")]
    pub rounding_minor: i64,
    pub estimate_base_minor: i64,
    pub estimate_per_minute_minor: i64,
    pub referral_reward_minor: i64,
    pub min_withdrawal_minor: i64,
}

fn default_currency() -> String { "INR".to_string() }
fn default_rounding() -> i64 { 100 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // SKYWAY__PAYMENT__KEY_SECRET=... sets payment.key_secret
            .add_source(config::Environment::with_prefix("SKYWAY").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parses a single TOML document, without file or environment layering.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &str = include_str!("../../config/default.toml");

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULTS).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.datastore.url.is_none());
        assert!(config.redis.url.is_none());
        assert_eq!(config.auth.jwt_audience, "authenticated");
        assert_eq!(config.business_rules.booking_window_seconds, 600);
        assert_eq!(config.business_rules.currency, "INR");
    }

    #[test]
    fn test_admin_email_match_is_case_insensitive() {
        let mut config = Config::from_toml(DEFAULTS).unwrap();
        config.auth.admin_emails = vec!["ops@skyway.example".to_string()];
        assert!(config.auth.is_admin_email(" OPS@skyway.example"));
        assert!(!config.auth.is_admin_email("asha@example.com"));
    }
}
