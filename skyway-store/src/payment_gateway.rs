use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info};
use uuid::Uuid;

use skyway_core::payment::{GatewayOrder, PaymentGateway};
use skyway_core::CoreError;

use crate::app_config::PaymentConfig;
use crate::error::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Lower-case hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison against a hex signature.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Checkout signature: `HMAC(key_secret, "{order_id}|{payment_id}")`.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    sign(secret, format!("{}|{}", order_id, payment_id).as_bytes())
}

/// Hosted checkout gateway (Razorpay-style orders API).
pub struct RazorpayGateway {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct RemoteOrder {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    status: String,
}

impl RazorpayGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, receipt: &str, amount_minor: i64, currency: &str) -> Result<GatewayOrder, CoreError> {
        let body = json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
            "notes": { "pnr": receipt },
        });

        let resp = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::PaymentError(StoreError::from(e).to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!("Gateway rejected order for {}: {} {}", receipt, status, text);
            return Err(CoreError::PaymentError(format!("Gateway returned {}", status.as_u16())));
        }

        let order: RemoteOrder = resp
            .json()
            .await
            .map_err(|e| CoreError::PaymentError(StoreError::from(e).to_string()))?;
        info!("Gateway order {} created for {}", order.id, receipt);

        Ok(GatewayOrder {
            id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
            receipt: order.receipt.unwrap_or_else(|| receipt.to_string()),
            status: order.status,
        })
    }

    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify(&self.key_secret, format!("{}|{}", order_id, payment_id).as_bytes(), signature)
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify(&self.webhook_secret, body, signature)
    }
}

/// Gateway used when no key secret is configured: orders are minted locally
/// and signatures use the same scheme with a local secret.
pub struct OfflineGateway {
    key_id: String,
    secret: String,
}

impl OfflineGateway {
    pub fn new(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

#[async_trait]
impl PaymentGateway for OfflineGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, receipt: &str, amount_minor: i64, currency: &str) -> Result<GatewayOrder, CoreError> {
        if amount_minor <= 0 {
            return Err(CoreError::PaymentError("Order amount must be positive".to_string()));
        }
        Ok(GatewayOrder {
            id: format!("order_{}", Uuid::new_v4().simple()),
            amount_minor,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
            status: "created".to_string(),
        })
    }

    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify(&self.secret, format!("{}|{}", order_id, payment_id).as_bytes(), signature)
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify(&self.secret, body, signature)
    }
}

/// What a gateway webhook tells us about one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub event: String,
    pub order_id: String,
    pub payment_id: String,
    pub pnr: Option<String>,
    pub captured: bool,
}

/// Extracts the payment from `payment.captured` / `payment.failed` webhooks.
/// Other events yield `None`.
pub fn parse_webhook(body: &[u8]) -> Result<Option<PaymentNotification>, StoreError> {
    let value: Value = serde_json::from_slice(body)?;
    let event = value.get("event").and_then(Value::as_str).unwrap_or_default().to_string();

    let captured = match event.as_str() {
        "payment.captured" | "order.paid" => true,
        "payment.failed" => false,
        _ => return Ok(None),
    };

    let entity = &value["payload"]["payment"]["entity"];
    let field = |name: &str| entity.get(name).and_then(Value::as_str).map(str::to_string);

    let (Some(payment_id), Some(order_id)) = (field("id"), field("order_id")) else {
        return Err(StoreError::Decode("payment gateway".to_string(), format!("{} without payment entity", event)));
    };
    let pnr = entity["notes"].get("pnr").and_then(Value::as_str).map(str::to_string);

    Ok(Some(PaymentNotification {
        event,
        order_id,
        payment_id,
        pnr,
        captured,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let sig = payment_signature("s3cret", "order_1", "pay_1");
        assert_eq!(sig.len(), 64);
        let gateway = OfflineGateway::new("rzp_test", "s3cret");
        assert!(gateway.verify_payment("order_1", "pay_1", &sig));
        assert!(!gateway.verify_payment("order_1", "pay_2", &sig));
        assert!(!gateway.verify_payment("order_1", "pay_1", "not-hex"));
    }

    #[test]
    fn test_known_hmac_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_empty_secret_never_verifies() {
        let sig = sign("", b"body");
        assert!(!verify("", b"body", &sig));
    }

    #[test]
    fn test_parse_captured_webhook() {
        let body = br#"{
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_29QQoUBi66xm2f",
                "order_id": "order_9A33XWu170gUtm",
                "status": "captured",
                "notes": { "pnr": "ABC234" }
            } } }
        }"#;
        let n = parse_webhook(body).unwrap().unwrap();
        assert!(n.captured);
        assert_eq!(n.payment_id, "pay_29QQoUBi66xm2f");
        assert_eq!(n.pnr.as_deref(), Some("ABC234"));
    }

    #[test]
    fn test_parse_ignores_other_events() {
        assert_eq!(parse_webhook(br#"{"event":"refund.created","payload":{}}"#).unwrap(), None);
        assert!(parse_webhook(br#"{"event":"payment.failed","payload":{}}"#).is_err());
        assert!(parse_webhook(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_offline_orders() {
        let gateway = OfflineGateway::new("rzp_test", "s3cret");
        let order = gateway.create_order("ABC234", 579_900, "INR").await.unwrap();
        assert!(order.id.starts_with("order_"));
        assert_eq!(order.receipt, "ABC234");
        assert!(gateway.create_order("ABC234", 0, "INR").await.is_err());
    }
}
