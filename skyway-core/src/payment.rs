use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Order created on the gateway; its id is handed to the checkout widget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key the browser widget is initialised with.
    fn key_id(&self) -> &str;

    /// Create an order for `amount_minor` that the widget will collect.
    async fn create_order(
        &self,
        receipt: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<GatewayOrder, CoreError>;

    /// Check the signature the widget hands back in its completion callback.
    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Check the signature on a server-to-server webhook body.
    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool;
}

/// Manual payment path: the customer pays a static VPA from any UPI app and
/// then submits the bank's transaction reference (UTR) for verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpiRequest {
    pub vpa: String,
    pub payee_name: String,
    pub amount_minor: i64,
    pub currency: String,
    pub note: String,
}

impl UpiRequest {
    /// `upi://pay?pa=…&pn=…&am=…&cu=…&tn=…`, which UPI apps open directly and
    /// which the UI renders as a QR code.
    pub fn deep_link(&self) -> String {
        format!(
            "upi://pay?pa={}&pn={}&am={}&cu={}&tn={}",
            urlencoded(&self.vpa),
            urlencoded(&self.payee_name),
            format_major(self.amount_minor),
            urlencoded(&self.currency),
            urlencoded(&self.note),
        )
    }
}

/// `12345` -> `"123.45"`
pub fn format_major(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// `handle@bank`, as accepted by UPI apps.
pub fn is_valid_vpa(vpa: &str) -> bool {
    let Some((handle, bank)) = vpa.split_once('@') else {
        return false;
    };
    let handle_ok = (2..=256).contains(&handle.len())
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    let bank_ok = (2..=64).contains(&bank.len()) && bank.chars().all(|c| c.is_ascii_alphanumeric());
    handle_ok && bank_ok
}

/// UPI transaction references are 12 digits.
pub fn is_valid_utr(utr: &str) -> bool {
    utr.len() == 12 && utr.chars().all(|c| c.is_ascii_digit())
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'@' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
