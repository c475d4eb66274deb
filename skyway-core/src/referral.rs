use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::payment::is_valid_vpa;

/// Reward credited to a referrer when someone they referred completes their
/// first confirmed booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: String,
    pub referred_user_id: String,
    pub booking_id: Uuid,
    pub reward_minor: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Approved => "APPROVED",
            WithdrawalStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(WithdrawalStatus::Pending),
            "APPROVED" => Ok(WithdrawalStatus::Approved),
            "REJECTED" => Ok(WithdrawalStatus::Rejected),
            other => Err(format!("Unknown withdrawal status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: String,
    pub amount_minor: i64,
    pub upi_id: String,
    pub status: WithdrawalStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Withdrawal {
    pub fn new(user_id: impl Into<String>, amount_minor: i64, upi_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            amount_minor,
            upi_id: upi_id.into(),
            status: WithdrawalStatus::Pending,
            note: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn decide(&mut self, approve: bool, note: Option<String>, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != WithdrawalStatus::Pending {
            return Err(LedgerError::AlreadyProcessed(self.id));
        }
        self.status = if approve { WithdrawalStatus::Approved } else { WithdrawalStatus::Rejected };
        self.note = note;
        self.processed_at = Some(now);
        Ok(())
    }
}

/// Running balance of a user's referral rewards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ledger {
    pub earned_minor: i64,
    pub withdrawn_minor: i64,
    pub pending_minor: i64,
    pub available_minor: i64,
}

impl Ledger {
    pub fn new(referrals: &[Referral], withdrawals: &[Withdrawal]) -> Self {
        let earned_minor: i64 = referrals.iter().map(|r| r.reward_minor).sum();
        let withdrawn_minor: i64 = withdrawals
            .iter()
            .filter(|w| w.status == WithdrawalStatus::Approved)
            .map(|w| w.amount_minor)
            .sum();
        let pending_minor: i64 = withdrawals
            .iter()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .map(|w| w.amount_minor)
            .sum();

        Self {
            earned_minor,
            withdrawn_minor,
            pending_minor,
            available_minor: earned_minor - withdrawn_minor - pending_minor,
        }
    }
}

pub fn validate_withdrawal(ledger: &Ledger, amount_minor: i64, upi_id: &str, min_minor: i64) -> Result<(), LedgerError> {
    if amount_minor < min_minor {
        return Err(LedgerError::BelowMinimum { minimum: min_minor });
    }
    if amount_minor > ledger.available_minor {
        return Err(LedgerError::InsufficientBalance { available: ledger.available_minor });
    }
    if !is_valid_vpa(upi_id) {
        return Err(LedgerError::InvalidUpiId(upi_id.to_string()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Withdrawal amount is below the minimum of {minimum}")]
    BelowMinimum { minimum: i64 },

    #[error("Insufficient balance: {available} available")]
    InsufficientBalance { available: i64 },

    #[error("Invalid UPI id: {0}")]
    InvalidUpiId(String),

    #[error("Withdrawal already processed: {0}")]
    AlreadyProcessed(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referral(reward: i64) -> Referral {
        Referral {
            id: Uuid::new_v4(),
            referrer_id: "user-1".into(),
            referred_user_id: "user-2".into(),
            booking_id: Uuid::new_v4(),
            reward_minor: reward,
            created_at: Utc::now(),
        }
    }

    fn withdrawal(amount: i64, status: WithdrawalStatus) -> Withdrawal {
        let mut w = Withdrawal::new("user-1", amount, "asha@okaxis");
        w.status = status;
        w
    }

    #[test]
    fn test_ledger_balance() {
        let ledger = Ledger::new(
            &[referral(10_000), referral(10_000), referral(5_000)],
            &[
                withdrawal(8_000, WithdrawalStatus::Approved),
                withdrawal(2_000, WithdrawalStatus::Pending),
                withdrawal(9_000, WithdrawalStatus::Rejected),
            ],
        );
        assert_eq!(ledger.earned_minor, 25_000);
        assert_eq!(ledger.withdrawn_minor, 8_000);
        assert_eq!(ledger.pending_minor, 2_000);
        assert_eq!(ledger.available_minor, 15_000);
    }

    #[test]
    fn test_validate_withdrawal() {
        let ledger = Ledger::new(&[referral(20_000)], &[]);
        assert!(validate_withdrawal(&ledger, 10_000, "asha@okaxis", 5_000).is_ok());
        assert_eq!(
            validate_withdrawal(&ledger, 1_000, "asha@okaxis", 5_000),
            Err(LedgerError::BelowMinimum { minimum: 5_000 })
        );
        assert_eq!(
            validate_withdrawal(&ledger, 25_000, "asha@okaxis", 5_000),
            Err(LedgerError::InsufficientBalance { available: 20_000 })
        );
        assert!(matches!(
            validate_withdrawal(&ledger, 10_000, "not-a-vpa", 5_000),
            Err(LedgerError::InvalidUpiId(_))
        ));
    }

    #[test]
    fn test_decide_only_once() {
        let mut w = withdrawal(5_000, WithdrawalStatus::Pending);
        w.decide(true, None, Utc::now()).unwrap();
        assert_eq!(w.status, WithdrawalStatus::Approved);
        assert!(w.processed_at.is_some());
        assert!(w.decide(false, None, Utc::now()).is_err());
    }
}
