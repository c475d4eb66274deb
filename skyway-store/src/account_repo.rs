//! Profiles and the referral reward ledger.

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use skyway_core::profile::Profile;
use skyway_core::referral::{Referral, Withdrawal, WithdrawalStatus};
use skyway_core::repository::{
    ProfileRepository, ReferralRepository, RepoResult, RepositoryError, WithdrawalRepository,
};

use crate::rest::DataClient;

pub struct RestProfileRepository {
    client: DataClient,
}

impl RestProfileRepository {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProfileRepository for RestProfileRepository {
    async fn get(&self, user_id: &str) -> RepoResult<Option<Profile>> {
        Ok(self.client.from("profiles").eq("id", user_id).fetch_optional().await?)
    }

    async fn get_by_referral_code(&self, code: &str) -> RepoResult<Option<Profile>> {
        Ok(self
            .client
            .from("profiles")
            .eq("referral_code", code.trim().to_ascii_uppercase())
            .fetch_optional()
            .await?)
    }

    async fn upsert(&self, profile: &Profile) -> RepoResult<Profile> {
        Ok(self.client.from("profiles").upsert(profile).await?)
    }
}

pub struct RestReferralRepository {
    client: DataClient,
}

impl RestReferralRepository {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferralRepository for RestReferralRepository {
    async fn create(&self, referral: &Referral) -> RepoResult<Referral> {
        Ok(self.client.from("referrals").insert(referral).await?)
    }

    async fn list_for_referrer(&self, user_id: &str) -> RepoResult<Vec<Referral>> {
        Ok(self
            .client
            .from("referrals")
            .eq("referrer_id", user_id)
            .order("created_at", false)
            .fetch()
            .await?)
    }

    async fn exists_for_referred(&self, referred_user_id: &str) -> RepoResult<bool> {
        let row: Option<Referral> = self
            .client
            .from("referrals")
            .eq("referred_user_id", referred_user_id)
            .fetch_optional()
            .await?;
        Ok(row.is_some())
    }
}

pub struct RestWithdrawalRepository {
    client: DataClient,
}

impl RestWithdrawalRepository {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WithdrawalRepository for RestWithdrawalRepository {
    async fn create(&self, withdrawal: &Withdrawal) -> RepoResult<Withdrawal> {
        Ok(self.client.from("withdrawals").insert(withdrawal).await?)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Withdrawal>> {
        Ok(self.client.from("withdrawals").eq("id", id).fetch_optional().await?)
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Withdrawal>> {
        Ok(self
            .client
            .from("withdrawals")
            .eq("user_id", user_id)
            .order("created_at", false)
            .fetch()
            .await?)
    }

    async fn list(&self, status: Option<WithdrawalStatus>) -> RepoResult<Vec<Withdrawal>> {
        let mut query = self.client.from("withdrawals");
        if let Some(status) = status {
            query = query.eq("status", status);
        }
        Ok(query.order("created_at", false).fetch().await?)
    }

    async fn update(&self, withdrawal: &Withdrawal) -> RepoResult<Withdrawal> {
        let patch = json!({
            "status": withdrawal.status,
            "note": withdrawal.note,
            "processed_at": withdrawal.processed_at,
        });
        let rows: Vec<Withdrawal> = self
            .client
            .from("withdrawals")
            .eq("id", withdrawal.id)
            .update(&patch)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError::NotFound(format!("withdrawal {}", withdrawal.id)))
    }
}
