/// SUBSCRIPTION LIFECYCLE
///
/// Users hold at most one active subscription. Subscribing grants the tier's
/// credits for 30 days and splits the price into burn, treasury and rewards
/// portions; the burn portion is written to the `burningMetrics` ledger.
/// Credits are spent with `use_credits` and never go negative.
///
/// States: active -> cancelled (terminal), active -> expired once `endDate`
/// has passed and the expiry sweep has run.

use chrono::{DateTime, Duration, Utc};
use dmind_core::{timestamp, CoreError, DmtAmount, WalletAddress};
use dmind_state::{collections, encode_record, Direction, Document, DocumentStore, Fields, Query, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::burning::{BurnLedgerEntry, BurnSource, BurningService, SUBSCRIPTION_BURN_TRANSACTION};
use crate::tiers::{self, SubscriptionTier, TierName, SUBSCRIPTION_PERIOD_DAYS};

pub const DEFAULT_PAYMENT_METHOD: &str = "DMT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    #[serde(with = "timestamp")]
    pub last_billing: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub next_billing: DateTime<Utc>,
    pub auto_renew: bool,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub tier: TierName,
    #[serde(with = "timestamp")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub credits_remaining: u32,
    pub credits_used: u32,
    pub total_paid: DmtAmount,
    pub total_burned: DmtAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    pub metadata: SubscriptionMetadata,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date > now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub success: bool,
    pub subscription_id: String,
    pub credits_granted: u32,
    pub burned_amount: DmtAmount,
    pub treasury_amount: DmtAmount,
    pub rewards_amount: DmtAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStats {
    pub total_subscriptions: usize,
    pub active_subscriptions: usize,
    pub total_revenue: DmtAmount,
    pub total_burned: DmtAmount,
    pub tier_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("User ID is required")]
    MissingUser,
    #[error("Invalid subscription tier: {0}")]
    InvalidTier(String),
    #[error("Invalid wallet address format")]
    InvalidWalletAddress(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for SubscriptionError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidWalletAddress(addr) => SubscriptionError::InvalidWalletAddress(addr),
            other => SubscriptionError::InvalidTier(other.to_string()),
        }
    }
}

/// **Subscription service**
///
/// Mutations are read-modify-write against the store, so they are serialised
/// through `write_lock`.
pub struct SubscriptionService {
    store: Arc<dyn DocumentStore>,
    burning: Arc<BurningService>,
    write_lock: Mutex<()>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn DocumentStore>, burning: Arc<BurningService>) -> Self {
        SubscriptionService {
            store,
            burning,
            write_lock: Mutex::new(()),
        }
    }

    pub fn tiers(&self) -> &'static [SubscriptionTier] {
        tiers::all_tiers()
    }

    pub fn tier(&self, name: &str) -> Option<&'static SubscriptionTier> {
        tiers::find_tier(name)
    }

    pub async fn subscribe(
        &self,
        user_id: &str,
        tier_name: &str,
        payment_method: Option<&str>,
    ) -> Result<SubscriptionResult, SubscriptionError> {
        self.subscribe_at(user_id, tier_name, payment_method, timestamp::now_millis()).await
    }

    /// Subscribe with an explicit start time
    pub async fn subscribe_at(
        &self,
        user_id: &str,
        tier_name: &str,
        payment_method: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionResult, SubscriptionError> {
        if user_id.is_empty() {
            return Err(SubscriptionError::MissingUser);
        }
        let tier = tiers::tier(tier_name.parse::<TierName>()?);
        let wallet = WalletAddress::parse(user_id)?;

        let _guard = self.write_lock.lock().await;

        let split = tier.fee_split();
        let end = now + Duration::days(SUBSCRIPTION_PERIOD_DAYS);
        let subscription = Subscription {
            id: String::new(),
            user_id: wallet.as_str().to_string(),
            tier: tier.name,
            start_date: now,
            end_date: end,
            status: SubscriptionStatus::Active,
            credits_remaining: tier.credits,
            credits_used: 0,
            total_paid: tier.price,
            total_burned: split.burned,
            transaction_hash: None,
            metadata: SubscriptionMetadata {
                last_billing: now,
                next_billing: end,
                auto_renew: true,
                payment_method: payment_method.unwrap_or(DEFAULT_PAYMENT_METHOD).to_string(),
            },
        };
        let subscription_id = self
            .store
            .add(collections::SUBSCRIPTIONS, encode_record(&subscription)?)
            .await?;

        let superseded = self.supersede_active(wallet.as_str(), &subscription_id, now).await?;
        if superseded > 0 {
            debug!(user = %wallet, superseded, "Cancelled previous active subscriptions");
        }

        if !split.burned.is_zero() {
            let entry = BurnLedgerEntry::new(
                split.burned,
                BurnSource::Subscription,
                wallet.as_str(),
                Some(tier.name.as_str()),
                now,
                SUBSCRIPTION_BURN_TRANSACTION,
            );
            if let Err(e) = self.burning.record_ledger(&entry).await {
                warn!(subscription_id = %subscription_id, error = %e, "Failed to record subscription burn");
            }
        }

        info!(
            user = %wallet,
            tier = %tier.name,
            credits = tier.credits,
            burned = %split.burned,
            treasury = %split.treasury,
            rewards = %split.rewards,
            "Subscription created"
        );

        Ok(SubscriptionResult {
            success: true,
            subscription_id,
            credits_granted: tier.credits,
            burned_amount: split.burned,
            treasury_amount: split.treasury,
            rewards_amount: split.rewards,
        })
    }

    /// Cancel every active subscription of `user_id` other than `keep`
    async fn supersede_active(&self, user_id: &str, keep: &str, now: DateTime<Utc>) -> Result<usize, SubscriptionError> {
        let query = Query::new()
            .where_eq("userId", user_id)
            .where_eq("status", SubscriptionStatus::Active.as_str());
        let older: Vec<Document> = self
            .store
            .query(collections::SUBSCRIPTIONS, &query)
            .await?
            .into_iter()
            .filter(|doc| doc.id != keep)
            .collect();
        for doc in &older {
            self.store
                .update(collections::SUBSCRIPTIONS, &doc.id, close_fields(SubscriptionStatus::Cancelled, now))
                .await?;
        }
        Ok(older.len())
    }

    /// The user's most recent active, unexpired subscription
    pub async fn user_subscription(&self, user_id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        self.user_subscription_at(user_id, Utc::now()).await
    }

    pub async fn user_subscription_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        let query = Query::new()
            .where_eq("userId", user_id)
            .where_eq("status", SubscriptionStatus::Active.as_str())
            .order_by("startDate", Direction::Descending)
            .limit(1);
        let docs = self.store.query(collections::SUBSCRIPTIONS, &query).await?;
        Ok(docs
            .first()
            .and_then(decode_subscription)
            .filter(|s| s.is_active_at(now)))
    }

    pub async fn has_feature_access(&self, user_id: &str, feature: &str) -> Result<bool, SubscriptionError> {
        Ok(self
            .user_subscription(user_id)
            .await?
            .map_or(false, |s| tiers::tier(s.tier).has_feature(feature)))
    }

    pub async fn has_credits(&self, user_id: &str, required: u32) -> Result<bool, SubscriptionError> {
        Ok(self
            .user_subscription(user_id)
            .await?
            .map_or(false, |s| s.credits_remaining >= required))
    }

    /// Spend credits. Returns false when there is no active subscription or
    /// the balance is too small; nothing changes in either case. Spending
    /// zero credits only reports whether a subscription is active.
    pub async fn use_credits(&self, user_id: &str, credits: u32) -> Result<bool, SubscriptionError> {
        if credits == 0 {
            return Ok(self.user_subscription(user_id).await?.is_some());
        }
        let _guard = self.write_lock.lock().await;

        let subscription = match self.user_subscription(user_id).await? {
            Some(s) => s,
            None => return Ok(false),
        };
        if credits > subscription.credits_remaining {
            debug!(user = user_id, credits, remaining = subscription.credits_remaining, "Insufficient credits");
            return Ok(false);
        }

        let mut fields = Fields::new();
        fields.insert("creditsRemaining".to_string(), json!(subscription.credits_remaining - credits));
        fields.insert("creditsUsed".to_string(), json!(subscription.credits_used + credits));
        fields.insert("metadata.lastBilling".to_string(), json!(timestamp::format(&Utc::now())));
        self.store
            .update(collections::SUBSCRIPTIONS, &subscription.id, fields)
            .await?;
        Ok(true)
    }

    /// Cancel the active subscription. Returns false when there is none.
    pub async fn cancel(&self, user_id: &str) -> Result<bool, SubscriptionError> {
        let _guard = self.write_lock.lock().await;

        let subscription = match self.user_subscription(user_id).await? {
            Some(s) => s,
            None => return Ok(false),
        };
        self.store
            .update(
                collections::SUBSCRIPTIONS,
                &subscription.id,
                close_fields(SubscriptionStatus::Cancelled, Utc::now()),
            )
            .await?;
        info!(user = user_id, subscription_id = %subscription.id, "Subscription cancelled");
        Ok(true)
    }

    /// Move every active subscription whose period has ended to `expired`
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize, SubscriptionError> {
        let _guard = self.write_lock.lock().await;

        let query = Query::new().where_eq("status", SubscriptionStatus::Active.as_str());
        let due: Vec<Subscription> = self
            .store
            .query(collections::SUBSCRIPTIONS, &query)
            .await?
            .iter()
            .filter_map(decode_subscription)
            .filter(|s| s.end_date <= now)
            .collect();

        for subscription in &due {
            self.store
                .update(
                    collections::SUBSCRIPTIONS,
                    &subscription.id,
                    close_fields(SubscriptionStatus::Expired, now),
                )
                .await?;
        }
        if !due.is_empty() {
            info!(expired = due.len(), "Expired subscriptions");
        }
        Ok(due.len())
    }

    /// Every subscription, newest first
    pub async fn all(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        let query = Query::new().order_by("startDate", Direction::Descending);
        Ok(self
            .store
            .query(collections::SUBSCRIPTIONS, &query)
            .await?
            .iter()
            .filter_map(decode_subscription)
            .collect())
    }

    pub async fn stats(&self) -> Result<SubscriptionStats, SubscriptionError> {
        let all = self.all().await?;
        let mut tier_distribution = BTreeMap::new();
        for s in &all {
            *tier_distribution.entry(s.tier.to_string()).or_insert(0) += 1;
        }
        Ok(SubscriptionStats {
            total_subscriptions: all.len(),
            active_subscriptions: all.iter().filter(|s| s.status == SubscriptionStatus::Active).count(),
            total_revenue: all.iter().map(|s| s.total_paid).sum(),
            total_burned: all.iter().map(|s| s.total_burned).sum(),
            tier_distribution,
        })
    }
}

fn close_fields(status: SubscriptionStatus, now: DateTime<Utc>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("status".to_string(), Value::String(status.as_str().to_string()));
    fields.insert("metadata.autoRenew".to_string(), Value::Bool(false));
    fields.insert("metadata.lastBilling".to_string(), json!(timestamp::format(&now)));
    fields
}

fn decode_subscription(doc: &Document) -> Option<Subscription> {
    match doc.decode::<Subscription>() {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(id = %doc.id, error = %e, "Skipping unreadable subscription");
            None
        }
    }
}
