/// DMT BURN ACCOUNTING
///
/// Bookkeeping burns: each platform action that carries a DMT fee burns a
/// fixed share of it, by source. Burns are appended to the `burnEvents`
/// collection and mirrored as `burningMetrics` ledger entries. Subscription
/// payments only write a ledger entry. No tokens move on chain.

use chrono::{DateTime, Utc};
use dmind_core::{timestamp, AccountId, CoreError, DmtAmount};
use dmind_state::{collections, encode_record, Direction, DocumentStore, Query, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::{compute_metrics, compute_stats, BurningMetrics, BurningStats};

/// Ledger tag for burns recorded through `burn`
pub const BURN_EVENT_TRANSACTION: &str = "burn_event";

/// Ledger tag for burns recorded by the subscription service
pub const SUBSCRIPTION_BURN_TRANSACTION: &str = "subscription_burn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnSource {
    Minting,
    Subscription,
    Upgrade,
    Marketplace,
    Dao,
}

impl BurnSource {
    pub const ALL: [BurnSource; 5] = [
        BurnSource::Minting,
        BurnSource::Subscription,
        BurnSource::Upgrade,
        BurnSource::Marketplace,
        BurnSource::Dao,
    ];

    /// Burned share of the fee, in basis points
    pub fn rate_bps(&self) -> u16 {
        match self {
            BurnSource::Minting => 3000,
            BurnSource::Subscription => 2000,
            BurnSource::Upgrade => 1500,
            BurnSource::Marketplace => 2000,
            BurnSource::Dao => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BurnSource::Minting => "minting",
            BurnSource::Subscription => "subscription",
            BurnSource::Upgrade => "upgrade",
            BurnSource::Marketplace => "marketplace",
            BurnSource::Dao => "dao",
        }
    }

    /// Amount burned for a fee of `amount`
    pub fn burn_share(&self, amount: DmtAmount) -> DmtAmount {
        amount.apply_bps(self.rate_bps())
    }
}

impl fmt::Display for BurnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BurnSource {
    type Err = BurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BurnSource::ALL
            .iter()
            .copied()
            .find(|src| src.as_str() == s)
            .ok_or_else(|| BurnError::InvalidSource(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub amount: DmtAmount,
    pub source: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl BurnRequest {
    pub fn new(amount: DmtAmount, source: impl Into<String>, user_id: impl Into<String>) -> Self {
        BurnRequest {
            amount,
            source: source.into(),
            user_id: user_id.into(),
            agent_id: None,
            subscription_tier: None,
            transaction_hash: None,
            metadata: None,
        }
    }

    pub fn with_agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One recorded burn. `amount` is the burned quantity, not the original fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnEvent {
    #[serde(default)]
    pub id: String,
    pub amount: DmtAmount,
    pub source: BurnSource,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// `burningMetrics` ledger entry, written for every burn event and for every
/// paid subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnLedgerEntry {
    pub amount: DmtAmount,
    pub source: BurnSource,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub transaction_type: String,
    pub entry_hash: String,
}

impl BurnLedgerEntry {
    pub fn new(
        amount: DmtAmount,
        source: BurnSource,
        user_id: &str,
        tier: Option<&str>,
        timestamp: DateTime<Utc>,
        transaction_type: &str,
    ) -> Self {
        let mut entry = BurnLedgerEntry {
            amount,
            source,
            user_id: user_id.to_string(),
            tier: tier.map(str::to_string),
            timestamp,
            transaction_type: transaction_type.to_string(),
            entry_hash: String::new(),
        };
        entry.entry_hash = hex::encode(entry.compute_hash());
        entry
    }

    pub fn for_event(event: &BurnEvent, transaction_type: &str) -> Self {
        Self::new(
            event.amount,
            event.source,
            &event.user_id,
            event.subscription_tier.as_deref(),
            event.timestamp,
            transaction_type,
        )
    }

    /// Commitment over the accounting fields of the entry
    pub fn compute_hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.amount.units().to_le_bytes());
        hasher.update(self.source.as_str().as_bytes());
        hasher.update(self.user_id.as_bytes());
        hasher.update(timestamp::format(&self.timestamp).as_bytes());
        hasher.update(self.transaction_type.as_bytes());
        hasher.finalize().to_vec()
    }

    pub fn verify_hash(&self) -> bool {
        hex::encode(self.compute_hash()) == self.entry_hash
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnReceipt {
    pub success: bool,
    pub burned_amount: DmtAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BurnError {
    #[error("Invalid burn amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid source: {0}")]
    InvalidSource(String),
    #[error("User ID is required")]
    MissingUser,
    #[error("Invalid wallet address format")]
    InvalidWalletAddress(String),
    #[error("The DAO treasury account can only burn through the dao source, not {0}")]
    TreasuryRestricted(BurnSource),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for BurnError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidWalletAddress(addr) => BurnError::InvalidWalletAddress(addr),
            other => BurnError::InvalidAmount(other.to_string()),
        }
    }
}

/// **Burn accounting service**
pub struct BurningService {
    store: Arc<dyn DocumentStore>,
}

impl BurningService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        BurningService { store }
    }

    /// Validate a request and record its burn
    pub async fn burn(&self, request: BurnRequest) -> Result<BurnReceipt, BurnError> {
        if request.amount.is_zero() {
            return Err(BurnError::InvalidAmount("amount must be greater than zero".to_string()));
        }
        request.amount.ensure_fee_precision()?;
        let source: BurnSource = request.source.parse()?;
        if request.user_id.is_empty() {
            return Err(BurnError::MissingUser);
        }
        let account = AccountId::parse(&request.user_id)?;
        if account.is_treasury() && source != BurnSource::Dao {
            return Err(BurnError::TreasuryRestricted(source));
        }

        let burned = source.burn_share(request.amount);

        let event = BurnEvent {
            id: String::new(),
            amount: burned,
            source,
            user_id: account.as_str().to_string(),
            agent_id: request.agent_id,
            subscription_tier: request.subscription_tier,
            transaction_hash: request.transaction_hash,
            timestamp: timestamp::now_millis(),
            metadata: request.metadata,
        };
        let event_id = self.record(&event, BURN_EVENT_TRANSACTION).await?;

        info!(
            amount = %burned,
            source = %source,
            user = %account,
            event_id = %event_id,
            "DMT burned"
        );

        Ok(BurnReceipt {
            success: true,
            burned_amount: burned,
            transaction_hash: event.transaction_hash,
            event_id: Some(event_id),
        })
    }

    /// Append an already computed burn event and its ledger entry
    pub async fn record(&self, event: &BurnEvent, transaction_type: &str) -> Result<String, BurnError> {
        let id = self
            .store
            .add(collections::BURN_EVENTS, encode_record(event)?)
            .await?;

        let entry = BurnLedgerEntry::for_event(event, transaction_type);
        if let Err(e) = self.record_ledger(&entry).await {
            warn!(event_id = %id, error = %e, "Failed to write burn ledger entry");
        }
        Ok(id)
    }

    /// Append a `burningMetrics` entry without a burn event
    pub async fn record_ledger(&self, entry: &BurnLedgerEntry) -> Result<String, BurnError> {
        Ok(self
            .store
            .add(collections::BURNING_METRICS, encode_record(entry)?)
            .await?)
    }

    /// Ledger entries, optionally only those of one transaction type
    pub async fn ledger_entries(&self, transaction_type: Option<&str>) -> Result<Vec<BurnLedgerEntry>, BurnError> {
        let mut query = Query::new();
        if let Some(kind) = transaction_type {
            query = query.where_eq("transactionType", kind);
        }
        let docs = self.store.query(collections::BURNING_METRICS, &query).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<BurnLedgerEntry>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Skipping unreadable ledger entry");
                    None
                }
            })
            .collect())
    }

    pub async fn burn_minting_fee(&self, user_id: &str, fee: DmtAmount, agent_id: Option<&str>) -> Result<BurnReceipt, BurnError> {
        let request = BurnRequest::new(fee, BurnSource::Minting.as_str(), user_id)
            .with_agent(agent_id)
            .with_metadata(json!({ "burnType": "minting_fee", "originalFee": fee }));
        self.burn(request).await
    }

    pub async fn burn_subscription_fee(&self, user_id: &str, fee: DmtAmount, tier: Option<&str>) -> Result<BurnReceipt, BurnError> {
        let mut request = BurnRequest::new(fee, BurnSource::Subscription.as_str(), user_id)
            .with_metadata(json!({ "burnType": "subscription_fee", "originalFee": fee, "tier": tier }));
        request.subscription_tier = tier.map(str::to_string);
        self.burn(request).await
    }

    pub async fn burn_upgrade_fee(&self, user_id: &str, fee: DmtAmount, agent_id: Option<&str>) -> Result<BurnReceipt, BurnError> {
        let request = BurnRequest::new(fee, BurnSource::Upgrade.as_str(), user_id)
            .with_agent(agent_id)
            .with_metadata(json!({ "burnType": "upgrade_fee", "originalFee": fee }));
        self.burn(request).await
    }

    pub async fn burn_marketplace_fee(&self, user_id: &str, fee: DmtAmount, agent_id: Option<&str>) -> Result<BurnReceipt, BurnError> {
        let request = BurnRequest::new(fee, BurnSource::Marketplace.as_str(), user_id)
            .with_agent(agent_id)
            .with_metadata(json!({ "burnType": "marketplace_fee", "originalFee": fee }));
        self.burn(request).await
    }

    /// Burn from the DAO treasury, optionally tied to a governance proposal
    pub async fn burn_dao_treasury(&self, amount: DmtAmount, proposal_id: Option<&str>) -> Result<BurnReceipt, BurnError> {
        let request = BurnRequest::new(amount, BurnSource::Dao.as_str(), dmind_core::DAO_TREASURY_ACCOUNT)
            .with_metadata(json!({ "burnType": "dao_treasury", "proposalId": proposal_id }));
        self.burn(request).await
    }

    /// Every recorded burn, newest first
    pub async fn all_events(&self) -> Result<Vec<BurnEvent>, BurnError> {
        let query = Query::new().order_by("timestamp", Direction::Descending);
        let docs = self.store.query(collections::BURN_EVENTS, &query).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<BurnEvent>() {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Skipping unreadable burn event");
                    None
                }
            })
            .collect())
    }

    pub async fn user_events(&self, user_id: &str) -> Result<Vec<BurnEvent>, BurnError> {
        let mut events = self.all_events().await?;
        events.retain(|e| e.user_id == user_id);
        Ok(events)
    }

    pub async fn events_by_source(&self, source: BurnSource) -> Result<Vec<BurnEvent>, BurnError> {
        let mut events = self.all_events().await?;
        events.retain(|e| e.source == source);
        Ok(events)
    }

    pub async fn total_burned_by_source(&self, source: BurnSource) -> Result<DmtAmount, BurnError> {
        Ok(self.events_by_source(source).await?.iter().map(|e| e.amount).sum())
    }

    pub async fn metrics(&self) -> Result<BurningMetrics, BurnError> {
        Ok(compute_metrics(&self.all_events().await?, Utc::now()))
    }

    pub async fn stats(&self) -> Result<BurningStats, BurnError> {
        Ok(compute_stats(&self.all_events().await?, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmind_state::MemoryStore;

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn service() -> BurningService {
        BurningService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_source_rates() {
        let hundred = DmtAmount::from_dmt(100);
        assert_eq!(BurnSource::Minting.burn_share(hundred), DmtAmount::from_dmt(30));
        assert_eq!(BurnSource::Upgrade.burn_share(hundred), DmtAmount::from_dmt(15));
        assert_eq!(BurnSource::Dao.burn_share(hundred), DmtAmount::from_dmt(10));
        assert!("invalid-source".parse::<BurnSource>().unwrap_err().to_string().contains("Invalid source"));
    }

    #[tokio::test]
    async fn test_burn_records_event_and_ledger() {
        let store = Arc::new(MemoryStore::new());
        let service = BurningService::new(store.clone());

        let receipt = service
            .burn(BurnRequest::new(DmtAmount::from_dmt(29), "subscription", WALLET))
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.burned_amount.to_string(), "5.8");
        assert!(receipt.event_id.is_some());

        assert_eq!(store.len(collections::BURN_EVENTS), 1);
        let ledger = store.documents(collections::BURNING_METRICS);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].data["transactionType"], json!("burn_event"));
        let entry: BurnLedgerEntry = serde_json::from_value(ledger[0].data.clone()).unwrap();
        assert!(entry.verify_hash());
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = BurningService::new(store.clone());
        let err = service
            .burn(BurnRequest::new(DmtAmount::ZERO, "minting", WALLET))
            .await
            .unwrap_err();
        assert!(matches!(err, BurnError::InvalidAmount(_)));
        assert!(err.to_string().starts_with("Invalid burn amount"));
        assert!(store.is_empty(collections::BURN_EVENTS));
        assert!(store.is_empty(collections::BURNING_METRICS));
    }

    #[tokio::test]
    async fn test_sub_micro_burn_is_exact() {
        let service = service();
        let receipt = service
            .burn(BurnRequest::new(DmtAmount::from_micro(5), "minting", WALLET))
            .await
            .unwrap();
        assert_eq!(receipt.burned_amount.to_string(), "0.0000015");
        assert_eq!(service.all_events().await.unwrap()[0].amount, receipt.burned_amount);

        let err = service
            .burn(BurnRequest::new("0.1234567".parse().unwrap(), "minting", WALLET))
            .await
            .unwrap_err();
        assert!(matches!(err, BurnError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let service = service();
        let amount = DmtAmount::from_dmt(10);

        let err = service.burn(BurnRequest::new(amount, "invalid-source", WALLET)).await.unwrap_err();
        assert!(err.to_string().contains("Invalid source"));

        let err = service.burn(BurnRequest::new(amount, "minting", "not-a-wallet")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid wallet address format");

        let err = service.burn(BurnRequest::new(amount, "minting", "")).await.unwrap_err();
        assert_eq!(err, BurnError::MissingUser);

        let err = service
            .burn(BurnRequest::new(amount, "minting", dmind_core::DAO_TREASURY_ACCOUNT))
            .await
            .unwrap_err();
        assert_eq!(err, BurnError::TreasuryRestricted(BurnSource::Minting));
    }

    #[tokio::test]
    async fn test_convenience_burns_tag_metadata() {
        let service = service();
        service
            .burn_minting_fee(WALLET, DmtAmount::from_dmt(100), Some("agent-1"))
            .await
            .unwrap();
        let receipt = service.burn_dao_treasury(DmtAmount::from_dmt(1000), Some("prop-7")).await.unwrap();
        assert_eq!(receipt.burned_amount, DmtAmount::from_dmt(100));

        let dao = service.events_by_source(BurnSource::Dao).await.unwrap();
        assert_eq!(dao.len(), 1);
        assert_eq!(dao[0].user_id, "dao-treasury");
        assert_eq!(dao[0].metadata.as_ref().unwrap()["proposalId"], json!("prop-7"));

        let minting = service.user_events(WALLET).await.unwrap();
        assert_eq!(minting[0].agent_id.as_deref(), Some("agent-1"));
        assert_eq!(minting[0].metadata.as_ref().unwrap()["burnType"], json!("minting_fee"));
        assert_eq!(
            service.total_burned_by_source(BurnSource::Minting).await.unwrap(),
            DmtAmount::from_dmt(30)
        );
    }
}
