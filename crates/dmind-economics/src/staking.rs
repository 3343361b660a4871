/// DMT STAKING POSITIONS
///
/// Lock-up positions kept in the `staking_positions` collection. Rewards are
/// fixed when a position opens: 12.5% APY pro rata over the lock period.
/// Unstaking before the lock ends costs 5% of the stake and half of the
/// rewards. Positions still active when their lock ends are completed by the
/// daemon's sweep.
///
/// States: Active -> Unstaked, Active -> Completed.

use chrono::{DateTime, Duration, Utc};
use dmind_core::{timestamp, CoreError, DmtAmount, WalletAddress};
use dmind_state::{collections, encode_record, Direction, Document, DocumentStore, Fields, Query, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Annual reward rate in basis points (12.5%)
pub const STAKING_APY_BPS: u16 = 1250;

/// Share of the stake forfeited on early unstake (5%)
pub const EARLY_UNSTAKE_PENALTY_BPS: u16 = 500;

/// Share of the rewards kept on early unstake (50%)
pub const EARLY_UNSTAKE_REWARD_BPS: u16 = 5000;

pub const MIN_STAKE: DmtAmount = DmtAmount::from_dmt(100);

pub const MAX_LOCK_DAYS: u32 = 4 * 365;

const DAYS_PER_YEAR: u128 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakingStatus {
    Active,
    Completed,
    Unstaked,
}

impl StakingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakingStatus::Active => "Active",
            StakingStatus::Completed => "Completed",
            StakingStatus::Unstaked => "Unstaked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingPosition {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub amount: DmtAmount,
    #[serde(with = "timestamp")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub end_date: DateTime<Utc>,
    pub rewards: DmtAmount,
    pub status: StakingStatus,
    /// Lock period in days
    pub lock_period: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<DmtAmount>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub unstake_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeReceipt {
    pub success: bool,
    pub position_id: String,
    pub rewards: DmtAmount,
    #[serde(with = "timestamp")]
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeReceipt {
    pub success: bool,
    pub position_id: String,
    pub early: bool,
    pub penalty: DmtAmount,
    pub rewards: DmtAmount,
    /// Stake minus penalty plus rewards
    pub returned: DmtAmount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingStats {
    pub total_staked: DmtAmount,
    pub total_rewards: DmtAmount,
    pub active_positions: usize,
    pub total_penalty: DmtAmount,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StakingError {
    #[error("User ID is required")]
    MissingUser,
    #[error("Invalid wallet address format")]
    InvalidWalletAddress(String),
    #[error("Invalid stake amount: {0}")]
    InvalidAmount(String),
    #[error("Minimum stake amount is {0} DMT")]
    BelowMinimum(DmtAmount),
    #[error("Lock period must be between 1 and {max} days, got {0}", max = MAX_LOCK_DAYS)]
    InvalidLockPeriod(u32),
    #[error("Staking position not found: {0}")]
    NotFound(String),
    #[error("Staking position {0} belongs to another wallet")]
    NotOwner(String),
    #[error("Staking position {0} is no longer active")]
    NotActive(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for StakingError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidWalletAddress(addr) => StakingError::InvalidWalletAddress(addr),
            other => StakingError::InvalidAmount(other.to_string()),
        }
    }
}

/// Rewards earned by `amount` locked for `lock_days`
pub fn staking_reward(amount: DmtAmount, lock_days: u32) -> DmtAmount {
    amount.mul_div(
        STAKING_APY_BPS as u128 * lock_days as u128,
        dmind_core::BPS_DENOMINATOR * DAYS_PER_YEAR,
    )
}

/// **Staking service**
pub struct StakingService {
    store: Arc<dyn DocumentStore>,
    write_lock: Mutex<()>,
}

impl StakingService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        StakingService {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn stake(
        &self,
        user_id: &str,
        amount: DmtAmount,
        lock_days: u32,
        transaction_signature: Option<&str>,
    ) -> Result<StakeReceipt, StakingError> {
        self.stake_at(user_id, amount, lock_days, transaction_signature, timestamp::now_millis())
            .await
    }

    /// Open a position with an explicit start time
    pub async fn stake_at(
        &self,
        user_id: &str,
        amount: DmtAmount,
        lock_days: u32,
        transaction_signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StakeReceipt, StakingError> {
        if user_id.is_empty() {
            return Err(StakingError::MissingUser);
        }
        let wallet = WalletAddress::parse(user_id)?;
        amount.ensure_fee_precision()?;
        if amount < MIN_STAKE {
            return Err(StakingError::BelowMinimum(MIN_STAKE));
        }
        if lock_days == 0 || lock_days > MAX_LOCK_DAYS {
            return Err(StakingError::InvalidLockPeriod(lock_days));
        }

        let position = StakingPosition {
            id: String::new(),
            user_id: wallet.as_str().to_string(),
            amount,
            start_date: now,
            end_date: now + Duration::days(lock_days as i64),
            rewards: staking_reward(amount, lock_days),
            status: StakingStatus::Active,
            lock_period: lock_days,
            penalty: None,
            unstake_date: None,
            transaction_signature: transaction_signature.map(str::to_string),
        };
        let position_id = self
            .store
            .add(collections::STAKING_POSITIONS, encode_record(&position)?)
            .await?;

        info!(
            user = %wallet,
            amount = %amount,
            lock_days,
            rewards = %position.rewards,
            "Staking position opened"
        );

        Ok(StakeReceipt {
            success: true,
            position_id,
            rewards: position.rewards,
            end_date: position.end_date,
        })
    }

    /// A wallet's positions, newest first
    pub async fn positions(&self, user_id: &str) -> Result<Vec<StakingPosition>, StakingError> {
        let query = Query::new()
            .where_eq("userId", user_id)
            .order_by("startDate", Direction::Descending);
        Ok(self
            .store
            .query(collections::STAKING_POSITIONS, &query)
            .await?
            .iter()
            .filter_map(decode_position)
            .collect())
    }

    pub async fn position(&self, position_id: &str) -> Result<Option<StakingPosition>, StakingError> {
        Ok(self
            .store
            .get(collections::STAKING_POSITIONS, position_id)
            .await?
            .as_ref()
            .and_then(decode_position))
    }

    pub async fn unstake(
        &self,
        position_id: &str,
        user_id: &str,
        transaction_signature: Option<&str>,
    ) -> Result<UnstakeReceipt, StakingError> {
        self.unstake_at(position_id, user_id, transaction_signature, timestamp::now_millis())
            .await
    }

    /// Close an active position owned by `user_id`
    pub async fn unstake_at(
        &self,
        position_id: &str,
        user_id: &str,
        transaction_signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UnstakeReceipt, StakingError> {
        let _guard = self.write_lock.lock().await;

        let position = self
            .position(position_id)
            .await?
            .ok_or_else(|| StakingError::NotFound(position_id.to_string()))?;
        if position.user_id != user_id {
            return Err(StakingError::NotOwner(position_id.to_string()));
        }
        if position.status != StakingStatus::Active {
            return Err(StakingError::NotActive(position_id.to_string()));
        }

        let early = now < position.end_date;
        let (penalty, rewards) = if early {
            (
                position.amount.apply_bps(EARLY_UNSTAKE_PENALTY_BPS),
                position.rewards.apply_bps(EARLY_UNSTAKE_REWARD_BPS),
            )
        } else {
            (DmtAmount::ZERO, position.rewards)
        };

        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!(StakingStatus::Unstaked.as_str()));
        fields.insert("penalty".to_string(), serde_json::to_value(penalty).map_err(StoreError::from)?);
        fields.insert("rewards".to_string(), serde_json::to_value(rewards).map_err(StoreError::from)?);
        fields.insert("unstakeDate".to_string(), Value::String(timestamp::format(&now)));
        if let Some(signature) = transaction_signature {
            fields.insert("transactionSignature".to_string(), json!(signature));
        }
        self.store
            .update(collections::STAKING_POSITIONS, position_id, fields)
            .await?;

        info!(user = user_id, position_id, early, penalty = %penalty, "Staking position unstaked");

        Ok(UnstakeReceipt {
            success: true,
            position_id: position_id.to_string(),
            early,
            penalty,
            rewards,
            returned: position.amount.saturating_sub(penalty).saturating_add(rewards),
        })
    }

    /// Move every active position whose lock has ended to `Completed`
    pub async fn complete_matured(&self, now: DateTime<Utc>) -> Result<usize, StakingError> {
        let _guard = self.write_lock.lock().await;

        let query = Query::new().where_eq("status", StakingStatus::Active.as_str());
        let matured: Vec<StakingPosition> = self
            .store
            .query(collections::STAKING_POSITIONS, &query)
            .await?
            .iter()
            .filter_map(decode_position)
            .filter(|p| p.end_date <= now)
            .collect();

        for position in &matured {
            let mut fields = Fields::new();
            fields.insert("status".to_string(), json!(StakingStatus::Completed.as_str()));
            self.store
                .update(collections::STAKING_POSITIONS, &position.id, fields)
                .await?;
        }
        if !matured.is_empty() {
            info!(completed = matured.len(), "Completed matured staking positions");
        }
        Ok(matured.len())
    }

    /// Lifetime totals over every position the wallet has opened
    pub async fn stats(&self, user_id: &str) -> Result<StakingStats, StakingError> {
        let positions = self.positions(user_id).await?;
        Ok(StakingStats {
            total_staked: positions.iter().map(|p| p.amount).sum(),
            total_rewards: positions.iter().map(|p| p.rewards).sum(),
            active_positions: positions.iter().filter(|p| p.status == StakingStatus::Active).count(),
            total_penalty: positions.iter().filter_map(|p| p.penalty).sum(),
        })
    }
}

fn decode_position(doc: &Document) -> Option<StakingPosition> {
    match doc.decode::<StakingPosition>() {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(id = %doc.id, error = %e, "Skipping unreadable staking position");
            None
        }
    }
}
