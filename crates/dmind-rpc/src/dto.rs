/// API PAYLOADS
///
/// Request bodies and response shapes. Wire names are camelCase to match the
/// stored documents.

use chrono::{DateTime, Utc};
use dmind_auth::{NftOwnershipFlags, RoleNft, UserRole};
use dmind_core::{timestamp, DmtAmount};
use dmind_economics::{AgentKind, BurnError, BurnRequest, FeeError, StakingError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnBody {
    pub amount: f64,
    pub source: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl TryFrom<BurnBody> for BurnRequest {
    type Error = BurnError;

    fn try_from(body: BurnBody) -> Result<Self, Self::Error> {
        let amount = DmtAmount::from_f64(body.amount).map_err(|_| BurnError::InvalidAmount(body.amount.to_string()))?;
        Ok(BurnRequest {
            amount,
            source: body.source,
            user_id: body.user_id,
            agent_id: body.agent_id,
            subscription_tier: body.subscription_tier,
            transaction_hash: body.transaction_hash,
            metadata: body.metadata,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub user_id: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBody {
    #[serde(default)]
    pub user_id: String,
    pub tier: String,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreditsBody {
    #[serde(default)]
    pub credits: Option<u32>,
}

impl CreditsBody {
    pub fn requested(&self) -> u32 {
        self.credits.unwrap_or(1)
    }
}

/// `signature` is the base58 ed25519 signature of `message` by the wallet
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSignInBody {
    pub wallet_address: String,
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeBody {
    #[serde(default)]
    pub user_id: String,
    pub amount: f64,
    /// Days
    pub lock_period: u32,
    #[serde(default)]
    pub transaction_signature: Option<String>,
}

impl StakeBody {
    pub fn amount(&self) -> Result<DmtAmount, StakingError> {
        DmtAmount::from_f64(self.amount).map_err(|_| StakingError::InvalidAmount(self.amount.to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeBody {
    #[serde(default)]
    pub transaction_signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceFeeQuery {
    pub price: String,
}

impl MarketplaceFeeQuery {
    pub fn price(&self) -> Result<DmtAmount, FeeError> {
        self.price
            .parse()
            .map_err(|e: dmind_core::CoreError| FeeError::InvalidAmount(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintingFeeQuery {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub level: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionFeeQuery {
    pub level: u32,
    #[serde(default)]
    pub xp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintingCostResponse {
    pub agent_type: AgentKind,
    pub level: u32,
    pub cost: DmtAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionCostResponse {
    pub level: u32,
    pub xp: u64,
    pub cost: DmtAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub success: bool,
    pub credits_requested: u32,
    pub credits_remaining: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub wallet_address: String,
    pub role: UserRole,
    pub nft_ownership: NftOwnershipFlags,
    pub nfts: Vec<RoleNft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub wallet_address: String,
    pub role: UserRole,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

/// Body of every failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorBody {
            success: false,
            error: error.into(),
            message: message.into(),
        }
    }
}
