/// DECENTRAMIND ECONOMICS
///
/// DMT accounting for the platform:
/// - Percentage burns per fee source, appended to an event log
/// - Burn metrics and trend statistics derived from that log
/// - Four subscription tiers with a burn/treasury/rewards split
/// - Staking positions with fixed-rate rewards
/// - Marketplace and agent fee calculators
/// - Market quotes cached from an external provider

pub mod burning;
pub mod fees;
pub mod market;
pub mod metrics;
pub mod staking;
pub mod subscription;
pub mod tiers;

pub use burning::{
    BurnError, BurnEvent, BurnLedgerEntry, BurnReceipt, BurnRequest, BurnSource, BurningService,
};
pub use fees::{
    agent_evolution_cost, agent_minting_cost, marketplace_fee, marketplace_quote, platform_fee, AgentKind,
    FeeError, MarketplaceQuote,
};
pub use market::{CoinGeckoClient, MarketCache, MarketDataProvider, MarketError, MarketQuote, MarketSnapshot};
pub use metrics::{BurnTrend, BurningMetrics, BurningStats, TOTAL_SUPPLY};
pub use staking::{
    staking_reward, StakeReceipt, StakingError, StakingPosition, StakingService, StakingStats, StakingStatus,
    UnstakeReceipt,
};
pub use subscription::{
    Subscription, SubscriptionError, SubscriptionMetadata, SubscriptionResult, SubscriptionService,
    SubscriptionStats, SubscriptionStatus,
};
pub use tiers::{Allowance, FeeSplit, SubscriptionTier, TierName};

/// Economic services wired over one document store
pub mod integration {
    use crate::*;
    use dmind_core::DmtAmount;
    use dmind_state::DocumentStore;
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct DecentraMindEconomics {
        pub burning: Arc<BurningService>,
        pub subscriptions: Arc<SubscriptionService>,
        pub staking: Arc<StakingService>,
        pub market: Arc<MarketCache>,
    }

    impl DecentraMindEconomics {
        pub fn new(store: Arc<dyn DocumentStore>) -> Self {
            let burning = Arc::new(BurningService::new(store.clone()));
            let subscriptions = Arc::new(SubscriptionService::new(store.clone(), burning.clone()));
            DecentraMindEconomics {
                burning,
                subscriptions,
                staking: Arc::new(StakingService::new(store)),
                market: Arc::new(MarketCache::new()),
            }
        }

        /// Check that burn totals agree across the event log, the ledger and
        /// subscriptions
        pub async fn verify_burn_invariants(&self) -> Result<(), EconomicError> {
            let metrics = self.burning.metrics().await?;
            let by_source: DmtAmount = BurnSource::ALL
                .iter()
                .map(|s| match s {
                    BurnSource::Minting => metrics.minting_burned,
                    BurnSource::Subscription => metrics.subscription_burned,
                    BurnSource::Upgrade => metrics.upgrade_burned,
                    BurnSource::Marketplace => metrics.marketplace_burned,
                    BurnSource::Dao => metrics.dao_burned,
                })
                .sum();
            if by_source != metrics.total_burned {
                return Err(EconomicError::BurnTotalMismatch);
            }

            let subscription_stats = self.subscriptions.stats().await?;
            let ledgered: DmtAmount = self
                .burning
                .ledger_entries(Some(burning::SUBSCRIPTION_BURN_TRANSACTION))
                .await?
                .iter()
                .map(|entry| entry.amount)
                .sum();
            if ledgered != subscription_stats.total_burned {
                return Err(EconomicError::SubscriptionLedgerMismatch);
            }
            Ok(())
        }
    }

    #[derive(Debug, thiserror::Error, Clone, PartialEq)]
    pub enum EconomicError {
        #[error("Burn error: {0}")]
        Burn(#[from] BurnError),
        #[error("Subscription error: {0}")]
        Subscription(#[from] SubscriptionError),
        #[error("Market error: {0}")]
        Market(#[from] MarketError),
        #[error("Per-source burn totals do not add up to the total burned")]
        BurnTotalMismatch,
        #[error("Staking error: {0}")]
        Staking(#[from] StakingError),
        #[error("Subscription burns do not match the subscription ledger")]
        SubscriptionLedgerMismatch,
    }
}
