use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use dmind_auth::{AuthService, NftOwnershipService, RoleNftContracts, SolanaRpcClient};
use dmind_core::{DecentraMindConfig, ErrorHandler};
use dmind_economics::integration::DecentraMindEconomics;
use dmind_economics::{CoinGeckoClient, MarketCache, MarketDataProvider};
use dmind_rpc::AppState;
use dmind_state::{DocumentStore, FallbackStore, FirestoreSettings, FirestoreStore};

const MARKET_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the daemon runs, built once from configuration
pub struct Services {
    pub store: Arc<FallbackStore>,
    pub app: AppState,
    pub market_provider: Arc<dyn MarketDataProvider>,
}

pub fn build_services(config: &DecentraMindConfig) -> Result<Services> {
    let primary: Option<Arc<dyn DocumentStore>> = if config.firestore.enabled {
        let firestore = FirestoreStore::new(FirestoreSettings {
            base_url: config.firestore.base_url.clone(),
            project_id: config.firestore.project_id.clone(),
            api_key: config.firestore.api_key.clone(),
            access_token: config.firestore.access_token.clone(),
            timeout: Duration::from_secs(config.firestore.timeout_secs),
        })
        .context("failed to build Firestore client")?;
        info!(project = %config.firestore.project_id, "Firestore enabled, local store is the fallback");
        Some(Arc::new(firestore))
    } else {
        info!("Firestore disabled, using the in-memory store");
        None
    };
    let store = Arc::new(FallbackStore::new(primary));

    let rpc = SolanaRpcClient::new(
        &config.solana.rpc_url,
        &config.solana.commitment,
        Duration::from_secs(config.solana.timeout_secs),
    )
    .context("failed to build Solana RPC client")?;
    let nft = Arc::new(NftOwnershipService::new(
        Arc::new(rpc),
        RoleNftContracts::from_config(&config.solana),
    ));
    let auth = Arc::new(AuthService::new(&config.auth, nft.clone(), store.clone()));
    let economics = DecentraMindEconomics::new(store.clone());

    let market_provider: Arc<dyn MarketDataProvider> = Arc::new(
        CoinGeckoClient::new(
            &config.market.base_url,
            &config.market.vs_currency,
            config.market.per_page,
            MARKET_TIMEOUT,
        )
        .context("failed to build market data client")?,
    );

    Ok(Services {
        store,
        app: AppState::new(economics, auth, nft, Arc::new(ErrorHandler::new())),
        market_provider,
    })
}

/// Expire lapsed subscriptions, complete matured stakes, retry writes the
/// remote store missed and drop stale session revocations
pub fn spawn_expiry_sweep(
    economics: DecentraMindEconomics,
    auth: Arc<AuthService>,
    store: Arc<FallbackStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let pending = store.replay_pending().await;
            if pending > 0 {
                debug!(pending, "Remote store writes still queued");
            }
            match economics.subscriptions.expire_due(now).await {
                Ok(expired) => debug!(expired, "Expiry sweep finished"),
                Err(e) => warn!(error = %e, "Subscription expiry sweep failed"),
            }
            match economics.staking.complete_matured(now).await {
                Ok(completed) => debug!(completed, "Staking sweep finished"),
                Err(e) => warn!(error = %e, "Staking sweep failed"),
            }
            let purged = auth.purge_revoked(now);
            if purged > 0 {
                debug!(purged, "Purged expired session revocations");
            }
        }
    })
}

/// Keep the market cache fresh
pub fn spawn_market_refresh(
    cache: Arc<MarketCache>,
    provider: Arc<dyn MarketDataProvider>,
    coin_ids: Vec<String>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            // Failures are logged by the cache, which keeps the last good quotes.
            if let Ok(count) = cache.refresh(provider.as_ref(), &coin_ids).await {
                debug!(count, "Market quotes refreshed");
            }
        }
    })
}
