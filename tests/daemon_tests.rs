/// DAEMON WIRING TESTS
///
/// These tests verify:
/// - Services build from the default configuration without Firestore
/// - The expiry sweep closes lapsed subscriptions and matured stakes
/// - Configuration loading refuses the built-in session secret
/// - The market refresh task fills the cache

#[cfg(test)]
mod daemon_tests {
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use decentramind::*;
    use dmind_core::DecentraMindConfig;
    use dmind_core::DmtAmount;
    use dmind_economics::{MarketDataProvider, MarketError, MarketQuote, StakingStatus, SubscriptionStatus};
    use std::sync::Arc;
    use std::time::Duration;

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    struct FixedQuotes;

    #[async_trait]
    impl MarketDataProvider for FixedQuotes {
        async fn markets(&self, ids: &[String]) -> Result<Vec<MarketQuote>, MarketError> {
            Ok(ids
                .iter()
                .map(|id| MarketQuote {
                    id: id.clone(),
                    symbol: id[..3].to_string(),
                    name: id.clone(),
                    image: None,
                    current_price: Some(1.0),
                    market_cap: None,
                    market_cap_rank: None,
                    total_volume: None,
                    price_change_percentage_24h: None,
                    last_updated: None,
                })
                .collect())
        }
    }

    #[test]
    fn test_default_config_builds_memory_services() {
        let services = tokio_test::block_on(async { build_services(&DecentraMindConfig::default()) }).unwrap();
        assert!(!services.store.has_primary());
        assert_eq!(services.app.errors.stats().total, 0);
    }

    #[tokio::test]
    async fn test_expiry_sweep_closes_lapsed_subscriptions() {
        let services = build_services(&DecentraMindConfig::default()).unwrap();
        let economics = services.app.economics.clone();
        let subscriptions = economics.subscriptions.clone();
        subscriptions
            .subscribe_at(WALLET, "basic", None, Utc::now() - ChronoDuration::days(31))
            .await
            .unwrap();
        economics
            .staking
            .stake_at(WALLET, DmtAmount::from_dmt(500), 30, None, Utc::now() - ChronoDuration::days(31))
            .await
            .unwrap();

        let sweep = spawn_expiry_sweep(
            economics.clone(),
            services.app.auth.clone(),
            services.store.clone(),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweep.abort();

        let all = subscriptions.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SubscriptionStatus::Expired);
        assert!(subscriptions.user_subscription(WALLET).await.unwrap().is_none());

        let positions = economics.staking.positions(WALLET).await.unwrap();
        assert_eq!(positions[0].status, StakingStatus::Completed);
    }

    #[test]
    fn test_load_refuses_dev_secret() {
        let dir = std::env::temp_dir().join(format!("dmind-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("decentramind.toml");

        std::fs::write(&path, "[server]\nport = 9191\n").unwrap();
        let err = DecentraMindConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("development secret"));

        std::fs::write(
            &path,
            "[server]\nport = 9191\n[auth]\njwt_secret = \"a-deployment-secret-of-forty-bytes-long!\"\n",
        )
        .unwrap();
        let config = DecentraMindConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9191);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_market_refresh_fills_cache() {
        let services = build_services(&DecentraMindConfig::default()).unwrap();
        let cache = services.app.economics.market.clone();
        let ids = vec!["bitcoin".to_string(), "solana".to_string()];

        let refresh = spawn_market_refresh(cache.clone(), Arc::new(FixedQuotes), ids, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        refresh.abort();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.quotes.len(), 2);
        assert!(snapshot.updated_at.is_some());
        assert_eq!(cache.quote("solana").unwrap().symbol, "sol");
    }
}
