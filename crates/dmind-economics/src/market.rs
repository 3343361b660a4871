/// MARKET DATA
///
/// Spot quotes for the coins shown beside DMT accounting. Quotes come from
/// CoinGecko's `/coins/markets` endpoint; the cache keeps the last good set
/// so a failed refresh never blanks the prices.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Market data provider returned {0}")]
    Status(u16),
    #[error("Malformed market data: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            MarketError::Decode(e.to_string())
        } else {
            MarketError::Network(e.to_string())
        }
    }
}

/// Source of market quotes
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn markets(&self, ids: &[String]) -> Result<Vec<MarketQuote>, MarketError>;
}

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    vs_currency: String,
    per_page: u32,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, vs_currency: &str, per_page: u32, timeout: Duration) -> Result<Self, MarketError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(CoinGeckoClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_string(),
            per_page,
        })
    }

    pub fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }

    pub fn query_params(&self, ids: &[String]) -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", self.vs_currency.clone()),
            ("ids", ids.join(",")),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
        ]
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoClient {
    async fn markets(&self, ids: &[String]) -> Result<Vec<MarketQuote>, MarketError> {
        let response = self
            .client
            .get(self.markets_url())
            .query(&self.query_params(ids))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MarketError::Status(response.status().as_u16()));
        }
        let quotes: Vec<MarketQuote> = response.json().await?;
        debug!(count = quotes.len(), "Fetched market quotes");
        Ok(quotes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub quotes: Vec<MarketQuote>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Last good set of quotes plus the most recent refresh error
#[derive(Debug, Default)]
pub struct MarketCache {
    snapshot: RwLock<MarketSnapshot>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        self.snapshot.read().clone()
    }

    pub fn quote(&self, id: &str) -> Option<MarketQuote> {
        self.snapshot.read().quotes.iter().find(|q| q.id == id).cloned()
    }

    /// Fetch and replace the quotes; on failure the previous quotes stay
    pub async fn refresh(&self, provider: &dyn MarketDataProvider, ids: &[String]) -> Result<usize, MarketError> {
        match provider.markets(ids).await {
            Ok(quotes) => {
                let count = quotes.len();
                let mut snapshot = self.snapshot.write();
                snapshot.quotes = quotes;
                snapshot.updated_at = Some(Utc::now());
                snapshot.last_error = None;
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Market refresh failed, keeping previous quotes");
                self.snapshot.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<Result<Vec<MarketQuote>, MarketError>>>,
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedProvider {
        async fn markets(&self, _ids: &[String]) -> Result<Vec<MarketQuote>, MarketError> {
            self.responses.lock().remove(0)
        }
    }

    fn quote(id: &str, price: f64) -> MarketQuote {
        MarketQuote {
            id: id.to_string(),
            symbol: id[..3].to_string(),
            name: id.to_string(),
            image: None,
            current_price: Some(price),
            market_cap: None,
            market_cap_rank: None,
            total_volume: None,
            price_change_percentage_24h: None,
            last_updated: None,
        }
    }

    #[test]
    fn test_coingecko_request_shape() {
        let client = CoinGeckoClient::new("https://api.coingecko.com/api/v3/", "usd", 10, Duration::from_secs(5)).unwrap();
        assert_eq!(client.markets_url(), "https://api.coingecko.com/api/v3/coins/markets");
        let params = client.query_params(&["bitcoin".to_string(), "solana".to_string()]);
        assert!(params.contains(&("ids", "bitcoin,solana".to_string())));
        assert!(params.contains(&("order", "market_cap_desc".to_string())));
        assert!(params.contains(&("sparkline", "false".to_string())));
    }

    #[test]
    fn test_quote_decodes_partial_rows() {
        let row = serde_json::json!({
            "id": "solana", "symbol": "sol", "name": "Solana",
            "current_price": 142.5, "market_cap_rank": 5, "price_change_percentage_24h": null
        });
        let q: MarketQuote = serde_json::from_value(row).unwrap();
        assert_eq!(q.current_price, Some(142.5));
        assert_eq!(q.market_cap_rank, Some(5));
        assert!(q.price_change_percentage_24h.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_quotes() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![
                Ok(vec![quote("bitcoin", 60000.0)]),
                Err(MarketError::Status(429)),
            ]),
        };
        let cache = MarketCache::new();
        let ids = vec!["bitcoin".to_string()];

        assert_eq!(cache.refresh(&provider, &ids).await.unwrap(), 1);
        assert!(cache.refresh(&provider, &ids).await.is_err());

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.quotes.len(), 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("Market data provider returned 429"));
        assert_eq!(cache.quote("bitcoin").unwrap().current_price, Some(60000.0));
    }
}
