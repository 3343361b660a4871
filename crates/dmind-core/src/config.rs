/// DAEMON CONFIGURATION
///
/// Layered as: built-in defaults, then an optional `decentramind.toml` (or an
/// explicit path), then `DMIND__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CoreError;

pub const DEFAULT_CONFIG_FILE: &str = "decentramind";
pub const ENV_PREFIX: &str = "DMIND";

/// Built-in session secret. Usable in-process, refused by `validate`.
pub const DEV_JWT_SECRET: &str = "decentramind-dev-secret";

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecentraMindConfig {
    pub server: ServerConfig,
    pub firestore: FirestoreConfig,
    pub solana: SolanaConfig,
    pub auth: AuthConfig,
    pub market: MarketConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Firestore REST backend. Disabled means in-memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub enabled: bool,
    pub project_id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        FirestoreConfig {
            enabled: false,
            project_id: "decentramind-demo".to_string(),
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            api_key: None,
            access_token: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: String,
    pub care_orchestrator_mint: String,
    pub dmtx_dao_mint: String,
    pub patient_mint: String,
    pub timeout_secs: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        SolanaConfig {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            care_orchestrator_mint: "CareOrchestratorNFTContractAddress".to_string(),
            dmtx_dao_mint: "DMTXDAOTokenContractAddress".to_string(),
            patient_mint: "PatientNFTContractAddress".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            issuer: "decentramind".to_string(),
            session_ttl_hours: 24,
        }
    }
}

impl AuthConfig {
    /// A deployable secret: not the built-in one and at least
    /// `MIN_JWT_SECRET_LEN` bytes
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.jwt_secret.is_empty() {
            return Err(CoreError::Config("auth.jwt_secret must be set".to_string()));
        }
        if self.jwt_secret == DEV_JWT_SECRET {
            return Err(CoreError::Config(
                "auth.jwt_secret is the built-in development secret; set DMIND__AUTH__JWT_SECRET".to_string(),
            ));
        }
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(CoreError::Config(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.session_ttl_hours <= 0 {
            return Err(CoreError::Config("auth.session_ttl_hours must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub vs_currency: String,
    pub coin_ids: Vec<String>,
    pub per_page: u32,
    pub refresh_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            vs_currency: "usd".to_string(),
            coin_ids: ["bitcoin", "ethereum", "solana", "matic-network", "avalanche-2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            per_page: 10,
            refresh_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub expiry_sweep_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { expiry_sweep_secs: 300 }
    }
}

impl DecentraMindConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let file_source = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let loaded: DecentraMindConfig = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("market.coin_ids")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.server.port == 0 {
            return Err(CoreError::Config("server.port must be non-zero".to_string()));
        }
        self.auth.validate()?;
        if self.firestore.enabled && self.firestore.project_id.is_empty() {
            return Err(CoreError::Config(
                "firestore.project_id is required when firestore is enabled".to_string(),
            ));
        }
        if self.market.refresh_secs == 0 || self.scheduler.expiry_sweep_secs == 0 {
            return Err(CoreError::Config("background intervals must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
