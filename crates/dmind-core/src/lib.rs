/// DECENTRAMIND CORE
///
/// Shared primitives for the accounting services:
/// - DMT amounts with exact basis-point arithmetic
/// - Wallet address validation and the DAO treasury account
/// - Fixed-width timestamps for document ordering
/// - Layered daemon configuration and logging setup
/// - The user-facing error handler

pub mod amount;
pub mod config;
pub mod error;
pub mod error_handler;
pub mod logging;
pub mod timestamp;
pub mod wallet;

pub use amount::{DmtAmount, AMOUNT_DECIMALS, BPS_DENOMINATOR, DMT_DECIMALS, MICRO_PER_DMT, UNITS_PER_DMT};
pub use config::{
    AuthConfig, DecentraMindConfig, FirestoreConfig, MarketConfig, SchedulerConfig, ServerConfig,
    SolanaConfig, DEV_JWT_SECRET, MIN_JWT_SECRET_LEN,
};
pub use error::CoreError;
pub use error_handler::{user_friendly_message, ErrorContext, ErrorHandler, ErrorLog, ErrorStats, Severity};
pub use logging::init_logging;
pub use wallet::{is_valid_wallet_address, AccountId, WalletAddress, DAO_TREASURY_ACCOUNT};
