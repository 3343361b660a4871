/// DECENTRAMIND DAEMON
///
/// Wires the accounting services from configuration and runs the periodic
/// maintenance tasks next to the HTTP API.

pub mod daemon;

pub use daemon::{build_services, spawn_expiry_sweep, spawn_market_refresh, Services};
