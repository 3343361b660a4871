/// DECENTRAMIND CLI
///
/// Command-line client for the daemon's JSON API. Every subcommand maps to
/// one route and prints the JSON answer.

pub mod client;
pub mod commands;

pub use client::{ApiClient, ClientError, DEFAULT_API_URL};
pub use commands::{execute, AuthCommand, BurnCommand, Cli, Commands, FeeCommand, StakingCommand, SubscriptionCommand};
