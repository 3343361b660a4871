use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::client::{ApiClient, ClientError, DEFAULT_API_URL};

#[derive(Parser, Debug)]
#[command(name = "dmind-cli")]
#[command(about = "DecentraMind accounting CLI", long_about = None)]
pub struct Cli {
    /// Base URL of the DecentraMind daemon
    #[arg(long, global = true, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout: u64,

    /// Session token sent as a bearer credential
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Check that the daemon is up
    Health,

    /// DMT burn accounting
    Burn {
        #[command(subcommand)]
        action: BurnCommand,
    },

    /// Subscription tiers and lifecycle
    Subscription {
        #[command(subcommand)]
        action: SubscriptionCommand,
    },

    /// DMT staking positions
    Staking {
        #[command(subcommand)]
        action: StakingCommand,
    },

    /// Marketplace and agent fee quotes
    Fees {
        #[command(subcommand)]
        action: FeeCommand,
    },

    /// Resolve the role granted by a wallet's NFTs
    Role { wallet: String },

    /// Wallet sign-in and sessions
    Auth {
        #[command(subcommand)]
        action: AuthCommand,
    },

    /// Cached market prices
    Market,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum BurnCommand {
    /// Record a fee burn
    Record {
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        source: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        tx_hash: Option<String>,
    },
    /// Aggregate burn metrics
    Metrics,
    /// Burn statistics and trend
    Stats,
    /// List burn events
    Events {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SubscriptionCommand {
    /// List the tier catalogue
    Tiers,
    /// Subscription statistics
    Stats,
    /// Subscribe a user to a tier
    Subscribe {
        #[arg(long)]
        user: String,
        #[arg(long)]
        tier: String,
        #[arg(long)]
        payment_method: Option<String>,
    },
    /// Show a user's active subscription
    Show { user: String },
    /// Spend credits from the active subscription
    UseCredits {
        user: String,
        #[arg(long, default_value_t = 1)]
        credits: u32,
    },
    /// Cancel the active subscription
    Cancel { user: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum StakingCommand {
    /// Lock DMT for a number of days
    Stake {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        lock_days: u32,
        #[arg(long)]
        tx_signature: Option<String>,
    },
    /// List a wallet's positions
    Positions { user: String },
    /// Staking totals for a wallet
    Stats { user: String },
    /// Close a position, early unstakes pay a penalty
    Unstake {
        position_id: String,
        #[arg(long)]
        tx_signature: Option<String>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum FeeCommand {
    /// Marketplace and platform fees for a sale price
    Marketplace {
        #[arg(long)]
        price: String,
    },
    /// Cost of minting an agent
    AgentMinting {
        /// master or sub
        #[arg(long)]
        agent_type: String,
        #[arg(long)]
        level: u32,
    },
    /// Cost of evolving an agent
    AgentEvolution {
        #[arg(long)]
        level: u32,
        #[arg(long, default_value_t = 0)]
        xp: u64,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum AuthCommand {
    /// Print the message a wallet signs to sign in
    Message { wallet: String },
    /// Sign in with a wallet's base58 signature of a sign-in message
    SignIn {
        wallet: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        signature: String,
    },
    /// Inspect the session given by --token
    Session,
    /// Revoke the session given by --token
    SignOut,
}

/// Run one command against the API and return its JSON answer
pub async fn execute(command: &Commands, client: &ApiClient) -> Result<Value, ClientError> {
    match command {
        Commands::Health => client.get("/health").await,
        Commands::Burn { action } => match action {
            BurnCommand::Record {
                amount,
                source,
                user,
                agent,
                tier,
                tx_hash,
            } => {
                let body = json!({
                    "amount": amount,
                    "source": source,
                    "userId": user,
                    "agentId": agent,
                    "subscriptionTier": tier,
                    "transactionHash": tx_hash,
                });
                client.post("/burn", &body).await
            }
            BurnCommand::Metrics => client.get("/burn/metrics").await,
            BurnCommand::Stats => client.get("/burn/stats").await,
            BurnCommand::Events { user, source } => {
                let mut query = Vec::new();
                if let Some(user) = user {
                    query.push(("userId", user.clone()));
                }
                if let Some(source) = source {
                    query.push(("source", source.clone()));
                }
                client.get_with_query("/burn/events", &query).await
            }
        },
        Commands::Subscription { action } => match action {
            SubscriptionCommand::Tiers => client.get("/subscriptions/tiers").await,
            SubscriptionCommand::Stats => client.get("/subscriptions/stats").await,
            SubscriptionCommand::Subscribe {
                user,
                tier,
                payment_method,
            } => {
                let body = json!({"userId": user, "tier": tier, "paymentMethod": payment_method});
                client.post("/subscriptions", &body).await
            }
            SubscriptionCommand::Show { user } => client.get(&format!("/subscriptions/{}", user)).await,
            SubscriptionCommand::UseCredits { user, credits } => {
                client
                    .post(&format!("/subscriptions/{}/credits", user), &json!({"credits": credits}))
                    .await
            }
            SubscriptionCommand::Cancel { user } => {
                client.post(&format!("/subscriptions/{}/cancel", user), &json!({})).await
            }
        },
        Commands::Staking { action } => match action {
            StakingCommand::Stake {
                user,
                amount,
                lock_days,
                tx_signature,
            } => {
                let body = json!({
                    "userId": user,
                    "amount": amount,
                    "lockPeriod": lock_days,
                    "transactionSignature": tx_signature,
                });
                client.post("/staking", &body).await
            }
            StakingCommand::Positions { user } => client.get(&format!("/staking/{}", user)).await,
            StakingCommand::Stats { user } => client.get(&format!("/staking/{}/stats", user)).await,
            StakingCommand::Unstake {
                position_id,
                tx_signature,
            } => {
                client
                    .post(
                        &format!("/staking/positions/{}/unstake", position_id),
                        &json!({"transactionSignature": tx_signature}),
                    )
                    .await
            }
        },
        Commands::Fees { action } => match action {
            FeeCommand::Marketplace { price } => {
                client
                    .get_with_query("/fees/marketplace", &[("price", price.clone())])
                    .await
            }
            FeeCommand::AgentMinting { agent_type, level } => {
                let query = [("type", agent_type.clone()), ("level", level.to_string())];
                client.get_with_query("/fees/agent-minting", &query).await
            }
            FeeCommand::AgentEvolution { level, xp } => {
                let query = [("level", level.to_string()), ("xp", xp.to_string())];
                client.get_with_query("/fees/agent-evolution", &query).await
            }
        },
        Commands::Role { wallet } => client.get(&format!("/roles/{}", wallet)).await,
        Commands::Auth { action } => match action {
            AuthCommand::Message { wallet } => Ok(json!({
                "walletAddress": wallet,
                "message": dmind_auth::sign_in_message(wallet, Utc::now()),
            })),
            AuthCommand::SignIn {
                wallet,
                message,
                signature,
            } => {
                let body = json!({"walletAddress": wallet, "message": message, "signature": signature});
                client.post("/auth/wallet", &body).await
            }
            AuthCommand::Session => client.get("/auth/session").await,
            AuthCommand::SignOut => client.post("/auth/signout", &json!({})).await,
        },
        Commands::Market => client.get("/market/prices").await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_burn_record() {
        let cli = Cli::try_parse_from([
            "dmind-cli", "burn", "record", "--amount", "29", "--source", "subscription", "--user", "W",
        ])
        .unwrap();
        assert_eq!(cli.api_url, DEFAULT_API_URL);
        assert_eq!(
            cli.command,
            Commands::Burn {
                action: BurnCommand::Record {
                    amount: 29.0,
                    source: "subscription".to_string(),
                    user: "W".to_string(),
                    agent: None,
                    tier: None,
                    tx_hash: None,
                }
            }
        );
    }

    #[test]
    fn test_use_credits_defaults_to_one() {
        let cli = Cli::try_parse_from(["dmind-cli", "subscription", "use-credits", "W"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Subscription {
                action: SubscriptionCommand::UseCredits { user: "W".to_string(), credits: 1 }
            }
        );
    }

    #[test]
    fn test_token_is_global() {
        let cli = Cli::try_parse_from(["dmind-cli", "auth", "session", "--token", "abc", "--api-url", "http://x:1"]).unwrap();
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert_eq!(cli.api_url, "http://x:1");

        let cli = Cli::try_parse_from(["dmind-cli", "--token", "t", "subscription", "cancel", "W"]).unwrap();
        assert_eq!(cli.token.as_deref(), Some("t"));
        assert!(Cli::try_parse_from(["dmind-cli", "burn", "record", "--amount", "1"]).is_err());
    }

    #[test]
    fn test_parse_staking_and_fees() {
        let cli = Cli::try_parse_from([
            "dmind-cli", "staking", "stake", "--user", "W", "--amount", "250", "--lock-days", "90",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Staking {
                action: StakingCommand::Stake {
                    user: "W".to_string(),
                    amount: 250.0,
                    lock_days: 90,
                    tx_signature: None,
                }
            }
        );

        let cli = Cli::try_parse_from(["dmind-cli", "fees", "agent-minting", "--agent-type", "sub", "--level", "2"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Fees {
                action: FeeCommand::AgentMinting { agent_type: "sub".to_string(), level: 2 }
            }
        );
    }

    #[test]
    fn test_sign_in_needs_signature() {
        assert!(Cli::try_parse_from(["dmind-cli", "auth", "sign-in", "W"]).is_err());
        let cli = Cli::try_parse_from([
            "dmind-cli", "auth", "sign-in", "W", "--message", "m", "--signature", "s",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Auth { action: AuthCommand::SignIn { .. } }));
    }
}
