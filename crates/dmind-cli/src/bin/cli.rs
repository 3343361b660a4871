use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::error;

use dmind_cli::{execute, ApiClient, Cli, ClientError};

#[tokio::main]
async fn main() -> Result<()> {
    dmind_core::init_logging("warn");
    let cli = Cli::parse();

    let client = ApiClient::new(&cli.api_url, Duration::from_secs(cli.timeout))
        .context("failed to build HTTP client")?
        .with_token(cli.token.clone());

    match execute(&cli.command, &client).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(ClientError::Api { status, error, message }) => {
            error!(status, %error, "Request rejected");
            anyhow::bail!("{}", message)
        }
        Err(e) => Err(e).with_context(|| format!("request to {} failed", cli.api_url)),
    }
}
