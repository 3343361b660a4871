/// WALLET ADDRESSES
///
/// Solana wallets are base58 strings of 32 to 44 characters. The reserved
/// `dao-treasury` account is the only non-wallet identity the accounting
/// layer accepts, and only for DAO treasury burns.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Account identifier used for DAO treasury burns
pub const DAO_TREASURY_ACCOUNT: &str = "dao-treasury";

lazy_static! {
    static ref WALLET_ADDRESS_RE: Regex =
        Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("wallet address pattern is valid");
}

pub fn is_valid_wallet_address(address: &str) -> bool {
    WALLET_ADDRESS_RE.is_match(address)
}

/// Validated base58 wallet address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(address: &str) -> Result<Self, CoreError> {
        if is_valid_wallet_address(address) {
            Ok(WalletAddress(address.to_string()))
        } else {
            Err(CoreError::InvalidWalletAddress(address.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display form used for default profile names
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WalletAddress::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner of a burn: a user wallet or the DAO treasury
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccountId {
    Wallet(WalletAddress),
    DaoTreasury,
}

impl AccountId {
    pub fn parse(id: &str) -> Result<Self, CoreError> {
        if id == DAO_TREASURY_ACCOUNT {
            return Ok(AccountId::DaoTreasury);
        }
        WalletAddress::parse(id).map(AccountId::Wallet)
    }

    pub fn as_str(&self) -> &str {
        match self {
            AccountId::Wallet(wallet) => wallet.as_str(),
            AccountId::DaoTreasury => DAO_TREASURY_ACCOUNT,
        }
    }

    pub fn is_treasury(&self) -> bool {
        matches!(self, AccountId::DaoTreasury)
    }
}

impl From<WalletAddress> for AccountId {
    fn from(wallet: WalletAddress) -> Self {
        AccountId::Wallet(wallet)
    }
}

impl TryFrom<String> for AccountId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::parse(&value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
