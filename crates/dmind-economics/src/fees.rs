/// FEE CALCULATORS
///
/// Marketplace fees are basis-point shares of the sale price. Agent minting
/// grows by 1.5x per level and agent evolution doubles per level plus a
/// tenth of the agent's XP; both round to the nearest whole DMT.

use dmind_core::{DmtAmount, UNITS_PER_DMT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marketplace fee (2.5%)
pub const MARKETPLACE_FEE_BPS: u16 = 250;

/// Platform fee (5%)
pub const PLATFORM_FEE_BPS: u16 = 500;

pub const MIN_LISTING_PRICE: DmtAmount = DmtAmount::from_dmt(10);

pub const MASTER_AGENT_BASE_COST: u128 = 100;
pub const SUB_AGENT_BASE_COST: u128 = 50;
pub const EVOLUTION_BASE_COST: u128 = 50;

pub const MAX_AGENT_LEVEL: u32 = 40;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeeError {
    #[error("Unknown agent type: {0}")]
    UnknownAgentKind(String),
    #[error("Agent level must be between 1 and {max}, got {0}", max = MAX_AGENT_LEVEL)]
    InvalidLevel(u32),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Master,
    Sub,
}

impl AgentKind {
    pub fn base_cost(&self) -> u128 {
        match self {
            AgentKind::Master => MASTER_AGENT_BASE_COST,
            AgentKind::Sub => SUB_AGENT_BASE_COST,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Master => write!(f, "master"),
            AgentKind::Sub => write!(f, "sub"),
        }
    }
}

impl FromStr for AgentKind {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(AgentKind::Master),
            "sub" => Ok(AgentKind::Sub),
            _ => Err(FeeError::UnknownAgentKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceQuote {
    pub price: DmtAmount,
    pub marketplace_fee: DmtAmount,
    pub platform_fee: DmtAmount,
    pub seller_proceeds: DmtAmount,
    pub meets_minimum_listing: bool,
}

pub fn marketplace_fee(price: DmtAmount) -> Result<DmtAmount, FeeError> {
    checked(price)?;
    Ok(price.apply_bps(MARKETPLACE_FEE_BPS))
}

pub fn platform_fee(price: DmtAmount) -> Result<DmtAmount, FeeError> {
    checked(price)?;
    Ok(price.apply_bps(PLATFORM_FEE_BPS))
}

/// Both fees for a sale and what the seller keeps
pub fn marketplace_quote(price: DmtAmount) -> Result<MarketplaceQuote, FeeError> {
    let marketplace_fee = marketplace_fee(price)?;
    let platform_fee = platform_fee(price)?;
    Ok(MarketplaceQuote {
        price,
        marketplace_fee,
        platform_fee,
        seller_proceeds: price.saturating_sub(marketplace_fee).saturating_sub(platform_fee),
        meets_minimum_listing: price >= MIN_LISTING_PRICE,
    })
}

/// `round(base * 1.5^(level - 1))`
pub fn agent_minting_cost(kind: AgentKind, level: u32) -> Result<DmtAmount, FeeError> {
    let step = level_step(level)?;
    let numerator = kind.base_cost() * 3u128.pow(step);
    let denominator = 2u128.pow(step);
    Ok(whole_dmt(round_div(numerator, denominator)))
}

/// `round(50 * 2^(level - 1) + xp / 10)`
pub fn agent_evolution_cost(level: u32, xp: u64) -> Result<DmtAmount, FeeError> {
    let step = level_step(level)?;
    let tenths = EVOLUTION_BASE_COST * 10 * 2u128.pow(step) + xp as u128;
    Ok(whole_dmt(round_div(tenths, 10)))
}

fn checked(price: DmtAmount) -> Result<(), FeeError> {
    price
        .ensure_fee_precision()
        .map_err(|e| FeeError::InvalidAmount(e.to_string()))
}

fn level_step(level: u32) -> Result<u32, FeeError> {
    if level == 0 || level > MAX_AGENT_LEVEL {
        return Err(FeeError::InvalidLevel(level));
    }
    Ok(level - 1)
}

/// Half rounds up
fn round_div(numerator: u128, denominator: u128) -> u128 {
    (2 * numerator + denominator) / (2 * denominator)
}

fn whole_dmt(whole: u128) -> DmtAmount {
    DmtAmount::from_units(whole.saturating_mul(UNITS_PER_DMT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marketplace_quote() {
        let quote = marketplace_quote(DmtAmount::from_dmt(100)).unwrap();
        assert_eq!(quote.marketplace_fee.to_string(), "2.5");
        assert_eq!(quote.platform_fee, DmtAmount::from_dmt(5));
        assert_eq!(quote.seller_proceeds.to_string(), "92.5");
        assert!(quote.meets_minimum_listing);

        let small = marketplace_quote("0.000001".parse().unwrap()).unwrap();
        assert!(!small.meets_minimum_listing);
        assert_eq!(small.marketplace_fee.to_string(), "0.000000025");

        assert!(marketplace_fee("0.0000001".parse().unwrap()).is_err());
    }

    #[test]
    fn test_agent_minting_cost() {
        let cost = |kind, level| agent_minting_cost(kind, level).unwrap().to_string();
        assert_eq!(cost(AgentKind::Master, 1), "100");
        assert_eq!(cost(AgentKind::Master, 2), "150");
        assert_eq!(cost(AgentKind::Master, 3), "225");
        assert_eq!(cost(AgentKind::Sub, 2), "75");
        // 50 * 3.375 = 168.75
        assert_eq!(cost(AgentKind::Sub, 4), "169");
        // 100 * 1.5^4 = 506.25
        assert_eq!(cost(AgentKind::Master, 5), "506");
        assert_eq!(agent_minting_cost(AgentKind::Master, 0), Err(FeeError::InvalidLevel(0)));
        assert!(agent_minting_cost(AgentKind::Sub, MAX_AGENT_LEVEL).is_ok());
    }

    #[test]
    fn test_agent_evolution_cost() {
        assert_eq!(agent_evolution_cost(1, 0).unwrap(), DmtAmount::from_dmt(50));
        assert_eq!(agent_evolution_cost(3, 250).unwrap(), DmtAmount::from_dmt(225));
        // 100 + 0.5 rounds up
        assert_eq!(agent_evolution_cost(2, 5).unwrap(), DmtAmount::from_dmt(101));
        assert_eq!(agent_evolution_cost(2, 4).unwrap(), DmtAmount::from_dmt(100));
        assert_eq!(agent_evolution_cost(41, 0), Err(FeeError::InvalidLevel(41)));
    }

    #[test]
    fn test_agent_kind_parsing() {
        assert_eq!("Master".parse::<AgentKind>().unwrap(), AgentKind::Master);
        assert_eq!("sub".parse::<AgentKind>().unwrap(), AgentKind::Sub);
        assert!("worker".parse::<AgentKind>().is_err());
    }
}
