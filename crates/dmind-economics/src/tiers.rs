/// SUBSCRIPTION TIERS
///
/// The four static tiers. Prices are whole DMT; burn share is a percentage
/// of the price expressed in basis points.

use dmind_core::DmtAmount;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::subscription::SubscriptionError;

/// Share of every paid subscription routed to the treasury (10%)
pub const TREASURY_SHARE_BPS: u16 = 1000;

/// Share of every paid subscription routed to the rewards pool (5%)
pub const REWARDS_SHARE_BPS: u16 = 500;

/// Subscription period in days
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Freemium,
    Basic,
    Pro,
    Enterprise,
}

impl TierName {
    pub const ALL: [TierName; 4] = [TierName::Freemium, TierName::Basic, TierName::Pro, TierName::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Freemium => "freemium",
            TierName::Basic => "basic",
            TierName::Pro => "pro",
            TierName::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierName {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TierName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SubscriptionError::InvalidTier(s.to_string()))
    }
}

/// Agent or evolution allowance. Serialized as a count, or -1 when unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Limited(u32),
    Unlimited,
}

impl Allowance {
    pub fn permits(&self, count: u32) -> bool {
        match self {
            Allowance::Limited(max) => count <= *max,
            Allowance::Unlimited => true,
        }
    }
}

impl Serialize for Allowance {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Allowance::Limited(n) => serializer.serialize_i64(*n as i64),
            Allowance::Unlimited => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for Allowance {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw < 0 {
            Ok(Allowance::Unlimited)
        } else {
            u32::try_from(raw)
                .map(Allowance::Limited)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTier {
    pub id: TierName,
    pub name: TierName,
    pub price: DmtAmount,
    pub credits: u32,
    pub llm_access: Vec<String>,
    pub features: Vec<String>,
    /// Burned share of the price, in percent
    pub burning_rate: u8,
    pub max_agents: Allowance,
    pub max_evolutions: Allowance,
    pub priority_support: bool,
    pub custom_features: Vec<String>,
}

impl SubscriptionTier {
    pub fn burn_bps(&self) -> u16 {
        self.burning_rate as u16 * 100
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Burn, treasury and rewards portions of one period's price
    pub fn fee_split(&self) -> FeeSplit {
        FeeSplit {
            burned: self.price.apply_bps(self.burn_bps()),
            treasury: self.price.apply_bps(TREASURY_SHARE_BPS),
            rewards: self.price.apply_bps(REWARDS_SHARE_BPS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSplit {
    pub burned: DmtAmount,
    pub treasury: DmtAmount,
    pub rewards: DmtAmount,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

lazy_static! {
    static ref TIERS: Vec<SubscriptionTier> = vec![
        SubscriptionTier {
            id: TierName::Freemium,
            name: TierName::Freemium,
            price: DmtAmount::ZERO,
            credits: 5,
            llm_access: strings(&["LLaMA"]),
            features: strings(&["Basic Agent Creation", "Limited Evolution", "Community Support"]),
            burning_rate: 0,
            max_agents: Allowance::Limited(1),
            max_evolutions: Allowance::Limited(0),
            priority_support: false,
            custom_features: vec![],
        },
        SubscriptionTier {
            id: TierName::Basic,
            name: TierName::Basic,
            price: DmtAmount::from_dmt(9),
            credits: 20,
            llm_access: strings(&["LLaMA", "LLaMA 3"]),
            features: strings(&["Standard Agent Creation", "Basic Evolution", "Email Support", "Analytics"]),
            burning_rate: 20,
            max_agents: Allowance::Limited(3),
            max_evolutions: Allowance::Limited(2),
            priority_support: false,
            custom_features: strings(&["Basic Analytics"]),
        },
        SubscriptionTier {
            id: TierName::Pro,
            name: TierName::Pro,
            price: DmtAmount::from_dmt(29),
            credits: 50,
            llm_access: strings(&["ChatGPT", "LLaMA 3", "Claude"]),
            features: strings(&[
                "Advanced Agent Creation",
                "Unlimited Evolution",
                "Priority Support",
                "Advanced Analytics",
                "Custom Training",
            ]),
            burning_rate: 20,
            max_agents: Allowance::Limited(10),
            max_evolutions: Allowance::Limited(10),
            priority_support: true,
            custom_features: strings(&["Advanced Analytics", "Custom Training", "Priority Support"]),
        },
        SubscriptionTier {
            id: TierName::Enterprise,
            name: TierName::Enterprise,
            price: DmtAmount::from_dmt(99),
            credits: 200,
            llm_access: strings(&["CrewAI", "All LLMs", "Custom Models"]),
            features: strings(&[
                "Unlimited Agent Creation",
                "Unlimited Evolution",
                "Dedicated Support",
                "Custom Integrations",
                "White-label Options",
            ]),
            burning_rate: 20,
            max_agents: Allowance::Unlimited,
            max_evolutions: Allowance::Unlimited,
            priority_support: true,
            custom_features: strings(&[
                "Custom Integrations",
                "White-label Options",
                "Dedicated Support",
                "Custom Models",
            ]),
        },
    ];
}

/// All tiers, cheapest first
pub fn all_tiers() -> &'static [SubscriptionTier] {
    &TIERS
}

pub fn tier(name: TierName) -> &'static SubscriptionTier {
    // TIERS lists every TierName in declaration order
    &TIERS[name as usize]
}

pub fn find_tier(name: &str) -> Option<&'static SubscriptionTier> {
    name.parse::<TierName>().ok().map(tier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table() {
        assert_eq!(all_tiers().len(), 4);
        for name in TierName::ALL {
            assert_eq!(tier(name).name, name);
        }
        let pro = tier(TierName::Pro);
        assert_eq!(pro.credits, 50);
        assert!(pro.priority_support);
        assert_eq!(tier(TierName::Enterprise).max_agents, Allowance::Unlimited);
        assert!(find_tier("platinum").is_none());
    }

    #[test]
    fn test_pro_fee_split() {
        let split = tier(TierName::Pro).fee_split();
        assert_eq!(split.burned.to_string(), "5.8");
        assert_eq!(split.treasury.to_string(), "2.9");
        assert_eq!(split.rewards.to_string(), "1.45");
    }

    #[test]
    fn test_freemium_burns_nothing() {
        let split = tier(TierName::Freemium).fee_split();
        assert!(split.burned.is_zero());
        assert!(split.treasury.is_zero());
    }

    #[test]
    fn test_unlimited_allowance_wire_form() {
        let json = serde_json::to_value(tier(TierName::Enterprise)).unwrap();
        assert_eq!(json["maxAgents"], serde_json::json!(-1));
        assert_eq!(json["burningRate"], serde_json::json!(20));
        let back: Allowance = serde_json::from_value(serde_json::json!(-1)).unwrap();
        assert_eq!(back, Allowance::Unlimited);
        assert!(Allowance::Limited(3).permits(3));
        assert!(!Allowance::Limited(3).permits(4));
    }

    #[test]
    fn test_tier_name_parse() {
        assert_eq!("basic".parse::<TierName>().unwrap(), TierName::Basic);
        let err = "gold".parse::<TierName>().unwrap_err();
        assert!(err.to_string().contains("Invalid subscription tier"));
    }
}
