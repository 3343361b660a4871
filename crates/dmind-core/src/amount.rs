/// DMT AMOUNTS
///
/// Fixed-point token quantities. Fees are quoted with at most six decimals and
/// every percentage in the accounting layer is applied in basis points, so
/// amounts are held with ten decimals: a bps share of any six-decimal fee is
/// exact, and a 20% burn of 29 DMT is exactly 5.8 DMT.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use crate::error::CoreError;

/// Decimal places accepted on fee inputs
pub const DMT_DECIMALS: u32 = 6;

/// Decimal places carried internally
pub const AMOUNT_DECIMALS: u32 = 10;

/// Micro-units (1e-6 DMT) per whole DMT
pub const MICRO_PER_DMT: u128 = 1_000_000;

/// Base units (1e-10 DMT) per whole DMT
pub const UNITS_PER_DMT: u128 = 10_000_000_000;

const UNITS_PER_MICRO: u128 = UNITS_PER_DMT / MICRO_PER_DMT;

/// Basis-point denominator (10_000 bps = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Non-negative DMT quantity in base units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DmtAmount(u128);

impl DmtAmount {
    pub const ZERO: DmtAmount = DmtAmount(0);

    pub const fn from_units(units: u128) -> Self {
        DmtAmount(units)
    }

    pub const fn from_micro(micro: u128) -> Self {
        DmtAmount(micro * UNITS_PER_MICRO)
    }

    /// Whole-token constructor
    pub const fn from_dmt(whole: u64) -> Self {
        DmtAmount(whole as u128 * UNITS_PER_DMT)
    }

    /// Convert a floating-point quantity. The shortest decimal form of
    /// `value` must parse, so precision beyond ten decimals is rejected
    /// exactly as `FromStr` rejects it.
    pub fn from_f64(value: f64) -> Result<Self, CoreError> {
        if !value.is_finite() || value < 0.0 {
            return Err(CoreError::InvalidAmount(format!("{} is not a valid DMT amount", value)));
        }
        value.to_string().parse()
    }

    /// Convert a fee quoted by a caller, which may carry at most six decimals
    pub fn fee_from_f64(value: f64) -> Result<Self, CoreError> {
        let amount = Self::from_f64(value)?;
        amount.ensure_fee_precision()?;
        Ok(amount)
    }

    /// Fail when this amount has more than `DMT_DECIMALS` decimals
    pub fn ensure_fee_precision(&self) -> Result<(), CoreError> {
        if self.0 % UNITS_PER_MICRO == 0 {
            Ok(())
        } else {
            Err(CoreError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                self, DMT_DECIMALS
            )))
        }
    }

    pub fn units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `self * numerator / denominator`, rounded down
    pub fn mul_div(self, numerator: u128, denominator: u128) -> Self {
        if denominator == 0 {
            return DmtAmount::ZERO;
        }
        DmtAmount(self.0.saturating_mul(numerator) / denominator)
    }

    /// Share of this amount expressed in basis points. Exact whenever the
    /// amount has at most `DMT_DECIMALS` decimals.
    pub fn apply_bps(self, bps: u16) -> Self {
        self.mul_div(bps as u128, BPS_DENOMINATOR)
    }

    pub fn saturating_add(self, other: DmtAmount) -> Self {
        DmtAmount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: DmtAmount) -> Self {
        DmtAmount(self.0.saturating_sub(other.0))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / UNITS_PER_DMT as f64
    }
}

impl fmt::Display for DmtAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_DMT;
        let frac = self.0 % UNITS_PER_DMT;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:0width$}", frac, width = AMOUNT_DECIMALS as usize);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl FromStr for DmtAmount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || CoreError::InvalidAmount(format!("'{}' is not a valid DMT amount", s));

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(CoreError::InvalidAmount(format!(
                "'{}' has more than {} decimal places",
                s, AMOUNT_DECIMALS
            )));
        }

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = AMOUNT_DECIMALS as usize);
            padded.parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(UNITS_PER_DMT)
            .and_then(|w| w.checked_add(frac_units))
            .map(DmtAmount)
            .ok_or_else(invalid)
    }
}

impl Sum for DmtAmount {
    fn sum<I: Iterator<Item = DmtAmount>>(iter: I) -> Self {
        iter.fold(DmtAmount::ZERO, DmtAmount::saturating_add)
    }
}

impl<'a> Sum<&'a DmtAmount> for DmtAmount {
    fn sum<I: Iterator<Item = &'a DmtAmount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// Wire form is a plain JSON number so documents read like the dashboard's.
impl Serialize for DmtAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

struct DmtAmountVisitor;

impl<'de> Visitor<'de> for DmtAmountVisitor {
    type Value = DmtAmount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative DMT amount as a number or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DmtAmount, E> {
        Ok(DmtAmount::from_dmt(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DmtAmount, E> {
        if v < 0 {
            return Err(E::custom(format!("{} is not a valid DMT amount", v)));
        }
        Ok(DmtAmount::from_dmt(v as u64))
    }

    // Stored floats may carry binary noise past the tenth decimal.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DmtAmount, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(E::custom(format!("{} is not a valid DMT amount", v)));
        }
        Ok(DmtAmount::from_units((v * UNITS_PER_DMT as f64).round() as u128))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DmtAmount, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for DmtAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DmtAmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bps_split_is_exact() {
        let price = DmtAmount::from_dmt(29);
        assert_eq!(price.apply_bps(2000), DmtAmount::from_micro(5_800_000));
        assert_eq!(price.apply_bps(1000).to_string(), "2.9");
        assert_eq!(price.apply_bps(500).to_string(), "1.45");
        assert_eq!(price.apply_bps(2000).as_f64(), 5.8);
    }

    #[test]
    fn test_sub_micro_shares_are_kept() {
        let fee = DmtAmount::from_micro(5);
        assert_eq!(fee.apply_bps(3000).to_string(), "0.0000015");
        assert_eq!(DmtAmount::from_micro(1).apply_bps(1).to_string(), "0.0000000001");
    }

    #[test]
    fn test_parse_and_display() {
        let amount: DmtAmount = "12.345".parse().unwrap();
        assert_eq!(amount, DmtAmount::from_micro(12_345_000));
        assert_eq!(amount.to_string(), "12.345");
        assert_eq!("100".parse::<DmtAmount>().unwrap(), DmtAmount::from_dmt(100));
        assert_eq!("1.0000001".parse::<DmtAmount>().unwrap().units(), 10_000_001_000);
        assert!("1.00000000001".parse::<DmtAmount>().is_err());
        assert!("-3".parse::<DmtAmount>().is_err());
        assert!("abc".parse::<DmtAmount>().is_err());
    }

    #[test]
    fn test_float_conversion_matches_parsing() {
        assert_eq!(DmtAmount::from_f64(0.1234567).unwrap(), "0.1234567".parse().unwrap());
        assert!(DmtAmount::from_f64(0.12345678901).is_err());
        assert!(DmtAmount::from_f64(-1.0).is_err());
        assert!(DmtAmount::from_f64(f64::NAN).is_err());

        assert_eq!(DmtAmount::fee_from_f64(0.000005).unwrap(), DmtAmount::from_micro(5));
        assert!(DmtAmount::fee_from_f64(0.1234567).is_err());
        assert!(DmtAmount::from_micro(7).ensure_fee_precision().is_ok());
    }

    #[test]
    fn test_json_forms() {
        let from_int: DmtAmount = serde_json::from_str("29").unwrap();
        let from_float: DmtAmount = serde_json::from_str("5.8").unwrap();
        let from_str: DmtAmount = serde_json::from_str("\"1.45\"").unwrap();
        let tiny: DmtAmount = serde_json::from_str("0.0000015").unwrap();
        assert_eq!(from_int, DmtAmount::from_dmt(29));
        assert_eq!(from_float, DmtAmount::from_micro(5_800_000));
        assert_eq!(from_str, DmtAmount::from_micro(1_450_000));
        assert_eq!(tiny.units(), 15_000);
        assert!(serde_json::from_str::<DmtAmount>("-1").is_err());
        assert_eq!(serde_json::to_string(&from_float).unwrap(), "5.8");
    }
}
