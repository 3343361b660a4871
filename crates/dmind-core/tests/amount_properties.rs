use dmind_core::{DmtAmount, BPS_DENOMINATOR, UNITS_PER_DMT};
use proptest::prelude::*;

proptest! {
    #[test]
    fn bps_share_never_exceeds_whole(units in 0u128..10_000_000_000_000_000_000u128, bps in 0u16..=10_000u16) {
        let amount = DmtAmount::from_units(units);
        let share = amount.apply_bps(bps);
        prop_assert!(share <= amount);
        prop_assert_eq!(share.units(), units * bps as u128 / BPS_DENOMINATOR);
    }

    #[test]
    fn six_decimal_fees_split_exactly(whole in 0u64..1_000_000_000u64, micro in 0u128..1_000_000u128, bps in 0u16..=10_000u16) {
        let fee = DmtAmount::from_dmt(whole).saturating_add(DmtAmount::from_micro(micro));
        let share = fee.apply_bps(bps);
        prop_assert_eq!(share.units() * BPS_DENOMINATOR, fee.units() * bps as u128);
    }

    #[test]
    fn fractional_floats_convert_exactly(micro in 1u128..1_000_000u128) {
        let value = micro as f64 / 1_000_000.0;
        let amount = DmtAmount::fee_from_f64(value).unwrap();
        prop_assert_eq!(amount, DmtAmount::from_micro(micro));
        prop_assert_eq!(DmtAmount::from_f64(value).unwrap(), amount);
    }

    #[test]
    fn display_parses_back(units in 0u128..10_000_000_000_000_000_000u128) {
        let amount = DmtAmount::from_units(units);
        let parsed: DmtAmount = amount.to_string().parse().unwrap();
        prop_assert_eq!(parsed, amount);
    }
}

#[test]
fn full_rate_is_identity() {
    let amount = DmtAmount::from_dmt(1_000);
    assert_eq!(amount.apply_bps(10_000), amount);
    assert_eq!(amount.apply_bps(0), DmtAmount::ZERO);
    assert_eq!(amount.units(), 1_000 * UNITS_PER_DMT);
}
