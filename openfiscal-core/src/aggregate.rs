//! Derived rate totals, computed on read and never persisted.

use rust_decimal::{Decimal, RoundingStrategy};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::record::{RateComponents, RateRecord};

/// Decimal places kept in derived totals.
pub const TOTAL_SCALE: u32 = 2;

/// Combined rates for domestic and imported goods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RateTotals {
    /// `national + state + municipal`.
    pub total_domestic: Decimal,
    /// `imported + state + municipal`.
    pub total_imported: Decimal,
}

/// Compute the combined totals for `rate`.
///
/// Absent components count as zero. Each sum is rounded once, half away from
/// zero, to [`TOTAL_SCALE`] places. Sums beyond the decimal range saturate at
/// [`Decimal::MAX`].
///
/// # Examples
/// ```
/// use openfiscal_core::{compute_totals_for, RateComponents};
/// use rust_decimal::Decimal;
///
/// let components = RateComponents {
///     national: Some(Decimal::new(13_45, 2)),
///     state: Some(Decimal::new(18_00, 2)),
///     municipal: None,
///     imported: Some(Decimal::new(15_005, 3)),
/// };
/// let totals = compute_totals_for(&components);
/// assert_eq!(totals.total_domestic, Decimal::new(31_45, 2));
/// assert_eq!(totals.total_imported, Decimal::new(33_01, 2));
/// ```
#[must_use]
pub fn compute_totals_for(rates: &RateComponents) -> RateTotals {
    let state = rates.state.unwrap_or(Decimal::ZERO);
    let municipal = rates.municipal.unwrap_or(Decimal::ZERO);
    let national = rates.national.unwrap_or(Decimal::ZERO);
    let imported = rates.imported.unwrap_or(Decimal::ZERO);
    RateTotals {
        total_domestic: round_total(sum([national, state, municipal])),
        total_imported: round_total(sum([imported, state, municipal])),
    }
}

fn sum(components: [Decimal; 3]) -> Decimal {
    components
        .into_iter()
        .try_fold(Decimal::ZERO, Decimal::checked_add)
        .unwrap_or(Decimal::MAX)
}

/// Compute the combined totals for a stored record.
#[must_use]
pub fn compute_totals(rate: &RateRecord) -> RateTotals {
    compute_totals_for(&rate.rates)
}

fn round_total(sum: Decimal) -> Decimal {
    sum.round_dp_with_strategy(TOTAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn components(
        national: Option<i64>,
        state: Option<i64>,
        municipal: Option<i64>,
        imported: Option<i64>,
    ) -> RateComponents {
        // Values are expressed in thousandths so midpoint rounding is exercised.
        let scaled = |value: Option<i64>| value.map(|v| Decimal::new(v, 3));
        RateComponents {
            national: scaled(national),
            state: scaled(state),
            municipal: scaled(municipal),
            imported: scaled(imported),
        }
    }

    #[rstest]
    #[case(components(Some(1_005), None, None, None), Decimal::new(101, 2))]
    #[case(components(Some(1_004), None, None, None), Decimal::new(100, 2))]
    #[case(components(Some(1_001), Some(2_002), Some(2), None), Decimal::new(301, 2))]
    #[case(components(None, None, None, None), Decimal::ZERO)]
    fn rounds_domestic_total_once(#[case] rates: RateComponents, #[case] expected: Decimal) {
        assert_eq!(compute_totals_for(&rates).total_domestic, expected);
    }

    #[rstest]
    fn rounds_the_sum_not_each_component() {
        // 0.004 + 0.004 + 0.004 = 0.012 -> 0.01, whereas per-component rounding gives 0.00.
        let rates = components(Some(4), Some(4), Some(4), Some(4));
        let totals = compute_totals_for(&rates);
        assert_eq!(totals.total_domestic, Decimal::new(1, 2));
        assert_eq!(totals.total_imported, Decimal::new(1, 2));
    }

    #[rstest]
    fn imported_total_uses_imported_component() {
        let rates = components(Some(10_000), Some(5_000), Some(1_000), Some(20_000));
        let totals = compute_totals_for(&rates);
        assert_eq!(totals.total_domestic, Decimal::new(16, 0));
        assert_eq!(totals.total_imported, Decimal::new(26, 0));
    }

    #[rstest]
    fn overflowing_sums_saturate() {
        let rates = RateComponents {
            national: Some(Decimal::MAX),
            state: Some(Decimal::ONE),
            municipal: None,
            imported: Some(Decimal::ONE),
        };
        let totals = compute_totals_for(&rates);
        assert_eq!(totals.total_domestic, Decimal::MAX);
        assert_eq!(totals.total_imported, Decimal::new(2, 0));
    }

    fn component() -> impl Strategy<Value = Option<i64>> {
        prop_oneof![Just(None), Just(Some(0)), (0_i64..100_000).prop_map(Some)]
    }

    proptest! {
        /// Absent and zero components are interchangeable.
        #[test]
        fn absent_components_equal_zero(
            national in component(),
            state in component(),
            municipal in component(),
            imported in component(),
        ) {
            let sparse = components(national, state, municipal, imported);
            let dense = components(
                national.or(Some(0)),
                state.or(Some(0)),
                municipal.or(Some(0)),
                imported.or(Some(0)),
            );
            prop_assert_eq!(compute_totals_for(&sparse), compute_totals_for(&dense));
        }
    }
}
