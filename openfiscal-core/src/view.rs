//! Merged per-product views combining a rate, its totals and its regimes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::aggregate::{RateTotals, compute_totals};
use crate::record::{RateRecord, RegimeRecord};
use crate::resolver::PrefixIndex;
use crate::store::{DatasetStore, StoreError};

/// A rate record enriched with derived totals and the regimes resolved for
/// its product code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MergedRate {
    /// The stored rate record.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub rate: RateRecord,
    /// Totals derived from the rate components.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub totals: RateTotals,
    /// Regimes whose prefix is the longest match for the product code.
    pub regimes: Vec<RegimeRecord>,
}

impl MergedRate {
    /// Combine `rate` with `regimes`, computing totals on the way.
    #[must_use]
    pub fn new(rate: RateRecord, regimes: Vec<RegimeRecord>) -> Self {
        let totals = compute_totals(&rate);
        Self {
            rate,
            totals,
            regimes,
        }
    }
}

/// Look up the base rate for `(product_code, jurisdiction)` and merge it with
/// the regimes resolved for the same product code.
///
/// # Errors
/// Propagates store faults. A missing rate yields `Ok(None)`.
///
/// # Examples
/// ```
/// use openfiscal_core::{MemoryDatasetStore, merged_rate};
///
/// let store = MemoryDatasetStore::new();
/// assert!(merged_rate(&store, "22030000", "SP").expect("query").is_none());
/// ```
pub fn merged_rate<S>(
    store: &S,
    product_code: &str,
    jurisdiction: &str,
) -> Result<Option<MergedRate>, StoreError>
where
    S: DatasetStore + ?Sized,
{
    let Some(rate) = store.lookup_rate(product_code, jurisdiction)? else {
        return Ok(None);
    };
    let regimes = store.resolve_regimes(rate.product_code.as_str())?;
    Ok(Some(MergedRate::new(rate, regimes)))
}

/// Merge every stored rate with its regimes, in rate identity order.
///
/// The regime table is read once and indexed locally so both tables come from
/// a single snapshot each.
///
/// # Errors
/// Propagates store faults.
pub fn merged_rates<S>(store: &S) -> Result<Vec<MergedRate>, StoreError>
where
    S: DatasetStore + ?Sized,
{
    let index = PrefixIndex::build(store.all_regimes()?);
    Ok(store
        .all_rates()?
        .into_iter()
        .map(|rate| {
            let regimes = index.resolve(rate.product_code.as_str());
            MergedRate::new(rate, regimes)
        })
        .collect())
}
