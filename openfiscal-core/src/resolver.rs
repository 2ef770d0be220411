//! Longest-prefix resolution from product codes to special-regime records.
//!
//! A [`RegimeRecord`] matches a product code when the code starts with the
//! record's prefix. Only the matches sharing the greatest prefix length are
//! returned; every record at that length is kept, including ones that share a
//! description or a regime code.
//!
//! [`PrefixIndex`] groups records by prefix length and then by prefix, so a
//! lookup costs one hash probe per distinct prefix length (at most the length
//! of the product code) instead of a pass over every record.
//! [`resolve_by_scan`] is the O(n) reference evaluation.

use std::collections::{BTreeMap, HashMap};

use crate::record::RegimeRecord;

/// Immutable lookup structure over a set of regime records.
#[derive(Debug, Clone, Default)]
pub struct PrefixIndex {
    by_length: BTreeMap<usize, HashMap<String, Vec<RegimeRecord>>>,
    records: usize,
}

impl PrefixIndex {
    /// Build an index from `records`, preserving their relative order within
    /// each prefix bucket.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = RegimeRecord>,
    {
        let mut by_length: BTreeMap<usize, HashMap<String, Vec<RegimeRecord>>> = BTreeMap::new();
        let mut count = 0;
        for record in records {
            count += 1;
            by_length
                .entry(record.product_prefix.len())
                .or_default()
                .entry(record.product_prefix.as_str().to_owned())
                .or_default()
                .push(record);
        }
        Self {
            by_length,
            records: count,
        }
    }

    /// Return every record whose prefix is the longest one matching
    /// `product_code`. An empty vector means nothing matched.
    ///
    /// # Examples
    /// ```
    /// use openfiscal_core::{PrefixIndex, ProductPrefix, RegimeCode, RegimeRecord};
    ///
    /// let record = |code: &str, prefix: &str| {
    ///     RegimeRecord::new(
    ///         RegimeCode::normalise(code),
    ///         ProductPrefix::clean(prefix).expect("digits"),
    ///         "",
    ///     )
    /// };
    /// let index = PrefixIndex::build([record("01", "1234"), record("02", "123456")]);
    /// let found = index.resolve("12345678");
    /// assert_eq!(found.len(), 1);
    /// assert_eq!(found[0].regime_code.as_str(), "02");
    /// ```
    #[must_use]
    pub fn resolve(&self, product_code: &str) -> Vec<RegimeRecord> {
        self.by_length
            .iter()
            .rev()
            .filter(|(length, _)| **length <= product_code.len())
            .find_map(|(length, buckets)| {
                product_code
                    .get(..*length)
                    .and_then(|head| buckets.get(head))
            })
            .cloned()
            .unwrap_or_default()
    }

    /// Iterate over every indexed record.
    pub fn iter(&self) -> impl Iterator<Item = &RegimeRecord> + '_ {
        self.by_length
            .values()
            .flat_map(HashMap::values)
            .flat_map(|bucket| bucket.iter())
    }

    /// Number of indexed records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records
    }

    /// Report whether the index holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Resolve `product_code` against `records` with a full scan.
///
/// Worst case O(n) in the number of records. Results keep input order.
#[must_use]
pub fn resolve_by_scan(records: &[RegimeRecord], product_code: &str) -> Vec<RegimeRecord> {
    let longest = records
        .iter()
        .filter(|record| record.product_prefix.matches(product_code))
        .map(|record| record.product_prefix.len())
        .max();
    let Some(longest) = longest else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|record| {
            record.product_prefix.len() == longest && record.product_prefix.matches(product_code)
        })
        .cloned()
        .collect()
}
