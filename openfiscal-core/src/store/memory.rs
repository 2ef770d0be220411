//! In-memory store backed by immutable snapshots.
//!
//! Each table lives behind an `Arc` that readers clone under a short read
//! lock. Replacements build the next table without holding any lock and then
//! swap the pointer, so a query runs against exactly one table version.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, RwLock},
};

use crate::code::{Jurisdiction, ProductCode, RegimeCode};
use crate::record::{RateRecord, RegimeRecord};
use crate::resolver::PrefixIndex;
use crate::search::{SearchHit, SearchQuery, rank};

use super::{
    DatasetStore, RateReplacement, StoreError, TableStats, base_entry, dedupe_rates,
    dedupe_regimes, validate_rates, validate_regimes,
};

type RateVariants = BTreeMap<String, RateRecord>;

#[derive(Debug, Default)]
struct RateTable {
    entries: BTreeMap<(ProductCode, Jurisdiction), RateVariants>,
    count: usize,
}

impl RateTable {
    fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = RateRecord>,
    {
        let mut entries: BTreeMap<(ProductCode, Jurisdiction), RateVariants> = BTreeMap::new();
        for record in records {
            entries
                .entry((record.product_code.clone(), record.jurisdiction.clone()))
                .or_default()
                .insert(record.exception_code.clone(), record);
        }
        let count = entries.values().map(BTreeMap::len).sum();
        Self { entries, count }
    }

    fn variants(&self, product_code: &str, jurisdiction: &str) -> Vec<RateRecord> {
        let key = (
            ProductCode::normalise(product_code),
            Jurisdiction::normalise(jurisdiction),
        );
        self.entries
            .get(&key)
            .map(|variants| variants.values().cloned().collect())
            .unwrap_or_default()
    }

    fn records(&self) -> impl Iterator<Item = &RateRecord> + '_ {
        self.entries.values().flat_map(BTreeMap::values)
    }
}

#[derive(Debug, Default)]
struct RegimeTable {
    index: PrefixIndex,
    by_code: BTreeMap<RegimeCode, Vec<RegimeRecord>>,
}

impl RegimeTable {
    /// `records` must already be free of duplicate `(code, prefix)` pairs.
    fn build(mut records: Vec<RegimeRecord>) -> Self {
        records.sort_by(|a, b| {
            a.regime_code
                .cmp(&b.regime_code)
                .then_with(|| a.product_prefix.cmp(&b.product_prefix))
        });
        let mut by_code: BTreeMap<RegimeCode, Vec<RegimeRecord>> = BTreeMap::new();
        for record in &records {
            by_code
                .entry(record.regime_code.clone())
                .or_default()
                .push(record.clone());
        }
        Self {
            index: PrefixIndex::build(records),
            by_code,
        }
    }
}

/// Thread-safe [`DatasetStore`] that keeps both tables in memory.
///
/// # Examples
/// ```
/// use openfiscal_core::{DatasetStore, MemoryDatasetStore};
///
/// let store = MemoryDatasetStore::new();
/// assert_eq!(store.lookup_rate("22030000", "SP").expect("query"), None);
/// assert!(store.resolve_regimes("22030000").expect("query").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    rates: RwLock<Arc<RateTable>>,
    regimes: RwLock<Arc<RegimeTable>>,
    writer: Mutex<()>,
}

impl MemoryDatasetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rate_table(&self) -> Result<Arc<RateTable>, StoreError> {
        self.rates
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| StoreError::Poisoned)
    }

    fn regime_table(&self) -> Result<Arc<RegimeTable>, StoreError> {
        self.regimes
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| StoreError::Poisoned)
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn lookup_rate(
        &self,
        product_code: &str,
        jurisdiction: &str,
    ) -> Result<Option<RateRecord>, StoreError> {
        let variants = self.rate_table()?.variants(product_code, jurisdiction);
        Ok(base_entry(&variants).cloned())
    }

    fn rates_for(
        &self,
        product_code: &str,
        jurisdiction: &str,
    ) -> Result<Vec<RateRecord>, StoreError> {
        Ok(self.rate_table()?.variants(product_code, jurisdiction))
    }

    fn resolve_regimes(&self, product_code: &str) -> Result<Vec<RegimeRecord>, StoreError> {
        let code = ProductCode::normalise(product_code);
        Ok(self.regime_table()?.index.resolve(code.as_str()))
    }

    fn regimes_by_code(&self, regime_code: &str) -> Result<Vec<RegimeRecord>, StoreError> {
        let code = RegimeCode::normalise(regime_code);
        Ok(self
            .regime_table()?
            .by_code
            .get(&code)
            .cloned()
            .unwrap_or_default())
    }

    fn search_by_description(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let Some(query) = SearchQuery::parse(text) else {
            return Ok(Vec::new());
        };
        let table = self.rate_table()?;
        let candidates = table
            .records()
            .map(|record| (&record.product_code, record.description.as_str()));
        Ok(rank(&query, candidates, limit))
    }

    fn all_rates(&self) -> Result<Vec<RateRecord>, StoreError> {
        Ok(self.rate_table()?.records().cloned().collect())
    }

    fn all_regimes(&self) -> Result<Vec<RegimeRecord>, StoreError> {
        Ok(self
            .regime_table()?
            .by_code
            .values()
            .flatten()
            .cloned()
            .collect())
    }

    fn rate_count(&self) -> Result<usize, StoreError> {
        Ok(self.rate_table()?.count)
    }

    fn regime_count(&self) -> Result<usize, StoreError> {
        Ok(self.regime_table()?.index.len())
    }

    fn replace_rates(&self, replacement: RateReplacement) -> Result<TableStats, StoreError> {
        validate_rates(&replacement.fresh)?;
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;

        let previous = self.rate_table()?;
        let fresh = dedupe_rates(replacement.fresh);
        let inserted = fresh.len();
        let carried = previous
            .records()
            .filter(|record| replacement.carried_over.contains(&record.jurisdiction))
            .filter(|record| !fresh.contains_key(&record.key()))
            .cloned()
            .collect::<Vec<_>>();
        let next = RateTable::build(carried.into_iter().chain(fresh.into_values()));
        let stats = TableStats {
            inserted,
            carried_over: next.count.saturating_sub(inserted),
            total: next.count,
        };

        let mut slot = self.rates.write().map_err(|_| StoreError::Poisoned)?;
        *slot = Arc::new(next);
        Ok(stats)
    }

    fn replace_regimes(&self, records: Vec<RegimeRecord>) -> Result<TableStats, StoreError> {
        validate_regimes(&records)?;
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;

        let next = RegimeTable::build(dedupe_regimes(records));
        let total = next.index.len();

        let mut slot = self.regimes.write().map_err(|_| StoreError::Poisoned)?;
        *slot = Arc::new(next);
        Ok(TableStats {
            inserted: total,
            carried_over: 0,
            total,
        })
    }
}
