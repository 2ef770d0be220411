//! Behavioural coverage for dataset store lookups and replacements.

use std::cell::RefCell;

use openfiscal_core::{
    DatasetStore, Jurisdiction, MemoryDatasetStore, RateRecord, RateReplacement, RegimeRecord,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

mod support;

use support::{rate, regime};

/// Store under test.
#[fixture]
pub fn store() -> MemoryDatasetStore {
    MemoryDatasetStore::new()
}

/// Rate returned by the last lookup.
#[fixture]
pub fn found_rate() -> RefCell<Option<RateRecord>> {
    RefCell::new(None)
}

/// Regimes returned by the last resolution.
#[fixture]
pub fn found_regimes() -> RefCell<Vec<RegimeRecord>> {
    RefCell::new(Vec::new())
}

fn seed_rates(store: &MemoryDatasetStore, records: Vec<RateRecord>) {
    if let Err(err) = store.replace_rates(RateReplacement::full(records)) {
        panic!("seed rates: {err}");
    }
}

fn lookup(store: &MemoryDatasetStore, product: &str, jurisdiction: &str) -> Option<RateRecord> {
    store
        .lookup_rate(product, jurisdiction)
        .unwrap_or_else(|err| panic!("lookup {product}/{jurisdiction}: {err}"))
}

#[given("a store holding a rate for product 123456 in SP")]
fn store_with_single_rate(store: &MemoryDatasetStore) {
    seed_rates(store, vec![rate("123456", "SP", "Produto exemplo")]);
}

#[when("I look up product \"12.34.56\" in jurisdiction \"sp\"")]
fn look_up_dotted(store: &MemoryDatasetStore, found_rate: &RefCell<Option<RateRecord>>) {
    *found_rate.borrow_mut() = lookup(store, "12.34.56", "sp");
}

#[then("the rate for product 123456 in SP is returned")]
fn rate_for_canonical_key(found_rate: &RefCell<Option<RateRecord>>) {
    let binding = found_rate.borrow();
    let Some(record) = binding.as_ref() else {
        panic!("a rate should have been found");
    };
    assert_eq!(record.product_code.as_str(), "123456");
    assert_eq!(record.jurisdiction.as_str(), "SP");
}

#[scenario(path = "tests/features/dataset_store.feature", index = 0)]
fn separator_laden_codes_are_normalised(
    store: MemoryDatasetStore,
    found_rate: RefCell<Option<RateRecord>>,
) {
    let _ = (store, found_rate);
}

#[given("a store holding regimes under prefixes 1234 and 123456")]
fn store_with_nested_prefixes(store: &MemoryDatasetStore) {
    if let Err(err) = store.replace_regimes(vec![
        regime("0100100", "1234", "broad"),
        regime("0100200", "123456", "narrow"),
    ]) {
        panic!("seed regimes: {err}");
    }
}

#[when("I resolve regimes for product 12345678")]
fn resolve_nested(store: &MemoryDatasetStore, found_regimes: &RefCell<Vec<RegimeRecord>>) {
    let resolved = store
        .resolve_regimes("12345678")
        .unwrap_or_else(|err| panic!("resolve regimes: {err}"));
    *found_regimes.borrow_mut() = resolved;
}

#[then("only the regime under prefix 123456 is returned")]
fn only_longest_prefix(found_regimes: &RefCell<Vec<RegimeRecord>>) {
    let prefixes: Vec<String> = found_regimes
        .borrow()
        .iter()
        .map(|record| record.product_prefix.as_str().to_owned())
        .collect();
    assert_eq!(prefixes, vec!["123456".to_owned()]);
}

#[scenario(path = "tests/features/dataset_store.feature", index = 1)]
fn longest_prefix_wins(store: MemoryDatasetStore, found_regimes: RefCell<Vec<RegimeRecord>>) {
    let _ = (store, found_regimes);
}

#[given("a store holding rates for SP and RJ")]
fn store_with_two_jurisdictions(store: &MemoryDatasetStore) {
    seed_rates(
        store,
        vec![
            rate("22030000", "SP", "previous SP"),
            rate("22030000", "RJ", "previous RJ"),
        ],
    );
}

#[when("the rates are replaced with fresh SP rows while carrying over RJ")]
fn replace_with_carry_over(store: &MemoryDatasetStore) {
    let replacement = RateReplacement::full(vec![rate("22030000", "SP", "fresh SP")])
        .carrying_over([Jurisdiction::normalise("RJ")]);
    if let Err(err) = store.replace_rates(replacement) {
        panic!("replace rates: {err}");
    }
}

#[then("RJ still returns its previous rate")]
fn rj_keeps_previous(store: &MemoryDatasetStore) {
    let description = lookup(store, "22030000", "RJ").map(|record| record.description);
    assert_eq!(description.as_deref(), Some("previous RJ"));
}

#[then("SP returns the fresh rate")]
fn sp_is_fresh(store: &MemoryDatasetStore) {
    let description = lookup(store, "22030000", "SP").map(|record| record.description);
    assert_eq!(description.as_deref(), Some("fresh SP"));
}

#[scenario(path = "tests/features/dataset_store.feature", index = 2)]
fn failed_jurisdiction_is_carried_over(store: MemoryDatasetStore) {
    let _ = store;
}
