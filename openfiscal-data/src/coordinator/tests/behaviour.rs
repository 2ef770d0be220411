//! Behavioural coverage for the ingestion coordinator.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::{Harness, JURISDICTIONS, file_name, harness};
use crate::coordinator::SourceOutcome;
use crate::test_support::{StubBody, StubRateSource, rate_file, rate_row};

#[derive(Default)]
struct IngestionContext {
    harness: RefCell<Option<Harness>>,
    outcomes: RefCell<Vec<SourceOutcome>>,
}

impl IngestionContext {
    fn with_harness<T>(&self, action: impl FnOnce(&Harness) -> T) -> T {
        let borrowed = self.harness.borrow();
        let current = borrowed
            .as_ref()
            .unwrap_or_else(|| panic!("a harness must be prepared by a Given step"));
        action(current)
    }

    fn record(&self, outcome: SourceOutcome) {
        self.outcomes.borrow_mut().push(outcome);
    }

    fn last_outcome<T>(&self, inspect: impl FnOnce(&SourceOutcome) -> T) -> T {
        let outcomes = self.outcomes.borrow();
        let last = outcomes
            .last()
            .unwrap_or_else(|| panic!("a synchronisation must have run"));
        inspect(last)
    }
}

#[fixture]
fn ingestion_context() -> IngestionContext {
    IngestionContext::default()
}

#[given("rate files for every jurisdiction")]
fn every_jurisdiction(#[from(ingestion_context)] ctx: &IngestionContext) {
    let rates = StubRateSource::new();
    for uf in JURISDICTIONS {
        rates.set_file(
            &file_name(uf),
            rate_file(&[&rate_row("22030000", &format!("Cerveja {uf}"), "13,45")]),
        );
    }
    *ctx.harness.borrow_mut() = Some(Harness {
        rates,
        ..harness()
    });
}

#[given("the SP file contains a row with a non-numeric rate")]
fn sp_has_malformed_row(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.with_harness(|target| {
        target.rates.set_file(
            &file_name("SP"),
            rate_file(&[
                &rate_row("22030000", "Cerveja SP", "13,45"),
                "22021000;;0;Refrigerante;n/d;0;0;0;a;b;k;v;f",
            ]),
        );
    });
}

#[given("a regime document with a stable entity tag")]
fn stable_regime_document(#[from(ingestion_context)] ctx: &IngestionContext) {
    *ctx.harness.borrow_mut() = Some(harness());
}

#[given("rate files for SP and RJ that were already synchronised")]
fn synchronised_pair(#[from(ingestion_context)] ctx: &IngestionContext) {
    let target = harness();
    let outcome = target.run_rates();
    assert!(
        matches!(outcome, SourceOutcome::Committed { .. }),
        "initial synchronisation should commit: {outcome}"
    );
    *ctx.harness.borrow_mut() = Some(target);
}

#[given("the RJ file has become unreachable")]
fn rj_unreachable(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.with_harness(|target| {
        target
            .rates
            .set_file(&file_name("RJ"), StubBody::Unreachable);
    });
}

#[when("the rate tables are synchronised")]
fn synchronise_rates(#[from(ingestion_context)] ctx: &IngestionContext) {
    let outcome = ctx.with_harness(Harness::run_rates);
    ctx.record(outcome);
}

#[when("the regime table is synchronised twice")]
fn synchronise_regimes_twice(#[from(ingestion_context)] ctx: &IngestionContext) {
    for _ in 0..2 {
        let outcome = ctx.with_harness(Harness::run_regimes);
        ctx.record(outcome);
    }
}

#[then("rates for all 27 jurisdictions are committed")]
fn all_committed(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.last_outcome(|outcome| {
        assert!(
            matches!(outcome, SourceOutcome::Committed { records: 27, .. }),
            "unexpected outcome: {outcome}"
        );
    });
    ctx.with_harness(|target| {
        for uf in JURISDICTIONS {
            assert_eq!(
                target.description("22030000", uf),
                Some(format!("Cerveja {uf}"))
            );
        }
    });
}

#[then("one skipped unit is reported")]
fn one_skipped_unit(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.last_outcome(|outcome| {
        assert!(
            matches!(outcome, SourceOutcome::Committed { skipped_units: 1, .. }),
            "unexpected outcome: {outcome}"
        );
    });
}

#[then("the regime document was downloaded once")]
fn downloaded_once(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.with_harness(|target| assert_eq!(target.regimes.fetch_calls(), 1));
}

#[then("the second synchronisation reports no change")]
fn second_run_unchanged(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.last_outcome(|outcome| {
        assert!(
            matches!(outcome, SourceOutcome::Unchanged),
            "unexpected outcome: {outcome}"
        );
    });
}

#[then("RJ still returns its previous rate")]
fn rj_keeps_previous(#[from(ingestion_context)] ctx: &IngestionContext) {
    ctx.with_harness(|target| {
        assert_eq!(
            target.description("22030000", "RJ").as_deref(),
            Some("Cerveja RJ")
        );
    });
}

macro_rules! register_scenario {
    ($name:ident, $index:literal) => {
        #[scenario(path = "tests/features/ingestion.feature", index = $index)]
        fn $name(#[from(ingestion_context)] context: IngestionContext) {
            let _ = context;
        }
    };
}

register_scenario!(malformed_row_does_not_block_other_jurisdictions, 0);
register_scenario!(unchanged_regime_document_is_downloaded_once, 1);
register_scenario!(unreachable_rate_file_keeps_previous_rates, 2);
