//! Record builders for integration tests.
//!
//! Include with `mod support;` and build fixtures through [`rate`] and
//! [`regime`] so every test shares the same provenance and rate values.

use openfiscal_core::{
    Jurisdiction, ProductCode, ProductPrefix, Provenance, RateComponents, RateRecord, RegimeCode,
    RegimeRecord,
};
use rust_decimal::Decimal;

/// Build a rate record for `product_code` in `jurisdiction` with fixed
/// components (4.20 national, 12.00 state, no municipal, 6.10 imported).
pub fn rate(product_code: &str, jurisdiction: &str, description: &str) -> RateRecord {
    RateRecord {
        product_code: ProductCode::normalise(product_code),
        jurisdiction: Jurisdiction::normalise(jurisdiction),
        exception_code: String::new(),
        product_type: "0".to_owned(),
        description: description.to_owned(),
        rates: RateComponents {
            national: Some(Decimal::new(4_20, 2)),
            state: Some(Decimal::new(12_00, 2)),
            municipal: None,
            imported: Some(Decimal::new(6_10, 2)),
        },
        valid_from: "01/01/2025".to_owned(),
        valid_until: "31/03/2025".to_owned(),
        provenance: Provenance {
            key: "A1B2C3".to_owned(),
            version: "25.1.A".to_owned(),
            origin: "IBPT".to_owned(),
        },
    }
}

/// Build a regime record mapping `regime_code` to the cleaned `prefix`.
///
/// # Panics
/// Panics when `prefix` contains no digits.
pub fn regime(regime_code: &str, prefix: &str, description: &str) -> RegimeRecord {
    let Some(product_prefix) = ProductPrefix::clean(prefix) else {
        panic!("prefix {prefix:?} must contain digits");
    };
    RegimeRecord::new(RegimeCode::normalise(regime_code), product_prefix, description)
}
