//! Record builders shared by unit tests, behaviour tests and downstream
//! crates enabling the `test-support` feature.

use rust_decimal::Decimal;

use crate::code::{Jurisdiction, ProductCode, ProductPrefix, RegimeCode};
use crate::record::{Provenance, RateComponents, RateRecord, RegimeRecord};

/// Build a rate record for `product_code` in `jurisdiction` with fixed,
/// non-negative components and an empty exception code.
#[must_use]
pub fn rate(product_code: &str, jurisdiction: &str) -> RateRecord {
    RateRecord {
        product_code: ProductCode::normalise(product_code),
        jurisdiction: Jurisdiction::normalise(jurisdiction),
        exception_code: String::new(),
        product_type: "0".to_owned(),
        description: format!("Produto {product_code}"),
        rates: RateComponents {
            national: Some(Decimal::new(13_45, 2)),
            state: Some(Decimal::new(18_00, 2)),
            municipal: Some(Decimal::ZERO),
            imported: Some(Decimal::new(15_85, 2)),
        },
        valid_from: "01/01/2025".to_owned(),
        valid_until: "31/03/2025".to_owned(),
        provenance: Provenance {
            key: "9F0E2D".to_owned(),
            version: "25.1.A".to_owned(),
            origin: "IBPT".to_owned(),
        },
    }
}

/// Build a rate record with an explicit exception code and description.
#[must_use]
pub fn rate_variant(
    product_code: &str,
    jurisdiction: &str,
    exception_code: &str,
    description: &str,
) -> RateRecord {
    RateRecord {
        exception_code: exception_code.to_owned(),
        description: description.to_owned(),
        ..rate(product_code, jurisdiction)
    }
}

/// Build a regime record.
///
/// # Panics
/// Panics when `prefix` contains no digits.
#[must_use]
pub fn regime(regime_code: &str, prefix: &str, description: &str) -> RegimeRecord {
    #[expect(clippy::expect_used, reason = "test helper with literal input")]
    let product_prefix = ProductPrefix::clean(prefix).expect("prefix must contain digits");
    RegimeRecord::new(RegimeCode::normalise(regime_code), product_prefix, description)
}
