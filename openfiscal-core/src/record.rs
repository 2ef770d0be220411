//! Record types held by the dataset store.

use rust_decimal::Decimal;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::code::{Jurisdiction, ProductCode, ProductPrefix, RegimeCode};

/// The four independently published tax-rate components, in percent.
///
/// An absent component is treated as zero wherever totals are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RateComponents {
    /// National (federal) rate for domestic goods.
    pub national: Option<Decimal>,
    /// State rate.
    pub state: Option<Decimal>,
    /// Municipal rate.
    pub municipal: Option<Decimal>,
    /// National (federal) rate for imported goods.
    pub imported: Option<Decimal>,
}

/// Largest rate a component may carry, in percent.
pub const MAX_RATE_PERCENT: Decimal = Decimal::ONE_HUNDRED;

impl RateComponents {
    fn named(&self) -> [(&'static str, Option<Decimal>); 4] {
        [
            ("national", self.national),
            ("state", self.state),
            ("municipal", self.municipal),
            ("imported", self.imported),
        ]
    }

    fn negative_component(&self) -> Option<(&'static str, Decimal)> {
        self.named()
            .into_iter()
            .find_map(|(name, value)| value.filter(|v| *v < Decimal::ZERO).map(|v| (name, v)))
    }

    fn oversized_component(&self) -> Option<(&'static str, Decimal)> {
        self.named()
            .into_iter()
            .find_map(|(name, value)| value.filter(|v| *v > MAX_RATE_PERCENT).map(|v| (name, v)))
    }
}

/// Where a rate table row came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Provenance {
    /// Publisher key for the table release.
    pub key: String,
    /// Table version string.
    pub version: String,
    /// Publishing organisation.
    pub origin: String,
}

/// Per-jurisdiction tax-rate metadata for one product code.
///
/// Identity is `(product_code, jurisdiction, exception_code)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RateRecord {
    /// Normalised product code.
    pub product_code: ProductCode,
    /// Normalised jurisdiction.
    pub jurisdiction: Jurisdiction,
    /// Qualifier distinguishing otherwise identical product entries.
    pub exception_code: String,
    /// Publisher-defined product type marker.
    pub product_type: String,
    /// Free-text product description.
    pub description: String,
    /// Rate components.
    pub rates: RateComponents,
    /// Start of the validity window, as published.
    pub valid_from: String,
    /// End of the validity window, as published.
    pub valid_until: String,
    /// Release provenance.
    pub provenance: Provenance,
}

/// Identity tuple of a [`RateRecord`].
pub type RateKey = (ProductCode, Jurisdiction, String);

impl RateRecord {
    /// Validate a record before it may enter a store.
    ///
    /// # Errors
    /// Returns [`RecordError`] when the product code or jurisdiction is empty
    /// or a rate component is negative or above [`MAX_RATE_PERCENT`].
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.product_code.is_empty() {
            return Err(RecordError::EmptyProductCode);
        }
        if self.jurisdiction.is_empty() {
            return Err(RecordError::EmptyJurisdiction);
        }
        if let Some((component, value)) = self.rates.negative_component() {
            return Err(RecordError::NegativeRate { component, value });
        }
        if let Some((component, value)) = self.rates.oversized_component() {
            return Err(RecordError::RateOutOfRange { component, value });
        }
        Ok(())
    }

    /// Identity tuple of this record.
    #[must_use]
    pub fn key(&self) -> RateKey {
        (
            self.product_code.clone(),
            self.jurisdiction.clone(),
            self.exception_code.clone(),
        )
    }
}

/// A special-regime code mapped to one product code prefix.
///
/// # Examples
/// ```
/// use openfiscal_core::{ProductPrefix, RegimeCode, RegimeRecord};
///
/// let record = RegimeRecord::new(
///     RegimeCode::normalise("03.001.00"),
///     ProductPrefix::clean("2201").expect("digits"),
///     "Agua mineral",
/// );
/// assert_eq!(record.regime_code.as_str(), "0300100");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RegimeRecord {
    /// Normalised regime code.
    pub regime_code: RegimeCode,
    /// Product code prefix covered by the regime.
    pub product_prefix: ProductPrefix,
    /// Regime description.
    pub description: String,
}

impl RegimeRecord {
    /// Construct a record from already-normalised parts.
    pub fn new(
        regime_code: RegimeCode,
        product_prefix: ProductPrefix,
        description: impl Into<String>,
    ) -> Self {
        Self {
            regime_code,
            product_prefix,
            description: description.into(),
        }
    }

    /// Validate a record before it may enter a store.
    ///
    /// # Errors
    /// Returns [`RecordError::EmptyRegimeCode`] for an empty regime code.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.regime_code.is_empty() {
            return Err(RecordError::EmptyRegimeCode);
        }
        Ok(())
    }
}

/// Reasons a record is rejected at the store boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The product code contained no alphanumerics.
    #[error("product code is empty after normalisation")]
    EmptyProductCode,
    /// The jurisdiction was blank.
    #[error("jurisdiction is empty")]
    EmptyJurisdiction,
    /// The regime code was blank.
    #[error("regime code is empty after normalisation")]
    EmptyRegimeCode,
    /// A rate component was below zero.
    #[error("{component} rate {value} is negative")]
    NegativeRate {
        /// Name of the offending component.
        component: &'static str,
        /// The rejected value.
        value: Decimal,
    },
    /// A rate component exceeded [`MAX_RATE_PERCENT`].
    #[error("{component} rate {value} exceeds 100%")]
    RateOutOfRange {
        /// Name of the offending component.
        component: &'static str,
        /// The rejected value.
        value: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rate;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    fn accepts_well_formed_rate() {
        assert_eq!(rate("22030000", "SP").validate(), Ok(()));
    }

    #[rstest]
    fn rejects_negative_component() {
        let mut record = rate("22030000", "SP");
        record.rates.municipal = Some(Decimal::new(-1, 0));
        assert!(matches!(
            record.validate(),
            Err(RecordError::NegativeRate {
                component: "municipal",
                ..
            })
        ));
    }

    #[rstest]
    #[case(Decimal::ONE_HUNDRED, true)]
    #[case(Decimal::new(100_01, 2), false)]
    #[case(Decimal::MAX, false)]
    fn caps_components_at_one_hundred_percent(#[case] state: Decimal, #[case] accepted: bool) {
        let mut record = rate("22030000", "SP");
        record.rates.state = Some(state);
        match record.validate() {
            Ok(()) => assert!(accepted, "{state} should be rejected"),
            Err(RecordError::RateOutOfRange { component, value }) => {
                assert!(!accepted, "{state} should be accepted");
                assert_eq!((component, value), ("state", state));
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    fn rejects_blank_identity() {
        let mut record = rate("", "SP");
        assert_eq!(record.validate(), Err(RecordError::EmptyProductCode));
        record.product_code = ProductCode::normalise("1");
        record.jurisdiction = Jurisdiction::normalise(" ");
        assert_eq!(record.validate(), Err(RecordError::EmptyJurisdiction));
    }
}
