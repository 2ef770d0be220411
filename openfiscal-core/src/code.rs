//! Canonical key types shared by every store implementation.
//!
//! Callers hand raw strings to the store; the constructors here apply the
//! normalisation rules so that `"12.34.56"` and `"123456"` address the same
//! record, and `"sp"` and `"SP"` the same jurisdiction.

use std::{fmt, ops::Deref};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            /// Consume the wrapper and return the inner [`String`].
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Borrow the canonical value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return whether the canonical value is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

/// Fully qualified product classification code with separators removed.
///
/// # Examples
/// ```
/// use openfiscal_core::ProductCode;
///
/// assert_eq!(ProductCode::normalise("2203.00.00").as_str(), "22030000");
/// assert_eq!(ProductCode::normalise(" 22030000 "), ProductCode::normalise("2203.0000"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ProductCode(String);

impl ProductCode {
    /// Keep only ASCII alphanumerics from `raw`.
    #[must_use]
    pub fn normalise(raw: &str) -> Self {
        Self(raw.chars().filter(char::is_ascii_alphanumeric).collect())
    }
}

string_newtype!(ProductCode);

/// Sub-national tax authority code, always upper-case.
///
/// # Examples
/// ```
/// use openfiscal_core::Jurisdiction;
///
/// assert_eq!(Jurisdiction::normalise(" sp ").as_str(), "SP");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Jurisdiction(String);

impl Jurisdiction {
    /// Trim and upper-case `raw`.
    #[must_use]
    pub fn normalise(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }
}

string_newtype!(Jurisdiction);

/// Special-regime code with its dotted separators removed.
///
/// # Examples
/// ```
/// use openfiscal_core::RegimeCode;
///
/// assert_eq!(RegimeCode::normalise("01.001.00").as_str(), "0100100");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct RegimeCode(String);

impl RegimeCode {
    /// Strip `.` separators and surrounding whitespace from `raw`.
    #[must_use]
    pub fn normalise(raw: &str) -> Self {
        Self(
            raw.trim()
                .chars()
                .filter(|ch| *ch != '.' && !ch.is_whitespace())
                .collect(),
        )
    }
}

string_newtype!(RegimeCode);

/// Non-empty, digit-only product code prefix stored against a regime code.
///
/// # Examples
/// ```
/// use openfiscal_core::ProductPrefix;
///
/// let prefix = ProductPrefix::clean("2203.00").expect("digits remain");
/// assert_eq!(prefix.as_str(), "220300");
/// assert!(prefix.matches("22030000"));
/// assert!(ProductPrefix::clean("-").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ProductPrefix(String);

impl ProductPrefix {
    /// Drop every non-digit character; `None` when nothing remains.
    #[must_use]
    pub fn clean(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        (!digits.is_empty()).then_some(Self(digits))
    }

    /// Number of digits in the prefix.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Report whether `code` starts with this prefix.
    #[must_use]
    pub fn matches(&self, code: &str) -> bool {
        code.starts_with(self.0.as_str())
    }
}

string_newtype!(ProductPrefix);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12.34.56", "123456")]
    #[case("123456", "123456")]
    #[case(" 1234-56 ", "123456")]
    #[case("", "")]
    fn product_codes_drop_separators(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(ProductCode::normalise(raw).as_str(), expected);
    }

    #[rstest]
    #[case("sp", "SP")]
    #[case(" Rj\t", "RJ")]
    fn jurisdictions_are_upper_cased(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Jurisdiction::normalise(raw).as_str(), expected);
    }

    #[rstest]
    #[case("0101 00", Some("010100"))]
    #[case("ex 01", Some("01"))]
    #[case("--", None)]
    fn prefixes_keep_digits_only(#[case] raw: &str, #[case] expected: Option<&str>) {
        let cleaned = ProductPrefix::clean(raw);
        assert_eq!(cleaned.as_ref().map(ProductPrefix::as_str), expected);
    }
}
