//! Free-text search over rate descriptions.
//!
//! Every store shares this ranking so that results do not depend on the
//! backing engine. Stores may pre-filter candidates however they like as long
//! as every description containing all terms reaches [`rank`].

use std::{cmp::Ordering, collections::HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::code::ProductCode;

const EXACT_WORD: u32 = 3;
const WORD_PREFIX: u32 = 2;
const SUBSTRING: u32 = 1;

/// A tokenised query whose terms are AND-joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    /// Tokenise `text` on non-alphanumerics, lower-casing each term.
    ///
    /// Returns `None` when no term survives.
    ///
    /// # Examples
    /// ```
    /// use openfiscal_core::SearchQuery;
    ///
    /// let query = SearchQuery::parse("Cerveja, de MALTE").expect("terms");
    /// assert_eq!(query.terms(), ["cerveja", "de", "malte"]);
    /// assert!(SearchQuery::parse(" ,; ").is_none());
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let terms: Vec<String> = tokenise(text).collect();
        (!terms.is_empty()).then_some(Self { terms })
    }

    /// The lower-cased terms in query order.
    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Score `description`, or `None` if any term is missing from it.
    #[must_use]
    pub fn score(&self, description: &str) -> Option<u32> {
        let lowered = description.to_lowercase();
        let words: Vec<String> = tokenise(&lowered).collect();
        self.terms.iter().try_fold(0_u32, |total, term| {
            let points = if words.iter().any(|word| word == term) {
                EXACT_WORD
            } else if words.iter().any(|word| word.starts_with(term.as_str())) {
                WORD_PREFIX
            } else if lowered.contains(term.as_str()) {
                SUBSTRING
            } else {
                return None;
            };
            Some(total + points)
        })
    }
}

fn tokenise(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SearchHit {
    /// Product code of the matching entry.
    pub product_code: ProductCode,
    /// Description that matched.
    pub description: String,
    /// Relevance score; higher is better.
    pub score: u32,
}

/// Rank `candidates` against `query`, keeping at most `limit` hits.
///
/// Candidates that miss a term are dropped, duplicates of the same
/// `(product code, description)` collapse into one hit, and ties are broken
/// by shorter description then product code.
pub fn rank<'a, I>(query: &SearchQuery, candidates: I, limit: usize) -> Vec<SearchHit>
where
    I: IntoIterator<Item = (&'a ProductCode, &'a str)>,
{
    let mut seen = HashSet::new();
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .filter(|(code, description)| seen.insert((*code, *description)))
        .filter_map(|(code, description)| {
            query.score(description).map(|score| SearchHit {
                product_code: code.clone(),
                description: description.to_owned(),
                score,
            })
        })
        .collect();
    hits.sort_by(compare_hits);
    hits.truncate(limit);
    hits
}

fn compare_hits(left: &SearchHit, right: &SearchHit) -> Ordering {
    right
        .score
        .cmp(&left.score)
        .then_with(|| left.description.len().cmp(&right.description.len()))
        .then_with(|| left.product_code.cmp(&right.product_code))
        .then_with(|| left.description.cmp(&right.description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn query(text: &str) -> SearchQuery {
        SearchQuery::parse(text).expect("query should contain terms")
    }

    #[rstest]
    #[case("cerveja", "Cervejas de malte", Some(2))]
    #[case("cerveja", "Cerveja de malte", Some(3))]
    #[case("malte", "Extratos maltados", None)]
    #[case("alte", "Cerveja de malte", Some(1))]
    #[case("cerveja malte", "Cerveja de malte", Some(6))]
    #[case("cerveja vinho", "Cerveja de malte", None)]
    fn scores_each_term(#[case] text: &str, #[case] description: &str, #[case] expected: Option<u32>) {
        assert_eq!(query(text).score(description), expected);
    }

    #[rstest]
    fn ranks_by_score_then_length() {
        let codes = [
            ProductCode::normalise("22030000"),
            ProductCode::normalise("22030001"),
            ProductCode::normalise("22030002"),
        ];
        let candidates = [
            (&codes[0], "Cervejas especiais de malte"),
            (&codes[1], "Cerveja de malte"),
            (&codes[2], "Cerveja sem alcool"),
            (&codes[1], "Cerveja de malte"),
        ];
        let hits = rank(&query("cerveja"), candidates, 10);
        let order: Vec<&str> = hits.iter().map(|hit| hit.product_code.as_str()).collect();
        assert_eq!(order, vec!["22030001", "22030002", "22030000"]);
    }

    #[rstest]
    fn honours_limit() {
        let code = ProductCode::normalise("1");
        let candidates = [(&code, "a b"), (&code, "a c"), (&code, "a d")];
        assert_eq!(rank(&query("a"), candidates, 2).len(), 2);
    }
}
