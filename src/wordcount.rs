// Word-count map and reduce functions shared by workers and the local fallback

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::ComputeError;

/// Per-word occurrence counts. Ordered so that the same counts always
/// serialize to the same bytes, no matter who computed them.
pub type Counts = BTreeMap<String, u64>;

// `\w` is Unicode-aware in the regex crate, so accented letters count as word characters.
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w']+").expect("Invalid regex pattern"));

/// Count lower-cased words in a text fragment.
pub fn map_fragment(text: &str) -> Counts {
    let mut counts = Counts::new();
    for word in WORD_PATTERN.find_iter(text) {
        *counts.entry(word.as_str().to_lowercase()).or_insert(0) += 1;
    }
    counts
}

/// Sum a sequence of partial counts into one mapping.
///
/// Addition is commutative and associative, so the order of `partials` does not
/// affect the result.
pub fn reduce_partials<'a, I>(partials: I) -> Result<Counts, ComputeError>
where
    I: IntoIterator<Item = &'a Counts>,
{
    let mut total = Counts::new();
    let mut seen = 0usize;
    for partial in partials {
        seen += 1;
        for (word, count) in partial {
            let slot = total.entry(word.clone()).or_insert(0);
            *slot = slot
                .checked_add(*count)
                .ok_or_else(|| ComputeError::CountOverflow { key: word.clone() })?;
        }
    }
    if seen == 0 {
        return Err(ComputeError::NoPartials);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> Counts {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_map_counts_lowercased_words() {
        let result = map_fragment("Hola hola mundo, MUNDO... mundo!");
        assert_eq!(result, counts(&[("hola", 2), ("mundo", 3)]));
    }

    #[test]
    fn test_map_keeps_accents_and_apostrophes() {
        let result = map_fragment("Canción canción don't ÑANDÚ");
        assert_eq!(
            result,
            counts(&[("canción", 2), ("don't", 1), ("ñandú", 1)])
        );
    }

    #[test]
    fn test_map_of_punctuation_only_is_empty() {
        assert!(map_fragment(" -- !! ").is_empty());
    }

    #[test]
    fn test_reduce_sums_keys() {
        let a = counts(&[("a", 1), ("b", 2)]);
        let b = counts(&[("b", 3), ("c", 4)]);
        let merged = reduce_partials([&a, &b]).unwrap();
        assert_eq!(merged, counts(&[("a", 1), ("b", 5), ("c", 4)]));
    }

    #[test]
    fn test_reduce_is_order_independent() {
        let parts = vec![
            counts(&[("x", 1)]),
            counts(&[("x", 2), ("y", 1)]),
            counts(&[("y", 7)]),
        ];
        let forward = reduce_partials(parts.iter()).unwrap();
        let backward = reduce_partials(parts.iter().rev()).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_reduce_overflow_is_an_error() {
        let a = counts(&[("big", u64::MAX)]);
        let b = counts(&[("big", 1)]);
        let err = reduce_partials([&a, &b]).unwrap_err();
        assert_eq!(err, ComputeError::CountOverflow { key: "big".into() });
    }

    #[test]
    fn test_reduce_without_partials_is_an_error() {
        let none: Vec<Counts> = Vec::new();
        assert_eq!(reduce_partials(&none).unwrap_err(), ComputeError::NoPartials);
    }
}
