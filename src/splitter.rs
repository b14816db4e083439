//! Word-aligned input splitting.
//!
//! A fragment is a slice of the original input, so concatenating the fragments
//! gives back the input byte-for-byte. Words are never divided: a cut falls
//! before a word, after one, or inside a run of whitespace.
//!
//! A fragment holds at most `target` characters, whitespace included. The only
//! exception is a single word longer than `target`, which becomes a fragment
//! of its own.

use crate::error::{GridError, Result};

/// Default target fragment size, in characters.
pub const DEFAULT_SPLIT_SIZE: usize = 5000;

/// Splits one input into word-aligned fragments of at most `target` characters.
#[derive(Debug, Clone, Copy)]
pub struct Splitter<'a> {
    input: &'a str,
    target: usize,
}

impl<'a> Splitter<'a> {
    pub fn new(input: &'a str, target: usize) -> Result<Self> {
        if target == 0 {
            return Err(GridError::InvalidInput(
                "split_size must be a positive integer".to_string(),
            ));
        }
        Ok(Self { input, target })
    }

    /// A fresh pass over the fragments. Calling this again restarts from the top.
    pub fn iter(&self) -> Splits<'a> {
        Splits {
            rest: self.input,
            target: self.target,
            started: false,
        }
    }

    /// Collect every fragment, rejecting input that yields none.
    pub fn fragments(&self) -> Result<Vec<&'a str>> {
        let fragments: Vec<&'a str> = self.iter().collect();
        if fragments.is_empty() {
            return Err(GridError::InvalidInput(
                "input_text produced no splits".to_string(),
            ));
        }
        Ok(fragments)
    }
}

impl<'a> IntoIterator for &Splitter<'a> {
    type Item = &'a str;
    type IntoIter = Splits<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the fragments of a [`Splitter`].
#[derive(Debug, Clone)]
pub struct Splits<'a> {
    rest: &'a str,
    target: usize,
    started: bool,
}

impl<'a> Splits<'a> {
    /// Byte offset where the next fragment should be cut from `self.rest`.
    ///
    /// Always at least one character in, so iteration makes progress.
    fn next_cut(&self) -> usize {
        let rest = self.rest;
        let mut chars = rest.char_indices().peekable();
        let mut taken = 0usize;

        while let Some(&(at, c)) = chars.peek() {
            if c.is_whitespace() {
                if taken == self.target {
                    return at;
                }
                chars.next();
                taken += 1;
                continue;
            }

            let mut word_chars = 0usize;
            let mut lookahead = chars.clone();
            while lookahead.next_if(|(_, c)| !c.is_whitespace()).is_some() {
                word_chars += 1;
            }

            if taken + word_chars <= self.target {
                chars = lookahead;
                taken += word_chars;
            } else if taken == 0 {
                // Oversized word: alone, without its trailing whitespace.
                return lookahead.peek().map_or(rest.len(), |&(end, _)| end);
            } else {
                return at;
            }
        }

        rest.len()
    }
}

impl<'a> Iterator for Splits<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        // Input without a single word yields nothing at all.
        if !self.started && self.rest.trim().is_empty() {
            self.rest = "";
            return None;
        }

        let cut = self.next_cut();
        let (fragment, rest) = self.rest.split_at(cut);
        self.rest = rest;
        self.started = true;
        Some(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(input: &str, target: usize) -> Vec<&str> {
        Splitter::new(input, target).unwrap().iter().collect()
    }

    fn is_single_oversized_word(fragment: &str, target: usize) -> bool {
        let mut words = fragment.split_whitespace();
        matches!(
            (words.next(), words.next()),
            (Some(word), None) if word.chars().count() > target && word == fragment
        )
    }

    fn assert_bounded(input: &str, target: usize) {
        for fragment in split(input, target) {
            assert!(
                fragment.chars().count() <= target || is_single_oversized_word(fragment, target),
                "fragment {:?} exceeds target {}",
                fragment,
                target
            );
        }
    }

    #[test]
    fn test_single_fragment_when_target_is_large() {
        let input = "hola hola mundo mundo mundo";
        assert_eq!(split(input, 5000), vec![input]);
    }

    #[test]
    fn test_fragments_reconstruct_input() {
        let input = "  the quick\tbrown fox\n\njumps over   the lazy dog  ";
        for target in 1..=input.len() + 1 {
            let fragments = split(input, target);
            assert_eq!(fragments.concat(), input, "target {}", target);
        }
    }

    #[test]
    fn test_cuts_never_fall_inside_a_word() {
        let input = "alpha beta gamma delta epsilon zeta eta theta";
        for target in 1..=input.len() {
            let fragments = split(input, target);
            for pair in fragments.windows(2) {
                let left_ends_in_word = pair[0].ends_with(|c: char| !c.is_whitespace());
                let right_starts_in_word = pair[1].starts_with(|c: char| !c.is_whitespace());
                assert!(
                    !(left_ends_in_word && right_starts_in_word),
                    "word divided between {:?} and {:?}",
                    pair[0],
                    pair[1]
                );
            }
            let words: Vec<&str> = fragments
                .iter()
                .flat_map(|f| f.split_whitespace())
                .collect();
            assert_eq!(words, input.split_whitespace().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_fragments_respect_target() {
        assert_eq!(split("aa bb cc", 5), vec!["aa bb", " cc"]);
        assert_eq!(
            split("aa bb cc dd ee ff gg hh", 5),
            vec!["aa bb", " cc ", "dd ee", " ff ", "gg hh"]
        );
        for target in 1..=12 {
            assert_bounded("aa bb cc dd ee ff gg hh", target);
            assert_bounded("  the quick\tbrown fox\n\njumps over   the lazy dog  ", target);
        }
    }

    #[test]
    fn test_long_whitespace_runs_are_cut() {
        let input = format!("a{}b", " ".repeat(100));
        let fragments = split(&input, 5);
        assert_eq!(fragments.concat(), input);
        assert!(fragments.iter().all(|f| f.chars().count() <= 5));
        assert_eq!(fragments.first(), Some(&"a    "));
        assert_eq!(fragments.last(), Some(&" b"));
    }

    #[test]
    fn test_oversized_word_gets_its_own_fragment() {
        let fragments = split("a supercalifragilistic b", 4);
        assert_eq!(fragments, vec!["a ", "supercalifragilistic", " b"]);
        assert_bounded("a supercalifragilistic b", 4);
    }

    #[test]
    fn test_size_counts_characters_not_bytes() {
        // "ñañá" is 4 characters but 8 bytes.
        assert_eq!(split("ñañá ñañá", 9), vec!["ñañá ñañá"]);
        assert_eq!(split("ñañá ñañá", 8), vec!["ñañá ", "ñañá"]);
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert!(split("", 10).is_empty());
        assert!(split(" \n\t ", 10).is_empty());
        assert!(split("      ", 2).is_empty());
        let err = Splitter::new("   ", 10).unwrap().fragments().unwrap_err();
        assert!(matches!(err, GridError::InvalidInput(_)));
    }

    #[test]
    fn test_trailing_whitespace_is_kept() {
        let fragments = split("ab      ", 3);
        assert_eq!(fragments.concat(), "ab      ");
        assert!(fragments.iter().all(|f| f.chars().count() <= 3));
    }

    #[test]
    fn test_zero_target_is_rejected() {
        assert!(matches!(
            Splitter::new("words", 0),
            Err(GridError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let splitter = Splitter::new("one two three four", 7).unwrap();
        let first: Vec<&str> = splitter.iter().collect();
        let second: Vec<&str> = (&splitter).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["one two", " three ", "four"]);
    }
}
