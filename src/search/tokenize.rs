//! Query normalization and tokenization.
//!
//! Free text typed by an end user becomes a canonical list of tokens: lower-cased,
//! split on whitespace, stop words removed, duplicates collapsed in first-seen order.
//! Stop words are scoped to the entity kind being searched and injected at
//! construction, so organization search and person search never share a table.

use crate::config::StopWordConfig;
use crate::types::EntityKind;
use ahash::AHashSet;
use std::fmt;

/// Lower-case and trim a string the way every comparison in the search core expects.
pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A set of stop words for one entity kind.
#[derive(Debug, Clone, Default)]
pub struct StopWords {
    words: AHashSet<String>,
}

impl StopWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|word| normalize(word.as_ref()))
                .filter(|word| !word.is_empty())
                .collect(),
        }
    }

    /// An empty table: nothing is filtered.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Ordered, duplicate-free set of normalized tokens.
///
/// Iteration yields first-seen order (which drives query planning); equality
/// ignores order, since two token sets describe the same query whenever they
/// hold the same words.
#[derive(Debug, Clone, Default, Eq)]
pub struct Tokens(Vec<String>);

impl Tokens {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl PartialEq for Tokens {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|token| other.contains(token))
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Turns free text into [`Tokens`] using a stop-word table for one entity kind.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stop_words: StopWords,
}

impl Normalizer {
    pub const fn new(stop_words: StopWords) -> Self {
        Self { stop_words }
    }

    /// Build the normalizer for `kind` from the configured stop-word tables.
    pub fn for_kind(config: &StopWordConfig, kind: EntityKind) -> Self {
        Self::new(StopWords::new(config.for_kind(kind)))
    }

    pub const fn stop_words(&self) -> &StopWords {
        &self.stop_words
    }

    /// Extract the token set of `input`. Empty or whitespace-only input yields no tokens.
    pub fn extract_tokens(&self, input: &str) -> Tokens {
        let normalized = normalize(input);
        let mut seen = AHashSet::new();
        let tokens = normalized
            .split_whitespace()
            .filter(|word| !self.stop_words.contains(word))
            .filter(|word| seen.insert(*word))
            .map(str::to_string)
            .collect();
        Tokens(tokens)
    }

    /// Like [`extract_tokens`](Self::extract_tokens) for optional input.
    pub fn extract_optional(&self, input: Option<&str>) -> Tokens {
        input.map(|text| self.extract_tokens(text)).unwrap_or_default()
    }
}
