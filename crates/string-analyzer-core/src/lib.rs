use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("unable to parse natural language query: {0:?}")]
    QueryNotUnderstood(String),
}

/// Canonical derived properties for one stored text value.
///
/// Produced once by [`analyze`] and immutable afterwards. The
/// `content_fingerprint` doubles as the record's stable identifier and
/// uniqueness key at the storage boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StringProperties {
    pub value: String,
    /// Count of Unicode scalar values, not bytes or grapheme clusters.
    pub length: u64,
    /// Computed on the lower-cased value. Uniqueness and frequency counts
    /// below stay case-sensitive; the asymmetry is part of the contract.
    pub is_palindrome: bool,
    pub unique_characters: u64,
    pub word_count: u64,
    /// Lowercase hex SHA-256 of the UTF-8 encoding of `value`.
    pub content_fingerprint: String,
    pub character_frequency: BTreeMap<char, u64>,
}

/// The persisted unit: analyzed properties plus the creation timestamp
/// assigned when the value was first accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StringRecord {
    pub properties: StringProperties,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Sparse conjunctive filter over stored records.
///
/// An absent field imposes no constraint on that dimension. The same shape
/// is produced by explicit query parameters and by [`interpret`], so both
/// paths evaluate identically through [`apply_filters`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilterSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_palindrome: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_character: Option<char>,
}

impl FilterSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_palindrome.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.word_count.is_none()
            && self.contains_character.is_none()
    }

    /// Evaluate every present dimension as an AND constraint.
    #[must_use]
    pub fn matches(&self, properties: &StringProperties) -> bool {
        if let Some(is_palindrome) = self.is_palindrome {
            if properties.is_palindrome != is_palindrome {
                return false;
            }
        }
        if let Some(min_length) = self.min_length {
            if properties.length < min_length {
                return false;
            }
        }
        if let Some(max_length) = self.max_length {
            if properties.length > max_length {
                return false;
            }
        }
        if let Some(word_count) = self.word_count {
            if properties.word_count != word_count {
                return false;
            }
        }
        if let Some(character) = self.contains_character {
            if !properties.character_frequency.contains_key(&character) {
                return false;
            }
        }
        true
    }
}

/// Compute the full property record for one text value.
///
/// Total over any Unicode string, including the empty string; validation of
/// acceptable input happens at the request boundary, never here.
#[must_use]
pub fn analyze(value: &str) -> StringProperties {
    let lowered = value.to_lowercase();
    let is_palindrome = lowered.chars().eq(lowered.chars().rev());

    let mut character_frequency: BTreeMap<char, u64> = BTreeMap::new();
    for character in value.chars() {
        *character_frequency.entry(character).or_insert(0) += 1;
    }

    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();

    StringProperties {
        value: value.to_string(),
        length: u64::try_from(value.chars().count()).unwrap_or(u64::MAX),
        is_palindrome,
        unique_characters: u64::try_from(character_frequency.len()).unwrap_or(u64::MAX),
        word_count: u64::try_from(value.split_whitespace().count()).unwrap_or(u64::MAX),
        content_fingerprint: format!("{digest:x}"),
        character_frequency,
    }
}

/// Translate a free-text query sentence into a [`FilterSet`].
///
/// Matching is case-insensitive over the trimmed sentence and every rule is
/// attempted independently; a sentence may set several dimensions. For the
/// same dimension, later rules overwrite earlier ones: "at least" wins over
/// "longer than", "at most" wins over "shorter than", and "first vowel" wins
/// over an explicit letter.
///
/// # Errors
/// Returns [`CoreError::QueryNotUnderstood`] (carrying the original
/// sentence) when no recognition rule fires.
pub fn interpret(sentence: &str) -> Result<FilterSet, CoreError> {
    let query = sentence.trim().to_lowercase();
    let mut filters = FilterSet::default();

    if query.contains("palindromic") || query.contains("palindrome") {
        filters.is_palindrome = Some(true);
    }

    if let Some(count) = scan_number_before_word(&query) {
        filters.word_count = Some(count);
    } else if query.contains("single word") {
        filters.word_count = Some(1);
    }

    // "longer than N" is strict, so the bound becomes N + 1.
    if let Some(bound) = scan_phrase_then_number(&query, &[&["longer", "than"], &["more", "than"]])
    {
        filters.min_length = Some(bound.saturating_add(1));
    }
    if let Some(bound) = scan_phrase_then_number(&query, &[&["at", "least"]]) {
        filters.min_length = Some(bound);
    }
    if let Some(bound) = scan_phrase_then_number(&query, &[&["shorter", "than"], &["less", "than"]])
    {
        filters.max_length = Some(bound.saturating_sub(1));
    }
    if let Some(bound) = scan_phrase_then_number(&query, &[&["at", "most"]]) {
        filters.max_length = Some(bound);
    }

    if let Some(character) = scan_contains_character(&query) {
        filters.contains_character = Some(character);
    }
    if query.contains("first vowel") {
        filters.contains_character = Some('a');
    }

    if filters.is_empty() {
        return Err(CoreError::QueryNotUnderstood(sentence.to_string()));
    }
    Ok(filters)
}

/// Keep the records that satisfy every present filter dimension.
///
/// Order-preserving relative to the input; the single evaluator both the
/// structured-parameter path and the natural-language path funnel through.
#[must_use]
pub fn apply_filters(filters: &FilterSet, records: &[StringRecord]) -> Vec<StringRecord> {
    records
        .iter()
        .filter(|record| filters.matches(&record.properties))
        .cloned()
        .collect()
}

/// Consume at least one whitespace scalar, returning the remainder.
fn skip_whitespace(input: &str) -> Option<&str> {
    let rest = input.trim_start();
    if rest.len() == input.len() {
        None
    } else {
        Some(rest)
    }
}

/// Consume a leading run of ASCII digits as a base-10 integer.
fn take_number(input: &str) -> Option<(u64, &str)> {
    let end = input
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    let number = input[..end].parse::<u64>().ok()?;
    Some((number, &input[end..]))
}

/// Match literal words separated by whitespace runs, then capture the
/// integer that follows. Word starts are plain substring positions, not
/// word boundaries, so "prolonger than 4" still sets a bound.
fn match_words_then_number(input: &str, words: &[&str]) -> Option<u64> {
    let mut rest = input;
    let mut first = true;
    for word in words {
        if !first {
            rest = skip_whitespace(rest)?;
        }
        rest = rest.strip_prefix(word)?;
        first = false;
    }
    let rest = skip_whitespace(rest)?;
    let (number, _) = take_number(rest)?;
    Some(number)
}

/// Leftmost match of any alternative phrase followed by an integer.
fn scan_phrase_then_number(query: &str, alternatives: &[&[&str]]) -> Option<u64> {
    for (start, _) in query.char_indices() {
        for words in alternatives {
            if let Some(number) = match_words_then_number(&query[start..], words) {
                return Some(number);
            }
        }
    }
    None
}

/// Leftmost `<integer> word(s)` capture.
fn scan_number_before_word(query: &str) -> Option<u64> {
    for (start, character) in query.char_indices() {
        if !character.is_ascii_digit() {
            continue;
        }
        let Some((number, rest)) = take_number(&query[start..]) else {
            continue;
        };
        let Some(rest) = skip_whitespace(rest) else {
            continue;
        };
        if rest.starts_with("word") {
            return Some(number);
        }
    }
    None
}

/// Leftmost `contain(s|ing) [the letter] ['"]?<alphanumeric>['"]?` capture.
///
/// When "the" appears but the full "the letter" phrase does not follow, the
/// optional phrase is skipped and the 't' itself is captured.
fn scan_contains_character(query: &str) -> Option<char> {
    for (start, _) in query.char_indices() {
        let Some(after_keyword) = query[start..].strip_prefix("contain") else {
            continue;
        };
        let Some(after_suffix) = after_keyword
            .strip_prefix('s')
            .or_else(|| after_keyword.strip_prefix("ing"))
        else {
            continue;
        };
        let Some(rest) = skip_whitespace(after_suffix) else {
            continue;
        };
        let rest = strip_the_letter(rest).unwrap_or(rest);
        let rest = rest.strip_prefix(['\'', '"']).unwrap_or(rest);
        let Some(character) = rest.chars().next() else {
            continue;
        };
        if character.is_ascii_lowercase() || character.is_ascii_digit() {
            return Some(character);
        }
    }
    None
}

fn strip_the_letter(input: &str) -> Option<&str> {
    let rest = input.strip_prefix("the")?;
    let rest = skip_whitespace(rest)?;
    let rest = rest.strip_prefix("letter")?;
    skip_whitespace(rest)
}
