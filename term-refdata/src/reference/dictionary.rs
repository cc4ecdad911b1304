//! Dictionaries: named sets of reference values tested for membership.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A normalization rule applied to both dictionary entries and probed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Strips leading and trailing whitespace.
    Trim,
    /// Lowercases the value, making the dictionary case-insensitive.
    Lowercase,
    /// Keeps only the text after the last `@` (the domain of an email address).
    DomainPart,
}

impl Normalization {
    fn apply(self, value: &str) -> String {
        match self {
            Normalization::Trim => value.trim().to_string(),
            Normalization::Lowercase => value.to_lowercase(),
            Normalization::DomainPart => match value.rfind('@') {
                Some(idx) => value[idx + 1..].to_string(),
                None => value.to_string(),
            },
        }
    }
}

/// A named set of reference strings.
///
/// Membership is exact unless normalization rules are declared, in which case
/// the rules are applied in order to every entry at construction and to every
/// probed value.
///
/// # Example
///
/// ```rust
/// use term_refdata::reference::{Dictionary, Normalization};
///
/// let domains = Dictionary::new("knownDomains", ["gmail.com", "yahoo.com"])
///     .with_normalization(vec![Normalization::DomainPart, Normalization::Lowercase]);
///
/// assert!(domains.contains("user@GMAIL.com"));
/// assert!(!domains.contains("user@other.org"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    name: String,
    entries: HashSet<String>,
    raw_entries: Vec<String>,
    normalization: Vec<Normalization>,
}

impl Dictionary {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw_entries: Vec<String> = values.into_iter().map(Into::into).collect();
        let entries = raw_entries.iter().cloned().collect();
        Self {
            name: name.into(),
            entries,
            raw_entries,
            normalization: Vec::new(),
        }
    }

    /// Sets the normalization rules and re-normalizes the stored entries.
    pub fn with_normalization(mut self, rules: Vec<Normalization>) -> Self {
        self.normalization = rules;
        self.entries = self
            .raw_entries
            .iter()
            .map(|entry| self.normalize(entry))
            .collect();
        self
    }

    /// Shorthand for a dictionary that ignores case.
    pub fn case_insensitive(self) -> Self {
        let mut rules = self.normalization.clone();
        if !rules.contains(&Normalization::Lowercase) {
            rules.push(Normalization::Lowercase);
        }
        self.with_normalization(rules)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalization(&self) -> &[Normalization] {
        &self.normalization
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tests whether `value` is a member of this dictionary.
    pub fn contains(&self, value: &str) -> bool {
        if self.normalization.is_empty() {
            self.entries.contains(value)
        } else {
            self.entries.contains(&self.normalize(value))
        }
    }

    fn normalize(&self, value: &str) -> String {
        self.normalization
            .iter()
            .fold(value.to_string(), |acc, rule| rule.apply(&acc))
    }
}
