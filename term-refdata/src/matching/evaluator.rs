//! Per-row evaluation of the matcher pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::builder::{ColumnMatchers, MatcherPipeline};
use super::connections::ConnectionArena;
use crate::log_outcome;
use crate::logging::{truncate_field, LogConfig};
use crate::value::InputRow;

/// Result of testing one value against one reference source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchOutcome {
    True,
    False,
    /// The backing source could not be reached, or the value could not be read.
    /// Never the same as `False`.
    Unavailable,
}

impl MatchOutcome {
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            MatchOutcome::True
        } else {
            MatchOutcome::False
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, MatchOutcome::True)
    }

    /// Single character code: `T`, `F` or `U`.
    pub fn symbol(&self) -> char {
        match self {
            MatchOutcome::True => 'T',
            MatchOutcome::False => 'F',
            MatchOutcome::Unavailable => 'U',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'T' => Some(MatchOutcome::True),
            'F' => Some(MatchOutcome::False),
            'U' => Some(MatchOutcome::Unavailable),
            _ => None,
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::True => f.write_str("true"),
            MatchOutcome::False => f.write_str("false"),
            MatchOutcome::Unavailable => f.write_str("unavailable"),
        }
    }
}

impl MatcherPipeline {
    /// Evaluates one row.
    ///
    /// The returned vector is positionally aligned with [`Self::schema`]: every
    /// slot is filled, with `Unavailable` standing in for anything that could not
    /// be evaluated.
    pub fn evaluate<R: InputRow + ?Sized>(&mut self, row: &R) -> Vec<MatchOutcome> {
        let mut outcomes = vec![MatchOutcome::Unavailable; self.matchers.width];
        for matchers in &self.matchers.columns {
            evaluate_column(matchers, &mut self.connections, &self.log, row, &mut outcomes);
        }
        outcomes
    }
}

fn evaluate_column<R: InputRow + ?Sized>(
    matchers: &ColumnMatchers,
    connections: &mut ConnectionArena,
    log: &LogConfig,
    row: &R,
    outcomes: &mut [MatchOutcome],
) {
    let column = matchers.column.name();
    let value = match row.value(&matchers.column) {
        Ok(value) => value,
        Err(e) => {
            log_outcome!(log, column, error = %e, "Column value unreadable, outcomes unavailable");
            return;
        }
    };
    // computed once, shared by every matcher of this column
    let text = value.to_canonical_string();

    for m in &matchers.dictionaries {
        outcomes[m.output] =
            MatchOutcome::from_bool(text.as_deref().is_some_and(|t| m.dictionary.contains(t)));
    }

    for m in &matchers.synonyms {
        outcomes[m.output] = match text.as_deref() {
            None => MatchOutcome::False,
            Some(term) => match connections.get_mut(m.connection) {
                Some(connection) => match connection.master_term(term) {
                    Ok(Some(master)) => MatchOutcome::from_bool(!master.is_empty()),
                    Ok(None) => MatchOutcome::False,
                    Err(e) => {
                        log_outcome!(
                            log,
                            column,
                            catalog = %m.catalog,
                            value = %truncate_field(term, log.max_field_length),
                            error = %e,
                            "Synonym lookup failed"
                        );
                        MatchOutcome::Unavailable
                    }
                },
                None => {
                    log_outcome!(log, column, catalog = %m.catalog, "Synonym catalog connection already released");
                    MatchOutcome::Unavailable
                }
            },
        };
    }

    for m in &matchers.patterns {
        outcomes[m.output] =
            MatchOutcome::from_bool(text.as_deref().is_some_and(|t| m.pattern.matches(t)));
    }
}
