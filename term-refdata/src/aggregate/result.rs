//! The final, user facing result of a matching run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{decode_combination_key, AggregateState};
use crate::error::{RefDataError, ReleaseErrors, Result};
use crate::matching::{MatchOutcome, OutputSchema};
use crate::reference::SourceKind;

/// Statistics of one output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Output column name, `"<column> in <source>"`.
    pub name: String,
    /// Analyzed column.
    pub column: String,
    /// Reference source name.
    pub source: String,
    pub kind: SourceKind,
    pub true_count: u64,
    pub false_count: u64,
    pub unavailable_count: u64,
    /// Share of matches among rows where the source was available.
    pub match_ratio: Option<f64>,
}

/// A distinct outcome vector and the number of rows that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCombination {
    pub outcomes: Vec<MatchOutcome>,
    pub count: u64,
}

/// Information about how the result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Number of partition states reduced into this result.
    pub partitions: usize,
    pub completed_at: DateTime<Utc>,
}

/// Final statistics of a reference data matching run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub rows_processed: u64,
    /// One entry per output column, in schema order.
    pub columns: Vec<ColumnStatistics>,
    /// Symmetric matrix of rows where both output columns matched, indexed like
    /// `columns`.
    pub co_occurrence: Option<Vec<Vec<u64>>>,
    /// Outcome vectors ordered by descending frequency.
    pub combinations: Vec<ValueCombination>,
    /// Connections that could not be released during shutdown.
    pub release_errors: ReleaseErrors,
    pub metadata: ResultMetadata,
}

impl AggregateResult {
    /// Builds the result of `state`, which must have been created for `schema`.
    pub fn from_state(schema: &OutputSchema, state: &AggregateState) -> Result<Self> {
        let names = schema.names();
        if names.len() != state.outputs().len()
            || names.iter().zip(state.outputs()).any(|(a, b)| *a != b.as_str())
        {
            return Err(RefDataError::schema_mismatch(
                schema.to_string(),
                format!("[{}]", state.outputs().join(", ")),
            ));
        }

        let columns = schema
            .iter()
            .zip(state.iter())
            .map(|(spec, (_, counts))| ColumnStatistics {
                name: spec.name.clone(),
                column: spec.column.clone(),
                source: spec.source.clone(),
                kind: spec.kind,
                true_count: counts.true_count,
                false_count: counts.false_count,
                unavailable_count: counts.unavailable_count,
                match_ratio: counts.match_ratio(),
            })
            .collect();

        let mut combinations: Vec<ValueCombination> = state
            .combinations()
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(key, count)| {
                        decode_combination_key(key).map(|outcomes| ValueCombination {
                            outcomes,
                            count: *count,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        // ties keep key order, so the listing is deterministic
        combinations.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(Self {
            rows_processed: state.rows_processed(),
            columns,
            co_occurrence: state.co_occurrence().map(|m| m.to_rows()),
            combinations,
            release_errors: ReleaseErrors::default(),
            metadata: ResultMetadata {
                partitions: 1,
                completed_at: Utc::now(),
            },
        })
    }

    /// Attaches release failures collected at shutdown.
    pub fn with_release_errors(mut self, errors: ReleaseErrors) -> Self {
        self.release_errors.extend(errors);
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.metadata.partitions = partitions;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStatistics> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_release_errors(&self) -> bool {
        !self.release_errors.is_empty()
    }

    /// Total number of `Unavailable` outcomes across all output columns.
    pub fn total_unavailable(&self) -> u64 {
        self.columns.iter().map(|c| c.unavailable_count).sum()
    }
}
