//! Mergeable accumulator of match outcomes.
//!
//! [`AggregateState::merge`] is a pure, component-wise sum. It is associative
//! and commutative, and an empty state over the same schema is its identity, so
//! partitions may be reduced in any order or topology.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RefDataError, Result};
use crate::matching::{MatchOutcome, OutputSchema};

/// Which optional statistics an [`AggregateState`] tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    /// Count, for every pair of output columns, the rows where both are `True`.
    pub track_co_occurrence: bool,
    /// Count the rows producing each distinct outcome vector.
    pub track_combinations: bool,
}

impl AggregateOptions {
    /// Tracks everything.
    pub fn full() -> Self {
        Self {
            track_co_occurrence: true,
            track_combinations: true,
        }
    }

    pub fn with_co_occurrence(mut self, enabled: bool) -> Self {
        self.track_co_occurrence = enabled;
        self
    }

    pub fn with_combinations(mut self, enabled: bool) -> Self {
        self.track_combinations = enabled;
        self
    }
}

/// Outcome counters of one output column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub true_count: u64,
    pub false_count: u64,
    pub unavailable_count: u64,
}

impl OutcomeCounts {
    pub fn total(&self) -> u64 {
        self.true_count
            .saturating_add(self.false_count)
            .saturating_add(self.unavailable_count)
    }

    /// Fraction of `True` among the rows where the source was available.
    pub fn match_ratio(&self) -> Option<f64> {
        let available = self.true_count + self.false_count;
        if available == 0 {
            None
        } else {
            Some(self.true_count as f64 / available as f64)
        }
    }

    /// Sum of the three counters, or `None` on overflow.
    fn checked_total(&self) -> Option<u64> {
        self.true_count
            .checked_add(self.false_count)?
            .checked_add(self.unavailable_count)
    }

    // Callers check `rows_processed + weight` first; each counter is bounded
    // by `rows_processed`.
    fn record(&mut self, outcome: MatchOutcome, weight: u64) {
        match outcome {
            MatchOutcome::True => self.true_count += weight,
            MatchOutcome::False => self.false_count += weight,
            MatchOutcome::Unavailable => self.unavailable_count += weight,
        }
    }

    fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Self {
            true_count: self.true_count.checked_add(other.true_count)?,
            false_count: self.false_count.checked_add(other.false_count)?,
            unavailable_count: self.unavailable_count.checked_add(other.unavailable_count)?,
        })
    }
}

/// Symmetric matrix of rows where two output columns are both `True`.
///
/// The diagonal equals each column's `true_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrenceMatrix {
    size: usize,
    cells: Vec<u64>,
}

impl CoOccurrenceMatrix {
    fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, column: usize) -> Option<u64> {
        if row < self.size && column < self.size {
            Some(self.cells[row * self.size + column])
        } else {
            None
        }
    }

    /// Returns the matrix as nested rows.
    pub fn to_rows(&self) -> Vec<Vec<u64>> {
        if self.size == 0 {
            return Vec::new();
        }
        self.cells.chunks(self.size).map(<[u64]>::to_vec).collect()
    }

    fn record(&mut self, outcomes: &[MatchOutcome], weight: u64) {
        let trues: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_true())
            .map(|(i, _)| i)
            .collect();
        for &i in &trues {
            for &j in &trues {
                self.cells[i * self.size + j] += weight;
            }
        }
    }

    fn checked_add(&self, other: &Self) -> Option<Self> {
        let cells = self
            .cells
            .iter()
            .zip(&other.cells)
            .map(|(a, b)| a.checked_add(*b))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            size: self.size,
            cells,
        })
    }

    fn validate(&self, counts: &[OutcomeCounts]) -> Result<()> {
        if self.size != counts.len() {
            return Err(RefDataError::invalid_state(format!(
                "co-occurrence matrix is {0}x{0} for {1} output columns",
                self.size,
                counts.len()
            )));
        }
        if Some(self.cells.len()) != self.size.checked_mul(self.size) {
            return Err(RefDataError::invalid_state(format!(
                "co-occurrence matrix of size {} has {} cells",
                self.size,
                self.cells.len()
            )));
        }
        for (i, column) in counts.iter().enumerate() {
            if self.cells[i * self.size + i] != column.true_count {
                return Err(RefDataError::invalid_state(format!(
                    "co-occurrence diagonal of column {i} differs from its true count"
                )));
            }
            for j in 0..i {
                let (cell, mirrored) = (self.cells[i * self.size + j], self.cells[j * self.size + i]);
                if cell != mirrored {
                    return Err(RefDataError::invalid_state(format!(
                        "co-occurrence matrix is not symmetric at ({i}, {j})"
                    )));
                }
                if cell > column.true_count.min(counts[j].true_count) {
                    return Err(RefDataError::invalid_state(format!(
                        "co-occurrence of columns {i} and {j} exceeds their true counts"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Encodes an outcome vector as a compact key, one symbol per output column.
pub fn combination_key(outcomes: &[MatchOutcome]) -> String {
    outcomes.iter().map(MatchOutcome::symbol).collect()
}

/// Decodes a key produced by [`combination_key`].
pub fn decode_combination_key(key: &str) -> Option<Vec<MatchOutcome>> {
    key.chars().map(MatchOutcome::from_symbol).collect()
}

/// Per-output-column outcome counts, plus optional pairwise and combination
/// statistics.
///
/// Invariant: for every output column,
/// `true_count + false_count + unavailable_count == rows_processed`.
///
/// Deserialization checks every structural invariant, so a state loaded from
/// storage can be folded and merged like one built in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAggregateState")]
pub struct AggregateState {
    outputs: Vec<String>,
    rows_processed: u64,
    counts: Vec<OutcomeCounts>,
    co_occurrence: Option<CoOccurrenceMatrix>,
    combinations: Option<BTreeMap<String, u64>>,
}

/// Unchecked wire form of [`AggregateState`].
#[derive(Deserialize)]
struct RawAggregateState {
    outputs: Vec<String>,
    rows_processed: u64,
    counts: Vec<OutcomeCounts>,
    co_occurrence: Option<CoOccurrenceMatrix>,
    combinations: Option<BTreeMap<String, u64>>,
}

impl TryFrom<RawAggregateState> for AggregateState {
    type Error = RefDataError;

    fn try_from(raw: RawAggregateState) -> Result<Self> {
        let state = Self {
            outputs: raw.outputs,
            rows_processed: raw.rows_processed,
            counts: raw.counts,
            co_occurrence: raw.co_occurrence,
            combinations: raw.combinations,
        };
        state.validate()?;
        Ok(state)
    }
}

impl AggregateState {
    /// Creates the all-zero state for `schema`.
    pub fn empty(schema: &OutputSchema, options: AggregateOptions) -> Self {
        Self::with_outputs(schema.names().into_iter().map(str::to_string), options)
    }

    /// Creates the all-zero state for the given output column names.
    pub fn with_outputs<I, S>(outputs: I, options: AggregateOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outputs: Vec<String> = outputs.into_iter().map(Into::into).collect();
        let size = outputs.len();
        Self {
            counts: vec![OutcomeCounts::default(); size],
            co_occurrence: options
                .track_co_occurrence
                .then(|| CoOccurrenceMatrix::new(size)),
            combinations: options.track_combinations.then(BTreeMap::new),
            rows_processed: 0,
            outputs,
        }
    }

    /// Folds one row's outcomes into the state.
    pub fn fold(&mut self, outcomes: &[MatchOutcome]) -> Result<()> {
        self.fold_weighted(outcomes, 1)
    }

    /// Folds one row's outcomes, counting the row `weight` times.
    ///
    /// Used when identical rows were collapsed upstream into one row with a
    /// distinct count. The state is left untouched on error.
    pub fn fold_weighted(&mut self, outcomes: &[MatchOutcome], weight: u64) -> Result<()> {
        if outcomes.len() != self.outputs.len() {
            return Err(RefDataError::schema_mismatch(
                format!("{} outcomes", self.outputs.len()),
                format!("{} outcomes", outcomes.len()),
            ));
        }

        let rows_processed = self
            .rows_processed
            .checked_add(weight)
            .ok_or_else(|| RefDataError::CounterOverflow("rows_processed".to_string()))?;

        self.rows_processed = rows_processed;
        for (counts, outcome) in self.counts.iter_mut().zip(outcomes) {
            counts.record(*outcome, weight);
        }
        if let Some(matrix) = self.co_occurrence.as_mut() {
            matrix.record(outcomes, weight);
        }
        if let Some(combinations) = self.combinations.as_mut() {
            *combinations.entry(combination_key(outcomes)).or_insert(0) += weight;
        }
        Ok(())
    }

    /// Returns the component-wise sum of `self` and `other`.
    ///
    /// # Errors
    ///
    /// Returns [`RefDataError::SchemaMismatch`] when the states were built from
    /// different output schemas (names or order) or track different optional
    /// statistics, [`RefDataError::InvalidState`] when either state breaks its
    /// structural invariants, and [`RefDataError::CounterOverflow`] when a sum
    /// exceeds `u64::MAX`. No partial merge is ever produced.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        self.validate()?;
        other.validate()?;

        let overflow = |counter: &str| RefDataError::CounterOverflow(counter.to_string());

        let rows_processed = self
            .rows_processed
            .checked_add(other.rows_processed)
            .ok_or_else(|| overflow("rows_processed"))?;
        let counts = self
            .counts
            .iter()
            .zip(&other.counts)
            .map(|(a, b)| a.checked_add(b))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| overflow("outcome counts"))?;
        let co_occurrence = match (&self.co_occurrence, &other.co_occurrence) {
            (Some(a), Some(b)) => Some(a.checked_add(b).ok_or_else(|| overflow("co-occurrence"))?),
            _ => None,
        };
        let combinations = match (&self.combinations, &other.combinations) {
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                for (key, count) in b {
                    let entry = merged.entry(key.clone()).or_insert(0);
                    *entry = entry
                        .checked_add(*count)
                        .ok_or_else(|| overflow("combinations"))?;
                }
                Some(merged)
            }
            _ => None,
        };

        Ok(Self {
            outputs: self.outputs.clone(),
            rows_processed,
            counts,
            co_occurrence,
            combinations,
        })
    }

    /// Checks the structural invariants: one counter set per output column,
    /// every column summing to `rows_processed`, a square symmetric
    /// co-occurrence matrix whose diagonal equals the true counts, and
    /// well-formed combination keys summing to `rows_processed`.
    pub fn validate(&self) -> Result<()> {
        if self.counts.len() != self.outputs.len() {
            return Err(RefDataError::invalid_state(format!(
                "{} counter sets for {} output columns",
                self.counts.len(),
                self.outputs.len()
            )));
        }
        for (name, counts) in self.iter() {
            if counts.checked_total() != Some(self.rows_processed) {
                return Err(RefDataError::invalid_state(format!(
                    "counts of '{name}' do not sum to {} rows",
                    self.rows_processed
                )));
            }
        }
        if let Some(matrix) = &self.co_occurrence {
            matrix.validate(&self.counts)?;
        }
        if let Some(combinations) = &self.combinations {
            let mut total: u64 = 0;
            for (key, count) in combinations {
                let width = decode_combination_key(key).map(|outcomes| outcomes.len());
                if width != Some(self.outputs.len()) {
                    return Err(RefDataError::invalid_state(format!(
                        "malformed combination key '{key}'"
                    )));
                }
                total = total.checked_add(*count).ok_or_else(|| {
                    RefDataError::invalid_state("combination counts overflow")
                })?;
            }
            if total != self.rows_processed {
                return Err(RefDataError::invalid_state(format!(
                    "combination counts sum to {total}, expected {}",
                    self.rows_processed
                )));
            }
        }
        Ok(())
    }

    /// Returns true if `other` has the same output schema and options.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.check_compatible(other).is_ok()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.outputs != other.outputs {
            return Err(RefDataError::schema_mismatch(
                format!("[{}]", self.outputs.join(", ")),
                format!("[{}]", other.outputs.join(", ")),
            ));
        }
        let (mine, theirs) = (self.options(), other.options());
        if mine != theirs {
            return Err(RefDataError::schema_mismatch(
                format!("{mine:?}"),
                format!("{theirs:?}"),
            ));
        }
        Ok(())
    }

    pub fn options(&self) -> AggregateOptions {
        AggregateOptions {
            track_co_occurrence: self.co_occurrence.is_some(),
            track_combinations: self.combinations.is_some(),
        }
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn rows_processed(&self) -> u64 {
        self.rows_processed
    }

    /// Returns true if no row has been folded.
    pub fn is_empty(&self) -> bool {
        self.rows_processed == 0
    }

    /// Counts of the output column at `index`.
    pub fn counts_at(&self, index: usize) -> Option<&OutcomeCounts> {
        self.counts.get(index)
    }

    /// Counts of the output column called `name`.
    pub fn counts(&self, name: &str) -> Option<&OutcomeCounts> {
        self.outputs
            .iter()
            .position(|o| o == name)
            .and_then(|i| self.counts.get(i))
    }

    /// Iterates over `(output name, counts)` in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutcomeCounts)> {
        self.outputs.iter().map(String::as_str).zip(&self.counts)
    }

    pub fn co_occurrence(&self) -> Option<&CoOccurrenceMatrix> {
        self.co_occurrence.as_ref()
    }

    /// Row counts per distinct outcome vector, keyed by [`combination_key`].
    pub fn combinations(&self) -> Option<&BTreeMap<String, u64>> {
        self.combinations.as_ref()
    }
}
