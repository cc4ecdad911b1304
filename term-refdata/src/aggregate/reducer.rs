//! Reduction of partition states into one.

use tracing::debug;

use super::state::AggregateState;
use crate::error::{RefDataError, Result};

/// Merges all `states` with a left fold.
///
/// # Errors
///
/// Fails on an empty sequence, or with a schema mismatch when any two states
/// disagree on their output schema.
///
/// # Example
///
/// ```rust
/// use term_refdata::aggregate::{reduce, AggregateOptions, AggregateState};
/// use term_refdata::matching::MatchOutcome;
///
/// let mut p1 = AggregateState::with_outputs(["email in knownDomains"], AggregateOptions::default());
/// p1.fold(&[MatchOutcome::True]).unwrap();
/// let mut p2 = p1.clone();
/// p2.fold(&[MatchOutcome::False]).unwrap();
///
/// let total = reduce(&[p1, p2]).unwrap();
/// assert_eq!(total.rows_processed(), 3);
/// ```
pub fn reduce<'a, I>(states: I) -> Result<AggregateState>
where
    I: IntoIterator<Item = &'a AggregateState>,
{
    let mut iter = states.into_iter();
    let first = iter.next().ok_or(RefDataError::EmptyReduction)?;
    let mut count = 1usize;
    let merged = iter.try_fold(first.clone(), |acc, state| {
        count += 1;
        acc.merge(state)
    })?;
    debug!(states = count, rows = merged.rows_processed(), "Reduced aggregate states");
    Ok(merged)
}

/// Merges `states` pairwise, level by level, as a distributed tree reduction
/// would. Produces the same result as [`reduce`].
pub fn tree_reduce(states: &[AggregateState]) -> Result<AggregateState> {
    if states.is_empty() {
        return Err(RefDataError::EmptyReduction);
    }

    let mut level: Vec<AggregateState> = states.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut iter = level.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => next.push(left.merge(&right)?),
                None => next.push(left),
            }
        }
        level = next;
    }

    level.pop().ok_or(RefDataError::EmptyReduction)
}
