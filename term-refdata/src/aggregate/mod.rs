//! Mergeable aggregate state and partition reduction.
//!
//! Each partition folds its rows' outcome vectors into an [`AggregateState`].
//! States are merged associatively and commutatively, so partitions can be
//! reduced in any order and grouping:
//!
//! ```text
//! partition 0 ─ fold ─► state 0 ─┐
//! partition 1 ─ fold ─► state 1 ─┼─ reduce ─► AggregateState ─► AggregateResult
//! partition 2 ─ fold ─► state 2 ─┘
//! ```

pub mod reducer;
pub mod result;
pub mod state;
pub mod store;

pub use reducer::{reduce, tree_reduce};
pub use result::{AggregateResult, ColumnStatistics, ResultMetadata, ValueCombination};
pub use state::{
    combination_key, decode_combination_key, AggregateOptions, AggregateState,
    CoOccurrenceMatrix, OutcomeCounts,
};
pub use store::{FileSystemStateStore, InMemoryStateStore, StateStore};
