//! Matcher pipeline: schema derivation, connection management and row
//! evaluation.
//!
//! ```text
//! columns + sources ──► OutputSchema::derive ──► MatcherPipeline::build
//!                                                   │  (opens catalog connections)
//!                         row ──► MatcherPipeline::evaluate ──► [MatchOutcome; |schema|]
//! ```

pub mod builder;
pub mod connections;
pub mod evaluator;
pub mod schema;

pub use builder::{
    ColumnMatchers, DictionaryMatcher, MatcherPipeline, MatcherSet, PatternMatcher, SynonymMatcher,
};
pub use connections::{ConnectionArena, ConnectionId};
pub use evaluator::MatchOutcome;
pub use schema::{output_name, OutputColumnSpec, OutputSchema};
