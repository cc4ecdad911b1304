//! # Term RefData - Reference Data Matching for Rust
//!
//! Term RefData measures how well the values of a dataset agree with reference
//! data. Every selected column is tested against every configured reference
//! source, producing one boolean output column per (column, source) pair and
//! a set of mergeable match statistics.
//!
//! ## Overview
//!
//! Three kinds of reference sources are supported:
//!
//! - **Dictionaries**: named sets of reference values, tested for membership
//! - **Synonym catalogs**: mappings from synonyms to a canonical master term,
//!   accessed through a connection that is opened once per partition and
//!   always released
//! - **String patterns**: regular expressions or simple token templates that
//!   values must conform to
//!
//! Each output column is named `"<column> in <source>"`. Per row, every output
//! column receives exactly one outcome: `True`, `False`, or `Unavailable` when
//! the source could not be consulted. Outcomes are folded into an
//! [`AggregateState`](aggregate::AggregateState) whose merge is associative and
//! commutative, so partitions can be processed independently and reduced in
//! any order.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use term_refdata::prelude::*;
//!
//! # fn example() -> term_refdata::error::Result<()> {
//! let config = MatcherConfig::builder()
//!     .column(Column::utf8("email"))
//!     .column(Column::utf8("city"))
//!     .dictionary(
//!         Dictionary::new("knownDomains", ["gmail.com", "yahoo.com"])
//!             .with_normalization(vec![Normalization::DomainPart]),
//!     )
//!     .synonym_catalog(Arc::new(
//!         SimpleSynonymCatalog::new("cityAliases").with_synonyms("New York", ["NYC", "Big Apple"]),
//!     ))
//!     .build()?;
//!
//! let mut engine = Engine::initialize(&config, &ConnectionContext::new())?;
//! let row = HashMap::from([
//!     ("email".to_string(), Value::from("user@gmail.com")),
//!     ("city".to_string(), Value::from("NYC")),
//! ]);
//! engine.process_row(&row)?;
//!
//! let result = engine.finish()?;
//! assert_eq!(result.column("email in knownDomains").unwrap().true_count, 1);
//! assert_eq!(result.column("city in cityAliases").unwrap().true_count, 1);
//! println!("{}", HumanFormatter::new().format(&result)?);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Partitioned Execution
//!
//! [`PartitionRunner`](partition::PartitionRunner) runs one engine per
//! DataFusion output partition on its own tokio task, then reduces the
//! partition states:
//!
//! ```rust,no_run
//! use term_refdata::prelude::*;
//!
//! # async fn example(config: MatcherConfig) -> term_refdata::error::Result<()> {
//! let runner = PartitionRunner::new(config).with_target_partitions(8);
//! let ctx = runner.session_context();
//! let df = ctx.read_parquet("customers.parquet", Default::default()).await?;
//! let result = runner.run(df).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`reference`**: dictionaries, synonym catalogs and string patterns
//! - **`matching`**: output schema derivation, connection arena, matcher
//!   pipeline and row evaluation
//! - **`aggregate`**: mergeable state, reduction, final results and state
//!   persistence
//! - **`engine`**: per partition lifecycle (initialize, process, shutdown)
//! - **`partition`**: parallel execution over DataFusion partitions
//! - **`config`**: configuration builder and JSON definitions
//! - **`formatters`**: result formatting utilities
//! - **`logging`**: logging configuration and subscriber setup

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod formatters;
pub mod logging;
pub mod matching;
pub mod partition;
pub mod prelude;
pub mod reference;
pub mod value;
