//! Lifecycle of one partition's matching run.
//!
//! An [`Engine`] is created once per partition. It opens the synonym catalog
//! connections, folds every row it is given into its [`AggregateState`], and
//! releases the connections when it is shut down:
//!
//! ```text
//! Engine::initialize ──► process_row / process_batch (many) ──► shutdown | finish
//! ```
//!
//! Connections are also released when an engine is dropped without being shut
//! down, for example when the task running it is cancelled.

use arrow::record_batch::RecordBatch;
use tracing::{info, instrument, warn};

use crate::aggregate::{AggregateResult, AggregateState};
use crate::config::MatcherConfig;
use crate::error::{ReleaseErrors, Result};
use crate::logging::LogConfig;
use crate::{log_connection, perf_debug};
use crate::matching::{MatchOutcome, MatcherPipeline, OutputSchema};
use crate::reference::ConnectionContext;
use crate::value::{BatchRow, InputRow};

/// Matching engine for a single partition.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use term_refdata::config::MatcherConfig;
/// use term_refdata::engine::Engine;
/// use term_refdata::reference::{ConnectionContext, Dictionary, Normalization};
/// use term_refdata::value::{Column, Value};
///
/// let config = MatcherConfig::builder()
///     .column(Column::utf8("email"))
///     .dictionary(
///         Dictionary::new("knownDomains", ["gmail.com", "yahoo.com"])
///             .with_normalization(vec![Normalization::DomainPart]),
///     )
///     .build()
///     .unwrap();
///
/// let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
/// for email in ["user@gmail.com", "x@other.org"] {
///     let row = HashMap::from([("email".to_string(), Value::from(email))]);
///     engine.process_row(&row).unwrap();
/// }
///
/// let result = engine.finish().unwrap();
/// let stats = result.column("email in knownDomains").unwrap();
/// assert_eq!((stats.true_count, stats.false_count), (1, 1));
/// ```
#[derive(Debug)]
pub struct Engine {
    pipeline: MatcherPipeline,
    state: AggregateState,
    log: LogConfig,
    partition: Option<String>,
}

/// What an engine hands back when it is shut down.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub schema: OutputSchema,
    pub state: AggregateState,
    /// Connections whose release failed. Every connection was attempted.
    pub release_errors: ReleaseErrors,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.release_errors.is_empty()
    }

    /// Builds the partition's result with the release errors attached.
    pub fn into_result(self) -> Result<AggregateResult> {
        Ok(AggregateResult::from_state(&self.schema, &self.state)?
            .with_release_errors(self.release_errors))
    }
}

impl Engine {
    /// Builds the matcher pipeline and opens every synonym catalog connection.
    ///
    /// # Errors
    ///
    /// Configuration errors and connection open failures abort initialization
    /// before any row is processed. Connections opened before a failing one
    /// are released first.
    #[instrument(skip_all, fields(partition = ctx.partition().unwrap_or("-")))]
    pub fn initialize(config: &MatcherConfig, ctx: &ConnectionContext) -> Result<Self> {
        let log = config.log_config().clone();
        let pipeline = MatcherPipeline::build(
            config.columns(),
            config.dictionaries(),
            config.synonym_catalogs(),
            config.string_patterns(),
            ctx,
        )?
        .with_log_config(log.clone());

        log_connection!(
            log,
            connections = pipeline.connections().len(),
            "Opened synonym catalog connections"
        );

        let state = AggregateState::empty(pipeline.schema(), config.aggregate_options());
        info!(outputs = pipeline.schema().len(), "Engine initialized");

        Ok(Self {
            pipeline,
            state,
            log,
            partition: ctx.partition().map(str::to_string),
        })
    }

    pub fn schema(&self) -> &OutputSchema {
        self.pipeline.schema()
    }

    /// The state folded so far.
    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// Evaluates one row and folds its outcomes. Returns the outcome vector.
    ///
    /// Lookup failures and unreadable values never fail the call; they show up
    /// as `Unavailable` slots.
    pub fn process_row<R: InputRow + ?Sized>(&mut self, row: &R) -> Result<Vec<MatchOutcome>> {
        self.process_row_weighted(row, 1)
    }

    /// Like [`Engine::process_row`], counting the row `weight` times.
    pub fn process_row_weighted<R: InputRow + ?Sized>(
        &mut self,
        row: &R,
        weight: u64,
    ) -> Result<Vec<MatchOutcome>> {
        let outcomes = self.pipeline.evaluate(row);
        self.state.fold_weighted(&outcomes, weight)?;
        Ok(outcomes)
    }

    /// Processes every row of `batch`, returning the number of rows.
    #[instrument(skip_all, fields(rows = batch.num_rows()))]
    pub fn process_batch(&mut self, batch: &RecordBatch) -> Result<usize> {
        let start = std::time::Instant::now();
        let mut rows = 0;
        for row in BatchRow::iter(batch) {
            self.process_row(&row)?;
            rows += 1;
        }
        perf_debug!(
            self.log,
            rows,
            elapsed_us = start.elapsed().as_micros() as u64,
            total_rows = self.state.rows_processed(),
            "Processed batch"
        );
        Ok(rows)
    }

    /// Releases every connection and returns the folded state.
    ///
    /// All connections are attempted even when some fail to close.
    #[instrument(skip_all, fields(partition = self.partition.as_deref().unwrap_or("-")))]
    pub fn shutdown(self) -> ShutdownReport {
        let Engine {
            mut pipeline,
            state,
            log,
            ..
        } = self;

        let release_errors = pipeline.close();
        for failure in release_errors.iter() {
            warn!(catalog = %failure.catalog, error = %failure.message, "Failed to release connection");
        }
        log_connection!(
            log,
            failed = release_errors.len(),
            "Released synonym catalog connections"
        );
        info!(rows = state.rows_processed(), "Engine shut down");

        ShutdownReport {
            schema: pipeline.schema().clone(),
            state,
            release_errors,
        }
    }

    /// Shuts down and builds the final result of this engine alone.
    pub fn finish(self) -> Result<AggregateResult> {
        self.shutdown().into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateOptions;
    use crate::reference::{Dictionary, SimpleSynonymCatalog, StringPattern};
    use crate::value::{Column, Value};
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn config() -> MatcherConfig {
        MatcherConfig::builder()
            .column(Column::utf8("city"))
            .dictionary(Dictionary::new("capitals", ["Paris", "Berlin"]))
            .synonym_catalog(Arc::new(
                SimpleSynonymCatalog::new("cityAliases")
                    .with_synonyms("New York", ["NYC", "Big Apple"]),
            ))
            .string_pattern(StringPattern::regex("capitalized", "[A-Z][a-z]+").unwrap())
            .aggregate_options(AggregateOptions::full())
            .build()
            .unwrap()
    }

    fn row(city: impl Into<Value>) -> HashMap<String, Value> {
        HashMap::from([("city".to_string(), city.into())])
    }

    #[test]
    fn test_process_rows() {
        let mut engine = Engine::initialize(&config(), &ConnectionContext::new()).unwrap();
        assert_eq!(
            engine.schema().names(),
            vec!["city in capitals", "city in cityAliases", "city in capitalized"]
        );

        use MatchOutcome::{False as F, True as T};
        assert_eq!(engine.process_row(&row("Paris")).unwrap(), vec![T, F, T]);
        assert_eq!(engine.process_row(&row("NYC")).unwrap(), vec![F, T, F]);
        assert_eq!(engine.process_row(&row(Value::Null)).unwrap(), vec![F, F, F]);
        assert_eq!(engine.state().rows_processed(), 3);

        let report = engine.shutdown();
        assert!(report.is_clean());
        let result = report.into_result().unwrap();
        assert_eq!(result.rows_processed, 3);
        assert_eq!(result.column("city in cityAliases").unwrap().true_count, 1);
    }

    #[test]
    fn test_weighted_rows() {
        let mut engine = Engine::initialize(&config(), &ConnectionContext::new()).unwrap();
        engine.process_row_weighted(&row("Berlin"), 4).unwrap();
        engine.process_row(&row("Rome")).unwrap();

        let result = engine.finish().unwrap();
        assert_eq!(result.rows_processed, 5);
        let capitals = result.column("city in capitals").unwrap();
        assert_eq!((capitals.true_count, capitals.false_count), (4, 1));
    }

    #[test]
    fn test_process_batch() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("city", DataType::Utf8, true),
            Field::new("id", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("Paris"), None, Some("Big Apple")])),
                Arc::new(Int64Array::from(vec![1, 2, 3])),
            ],
        )
        .unwrap();

        let mut engine = Engine::initialize(&config(), &ConnectionContext::new()).unwrap();
        assert_eq!(engine.process_batch(&batch).unwrap(), 3);

        let state = engine.shutdown().state;
        assert_eq!(state.rows_processed(), 3);
        assert_eq!(state.counts("city in capitals").unwrap().true_count, 1);
        assert_eq!(state.counts("city in cityAliases").unwrap().true_count, 1);
    }

    #[test]
    fn test_missing_column_is_unavailable() {
        let mut engine = Engine::initialize(&config(), &ConnectionContext::new()).unwrap();
        let outcomes = engine.process_row(&HashMap::<String, Value>::new()).unwrap();
        assert!(outcomes.iter().all(|o| *o == MatchOutcome::Unavailable));
        assert_eq!(engine.finish().unwrap().total_unavailable(), 3);
    }

    #[test]
    fn test_partition_label() {
        let ctx = ConnectionContext::new().with_partition("p-7");
        let engine = Engine::initialize(&config(), &ctx).unwrap();
        assert_eq!(engine.partition(), Some("p-7"));
    }
}
