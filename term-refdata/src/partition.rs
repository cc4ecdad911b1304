//! Parallel matching over partitioned input.
//!
//! Each partition gets its own task and its own [`Engine`], so partitions
//! share no mutable state and never share a connection. Once every task has
//! finished, the partition states are reduced into one result.
//!
//! Engines run on the blocking pool: opening a catalog may read a file and
//! lookups may call out to a remote service. For DataFrame input an async task
//! drains the partition's stream and hands batches over a bounded channel.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use datafusion::execution::SendableRecordBatchStream;
use datafusion::prelude::{DataFrame, SessionConfig, SessionContext};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{reduce, AggregateResult, AggregateState, StateStore};
use crate::config::MatcherConfig;
use crate::engine::{Engine, ShutdownReport};
use crate::error::{ReleaseErrors, Result};
use crate::reference::ConnectionContext;
use crate::value::Value;

/// Batches buffered between a partition's stream and its engine.
const BATCH_BUFFER: usize = 4;

/// An in-memory partition: rows keyed by column name.
pub type RowPartition = Vec<HashMap<String, Value>>;

/// Partition id used for logging and for saved states.
pub fn partition_id(index: usize) -> String {
    format!("part-{index:04}")
}

/// Runs one [`Engine`] per partition on the tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use term_refdata::config::MatcherConfig;
/// use term_refdata::partition::PartitionRunner;
/// use term_refdata::reference::Dictionary;
/// use term_refdata::value::Column;
///
/// # async fn example() -> term_refdata::error::Result<()> {
/// let config = MatcherConfig::builder()
///     .column(Column::utf8("country"))
///     .dictionary(Dictionary::new("isoCountries", ["FR", "DE", "US"]))
///     .build()?;
///
/// let runner = PartitionRunner::new(config);
/// let ctx = runner.session_context();
/// let df = ctx.read_csv("customers.csv", Default::default()).await?;
///
/// let result = runner.run(df).await?;
/// println!("{} rows matched", result.rows_processed);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PartitionRunner {
    config: Arc<MatcherConfig>,
    connection_context: ConnectionContext,
    target_partitions: usize,
    state_store: Option<Arc<dyn StateStore>>,
}

impl std::fmt::Debug for PartitionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRunner")
            .field("config", &self.config)
            .field("connection_context", &self.connection_context)
            .field("target_partitions", &self.target_partitions)
            .field("state_store", &self.state_store.is_some())
            .finish()
    }
}

impl PartitionRunner {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config: Arc::new(config),
            connection_context: ConnectionContext::new(),
            target_partitions: num_cpus::get(),
            state_store: None,
        }
    }

    /// Sets the context every partition's connections are opened with. The
    /// partition label is filled in per partition.
    pub fn with_connection_context(mut self, ctx: ConnectionContext) -> Self {
        self.connection_context = ctx;
        self
    }

    /// Sets the number of partitions DataFusion should produce.
    pub fn with_target_partitions(mut self, partitions: usize) -> Self {
        self.target_partitions = partitions.max(1);
        self
    }

    /// Saves every partition's state to `store` before reduction.
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn target_partitions(&self) -> usize {
        self.target_partitions
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new().with_target_partitions(self.target_partitions)
    }

    /// A session whose scans are split into this runner's partition count.
    pub fn session_context(&self) -> SessionContext {
        SessionContext::new_with_config(self.session_config())
    }

    /// Matches every row of `df`, one engine per output partition.
    #[instrument(skip_all)]
    pub async fn run(&self, df: DataFrame) -> Result<AggregateResult> {
        let streams = df.execute_stream_partitioned().await?;
        info!(partitions = streams.len(), "Executing partitioned matching");

        let handles: Vec<JoinHandle<Result<ShutdownReport>>> = streams
            .into_iter()
            .enumerate()
            .map(|(index, stream)| {
                let config = Arc::clone(&self.config);
                let ctx = self.partition_context(index);
                tokio::spawn(run_stream(config, ctx, stream))
            })
            .collect();

        self.collect(handles).await
    }

    /// Matches in-memory partitions, one blocking task per partition.
    #[instrument(skip_all, fields(partitions = partitions.len()))]
    pub async fn run_in_memory(&self, partitions: Vec<RowPartition>) -> Result<AggregateResult> {
        let handles: Vec<JoinHandle<Result<ShutdownReport>>> = partitions
            .into_iter()
            .enumerate()
            .map(|(index, rows)| {
                let config = Arc::clone(&self.config);
                let ctx = self.partition_context(index);
                tokio::task::spawn_blocking(move || run_rows(&config, &ctx, &rows))
            })
            .collect();

        self.collect(handles).await
    }

    fn partition_context(&self, index: usize) -> ConnectionContext {
        self.connection_context
            .clone()
            .with_partition(partition_id(index))
    }

    /// Awaits every task, then reduces. All tasks are awaited even after one
    /// fails, so no engine is left running.
    async fn collect(
        &self,
        handles: Vec<JoinHandle<Result<ShutdownReport>>>,
    ) -> Result<AggregateResult> {
        let mut reports = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(partition = %partition_id(index), error = %e, "Partition failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if let Some(store) = &self.state_store {
            for (index, report) in reports.iter().enumerate() {
                store.save_state(&partition_id(index), &report.state).await?;
            }
        }

        let schema = self.config.schema()?;
        let state = if reports.is_empty() {
            AggregateState::empty(&schema, self.config.aggregate_options())
        } else {
            reduce(reports.iter().map(|r| &r.state))?
        };

        let mut release_errors = ReleaseErrors::default();
        for report in &reports {
            release_errors.extend(report.release_errors.clone());
        }

        info!(
            partitions = reports.len(),
            rows = state.rows_processed(),
            release_errors = release_errors.len(),
            "Partitioned matching completed"
        );

        Ok(AggregateResult::from_state(&schema, &state)?
            .with_release_errors(release_errors)
            .with_partitions(reports.len()))
    }
}

async fn run_stream(
    config: Arc<MatcherConfig>,
    ctx: ConnectionContext,
    mut stream: SendableRecordBatchStream,
) -> Result<ShutdownReport> {
    let partition = ctx.partition().unwrap_or("-").to_string();
    let (tx, rx) = mpsc::channel(BATCH_BUFFER);
    let worker = tokio::task::spawn_blocking(move || run_batches(&config, &ctx, rx));

    let mut drained: Result<()> = Ok(());
    while let Some(batch) = stream.next().await {
        match batch {
            Ok(batch) => {
                // the engine stopped early; its own error is reported below
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                drained = Err(e.into());
                break;
            }
        }
    }
    drop(tx);

    let report = worker.await??;
    drained?;
    debug!(
        partition = %partition,
        rows = report.state.rows_processed(),
        "Partition finished"
    );
    Ok(report)
}

/// Folds batches until the sender is dropped. Connections are released on
/// every path.
fn run_batches(
    config: &MatcherConfig,
    ctx: &ConnectionContext,
    mut batches: mpsc::Receiver<RecordBatch>,
) -> Result<ShutdownReport> {
    let mut engine = Engine::initialize(config, ctx)?;
    let mut outcome = Ok(());
    while let Some(batch) = batches.blocking_recv() {
        if let Err(e) = engine.process_batch(&batch) {
            outcome = Err(e);
            break;
        }
    }
    let report = engine.shutdown();
    outcome.map(|()| report)
}

fn run_rows(
    config: &MatcherConfig,
    ctx: &ConnectionContext,
    rows: &[HashMap<String, Value>],
) -> Result<ShutdownReport> {
    let mut engine = Engine::initialize(config, ctx)?;
    for row in rows {
        engine.process_row(row)?;
    }
    Ok(engine.shutdown())
}
