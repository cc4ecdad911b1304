//! Partitioned execution over DataFusion tables.

mod common;

use std::sync::Arc;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::prelude::{col, lit, DataFrame, SessionContext};
use term_refdata::aggregate::FileSystemStateStore;
use term_refdata::prelude::*;

use common::ScriptedCatalog;

const CITIES: [&str; 12] = [
    "Paris", "NYC", "Berlin", "Big Apple", "Lyon", "NY", "paris", "Rome", "New York", "X1",
    "Madrid", "NYC",
];

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("city", DataType::Utf8, true),
        Field::new("id", DataType::Int64, false),
    ]))
}

fn batch(cities: &[&str], first_id: i64) -> RecordBatch {
    let ids: Vec<i64> = (first_id..first_id + cities.len() as i64).collect();
    RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(StringArray::from(cities.to_vec())),
            Arc::new(Int64Array::from(ids)),
        ],
    )
    .unwrap()
}

/// Registers the cities as a table split into three partitions.
async fn partitioned_frame(ctx: &SessionContext) -> DataFrame {
    let table = MemTable::try_new(
        schema(),
        vec![
            vec![batch(&CITIES[..4], 0)],
            vec![batch(&CITIES[4..7], 4), batch(&CITIES[7..9], 7)],
            vec![batch(&CITIES[9..], 9)],
        ],
    )
    .unwrap();
    ctx.register_table("cities", Arc::new(table)).unwrap();
    ctx.table("cities").await.unwrap()
}

fn config() -> MatcherConfig {
    MatcherConfig::builder()
        .column(Column::utf8("city"))
        .column(Column::new("id", DataType::Int64))
        .dictionary(
            Dictionary::new("capitals", ["Paris", "Berlin", "Rome", "Madrid"])
                .with_normalization(vec![Normalization::Lowercase]),
        )
        .synonym_catalog(Arc::new(
            SimpleSynonymCatalog::new("cityAliases").with_synonyms("New York", ["NY", "NYC", "Big Apple"]),
        ))
        .string_pattern(StringPattern::simple("word", "Aaaa").unwrap())
        .aggregate_options(AggregateOptions::full())
        .build()
        .unwrap()
}

fn sequential(config: &MatcherConfig) -> AggregateState {
    let mut engine = Engine::initialize(config, &ConnectionContext::new()).unwrap();
    engine.process_batch(&batch(&CITIES, 0)).unwrap();
    engine.shutdown().state
}

#[tokio::test]
async fn test_partitioned_run_equals_sequential() {
    let config = config();
    let expected = AggregateResult::from_state(&config.schema().unwrap(), &sequential(&config))
        .unwrap();

    let runner = PartitionRunner::new(config).with_target_partitions(3);
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx).await;

    let result = runner.run(df).await.unwrap();

    assert_eq!(result.rows_processed, CITIES.len() as u64);
    assert!(result.metadata.partitions >= 1);
    assert_eq!(result.columns, expected.columns);
    assert_eq!(result.co_occurrence, expected.co_occurrence);
    assert_eq!(result.combinations, expected.combinations);
    assert!(!result.has_release_errors());

    let capitals = result.column("city in capitals").unwrap();
    assert_eq!(capitals.true_count, 5);
    let aliases = result.column("city in cityAliases").unwrap();
    assert_eq!(aliases.true_count, 5);
}

#[tokio::test]
async fn test_integer_column_is_matched_on_display_form() {
    let config = MatcherConfig::builder()
        .column(Column::new("id", DataType::Int64))
        .dictionary(Dictionary::new("lucky", ["3", "7"]))
        .build()
        .unwrap();
    let runner = PartitionRunner::new(config);
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx).await;

    let result = runner.run(df).await.unwrap();
    assert_eq!(result.column("id in lucky").unwrap().true_count, 2);
}

#[tokio::test]
async fn test_filtered_frame() {
    let runner = PartitionRunner::new(config());
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx)
        .await
        .filter(col("id").lt(lit(4i64)))
        .unwrap();

    let result = runner.run(df).await.unwrap();
    assert_eq!(result.rows_processed, 4);
}

#[tokio::test]
async fn test_release_errors_from_all_partitions_are_collected() {
    let catalog = ScriptedCatalog::new("flaky").failing_close();
    let counters = Arc::clone(&catalog.counters);
    let config = MatcherConfig::builder()
        .column(Column::utf8("city"))
        .synonym_catalog(Arc::new(catalog))
        .build()
        .unwrap();

    let runner = PartitionRunner::new(config).with_target_partitions(3);
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx).await;
    let result = runner.run(df).await.unwrap();

    assert_eq!(result.rows_processed, CITIES.len() as u64);
    assert_eq!(result.release_errors.len(), result.metadata.partitions);
    assert_eq!(counters.opened(), counters.closed());
}

#[tokio::test]
async fn test_catalog_calls_stay_off_the_runtime_thread() {
    let catalog = ScriptedCatalog::new("aliases").with_synonyms("New York", &["NYC"]);
    let counters = Arc::clone(&catalog.counters);
    let config = MatcherConfig::builder()
        .column(Column::utf8("city"))
        .synonym_catalog(Arc::new(catalog))
        .build()
        .unwrap();

    let runner = PartitionRunner::new(config).with_target_partitions(3);
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx).await;
    let result = runner.run(df).await.unwrap();

    assert_eq!(result.column("city in aliases").unwrap().true_count, 3);
    assert_eq!(counters.lookups(), CITIES.len());
    // the current-thread test runtime drives every async task on this thread
    let threads = counters.threads();
    assert!(!threads.is_empty());
    assert!(!threads.contains(&std::thread::current().id()));
}

#[tokio::test]
async fn test_open_failure_fails_the_run() {
    let config = MatcherConfig::builder()
        .column(Column::utf8("city"))
        .synonym_catalog(Arc::new(ScriptedCatalog::new("down").failing_open()))
        .build()
        .unwrap();

    let runner = PartitionRunner::new(config);
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx).await;

    let err = runner.run(df).await.unwrap_err();
    assert!(matches!(err, RefDataError::Connection { .. }));
}

#[tokio::test]
async fn test_saved_states_reduce_to_the_same_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSystemStateStore::new(dir.path()).unwrap());
    let config = config();
    let expected = sequential(&config);

    let runner = PartitionRunner::new(config)
        .with_target_partitions(3)
        .with_state_store(store.clone());
    let ctx = runner.session_context();
    let df = partitioned_frame(&ctx).await;
    let result = runner.run(df).await.unwrap();

    let partitions = store.list_partitions().await.unwrap();
    assert_eq!(partitions.len(), result.metadata.partitions);
    assert_eq!(store.load_and_reduce(&partitions).await.unwrap(), expected);
}
