//! End to end tests of the engine lifecycle: configuration, row processing,
//! connection management and reduction.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{text_row, ScriptedCatalog};
use term_refdata::prelude::*;
use term_refdata::reference::CatalogRef;

fn email_config() -> MatcherConfig {
    MatcherConfig::builder()
        .column(Column::utf8("email"))
        .dictionary(
            Dictionary::new("knownDomains", ["gmail.com", "yahoo.com"])
                .with_normalization(vec![Normalization::DomainPart]),
        )
        .build()
        .unwrap()
}

#[test]
fn test_schema_size_is_columns_times_sources() {
    for (columns, dictionaries, catalogs, patterns) in
        [(1, 1, 0, 0), (2, 1, 1, 1), (3, 0, 2, 0), (4, 2, 0, 3)]
    {
        let mut builder = MatcherConfig::builder();
        for c in 0..columns {
            builder = builder.column(Column::utf8(format!("c{c}")));
        }
        for d in 0..dictionaries {
            builder = builder.dictionary(Dictionary::new(format!("d{d}"), ["x"]));
        }
        for s in 0..catalogs {
            builder = builder.synonym_catalog(Arc::new(SimpleSynonymCatalog::new(format!("s{s}"))));
        }
        for p in 0..patterns {
            builder = builder.string_pattern(StringPattern::regex(format!("p{p}"), "x").unwrap());
        }
        let config = builder.build().unwrap();
        let engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
        assert_eq!(
            engine.schema().len(),
            columns * (dictionaries + catalogs + patterns)
        );
        assert!(engine.shutdown().is_clean());
    }
}

#[test]
fn test_known_domains_scenario() {
    let mut engine = Engine::initialize(&email_config(), &ConnectionContext::new()).unwrap();

    let outcomes = engine.process_row(&text_row("email", "user@gmail.com")).unwrap();
    assert_eq!(outcomes, vec![MatchOutcome::True]);
    let outcomes = engine.process_row(&text_row("email", "user@other.org")).unwrap();
    assert_eq!(outcomes, vec![MatchOutcome::False]);

    let result = engine.finish().unwrap();
    let stats = result.column("email in knownDomains").unwrap();
    assert_eq!(stats.true_count, 1);
    assert_eq!(stats.false_count, 1);
    assert_eq!(stats.unavailable_count, 0);
}

#[test]
fn test_city_aliases_scenario() {
    let catalog = ScriptedCatalog::new("cityAliases").with_synonyms("New York", &["NY"]);
    let counters = Arc::clone(&catalog.counters);
    let config = MatcherConfig::builder()
        .column(Column::utf8("city"))
        .synonym_catalog(Arc::new(catalog))
        .build()
        .unwrap();

    let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
    assert_eq!(counters.opened(), 1);
    assert_eq!(
        engine.process_row(&text_row("city", "NY")).unwrap(),
        vec![MatchOutcome::True]
    );
    assert_eq!(
        engine.process_row(&text_row("city", "XX")).unwrap(),
        vec![MatchOutcome::False]
    );

    let report = engine.shutdown();
    assert!(report.is_clean());
    assert_eq!(counters.closed(), 1);
    assert_eq!(report.state.counts("city in cityAliases").unwrap().true_count, 1);
}

#[test]
fn test_no_sources_fails_before_any_row() {
    let err = MatcherConfig::builder()
        .column(Column::utf8("email"))
        .build()
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("dictionaries"));
    assert!(err.to_string().contains("string_patterns"));
}

#[test]
fn test_transient_failure_on_row_five_of_ten() {
    let catalog = ScriptedCatalog::new("cityAliases")
        .with_synonyms("New York", &["NY"])
        .failing_lookup_at(5);
    let config = MatcherConfig::builder()
        .column(Column::utf8("city"))
        .synonym_catalog(Arc::new(catalog))
        .build()
        .unwrap();

    let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
    for i in 1..=10 {
        let city = if i % 2 == 0 { "NY" } else { "XX" };
        let outcomes = engine.process_row(&text_row("city", city)).unwrap();
        if i == 5 {
            assert_eq!(outcomes, vec![MatchOutcome::Unavailable]);
        } else {
            assert_ne!(outcomes, vec![MatchOutcome::Unavailable], "row {i}");
        }
    }

    let result = engine.finish().unwrap();
    let stats = result.column("city in cityAliases").unwrap();
    assert_eq!(stats.unavailable_count, 1);
    assert_eq!(stats.true_count, 5);
    assert_eq!(stats.false_count, 4);
    assert_eq!(result.rows_processed, 10);
}

#[test]
fn test_counts_sum_to_rows_processed() {
    let catalog = ScriptedCatalog::new("aliases")
        .with_synonyms("Paris", &["PAR"])
        .failing_lookup_at(3);
    let config = MatcherConfig::builder()
        .column(Column::utf8("city"))
        .column(Column::utf8("code"))
        .dictionary(Dictionary::new("capitals", ["Paris"]))
        .synonym_catalog(Arc::new(catalog))
        .string_pattern(StringPattern::simple("code", "AAA").unwrap())
        .build()
        .unwrap();

    let rows = vec![
        HashMap::from([
            ("city".to_string(), Value::from("Paris")),
            ("code".to_string(), Value::from("PAR")),
        ]),
        HashMap::from([("city".to_string(), Value::Null)]),
        HashMap::from([
            ("city".to_string(), Value::from("Lyon")),
            ("code".to_string(), Value::from(69i64)),
        ]),
        HashMap::new(),
    ];

    let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
    for row in &rows {
        let outcomes = engine.process_row(row).unwrap();
        assert_eq!(outcomes.len(), engine.schema().len());
    }

    let state = engine.shutdown().state;
    for (_, counts) in state.iter() {
        assert_eq!(counts.total(), rows.len() as u64);
    }
}

#[test]
fn test_open_failure_releases_opened_connections() {
    let first = ScriptedCatalog::new("first");
    let first_counters = Arc::clone(&first.counters);
    let third = ScriptedCatalog::new("third");
    let third_counters = Arc::clone(&third.counters);

    let catalogs: Vec<CatalogRef> = vec![
        Arc::new(first),
        Arc::new(ScriptedCatalog::new("second").failing_open()),
        Arc::new(third),
    ];
    let config = catalogs
        .into_iter()
        .fold(MatcherConfig::builder().column(Column::utf8("a")), |b, c| {
            b.synonym_catalog(c)
        })
        .build()
        .unwrap();

    let err = Engine::initialize(&config, &ConnectionContext::new()).unwrap_err();
    assert!(matches!(err, RefDataError::Connection { ref catalog, .. } if catalog == "second"));
    assert_eq!(first_counters.opened(), 1);
    assert_eq!(first_counters.closed(), 1);
    assert_eq!(third_counters.opened(), 0);
}

#[test]
fn test_shutdown_attempts_every_close() {
    let catalogs = [
        ScriptedCatalog::new("a"),
        ScriptedCatalog::new("b").failing_close(),
        ScriptedCatalog::new("c"),
    ];
    let counters: Vec<_> = catalogs.iter().map(|c| Arc::clone(&c.counters)).collect();
    let config = catalogs
        .into_iter()
        .fold(MatcherConfig::builder().column(Column::utf8("x")), |b, c| {
            b.synonym_catalog(Arc::new(c))
        })
        .build()
        .unwrap();

    let engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
    let report = engine.shutdown();

    assert_eq!(report.release_errors.len(), 1);
    assert_eq!(report.release_errors.iter().next().unwrap().catalog, "b");
    assert!(counters.iter().all(|c| c.closed() == 1));

    let result = report.into_result().unwrap();
    assert!(result.has_release_errors());
}

#[test]
fn test_drop_releases_connections() {
    let catalog = ScriptedCatalog::new("aliases");
    let counters = Arc::clone(&catalog.counters);
    let config = MatcherConfig::builder()
        .column(Column::utf8("x"))
        .synonym_catalog(Arc::new(catalog))
        .build()
        .unwrap();

    {
        let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
        engine.process_row(&text_row("x", "y")).unwrap();
    }

    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.closed(), 1);
}

#[test]
fn test_one_connection_per_catalog_shared_across_columns() {
    let catalog = ScriptedCatalog::new("aliases").with_synonyms("Paris", &["PAR"]);
    let counters = Arc::clone(&catalog.counters);
    let config = MatcherConfig::builder()
        .columns([Column::utf8("from"), Column::utf8("to"), Column::utf8("via")])
        .synonym_catalog(Arc::new(catalog))
        .build()
        .unwrap();

    let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
    let row = HashMap::from([
        ("from".to_string(), Value::from("PAR")),
        ("to".to_string(), Value::from("Paris")),
        ("via".to_string(), Value::from("LYS")),
    ]);
    use MatchOutcome::{False as F, True as T};
    assert_eq!(engine.process_row(&row).unwrap(), vec![T, T, F]);
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.lookups(), 3);

    engine.shutdown();
    assert_eq!(counters.closed(), 1);
}

#[test]
fn test_two_partitions_merge_equals_sequential() {
    let config = MatcherConfig::builder()
        .column(Column::utf8("email"))
        .dictionary(
            Dictionary::new("knownDomains", ["gmail.com", "yahoo.com"])
                .with_normalization(vec![Normalization::DomainPart]),
        )
        .string_pattern(StringPattern::simple("simpleEmail", "aaaa@aaaa.aa").unwrap())
        .aggregate_options(AggregateOptions::full())
        .build()
        .unwrap();
    let emails = [
        "a@gmail.com",
        "b@yahoo.com",
        "not an email",
        "c@corp.example",
        "d@gmail.com",
        "e@other.org",
    ];

    let run = |values: &[&str]| {
        let mut engine = Engine::initialize(&config, &ConnectionContext::new()).unwrap();
        for value in values {
            engine.process_row(&text_row("email", value)).unwrap();
        }
        engine.shutdown().state
    };

    let sequential = run(&emails);
    let left = run(&emails[..2]);
    let right = run(&emails[2..]);

    assert_eq!(left.merge(&right).unwrap(), sequential);
    assert_eq!(right.merge(&left).unwrap(), sequential);
    assert_eq!(reduce([&left, &right]).unwrap(), sequential);
}

#[test]
fn test_text_file_catalog_with_base_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("cities.txt"),
        "# master,synonyms\nNew York,NY,NYC\n\nLos Angeles,LA\n",
    )
    .unwrap();

    let definition = ReferenceDataDefinition::from_json_str(
        r#"{
            "columns": [{ "name": "city" }],
            "synonym_catalogs": [{ "name": "cities", "path": "cities.txt" }]
        }"#,
    )
    .unwrap();
    let config = definition.into_config().unwrap();
    let ctx = ConnectionContext::new().with_base_path(dir.path());

    let mut engine = Engine::initialize(&config, &ctx).unwrap();
    for city in ["NYC", "LA", "Chicago", "Los Angeles"] {
        engine.process_row(&text_row("city", city)).unwrap();
    }
    let stats = engine.finish().unwrap();
    let cities = stats.column("city in cities").unwrap();
    assert_eq!((cities.true_count, cities.false_count), (3, 1));

    let err = Engine::initialize(&config, &ConnectionContext::new()).unwrap_err();
    assert!(matches!(err, RefDataError::Connection { .. }));
}
