//! Construction of the matcher pipeline from configuration.

use std::sync::Arc;

use tracing::{info, instrument};

use super::connections::{ConnectionArena, ConnectionId};
use super::schema::OutputSchema;
use crate::error::{RefDataError, Result};
use crate::logging::LogConfig;
use crate::reference::{CatalogRef, ConnectionContext, Dictionary, SourceKind, StringPattern};
use crate::value::Column;

/// Matches a column against one dictionary.
#[derive(Debug, Clone)]
pub struct DictionaryMatcher {
    pub(crate) dictionary: Arc<Dictionary>,
    pub(crate) output: usize,
}

/// Looks up a column's values in one synonym catalog.
///
/// The matcher references the catalog connection, it does not own it.
#[derive(Debug, Clone)]
pub struct SynonymMatcher {
    pub(crate) catalog: String,
    pub(crate) connection: ConnectionId,
    pub(crate) output: usize,
}

/// Tests a column's values against one string pattern.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pub(crate) pattern: Arc<StringPattern>,
    pub(crate) output: usize,
}

/// All matchers bound to one analyzed column, grouped by source kind.
#[derive(Debug, Clone)]
pub struct ColumnMatchers {
    pub(crate) column: Column,
    pub(crate) dictionaries: Vec<DictionaryMatcher>,
    pub(crate) synonyms: Vec<SynonymMatcher>,
    pub(crate) patterns: Vec<PatternMatcher>,
}

impl ColumnMatchers {
    fn new(column: Column) -> Self {
        Self {
            column,
            dictionaries: Vec::new(),
            synonyms: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Number of output slots produced for this column.
    pub fn width(&self) -> usize {
        self.dictionaries.len() + self.synonyms.len() + self.patterns.len()
    }
}

/// The matchers of every analyzed column, in column order.
#[derive(Debug, Clone)]
pub struct MatcherSet {
    pub(crate) columns: Vec<ColumnMatchers>,
    pub(crate) width: usize,
}

impl MatcherSet {
    pub fn columns(&self) -> &[ColumnMatchers] {
        &self.columns
    }

    /// Total number of output slots.
    pub fn width(&self) -> usize {
        self.width
    }
}

/// Everything needed to evaluate rows: schema, matchers and the connections
/// they reference.
#[derive(Debug)]
pub struct MatcherPipeline {
    pub(crate) schema: OutputSchema,
    pub(crate) matchers: MatcherSet,
    pub(crate) connections: ConnectionArena,
    pub(crate) log: LogConfig,
}

impl MatcherPipeline {
    /// Builds the pipeline: derives the schema, opens one connection per synonym
    /// catalog, and binds one matcher per output column.
    ///
    /// Nothing is opened when the configuration is invalid. When a catalog fails
    /// to open, the connections opened before it are released and the error is
    /// returned. On success the pipeline owns the connections; release them with
    /// [`MatcherPipeline::close`].
    #[instrument(skip_all, fields(columns = columns.len()))]
    pub fn build(
        columns: &[Column],
        dictionaries: &[Dictionary],
        synonym_catalogs: &[CatalogRef],
        string_patterns: &[StringPattern],
        ctx: &ConnectionContext,
    ) -> Result<Self> {
        let schema = OutputSchema::derive(columns, dictionaries, synonym_catalogs, string_patterns)?;

        let dictionaries: Vec<Arc<Dictionary>> =
            dictionaries.iter().cloned().map(Arc::new).collect();
        let patterns: Vec<Arc<StringPattern>> =
            string_patterns.iter().cloned().map(Arc::new).collect();
        let connections = ConnectionArena::open_all(synonym_catalogs, ctx)?;

        let mut bound: Vec<ColumnMatchers> =
            columns.iter().cloned().map(ColumnMatchers::new).collect();

        for (output, spec) in schema.iter().enumerate() {
            let target = &mut bound[spec.column_index];
            match spec.kind {
                SourceKind::Dictionary => target.dictionaries.push(DictionaryMatcher {
                    dictionary: dictionaries[spec.source_index].clone(),
                    output,
                }),
                SourceKind::SynonymCatalog => {
                    let connection = connections.id_of(&spec.source).ok_or_else(|| {
                        RefDataError::connection(&spec.source, "no open connection for catalog")
                    })?;
                    target.synonyms.push(SynonymMatcher {
                        catalog: spec.source.clone(),
                        connection,
                        output,
                    });
                }
                SourceKind::StringPattern => target.patterns.push(PatternMatcher {
                    pattern: patterns[spec.source_index].clone(),
                    output,
                }),
            }
        }

        info!(
            outputs = schema.len(),
            connections = connections.len(),
            "Built matcher pipeline"
        );

        Ok(Self {
            matchers: MatcherSet {
                columns: bound,
                width: schema.len(),
            },
            schema,
            connections,
            log: LogConfig::default(),
        })
    }

    /// Sets the logging configuration used during evaluation.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn matchers(&self) -> &MatcherSet {
        &self.matchers
    }

    pub fn connections(&self) -> &ConnectionArena {
        &self.connections
    }

    /// Releases every connection, collecting failures.
    pub fn close(&mut self) -> crate::error::ReleaseErrors {
        self.connections.close_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::SimpleSynonymCatalog;

    #[test]
    fn test_build_binds_one_matcher_per_output() {
        let columns = vec![Column::utf8("city"), Column::utf8("country")];
        let dictionaries = vec![Dictionary::new("capitals", ["Paris"])];
        let catalogs: Vec<CatalogRef> = vec![
            Arc::new(SimpleSynonymCatalog::new("aliases")),
            Arc::new(SimpleSynonymCatalog::new("codes")),
        ];
        let patterns = vec![StringPattern::regex("word", r"\w+").unwrap()];

        let mut pipeline = MatcherPipeline::build(
            &columns,
            &dictionaries,
            &catalogs,
            &patterns,
            &ConnectionContext::new(),
        )
        .unwrap();

        assert_eq!(pipeline.schema().len(), 8);
        assert_eq!(pipeline.matchers().width(), 8);
        // one connection per catalog, shared by both columns
        assert_eq!(pipeline.connections().len(), 2);

        let country = &pipeline.matchers().columns()[1];
        assert_eq!(country.column().name(), "country");
        assert_eq!(country.width(), 4);
        assert_eq!(country.dictionaries[0].output, 4);
        assert_eq!(country.synonyms[0].output, 5);
        assert_eq!(country.synonyms[1].output, 6);
        assert_eq!(country.synonyms[1].connection.index(), 1);
        assert_eq!(country.patterns[0].output, 7);

        assert!(pipeline.close().is_empty());
        assert_eq!(pipeline.connections().open_count(), 0);
    }

    #[test]
    fn test_build_rejects_empty_sources() {
        let err = MatcherPipeline::build(
            &[Column::utf8("a")],
            &[],
            &[],
            &[],
            &ConnectionContext::new(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
