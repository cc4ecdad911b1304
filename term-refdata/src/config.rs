//! Matcher configuration: the programmatic builder and the JSON definition
//! format.
//!
//! A [`MatcherConfig`] is immutable once built and can be shared by every
//! partition of a run. It is either assembled in code:
//!
//! ```rust
//! use std::sync::Arc;
//! use term_refdata::config::MatcherConfig;
//! use term_refdata::reference::{Dictionary, SimpleSynonymCatalog, StringPattern};
//! use term_refdata::value::Column;
//!
//! let config = MatcherConfig::builder()
//!     .column(Column::utf8("city"))
//!     .dictionary(Dictionary::new("capitals", ["Paris", "Berlin"]))
//!     .synonym_catalog(Arc::new(
//!         SimpleSynonymCatalog::new("cityAliases").with_synonyms("New York", ["NYC"]),
//!     ))
//!     .string_pattern(StringPattern::simple("word", "Aaaa").unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.schema().unwrap().len(), 3);
//! ```
//!
//! or loaded from a [`ReferenceDataDefinition`] document:
//!
//! ```json
//! {
//!   "columns": [{ "name": "email" }, { "name": "age", "type": "int64" }],
//!   "dictionaries": [
//!     { "name": "knownDomains", "values": ["gmail.com"], "normalization": ["domain_part", "lowercase"] }
//!   ],
//!   "synonym_catalogs": [
//!     { "name": "cityAliases", "entries": { "New York": ["NYC", "Big Apple"] } },
//!     { "name": "countries", "path": "countries.txt", "case_sensitive": false }
//!   ],
//!   "string_patterns": [
//!     { "name": "usZip", "type": "regex", "expression": "\\d{5}" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateOptions;
use crate::error::{RefDataError, Result};
use crate::logging::LogConfig;
use crate::matching::OutputSchema;
use crate::reference::{
    CatalogRef, Dictionary, Normalization, PatternDefinition, SimpleSynonymCatalog, StringPattern,
    TextFileSynonymCatalog,
};
use crate::value::Column;

/// Validated configuration of a matching run.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    columns: Vec<Column>,
    dictionaries: Vec<Dictionary>,
    synonym_catalogs: Vec<CatalogRef>,
    string_patterns: Vec<StringPattern>,
    aggregate_options: AggregateOptions,
    log_config: LogConfig,
}

impl MatcherConfig {
    pub fn builder() -> MatcherConfigBuilder {
        MatcherConfigBuilder::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn dictionaries(&self) -> &[Dictionary] {
        &self.dictionaries
    }

    pub fn synonym_catalogs(&self) -> &[CatalogRef] {
        &self.synonym_catalogs
    }

    pub fn string_patterns(&self) -> &[StringPattern] {
        &self.string_patterns
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        self.aggregate_options
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }

    /// Derives the output schema without opening any connection.
    pub fn schema(&self) -> Result<OutputSchema> {
        OutputSchema::derive(
            &self.columns,
            &self.dictionaries,
            &self.synonym_catalogs,
            &self.string_patterns,
        )
    }
}

/// Builder for [`MatcherConfig`].
///
/// Sources keep the order they were added in; that order, together with the
/// column order, fixes the order of output columns.
#[derive(Debug, Default)]
pub struct MatcherConfigBuilder {
    columns: Vec<Column>,
    dictionaries: Vec<Dictionary>,
    synonym_catalogs: Vec<CatalogRef>,
    string_patterns: Vec<StringPattern>,
    aggregate_options: AggregateOptions,
    log_config: LogConfig,
}

impl MatcherConfigBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = Column>,
    {
        self.columns.extend(columns);
        self
    }

    pub fn dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionaries.push(dictionary);
        self
    }

    pub fn synonym_catalog(mut self, catalog: CatalogRef) -> Self {
        self.synonym_catalogs.push(catalog);
        self
    }

    pub fn string_pattern(mut self, pattern: StringPattern) -> Self {
        self.string_patterns.push(pattern);
        self
    }

    /// Enables co-occurrence and value-combination tracking.
    pub fn aggregate_options(mut self, options: AggregateOptions) -> Self {
        self.aggregate_options = options;
        self
    }

    pub fn log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no source is configured, when no
    /// column is selected, or when two output columns would share a name.
    pub fn build(self) -> Result<MatcherConfig> {
        let config = MatcherConfig {
            columns: self.columns,
            dictionaries: self.dictionaries,
            synonym_catalogs: self.synonym_catalogs,
            string_patterns: self.string_patterns,
            aggregate_options: self.aggregate_options,
            log_config: self.log_config,
        };
        config.schema()?;
        Ok(config)
    }
}

/// A column declaration. `type` defaults to `utf8`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl ColumnDefinition {
    fn to_column(&self) -> Result<Column> {
        let data_type = match self.data_type.as_deref() {
            None => DataType::Utf8,
            Some(name) => parse_data_type(name).ok_or_else(|| {
                RefDataError::configuration(format!(
                    "Unknown type '{name}' for column '{}'",
                    self.name
                ))
            })?,
        };
        Ok(Column::new(&self.name, data_type))
    }
}

fn parse_data_type(name: &str) -> Option<DataType> {
    let data_type = match name.to_ascii_lowercase().as_str() {
        "utf8" | "string" | "text" => DataType::Utf8,
        "large_utf8" => DataType::LargeUtf8,
        "bool" | "boolean" => DataType::Boolean,
        "int32" => DataType::Int32,
        "int64" | "integer" => DataType::Int64,
        "float32" => DataType::Float32,
        "float64" | "double" => DataType::Float64,
        _ => return DataType::from_str(name).ok(),
    };
    Some(data_type)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryDefinition {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub normalization: Vec<Normalization>,
}

/// A synonym catalog declaration: either inline `entries` (master term to
/// synonyms) or a text file `path`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymCatalogDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

impl SynonymCatalogDefinition {
    fn to_catalog(&self) -> Result<CatalogRef> {
        match (&self.entries, &self.path) {
            (Some(entries), None) => {
                let catalog = entries.iter().fold(
                    SimpleSynonymCatalog::new(&self.name),
                    |catalog, (master, synonyms)| catalog.with_synonyms(master, synonyms),
                );
                Ok(Arc::new(catalog.case_sensitive(self.case_sensitive)))
            }
            (None, Some(path)) => Ok(Arc::new(
                TextFileSynonymCatalog::new(&self.name, path).case_sensitive(self.case_sensitive),
            )),
            _ => Err(RefDataError::configuration(format!(
                "Synonym catalog '{}' must declare exactly one of 'entries' or 'path'",
                self.name
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringPatternDefinition {
    pub name: String,
    #[serde(flatten)]
    pub pattern: PatternDefinition,
}

/// Serializable declaration of columns and reference sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDataDefinition {
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub dictionaries: Vec<DictionaryDefinition>,
    #[serde(default)]
    pub synonym_catalogs: Vec<SynonymCatalogDefinition>,
    #[serde(default)]
    pub string_patterns: Vec<StringPatternDefinition>,
    #[serde(default)]
    pub aggregate_options: AggregateOptions,
}

impl ReferenceDataDefinition {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compiles patterns, instantiates catalogs and validates the result.
    ///
    /// Relative catalog file paths are resolved against the
    /// [`ConnectionContext`](crate::reference::ConnectionContext) when the
    /// connection is opened, not here.
    pub fn into_config(self) -> Result<MatcherConfig> {
        let mut builder = MatcherConfig::builder().aggregate_options(self.aggregate_options);

        for column in &self.columns {
            builder = builder.column(column.to_column()?);
        }
        for dictionary in self.dictionaries {
            builder = builder.dictionary(
                Dictionary::new(dictionary.name, dictionary.values)
                    .with_normalization(dictionary.normalization),
            );
        }
        for catalog in &self.synonym_catalogs {
            builder = builder.synonym_catalog(catalog.to_catalog()?);
        }
        for pattern in self.string_patterns {
            builder = builder.string_pattern(StringPattern::from_definition(
                pattern.name,
                pattern.pattern,
            )?);
        }

        builder.build()
    }
}
