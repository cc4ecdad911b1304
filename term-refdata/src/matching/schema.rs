//! Output schema derivation.
//!
//! The schema is the ordered list of boolean output columns, one per
//! (column, source) pair. It is derived from configuration alone in a single
//! pass, and both the matchers and the aggregate state index into it by
//! position.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RefDataError, Result};
use crate::reference::{CatalogRef, Dictionary, SourceKind, StringPattern};
use crate::value::Column;

/// Builds the name of the output column pairing `column` with `source`.
pub fn output_name(column: &str, source: &str) -> String {
    format!("{column} in {source}")
}

/// One boolean output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputColumnSpec {
    /// Derived name, `"<column> in <source>"`.
    pub name: String,
    /// Name of the analyzed column.
    pub column: String,
    /// Kind of the producing source.
    pub kind: SourceKind,
    /// Name of the producing source.
    pub source: String,
    /// Position of the analyzed column in the configured column list.
    pub column_index: usize,
    /// Position of the source within the configured list of its kind.
    pub source_index: usize,
}

/// The ordered list of output columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    columns: Vec<OutputColumnSpec>,
}

impl OutputSchema {
    /// Derives the schema for the given columns and sources.
    ///
    /// For every column, in column order, one output per dictionary, then one per
    /// synonym catalog, then one per string pattern, each in configuration order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no columns are given, when all three
    /// source lists are empty, or when two outputs would share a name.
    ///
    /// # Example
    ///
    /// ```rust
    /// use term_refdata::matching::OutputSchema;
    /// use term_refdata::reference::{Dictionary, StringPattern};
    /// use term_refdata::value::Column;
    ///
    /// let schema = OutputSchema::derive(
    ///     &[Column::utf8("email"), Column::utf8("city")],
    ///     &[Dictionary::new("knownDomains", ["gmail.com"])],
    ///     &[],
    ///     &[StringPattern::regex("nonEmpty", ".+").unwrap()],
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(
    ///     schema.names(),
    ///     vec![
    ///         "email in knownDomains",
    ///         "email in nonEmpty",
    ///         "city in knownDomains",
    ///         "city in nonEmpty",
    ///     ]
    /// );
    /// ```
    pub fn derive(
        columns: &[Column],
        dictionaries: &[Dictionary],
        synonym_catalogs: &[CatalogRef],
        string_patterns: &[StringPattern],
    ) -> Result<Self> {
        validate_sources(
            dictionaries.len(),
            synonym_catalogs.len(),
            string_patterns.len(),
        )?;
        if columns.is_empty() {
            return Err(RefDataError::configuration("No columns selected"));
        }

        let dictionary_names: Vec<&str> = dictionaries.iter().map(|d| d.name()).collect();
        let catalog_names: Vec<&str> = synonym_catalogs.iter().map(|c| c.name()).collect();
        let pattern_names: Vec<&str> = string_patterns.iter().map(|p| p.name()).collect();
        let groups = [
            (SourceKind::Dictionary, &dictionary_names),
            (SourceKind::SynonymCatalog, &catalog_names),
            (SourceKind::StringPattern, &pattern_names),
        ];

        let width = dictionary_names.len() + catalog_names.len() + pattern_names.len();
        let mut specs = Vec::with_capacity(columns.len() * width);
        let mut seen = HashSet::with_capacity(columns.len() * width);

        for (column_index, column) in columns.iter().enumerate() {
            for (kind, names) in groups {
                for (source_index, source) in names.iter().enumerate() {
                    let name = output_name(column.name(), source);
                    if !seen.insert(name.clone()) {
                        return Err(RefDataError::configuration(format!(
                            "Duplicate output column '{name}': column and source names must be unique"
                        )));
                    }
                    specs.push(OutputColumnSpec {
                        name,
                        column: column.name().to_string(),
                        kind,
                        source: source.to_string(),
                        column_index,
                        source_index,
                    });
                }
            }
        }

        Ok(Self { columns: specs })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&OutputColumnSpec> {
        self.columns.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputColumnSpec> {
        self.columns.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the position of the output column with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

impl fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}

/// Checks that at least one source kind is configured.
pub(crate) fn validate_sources(dictionaries: usize, catalogs: usize, patterns: usize) -> Result<()> {
    if dictionaries == 0 && catalogs == 0 && patterns == 0 {
        return Err(RefDataError::configuration(
            "No dictionaries, synonym catalogs or string patterns selected: \
             dictionaries, synonym_catalogs and string_patterns are all empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::SimpleSynonymCatalog;
    use std::sync::Arc;

    fn catalogs(names: &[&str]) -> Vec<CatalogRef> {
        names
            .iter()
            .map(|n| Arc::new(SimpleSynonymCatalog::new(*n)) as CatalogRef)
            .collect()
    }

    #[test]
    fn test_schema_order_and_length() {
        let columns = vec![Column::utf8("a"), Column::utf8("b")];
        let dictionaries = vec![
            Dictionary::new("d1", ["x"]),
            Dictionary::new("d2", ["y"]),
        ];
        let synonyms = catalogs(&["s1"]);
        let patterns = vec![StringPattern::regex("p1", ".*").unwrap()];

        let schema = OutputSchema::derive(&columns, &dictionaries, &synonyms, &patterns).unwrap();
        assert_eq!(schema.len(), 2 * (2 + 1 + 1));
        assert_eq!(
            schema.names(),
            vec![
                "a in d1", "a in d2", "a in s1", "a in p1", "b in d1", "b in d2", "b in s1",
                "b in p1"
            ]
        );

        let spec = schema.get(6).unwrap();
        assert_eq!(spec.column, "b");
        assert_eq!(spec.kind, SourceKind::SynonymCatalog);
        assert_eq!(spec.column_index, 1);
        assert_eq!(spec.source_index, 0);
        assert_eq!(schema.index_of("b in p1"), Some(7));
        assert_eq!(schema.index_of("c in p1"), None);
    }

    #[test]
    fn test_schema_is_reproducible() {
        let columns = vec![Column::utf8("city")];
        let synonyms = catalogs(&["aliases", "codes"]);
        let first = OutputSchema::derive(&columns, &[], &synonyms, &[]).unwrap();
        let second = OutputSchema::derive(&columns, &[], &synonyms, &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "[city in aliases, city in codes]");
    }

    #[test]
    fn test_no_sources_is_configuration_error() {
        let err = OutputSchema::derive(&[Column::utf8("a")], &[], &[], &[]).unwrap_err();
        assert!(err.is_configuration());
        let message = err.to_string();
        assert!(message.contains("dictionaries"));
        assert!(message.contains("synonym_catalogs"));
        assert!(message.contains("string_patterns"));
    }

    #[test]
    fn test_no_columns_is_configuration_error() {
        let err = OutputSchema::derive(&[], &[Dictionary::new("d", ["x"])], &[], &[]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = OutputSchema::derive(
            &[Column::utf8("a")],
            &[Dictionary::new("same", ["x"])],
            &[],
            &[StringPattern::regex("same", "x").unwrap()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("a in same"));
    }
}
