//! Reference data sources consumed by the matchers.
//!
//! Three kinds of source are supported, and the set is closed:
//!
//! - [`Dictionary`]: membership test against a set of strings
//! - [`SynonymCatalog`]: lookup of a canonical master term through an open
//!   [`SynonymCatalogConnection`]
//! - [`StringPattern`]: conformance test against a regex or token template

pub mod dictionary;
pub mod pattern;
pub mod synonym;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use dictionary::{Dictionary, Normalization};
pub use pattern::{PatternDefinition, StringPattern};
pub use synonym::{
    CatalogRef, ConnectionContext, SimpleSynonymCatalog, SynonymCatalog,
    SynonymCatalogConnection, TextFileSynonymCatalog,
};

/// The kind of a reference source. Also the order in which kinds are laid out
/// per column in the output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Dictionary,
    SynonymCatalog,
    StringPattern,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Dictionary => "dictionary",
            SourceKind::SynonymCatalog => "synonym_catalog",
            SourceKind::StringPattern => "string_pattern",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured reference source of any kind.
#[derive(Debug, Clone)]
pub enum ReferenceSource {
    Dictionary(Dictionary),
    SynonymCatalog(CatalogRef),
    StringPattern(StringPattern),
}

impl ReferenceSource {
    pub fn name(&self) -> &str {
        match self {
            ReferenceSource::Dictionary(d) => d.name(),
            ReferenceSource::SynonymCatalog(c) => c.name(),
            ReferenceSource::StringPattern(p) => p.name(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            ReferenceSource::Dictionary(_) => SourceKind::Dictionary,
            ReferenceSource::SynonymCatalog(_) => SourceKind::SynonymCatalog,
            ReferenceSource::StringPattern(_) => SourceKind::StringPattern,
        }
    }
}

impl From<Dictionary> for ReferenceSource {
    fn from(value: Dictionary) -> Self {
        ReferenceSource::Dictionary(value)
    }
}

impl From<CatalogRef> for ReferenceSource {
    fn from(value: CatalogRef) -> Self {
        ReferenceSource::SynonymCatalog(value)
    }
}

impl From<StringPattern> for ReferenceSource {
    fn from(value: StringPattern) -> Self {
        ReferenceSource::StringPattern(value)
    }
}
