//! Prelude for commonly used types and traits in term-refdata.

pub use crate::aggregate::{reduce, AggregateOptions, AggregateResult, AggregateState, StateStore};
pub use crate::config::{MatcherConfig, ReferenceDataDefinition};
pub use crate::engine::{Engine, ShutdownReport};
pub use crate::error::{RefDataError, ReleaseErrors, Result};
pub use crate::formatters::{
    FormatterConfig, HumanFormatter, JsonFormatter, MarkdownFormatter, ResultFormatter,
};
pub use crate::logging::LogConfig;
pub use crate::matching::{MatchOutcome, OutputSchema};
pub use crate::partition::PartitionRunner;
pub use crate::reference::{
    ConnectionContext, Dictionary, Normalization, SimpleSynonymCatalog, StringPattern,
    SynonymCatalog, SynonymCatalogConnection, TextFileSynonymCatalog,
};
pub use crate::value::{Column, InputRow, Value};
