//! Synonym catalogs: lookups from a synonym term to its canonical master term.
//!
//! A catalog itself is just configuration. Lookups go through a
//! [`SynonymCatalogConnection`] opened with [`SynonymCatalog::open_connection`],
//! which must be released with [`SynonymCatalogConnection::close`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{RefDataError, Result};

/// Context handed to catalogs when they open a connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionContext {
    base_path: Option<PathBuf>,
    partition: Option<String>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory that relative catalog file paths are resolved against.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Label of the partition the connection is opened for, used in logs.
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// Resolves `path` against the base path when it is relative.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// A named synonym catalog.
pub trait SynonymCatalog: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Opens a connection for lookups. The caller owns the connection and must
    /// close it.
    fn open_connection(&self, ctx: &ConnectionContext)
        -> Result<Box<dyn SynonymCatalogConnection>>;
}

/// An open, stateful connection to a synonym catalog.
///
/// A connection is used by a single partition at a time and is never shared
/// between threads concurrently.
pub trait SynonymCatalogConnection: Send + Debug {
    /// Returns the master term for `term`, `Ok(None)` when the catalog does not
    /// know the term, or an error when the lookup could not be performed.
    fn master_term(&mut self, term: &str) -> Result<Option<String>>;

    /// Releases the connection. Called at most once.
    fn close(&mut self) -> Result<()>;
}

/// Shared handle to a configured catalog.
pub type CatalogRef = Arc<dyn SynonymCatalog>;

/// Builds the synonym → master index. Master terms resolve to themselves.
fn build_index<'a, I>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
{
    let mut index = HashMap::new();
    for (master, synonyms) in entries {
        index.insert(master.clone(), master.clone());
        for synonym in synonyms {
            index.insert(synonym.clone(), master.clone());
        }
    }
    index
}

/// An in-memory synonym catalog.
///
/// # Example
///
/// ```rust
/// use term_refdata::reference::{ConnectionContext, SimpleSynonymCatalog, SynonymCatalog};
///
/// let catalog = SimpleSynonymCatalog::new("cityAliases")
///     .with_synonyms("New York", ["NY", "NYC"]);
///
/// let mut conn = catalog.open_connection(&ConnectionContext::new()).unwrap();
/// assert_eq!(conn.master_term("NY").unwrap().as_deref(), Some("New York"));
/// assert_eq!(conn.master_term("XX").unwrap(), None);
/// conn.close().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimpleSynonymCatalog {
    name: String,
    entries: Vec<(String, Vec<String>)>,
    case_sensitive: bool,
}

impl SimpleSynonymCatalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            case_sensitive: true,
        }
    }

    /// Adds a master term with its synonyms.
    pub fn with_synonyms<I, S>(mut self, master: impl Into<String>, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push((
            master.into(),
            synonyms.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

impl SynonymCatalog for SimpleSynonymCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_connection(
        &self,
        _ctx: &ConnectionContext,
    ) -> Result<Box<dyn SynonymCatalogConnection>> {
        let index = build_index(self.entries.iter().map(|(m, s)| (m, s)));
        Ok(Box::new(IndexConnection::new(index, self.case_sensitive)))
    }
}

/// A synonym catalog backed by a text file.
///
/// Each non-empty line that does not start with `#` holds a master term
/// followed by its synonyms, comma separated: `New York,NY,NYC`. The file is
/// read when a connection is opened.
#[derive(Debug, Clone)]
pub struct TextFileSynonymCatalog {
    name: String,
    path: PathBuf,
    case_sensitive: bool,
}

impl TextFileSynonymCatalog {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            case_sensitive: true,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(contents: &str) -> Vec<(String, Vec<String>)> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut terms = line
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string);
                let master = terms.next()?;
                Some((master, terms.collect()))
            })
            .collect()
    }
}

impl SynonymCatalog for TextFileSynonymCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, ctx), fields(catalog = %self.name))]
    fn open_connection(
        &self,
        ctx: &ConnectionContext,
    ) -> Result<Box<dyn SynonymCatalogConnection>> {
        let path = ctx.resolve(&self.path);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            RefDataError::connection_with_source(
                &self.name,
                format!("cannot read {}", path.display()),
                Box::new(e),
            )
        })?;

        let entries = Self::parse(&contents);
        debug!(path = %path.display(), masters = entries.len(), "Loaded synonym file");
        let index = build_index(entries.iter().map(|(m, s)| (m, s)));
        Ok(Box::new(IndexConnection::new(index, self.case_sensitive)))
    }
}

/// Connection over a prebuilt in-memory index.
#[derive(Debug)]
struct IndexConnection {
    index: HashMap<String, String>,
    case_sensitive: bool,
    closed: bool,
}

impl IndexConnection {
    fn new(index: HashMap<String, String>, case_sensitive: bool) -> Self {
        let index = if case_sensitive {
            index
        } else {
            index
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect()
        };
        Self {
            index,
            case_sensitive,
            closed: false,
        }
    }
}

impl SynonymCatalogConnection for IndexConnection {
    fn master_term(&mut self, term: &str) -> Result<Option<String>> {
        if self.closed {
            return Err(RefDataError::lookup("<in-memory>", "connection is closed"));
        }
        let found = if self.case_sensitive {
            self.index.get(term)
        } else {
            self.index.get(&term.to_lowercase())
        };
        Ok(found.cloned())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.index.clear();
        Ok(())
    }
}
