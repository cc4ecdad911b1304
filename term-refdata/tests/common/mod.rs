//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use term_refdata::error::{RefDataError, Result};
use term_refdata::reference::{ConnectionContext, SynonymCatalog, SynonymCatalogConnection};
use term_refdata::value::Value;

/// Open/close bookkeeping shared between a catalog and its connections.
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub lookups: AtomicUsize,
    /// Threads that opened connections or ran lookups.
    pub threads: Mutex<HashSet<ThreadId>>,
}

impl ConnectionCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn threads(&self) -> HashSet<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    fn record_thread(&self) {
        self.threads.lock().unwrap().insert(thread::current().id());
    }
}

/// A synonym catalog whose failures can be scripted.
#[derive(Debug)]
pub struct ScriptedCatalog {
    name: String,
    synonyms: HashMap<String, String>,
    fail_open: bool,
    fail_close: bool,
    /// 1-based lookup number that fails with a transient error.
    fail_lookup_at: Option<usize>,
    pub counters: Arc<ConnectionCounters>,
}

impl ScriptedCatalog {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            synonyms: HashMap::new(),
            fail_open: false,
            fail_close: false,
            fail_lookup_at: None,
            counters: Arc::new(ConnectionCounters::default()),
        }
    }

    pub fn with_synonyms(mut self, master: &str, synonyms: &[&str]) -> Self {
        self.synonyms.insert(master.to_string(), master.to_string());
        for synonym in synonyms {
            self.synonyms.insert(synonym.to_string(), master.to_string());
        }
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_lookup_at(mut self, lookup: usize) -> Self {
        self.fail_lookup_at = Some(lookup);
        self
    }
}

impl SynonymCatalog for ScriptedCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_connection(
        &self,
        _ctx: &ConnectionContext,
    ) -> Result<Box<dyn SynonymCatalogConnection>> {
        if self.fail_open {
            return Err(RefDataError::connection(&self.name, "connection refused"));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.record_thread();
        Ok(Box::new(ScriptedConnection {
            catalog: self.name.clone(),
            synonyms: self.synonyms.clone(),
            fail_close: self.fail_close,
            fail_lookup_at: self.fail_lookup_at,
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[derive(Debug)]
struct ScriptedConnection {
    catalog: String,
    synonyms: HashMap<String, String>,
    fail_close: bool,
    fail_lookup_at: Option<usize>,
    counters: Arc<ConnectionCounters>,
}

impl SynonymCatalogConnection for ScriptedConnection {
    fn master_term(&mut self, term: &str) -> Result<Option<String>> {
        let lookup = self.counters.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.record_thread();
        if self.fail_lookup_at == Some(lookup) {
            return Err(RefDataError::lookup(&self.catalog, "read timed out"));
        }
        Ok(self.synonyms.get(term).cloned())
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(RefDataError::connection(&self.catalog, "close failed"));
        }
        Ok(())
    }
}

/// A row with a single text column.
pub fn text_row(column: &str, value: &str) -> HashMap<String, Value> {
    HashMap::from([(column.to_string(), Value::from(value))])
}
