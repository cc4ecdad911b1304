//! Tracking of open synonym catalog connections.
//!
//! Every connection opened for a pipeline is registered in a
//! [`ConnectionArena`] at acquisition time. Matchers refer to connections by
//! [`ConnectionId`] only. Releasing goes through the arena, which attempts to
//! close every entry and collects failures instead of stopping at the first
//! one. Dropping an arena releases whatever is still open.

use tracing::{debug, instrument, warn};

use crate::error::{ReleaseErrors, ReleaseFailure, Result};
use crate::reference::{CatalogRef, ConnectionContext, SynonymCatalogConnection};

/// Stable handle of a connection inside a [`ConnectionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Slot {
    catalog: String,
    connection: Option<Box<dyn SynonymCatalogConnection>>,
}

/// Owner of all connections opened for one pipeline.
#[derive(Debug, Default)]
pub struct ConnectionArena {
    slots: Vec<Slot>,
}

impl ConnectionArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens one connection per catalog, in catalog order.
    ///
    /// If any catalog fails to open, every connection opened so far is closed
    /// before the open error is returned. Failures during that cleanup are logged.
    #[instrument(skip_all, fields(catalogs = catalogs.len(), partition = ctx.partition()))]
    pub fn open_all(catalogs: &[CatalogRef], ctx: &ConnectionContext) -> Result<Self> {
        let mut arena = Self::new();
        for catalog in catalogs {
            match catalog.open_connection(ctx) {
                Ok(connection) => {
                    debug!(catalog = catalog.name(), "Opened synonym catalog connection");
                    arena.register(catalog.name(), connection);
                }
                Err(e) => {
                    warn!(
                        catalog = catalog.name(),
                        error = %e,
                        opened = arena.open_count(),
                        "Failed to open synonym catalog, releasing opened connections"
                    );
                    for failure in arena.close_all().iter() {
                        warn!(catalog = %failure.catalog, error = %failure.message, "Cleanup release failed");
                    }
                    return Err(e);
                }
            }
        }
        Ok(arena)
    }

    /// Takes ownership of an already opened connection.
    pub fn register(
        &mut self,
        catalog: impl Into<String>,
        connection: Box<dyn SynonymCatalogConnection>,
    ) -> ConnectionId {
        self.slots.push(Slot {
            catalog: catalog.into(),
            connection: Some(connection),
        });
        ConnectionId(self.slots.len() - 1)
    }

    /// Returns the open connection behind `id`, or `None` once it was released.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Box<dyn SynonymCatalogConnection>> {
        self.slots.get_mut(id.0).and_then(|s| s.connection.as_mut())
    }

    pub fn catalog_name(&self, id: ConnectionId) -> Option<&str> {
        self.slots.get(id.0).map(|s| s.catalog.as_str())
    }

    /// Returns the id of the connection registered for `catalog`.
    pub fn id_of(&self, catalog: &str) -> Option<ConnectionId> {
        self.slots
            .iter()
            .position(|s| s.catalog == catalog)
            .map(ConnectionId)
    }

    /// Number of registered connections, open or released.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of connections that have not been released yet.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.connection.is_some()).count()
    }

    /// Attempts to close every open connection.
    ///
    /// Each connection is taken out of the arena before closing, so a connection
    /// is closed at most once even if this is called again.
    pub fn close_all(&mut self) -> ReleaseErrors {
        let mut errors = ReleaseErrors::default();
        for slot in &mut self.slots {
            if let Some(mut connection) = slot.connection.take() {
                match connection.close() {
                    Ok(()) => debug!(catalog = %slot.catalog, "Closed synonym catalog connection"),
                    Err(e) => errors.push(ReleaseFailure::new(&slot.catalog, e.to_string())),
                }
            }
        }
        errors
    }
}

impl Drop for ConnectionArena {
    fn drop(&mut self) {
        if self.open_count() == 0 {
            return;
        }
        warn!(
            open = self.open_count(),
            "Connection arena dropped with open connections, releasing"
        );
        for failure in self.close_all().iter() {
            warn!(catalog = %failure.catalog, error = %failure.message, "Release failed");
        }
    }
}
