//! Persistence of partition states for deferred reduction.
//!
//! Orchestrators that run partitions in separate processes save each
//! partition's [`AggregateState`] under a partition id, then load and reduce
//! them once all partitions have finished.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::reducer::reduce;
use super::state::AggregateState;
use crate::error::{RefDataError, Result};

/// Storage of aggregate states keyed by partition id.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state saved for `partition`, if any.
    async fn load_state(&self, partition: &str) -> Result<Option<AggregateState>>;

    /// Saves (or replaces) the state of `partition`.
    async fn save_state(&self, partition: &str, state: &AggregateState) -> Result<()>;

    /// Lists all partition ids, sorted.
    async fn list_partitions(&self) -> Result<Vec<String>>;

    async fn delete_partition(&self, partition: &str) -> Result<()>;

    /// Loads the given partitions and reduces them into one state.
    ///
    /// A partition with no saved state is an error, since silently skipping it
    /// would under-count rows.
    async fn load_and_reduce(&self, partitions: &[String]) -> Result<AggregateState> {
        let mut states = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let state = self.load_state(partition).await?.ok_or_else(|| {
                RefDataError::configuration(format!("No state saved for partition '{partition}'"))
            })?;
            states.push(state);
        }
        reduce(&states)
    }
}

/// Rejects partition ids that could escape the store directory.
fn validate_partition(partition: &str) -> Result<()> {
    let valid = !partition.is_empty()
        && partition.len() <= 255
        && partition
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && partition != "."
        && partition != "..";
    if valid {
        Ok(())
    } else {
        Err(RefDataError::configuration(format!(
            "Invalid partition id '{partition}': use letters, digits, '-', '_' or '.'"
        )))
    }
}

/// File system implementation of [`StateStore`].
///
/// Each partition is stored as one JSON file:
/// ```text
/// base_path/
/// ├── part-0000.json
/// └── part-0001.json
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemStateStore {
    base_path: PathBuf,
}

impl FileSystemStateStore {
    /// Creates the store, creating `base_path` if needed.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn state_file_path(&self, partition: &str) -> PathBuf {
        self.base_path.join(format!("{partition}.json"))
    }
}

#[async_trait]
impl StateStore for FileSystemStateStore {
    #[instrument(skip(self))]
    async fn load_state(&self, partition: &str) -> Result<Option<AggregateState>> {
        validate_partition(partition)?;
        let path = self.state_file_path(partition);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(partition = %partition, "No saved state");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, state), fields(rows = state.rows_processed()))]
    async fn save_state(&self, partition: &str, state: &AggregateState) -> Result<()> {
        validate_partition(partition)?;
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.state_file_path(partition);
        // write-then-rename so readers never see a half written file
        let tmp = self.base_path.join(format!(".{partition}.json.tmp"));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Saved partition state");
        Ok(())
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        let mut partitions = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(partition) = name.strip_suffix(".json") {
                partitions.push(partition.to_string());
            }
        }
        partitions.sort();
        Ok(partitions)
    }

    async fn delete_partition(&self, partition: &str) -> Result<()> {
        validate_partition(partition)?;
        match fs::remove_file(self.state_file_path(partition)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory implementation of [`StateStore`], for tests and single process
/// orchestration.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, AggregateState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_state(&self, partition: &str) -> Result<Option<AggregateState>> {
        Ok(self.states.read().await.get(partition).cloned())
    }

    async fn save_state(&self, partition: &str, state: &AggregateState) -> Result<()> {
        validate_partition(partition)?;
        self.states
            .write()
            .await
            .insert(partition.to_string(), state.clone());
        Ok(())
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        let mut partitions: Vec<String> = self.states.read().await.keys().cloned().collect();
        partitions.sort();
        Ok(partitions)
    }

    async fn delete_partition(&self, partition: &str) -> Result<()> {
        self.states.write().await.remove(partition);
        Ok(())
    }
}
