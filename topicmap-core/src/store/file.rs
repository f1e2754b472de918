//! JSON snapshot on local disk.
//!
//! Layout: `{ "version": n, "graph": { "nodes": [...], "links": [...] } }`.
//! A bare `{ "nodes": [...], "links": [...] }` document (written before
//! versioning existed) is read as version 1. Writes go to a uniquely named
//! temp file in the same directory that is renamed over the target, so
//! readers see either the old or the new snapshot, never a torn one.

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{GraphStore, Snapshot, StoreError};
use crate::models::KnowledgeGraph;

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u64,
    graph: &'a KnowledgeGraph,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Versioned { version: u64, graph: KnowledgeGraph },
    Bare(KnowledgeGraph),
}

impl From<Document> for Snapshot {
    fn from(doc: Document) -> Self {
        match doc {
            Document::Versioned { version, graph } => Snapshot { graph, version },
            Document::Bare(graph) => Snapshot { graph, version: 1 },
        }
    }
}

fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, StoreError> {
    let doc: Document = serde_json::from_slice(bytes)?;
    Ok(doc.into())
}

/// File-backed store.
///
/// `save` holds an exclusive advisory lock on a sibling `<file>.lock` from the
/// version check through the rename. Every handle on the same path, in this
/// process or another one, goes through that lock, so two writers holding
/// the same expected version cannot both commit.
#[derive(Debug)]
pub struct FileGraphStore {
    path: PathBuf,
    lock_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileGraphStore {
    /// Opens the store, creating the parent directory if needed. The file
    /// itself is created on first save.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        tracing::info!(path = %path.display(), "File graph store opened");
        Ok(Self {
            path,
            lock_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::empty()),
            Err(e) => return Err(e.into()),
        };
        parse_snapshot(&bytes)
    }
}

/// Compare-and-swap under the advisory lock. Blocking; run off the runtime.
fn save_locked(
    path: &Path,
    lock_path: &Path,
    graph: &KnowledgeGraph,
    expected_version: u64,
) -> Result<u64, StoreError> {
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    // Released when `lock_file` is dropped.
    lock_file.lock_exclusive()?;

    let current = match std::fs::read(path) {
        Ok(bytes) => match parse_snapshot(&bytes) {
            Ok(snapshot) => snapshot.version,
            Err(StoreError::Serialization(e)) => {
                // Corrupt snapshot: readers already see an empty graph at version 0.
                tracing::warn!(path = %path.display(), error = %e, "Overwriting corrupt graph snapshot");
                0
            }
            Err(e) => return Err(e),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };

    if current != expected_version {
        return Err(StoreError::Conflict {
            expected: expected_version,
            found: current,
        });
    }

    let version = current + 1;
    let bytes = serde_json::to_vec(&DocumentRef { version, graph })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(version)
}

#[async_trait]
impl GraphStore for FileGraphStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        self.read_snapshot().await
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<u64, StoreError> {
        // Keeps this handle's writers from tying up blocking threads on the file lock.
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        let owned = graph.clone();
        let version = tokio::task::spawn_blocking(move || {
            save_locked(&path, &lock_path, &owned, expected_version)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        tracing::debug!(path = %self.path.display(), version, nodes = graph.nodes.len(), "Graph snapshot written");
        Ok(version)
    }

    fn name(&self) -> &str {
        "file"
    }
}
