//! Document collections with optional JSON-file persistence.
//!
//! Each collection keeps its documents in memory and, when backed by a data
//! directory, mirrors them into `<dir>/<name>.json` after every mutation.
//! Subscribers receive the full newest-first listing whenever it changes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, watch};
use tokio::task;

/// A stored record: addressed by key, ordered by timestamp.
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn key(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Could not replace collection file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Background task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// Newest-first listing handed to subscribers.
pub type Listing<T> = Arc<Vec<T>>;

pub struct Collection<T: Document> {
    name: String,
    path: Option<PathBuf>,
    docs: Mutex<BTreeMap<String, T>>,
    changes: watch::Sender<Listing<T>>,
}

impl<T: Document> Collection<T> {
    /// Creates a collection that lives only as long as the process.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::from_docs(name.into(), None, BTreeMap::new())
    }

    /// Opens a collection persisted in `dir`, loading existing documents.
    pub async fn open(dir: &Path, name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{name}.json"));

        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let stored: Vec<T> = serde_json::from_slice(&bytes)?;
                stored
                    .into_iter()
                    .map(|doc| (doc.key().to_string(), doc))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(
            collection = %name,
            path = %path.display(),
            documents = docs.len(),
            "collection opened"
        );
        Ok(Self::from_docs(name, Some(path), docs))
    }

    fn from_docs(name: String, path: Option<PathBuf>, docs: BTreeMap<String, T>) -> Self {
        let (changes, _) = watch::channel(Arc::new(newest_first(&docs)));
        Self {
            name,
            path,
            docs: Mutex::new(docs),
            changes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts or replaces the document with the same key.
    pub async fn put(&self, doc: T) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        let mut next = docs.clone();
        next.insert(doc.key().to_string(), doc);
        self.commit(&mut docs, next).await
    }

    /// Removes a document, returning it if it existed.
    pub async fn remove(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut docs = self.docs.lock().await;
        let Some(existing) = docs.get(key).cloned() else {
            return Ok(None);
        };
        let mut next = docs.clone();
        next.remove(key);
        self.commit(&mut docs, next).await?;
        Ok(Some(existing))
    }

    /// Removes every document matching `predicate`, returning how many went.
    pub async fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> Result<usize, StoreError> {
        let mut docs = self.docs.lock().await;
        let mut next = docs.clone();
        next.retain(|_, doc| !predicate(doc));
        let removed = docs.len() - next.len();
        if removed > 0 {
            self.commit(&mut docs, next).await?;
        }
        Ok(removed)
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.docs.lock().await.get(key).cloned()
    }

    /// All documents, newest first.
    pub async fn list(&self) -> Vec<T> {
        newest_first(&*self.docs.lock().await)
    }

    /// Watches the newest-first listing. The current listing is available immediately.
    pub fn subscribe(&self) -> watch::Receiver<Listing<T>> {
        self.changes.subscribe()
    }

    /// Persists `next` and only then makes it the visible state.
    async fn commit(
        &self,
        docs: &mut BTreeMap<String, T>,
        next: BTreeMap<String, T>,
    ) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            let values: Vec<&T> = next.values().collect();
            let bytes = serde_json::to_vec_pretty(&values)?;
            let path = path.clone();
            task::spawn_blocking(move || write_atomically(&path, &bytes)).await??;
        }
        *docs = next;
        self.changes.send_replace(Arc::new(newest_first(docs)));
        Ok(())
    }
}

fn newest_first<T: Document>(docs: &BTreeMap<String, T>) -> Vec<T> {
    let mut listing: Vec<T> = docs.values().cloned().collect();
    listing.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| a.key().cmp(b.key()))
    });
    listing
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
