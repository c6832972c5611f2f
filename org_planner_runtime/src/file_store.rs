//! File-backed document store.
//!
//! Layout: `<dir>/<collection>.json`, a JSON array of documents
//! (`{"id": ..., ...fields}`) in insertion order.
//!
//! Commit protocol:
//!   1. stage every touched collection in memory
//!   2. write each to `<collection>.json.tmp`, fsync
//!   3. write `commit.journal` naming those collections, fsync it and the
//!      directory; this is the commit point
//!   4. rename every temp file over its target, fsync the directory
//!   5. remove the journal
//!
//! Each rename is atomic on its own, but a batch spanning several
//! collections is not. `open` finishes an interrupted commit: with a
//! journal present the remaining renames are replayed, without one any
//! stray temp files are discarded.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::task;
use tracing::{debug, warn};

use org_planner_core::state::FieldFilter;

use crate::document_store::{
    check_collection, collection_names, filter_documents, stage_batch, Collections, Document, DocumentStore,
    StoreError, WriteBatch,
};

pub struct FileDocumentStore {
    inner: Arc<FileInner>,
}

struct FileInner {
    dir: PathBuf,
    /// Serializes commits; readers see a collection file either fully old or fully new.
    write_lock: Mutex<()>,
}

impl FileDocumentStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let inner = FileInner {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        inner.recover()?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&FileInner) -> Result<R, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        task::spawn_blocking(move || f(inner.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("file store task failed: {}", e)))?
    }
}

impl FileInner {
    fn path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.json", collection))
    }

    fn temp_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", collection))
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL)
    }

    fn read_collection(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let path = self.path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        let raw: Vec<Value> = serde_json::from_str(&content)?;
        let mut docs = Vec::with_capacity(raw.len());
        for value in raw {
            let Value::Object(mut fields) = value else {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}: document is not an object", path.display()),
                )));
            };
            let id = match fields.remove("id") {
                Some(Value::String(id)) => id,
                _ => {
                    return Err(StoreError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("{}: document without string id", path.display()),
                    )))
                }
            };
            docs.push(Document::new(id, fields));
        }
        Ok(docs)
    }

    fn write_temp(&self, collection: &str, docs: &[Document]) -> Result<PathBuf, StoreError> {
        let raw: Vec<Value> = docs
            .iter()
            .map(|d| {
                let mut obj = serde_json::Map::new();
                obj.insert("id".to_string(), Value::String(d.id.clone()));
                obj.extend(d.fields.clone());
                Value::Object(obj)
            })
            .collect();
        let content = serde_json::to_string_pretty(&raw)?;

        let tmp = self.temp_path(collection);
        let mut file = File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(tmp)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let ops = batch.into_ops();
        let mut current: Collections = Collections::new();
        for op in &ops {
            check_collection(op.collection())?;
            if !current.contains_key(op.collection()) {
                let docs = self.read_collection(op.collection())?;
                current.insert(op.collection().to_string(), docs);
            }
        }
        let staged = stage_batch(&current, ops)?;

        let mut names = Vec::with_capacity(staged.len());
        for (collection, docs) in &staged {
            self.write_temp(collection, docs)?;
            names.push(collection.clone());
        }

        let mut journal = File::create(self.journal_path())?;
        journal.write_all(serde_json::to_string(&names)?.as_bytes())?;
        journal.sync_all()?;
        sync_dir(&self.dir)?;

        self.apply_renames(&names)?;
        debug!(collections = names.len(), "file store commit");
        Ok(())
    }

    fn apply_renames(&self, names: &[String]) -> Result<(), StoreError> {
        for collection in names {
            let tmp = self.temp_path(collection);
            if tmp.exists() {
                fs::rename(&tmp, self.path(collection))?;
            }
        }
        sync_dir(&self.dir)?;
        fs::remove_file(self.journal_path())?;
        Ok(())
    }

    /// Complete or discard a commit cut short by a crash.
    fn recover(&self) -> Result<(), StoreError> {
        let journal = self.journal_path();
        if journal.exists() {
            let names: Vec<String> = serde_json::from_str(&fs::read_to_string(&journal)?)?;
            for collection in &names {
                check_collection(collection)?;
            }
            warn!(collections = ?names, "replaying interrupted file store commit");
            return self.apply_renames(&names);
        }
        for collection in collection_names() {
            let tmp = self.temp_path(collection);
            if tmp.exists() {
                warn!(path = %tmp.display(), "discarding uncommitted temp file");
                fs::remove_file(&tmp)?;
            }
        }
        Ok(())
    }
}

const JOURNAL: &str = "commit.journal";

/// Make renames and creations inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        check_collection(collection)?;
        let collection = collection.to_string();
        let id = id.to_string();
        self.blocking(move |inner| {
            Ok(inner
                .read_collection(&collection)?
                .into_iter()
                .find(|d| d.id == id))
        })
        .await
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        check_collection(collection)?;
        let collection = collection.to_string();
        let filter = filter.cloned();
        self.blocking(move |inner| {
            let docs = inner.read_collection(&collection)?;
            Ok(filter_documents(&docs, filter.as_ref()))
        })
        .await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.blocking(move |inner| inner.commit(batch)).await
    }
}
