//! Document store — the persistence collaborator contract.
//!
//! One entity ⇄ one document, one collection per entity kind. A
//! document is an opaque id plus a JSON field map; fields the planner
//! does not model pass through untouched.
//!
//! Writes go through `WriteBatch`, applied all-or-nothing. A failed
//! commit leaves every collection as it was.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use org_planner_core::domain::EntityKind;
use org_planner_core::state::FieldFilter;
use org_planner_core::PlannerError;

/// Field map of one stored document, `id` excluded.
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Put { collection, .. } => collection,
            WriteOp::Delete { collection, .. } => collection,
        }
    }
}

/// Ordered writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, collection: &str, id: &str, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown collection {0:?}")]
    UnknownCollection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document data: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for PlannerError {
    fn from(err: StoreError) -> Self {
        PlannerError::Persistence(err.to_string())
    }
}

/// Names of every collection a backend must serve.
pub fn collection_names() -> impl Iterator<Item = &'static str> {
    EntityKind::ALL.into_iter().map(EntityKind::collection_name)
}

pub(crate) fn check_collection(name: &str) -> Result<(), StoreError> {
    if collection_names().any(|c| c == name) {
        Ok(())
    } else {
        Err(StoreError::UnknownCollection(name.to_string()))
    }
}

/// External document store. Listing preserves insertion order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents, or those whose `filter.field` equals `filter.value` exactly.
    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

// ── In-memory backend ──────────────────────────────────────────────

pub(crate) type Collections = BTreeMap<String, Vec<Document>>;

/// Apply ops in order to a staged copy of the touched collections.
pub(crate) fn stage_batch(
    current: &Collections,
    ops: Vec<WriteOp>,
) -> Result<Collections, StoreError> {
    let mut staged: Collections = BTreeMap::new();
    for op in ops {
        check_collection(op.collection())?;
        let docs = staged
            .entry(op.collection().to_string())
            .or_insert_with(|| current.get(op.collection()).cloned().unwrap_or_default());
        match op {
            WriteOp::Put { id, fields, .. } => match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => existing.fields = fields,
                None => docs.push(Document::new(id, fields)),
            },
            WriteOp::Delete { id, .. } => docs.retain(|d| d.id != id),
        }
    }
    Ok(staged)
}

pub(crate) fn filter_documents(docs: &[Document], filter: Option<&FieldFilter>) -> Vec<Document> {
    docs.iter()
        .filter(|d| filter.map_or(true, |f| f.matches_fields(&d.fields)))
        .cloned()
        .collect()
}

/// Process-local store. The default backend and the one tests use.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total documents across every collection.
    pub fn document_count(&self) -> usize {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        collections.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        check_collection(collection)?;
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        check_collection(collection)?;
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .map(|docs| filter_documents(docs, filter))
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = stage_batch(&collections, batch.into_ops())?;
        collections.extend(staged);
        Ok(())
    }
}
