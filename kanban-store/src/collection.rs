//! In-memory document collections.
//!
//! [`Collections`] holds named collections of task documents keyed by a
//! store-assigned UUID v7 id. Ids are time-ordered, so iterating a
//! collection in key order lists documents in creation order.

use std::collections::{BTreeMap, HashMap};

use kanban_proto::protocol::FailureReason;
use kanban_proto::task::{Task, TaskFields, TaskId, TaskPatch, normalize_title};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default maximum number of documents per collection.
const DEFAULT_MAX_DOCUMENTS: usize = 10_000;

/// Errors returned by collection mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// No document with this id.
    #[error("document {0} not found")]
    NotFound(TaskId),
    /// The collection already holds the maximum number of documents.
    #[error("collection {collection} is full ({max} documents)")]
    Full {
        /// Collection name.
        collection: String,
        /// Configured limit.
        max: usize,
    },
    /// The document would have a blank title.
    #[error("title must not be blank")]
    BlankTitle,
}

impl From<CollectionError> for FailureReason {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::NotFound(_) => Self::NotFound,
            CollectionError::Full { .. } => Self::CollectionFull,
            CollectionError::BlankTitle => Self::Invalid(err.to_string()),
        }
    }
}

/// Named task collections behind a single [`RwLock`].
pub struct Collections {
    inner: RwLock<HashMap<String, BTreeMap<TaskId, TaskFields>>>,
    max_documents: usize,
}

impl Default for Collections {
    fn default() -> Self {
        Self::new()
    }
}

impl Collections {
    /// Creates an empty set of collections with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_documents(DEFAULT_MAX_DOCUMENTS)
    }

    /// Creates an empty set of collections with a custom size limit.
    #[must_use]
    pub fn with_max_documents(max_documents: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_documents,
        }
    }

    /// Inserts a document and returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BlankTitle`] for a whitespace-only title
    /// and [`CollectionError::Full`] if the collection is at its limit.
    pub async fn insert(
        &self,
        collection: &str,
        fields: TaskFields,
    ) -> Result<TaskId, CollectionError> {
        if normalize_title(&fields.title).is_none() {
            return Err(CollectionError::BlankTitle);
        }
        let mut inner = self.inner.write().await;
        let docs = inner.entry(collection.to_string()).or_default();
        if docs.len() >= self.max_documents {
            return Err(CollectionError::Full {
                collection: collection.to_string(),
                max: self.max_documents,
            });
        }
        let id = TaskId::new(Uuid::now_v7().to_string());
        docs.insert(id.clone(), fields);
        drop(inner);
        Ok(id)
    }

    /// Applies a single-field patch to an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::BlankTitle`] when renaming to a
    /// whitespace-only title and [`CollectionError::NotFound`] if the
    /// document does not exist.
    pub async fn update(
        &self,
        collection: &str,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<(), CollectionError> {
        if let TaskPatch::Title(title) = patch
            && normalize_title(title).is_none()
        {
            return Err(CollectionError::BlankTitle);
        }
        let mut inner = self.inner.write().await;
        let fields = inner
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;
        fields.apply(patch);
        Ok(())
    }

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::NotFound`] if the document does not exist.
    pub async fn delete(&self, collection: &str, id: &TaskId) -> Result<(), CollectionError> {
        let mut inner = self.inner.write().await;
        inner
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| CollectionError::NotFound(id.clone()))
    }

    /// Lists every document of a collection in id order.
    ///
    /// An unknown collection is simply empty.
    pub async fn snapshot(&self, collection: &str) -> Vec<Task> {
        let inner = self.inner.read().await;
        inner.get(collection).map_or_else(Vec::new, |docs| {
            docs.iter()
                .map(|(id, fields)| fields.clone().into_task(id.clone()))
                .collect()
        })
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        let inner = self.inner.read().await;
        inner.get(collection).map_or(0, BTreeMap::len)
    }
}
