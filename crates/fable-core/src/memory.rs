//! In-memory repository implementation.
//!
//! Backs tests and embedders that do not bring their own document store.
//! Versions increment on every insert; content hashes are computed on write
//! so cache invalidation behaves exactly as with a real backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::documents::{DocRepository, RepoError, VersionedDoc, content_hash_of};

/// Scope key used when `get_active`/`set_active` is called without a scope.
const DEFAULT_SCOPE: &str = "";

struct Inner<T> {
    /// id → versions, ascending.
    docs: HashMap<String, Vec<VersionedDoc<T>>>,
    /// scope → active document id.
    active: HashMap<String, String>,
}

/// In-memory [`DocRepository`] for one document kind.
pub struct MemoryRepository<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Serialize> MemoryRepository<T> {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                docs: HashMap::new(),
                active: HashMap::new(),
            }),
        }
    }

    /// Insert a new version of a document. Returns the assigned version.
    pub fn insert(&self, id: impl Into<String>, doc: T) -> u64 {
        let id = id.into();
        let mut inner = self.inner.lock();
        let versions = inner.docs.entry(id.clone()).or_default();
        let version = versions.last().map_or(1, |d| d.version + 1);
        let hash = content_hash_of(&doc);
        versions.push(VersionedDoc {
            id,
            version,
            hash,
            doc,
        });
        version
    }

    /// Mark a document as the active one for a scope.
    pub fn set_active(&self, scope: Option<&str>, id: impl Into<String>) {
        let _ = self
            .inner
            .lock()
            .active
            .insert(scope.unwrap_or(DEFAULT_SCOPE).to_owned(), id.into());
    }
}

impl<T: Clone + Serialize> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> DocRepository<T> for MemoryRepository<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn get_by_id_version(
        &self,
        id: &str,
        version: Option<u64>,
    ) -> Result<Option<VersionedDoc<T>>, RepoError> {
        let inner = self.inner.lock();
        let versions = match inner.docs.get(id) {
            Some(v) => v,
            None => return Ok(None),
        };
        let doc = match version {
            Some(wanted) => versions.iter().find(|d| d.version == wanted),
            None => versions.last(),
        };
        Ok(doc.cloned())
    }

    async fn get_active(&self, scope: Option<&str>) -> Result<Option<VersionedDoc<T>>, RepoError> {
        let id = {
            let inner = self.inner.lock();
            inner
                .active
                .get(scope.unwrap_or(DEFAULT_SCOPE))
                .cloned()
        };
        match id {
            Some(id) => self.get_by_id_version(&id, None).await,
            None => Ok(None),
        }
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<VersionedDoc<T>>, RepoError> {
        let inner = self.inner.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.docs.get(id).and_then(|v| v.last()).cloned())
            .collect())
    }
}
