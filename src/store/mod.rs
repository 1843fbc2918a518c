//! Store adapter: a thin abstraction over the external document database.
//!
//! The real system treats the underlying store as an external, independently
//! replicated collaborator reached with write-concern `majority`
//! and read-preference `primary-preferred`. This crate defines the seam a
//! real adapter would implement (`StoreAdapter`) and ships one concrete,
//! in-memory implementation (`InMemoryStore`) standing in for it: a
//! per-collection `RwLock<HashMap<..>>` with a query-by-example mini-DSL.

pub mod document;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{DbError, Result};
pub use query::{Query, Sort, SortOrder, Update};

/// The two domain collections, plus the two replication-internal ones the
/// operation log and sync-metadata bookkeeping are stored in. The identifier
/// field name for a collection (`posts -> post_id`) is encoded here as an
/// explicit lookup rather than derived by string slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Posts,
    Users,
    OperationLog,
    SyncMetadata,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Users => "users",
            Collection::OperationLog => "operation_log",
            Collection::SyncMetadata => "sync_metadata",
        }
    }

    /// The identifier field name for a domain collection, per the
    /// `collection[:-1]` convention (`posts -> post_id`, `users -> user_id`).
    pub fn singular_id_field(name: &str) -> Option<&'static str> {
        match name {
            "posts" => Some("post_id"),
            "users" => Some("user_id"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub primary: String,
    pub members: Vec<String>,
}

#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn insert_one(&self, collection: &str, doc: Value) -> Result<String>;
    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>>;
    async fn find_many(
        &self,
        collection: &str,
        query: &Query,
        sort: Option<Sort>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>>;
    async fn count(&self, collection: &str, query: &Query) -> Result<usize>;
    /// `use_operators = false` replaces/merges plain fields (whole-document
    /// update); `use_operators = true` applies `Update::AddToSet`-style
    /// array operators at-most-once.
    async fn update_one(
        &self,
        collection: &str,
        query: &Query,
        update: Update,
    ) -> Result<bool>;
    async fn delete_one(&self, collection: &str, query: &Query) -> Result<bool>;
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize>;
    async fn check_health(&self) -> Result<HealthStatus>;
}

/// In-memory stand-in for the externally replicated document database.
/// Write-concern/read-preference are configuration the real adapter would
/// honor against the network; here they're recorded but inert.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn doc_id(doc: &Value) -> Option<String> {
        for field in ["post_id", "user_id", "_id"] {
            if let Some(id) = doc.get(field).and_then(Value::as_str) {
                return Some(id.to_string());
            }
        }
        None
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn insert_one(&self, collection: &str, doc: Value) -> Result<String> {
        let id = Self::doc_id(&doc)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>> {
        let collections = self.collections.read();
        let docs = match collections.get(collection) {
            Some(d) => d,
            None => return Ok(None),
        };
        Ok(docs.iter().find(|d| query.matches(d)).cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        query: &Query,
        sort: Option<Sort>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read();
        let docs = match collections.get(collection) {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };

        let mut matched: Vec<Value> = docs.iter().filter(|d| query.matches(d)).cloned().collect();

        if let Some(sort) = sort {
            sort.apply(&mut matched);
        }

        Ok(matched.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<usize> {
        let collections = self.collections.read();
        let docs = match collections.get(collection) {
            Some(d) => d,
            None => return Ok(0),
        };
        Ok(docs.iter().filter(|d| query.matches(d)).count())
    }

    async fn update_one(&self, collection: &str, query: &Query, update: Update) -> Result<bool> {
        let mut collections = self.collections.write();
        let docs = match collections.get_mut(collection) {
            Some(d) => d,
            None => return Ok(false),
        };

        let Some(doc) = docs.iter_mut().find(|d| query.matches(d)) else {
            return Ok(false);
        };

        update.apply(doc)?;
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, query: &Query) -> Result<bool> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        let mut removed = false;
        if let Some(pos) = docs.iter().position(|d| query.matches(d)) {
            docs.remove(pos);
            removed = true;
        }
        debug_assert!(!removed || docs.len() == before - 1);
        Ok(removed)
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !query.matches(d));
        Ok(before - docs.len())
    }

    async fn check_health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "ok".to_string(),
            primary: "in-memory".to_string(),
            members: vec!["in-memory".to_string()],
        })
    }
}

/// Raised by a real adapter on connection loss; callers log and abort the
/// current cycle rather than crash the process.
pub fn store_unavailable(context: &str) -> DbError {
    DbError::StoreUnavailable(context.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_find_one_by_equality() {
        let store = InMemoryStore::new();
        store
            .insert_one("posts", json!({"post_id": "p1", "region": "north_america"}))
            .await
            .unwrap();

        let found = store
            .find_one("posts", &Query::eq("post_id", "p1"))
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .find_one("posts", &Query::eq("post_id", "nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_many_returns_deleted_count() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            store
                .insert_one("posts", json!({"post_id": format!("p{i}"), "region": "europe"}))
                .await
                .unwrap();
        }
        store
            .insert_one("posts", json!({"post_id": "p9", "region": "asia_pacific"}))
            .await
            .unwrap();

        let deleted = store
            .delete_many("posts", &Query::eq("region", "europe"))
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count("posts", &Query::all()).await.unwrap(), 1);
    }
}
