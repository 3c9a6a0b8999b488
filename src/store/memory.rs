use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::document::{apply_updates, merge};
use super::{run_query, Document, DocumentStore, FieldUpdate, OrderedQuery, SetOptions};
use crate::error::StoreError;

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// A document store held in process memory.
///
/// Clones share the same data. Every call takes the collection lock for its
/// whole duration, which is what makes single-document updates atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if options.merge {
            if let Some(existing) = docs.get_mut(id) {
                merge(existing, value);
                return Ok(());
            }
        }
        docs.insert(id.to_string(), value);
        Ok(())
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), value);
        Ok(true)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<Document, StoreError> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let data = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        // Apply to a copy so a failing update leaves the document untouched.
        let mut updated = data.clone();
        apply_updates(&mut updated, updates)?;
        *data = updated.clone();
        Ok(Document::new(id, updated))
    }

    async fn query_ordered(
        &self,
        collection: &str,
        query: OrderedQuery,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        let collections = self.collections.lock().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let snapshot = docs
            .iter()
            .map(|(id, data)| Document::new(id.clone(), data.clone()));
        Ok(run_query(snapshot, &query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, SortKey, StartBound};
    use serde_json::json;

    async fn seeded(scores: &[(&str, f64)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (id, score) in scores {
            store
                .set_document("posts", id, json!({ "score": score }), SetOptions::default())
                .await
                .unwrap();
        }
        store
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn create_is_conditional_on_absence() {
        let store = MemoryStore::new();
        assert!(store.create_document("likes", "u1", json!({})).await.unwrap());
        assert!(!store.create_document("likes", "u1", json!({})).await.unwrap());
        assert!(store.delete_document("likes", "u1").await.unwrap());
        assert!(!store.delete_document("likes", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn set_with_merge_keeps_other_fields() {
        let store = MemoryStore::new();
        store
            .set_document("posts", "p1", json!({ "a": 1, "b": 2 }), SetOptions::default())
            .await
            .unwrap();
        store
            .set_document("posts", "p1", json!({ "b": 3 }), SetOptions { merge: true })
            .await
            .unwrap();
        let doc = store.get_document("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "a": 1, "b": 3 }));

        store
            .set_document("posts", "p1", json!({ "c": 4 }), SetOptions::default())
            .await
            .unwrap();
        let doc = store.get_document("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "c": 4 }));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_document("posts", "nope", vec![FieldUpdate::increment("n", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn failed_update_writes_nothing() {
        let store = seeded(&[("p1", 1.0)]).await;
        let err = store
            .update_document(
                "posts",
                "p1",
                vec![FieldUpdate::set("score", 9.0), FieldUpdate::increment("score", 1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotNumeric(_)));
        let doc = store.get_document("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "score": 1.0 }));
    }

    #[tokio::test]
    async fn atomic_increment_returns_new_value() {
        let store = MemoryStore::new();
        store
            .set_document("posts", "p1", json!({}), SetOptions::default())
            .await
            .unwrap();
        for expected in 1..=2 {
            let count = store
                .atomic_increment("posts", "p1", "metadata.likeCount", 1)
                .await
                .unwrap();
            assert_eq!(count, expected);
        }
    }

    #[tokio::test]
    async fn ordered_query_breaks_ties_by_id() {
        let store = seeded(&[("d", 5.0), ("c", 8.0), ("a", 10.0), ("b", 8.0)]).await;
        let docs = store
            .query_ordered("posts", OrderedQuery::new("score", Direction::Descending, 10))
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["a", "b", "c", "d"]);

        let docs = store
            .query_ordered("posts", OrderedQuery::new("score", Direction::Ascending, 10))
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["d", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn start_after_is_exclusive() {
        let store = seeded(&[("a", 10.0), ("b", 8.0), ("c", 8.0), ("d", 5.0)]).await;
        let query = OrderedQuery::new("score", Direction::Descending, 2)
            .start(StartBound::After(SortKey::new(8.0, "b")));
        let docs = store.query_ordered("posts", query).await.unwrap();
        assert_eq!(ids(&docs), ["c", "d"]);
    }

    #[tokio::test]
    async fn unscored_and_filtered_documents_are_left_out() {
        let store = seeded(&[("a", 3.0)]).await;
        store
            .set_document("posts", "x", json!({ "title": "no score" }), SetOptions::default())
            .await
            .unwrap();
        store
            .set_document(
                "posts",
                "b",
                json!({ "score": 1.0, "metadata": { "author": "u2" } }),
                SetOptions::default(),
            )
            .await
            .unwrap();
        let all = store
            .query_ordered("posts", OrderedQuery::new("score", Direction::Descending, 10))
            .await
            .unwrap();
        assert_eq!(ids(&all), ["a", "b"]);

        let by_u2 = store
            .query_ordered(
                "posts",
                OrderedQuery::new("score", Direction::Descending, 10)
                    .filter("metadata.author", "u2"),
            )
            .await
            .unwrap();
        assert_eq!(ids(&by_u2), ["b"]);
    }

    #[tokio::test]
    async fn switched_off_store_is_unavailable() {
        let store = seeded(&[("a", 1.0)]).await;
        store.set_unavailable(true);
        assert!(matches!(
            store.get_document("posts", "a").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.get_document("posts", "a").await.unwrap().is_some());
    }
}
