mod document;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use document::Document;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use serde_json::Value;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A position in an ordered query. Without an `id` only the value is
/// compared, so every document tied on that value sits at the position.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub value: f64,
    pub id: Option<String>,
}

impl SortKey {
    pub fn new(value: f64, id: impl Into<String>) -> Self {
        SortKey {
            value,
            id: Some(id.into()),
        }
    }

    pub fn value(value: f64) -> Self {
        SortKey { value, id: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartBound {
    /// Inclusive start.
    At(SortKey),
    /// Exclusive start.
    After(SortKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub equals: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderedQuery {
    pub order_by: String,
    pub direction: Direction,
    pub start: Option<StartBound>,
    pub limit: usize,
    pub filter: Option<FieldFilter>,
}

impl OrderedQuery {
    pub fn new(order_by: impl Into<String>, direction: Direction, limit: usize) -> Self {
        OrderedQuery {
            order_by: order_by.into(),
            direction,
            start: None,
            limit,
            filter: None,
        }
    }

    pub fn start(mut self, start: StartBound) -> Self {
        self.start = Some(start);
        self
    }

    pub fn filter(mut self, field: impl Into<String>, equals: impl Into<Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            equals: equals.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub merge: bool,
}

/// One field change inside a multi-field [`DocumentStore::update_document`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set {
        field: String,
        value: Value,
    },
    /// Adds `delta` to an integer field at the store. A missing field counts
    /// as 0; `floor` clamps the result from below.
    Increment {
        field: String,
        delta: i64,
        floor: Option<i64>,
    },
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn increment(field: impl Into<String>, delta: i64) -> Self {
        FieldUpdate::Increment {
            field: field.into(),
            delta,
            floor: None,
        }
    }

    pub fn decrement_floored(field: impl Into<String>, floor: i64) -> Self {
        FieldUpdate::Increment {
            field: field.into(),
            delta: -1,
            floor: Some(floor),
        }
    }
}

/// The persistent document store the feed core runs against.
///
/// Collections are addressed by slash-separated paths (`posts`,
/// `posts/{id}/likes`) and fields by dot-separated paths
/// (`metadata.likeCount`). Each call is atomic with respect to the single
/// document it touches; nothing spans documents.
pub trait DocumentStore: Send + Sync {
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Document>, StoreError>> + Send;

    fn set_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
        options: SetOptions,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Creates the document unless one already exists under `id`. Returns
    /// whether this call created it.
    fn create_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Returns whether a document was removed.
    fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Applies all `updates` to an existing document in one step and returns
    /// the document as written.
    fn update_document(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> impl std::future::Future<Output = Result<Document, StoreError>> + Send;

    /// Documents ordered by `query.order_by` in `query.direction`, ties broken
    /// by id ascending. Documents without a numeric sort field are left out.
    fn query_ordered(
        &self,
        collection: &str,
        query: OrderedQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Adds `delta` to an integer field and returns the stored result.
    fn atomic_increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> impl std::future::Future<Output = Result<i64, StoreError>> + Send {
        async move {
            let doc = self
                .update_document(collection, id, vec![FieldUpdate::increment(field, delta)])
                .await?;
            doc.field(field)
                .and_then(Value::as_i64)
                .ok_or_else(|| StoreError::NotNumeric(field.to_string()))
        }
    }
}

/// Runs an ordered query over an in-memory snapshot of a collection.
pub(crate) fn run_query(
    docs: impl Iterator<Item = Document>,
    query: &OrderedQuery,
) -> Vec<Document> {
    let mut keyed: Vec<(f64, Document)> = docs
        .filter(|doc| document::matches_filter(doc, query.filter.as_ref()))
        .filter_map(|doc| doc.sort_value(&query.order_by).map(|value| (value, doc)))
        .filter(|(value, doc)| match &query.start {
            Some(bound) => {
                document::within_bound((*value, doc.id.as_str()), bound, query.direction)
            }
            None => true,
        })
        .collect();
    keyed.sort_by(|a, b| {
        document::compare(
            (a.0, a.1.id.as_str()),
            (b.0, b.1.id.as_str()),
            query.direction,
        )
    });
    keyed
        .into_iter()
        .take(query.limit)
        .map(|(_, doc)| doc)
        .collect()
}
