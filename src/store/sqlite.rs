use std::path::Path;
use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;

use super::document::{apply_updates, merge};
use super::{Direction, Document, DocumentStore, FieldUpdate, OrderedQuery, SetOptions, StartBound};
use crate::error::StoreError;

/// A document store persisted in a single SQLite table, one JSON body per row.
///
/// Ordered queries run in SQL through `json_extract`. Updates read, patch and
/// write the body inside one transaction while holding the connection lock.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self, StoreError> {
        initialize_db(&db)?;
        Ok(SqliteStore {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

fn initialize_db(db: &Connection) -> Result<(), StoreError> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )",
        [],
    )?;
    Ok(())
}

fn read_body(db: &Connection, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
    let body = db
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    body.map(|body| serde_json::from_str(&body).map_err(StoreError::from))
        .transpose()
}

fn write_body(db: &Connection, collection: &str, id: &str, body: &Value) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
        params![collection, id, serde_json::to_string(body)?],
    )?;
    Ok(())
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Builds the SQL for an ordered query. Placeholders are numbered in the
/// order their values are pushed.
fn build_query(collection: &str, query: &OrderedQuery) -> (String, Vec<SqlValue>) {
    let mut sql = String::from(
        "SELECT id, body FROM documents \
         WHERE collection = ?1 AND json_type(body, ?2) IN ('integer', 'real')",
    );
    let mut values = vec![
        SqlValue::Text(collection.to_string()),
        SqlValue::Text(json_path(&query.order_by)),
    ];
    let mut bind = |value: SqlValue| {
        values.push(value);
        format!("?{}", values.len())
    };

    if let Some(filter) = &query.filter {
        let path = bind(SqlValue::Text(json_path(&filter.field)));
        let equals = bind(to_sql(&filter.equals));
        sql.push_str(&format!(" AND json_extract(body, {path}) = {equals}"));
    }

    let (beyond, before) = match query.direction {
        Direction::Descending => ("<", ">"),
        Direction::Ascending => (">", "<"),
    };
    if let Some(bound) = &query.start {
        let (key, exclusive) = match bound {
            StartBound::At(key) => (key, false),
            StartBound::After(key) => (key, true),
        };
        if key.value.is_finite() || exclusive {
            let value = bind(SqlValue::Real(key.value));
            let sort = "json_extract(body, ?2)";
            match (&key.id, exclusive) {
                (Some(id), _) => {
                    let id = bind(SqlValue::Text(id.clone()));
                    let cmp = if exclusive { ">" } else { ">=" };
                    sql.push_str(&format!(
                        " AND ({sort} {beyond} {value} OR ({sort} = {value} AND id {cmp} {id}))"
                    ));
                }
                (None, true) => sql.push_str(&format!(" AND {sort} {beyond} {value}")),
                (None, false) => sql.push_str(&format!(" AND NOT ({sort} {before} {value})")),
            }
        }
    }

    let order = match query.direction {
        Direction::Descending => "DESC",
        Direction::Ascending => "ASC",
    };
    let limit = bind(SqlValue::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));
    sql.push_str(&format!(
        " ORDER BY json_extract(body, ?2) {order}, id ASC LIMIT {limit}"
    ));
    (sql, values)
}

impl DocumentStore for SqliteStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let db = self.db.lock().await;
        Ok(read_body(&db, collection, id)?.map(|data| Document::new(id, data)))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let body = match read_body(&tx, collection, id)? {
            Some(mut existing) if options.merge => {
                merge(&mut existing, value);
                existing
            }
            _ => value,
        };
        write_body(&tx, collection, id, &body)?;
        tx.commit()?;
        Ok(())
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, serde_json::to_string(&value)?],
        )?;
        Ok(inserted == 1)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let deleted = db.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(deleted > 0)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<Document, StoreError> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let mut body = read_body(&tx, collection, id)?.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        apply_updates(&mut body, updates)?;
        write_body(&tx, collection, id, &body)?;
        tx.commit()?;
        Ok(Document::new(id, body))
    }

    async fn query_ordered(
        &self,
        collection: &str,
        query: OrderedQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let (sql, values) = build_query(collection, &query);
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push(Document::new(id, serde_json::from_str(&body)?));
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortKey;
    use serde_json::json;

    async fn seeded(docs: &[(&str, Value)]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, body) in docs {
            store
                .set_document("posts", id, body.clone(), SetOptions::default())
                .await
                .unwrap();
        }
        store
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    fn scored(scores: &[(&'static str, f64)]) -> Vec<(&'static str, Value)> {
        scores
            .iter()
            .map(|(id, score)| (*id, json!({ "score": score })))
            .collect()
    }

    #[tokio::test]
    async fn orders_by_score_then_id() {
        let store = seeded(&scored(&[("d", 5.0), ("c", 8.0), ("a", 10.0), ("b", 8.0)])).await;
        let docs = store
            .query_ordered("posts", OrderedQuery::new("score", Direction::Descending, 10))
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn start_bounds_match_memory_semantics() {
        let store = seeded(&scored(&[("a", 10.0), ("b", 8.0), ("c", 8.0), ("d", 5.0)])).await;

        let after_b = OrderedQuery::new("score", Direction::Descending, 2)
            .start(StartBound::After(SortKey::new(8.0, "b")));
        assert_eq!(ids(&store.query_ordered("posts", after_b).await.unwrap()), ["c", "d"]);

        let at_8 = OrderedQuery::new("score", Direction::Descending, 10)
            .start(StartBound::At(SortKey::value(8.0)));
        assert_eq!(ids(&store.query_ordered("posts", at_8).await.unwrap()), ["b", "c", "d"]);

        let after_8 = OrderedQuery::new("score", Direction::Descending, 10)
            .start(StartBound::After(SortKey::value(8.0)));
        assert_eq!(ids(&store.query_ordered("posts", after_8).await.unwrap()), ["d"]);

        let from_top = OrderedQuery::new("score", Direction::Descending, 10)
            .start(StartBound::At(SortKey::value(f64::INFINITY)));
        assert_eq!(
            ids(&store.query_ordered("posts", from_top).await.unwrap()),
            ["a", "b", "c", "d"]
        );
    }

    #[tokio::test]
    async fn filters_on_nested_field() {
        let store = seeded(&[
            ("a", json!({ "score": 3.0, "metadata": { "author": "u1" } })),
            ("b", json!({ "score": 2.0, "metadata": { "author": "u2" } })),
            ("c", json!({ "metadata": { "author": "u2" } })),
        ])
        .await;
        let query = OrderedQuery::new("score", Direction::Descending, 10)
            .filter("metadata.author", "u2");
        assert_eq!(ids(&store.query_ordered("posts", query).await.unwrap()), ["b"]);
    }

    #[tokio::test]
    async fn update_applies_all_fields_in_one_write() {
        let store = seeded(&[("p1", json!({ "metadata": { "likeCount": 3 }, "score": 3.0 }))]).await;
        let doc = store
            .update_document(
                "posts",
                "p1",
                vec![
                    FieldUpdate::increment("metadata.likeCount", 1),
                    FieldUpdate::set("score", 4.0),
                ],
            )
            .await
            .unwrap();
        assert_eq!(doc.data, json!({ "metadata": { "likeCount": 4 }, "score": 4.0 }));
        let stored = store.get_document("posts", "p1").await.unwrap().unwrap();
        assert_eq!(stored, doc);
    }

    #[tokio::test]
    async fn create_and_delete_are_conditional() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.create_document("posts/p1/likes", "u1", json!({})).await.unwrap());
        assert!(!store.create_document("posts/p1/likes", "u1", json!({})).await.unwrap());
        assert!(store.delete_document("posts/p1/likes", "u1").await.unwrap());
        assert!(!store.delete_document("posts/p1/likes", "u1").await.unwrap());
    }
}
