//! In-memory document store.
//!
//! Backs tests and demos, and doubles as the mutation surface that the
//! administrative process would normally own: `insert`/`update`/`delete`
//! assign ids and `createdAt`/`updatedAt` timestamps the way the managed
//! store does. Changes fan out over a broadcast bus to the watch tasks.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use super::{Direction, Document, DocumentStore, Filter, Position, SortKey, StoreQuery};
use crate::error::{CatalogError, Result};
use async_trait::async_trait;

const CHANGE_BUS_CAPACITY: usize = 256;
const WATCH_BUFFER: usize = 16;

#[derive(Clone, Debug)]
struct Change {
    collection: String,
    id: String,
}

#[derive(Clone)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, Value>>>>,
    changes: broadcast::Sender<Change>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Inserts a document under a fresh id and returns it.
    pub async fn insert(&self, collection: &str, data: Value) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.put(collection, &id, data).await?;
        Ok(id)
    }

    /// Inserts (or replaces) a document under a caller-chosen id.
    pub async fn insert_with_id(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.put(collection, id, data).await
    }

    /// Shallow-merges `patch` into an existing document and bumps `updatedAt`
    /// unless the patch sets it explicitly.
    pub async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let Value::Object(patch) = patch else {
            return Err(CatalogError::Validation(
                "document patch must be a JSON object".into(),
            ));
        };
        {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| {
                    CatalogError::Validation(format!("no document {collection}/{id} to update"))
                })?;
            if let Value::Object(existing) = doc {
                let bump = !patch.contains_key("updatedAt");
                existing.extend(patch);
                if bump {
                    existing.insert("updatedAt".into(), json!(now_rfc3339()));
                }
            }
        }
        self.notify(collection, id);
        Ok(())
    }

    /// Removes a document; returns whether it existed.
    pub async fn delete(&self, collection: &str, id: &str) -> bool {
        let removed = self
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify(collection, id);
        }
        removed
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let Value::Object(mut data) = data else {
            return Err(CatalogError::Validation(
                "document body must be a JSON object".into(),
            ));
        };
        let now = now_rfc3339();
        data.entry("createdAt").or_insert_with(|| json!(now.clone()));
        data.entry("updatedAt").or_insert_with(|| json!(now));
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Value::Object(data));
        self.notify(collection, id);
        Ok(())
    }

    fn notify(&self, collection: &str, id: &str) {
        // No receivers is fine; watches subscribe lazily.
        let _ = self.changes.send(Change {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    async fn get_doc(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            })
    }

    async fn run_query(&self, collection: &str, query: &StoreQuery) -> Vec<Document> {
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, data)| {
                        query
                            .filters
                            .iter()
                            .all(|filter| filter_matches(filter, id, data))
                    })
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        if let Some((key, direction)) = &query.order_by {
            docs.sort_by(|a, b| cmp_docs(a, b, key, *direction));
        }
        if let Some(position) = &query.start_after {
            docs.retain(|doc| after_position(doc, position, query.order_by.as_ref()));
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        docs
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.get_doc(collection, id).await)
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<Document>> {
        Ok(self.run_query(collection, query).await)
    }

    async fn watch(&self, collection: &str, id: &str) -> Result<mpsc::Receiver<Option<Document>>> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let mut changes = self.changes.subscribe();
        let store = self.clone();
        let collection = collection.to_string();
        let id = id.to_string();
        tokio::spawn(async move {
            // Subscribed before the snapshot, so no change can fall between
            // the initial emission and the loop.
            let mut last = store.get_doc(&collection, &id).await;
            if tx.send(last.clone()).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(change) if change.collection == collection && change.id == id => {}
                    Ok(_) => continue,
                    // Lagged: coalesce to the current value.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let current = store.get_doc(&collection, &id).await;
                if current != last {
                    if tx.send(current.clone()).await.is_err() {
                        break;
                    }
                    last = current;
                }
            }
        });
        Ok(rx)
    }

    async fn watch_query(
        &self,
        collection: &str,
        query: &StoreQuery,
    ) -> Result<mpsc::Receiver<Vec<Document>>> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let mut changes = self.changes.subscribe();
        let store = self.clone();
        let collection = collection.to_string();
        let query = query.clone();
        tokio::spawn(async move {
            let mut last = store.run_query(&collection, &query).await;
            if tx.send(last.clone()).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(change) if change.collection == collection => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let current = store.run_query(&collection, &query).await;
                if current != last {
                    if tx.send(current.clone()).await.is_err() {
                        break;
                    }
                    last = current;
                }
            }
        });
        Ok(rx)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn filter_matches(filter: &Filter, id: &str, data: &Value) -> bool {
    match filter {
        Filter::Eq(field, value) => data.get(field) == Some(value),
        Filter::NotId(excluded) => id != excluded,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OrderVal {
    Time(DateTime<Utc>),
    Num(f64),
}

fn order_val(value: Option<&Value>, key: &SortKey) -> Option<OrderVal> {
    match key {
        SortKey::Time(_) => value?
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| OrderVal::Time(ts.with_timezone(&Utc))),
        SortKey::Number(_) => value?.as_f64().map(OrderVal::Num),
    }
}

fn cmp_order(a: &OrderVal, b: &OrderVal) -> Ordering {
    match (a, b) {
        (OrderVal::Time(x), OrderVal::Time(y)) => x.cmp(y),
        (OrderVal::Num(x), OrderVal::Num(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        // Same key, so mixed variants never happen; keep the order total anyway.
        (OrderVal::Time(_), OrderVal::Num(_)) => Ordering::Greater,
        (OrderVal::Num(_), OrderVal::Time(_)) => Ordering::Less,
    }
}

// Missing or unparsable sort values rank lowest, which puts them last in the
// descending queries the catalog issues. Ties break on id ascending.
fn cmp_sort_values(a: Option<OrderVal>, b: Option<OrderVal>, direction: Direction) -> Ordering {
    let ord = match (a, b) {
        (Some(x), Some(y)) => cmp_order(&x, &y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };
    match direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

fn cmp_docs(a: &Document, b: &Document, key: &SortKey, direction: Direction) -> Ordering {
    cmp_sort_values(
        order_val(a.data.get(key.field()), key),
        order_val(b.data.get(key.field()), key),
        direction,
    )
    .then_with(|| a.id.cmp(&b.id))
}

fn after_position(
    doc: &Document,
    position: &Position,
    order: Option<&(SortKey, Direction)>,
) -> bool {
    let ord = match order {
        Some((key, direction)) => cmp_sort_values(
            order_val(doc.data.get(key.field()), key),
            order_val(Some(&position.sort_value), key),
            *direction,
        )
        .then_with(|| doc.id.cmp(&position.doc_id)),
        None => doc.id.cmp(&position.doc_id),
    };
    ord == Ordering::Greater
}
