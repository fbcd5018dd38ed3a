//! Document store abstraction.
//!
//! The catalog only reads; records are created and mutated by an administrative
//! process outside this service. The store is injected behind [`DocumentStore`]
//! so the query layer can run against the in-memory double in tests and the
//! Postgres JSONB store in production.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Collection holding product records.
pub const PRODUCTS: &str = "products";
/// Collection holding review records.
pub const REVIEWS: &str = "reviews";

/// A raw record: store-assigned id plus the JSON document body.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Predicate on a single document.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Field equals the given JSON value.
    Eq(String, Value),
    /// Document id differs from the given id.
    NotId(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Filter::Eq(field.into(), value)
    }

    pub fn not_id(id: impl Into<String>) -> Self {
        Filter::NotId(id.into())
    }
}

/// Sort key with enough type information for both stores to order correctly
/// (RFC 3339 timestamps compare as instants, not as strings).
#[derive(Clone, Debug, PartialEq)]
pub enum SortKey {
    /// Field holding an RFC 3339 timestamp, e.g. `createdAt`.
    Time(String),
    /// Field holding a JSON number, e.g. `rating`.
    Number(String),
}

impl SortKey {
    pub fn field(&self) -> &str {
        match self {
            SortKey::Time(field) | SortKey::Number(field) => field,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A resumption point inside an ordered result: the sort value of the last row
/// already seen plus its document id as the tie-break. `start_after` is
/// strictly-after; the row at the position itself is never returned again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "v")]
    pub sort_value: Value,
    #[serde(rename = "id")]
    pub doc_id: String,
}

/// Logical query shape: conjunctive filters, at most one sort key, limit, and
/// an optional resumption position. Queries without a sort key return
/// documents in id order, which is what gives the naive search scan its
/// deterministic "collection order".
#[derive(Clone, Debug, Default)]
pub struct StoreQuery {
    pub filters: Vec<Filter>,
    pub order_by: Option<(SortKey, Direction)>,
    pub limit: Option<usize>,
    pub start_after: Option<Position>,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, key: SortKey, direction: Direction) -> Self {
        self.order_by = Some((key, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, position: Position) -> Self {
        self.start_after = Some(position);
        self
    }
}

/// Read-side primitives of the document database.
///
/// `watch` and `watch_query` emit the current value immediately and again on
/// every subsequent change, until the receiver is dropped. Delivery is
/// last-value-wins: intermediate states may be coalesced, and a transient
/// store failure inside a watch emits an empty result without terminating the
/// watch.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Point lookup; a miss is `None`.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Filtered, ordered, limited scan of one collection.
    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<Document>>;

    /// Live view of a single document.
    async fn watch(&self, collection: &str, id: &str) -> Result<mpsc::Receiver<Option<Document>>>;

    /// Live view of a query's full result set, recomputed on every change.
    async fn watch_query(
        &self,
        collection: &str,
        query: &StoreQuery,
    ) -> Result<mpsc::Receiver<Vec<Document>>>;
}
