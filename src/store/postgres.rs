//! Postgres-backed document store.
//!
//! Documents live in a single `documents` table keyed by `(collection, id)`
//! with the body in a JSONB column; equality filters use containment, sort
//! keys cast the relevant field. Watches are interval polls that re-run the
//! read and emit when the snapshot changes; a failed poll emits an empty
//! result and keeps the watch alive.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use super::{Direction, Document, DocumentStore, Filter, Position, SortKey, StoreQuery};
use crate::error::{CatalogError, Result};

const WATCH_BUFFER: usize = 16;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn fetch(&self, collection: &str, query: &StoreQuery) -> Result<Vec<Document>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());

        for filter in &query.filters {
            match filter {
                Filter::Eq(field, value) => {
                    let mut probe = serde_json::Map::new();
                    probe.insert(field.clone(), value.clone());
                    builder.push(" AND data @> ");
                    builder.push_bind(Value::Object(probe));
                }
                Filter::NotId(excluded) => {
                    builder.push(" AND id <> ");
                    builder.push_bind(excluded.clone());
                }
            }
        }

        if let Some(position) = &query.start_after {
            push_position(&mut builder, position, query.order_by.as_ref())?;
        }

        match &query.order_by {
            Some((key, direction)) => {
                builder.push(" ORDER BY ");
                builder.push(sort_expr(key));
                builder.push(match direction {
                    Direction::Desc => " DESC NULLS LAST",
                    Direction::Asc => " ASC NULLS FIRST",
                });
                builder.push(", id ASC");
            }
            None => {
                builder.push(" ORDER BY id ASC");
            }
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(Document {
                    id: row.try_get("id")?,
                    data: row.try_get("data")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Document {
                id: id.to_string(),
                data: row.try_get("data")?,
            })
        })
        .transpose()
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<Document>> {
        self.fetch(collection, query).await
    }

    async fn watch(&self, collection: &str, id: &str) -> Result<mpsc::Receiver<Option<Document>>> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let store = self.clone();
        let collection = collection.to_string();
        let id = id.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Option<Document>> = None;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let current = match store.get(&collection, &id).await {
                    Ok(doc) => doc,
                    Err(err) => {
                        warn!(%collection, %id, error = %err, "document watch poll failed");
                        None
                    }
                };
                if last.as_ref() != Some(&current) {
                    if tx.send(current.clone()).await.is_err() {
                        break;
                    }
                    last = Some(current);
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
        let store = self.clone();
        let collection = collection.to_string();
        let query = query.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Vec<Document>> = None;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let current = match store.fetch(&collection, &query).await {
                    Ok(docs) => docs,
                    Err(err) => {
                        warn!(%collection, error = %err, "query watch poll failed");
                        Vec::new()
                    }
                };
                if last.as_ref() != Some(&current) {
                    if tx.send(current.clone()).await.is_err() {
                        break;
                    }
                    last = Some(current);
                }
            }
        });
        Ok(rx)
    }
}

// Sort fields come from catalog code, never from callers; the identifier
// filter keeps the interpolation inert regardless.
fn ident(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn sort_expr(key: &SortKey) -> String {
    match key {
        SortKey::Time(field) => format!("(data->>'{}')::timestamptz", ident(field)),
        SortKey::Number(field) => format!("(data->>'{}')::float8", ident(field)),
    }
}

fn push_position(
    builder: &mut QueryBuilder<'_, Postgres>,
    position: &Position,
    order: Option<&(SortKey, Direction)>,
) -> Result<()> {
    match order {
        Some((key @ SortKey::Time(_), direction)) => {
            let ts: DateTime<Utc> = position
                .sort_value
                .as_str()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|ts| ts.with_timezone(&Utc))
                .ok_or(CatalogError::InvalidCursor)?;
            push_compound(builder, &sort_expr(key), ts, &position.doc_id, *direction);
        }
        Some((key @ SortKey::Number(_), direction)) => {
            let num = position
                .sort_value
                .as_f64()
                .ok_or(CatalogError::InvalidCursor)?;
            push_compound(builder, &sort_expr(key), num, &position.doc_id, *direction);
        }
        None => {
            builder.push(" AND id > ");
            builder.push_bind(position.doc_id.clone());
        }
    }
    Ok(())
}

fn push_compound<'args, T>(
    builder: &mut QueryBuilder<'args, Postgres>,
    expr: &str,
    value: T,
    doc_id: &str,
    direction: Direction,
) where
    T: Clone + Send + sqlx::Encode<'args, Postgres> + sqlx::Type<Postgres> + 'args,
{
    let cmp = match direction {
        Direction::Desc => "<",
        Direction::Asc => ">",
    };
    builder.push(" AND (");
    builder.push(expr);
    builder.push(format!(" {cmp} "));
    builder.push_bind(value.clone());
    builder.push(" OR (");
    builder.push(expr);
    builder.push(" = ");
    builder.push_bind(value);
    builder.push(" AND id > ");
    builder.push_bind(doc_id.to_string());
    builder.push("))");
}
