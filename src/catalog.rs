//! The catalog query service.
//!
//! Stateless request/response over an injected [`DocumentStore`], plus
//! independent live subscriptions. One-shot calls surface store failures to
//! the caller and never retry; subscriptions emit an empty result on a
//! transient failure and keep listening.

use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{instrument, warn};

use crate::error::{CatalogError, Result};
use crate::model::{Product, Review, ReviewSummary};
use crate::search::{ScanSearch, SearchBackend};
use crate::store::{
    Direction, Document, DocumentStore, Filter, Position, SortKey, StoreQuery, PRODUCTS, REVIEWS,
};

pub const DEFAULT_CATEGORY_LIMIT: usize = 6;
pub const DEFAULT_SHELF_LIMIT: usize = 4;
pub const DEFAULT_RELATED_LIMIT: usize = 3;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

const CREATED_AT: &str = "createdAt";
const RATING: &str = "rating";
const DATE: &str = "date";

/// Opaque pagination marker. Callers hold it between page requests and must
/// not interpret it; decoding a string this service did not mint yields
/// [`CatalogError::InvalidCursor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Cursor(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn after_product(product: &Product) -> Self {
        Cursor(
            json!({
                "v": product.created_at.to_rfc3339(),
                "id": product.id,
            })
            .to_string(),
        )
    }

    fn decode(&self) -> Result<Position> {
        let value: Value = serde_json::from_str(&self.0).map_err(|_| CatalogError::InvalidCursor)?;
        let sort_value = value.get("v").cloned().ok_or(CatalogError::InvalidCursor)?;
        let doc_id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or(CatalogError::InvalidCursor)?
            .to_string();
        Ok(Position { sort_value, doc_id })
    }
}

/// One page of a category listing. `next_cursor` is `None` on the final page.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub next_cursor: Option<Cursor>,
}

pub struct CatalogService {
    store: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchBackend>,
}

impl CatalogService {
    /// The default search backend is the literal collection scan; swap it via
    /// [`with_search_backend`](Self::with_search_backend).
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let search = Arc::new(ScanSearch::new(store.clone()));
        Self { store, search }
    }

    pub fn with_search_backend(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = search;
        self
    }

    /// Point lookup. A miss is `None`, not an error.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        match self.store.get(PRODUCTS, id).await? {
            Some(doc) => Ok(Some(Product::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Newest first; an unknown or empty category yields an empty sequence.
    #[instrument(skip(self))]
    pub async fn products_by_category(&self, category: &str, limit: usize) -> Result<Vec<Product>> {
        let docs = self
            .store
            .query(PRODUCTS, &category_query(category, limit))
            .await?;
        products_from_documents(docs)
    }

    #[instrument(skip(self))]
    pub async fn featured_products(&self, limit: usize) -> Result<Vec<Product>> {
        let query = StoreQuery::new()
            .filter(Filter::eq("featured", json!(true)))
            .order_by(SortKey::Time(CREATED_AT.into()), Direction::Desc)
            .limit(limit);
        products_from_documents(self.store.query(PRODUCTS, &query).await?)
    }

    /// Best-rated first.
    #[instrument(skip(self))]
    pub async fn popular_products(&self, limit: usize) -> Result<Vec<Product>> {
        let query = StoreQuery::new()
            .filter(Filter::eq("popular", json!(true)))
            .order_by(SortKey::Number(RATING.into()), Direction::Desc)
            .limit(limit);
        products_from_documents(self.store.query(PRODUCTS, &query).await?)
    }

    #[instrument(skip(self))]
    pub async fn sale_products(&self, limit: usize) -> Result<Vec<Product>> {
        let query = StoreQuery::new()
            .filter(Filter::eq("sale", json!(true)))
            .order_by(SortKey::Time(CREATED_AT.into()), Direction::Desc)
            .limit(limit);
        products_from_documents(self.store.query(PRODUCTS, &query).await?)
    }

    /// Same category, excluding the product itself. Ordered newest first so
    /// the panel is stable across reloads.
    #[instrument(skip(self))]
    pub async fn related_products(
        &self,
        product_id: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let query = StoreQuery::new()
            .filter(Filter::eq("category", json!(category)))
            .filter(Filter::not_id(product_id))
            .order_by(SortKey::Time(CREATED_AT.into()), Direction::Desc)
            .limit(limit);
        products_from_documents(self.store.query(PRODUCTS, &query).await?)
    }

    /// Cursor-based forward pagination over one category, newest first. Pass
    /// `None` for the first page. Following `next_cursor` until it is `None`
    /// walks the whole category with no duplicates or omissions, barring
    /// concurrent mutation.
    #[instrument(skip(self))]
    pub async fn next_products_batch(
        &self,
        category: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<ProductPage> {
        let mut query = category_query(category, limit);
        if let Some(cursor) = cursor {
            query = query.start_after(cursor.decode()?);
        }
        let products = products_from_documents(self.store.query(PRODUCTS, &query).await?)?;
        let next_cursor = if products.len() < limit {
            None
        } else {
            products.last().map(Cursor::after_product)
        };
        Ok(ProductPage {
            products,
            next_cursor,
        })
    }

    /// Case-insensitive substring match on name or description via the
    /// configured search backend.
    #[instrument(skip(self))]
    pub async fn search_products(&self, term: &str, limit: usize) -> Result<Vec<Product>> {
        self.search.search(term, limit).await
    }

    /// Live view of one product: the current value (or `None` if absent) is
    /// emitted immediately, then again on every subsequent change until the
    /// subscription is cancelled or dropped.
    #[instrument(skip(self))]
    pub async fn subscribe_to_product(&self, id: &str) -> Result<ProductSubscription> {
        let mut watch = self.store.watch(PRODUCTS, id).await?;
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            while let Some(doc) = watch.recv().await {
                let product = doc.and_then(|doc| match Product::from_document(doc) {
                    Ok(product) => Some(product),
                    Err(err) => {
                        warn!(error = %err, "dropping malformed product emission");
                        None
                    }
                });
                if tx.send(product).await.is_err() {
                    break;
                }
            }
        });
        Ok(Subscription {
            rx,
            guard: TaskGuard(task),
        })
    }

    /// Live view of a category listing: the full recomputed ordered sequence
    /// is emitted on every change to the member set.
    #[instrument(skip(self))]
    pub async fn subscribe_to_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<CategorySubscription> {
        let mut watch = self
            .store
            .watch_query(PRODUCTS, &category_query(category, limit))
            .await?;
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            while let Some(docs) = watch.recv().await {
                if tx.send(products_from_documents_lossy(docs)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Subscription {
            rx,
            guard: TaskGuard(task),
        })
    }

    /// All reviews for a product, newest first.
    #[instrument(skip(self))]
    pub async fn product_reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        let query = StoreQuery::new()
            .filter(Filter::eq("productId", json!(product_id)))
            .order_by(SortKey::Time(DATE.into()), Direction::Desc);
        self.store
            .query(REVIEWS, &query)
            .await?
            .into_iter()
            .map(Review::from_document)
            .collect()
    }

    /// `None` when the product has no reviews.
    #[instrument(skip(self))]
    pub async fn review_summary(&self, product_id: &str) -> Result<Option<ReviewSummary>> {
        let reviews = self.product_reviews(product_id).await?;
        Ok(ReviewSummary::from_reviews(&reviews))
    }
}

fn category_query(category: &str, limit: usize) -> StoreQuery {
    StoreQuery::new()
        .filter(Filter::eq("category", json!(category)))
        .order_by(SortKey::Time(CREATED_AT.into()), Direction::Desc)
        .limit(limit)
}

fn products_from_documents(docs: Vec<Document>) -> Result<Vec<Product>> {
    docs.into_iter().map(Product::from_document).collect()
}

pub(crate) fn products_from_documents_lossy(docs: Vec<Document>) -> Vec<Product> {
    docs.into_iter()
        .filter_map(|doc| match Product::from_document(doc) {
            Ok(product) => Some(product),
            Err(err) => {
                warn!(error = %err, "skipping malformed product document");
                None
            }
        })
        .collect()
}

/// Aborts the forwarding task when the subscription (or its stream) goes away,
/// so the store-side watch channel is released with it.
#[derive(Debug)]
struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handle to a live subscription. Cancellation is terminal and idempotent;
/// dropping the handle releases the underlying watch as well.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    guard: TaskGuard,
}

pub type ProductSubscription = Subscription<Option<Product>>;
pub type CategorySubscription = Subscription<Vec<Product>>;

impl<T> Subscription<T> {
    /// Next emission; `None` once the subscription has been cancelled and
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn cancel(&mut self) {
        self.guard.abort();
        self.rx.close();
    }

    /// Converts into a stream for push-style consumers (e.g. SSE).
    pub fn into_stream(self) -> SubscriptionStream<T> {
        SubscriptionStream {
            inner: ReceiverStream::new(self.rx),
            _guard: self.guard,
        }
    }
}

#[derive(Debug)]
pub struct SubscriptionStream<T> {
    inner: ReceiverStream<T>,
    _guard: TaskGuard,
}

impl<T> Stream for SubscriptionStream<T> {
    type Item = T;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<T>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}
