//! Free-text product search.
//!
//! The default backend reproduces the storefront contract literally: fetch
//! the whole collection in collection order, keep case-insensitive substring
//! matches on name or description, truncate. That is an O(n) scan with no
//! ranking; anything beyond catalog-sized data should implement
//! [`SearchBackend`] over a real text index instead.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::products_from_documents_lossy;
use crate::error::Result;
use crate::model::Product;
use crate::store::{DocumentStore, StoreQuery, PRODUCTS};

#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<Product>>;
}

/// The naive linear scan.
pub struct ScanSearch {
    store: Arc<dyn DocumentStore>,
}

impl ScanSearch {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchBackend for ScanSearch {
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<Product>> {
        let docs = self.store.query(PRODUCTS, &StoreQuery::new()).await?;
        let needle = term.to_lowercase();
        Ok(products_from_documents_lossy(docs)
            .into_iter()
            .filter(|product| {
                product.name.to_lowercase().contains(&needle)
                    || product.description.to_lowercase().contains(&needle)
            })
            .take(limit)
            .collect())
    }
}
