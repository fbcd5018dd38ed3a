//! Giftcart Catalog
//!
//! Catalog query service for a digital gift-card storefront: typed, filtered,
//! paginated, and optionally live read views over a `products` document
//! collection, plus a read-mostly `reviews` collection.
//!
//! ## Features
//! - Point lookup, category / featured / popular / sale / related listings
//! - Cursor-based forward pagination keyed on creation time
//! - Live subscriptions to a product or a category listing
//! - Naive substring search behind a pluggable backend
//! - Injected document store: in-memory for tests, Postgres JSONB in production

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod search;
pub mod store;

pub use catalog::{
    CatalogService, CategorySubscription, Cursor, ProductPage, ProductSubscription, Subscription,
};
pub use error::{CatalogError, Result};
pub use model::{Faq, Product, Review, ReviewSummary};
