//! Catalog records.
//!
//! Field names are serialized camelCase to match the document schema the
//! storefront and the administrative tooling share. Records are shaped and
//! validated on read; a document that fails validation surfaces as
//! [`CatalogError::Validation`](crate::error::CatalogError::Validation).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{CatalogError, Result};
use crate::store::Document;

/// A digital gift-card product. The sole domain entity of the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_pricing"))]
pub struct Product {
    /// Store-assigned id; not part of the document body.
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    /// Currency-unit amount; non-negative.
    pub price: Decimal,
    /// Pre-sale price; only meaningful with `sale`, and never below `price`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_images: Option<Vec<String>>,
    /// Exactly one taxonomy bucket per product.
    #[validate(length(min = 1))]
    pub category: String,
    #[serde(default)]
    pub popular: bool,
    #[serde(default)]
    pub sale: bool,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    /// Selectable face values overriding `price` at purchase time, in the
    /// order they should be offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominations: Option<Vec<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_use: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faqs: Option<Vec<Faq>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

impl Product {
    /// Shapes a raw document into a validated product.
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut product: Product = serde_json::from_value(doc.data)
            .map_err(|err| CatalogError::Validation(format!("malformed product document: {err}")))?;
        product.id = doc.id;
        product.validate()?;
        Ok(product)
    }
}

fn validate_pricing(product: &Product) -> std::result::Result<(), ValidationError> {
    if product.price < Decimal::ZERO {
        return Err(ValidationError::new("negative_price"));
    }
    if product.sale {
        if let Some(original) = product.original_price {
            if original < product.price {
                return Err(ValidationError::new("original_price_below_sale_price"));
            }
        }
    }
    if let Some(denominations) = &product.denominations {
        if denominations.is_empty() {
            return Err(ValidationError::new("empty_denominations"));
        }
        if denominations.iter().any(|d| *d <= Decimal::ZERO) {
            return Err(ValidationError::new("non_positive_denomination"));
        }
    }
    Ok(())
}

/// A customer review, read-mostly. `helpful` is incremented optimistically by
/// the storefront and is not durable in this layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    pub date: DateTime<Utc>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub helpful: u32,
}

impl Review {
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut review: Review = serde_json::from_value(doc.data)
            .map_err(|err| CatalogError::Validation(format!("malformed review document: {err}")))?;
        review.id = doc.id;
        review.validate()?;
        Ok(review)
    }
}

/// Aggregate view over a product's reviews for the detail panel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub average: f32,
    pub total: u32,
    /// Count per star, index 0 holding one-star reviews.
    pub distribution: [u32; 5],
}

impl ReviewSummary {
    /// `None` when there are no reviews to summarize.
    pub fn from_reviews(reviews: &[Review]) -> Option<Self> {
        if reviews.is_empty() {
            return None;
        }
        let total = reviews.len() as u32;
        let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
        let mut distribution = [0u32; 5];
        for review in reviews {
            if (1..=5).contains(&review.rating) {
                distribution[usize::from(review.rating) - 1] += 1;
            }
        }
        Some(Self {
            average: sum as f32 / total as f32,
            total,
            distribution,
        })
    }
}
