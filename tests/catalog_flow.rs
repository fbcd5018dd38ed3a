//! End-to-end catalog behavior over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use giftcart_catalog::catalog::CatalogService;
use giftcart_catalog::error::CatalogError;
use giftcart_catalog::store::memory::MemoryStore;
use giftcart_catalog::store::{PRODUCTS, REVIEWS};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn card(name: &str, category: &str, price: f64, created_at: &str) -> Value {
    json!({
        "name": name,
        "description": format!("{name} digital gift card"),
        "price": price,
        "image": "/images/card.png",
        "category": category,
        "createdAt": created_at,
        "updatedAt": created_at,
    })
}

fn day(n: usize) -> String {
    format!("2024-01-{n:02}T00:00:00Z")
}

fn catalog(store: &MemoryStore) -> CatalogService {
    CatalogService::new(Arc::new(store.clone()))
}

/// Eight "games" products created on days 1..=8, ids g1..g8.
async fn seed_games(store: &MemoryStore) {
    for n in 1..=8 {
        store
            .insert_with_id(
                PRODUCTS,
                &format!("g{n}"),
                card(&format!("Game Card {n}"), "games", 10.0, &day(n)),
            )
            .await
            .unwrap();
    }
    store
        .insert_with_id(PRODUCTS, "m1", card("Music Card", "music", 15.0, &day(9)))
        .await
        .unwrap();
}

#[tokio::test]
async fn point_lookup_returns_stored_state() {
    let store = MemoryStore::new();
    store
        .insert_with_id(PRODUCTS, "p1", card("Steam", "games", 25.0, &day(1)))
        .await
        .unwrap();
    let catalog = catalog(&store);

    let product = catalog.get_product("p1").await.unwrap().unwrap();
    assert_eq!(product.id, "p1");
    assert_eq!(product.name, "Steam");
    assert_eq!(product.price, dec!(25));

    assert!(catalog.get_product("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn category_listing_is_filtered_ordered_and_limited() {
    let store = MemoryStore::new();
    seed_games(&store).await;
    let catalog = catalog(&store);

    let products = catalog.products_by_category("games", 6).await.unwrap();
    let ids: Vec<&str> = products.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["g8", "g7", "g6", "g5", "g4", "g3"]);
    assert!(products.iter().all(|p| p.category == "games"));
    assert!(products
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));

    assert!(catalog
        .products_by_category("nonexistent", 6)
        .await
        .unwrap()
        .is_empty());
    assert!(catalog.products_by_category("", 6).await.unwrap().is_empty());
}

#[tokio::test]
async fn pagination_scenario_two_pages() {
    let store = MemoryStore::new();
    seed_games(&store).await;
    let catalog = catalog(&store);

    let first = catalog.next_products_batch("games", None, 6).await.unwrap();
    let ids: Vec<&str> = first.products.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["g8", "g7", "g6", "g5", "g4", "g3"]);
    let cursor = first.next_cursor.expect("a full page has a next cursor");

    let second = catalog
        .next_products_batch("games", Some(&cursor), 6)
        .await
        .unwrap();
    let ids: Vec<&str> = second.products.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["g2", "g1"]);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn pagination_walk_covers_the_category_exactly() {
    let store = MemoryStore::new();
    seed_games(&store).await;
    let catalog = catalog(&store);

    let mut walked: Vec<String> = Vec::new();
    let mut cursor = None;
    loop {
        let page = catalog
            .next_products_batch("games", cursor.as_ref(), 3)
            .await
            .unwrap();
        walked.extend(page.products.iter().map(|p| p.id.clone()));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let all: Vec<String> = catalog
        .products_by_category("games", 100)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(walked, all);
    let mut deduped = walked.clone();
    deduped.dedup();
    assert_eq!(walked, deduped);
}

#[tokio::test]
async fn foreign_cursor_is_rejected() {
    let store = MemoryStore::new();
    seed_games(&store).await;
    let catalog = catalog(&store);

    let cursor = giftcart_catalog::Cursor::new("definitely-not-a-cursor");
    let err = catalog
        .next_products_batch("games", Some(&cursor), 6)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidCursor));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn related_products_exclude_the_product_itself() {
    let store = MemoryStore::new();
    seed_games(&store).await;
    let catalog = catalog(&store);

    let related = catalog.related_products("g8", "games", 3).await.unwrap();
    let ids: Vec<&str> = related.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["g7", "g6", "g5"]);
    assert!(related.iter().all(|p| p.id != "g8"));
}

#[tokio::test]
async fn shelves_filter_by_flag() {
    let store = MemoryStore::new();
    for (id, flags, rating) in [
        ("a", json!({"featured": true}), 4.2),
        ("b", json!({"popular": true}), 4.9),
        ("c", json!({"popular": true}), 3.8),
        ("d", json!({"sale": true, "originalPrice": 30.0}), 4.0),
    ] {
        let mut data = card(id, "games", 20.0, &day(1));
        data["rating"] = json!(rating);
        data.as_object_mut()
            .unwrap()
            .extend(flags.as_object().unwrap().clone());
        store.insert_with_id(PRODUCTS, id, data).await.unwrap();
    }
    let catalog = catalog(&store);

    let featured = catalog.featured_products(4).await.unwrap();
    assert_eq!(featured.len(), 1);
    assert_eq!(featured[0].id, "a");

    let popular = catalog.popular_products(4).await.unwrap();
    let ids: Vec<&str> = popular.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["b", "c"]);

    let sale = catalog.sale_products(4).await.unwrap();
    assert_eq!(sale.len(), 1);
    assert_eq!(sale[0].original_price, Some(dec!(30)));
}

#[tokio::test]
async fn search_returns_the_exact_match_subset() {
    let store = MemoryStore::new();
    store
        .insert(PRODUCTS, card("Steam Wallet", "games", 25.0, &day(1)))
        .await
        .unwrap();
    store
        .insert(PRODUCTS, card("PlayStation Plus", "games", 60.0, &day(2)))
        .await
        .unwrap();
    store
        .insert(PRODUCTS, card("Xbox Game Pass", "games", 45.0, &day(3)))
        .await
        .unwrap();
    let catalog = catalog(&store);

    // Every description contains "gift card"; all matches fit the limit.
    assert_eq!(catalog.search_products("gift card", 10).await.unwrap().len(), 3);
    assert_eq!(catalog.search_products("GIFT", 2).await.unwrap().len(), 2);

    let hits = catalog.search_products("steam", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Steam Wallet");

    assert!(catalog
        .search_products("no such card", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn product_subscription_lifecycle() {
    let store = MemoryStore::new();
    store
        .insert_with_id(PRODUCTS, "p1", card("Steam", "games", 25.0, &day(1)))
        .await
        .unwrap();
    let catalog = catalog(&store);

    let mut sub = catalog.subscribe_to_product("p1").await.unwrap();
    let initial = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(initial.price, dec!(25));

    store
        .update(PRODUCTS, "p1", json!({"price": 30.0}))
        .await
        .unwrap();
    let updated = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(updated.price, dec!(30));

    sub.cancel();
    sub.cancel();
    store
        .update(PRODUCTS, "p1", json!({"price": 35.0}))
        .await
        .unwrap();
    assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn subscribing_to_an_absent_product_emits_none_then_the_value() {
    let store = MemoryStore::new();
    let catalog = catalog(&store);

    let mut sub = catalog.subscribe_to_product("later").await.unwrap();
    assert!(timeout(WAIT, sub.recv()).await.unwrap().unwrap().is_none());

    store
        .insert_with_id(PRODUCTS, "later", card("Nintendo", "games", 35.0, &day(1)))
        .await
        .unwrap();
    let appeared = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(appeared.name, "Nintendo");
}

#[tokio::test]
async fn category_subscription_tracks_membership_and_order() {
    let store = MemoryStore::new();
    store
        .insert_with_id(PRODUCTS, "g1", card("Game Card 1", "games", 10.0, &day(1)))
        .await
        .unwrap();
    let catalog = catalog(&store);

    let mut sub = catalog.subscribe_to_category("games", 6).await.unwrap();
    let initial = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(initial.len(), 1);

    store
        .insert_with_id(PRODUCTS, "g2", card("Game Card 2", "games", 10.0, &day(2)))
        .await
        .unwrap();
    let grown = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    let ids: Vec<&str> = grown.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["g2", "g1"]);

    store.delete(PRODUCTS, "g2").await;
    let shrunk = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(shrunk.len(), 1);
    assert_eq!(shrunk[0].id, "g1");
}

#[tokio::test]
async fn reviews_are_ordered_newest_first_and_summarized() {
    let store = MemoryStore::new();
    for (id, rating, date) in [("r1", 5, day(1)), ("r2", 4, day(3)), ("r3", 2, day(2))] {
        store
            .insert_with_id(
                REVIEWS,
                id,
                json!({
                    "productId": "p1",
                    "userId": "u1",
                    "userName": "Ada",
                    "rating": rating,
                    "date": date,
                    "title": "title",
                    "content": "content",
                    "helpful": 3,
                }),
            )
            .await
            .unwrap();
    }
    store
        .insert_with_id(
            REVIEWS,
            "other",
            json!({
                "productId": "p2",
                "userId": "u2",
                "userName": "Grace",
                "rating": 1,
                "date": day(4),
                "title": "t",
                "content": "c",
            }),
        )
        .await
        .unwrap();
    let catalog = catalog(&store);

    let reviews = catalog.product_reviews("p1").await.unwrap();
    let ids: Vec<&str> = reviews.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["r2", "r3", "r1"]);
    assert!(reviews.iter().all(|r| r.product_id == "p1"));

    let summary = catalog.review_summary("p1").await.unwrap().unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.distribution, [0, 1, 0, 1, 1]);

    assert!(catalog.review_summary("unreviewed").await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_documents_surface_as_validation_errors() {
    let store = MemoryStore::new();
    store
        .insert_with_id(PRODUCTS, "broken", json!({"name": "No price"}))
        .await
        .unwrap();
    let catalog = catalog(&store);

    let err = catalog.get_product("broken").await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
    assert!(!err.is_retryable());
    assert!(CatalogError::StoreUnavailable("timeout".into()).is_retryable());
}
