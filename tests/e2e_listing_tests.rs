//! End-to-end tests for listing endpoints: creation, lookup, search,
//! interest and deletion

mod common;

use common::{
    TestClient, TestServer, LADDER_DESCRIPTION, LADDER_TITLE, TENT_TITLE, TEST_USERNAME,
};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn test_get_all_listings() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_listings().await;
    assert_eq!(response.status(), StatusCode::OK);

    let listings: Vec<Value> = response.json().await.unwrap();
    let titles: Vec<&str> = listings
        .iter()
        .map(|l| l["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec![LADDER_TITLE, TENT_TITLE]);
    assert!(listings.iter().all(|l| l["state"] == "available"));
}

#[tokio::test]
async fn test_create_listing_references_owner() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated_borrower(server.base_url.clone()).await;

    let response = client.create_listing("Drill", Some("Cordless")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let listing: Value = response.json().await.unwrap();
    assert_eq!(listing["title"], "Drill");
    assert_eq!(listing["description"], "Cordless");
    assert_eq!(listing["state"], "available");
    assert_eq!(listing["owner_id"], server.ids.borrower_id.0.as_str());
    assert_eq!(listing["interested"], json!([]));
    assert!(listing["buyer_id"].is_null());

    let user: Value = client
        .get_user(&server.ids.borrower_id.0)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(user["listings"], json!([listing["id"]]));
}

#[tokio::test]
async fn test_create_listing_requires_title() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client.create_listing("   ", None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let listings = server.marketplace.get_all_listings().await.unwrap();
    assert_eq!(listings.len(), 2);
}

#[tokio::test]
async fn test_get_listing_joins_owner() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_listing(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing: Value = response.json().await.unwrap();
    assert_eq!(listing["title"], LADDER_TITLE);
    assert_eq!(listing["description"], LADDER_DESCRIPTION);
    assert_eq!(
        listing["owner_info"],
        json!({"username": TEST_USERNAME, "user_id": server.ids.lender_id.0})
    );
}

#[tokio::test]
async fn test_get_unknown_listing() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_listing("does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "listing not found"}));
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.search_listings("LADDER").await;
    assert_eq!(response.status(), StatusCode::OK);
    let found: Vec<Value> = response.json().await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], server.ids.ladder_id.0.as_str());

    // Descriptions are searched too
    let found: Vec<Value> = client
        .search_listings("waterproof")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], server.ids.tent_id.0.as_str());
}

#[tokio::test]
async fn test_blank_search_finds_nothing() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let found: Vec<Value> = client.search_listings("  ").await.json().await.unwrap();
    assert!(found.is_empty());

    let found: Vec<Value> = client
        .search_listings("submarine")
        .await
        .json()
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_interest_is_recorded_once() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated_borrower(server.base_url.clone()).await;

    let response = client.express_interest(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = client.express_interest(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing: Value = client
        .get_listing(&server.ids.ladder_id.0)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listing["interested"], json!([server.ids.borrower_id.0]));
}

#[tokio::test]
async fn test_interest_in_unknown_listing() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated_borrower(server.base_url.clone()).await;

    let response = client.express_interest("does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_owner_deletes_listing() {
    let server = TestServer::spawn().await;

    let borrower = TestClient::authenticated_borrower(server.base_url.clone()).await;
    let response = borrower.delete_listing(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let lender = TestClient::authenticated(server.base_url.clone()).await;
    let response = lender.delete_listing(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = lender.get_listing(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = lender.delete_listing(&server.ids.ladder_id.0).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
