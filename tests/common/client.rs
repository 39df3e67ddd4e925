//! HTTP client for end-to-end tests
//!
//! A thin wrapper over reqwest with one method per endpoint.
//! When API routes or request formats change, update only this file.
#![allow(dead_code)]

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a new unauthenticated client
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client logged in as the lender
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_EMAIL, TEST_PASS).await
    }

    /// Creates a client logged in as the borrower
    pub async fn authenticated_borrower(base_url: String) -> Self {
        Self::authenticated_as(base_url, BORROWER_EMAIL, BORROWER_PASS).await
    }

    pub async fn authenticated_as(base_url: String, email: &str, password: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.login(email, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Authentication of {} failed: {:?}",
            email,
            response.text().await
        );

        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/register
    pub async fn register(&self, email: &str, username: &str, password: &str) -> Response {
        self.client
            .post(self.url("/v1/auth/register"))
            .json(&json!({
                "email": email,
                "username": username,
                "password": password,
            }))
            .send()
            .await
            .expect("Register request failed")
    }

    /// POST /v1/auth/login
    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /v1/auth/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(self.url("/v1/auth/logout"))
            .send()
            .await
            .expect("Logout request failed")
    }

    /// GET /
    pub async fn get_stats(&self) -> Response {
        self.client
            .get(self.url("/"))
            .send()
            .await
            .expect("Stats request failed")
    }

    // ========================================================================
    // User Endpoints
    // ========================================================================

    /// GET /v1/users
    pub async fn get_users(&self) -> Response {
        self.client
            .get(self.url("/v1/users"))
            .send()
            .await
            .expect("Get users request failed")
    }

    /// GET /v1/users/{id}
    pub async fn get_user(&self, user_id: &str) -> Response {
        self.client
            .get(self.url(&format!("/v1/users/{}", user_id)))
            .send()
            .await
            .expect("Get user request failed")
    }

    /// PUT /v1/users/{id}
    pub async fn update_user(&self, user_id: &str, update: Value) -> Response {
        self.client
            .put(self.url(&format!("/v1/users/{}", user_id)))
            .json(&update)
            .send()
            .await
            .expect("Update user request failed")
    }

    /// DELETE /v1/users/{id}
    pub async fn delete_user(&self, user_id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/v1/users/{}", user_id)))
            .send()
            .await
            .expect("Delete user request failed")
    }

    /// GET /v1/users/{id}/listings?borrowed={borrowed}
    pub async fn get_user_listings(&self, user_id: &str, borrowed: bool) -> Response {
        self.client
            .get(self.url(&format!(
                "/v1/users/{}/listings?borrowed={}",
                user_id, borrowed
            )))
            .send()
            .await
            .expect("Get user listings request failed")
    }

    // ========================================================================
    // Listing Endpoints
    // ========================================================================

    /// GET /v1/listings
    pub async fn get_listings(&self) -> Response {
        self.client
            .get(self.url("/v1/listings"))
            .send()
            .await
            .expect("Get listings request failed")
    }

    /// POST /v1/listings
    pub async fn create_listing(&self, title: &str, description: Option<&str>) -> Response {
        self.client
            .post(self.url("/v1/listings"))
            .json(&json!({ "title": title, "description": description }))
            .send()
            .await
            .expect("Create listing request failed")
    }

    /// GET /v1/listings/search?q={query}
    pub async fn search_listings(&self, query: &str) -> Response {
        self.client
            .get(self.url("/v1/listings/search"))
            .query(&[("q", query)])
            .send()
            .await
            .expect("Search listings request failed")
    }

    /// GET /v1/listings/{id}
    pub async fn get_listing(&self, listing_id: &str) -> Response {
        self.client
            .get(self.url(&format!("/v1/listings/{}", listing_id)))
            .send()
            .await
            .expect("Get listing request failed")
    }

    /// DELETE /v1/listings/{id}
    pub async fn delete_listing(&self, listing_id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/v1/listings/{}", listing_id)))
            .send()
            .await
            .expect("Delete listing request failed")
    }

    /// POST /v1/listings/{id}/interest
    pub async fn express_interest(&self, listing_id: &str) -> Response {
        self.client
            .post(self.url(&format!("/v1/listings/{}/interest", listing_id)))
            .send()
            .await
            .expect("Express interest request failed")
    }

    /// PUT /v1/listings/{id}/transaction
    pub async fn make_transaction(&self, listing_id: &str, request: Value) -> Response {
        self.client
            .put(self.url(&format!("/v1/listings/{}/transaction", listing_id)))
            .json(&request)
            .send()
            .await
            .expect("Transaction request failed")
    }

    // ========================================================================
    // Dashboard
    // ========================================================================

    /// GET /dashboard, optionally submitting a search
    pub async fn get_dashboard(&self, query: Option<&str>) -> Response {
        let mut request = self.client.get(self.url("/dashboard"));
        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }
        request.send().await.expect("Dashboard request failed")
    }
}
