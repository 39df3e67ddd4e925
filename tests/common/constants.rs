//! Shared constants for end-to-end tests
//!
//! When seeded test data changes, update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Lender: owns the seeded listings
pub const TEST_EMAIL: &str = "lender@example.com";
pub const TEST_USERNAME: &str = "lender";
pub const TEST_PASS: &str = "testpass123";

/// Borrower: owns nothing
pub const BORROWER_EMAIL: &str = "borrower@example.com";
pub const BORROWER_USERNAME: &str = "borrower";
pub const BORROWER_PASS: &str = "borrowpass123";

// ============================================================================
// Seeded Listings (owned by the lender)
// ============================================================================

pub const LADDER_TITLE: &str = "Aluminium Ladder";
pub const LADDER_DESCRIPTION: &str = "Three meters, folds flat";

pub const TENT_TITLE: &str = "Camping Tent";
pub const TENT_DESCRIPTION: &str = "Sleeps four, waterproof";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
