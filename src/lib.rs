//! Bakerinn Server Library
//!
//! A peer-to-peer lending marketplace: users list items, lend them, sell them
//! and browse what others have listed.

pub mod config;
pub mod dashboard;
pub mod market;
pub mod server;
pub mod sqlite_persistence;

pub use market::{Marketplace, SqliteMarketStore};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
