//! Test fixture creation for the market database

#![allow(dead_code)]

use super::constants::*;
use anyhow::{bail, Context, Result};
use bakerinn_server::market::{
    CredentialHasher, ListingId, ListingStore, NewListing, SqliteMarketStore, UniqueWrite, User,
    UserId, UserStore,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// Ids generated while seeding, they are random on every run.
#[derive(Debug, Clone)]
pub struct SeededIds {
    pub lender_id: UserId,
    pub borrower_id: UserId,
    pub ladder_id: ListingId,
    pub tent_id: ListingId,
}

fn seed_user(
    store: &SqliteMarketStore,
    hasher: &CredentialHasher,
    email: &str,
    username: &str,
    password: &str,
) -> Result<User> {
    match store.create_user(email, username, &hasher.hash_new(password)?)? {
        UniqueWrite::Applied(user) => Ok(user),
        conflict => bail!("Could not seed {}: {:?}", username, conflict),
    }
}

/// Creates a temporary database with the lender, the borrower and two
/// available listings owned by the lender.
/// Returns (temp_dir, db_path, seeded ids)
pub fn create_test_db_with_users() -> Result<(TempDir, PathBuf, SeededIds)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("market.db");
    let store = SqliteMarketStore::new(&db_path)?;
    let hasher = CredentialHasher::default();

    let lender = seed_user(&store, &hasher, TEST_EMAIL, TEST_USERNAME, TEST_PASS)?;
    let borrower = seed_user(
        &store,
        &hasher,
        BORROWER_EMAIL,
        BORROWER_USERNAME,
        BORROWER_PASS,
    )?;

    let ladder = store
        .create_listing(
            &lender.id,
            &NewListing {
                title: LADDER_TITLE.to_string(),
                description: Some(LADDER_DESCRIPTION.to_string()),
            },
        )?
        .context("Lender vanished while seeding")?;
    let tent = store
        .create_listing(
            &lender.id,
            &NewListing {
                title: TENT_TITLE.to_string(),
                description: Some(TENT_DESCRIPTION.to_string()),
            },
        )?
        .context("Lender vanished while seeding")?;

    Ok((
        dir,
        db_path,
        SeededIds {
            lender_id: lender.id,
            borrower_id: borrower.id,
            ladder_id: ladder.id,
            tent_id: tent.id,
        },
    ))
}
