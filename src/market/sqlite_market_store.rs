use crate::sqlite_column;
use crate::sqlite_persistence::{
    ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::{anyhow, Context, Result};
use rand::{rng, Rng};
use rand_distr::Alphanumeric;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, SystemTime},
};
use tracing::{debug, warn};

use super::auth::{AuthToken, AuthTokenValue, CredentialHasher, HashedPassword, PasswordCredentials};
use super::models::{
    Listing, ListingId, ListingRefKind, ListingState, NewListing, User, UserId,
};
use super::store::{
    AuthTokenStore, ListingStore, UniqueWrite, UserCredentialsStore, UserRecordUpdate, UserStore,
    WriteOutcome,
};
use super::transaction::{RefEffect, TransactionPlan};

const ID_LENGTH: usize = 24;

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("username", &SqlType::Text, non_null = true),
        sqlite_column!("password_hash", &SqlType::Text, non_null = true),
        sqlite_column!("password_salt", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["email"], &["username"]],
    indices: &[],
};

// owner_id is a weak reference, a listing outlives its owner
const LISTING_TABLE_V_0: Table = Table {
    name: "listing",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!("buyer_id", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_listing_owner_id", "owner_id")],
};

// A user's listed, borrowed and bought id lists, ordered by id.
const USER_LISTING_REF_TABLE_V_0: Table = Table {
    name: "user_listing_ref",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("listing_id", &SqlType::Text, non_null = true),
        sqlite_column!("kind", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_listing_ref_user_id", "user_id")],
};

const LISTING_INTEREST_TABLE_V_0: Table = Table {
    name: "listing_interest",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "listing_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "listing",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["listing_id", "user_id"]],
    indices: &[],
};

/// V 1
const AUTH_TOKEN_TABLE_V_1: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!("value", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[("idx_auth_token_user_id", "user_id")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            USER_TABLE_V_0,
            LISTING_TABLE_V_0,
            USER_LISTING_REF_TABLE_V_0,
            LISTING_INTEREST_TABLE_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            USER_TABLE_V_0,
            LISTING_TABLE_V_0,
            USER_LISTING_REF_TABLE_V_0,
            LISTING_INTEREST_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_1,
        ],
        migration: Some(|conn: &Connection| {
            AUTH_TOKEN_TABLE_V_1.create(conn)?;
            Ok(())
        }),
    },
];

const LISTING_COLUMNS: &str = "id, owner_id, title, description, state, buyer_id, created";

/// A random A-z0-9 string
fn random_string(len: usize) -> String {
    let bytes = rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .collect::<Vec<u8>>();
    String::from_utf8_lossy(&bytes).to_string()
}

fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn system_time_from_column_result(value: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(value.max(0) as u64)
}

/// Picks an id that is not yet used in `table`.
fn generate_id(conn: &Connection, table: &str) -> Result<String> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    loop {
        let id = random_string(ID_LENGTH);
        let taken: bool = conn.query_row(&sql, params![id], |row| row.get(0))?;
        if !taken {
            return Ok(id);
        }
    }
}

fn user_exists(conn: &Connection, user_id: &UserId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user WHERE id = ?1)",
        params![user_id.0],
        |row| row.get(0),
    )?)
}

/// Looks for another user already holding `email` or `username`.
fn uniqueness_conflict<T>(
    conn: &Connection,
    user_id: Option<&UserId>,
    email: Option<&str>,
    username: Option<&str>,
) -> Result<Option<UniqueWrite<T>>> {
    let excluded = user_id.map(|id| id.0.as_str()).unwrap_or("");
    let taken = |column: &str, value: &str| -> Result<bool> {
        Ok(conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM user WHERE {} = ?1 AND id != ?2)",
                column
            ),
            params![value, excluded],
            |row| row.get(0),
        )?)
    };

    if let Some(email) = email {
        if taken("email", email)? {
            return Ok(Some(UniqueWrite::EmailTaken));
        }
    }
    if let Some(username) = username {
        if taken("username", username)? {
            return Ok(Some(UniqueWrite::UsernameTaken));
        }
    }
    Ok(None)
}

fn read_user(conn: &Connection, user_id: &UserId) -> Result<Option<User>> {
    let Some((email, username, created)) = conn
        .query_row(
            "SELECT email, username, created FROM user WHERE id = ?1",
            params![user_id.0],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("Failed to read user {}", user_id))?
    else {
        return Ok(None);
    };

    let mut user = User {
        id: user_id.clone(),
        email,
        username,
        listings: vec![],
        borrowed: vec![],
        bought: vec![],
        created,
    };

    let mut stmt = conn.prepare(
        "SELECT listing_id, kind FROM user_listing_ref WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id.0], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
    })?;
    for row in rows {
        let (listing_id, kind) = row?;
        let listing_id = ListingId(listing_id);
        match ListingRefKind::from_int(kind) {
            Some(ListingRefKind::Listed) => user.listings.push(listing_id),
            Some(ListingRefKind::Borrowed) => user.borrowed.push(listing_id),
            Some(ListingRefKind::Bought) => user.bought.push(listing_id),
            None => warn!("Skipping listing ref of unknown kind {} for user {}", kind, user_id),
        }
    }

    Ok(Some(user))
}

fn listing_from_row(row: &Row) -> rusqlite::Result<Listing> {
    let state: String = row.get(4)?;
    let state = ListingState::from_str(&state).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, err.into())
    })?;
    Ok(Listing {
        id: ListingId(row.get(0)?),
        owner_id: UserId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        state,
        interested: vec![],
        buyer_id: row.get::<_, Option<String>>(5)?.map(UserId),
        created: row.get(6)?,
    })
}

fn read_interested(conn: &Connection, listing_id: &ListingId) -> Result<Vec<UserId>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM listing_interest WHERE listing_id = ?1 ORDER BY id")?;
    let interested = stmt
        .query_map(params![listing_id.0], |row| row.get::<_, String>(0))?
        .map(|r| r.map(UserId))
        .collect::<rusqlite::Result<Vec<UserId>>>()?;
    Ok(interested)
}

fn query_listings<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Listing>> {
    let mut stmt = conn.prepare(sql)?;
    let mut listings = stmt
        .query_map(params, listing_from_row)?
        .collect::<rusqlite::Result<Vec<Listing>>>()?;
    for listing in listings.iter_mut() {
        listing.interested = read_interested(conn, &listing.id)?;
    }
    Ok(listings)
}

fn read_listing(conn: &Connection, listing_id: &ListingId) -> Result<Option<Listing>> {
    let listings = query_listings(
        conn,
        &format!("SELECT {} FROM listing WHERE id = ?1", LISTING_COLUMNS),
        params![listing_id.0],
    )
    .with_context(|| format!("Failed to read listing {}", listing_id))?;
    Ok(listings.into_iter().next())
}

#[derive(Clone)]
pub struct SqliteMarketStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMarketStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = VersionedSchema::open(db_path.as_ref(), VERSIONED_SCHEMAS)?;
        Ok(SqliteMarketStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Looks for a `market.db` file in the working directory and its ancestors.
    pub fn infer_path() -> Option<PathBuf> {
        let mut current_dir = std::env::current_dir().ok()?;
        loop {
            let candidate = current_dir.join("market.db");
            if candidate.is_file() {
                return Some(candidate);
            }
            current_dir = current_dir.parent()?.to_path_buf();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Market db connection lock is poisoned"))
    }
}

impl UserStore for SqliteMarketStore {
    fn create_user(
        &self,
        email: &str,
        username: &str,
        password: &HashedPassword,
    ) -> Result<UniqueWrite<User>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if let Some(conflict) = uniqueness_conflict(&tx, None, Some(email), Some(username))? {
            debug!("Refusing to create user {}: {:?}", username, conflict);
            return Ok(conflict);
        }
        let user_id = UserId(generate_id(&tx, "user")?);
        tx.execute(
            "INSERT INTO user (id, email, username, password_hash, password_salt, hasher) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id.0,
                email,
                username,
                password.hash,
                password.salt,
                password.hasher.to_string()
            ],
        )
        .with_context(|| format!("Failed to create user {}", username))?;
        tx.commit()?;
        debug!("Created user {} ({})", username, user_id);

        let user = read_user(&conn, &user_id)?.context("Created user could not be read back")?;
        Ok(UniqueWrite::Applied(user))
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let conn = self.lock()?;
        read_user(&conn, user_id)
    }

    fn get_all_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM user ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = read_user(&conn, &UserId(id))? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id FROM user WHERE email = ?1",
                params![email],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(UserId))
    }

    fn find_user_id_by_username(&self, username: &str) -> Result<Option<UserId>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id FROM user WHERE username = ?1",
                params![username],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(UserId))
    }

    fn update_user(
        &self,
        user_id: &UserId,
        update: &UserRecordUpdate,
    ) -> Result<UniqueWrite<bool>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !user_exists(&tx, user_id)? {
            return Ok(UniqueWrite::Applied(false));
        }
        if let Some(conflict) = uniqueness_conflict(
            &tx,
            Some(user_id),
            update.email.as_deref(),
            update.username.as_deref(),
        )? {
            return Ok(conflict);
        }
        if let Some(email) = &update.email {
            tx.execute(
                "UPDATE user SET email = ?1 WHERE id = ?2",
                params![email, user_id.0],
            )?;
        }
        if let Some(username) = &update.username {
            tx.execute(
                "UPDATE user SET username = ?1 WHERE id = ?2",
                params![username, user_id.0],
            )?;
        }
        if let Some(password) = &update.password {
            tx.execute(
                "UPDATE user SET password_hash = ?1, password_salt = ?2, hasher = ?3 WHERE id = ?4",
                params![
                    password.hash,
                    password.salt,
                    password.hasher.to_string(),
                    user_id.0
                ],
            )?;
        }
        tx.commit()
            .with_context(|| format!("Failed to update user {}", user_id))?;
        Ok(UniqueWrite::Applied(true))
    }

    fn delete_user(&self, user_id: &UserId) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM user WHERE id = ?1", params![user_id.0])
            .with_context(|| format!("Failed to delete user {}", user_id))?;
        Ok(deleted > 0)
    }
}

impl UserCredentialsStore for SqliteMarketStore {
    fn get_user_credentials_by_email(&self, email: &str) -> Result<Option<PasswordCredentials>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, email, username, password_hash, password_salt, hasher FROM user WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, email, username, hash, salt, hasher)) = row else {
            return Ok(None);
        };
        Ok(Some(PasswordCredentials {
            user_id: UserId(id),
            email,
            username,
            password: HashedPassword {
                salt,
                hash,
                hasher: CredentialHasher::from_str(&hasher)?,
            },
        }))
    }
}

impl AuthTokenStore for SqliteMarketStore {
    fn add_auth_token(&self, token: &AuthToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO auth_token (value, user_id, created) VALUES (?1, ?2, ?3)",
            params![token.value.0, token.user_id.0, unix_seconds(token.created)],
        )
        .context("Failed to add auth token")?;
        Ok(())
    }

    fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM auth_token WHERE value = ?1",
                params![value.0],
                |row| {
                    Ok(AuthToken {
                        user_id: UserId(row.get(0)?),
                        value: AuthTokenValue(row.get(1)?),
                        created: system_time_from_column_result(row.get(2)?),
                        last_used: row
                            .get::<_, Option<i64>>(3)?
                            .map(system_time_from_column_result),
                    })
                },
            )
            .optional()?)
    }

    fn delete_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let Some(token) = self.get_auth_token(value)? else {
            return Ok(None);
        };
        let conn = self.lock()?;
        conn.execute("DELETE FROM auth_token WHERE value = ?1", params![value.0])?;
        Ok(Some(token))
    }

    fn update_auth_token_last_used(&self, value: &AuthTokenValue) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "UPDATE auth_token SET last_used = {} WHERE value = ?1",
                DEFAULT_TIMESTAMP
            ),
            params![value.0],
        )?;
        Ok(())
    }
}

impl ListingStore for SqliteMarketStore {
    fn get_all_listings(&self) -> Result<Vec<Listing>> {
        let conn = self.lock()?;
        query_listings(
            &conn,
            &format!("SELECT {} FROM listing ORDER BY rowid", LISTING_COLUMNS),
            [],
        )
    }

    fn get_listing(&self, listing_id: &ListingId) -> Result<Option<Listing>> {
        let conn = self.lock()?;
        read_listing(&conn, listing_id)
    }

    fn create_listing(&self, owner_id: &UserId, listing: &NewListing) -> Result<Option<Listing>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !user_exists(&tx, owner_id)? {
            return Ok(None);
        }

        let listing_id = ListingId(generate_id(&tx, "listing")?);
        tx.execute(
            "INSERT INTO listing (id, owner_id, title, description, state) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                listing_id.0,
                owner_id.0,
                listing.title,
                listing.description,
                ListingState::Available.as_str()
            ],
        )?;
        tx.execute(
            "INSERT INTO user_listing_ref (user_id, listing_id, kind) VALUES (?1, ?2, ?3)",
            params![owner_id.0, listing_id.0, ListingRefKind::Listed.to_int()],
        )?;
        tx.commit()
            .with_context(|| format!("Failed to create listing for {}", owner_id))?;
        debug!("Created listing {} owned by {}", listing_id, owner_id);

        read_listing(&conn, &listing_id)
    }

    fn add_listing_interest(
        &self,
        listing_id: &ListingId,
        user_id: &UserId,
    ) -> Result<WriteOutcome> {
        let conn = self.lock()?;
        let listing_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM listing WHERE id = ?1)",
            params![listing_id.0],
            |row| row.get(0),
        )?;
        if !listing_exists {
            return Ok(WriteOutcome::ListingNotFound);
        }
        if !user_exists(&conn, user_id)? {
            return Ok(WriteOutcome::UserNotFound(user_id.clone()));
        }
        conn.execute(
            "INSERT OR IGNORE INTO listing_interest (listing_id, user_id) VALUES (?1, ?2)",
            params![listing_id.0, user_id.0],
        )?;
        Ok(WriteOutcome::Applied)
    }

    fn apply_transaction(&self, plan: &TransactionPlan) -> Result<WriteOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current_state = tx
            .query_row(
                "SELECT state FROM listing WHERE id = ?1",
                params![plan.listing_id.0],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let Some(current_state) = current_state else {
            return Ok(WriteOutcome::ListingNotFound);
        };
        if ListingState::from_str(&current_state)? != plan.from {
            return Ok(WriteOutcome::StaleState);
        }

        for effect in &plan.user_effects {
            match effect {
                RefEffect::Push { user_id, kind } => {
                    if !user_exists(&tx, user_id)? {
                        return Ok(WriteOutcome::UserNotFound(user_id.clone()));
                    }
                    tx.execute(
                        "INSERT INTO user_listing_ref (user_id, listing_id, kind) VALUES (?1, ?2, ?3)",
                        params![user_id.0, plan.listing_id.0, kind.to_int()],
                    )?;
                }
                RefEffect::PullAll { user_id, kind } => {
                    tx.execute(
                        "DELETE FROM user_listing_ref WHERE user_id = ?1 AND listing_id = ?2 AND kind = ?3",
                        params![user_id.0, plan.listing_id.0, kind.to_int()],
                    )?;
                }
            }
        }

        tx.execute(
            "UPDATE listing SET state = ?1, buyer_id = ?2 WHERE id = ?3",
            params![
                plan.to.as_str(),
                plan.buyer_id.as_ref().map(|id| id.0.as_str()),
                plan.listing_id.0
            ],
        )?;
        tx.commit()
            .with_context(|| format!("Failed to apply transaction on {}", plan.listing_id))?;
        debug!(
            "Listing {} moved from {} to {}",
            plan.listing_id, plan.from, plan.to
        );
        Ok(WriteOutcome::Applied)
    }

    fn search_listings(&self, query: &str) -> Result<Vec<Listing>> {
        if query.is_empty() {
            return Ok(vec![]);
        }
        // SQLite lower() only folds ASCII
        let needle = query.to_lowercase();
        let matches = |text: &str| text.to_lowercase().contains(&needle);
        Ok(self
            .get_all_listings()?
            .into_iter()
            .filter(|listing| {
                matches(listing.title.as_str())
                    || listing.description.as_deref().is_some_and(matches)
            })
            .collect())
    }

    fn delete_listing(&self, listing_id: &ListingId) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM listing WHERE id = ?1", params![listing_id.0])
            .with_context(|| format!("Failed to delete listing {}", listing_id))?;
        Ok(deleted > 0)
    }
}
