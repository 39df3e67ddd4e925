use super::auth::{AuthToken, AuthTokenValue, HashedPassword, PasswordCredentials};
use super::models::{Listing, ListingId, NewListing, User, UserId};
use super::transaction::TransactionPlan;
use anyhow::Result;

/// Outcome of a write that needs its referenced documents to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    ListingNotFound,
    UserNotFound(UserId),
    /// The listing is no longer in the state the write was planned against.
    StaleState,
}

/// Outcome of a write constrained by the unique user email and username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueWrite<T> {
    Applied(T),
    EmailTaken,
    UsernameTaken,
}

/// Fields to overwrite on a user, `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserRecordUpdate {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<HashedPassword>,
}

pub trait UserStore: Send + Sync {
    /// Creates a new user with a freshly generated id.
    /// Email and username are checked in the same transaction as the insert.
    fn create_user(
        &self,
        email: &str,
        username: &str,
        password: &HashedPassword,
    ) -> Result<UniqueWrite<User>>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    fn get_all_users(&self) -> Result<Vec<User>>;

    /// Returns the id of the user with the given email, Ok(None) if there is none.
    fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>>;

    /// Returns the id of the user with the given username, Ok(None) if there is none.
    fn find_user_id_by_username(&self, username: &str) -> Result<Option<UserId>>;

    /// Applied(false) if the user does not exist. Email and username must not
    /// belong to another user.
    fn update_user(
        &self,
        user_id: &UserId,
        update: &UserRecordUpdate,
    ) -> Result<UniqueWrite<bool>>;

    /// Deletes the user together with its id lists and auth tokens.
    /// Listings and references held by other documents are left alone.
    /// Returns Ok(false) if the user does not exist.
    fn delete_user(&self, user_id: &UserId) -> Result<bool>;
}

pub trait UserCredentialsStore: Send + Sync {
    /// Returns Ok(None) if no user has the given email.
    fn get_user_credentials_by_email(&self, email: &str) -> Result<Option<PasswordCredentials>>;
}

pub trait AuthTokenStore: Send + Sync {
    fn add_auth_token(&self, token: &AuthToken) -> Result<()>;

    /// Returns Ok(None) if the token does not exist.
    fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Returns the deleted token, Ok(None) if it did not exist.
    fn delete_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>>;

    fn update_auth_token_last_used(&self, value: &AuthTokenValue) -> Result<()>;
}

pub trait ListingStore: Send + Sync {
    fn get_all_listings(&self) -> Result<Vec<Listing>>;

    /// Returns Ok(None) if the listing does not exist.
    fn get_listing(&self, listing_id: &ListingId) -> Result<Option<Listing>>;

    /// Inserts the listing and appends it to the owner's listings in a single transaction.
    /// Returns Ok(None) if the owner does not exist.
    fn create_listing(&self, owner_id: &UserId, listing: &NewListing) -> Result<Option<Listing>>;

    /// Adds the user to the listing's interested list, a no-op if already there.
    fn add_listing_interest(&self, listing_id: &ListingId, user_id: &UserId)
        -> Result<WriteOutcome>;

    /// Applies both the user-side and the listing-side writes of the plan, or none of them.
    fn apply_transaction(&self, plan: &TransactionPlan) -> Result<WriteOutcome>;

    /// Case-insensitive substring match over title and description.
    fn search_listings(&self, query: &str) -> Result<Vec<Listing>>;

    /// Returns Ok(false) if the listing does not exist.
    fn delete_listing(&self, listing_id: &ListingId) -> Result<bool>;
}

pub trait MarketStore: UserStore + UserCredentialsStore + AuthTokenStore + ListingStore {}

impl<T: UserStore + UserCredentialsStore + AuthTokenStore + ListingStore> MarketStore for T {}
