use std::sync::Arc;

use anyhow::anyhow;
use futures::future::try_join_all;
use tracing::{debug, info};

use super::auth::{AuthToken, AuthTokenValue, CredentialHasher, HashedPassword};
use super::error::{MarketError, MarketResult};
use super::models::{
    Listing, ListingId, ListingState, ListingWithOwner, LoginOutcome, LoginRequest, NewListing,
    NewUser, OwnerInfo, TransactionRequest, User, UserId, UserUpdate,
};
use super::store::{MarketStore, UniqueWrite, UserRecordUpdate, WriteOutcome};
use super::transaction::plan_transaction;
use crate::dashboard::{DashboardState, LendingTabs};

fn require_non_empty(field: &str, value: &str) -> MarketResult<()> {
    if value.trim().is_empty() {
        return Err(MarketError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Entry point of the model layer. Every store access runs on the blocking pool.
#[derive(Clone)]
pub struct Marketplace {
    store: Arc<dyn MarketStore>,
    hasher: CredentialHasher,
}

impl Marketplace {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Marketplace {
            store,
            hasher: CredentialHasher::default(),
        }
    }

    async fn run<T, F>(&self, f: F) -> MarketResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MarketStore) -> anyhow::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || f(store.as_ref())).await??)
    }

    async fn hash_password(&self, plain: String) -> MarketResult<HashedPassword> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash_new(&plain))
            .await?
            .map_err(|err| MarketError::Hashing(err.to_string()))
    }

    // Users

    pub async fn get_all_users(&self) -> MarketResult<Vec<User>> {
        self.run(|store| store.get_all_users()).await
    }

    pub async fn get_user(&self, user_id: &UserId) -> MarketResult<User> {
        let user_id = user_id.clone();
        self.run(move |store| store.get_user(&user_id))
            .await?
            .ok_or(MarketError::UserNotFound)
    }

    /// Fails if `email` or `username` belongs to a user other than `user_id`.
    async fn check_uniqueness(
        &self,
        user_id: Option<&UserId>,
        email: Option<&str>,
        username: Option<&str>,
    ) -> MarketResult<()> {
        let is_other = |found: Option<UserId>| match (found, user_id) {
            (Some(found), Some(user_id)) => &found != user_id,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if let Some(email) = email {
            let email = email.to_string();
            let found = self
                .run(move |store| store.find_user_id_by_email(&email))
                .await?;
            if is_other(found) {
                return Err(MarketError::EmailTaken);
            }
        }
        if let Some(username) = username {
            let username = username.to_string();
            let found = self
                .run(move |store| store.find_user_id_by_username(&username))
                .await?;
            if is_other(found) {
                return Err(MarketError::UsernameTaken);
            }
        }
        Ok(())
    }

    pub async fn create_user(&self, new_user: NewUser) -> MarketResult<User> {
        let NewUser {
            email,
            username,
            password,
        } = new_user;
        require_non_empty("email", &email)?;
        require_non_empty("username", &username)?;
        require_non_empty("password", &password)?;

        // Checked again by the store in the insert transaction
        self.check_uniqueness(None, Some(&email), Some(&username))
            .await?;

        let password = self.hash_password(password).await?;
        let user = match self
            .run(move |store| store.create_user(&email, &username, &password))
            .await?
        {
            UniqueWrite::Applied(user) => user,
            UniqueWrite::EmailTaken => return Err(MarketError::EmailTaken),
            UniqueWrite::UsernameTaken => return Err(MarketError::UsernameTaken),
        };
        info!("Created user {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn update_user(&self, user_id: &UserId, update: UserUpdate) -> MarketResult<User> {
        // Fail on unknown users before looking at the fields
        self.get_user(user_id).await?;

        if let Some(email) = &update.email {
            require_non_empty("email", email)?;
        }
        if let Some(username) = &update.username {
            require_non_empty("username", username)?;
        }
        if let Some(password) = &update.password {
            require_non_empty("password", password)?;
        }
        self.check_uniqueness(
            Some(user_id),
            update.email.as_deref(),
            update.username.as_deref(),
        )
        .await?;

        let password = match update.password {
            Some(plain) => Some(self.hash_password(plain).await?),
            None => None,
        };
        let record = UserRecordUpdate {
            email: update.email,
            username: update.username,
            password,
        };

        let id = user_id.clone();
        match self
            .run(move |store| store.update_user(&id, &record))
            .await?
        {
            UniqueWrite::Applied(true) => {}
            UniqueWrite::Applied(false) => return Err(MarketError::UserNotFound),
            UniqueWrite::EmailTaken => return Err(MarketError::EmailTaken),
            UniqueWrite::UsernameTaken => return Err(MarketError::UsernameTaken),
        }
        debug!("Updated user {}", user_id);
        self.get_user(user_id).await
    }

    pub async fn delete_user(&self, user_id: &UserId) -> MarketResult<()> {
        let id = user_id.clone();
        if !self.run(move |store| store.delete_user(&id)).await? {
            return Err(MarketError::UserNotFound);
        }
        info!("Deleted user {}", user_id);
        Ok(())
    }

    // Authentication

    pub async fn login(&self, request: LoginRequest) -> MarketResult<LoginOutcome> {
        let email = request.email.clone();
        let credentials = self
            .run(move |store| store.get_user_credentials_by_email(&email))
            .await?
            .ok_or(MarketError::UserNotFound)?;

        let password = credentials.password.clone();
        let plain = request.password;
        let matched = tokio::task::spawn_blocking(move || password.verify(&plain))
            .await?
            .map_err(|err| MarketError::Hashing(err.to_string()))?;
        debug!("Login for {}, matched: {}", credentials.username, matched);

        Ok(LoginOutcome {
            matched,
            email: credentials.email,
            username: credentials.username,
            id: credentials.user_id,
        })
    }

    pub async fn create_session(&self, user_id: &UserId) -> MarketResult<AuthToken> {
        let token = AuthToken::issue(user_id.clone());
        let stored = token.clone();
        self.run(move |store| store.add_auth_token(&stored)).await?;
        Ok(token)
    }

    /// Returns the token if it exists, marking it as used.
    pub async fn resolve_session(&self, value: &AuthTokenValue) -> MarketResult<Option<AuthToken>> {
        let value = value.clone();
        self.run(move |store| {
            let token = store.get_auth_token(&value)?;
            if token.is_some() {
                store.update_auth_token_last_used(&value)?;
            }
            Ok(token)
        })
        .await
    }

    pub async fn end_session(&self, value: &AuthTokenValue) -> MarketResult<Option<AuthToken>> {
        let value = value.clone();
        self.run(move |store| store.delete_auth_token(&value)).await
    }

    // Listings

    async fn with_owner(&self, listing: Listing) -> MarketResult<ListingWithOwner> {
        let owner_id = listing.owner_id.clone();
        let owner = self.run(move |store| store.get_user(&owner_id)).await?;
        Ok(ListingWithOwner {
            owner_info: owner.map(|owner| OwnerInfo {
                username: owner.username,
                user_id: owner.id,
            }),
            listing,
        })
    }

    pub async fn get_all_listings(&self) -> MarketResult<Vec<Listing>> {
        self.run(|store| store.get_all_listings()).await
    }

    pub async fn create_listing(
        &self,
        owner_id: &UserId,
        new_listing: NewListing,
    ) -> MarketResult<Listing> {
        require_non_empty("title", &new_listing.title)?;
        let id = owner_id.clone();
        let listing = self
            .run(move |store| store.create_listing(&id, &new_listing))
            .await?
            .ok_or(MarketError::UserNotFound)?;
        info!("User {} listed {} ({})", owner_id, listing.title, listing.id);
        Ok(listing)
    }

    /// Listings referenced by the user's borrowed list, or by its own listings.
    /// References to listings that no longer exist are skipped.
    pub async fn get_user_listings(
        &self,
        user_id: &UserId,
        borrowed: bool,
    ) -> MarketResult<Vec<ListingWithOwner>> {
        let user = self.get_user(user_id).await?;
        let listing_ids = if borrowed {
            user.borrowed
        } else {
            user.listings
        };

        let fetches = listing_ids.into_iter().map(|listing_id| async move {
            let Some(listing) = self
                .run(move |store| store.get_listing(&listing_id))
                .await?
            else {
                return Ok(None);
            };
            self.with_owner(listing).await.map(Some)
        });

        Ok(try_join_all(fetches).await?.into_iter().flatten().collect())
    }

    pub async fn get_listing(&self, listing_id: &ListingId) -> MarketResult<ListingWithOwner> {
        let id = listing_id.clone();
        let listing = self
            .run(move |store| store.get_listing(&id))
            .await?
            .ok_or(MarketError::ListingNotFound)?;
        self.with_owner(listing).await
    }

    pub async fn express_interest(
        &self,
        listing_id: &ListingId,
        user_id: &UserId,
    ) -> MarketResult<()> {
        let (l_id, u_id) = (listing_id.clone(), user_id.clone());
        match self
            .run(move |store| store.add_listing_interest(&l_id, &u_id))
            .await?
        {
            WriteOutcome::Applied => {
                debug!("User {} is interested in {}", user_id, listing_id);
                Ok(())
            }
            WriteOutcome::ListingNotFound => Err(MarketError::ListingNotFound),
            WriteOutcome::UserNotFound(_) => Err(MarketError::UserNotFound),
            WriteOutcome::StaleState => Err(anyhow!("Unexpected stale state on interest").into()),
        }
    }

    pub async fn make_transaction(
        &self,
        listing_id: &ListingId,
        request: TransactionRequest,
    ) -> MarketResult<Listing> {
        let id = listing_id.clone();
        let listing = self
            .run(move |store| store.get_listing(&id))
            .await?
            .ok_or(MarketError::ListingNotFound)?;

        let plan = plan_transaction(&listing, &request)?;
        let (from, to) = (plan.from, plan.to);
        match self.run(move |store| store.apply_transaction(&plan)).await? {
            WriteOutcome::Applied => {}
            WriteOutcome::ListingNotFound => return Err(MarketError::ListingNotFound),
            WriteOutcome::UserNotFound(_) => return Err(MarketError::UserNotFound),
            // Someone else moved the listing in between
            WriteOutcome::StaleState => return Err(MarketError::InvalidTransition { from, to }),
        }
        info!("Listing {} moved from {} to {}", listing_id, from, to);

        let id = listing_id.clone();
        self.run(move |store| store.get_listing(&id))
            .await?
            .ok_or(MarketError::ListingNotFound)
    }

    pub async fn search_listings(&self, query: &str) -> MarketResult<Vec<Listing>> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Ok(vec![]);
        }
        self.run(move |store| store.search_listings(&query)).await
    }

    pub async fn delete_listing(&self, listing_id: &ListingId) -> MarketResult<()> {
        let id = listing_id.clone();
        if !self.run(move |store| store.delete_listing(&id)).await? {
            return Err(MarketError::ListingNotFound);
        }
        info!("Deleted listing {}", listing_id);
        Ok(())
    }

    // Dashboard

    /// Fills the dashboard of `user_id` from its own and its borrowed listings.
    pub async fn dashboard(&self, user_id: &UserId) -> MarketResult<DashboardState> {
        let user = self.get_user(user_id).await?;
        let (owned, borrowing) = futures::try_join!(
            self.get_user_listings(user_id, false),
            self.get_user_listings(user_id, true)
        )?;

        let mut lending = LendingTabs::default();
        for listing in owned {
            match listing.listing.state {
                ListingState::Available => lending.available.push(listing),
                ListingState::OnLoan => lending.on_loan.push(listing),
                ListingState::Unavailable => {}
            }
        }

        Ok(DashboardState {
            search: String::new(),
            user: Some(user),
            lending,
            borrowing,
        })
    }
}
