pub mod auth;
mod error;
mod marketplace;
pub mod models;
mod sqlite_market_store;
mod store;
pub mod transaction;

pub use auth::{AuthToken, AuthTokenValue, CredentialHasher};
pub use error::{MarketError, MarketResult};
pub use marketplace::Marketplace;
pub use models::{
    Listing, ListingId, ListingState, ListingWithOwner, LoginOutcome, LoginRequest, NewListing,
    NewUser, OwnerInfo, TransactionRequest, User, UserId, UserUpdate,
};
pub use sqlite_market_store::SqliteMarketStore;
pub use store::{
    AuthTokenStore, ListingStore, MarketStore, UniqueWrite, UserCredentialsStore, UserRecordUpdate,
    UserStore, WriteOutcome,
};
