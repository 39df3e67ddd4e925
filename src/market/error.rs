use thiserror::Error;
use tokio::task::JoinError;

use super::models::ListingState;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("email has been taken")]
    EmailTaken,

    #[error("username has been taken")]
    UsernameTaken,

    #[error("user not found")]
    UserNotFound,

    #[error("listing not found")]
    ListingNotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot move a listing from {from} to {to}")]
    InvalidTransition { from: ListingState, to: ListingState },

    #[error("missing {0}")]
    MissingParty(&'static str),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

pub type MarketResult<T> = Result<T, MarketError>;
