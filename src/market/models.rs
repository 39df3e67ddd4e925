//! Market data models
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use anyhow::bail;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user as seen from outside the store, credentials excluded.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub listings: Vec<ListingId>,
    pub borrowed: Vec<ListingId>,
    pub bought: Vec<ListingId>,
    /// Unix seconds
    pub created: i64,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LoginOutcome {
    pub matched: bool,
    pub email: String,
    pub username: String,
    pub id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingState {
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "on loan")]
    OnLoan,
    #[serde(rename = "unavailable")]
    Unavailable,
}

impl ListingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingState::Available => "available",
            ListingState::OnLoan => "on loan",
            ListingState::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ListingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "available" => Ok(ListingState::Available),
            "on loan" => Ok(ListingState::OnLoan),
            "unavailable" => Ok(ListingState::Unavailable),
            _ => bail!("Unknown listing state {}", s),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub state: ListingState,
    pub interested: Vec<UserId>,
    /// Counterpart of the latest loan or sale, cleared when a loan is returned.
    pub buyer_id: Option<UserId>,
    pub created: i64,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct NewListing {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct OwnerInfo {
    pub username: String,
    pub user_id: UserId,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ListingWithOwner {
    #[serde(flatten)]
    pub listing: Listing,
    /// None when the owner no longer exists.
    pub owner_info: Option<OwnerInfo>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TransactionRequest {
    pub state: ListingState,
    #[serde(default)]
    pub buyer_id: Option<UserId>,
    #[serde(default)]
    pub previous_borrower_id: Option<UserId>,
}

/// Which of a user's id lists a listing reference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingRefKind {
    Listed,
    Borrowed,
    Bought,
}

impl ListingRefKind {
    pub fn to_int(&self) -> i32 {
        match self {
            ListingRefKind::Listed => 1,
            ListingRefKind::Borrowed => 2,
            ListingRefKind::Bought => 3,
        }
    }

    pub fn from_int(value: i32) -> Option<Self> {
        match value {
            1 => Some(ListingRefKind::Listed),
            2 => Some(ListingRefKind::Borrowed),
            3 => Some(ListingRefKind::Bought),
            _ => None,
        }
    }
}
