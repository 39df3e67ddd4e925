use tracing::debug;

use crate::market::{ListingWithOwner, User};

pub const ENTER_KEY: &str = "Enter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingTabs {
    Available,
    OnLoan,
    Borrowing,
}

impl ListingTabs {
    pub const ALL: [ListingTabs; 3] = [
        ListingTabs::Available,
        ListingTabs::OnLoan,
        ListingTabs::Borrowing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ListingTabs::Available => "Available",
            ListingTabs::OnLoan => "On loan",
            ListingTabs::Borrowing => "Borrowing",
        }
    }

    pub fn anchor(&self) -> &'static str {
        match self {
            ListingTabs::Available => "available",
            ListingTabs::OnLoan => "on-loan",
            ListingTabs::Borrowing => "borrowing",
        }
    }
}

/// The user's own listings, split by state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LendingTabs {
    pub available: Vec<ListingWithOwner>,
    pub on_loan: Vec<ListingWithOwner>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub search: String,
    pub user: Option<User>,
    pub lending: LendingTabs,
    pub borrowing: Vec<ListingWithOwner>,
}

impl DashboardState {
    pub fn handle_change<S: Into<String>>(&mut self, value: S) {
        self.search = value.into();
    }

    /// Submits the current search when `key` is Enter and there is something to search for.
    /// The search bar is cleared on submission.
    pub fn handle_search(&mut self, key: &str) -> Option<String> {
        if key != ENTER_KEY || self.search.is_empty() {
            return None;
        }
        let query = std::mem::take(&mut self.search);
        debug!("Dashboard search submitted: {}", query);
        Some(query)
    }

    pub fn tab(&self, tab: ListingTabs) -> &[ListingWithOwner] {
        match tab {
            ListingTabs::Available => &self.lending.available,
            ListingTabs::OnLoan => &self.lending.on_loan,
            ListingTabs::Borrowing => &self.borrowing,
        }
    }
}
