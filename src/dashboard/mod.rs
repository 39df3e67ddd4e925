//! Server-rendered listing dashboard: a search bar over tabbed listing views.
mod render;
mod state;

pub use render::{render_dashboard, SearchResults};
pub use state::{DashboardState, LendingTabs, ListingTabs, ENTER_KEY};
