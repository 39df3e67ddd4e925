use std::fmt::Write;

use super::state::{DashboardState, ListingTabs};
use crate::market::{Listing, ListingWithOwner};

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A submitted search and what it matched.
pub struct SearchResults<'a> {
    pub query: &'a str,
    pub listings: &'a [Listing],
}

fn render_listing(out: &mut String, listing: &Listing, owner: Option<&str>) {
    let _ = write!(
        out,
        "<li class=\"listing\" data-id=\"{}\"><span class=\"title\">{}</span> <span class=\"state\">{}</span>",
        escape_html(&listing.id.0),
        escape_html(&listing.title),
        escape_html(listing.state.as_str())
    );
    if let Some(owner) = owner {
        let _ = write!(out, " <span class=\"owner\">by {}</span>", escape_html(owner));
    }
    if let Some(description) = &listing.description {
        let _ = write!(out, "<p>{}</p>", escape_html(description));
    }
    out.push_str("</li>");
}

fn render_tab(out: &mut String, tab: ListingTabs, listings: &[ListingWithOwner]) {
    let _ = write!(
        out,
        "<section class=\"tab\" id=\"{}\"><h2>{} ({})</h2>",
        tab.anchor(),
        tab.label(),
        listings.len()
    );
    if listings.is_empty() {
        out.push_str("<p class=\"empty\">Nothing here yet</p>");
    } else {
        out.push_str("<ul>");
        for listing in listings {
            let owner = listing.owner_info.as_ref().map(|o| o.username.as_str());
            render_listing(out, &listing.listing, owner);
        }
        out.push_str("</ul>");
    }
    out.push_str("</section>");
}

pub fn render_dashboard(state: &DashboardState, results: Option<SearchResults<'_>>) -> String {
    let username = state
        .user
        .as_ref()
        .map(|user| user.username.as_str())
        .unwrap_or("User");

    let mut out = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Dashboard</title></head><body>",
    );
    let _ = write!(out, "<h1>Welcome back {}</h1>", escape_html(username));
    let _ = write!(
        out,
        "<form class=\"search-bar\" method=\"get\" action=\"/dashboard\"><input type=\"search\" name=\"q\" value=\"{}\" placeholder=\"Search listings\"></form>",
        escape_html(&state.search)
    );

    out.push_str("<nav class=\"tabs\">");
    for tab in ListingTabs::ALL {
        let _ = write!(out, "<a href=\"#{}\">{}</a>", tab.anchor(), tab.label());
    }
    out.push_str("</nav>");
    for tab in ListingTabs::ALL {
        render_tab(&mut out, tab, state.tab(tab));
    }

    if let Some(results) = results {
        let _ = write!(
            out,
            "<section class=\"results\"><h2>Results for \"{}\"</h2>",
            escape_html(results.query)
        );
        if results.listings.is_empty() {
            out.push_str("<p class=\"empty\">No listings found</p>");
        } else {
            out.push_str("<ul>");
            for listing in results.listings {
                render_listing(&mut out, listing, None);
            }
            out.push_str("</ul>");
        }
        out.push_str("</section>");
    }

    out.push_str("</body></html>");
    out
}
