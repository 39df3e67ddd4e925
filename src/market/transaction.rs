//! Listing state machine.
//!
//! A transition is first turned into a [`TransactionPlan`] without touching the store,
//! the store then applies the whole plan atomically.
use super::error::{MarketError, MarketResult};
use super::models::{Listing, ListingId, ListingRefKind, ListingState, TransactionRequest, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefEffect {
    /// Append the listing id to one of the user's lists. The user must exist.
    Push { user_id: UserId, kind: ListingRefKind },
    /// Remove every occurrence of the listing id from one of the user's lists.
    PullAll { user_id: UserId, kind: ListingRefKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    pub listing_id: ListingId,
    pub from: ListingState,
    pub to: ListingState,
    pub buyer_id: Option<UserId>,
    pub user_effects: Vec<RefEffect>,
}

fn required_buyer(listing: &Listing, request: &TransactionRequest) -> MarketResult<UserId> {
    let buyer_id = request
        .buyer_id
        .clone()
        .ok_or(MarketError::MissingParty("buyer_id"))?;
    if buyer_id == listing.owner_id {
        return Err(MarketError::InvalidInput(
            "the owner cannot be the counterpart of their own listing".to_string(),
        ));
    }
    Ok(buyer_id)
}

/// The user currently holding the listing on loan. A named previous borrower
/// must match the recorded one.
fn current_borrower(
    listing: &Listing,
    request: &TransactionRequest,
) -> MarketResult<Option<UserId>> {
    match (&request.previous_borrower_id, &listing.buyer_id) {
        (Some(named), Some(recorded)) if named != recorded => Err(MarketError::InvalidInput(
            "previous_borrower_id is not the current borrower".to_string(),
        )),
        (named, recorded) => Ok(named.clone().or_else(|| recorded.clone())),
    }
}

pub fn plan_transaction(
    listing: &Listing,
    request: &TransactionRequest,
) -> MarketResult<TransactionPlan> {
    use ListingState::*;

    let (buyer_id, user_effects) = match (listing.state, request.state) {
        (Available, OnLoan) => {
            let buyer_id = required_buyer(listing, request)?;
            let effects = vec![RefEffect::Push {
                user_id: buyer_id.clone(),
                kind: ListingRefKind::Borrowed,
            }];
            (Some(buyer_id), effects)
        }
        (OnLoan, Available) => {
            let borrower_id = current_borrower(listing, request)?
                .ok_or(MarketError::MissingParty("previous_borrower_id"))?;
            let effects = vec![RefEffect::PullAll {
                user_id: borrower_id,
                kind: ListingRefKind::Borrowed,
            }];
            (None, effects)
        }
        (from @ (Available | OnLoan), Unavailable) => {
            let buyer_id = required_buyer(listing, request)?;
            let mut effects = vec![RefEffect::Push {
                user_id: buyer_id.clone(),
                kind: ListingRefKind::Bought,
            }];
            if from == OnLoan {
                if let Some(borrower_id) = current_borrower(listing, request)? {
                    effects.push(RefEffect::PullAll {
                        user_id: borrower_id,
                        kind: ListingRefKind::Borrowed,
                    });
                }
            }
            (Some(buyer_id), effects)
        }
        (from, to) => return Err(MarketError::InvalidTransition { from, to }),
    };

    Ok(TransactionPlan {
        listing_id: listing.id.clone(),
        from: listing.state,
        to: request.state,
        buyer_id,
        user_effects,
    })
}
