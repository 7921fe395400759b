//! Negotiation state machine
//!
//! ```text
//!            counter (owner)           accept (consumer)
//!  pending ------------------> countered ----------------> confirmed
//!     |                            |
//!     | reject (either side)       | reject (either side)
//!     v                            v
//!  rejected <-----------------------
//! ```
//!
//! Every function borrows the current record and returns the next one. The
//! input is never modified, so a refused transition leaves it exactly as it was.

use crate::error::{Lift8Error, Result};
use crate::fare::{validate_offer, NegotiationBounds};
use crate::types::{ConsumerID, Party, TruckID, TruckOwnerID};

use super::types::{Negotiation, NegotiationAction, NegotiationPatch, NegotiationStatus};

/// Open a negotiation with the consumer's offer.
///
/// The offer is checked against `bounds` before anything is built; the record
/// starts `pending` with no counter-offer.
pub fn create_negotiation(
    consumer_id: ConsumerID,
    truck_owner_id: TruckOwnerID,
    truck_id: TruckID,
    offer: f64,
    bounds: &NegotiationBounds,
) -> Result<Negotiation> {
    validate_offer(offer, bounds)?;

    Ok(Negotiation {
        consumer_id,
        truck_owner_id,
        truck_id,
        requested_price: offer,
        counter_offer: None,
        status: NegotiationStatus::Pending,
    })
}

/// Owner answers a pending offer.
///
/// The counter-offer is not held to the opening range; it only has to be a
/// positive price.
pub fn submit_counter_offer(negotiation: &Negotiation, counter_price: f64) -> Result<Negotiation> {
    require_status(negotiation, "counter", &[NegotiationStatus::Pending])?;

    if !counter_price.is_finite() || counter_price <= 0.0 {
        return Err(Lift8Error::InvalidInput(format!(
            "counter-offer must be a positive price, got {}",
            counter_price
        )));
    }

    Ok(Negotiation {
        counter_offer: Some(counter_price),
        status: NegotiationStatus::Countered,
        ..negotiation.clone()
    })
}

/// Consumer accepts the owner's counter-offer, confirming the booking
pub fn accept_counter_offer(negotiation: &Negotiation) -> Result<Negotiation> {
    require_status(negotiation, "accept", &[NegotiationStatus::Countered])?;

    Ok(Negotiation {
        status: NegotiationStatus::Confirmed,
        ..negotiation.clone()
    })
}

/// Either side walks away from an open negotiation
pub fn reject(negotiation: &Negotiation, by: Party) -> Result<Negotiation> {
    require_status(
        negotiation,
        "reject",
        &[NegotiationStatus::Pending, NegotiationStatus::Countered],
    )?;

    tracing::debug!(
        "Negotiation for truck {} rejected by {}",
        negotiation.truck_id,
        by
    );

    Ok(Negotiation {
        status: NegotiationStatus::Rejected,
        ..negotiation.clone()
    })
}

/// Dispatch an action to its transition function
pub fn apply(negotiation: &Negotiation, action: &NegotiationAction) -> Result<Negotiation> {
    match *action {
        NegotiationAction::Counter { price } => submit_counter_offer(negotiation, price),
        NegotiationAction::Accept => accept_counter_offer(negotiation),
        NegotiationAction::Reject { by } => reject(negotiation, by),
    }
}

/// Check that `patch` is a move the functions above could have produced from `current`.
///
/// Stores call this before writing so a raw patch cannot reopen a finished
/// negotiation or rewrite its counter-offer.
pub fn validate_patch(current: &Negotiation, patch: &NegotiationPatch) -> Result<()> {
    if !current.status.can_move_to(patch.status) {
        return Err(Lift8Error::InvalidTransition {
            action: patch.action_name(),
            status: current.status,
        });
    }

    let counter_offer_ok = match patch.status {
        NegotiationStatus::Countered => {
            matches!(patch.counter_offer, Some(price) if price.is_finite() && price > 0.0)
        }
        _ => patch.counter_offer == current.counter_offer,
    };
    if !counter_offer_ok {
        return Err(Lift8Error::InvalidInput(format!(
            "counter-offer can only be set when countering a pending negotiation, got {:?}",
            patch.counter_offer
        )));
    }
    Ok(())
}

fn require_status(
    negotiation: &Negotiation,
    action: &'static str,
    allowed: &[NegotiationStatus],
) -> Result<()> {
    if allowed.contains(&negotiation.status) {
        Ok(())
    } else {
        Err(Lift8Error::InvalidTransition {
            action,
            status: negotiation.status,
        })
    }
}
