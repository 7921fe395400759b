//! Negotiation record and its status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ConsumerID, NegotiationID, Party, TruckID, TruckOwnerID};

/// Negotiation status, stored as a lowercase string
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    /// Consumer has made an offer, owner has not answered
    Pending,
    /// Owner has answered with a counter-offer
    Countered,
    /// Consumer accepted the counter-offer; the booking stands
    Confirmed,
    /// Either side walked away
    Rejected,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Pending => "pending",
            NegotiationStatus::Countered => "countered",
            NegotiationStatus::Confirmed => "confirmed",
            NegotiationStatus::Rejected => "rejected",
        }
    }

    /// Check if negotiation is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationStatus::Confirmed | NegotiationStatus::Rejected)
    }

    /// Check if negotiation is still open
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether a record in this status may move to `next`
    pub fn can_move_to(&self, next: NegotiationStatus) -> bool {
        use NegotiationStatus::*;
        matches!(
            (self, next),
            (Pending, Countered) | (Pending, Rejected) | (Countered, Confirmed) | (Countered, Rejected)
        )
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One consumer's price negotiation with a truck owner for one truck.
///
/// Participants, truck and requested price never change after creation. New
/// records come from [`create_negotiation`](super::machine::create_negotiation)
/// and later ones from the transition functions in [`machine`](super::machine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    pub(crate) consumer_id: ConsumerID,
    pub(crate) truck_owner_id: TruckOwnerID,
    pub(crate) truck_id: TruckID,
    pub(crate) requested_price: f64,
    #[serde(default)]
    pub(crate) counter_offer: Option<f64>,
    pub(crate) status: NegotiationStatus,
}

impl Negotiation {
    pub fn consumer_id(&self) -> &ConsumerID {
        &self.consumer_id
    }

    pub fn truck_owner_id(&self) -> &TruckOwnerID {
        &self.truck_owner_id
    }

    pub fn truck_id(&self) -> &TruckID {
        &self.truck_id
    }

    pub fn requested_price(&self) -> f64 {
        self.requested_price
    }

    pub fn counter_offer(&self) -> Option<f64> {
        self.counter_offer
    }

    pub fn status(&self) -> NegotiationStatus {
        self.status
    }

    /// Final booking price, once the consumer has accepted a counter-offer
    pub fn agreed_price(&self) -> Option<f64> {
        match self.status {
            NegotiationStatus::Confirmed => self.counter_offer,
            _ => None,
        }
    }

    /// Which side `participant_id` is on, if any
    pub fn party_of(&self, participant_id: &str) -> Option<Party> {
        if self.consumer_id.as_str() == participant_id {
            Some(Party::Consumer)
        } else if self.truck_owner_id.as_str() == participant_id {
            Some(Party::Owner)
        } else {
            None
        }
    }

    pub fn involves(&self, participant_id: &str) -> bool {
        self.party_of(participant_id).is_some()
    }

    /// Fields a transition into this record writes
    pub fn patch(&self) -> NegotiationPatch {
        NegotiationPatch {
            status: self.status,
            counter_offer: self.counter_offer,
        }
    }

    pub(crate) fn apply_patch(&mut self, patch: NegotiationPatch) {
        self.status = patch.status;
        self.counter_offer = patch.counter_offer;
    }
}

/// The mutable part of a negotiation, written by one compare-and-swap
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationPatch {
    pub status: NegotiationStatus,
    pub counter_offer: Option<f64>,
}

impl NegotiationPatch {
    /// Name of the action that produces this patch
    pub fn action_name(&self) -> &'static str {
        match self.status {
            NegotiationStatus::Pending => "reopen",
            NegotiationStatus::Countered => "counter",
            NegotiationStatus::Confirmed => "accept",
            NegotiationStatus::Rejected => "reject",
        }
    }
}

/// A negotiation as held by the store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredNegotiation {
    pub id: NegotiationID,
    #[serde(flatten)]
    pub negotiation: Negotiation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredNegotiation {
    pub fn status(&self) -> NegotiationStatus {
        self.negotiation.status
    }
}

/// A move in the negotiation, as requested by one participant
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NegotiationAction {
    /// Owner answers a pending offer with a price of their own
    Counter { price: f64 },
    /// Consumer takes the owner's counter-offer
    Accept,
    /// Either side ends the negotiation
    Reject { by: Party },
}

impl NegotiationAction {
    pub fn name(&self) -> &'static str {
        match self {
            NegotiationAction::Counter { .. } => "counter",
            NegotiationAction::Accept => "accept",
            NegotiationAction::Reject { .. } => "reject",
        }
    }

    /// The only side allowed to perform this action
    pub fn acting_party(&self) -> Party {
        match self {
            NegotiationAction::Counter { .. } => Party::Owner,
            NegotiationAction::Accept => Party::Consumer,
            NegotiationAction::Reject { by } => *by,
        }
    }
}
