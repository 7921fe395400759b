//! Core types used throughout LIFT8

use blake2::{Blake2b512, Digest};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Lift8Error, Result};
use crate::fare::{RateCard, TripQuote};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Account id of the consumer booking a truck
    ConsumerID
);
string_id!(
    /// Account id of the truck owner answering booking requests
    TruckOwnerID
);
string_id!(
    /// Truck catalog id
    TruckID
);
string_id!(
    /// Store-assigned negotiation id
    NegotiationID
);

impl NegotiationID {
    /// Generate a new opaque negotiation id from random bytes
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);

        let mut hasher = Blake2b512::new();
        hasher.update(seed);
        hasher.update(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
        let result = hasher.finalize();

        Self(format!("neg_{}", hex::encode(&result[..16])))
    }
}

/// Either side of a negotiation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Consumer,
    Owner,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Consumer => write!(f, "consumer"),
            Party::Owner => write!(f, "truck owner"),
        }
    }
}

/// Body style offered in the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruckCategory {
    Open,
    Closed,
}

/// The part of a catalog truck the pricing core needs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Truck {
    pub id: TruckID,
    pub name: String,
    pub category: TruckCategory,
    pub capacity_kg: f64,
    pub rate_card: RateCard,
    /// Set once a truck owner has claimed the truck
    pub owner_id: Option<TruckOwnerID>,
}

impl Truck {
    /// Quote a trip on this truck
    pub fn quote(&self, distance_km: f64, weight_kg: f64) -> Result<TripQuote> {
        TripQuote::new(self.rate_card, distance_km, weight_kg, self.capacity_kg)
    }

    /// Truck owner takes over an unclaimed catalog truck.
    ///
    /// Returns the claimed copy; a truck that already has an owner is refused,
    /// including when the same owner claims it twice.
    pub fn claim(&self, owner: TruckOwnerID) -> Result<Truck> {
        if let Some(existing) = &self.owner_id {
            return Err(Lift8Error::InvalidInput(format!(
                "truck {} ({}) is already claimed by {}",
                self.name, self.id, existing
            )));
        }

        tracing::info!("Truck {} ({}) claimed by {}", self.name, self.id, owner);
        Ok(Truck {
            owner_id: Some(owner),
            ..self.clone()
        })
    }

    /// Owner to send booking requests to
    pub fn require_owner(&self) -> Result<&TruckOwnerID> {
        self.owner_id.as_ref().ok_or_else(|| {
            Lift8Error::InvalidInput(format!(
                "truck {} ({}) has no owner yet and cannot be booked",
                self.name, self.id
            ))
        })
    }
}
