//! LIFT8 negotiation core
//!
//! Price negotiation between a consumer booking a truck and the truck's owner:
//! - fare estimation from distance, weight and the truck's rate card
//! - the admissible opening-offer range derived from the estimate
//! - the pending / countered / confirmed / rejected state machine
//! - the store contract (compare-and-swap transitions, change feed) and an
//!   in-memory implementation of it

pub mod config;
pub mod error;
pub mod fare;
pub mod logging;
pub mod negotiation;
pub mod sync;
pub mod types;

// Re-export commonly used types and functions
pub use config::SyncConfig;
pub use error::{Lift8Error, Result};
pub use fare::{bounds, estimate, validate_offer, NegotiationBounds, RateCard, TripQuote};
pub use negotiation::{
    accept_counter_offer, create_negotiation, reject, submit_counter_offer, Negotiation,
    NegotiationEngine, NegotiationStatus, StoredNegotiation,
};
pub use sync::{ChangeEvent, ChangeStream, InMemoryStore, NegotiationStore};
pub use types::{ConsumerID, NegotiationID, Party, Truck, TruckCategory, TruckID, TruckOwnerID};
