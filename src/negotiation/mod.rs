//! Negotiation module for bounded offer/counter-offer price agreement

pub mod engine;
pub mod machine;
pub mod types;

pub use engine::NegotiationEngine;
pub use machine::{
    accept_counter_offer, apply, create_negotiation, reject, submit_counter_offer, validate_patch,
};
pub use types::{
    Negotiation, NegotiationAction, NegotiationPatch, NegotiationStatus, StoredNegotiation,
};
