//! Trip pricing: fare estimate, admissible offer range, distance lookup

pub mod bounds;
pub mod distance;
pub mod estimator;

pub use bounds::{bounds, validate_offer, NegotiationBounds, MIN_OFFER_FACTOR};
pub use distance::{parse_distance_matrix, trip_distance_km, DistanceLookup};
pub use estimator::{estimate, format_rupees, RateCard, TripQuote};
