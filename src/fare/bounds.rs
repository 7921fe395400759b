//! Admissible offer range derived from a fare estimate

use serde::Serialize;

use crate::error::{Lift8Error, Result};

/// Lowest opening offer as a fraction of the estimate
pub const MIN_OFFER_FACTOR: f64 = 0.8;

/// Closed interval `[min, max]` an opening offer must fall in
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NegotiationBounds {
    min: f64,
    max: f64,
}

impl NegotiationBounds {
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, offer: f64) -> bool {
        self.min <= offer && offer <= self.max
    }
}

/// Offer range for an estimated cost: `[0.8 * cost, cost]`
pub fn bounds(estimated_cost: f64) -> Result<NegotiationBounds> {
    if !estimated_cost.is_finite() || estimated_cost <= 0.0 {
        return Err(Lift8Error::InvalidInput(format!(
            "estimated cost must be a positive number, got {}",
            estimated_cost
        )));
    }

    Ok(NegotiationBounds {
        min: MIN_OFFER_FACTOR * estimated_cost,
        max: estimated_cost,
    })
}

/// Check an offer against the range. Both ends are inclusive; NaN never passes.
pub fn validate_offer(offer: f64, bounds: &NegotiationBounds) -> Result<()> {
    if bounds.contains(offer) {
        Ok(())
    } else {
        Err(Lift8Error::OutOfRange {
            offer,
            min: bounds.min,
            max: bounds.max,
        })
    }
}
