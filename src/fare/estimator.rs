//! Fare estimation from distance, weight and a truck's rate card

use serde::{Deserialize, Serialize};

use crate::error::{Lift8Error, Result};

use super::bounds::{bounds, NegotiationBounds};

/// Per-truck tariff
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCard {
    pub base_fare: f64,
    pub per_km_rate: f64,
    pub per_kg_rate: f64,
}

impl RateCard {
    /// Create a rate card, rejecting negative or non-finite rates
    pub fn new(base_fare: f64, per_km_rate: f64, per_kg_rate: f64) -> Result<Self> {
        let card = Self {
            base_fare,
            per_km_rate,
            per_kg_rate,
        };
        card.validate()?;
        Ok(card)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base fare", self.base_fare),
            ("per-km rate", self.per_km_rate),
            ("per-kg rate", self.per_kg_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Lift8Error::InvalidInput(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Estimate the cost of a trip.
///
/// Fails with `InvalidInput` when the weight is not positive or exceeds the
/// truck's capacity, or when the distance is negative or not finite. A failed
/// distance lookup must arrive here as an error, never as a zero distance.
/// The result is not rounded.
pub fn estimate(
    rate_card: &RateCard,
    distance_km: f64,
    weight_kg: f64,
    capacity_kg: f64,
) -> Result<f64> {
    rate_card.validate()?;

    if !distance_km.is_finite() {
        return Err(Lift8Error::InvalidInput(
            "distance is unavailable; check the pickup and drop locations".to_string(),
        ));
    }
    if distance_km < 0.0 {
        return Err(Lift8Error::InvalidInput(format!(
            "distance cannot be negative, got {} km",
            distance_km
        )));
    }
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        return Err(Lift8Error::InvalidInput(
            "weight must be a valid positive number".to_string(),
        ));
    }
    if !capacity_kg.is_finite() || weight_kg > capacity_kg {
        return Err(Lift8Error::InvalidInput(format!(
            "weight of {} kg exceeds truck capacity of {} kg",
            weight_kg, capacity_kg
        )));
    }

    Ok(rate_card.base_fare + distance_km * rate_card.per_km_rate + weight_kg * rate_card.per_kg_rate)
}

/// A validated trip on a specific truck.
///
/// Only the inputs are stored; the cost is recomputed every time it is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TripQuote {
    rate_card: RateCard,
    distance_km: f64,
    weight_kg: f64,
}

impl TripQuote {
    pub fn new(rate_card: RateCard, distance_km: f64, weight_kg: f64, capacity_kg: f64) -> Result<Self> {
        estimate(&rate_card, distance_km, weight_kg, capacity_kg)?;
        Ok(Self {
            rate_card,
            distance_km,
            weight_kg,
        })
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn weight_kg(&self) -> f64 {
        self.weight_kg
    }

    pub fn rate_card(&self) -> &RateCard {
        &self.rate_card
    }

    pub fn estimated_cost(&self) -> f64 {
        self.rate_card.base_fare
            + self.distance_km * self.rate_card.per_km_rate
            + self.weight_kg * self.rate_card.per_kg_rate
    }

    /// Offer range for this trip
    pub fn bounds(&self) -> Result<NegotiationBounds> {
        bounds(self.estimated_cost())
    }
}

/// Render an amount the way the booking screens show it
pub fn format_rupees(amount: f64) -> String {
    format!("₹{:.2}", amount)
}
