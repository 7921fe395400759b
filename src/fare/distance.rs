//! Distance lookup seam for the external mapping API

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Lift8Error, Result};

/// Road distance between two free-text places.
///
/// `Ok(None)` means the service answered but found no route.
#[async_trait]
pub trait DistanceLookup: Send + Sync {
    async fn distance_meters(&self, origin: &str, destination: &str) -> Result<Option<f64>>;
}

/// Trip distance in kilometres, ready for the fare estimator.
///
/// Every failure becomes `InvalidInput`: a missing distance is never priced as zero.
pub async fn trip_distance_km<L>(lookup: &L, origin: &str, destination: &str) -> Result<f64>
where
    L: DistanceLookup + ?Sized,
{
    let origin = origin.trim();
    let destination = destination.trim();
    if origin.is_empty() || destination.is_empty() {
        return Err(Lift8Error::InvalidInput(
            "both pickup and drop locations are required".to_string(),
        ));
    }

    let meters = match lookup.distance_meters(origin, destination).await {
        Ok(Some(meters)) => meters,
        Ok(None) => {
            return Err(Lift8Error::InvalidInput(format!(
                "no route found from {} to {}; check your locations",
                origin, destination
            )))
        }
        Err(e) => {
            tracing::warn!("Distance lookup failed for {} -> {}: {}", origin, destination, e);
            return Err(Lift8Error::InvalidInput(format!(
                "unable to fetch distance from {} to {}",
                origin, destination
            )));
        }
    };

    if !meters.is_finite() || meters < 0.0 {
        return Err(Lift8Error::InvalidInput(format!(
            "distance service returned an invalid distance: {}",
            meters
        )));
    }

    Ok(meters / 1000.0)
}

/// Read the distance in meters out of a Distance Matrix response body.
///
/// Uses the first origin/destination pair. A non-`OK` element status means no
/// route (`Ok(None)`); a body without that structure is `InvalidInput`.
pub fn parse_distance_matrix(body: &Value) -> Result<Option<f64>> {
    let element = body
        .get("rows")
        .and_then(|rows| rows.get(0))
        .and_then(|row| row.get("elements"))
        .and_then(|elements| elements.get(0))
        .ok_or_else(|| {
            Lift8Error::InvalidInput("distance response has no route elements".to_string())
        })?;

    if element.get("status").and_then(Value::as_str) != Some("OK") {
        return Ok(None);
    }

    element
        .get("distance")
        .and_then(|d| d.get("value"))
        .and_then(Value::as_f64)
        .map(Some)
        .ok_or_else(|| Lift8Error::InvalidInput("distance response has no distance value".to_string()))
}
