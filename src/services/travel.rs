use crate::models::Coordinates;

/// Travel-time collaborator. The engine only needs door-to-door
/// minutes between two points; where those minutes come from (routing
/// service, straight-line estimate) is up to the implementation.
pub trait TravelEstimator: Send + Sync {
    fn travel_minutes(&self, from: Coordinates, to: Coordinates) -> anyhow::Result<f64>;
}

/// Straight-line fallback estimator: haversine distance at an assumed
/// average road speed. Good enough for buffer checks between stables.
pub struct HaversineEstimator {
    avg_speed_kmh: f64,
}

impl HaversineEstimator {
    pub fn new(avg_speed_kmh: f64) -> Self {
        Self { avg_speed_kmh }
    }
}

impl Default for HaversineEstimator {
    fn default() -> Self {
        Self::new(40.0)
    }
}

impl TravelEstimator for HaversineEstimator {
    fn travel_minutes(&self, from: Coordinates, to: Coordinates) -> anyhow::Result<f64> {
        anyhow::ensure!(
            self.avg_speed_kmh > 0.0,
            "average travel speed must be positive"
        );
        Ok(haversine_km(from, to) / self.avg_speed_kmh * 60.0)
    }
}

pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}
