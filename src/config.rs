use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Granularity of the advisory slot grid when a request does not
    /// pass its own step.
    pub slot_step_minutes: i32,
    pub series_enabled: bool,
    /// Cap on series expansion for providers without their own limit.
    pub max_series_occurrences: u32,
    /// Assumed average road speed for the fallback travel estimator.
    pub travel_speed_kmh: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "stablebook.db".to_string()),
            slot_step_minutes: env::var("SLOT_STEP_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            series_enabled: env::var("SERIES_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            max_series_occurrences: env::var("MAX_SERIES_OCCURRENCES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(26),
            travel_speed_kmh: env::var("TRAVEL_SPEED_KMH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(40.0),
        }
    }
}
