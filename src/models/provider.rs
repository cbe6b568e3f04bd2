use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub accepting_new_customers: bool,
    pub base_lat: Option<f64>,
    pub base_lng: Option<f64>,
    pub requires_travel_buffer: bool,
    pub reschedule_enabled: bool,
    pub reschedule_requires_reapproval: bool,
    pub max_series_occurrences: Option<u32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Provider {
    /// Home-base coordinates, when the provider has configured them.
    pub fn base_coordinates(&self) -> Option<Coordinates> {
        match (self.base_lat, self.base_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    pub provider_id: String,
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
