use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::travel::TravelEstimator;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    /// Optional collaborator; providers that require travel buffers
    /// cannot take bookings without it.
    pub travel: Option<Box<dyn TravelEstimator>>,
}
