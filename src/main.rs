use std::sync::{Arc, Mutex};

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stablebook::config::AppConfig;
use stablebook::db;
use stablebook::handlers;
use stablebook::services::travel::{HaversineEstimator, TravelEstimator};
use stablebook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let travel: Option<Box<dyn TravelEstimator>> =
        Some(Box::new(HaversineEstimator::new(config.travel_speed_kmh)));

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        travel,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/providers/:id/slots",
            get(handlers::availability::get_slots),
        )
        .route(
            "/api/providers/:id/schedule",
            get(handlers::availability::get_schedule).put(handlers::availability::put_schedule),
        )
        .route(
            "/api/providers/:id/exceptions/:date",
            put(handlers::availability::put_exception)
                .delete(handlers::availability::delete_exception),
        )
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/reschedule",
            post(handlers::bookings::reschedule_booking),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/confirm",
            post(handlers::bookings::confirm_booking),
        )
        .route(
            "/api/bookings/:id/complete",
            post(handlers::bookings::complete_booking),
        )
        .route(
            "/api/bookings/:id/calendar.ics",
            get(handlers::calendar::download_ics),
        )
        .route("/api/series", post(handlers::series::create_series))
        .route(
            "/api/series/:id/cancel",
            post(handlers::series::cancel_series),
        )
        .route("/api/groups", post(handlers::groups::create_group))
        .route("/api/groups/join", post(handlers::groups::join_group))
        .route(
            "/api/groups/participants/:id/leave",
            post(handlers::groups::leave_group),
        )
        .route("/api/groups/:id/match", post(handlers::groups::match_group))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
