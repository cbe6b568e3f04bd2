use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::{NaiveTime, Utc};
use tower::ServiceExt;

use stablebook::config::AppConfig;
use stablebook::db;
use stablebook::db::queries;
use stablebook::handlers;
use stablebook::models::{DayHours, Provider, ServiceOffering, WeeklyHours};
use stablebook::state::AppState;

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        slot_step_minutes: 15,
        series_enabled: true,
        max_series_occurrences: 26,
        travel_speed_kmh: 40.0,
    }
}

fn seed(conn: &rusqlite::Connection) {
    let now = Utc::now().naive_utc();
    queries::upsert_provider(
        conn,
        &Provider {
            id: "prov-1".to_string(),
            name: "Hooves & Co".to_string(),
            is_active: true,
            accepting_new_customers: true,
            base_lat: None,
            base_lng: None,
            requires_travel_buffer: false,
            reschedule_enabled: true,
            reschedule_requires_reapproval: false,
            max_series_occurrences: None,
            created_at: now,
            updated_at: now,
        },
    )
    .unwrap();
    queries::upsert_service(
        conn,
        &ServiceOffering {
            id: "svc-1".to_string(),
            provider_id: "prov-1".to_string(),
            name: "Full trim".to_string(),
            duration_minutes: 60,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .unwrap();
    for weekday in 0..7 {
        queries::upsert_weekly_hours(
            conn,
            &WeeklyHours {
                provider_id: "prov-1".to_string(),
                weekday,
                hours: Some(DayHours {
                    opens_at: NaiveTime::parse_from_str("09:00", "%H:%M").unwrap(),
                    closes_at: NaiveTime::parse_from_str("17:00", "%H:%M").unwrap(),
                }),
            },
        )
        .unwrap();
    }
}

fn test_state() -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    seed(&conn);
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        travel: None,
    })
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
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
        .with_state(state)
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_booking(app: &Router, user: &str, date: &str, start: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            Some(user),
            serde_json::json!({
                "provider_id": "prov-1",
                "service_id": "svc-1",
                "date": date,
                "start_time": start,
                "horse_name": "Biscuit",
            }),
        ))
        .await
        .unwrap()
}

// ── Tests ──

#[tokio::test]
async fn test_health() {
    let app = test_app(test_state());
    let response = app.oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_slot_grid_full_day() {
    let app = test_app(test_state());
    let response = app
        .oneshot(get_request(
            "/api/providers/prov-1/slots?service_id=svc-1&date=2099-03-02",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let slots = body_json(response).await;
    let slots = slots.as_array().unwrap();
    // 09:00 through 16:00 starts at a 15 minute step.
    assert_eq!(slots.len(), 29);
    assert_eq!(slots[0]["start_time"], "09:00");
    assert_eq!(slots[0]["end_time"], "10:00");
    assert!(slots.iter().all(|s| s["is_available"] == true));
}

#[tokio::test]
async fn test_slot_grid_reflects_bookings() {
    let app = test_app(test_state());
    let response = create_booking(&app, "cust-1", "2099-03-02", "10:00").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(get_request(
            "/api/providers/prov-1/slots?service_id=svc-1&date=2099-03-02&step=60",
            None,
        ))
        .await
        .unwrap();
    let slots = body_json(response).await;
    let slots = slots.as_array().unwrap();
    assert_eq!(slots.len(), 8);
    assert_eq!(slots[0]["is_available"], true); // 09:00 ends as the booking starts
    assert_eq!(slots[1]["is_available"], false); // 10:00 is taken
    assert_eq!(slots[2]["is_available"], true); // 11:00 starts as it ends
}

#[tokio::test]
async fn test_create_booking_requires_identity() {
    let app = test_app(test_state());
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            None,
            serde_json::json!({
                "provider_id": "prov-1",
                "service_id": "svc-1",
                "date": "2099-03-02",
                "start_time": "10:00",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_double_booking_rejected() {
    let app = test_app(test_state());

    let first = create_booking(&app, "cust-1", "2099-03-02", "10:00").await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;
    assert_eq!(first["status"], "pending");
    assert_eq!(first["end_time"], "11:00");

    let overlapping = create_booking(&app, "cust-2", "2099-03-02", "10:30").await;
    assert_eq!(overlapping.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(overlapping).await["code"], "slot_taken");

    let adjacent = create_booking(&app, "cust-2", "2099-03-02", "11:00").await;
    assert_eq!(adjacent.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_cancel_frees_the_slot() {
    let app = test_app(test_state());
    let booking = body_json(create_booking(&app, "cust-1", "2099-03-02", "10:00").await).await;
    let id = booking["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/cancel"),
            Some("cust-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");

    let rebook = create_booking(&app, "cust-2", "2099-03-02", "10:00").await;
    assert_eq!(rebook.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_reschedule_and_ownership() {
    let app = test_app(test_state());
    let booking = body_json(create_booking(&app, "cust-1", "2099-03-02", "10:00").await).await;
    let id = booking["id"].as_str().unwrap();

    // Someone else sees a 404, not a 403.
    let foreign = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/reschedule"),
            Some("cust-2"),
            serde_json::json!({ "date": "2099-03-03", "start_time": "14:00" }),
        ))
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/reschedule"),
            Some("cust-1"),
            serde_json::json!({ "date": "2099-03-03", "start_time": "14:00" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let moved = body_json(response).await;
    assert_eq!(moved["date"], "2099-03-03");
    assert_eq!(moved["start_time"], "14:00");
    assert_eq!(moved["end_time"], "15:00");
    assert_eq!(moved["reschedule_count"], 1);
}

#[tokio::test]
async fn test_booking_lifecycle_via_provider() {
    let app = test_app(test_state());
    let booking = body_json(create_booking(&app, "cust-1", "2099-03-02", "10:00").await).await;
    let id = booking["id"].as_str().unwrap();

    let confirm = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/confirm"),
            Some("prov-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(confirm.status(), StatusCode::OK);
    assert_eq!(body_json(confirm).await["status"], "confirmed");

    // The customer cannot confirm or complete.
    let forbidden = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/complete"),
            Some("cust-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let complete = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/complete"),
            Some("prov-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(complete.status(), StatusCode::OK);
    assert_eq!(body_json(complete).await["status"], "completed");

    // Terminal now.
    let cancel = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/cancel"),
            Some("cust-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(cancel).await["code"], "already_terminal");
}

#[tokio::test]
async fn test_closed_exception_blocks_booking() {
    let app = test_app(test_state());

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/providers/prov-1/exceptions/2099-03-02",
            Some("prov-1"),
            serde_json::json!({ "closed": true, "reason": "yard show" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let blocked = create_booking(&app, "cust-1", "2099-03-02", "10:00").await;
    assert_eq!(blocked.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(blocked).await["code"], "closed");

    // The slot grid shows an empty day.
    let slots = app
        .clone()
        .oneshot(get_request(
            "/api/providers/prov-1/slots?service_id=svc-1&date=2099-03-02",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(body_json(slots).await.as_array().unwrap().len(), 0);

    // Only the provider may edit their calendar.
    let foreign = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/providers/prov-1/exceptions/2099-03-09",
            Some("cust-1"),
            serde_json::json!({ "closed": true }),
        ))
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_series_partial_success_and_cancel() {
    let app = test_app(test_state());

    // Occupy the second weekly occurrence.
    let blocker = create_booking(&app, "cust-9", "2099-03-09", "10:00").await;
    assert_eq!(blocker.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/series",
            Some("cust-1"),
            serde_json::json!({
                "provider_id": "prov-1",
                "service_id": "svc-1",
                "start_date": "2099-03-02",
                "start_time": "10:00",
                "interval_unit": "week",
                "interval_count": 1,
                "occurrences": 3,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let outcome = body_json(response).await;
    assert_eq!(outcome["bookings_created"], 2);
    let errors = outcome["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["date"], "2099-03-09");
    assert_eq!(errors[0]["code"], "slot_taken");

    let series_id = outcome["series_id"].as_str().unwrap();
    let cancel = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/series/{series_id}/cancel"),
            Some("cust-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::OK);
    assert_eq!(body_json(cancel).await["cancelled"], 2);
}

#[tokio::test]
async fn test_group_flow() {
    let app = test_app(test_state());

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/groups",
            Some("cust-1"),
            serde_json::json!({
                "service_type": "farrier",
                "location": "Willow Yard",
                "date_from": "2099-03-02",
                "date_to": "2099-03-08",
                "max_participants": 4,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let request = body_json(created).await;
    assert_eq!(request["status"], "open");
    let invite_code = request["invite_code"].as_str().unwrap().to_string();
    let request_id = request["id"].as_str().unwrap().to_string();

    for user in ["cust-1", "cust-2"] {
        let joined = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/groups/join",
                Some(user),
                serde_json::json!({ "invite_code": invite_code.as_str(), "horse_name": "Biscuit" }),
            ))
            .await
            .unwrap();
        assert_eq!(joined.status(), StatusCode::OK);
    }

    // Only the named provider may commit the visit.
    let not_provider = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/groups/{request_id}/match"),
            Some("cust-1"),
            serde_json::json!({
                "provider_id": "prov-1",
                "service_id": "svc-1",
                "date": "2099-03-04",
                "start_time": "10:00",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(not_provider.status(), StatusCode::FORBIDDEN);

    let matched = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/groups/{request_id}/match"),
            Some("prov-1"),
            serde_json::json!({
                "provider_id": "prov-1",
                "service_id": "svc-1",
                "date": "2099-03-04",
                "start_time": "10:00",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(matched.status(), StatusCode::OK);
    let outcome = body_json(matched).await;
    assert_eq!(outcome["bookings_created"], 2);
    assert_eq!(outcome["errors"].as_array().unwrap().len(), 0);
    let bookings = outcome["bookings"].as_array().unwrap();
    assert_eq!(bookings[0]["start_time"], "10:00");
    assert_eq!(bookings[1]["start_time"], "11:00");

    // A second match finds the request no longer open.
    let again = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/groups/{request_id}/match"),
            Some("prov-1"),
            serde_json::json!({
                "provider_id": "prov-1",
                "service_id": "svc-1",
                "date": "2099-03-05",
                "start_time": "10:00",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(again).await["code"], "group_not_open");
}

#[tokio::test]
async fn test_ics_download_visibility() {
    let app = test_app(test_state());
    let booking = body_json(create_booking(&app, "cust-1", "2099-03-02", "10:00").await).await;
    let id = booking["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/api/bookings/{id}/calendar.ics"),
            Some("cust-1"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/calendar"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let ics = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(ics.contains("BEGIN:VCALENDAR"));
    assert!(ics.contains("DTSTART:20990302T100000"));

    let stranger = app
        .clone()
        .oneshot(get_request(
            &format!("/api/bookings/{id}/calendar.ics"),
            Some("nosy"),
        ))
        .await
        .unwrap();
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);
}
