use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::router::{appointment_backend_routes, appointment_public_routes};
use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_models::scheduling::DateRange;
use shared_utils::test_utils::{ClinicFixture, JwtTestUtils, TestConfig, TestUser};

// Handlers read the wall clock, so bookings target days well ahead of it.
fn next_monday() -> NaiveDate {
    let mut day = Utc::now().date_naive() + Duration::days(7);
    while day.weekday() != Weekday::Mon {
        day += Duration::days(1);
    }
    day
}

fn config() -> AppConfig {
    TestConfig::default().to_app_config()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn bearer(user: &TestUser) -> String {
    let token = JwtTestUtils::create_test_token(user, &TestConfig::default().jwt_secret, Some(1));
    format!("Bearer {}", token)
}

fn register_body(fixture: &ClinicFixture, start: &str, ci: &str) -> Value {
    json!({
        "appointment": {
            "provider_id": fixture.provider.id,
            "service_id": fixture.service.id,
            "start_datetime": start,
            "notes": null
        },
        "customer": { "ci": ci }
    })
}

async fn post_json(app: Router, uri: &str, body: Value, auth: Option<String>) -> axum::response::Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn public_register_returns_tagged_outcomes() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let app = appointment_public_routes(fixture.state(config()));
    let start = format!("{}T09:00:00", next_monday());

    let response = post_json(app.clone(), "/register", register_body(&fixture, &start, "4567890"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "booked");
    assert_eq!(json["service"], "Consulta externa");
    assert_eq!(json["booking_reference"].as_str().unwrap().len(), 64);
    assert!(json.get("id").is_none());

    let other = format!("{}T11:00:00", next_monday());
    let response = post_json(app.clone(), "/register", register_body(&fixture, &other, "111"), None).await;
    assert_eq!(body_json(response).await["kind"], "patient_not_found");

    fixture.register_patient("7654321", "Juan", "Mamani").await;
    let response = post_json(app, "/register", register_body(&fixture, &start, "7654321"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["kind"], "slot_no_longer_available");
}

#[tokio::test]
async fn public_register_requires_challenge_when_enabled() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let mut with_captcha = config();
    with_captcha.captcha_enabled = true;
    let app = appointment_public_routes(fixture.state(with_captcha));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/captcha").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let challenge = body_json(response).await;
    assert_eq!(challenge["enabled"], true);
    assert!(challenge["question"].as_str().unwrap().contains('+'));

    let start = format!("{}T09:00:00", next_monday());
    let mut body = register_body(&fixture, &start, "4567890");
    body["captcha"] = json!({ "token": challenge["token"], "answer": "not a number" });
    let response = post_json(app, "/register", body, None).await;

    assert_eq!(body_json(response).await["kind"], "challenge_failed");
    assert_eq!(fixture.store.appointment_count().await, 0);
}

#[tokio::test]
async fn reservation_lookup_reports_existing_booking() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let customer = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(customer.clone()).await;
    let today = Utc::now().date_naive();
    fixture
        .book(customer.id, today.and_hms_opt(23, 0, 0).unwrap(), 20)
        .await;
    let app = appointment_public_routes(fixture.state(config()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/patients/reservation?ci=4.567.890")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["kind"], "already_reserved");
    assert_eq!(json["reservation"]["provider"], "Carla Rojas");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/patients/reservation?ci=999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["kind"], "patient_not_found");
}

#[tokio::test]
async fn backend_routes_require_authentication() {
    let fixture = ClinicFixture::new().await;
    let app = appointment_backend_routes(fixture.state(config()));
    let start = format!("{}T09:00:00", next_monday());

    let response = post_json(app.clone(), "/appointments", register_body(&fixture, &start, "4567890"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/reports/by-speciality?speciality_id=all&date={}", next_monday()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn secretary_saves_walk_in_and_deletes_it() {
    let fixture = ClinicFixture::new().await;
    let app = appointment_backend_routes(fixture.state(config()));
    let secretary = TestUser::secretary("desk@clinic.test");
    let start = format!("{}T09:00:00", next_monday());

    let mut body = register_body(&fixture, &start, "9988776");
    body["customer"] = json!({ "ci": "9988776", "first_name": "Luis", "last_name": "Condori" });
    let response = post_json(app.clone(), "/appointments", body, Some(bearer(&secretary))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["kind"], "booked");

    let day = next_monday();
    let appointment = fixture
        .store
        .get_appointments(fixture.provider.id, DateRange::single(day), None)
        .await
        .unwrap()
        .remove(0);

    let delete = |id: Uuid| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/appointments/{}", id))
            .header("Authorization", bearer(&secretary))
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(delete(appointment.id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fixture.store.appointment_count().await, 0);

    let response = app.oneshot(delete(appointment.id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_cannot_book_into_another_calendar() {
    let fixture = ClinicFixture::new().await;
    let app = appointment_backend_routes(fixture.state(config()));
    let stranger = TestUser::provider_for(Uuid::new_v4(), "other@clinic.test");
    let start = format!("{}T09:00:00", next_monday());

    let response = post_json(app, "/appointments", register_body(&fixture, &start, "4567890"), Some(bearer(&stranger))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(fixture.store.appointment_count().await, 0);
}

#[tokio::test]
async fn reports_are_served_to_staff() {
    let fixture = ClinicFixture::new().await;
    let customer = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(customer.clone()).await;
    let day = next_monday();
    fixture
        .book(customer.id, day.and_hms_opt(9, 0, 0).unwrap(), 20)
        .await;
    let app = appointment_backend_routes(fixture.state(config()));
    let admin = TestUser::admin("admin@clinic.test");

    let get = |uri: String| {
        Request::builder()
            .uri(uri)
            .header("Authorization", bearer(&admin))
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(get(format!("/reports/by-speciality?speciality_id=all&date={}", day)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["groups"][0]["key"], "Cardiología - Rojas Carla");
    assert_eq!(json["groups"][0]["patients"][0]["first_name"], "Rosa");

    let response = app
        .clone()
        .oneshot(get(format!("/reports/by-speciality?speciality_id=nope&date={}", day)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get("/reports/by-ci?ci=4.567.890".to_string()))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["kind"], "found");
    assert_eq!(json["appointment"]["provider"], "Carla Rojas");

    let response = app
        .oneshot(get("/reports/by-ci?ci=222".to_string()))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["kind"], "not_found");
}

#[tokio::test]
async fn provider_cannot_move_another_calendars_appointment() {
    let fixture = ClinicFixture::new().await;
    let customer = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(customer.clone()).await;
    let day = next_monday();
    let existing = fixture
        .book(customer.id, day.and_hms_opt(9, 0, 0).unwrap(), 20)
        .await;
    let app = appointment_backend_routes(fixture.state(config()));

    let other_calendar = Uuid::new_v4();
    let stranger = TestUser::provider_for(other_calendar, "other@clinic.test");
    let mut body = register_body(&fixture, &format!("{}T11:00:00", day), "4567890");
    body["appointment"]["provider_id"] = json!(other_calendar);
    body["exclude_appointment_id"] = json!(existing.id);

    let response = post_json(app.clone(), "/appointments", body, Some(bearer(&stranger))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let stored = fixture.store.get_appointment(existing.id).await.unwrap().unwrap();
    assert_eq!(stored.provider_id, fixture.provider.id);
    assert_eq!(stored.start_datetime, existing.start_datetime);

    let owner = TestUser::provider_for(fixture.provider.id, "carla@clinic.test");
    let mut body = register_body(&fixture, &format!("{}T11:00:00", day), "4567890");
    body["exclude_appointment_id"] = json!(existing.id);
    let response = post_json(app, "/appointments", body, Some(bearer(&owner))).await;
    let json = body_json(response).await;
    assert_eq!(json["kind"], "booked");
    assert_eq!(json["rescheduled"], true);
}

#[tokio::test]
async fn booking_reference_is_the_public_handle() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    fixture.register_patient("1111111", "Juan", "Mamani").await;
    let app = appointment_public_routes(fixture.state(config()));
    let day = next_monday();

    let response = post_json(
        app.clone(),
        "/register",
        register_body(&fixture, &format!("{}T09:00:00", day), "4567890"),
        None,
    )
    .await;
    let reference = body_json(response).await["booking_reference"]
        .as_str()
        .unwrap()
        .to_string();

    let lookup = |reference: &str| {
        Request::builder()
            .uri(format!("/appointments/{}", reference))
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(lookup(&reference)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["reservation"]["provider"], "Carla Rojas");
    assert_eq!(json["reservation"]["start_datetime"], format!("{}T09:00:00", day));

    let response = app.clone().oneshot(lookup("deadbeef")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut hijack = register_body(&fixture, &format!("{}T11:00:00", day), "1111111");
    hijack["booking_reference"] = json!(reference);
    let response = post_json(app.clone(), "/register", hijack, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut moved = register_body(&fixture, &format!("{}T11:00:00", day), "4567890");
    moved["booking_reference"] = json!(reference);
    let response = post_json(app.clone(), "/register", moved, None).await;
    let json = body_json(response).await;
    assert_eq!(json["kind"], "booked");
    assert_eq!(json["booking_reference"], reference.as_str());
    assert_eq!(fixture.store.appointment_count().await, 1);

    let response = app.oneshot(lookup(&reference)).await.unwrap();
    assert_eq!(
        body_json(response).await["reservation"]["start_datetime"],
        format!("{}T11:00:00", day)
    );
}
