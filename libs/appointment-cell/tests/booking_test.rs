use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use appointment_cell::{
    AppointmentDraft, AppointmentError, BookingMode, BookingOutcome, BookingTransaction,
    ChallengeResponse, ChallengeVerifier, CustomerDraft, RegisterAppointmentRequest,
};
use schedule_cell::{SlotCalculator, SlotOptions};
use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_utils::test_utils::{at, date, fixture_monday, ClinicFixture, TestConfig};

/// 07:00 in La Paz on the fixture Monday; the whole working day is ahead.
const MORNING: &str = "2025-06-02T11:00:00Z";

fn instant(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn transaction(fixture: &ClinicFixture, config: AppConfig) -> BookingTransaction {
    BookingTransaction::new(fixture.store.clone(), Arc::new(config))
}

fn customer_draft(ci: &str) -> CustomerDraft {
    CustomerDraft {
        ci: ci.to_string(),
        complement: None,
        first_name: None,
        last_name: None,
        email: Some("rosa@example.com".to_string()),
        phone_number: None,
    }
}

fn request(fixture: &ClinicFixture, start: NaiveDateTime, ci: &str) -> RegisterAppointmentRequest {
    RegisterAppointmentRequest {
        appointment: AppointmentDraft {
            provider_id: fixture.provider.id,
            service_id: fixture.service.id,
            start_datetime: start,
            end_datetime: None,
            notes: Some("Control de presión".to_string()),
            municipality: Some("El Alto".to_string()),
            medical_center: None,
        },
        customer: Some(customer_draft(ci)),
        captcha: None,
        exclude_appointment_id: None,
        booking_reference: None,
    }
}

#[tokio::test]
async fn registered_patient_books_free_slot() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();

    let booked = transaction(&fixture, config())
        .submit_appointment(request(&fixture, at(day, 9, 0), "4.567.890"), BookingMode::Public, instant(MORNING))
        .await
        .unwrap();

    assert_eq!(booked.appointment.end_datetime, at(day, 9, 20));
    assert_eq!(booked.appointment.hash, booked.booking_reference);
    assert_eq!(booked.customer.first_name, "Rosa");
    assert_eq!(booked.customer.last_name, "Quispe");
    assert_eq!(booked.customer.clinical_story.as_deref(), Some("HC-4567890"));
    assert!(!booked.rescheduled);
    assert_eq!(fixture.store.appointment_count().await, 1);
    assert_eq!(fixture.store.customer_count().await, 1);

    let outcome = serde_json::to_value(BookingOutcome::from(booked.clone())).unwrap();
    assert_eq!(outcome["kind"], "booked");
    assert_eq!(outcome["provider"], "Carla Rojas");
    assert!(!outcome.to_string().contains(&booked.appointment.id.to_string()));
}

#[tokio::test]
async fn booked_interval_disappears_from_slots() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();

    transaction(&fixture, config())
        .submit_appointment(request(&fixture, at(day, 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
        .await
        .unwrap();

    let slots = SlotCalculator::new(fixture.store.clone())
        .compute_available_slots(fixture.provider.id, fixture.service.id, day, &SlotOptions::default())
        .await
        .unwrap();
    assert!(slots.contains(&at(day, 8, 40)));
    assert!(!slots.contains(&at(day, 8, 50)));
    assert!(!slots.contains(&at(day, 9, 10)));
    assert!(slots.contains(&at(day, 9, 20)));
}

#[tokio::test]
async fn unknown_patient_is_rejected_without_writes() {
    let fixture = ClinicFixture::new().await;

    let result = transaction(&fixture, config())
        .submit_appointment(request(&fixture, at(fixture_monday(), 9, 0), "111"), BookingMode::Public, instant(MORNING))
        .await;

    assert_matches!(result, Err(AppointmentError::PatientNotFound));
    assert_eq!(fixture.store.appointment_count().await, 0);
    assert_eq!(fixture.store.customer_count().await, 0);
}

#[tokio::test]
async fn second_booking_on_the_same_day_is_already_reserved() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();
    let booking = transaction(&fixture, config());

    booking
        .submit_appointment(request(&fixture, at(day, 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
        .await
        .unwrap();
    let result = booking
        .submit_appointment(request(&fixture, at(day, 11, 0), "4.567.890"), BookingMode::Public, instant(MORNING))
        .await;

    assert_matches!(result, Err(AppointmentError::AlreadyReserved(reservation)) => {
        assert_eq!(reservation.date, day);
        assert_eq!(reservation.start_datetime, at(day, 9, 0));
        assert_eq!(reservation.service, "Consulta externa");
        assert_eq!(reservation.provider, "Carla Rojas");
    });
    assert_eq!(fixture.store.appointment_count().await, 1);
}

#[tokio::test]
async fn same_day_rule_decides_whether_the_year_counts() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let customer = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(customer.clone()).await;
    fixture.book(customer.id, at(date(2024, 6, 2), 9, 0), 20).await;
    let day = fixture_monday();

    let legacy = transaction(&fixture, config())
        .submit_appointment(request(&fixture, at(day, 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
        .await;
    assert_matches!(legacy, Err(AppointmentError::AlreadyReserved(_)));

    let mut strict = config();
    strict.same_day_rule = shared_config::SameDayRule::CalendarDay;
    let booked = transaction(&fixture, strict)
        .submit_appointment(request(&fixture, at(day, 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
        .await
        .unwrap();
    assert_eq!(booked.customer.id, customer.id);
}

#[tokio::test]
async fn break_and_past_slots_are_no_longer_available() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();
    let booking = transaction(&fixture, config());

    let in_break = booking
        .submit_appointment(request(&fixture, at(day, 9, 50), "4567890"), BookingMode::Public, instant(MORNING))
        .await;
    assert_matches!(in_break, Err(AppointmentError::SlotNoLongerAvailable));

    // 09:00 in La Paz.
    let late = instant("2025-06-02T13:00:00Z");
    let past = booking
        .submit_appointment(request(&fixture, at(day, 8, 20), "4567890"), BookingMode::Public, late)
        .await;
    assert_matches!(past, Err(AppointmentError::SlotNoLongerAvailable));

    let staff = booking
        .submit_appointment(request(&fixture, at(day, 8, 20), "4567890"), BookingMode::Staff, late)
        .await
        .unwrap();
    assert_eq!(staff.appointment.start_datetime, at(day, 8, 20));
}

#[tokio::test]
async fn off_grid_start_is_accepted_when_it_fits() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();

    let booked = transaction(&fixture, config())
        .submit_appointment(request(&fixture, at(day, 8, 7), "4567890"), BookingMode::Public, instant(MORNING))
        .await
        .unwrap();
    assert_eq!(booked.appointment.end_datetime, at(day, 8, 27));
}

#[tokio::test]
async fn malformed_interval_is_rejected_before_storage() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();
    let booking = transaction(&fixture, config());

    let mut backwards = request(&fixture, at(day, 9, 0), "4567890");
    backwards.appointment.end_datetime = Some(at(day, 8, 0));
    fixture.store.set_offline(true);
    assert_matches!(
        booking.submit_appointment(backwards, BookingMode::Public, instant(MORNING)).await,
        Err(AppointmentError::InvalidInterval(_))
    );
    fixture.store.set_offline(false);

    let mut too_long = request(&fixture, at(day, 9, 0), "4567890");
    too_long.appointment.end_datetime = Some(at(day, 9, 45));
    assert_matches!(
        booking.submit_appointment(too_long, BookingMode::Public, instant(MORNING)).await,
        Err(AppointmentError::InvalidInterval(_))
    );
    assert_eq!(fixture.store.appointment_count().await, 0);
}

#[tokio::test]
async fn challenge_is_enforced_for_public_bookings_only() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();
    let mut with_captcha = config();
    with_captcha.captcha_enabled = true;
    let booking = transaction(&fixture, with_captcha.clone());

    let missing = booking
        .submit_appointment(request(&fixture, at(day, 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
        .await;
    assert_matches!(missing, Err(AppointmentError::ChallengeFailed));
    assert_eq!(fixture.store.appointment_count().await, 0);

    let challenge = ChallengeVerifier::new(with_captcha.booking_secret())
        .issue(instant(MORNING))
        .unwrap();
    let answer: u32 = challenge
        .question
        .split(" + ")
        .map(|term| term.parse::<u32>().unwrap())
        .sum();
    let mut answered = request(&fixture, at(day, 9, 0), "4567890");
    answered.captcha = Some(ChallengeResponse {
        token: challenge.token,
        answer: answer.to_string(),
    });
    booking
        .submit_appointment(answered, BookingMode::Public, instant(MORNING))
        .await
        .unwrap();

    booking
        .submit_appointment(request(&fixture, at(day, 11, 0), "4567890"), BookingMode::Staff, instant(MORNING))
        .await
        .unwrap();
    assert_eq!(fixture.store.appointment_count().await, 2);
}

#[tokio::test]
async fn reschedule_onto_own_interval_succeeds() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let customer = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(customer.clone()).await;
    let day = date(2025, 6, 3);
    let existing = fixture.book(customer.id, at(day, 10, 30), 20).await;

    let mut same_time = request(&fixture, at(day, 10, 30), "4567890");
    same_time.customer = None;
    same_time.booking_reference = Some(existing.hash.clone());
    let booking = transaction(&fixture, config());

    let booked = booking
        .submit_appointment(same_time, BookingMode::Public, instant(MORNING))
        .await
        .unwrap();
    assert!(booked.rescheduled);
    assert_eq!(booked.appointment.id, existing.id);
    assert_eq!(booked.appointment.book_datetime, existing.book_datetime);
    assert_eq!(booked.customer.id, customer.id);
    assert_eq!(fixture.store.appointment_count().await, 1);

    let mut moved = request(&fixture, at(day, 11, 0), "4567890");
    moved.booking_reference = Some(booked.booking_reference.clone());
    let moved = booking
        .submit_appointment(moved, BookingMode::Public, instant(MORNING))
        .await
        .unwrap();
    assert_eq!(moved.booking_reference, booked.booking_reference);
    let stored = fixture.store.get_appointment(existing.id).await.unwrap().unwrap();
    assert_eq!(stored.start_datetime, at(day, 11, 0));
    assert_eq!(fixture.store.appointment_count().await, 1);
}

#[tokio::test]
async fn rescheduling_a_missing_appointment_is_not_found() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let booking = transaction(&fixture, config());

    let mut ghost = request(&fixture, at(fixture_monday(), 9, 0), "4567890");
    ghost.booking_reference = Some("0".repeat(64));
    assert_matches!(
        booking.submit_appointment(ghost, BookingMode::Public, instant(MORNING)).await,
        Err(AppointmentError::AppointmentNotFound)
    );

    let mut ghost = request(&fixture, at(fixture_monday(), 9, 0), "4567890");
    ghost.exclude_appointment_id = Some(Uuid::new_v4());
    assert_matches!(
        booking.submit_appointment(ghost, BookingMode::Staff, instant(MORNING)).await,
        Err(AppointmentError::AppointmentNotFound)
    );
    assert_eq!(fixture.store.appointment_count().await, 0);
}

#[tokio::test]
async fn public_reschedule_needs_the_booking_reference() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let customer = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(customer.clone()).await;
    let day = fixture_monday();
    let existing = fixture.book(customer.id, at(day, 9, 0), 20).await;
    let booking = transaction(&fixture, config());

    let mut by_id = request(&fixture, at(day, 11, 0), "4567890");
    by_id.exclude_appointment_id = Some(existing.id);
    assert_matches!(
        booking.submit_appointment(by_id, BookingMode::Public, instant(MORNING)).await,
        Err(AppointmentError::Validation(_))
    );

    let other = fixture.book(customer.id, at(date(2025, 6, 3), 9, 0), 20).await;
    let mut mismatched = request(&fixture, at(day, 11, 0), "4567890");
    mismatched.booking_reference = Some(existing.hash.clone());
    mismatched.exclude_appointment_id = Some(other.id);
    assert_matches!(
        booking.submit_appointment(mismatched, BookingMode::Public, instant(MORNING)).await,
        Err(AppointmentError::AppointmentNotFound)
    );

    let stored = fixture.store.get_appointment(existing.id).await.unwrap().unwrap();
    assert_eq!(stored.start_datetime, at(day, 9, 0));
}

#[tokio::test]
async fn reschedule_for_another_patient_leaves_the_holder_untouched() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    fixture.register_patient("1111111", "Juan", "Mamani").await;
    let rosa = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(rosa.clone()).await;
    let day = fixture_monday();
    let existing = fixture.book(rosa.id, at(day, 9, 0), 20).await;
    let booking = transaction(&fixture, config());

    let mut hijack = request(&fixture, at(day, 11, 0), "1111111");
    hijack.booking_reference = Some(existing.hash.clone());
    assert_matches!(
        booking.submit_appointment(hijack, BookingMode::Public, instant(MORNING)).await,
        Err(AppointmentError::PatientMismatch)
    );

    let mut staff = request(&fixture, at(day, 11, 0), "1111111");
    staff.exclude_appointment_id = Some(existing.id);
    assert_matches!(
        booking.submit_appointment(staff, BookingMode::Staff, instant(MORNING)).await,
        Err(AppointmentError::PatientMismatch)
    );

    let holder = fixture.store.get_customers(&[rosa.id]).await.unwrap().remove(0);
    assert_eq!(holder.ci, "4567890");
    assert_eq!(holder.first_name, "Rosa");
    let stored = fixture.store.get_appointment(existing.id).await.unwrap().unwrap();
    assert_eq!(stored.start_datetime, at(day, 9, 0));
    assert_eq!(stored.customer_id, rosa.id);

    let mut own = request(&fixture, at(day, 11, 0), "4.567.890");
    own.booking_reference = Some(existing.hash.clone());
    let moved = booking
        .submit_appointment(own, BookingMode::Public, instant(MORNING))
        .await
        .unwrap();
    assert_eq!(moved.customer.id, rosa.id);
}

#[tokio::test]
async fn booking_reference_resolves_to_a_reservation_summary() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    let day = fixture_monday();
    let booking = transaction(&fixture, config());

    let booked = booking
        .submit_appointment(request(&fixture, at(day, 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
        .await
        .unwrap();

    let summary = booking
        .reservation_by_reference(&booked.booking_reference)
        .await
        .unwrap();
    assert_eq!(summary.start_datetime, at(day, 9, 0));
    assert_eq!(summary.service, "Consulta externa");
    assert_eq!(summary.provider, "Carla Rojas");

    assert_matches!(
        booking.reservation_by_reference("unknown").await,
        Err(AppointmentError::AppointmentNotFound)
    );
}

#[tokio::test]
async fn staff_books_walk_in_without_registry_record() {
    let fixture = ClinicFixture::new().await;
    let mut walk_in = request(&fixture, at(fixture_monday(), 9, 0), "9988776");
    walk_in.customer = Some(CustomerDraft {
        first_name: Some("Luis".to_string()),
        last_name: Some("Condori".to_string()),
        ..customer_draft("9988776")
    });

    let booked = transaction(&fixture, config())
        .submit_appointment(walk_in, BookingMode::Staff, instant(MORNING))
        .await
        .unwrap();
    assert_eq!(booked.customer.full_name(), "Luis Condori");
    assert_eq!(booked.customer.clinical_story, None);
}

#[tokio::test]
async fn storage_outage_propagates() {
    let fixture = ClinicFixture::new().await;
    fixture.register_patient("4567890", "Rosa", "Quispe").await;
    fixture.store.set_offline(true);

    assert_matches!(
        transaction(&fixture, config())
            .submit_appointment(request(&fixture, at(fixture_monday(), 9, 0), "4567890"), BookingMode::Public, instant(MORNING))
            .await,
        Err(AppointmentError::Storage(_))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_commit_exactly_once() {
    let fixture = ClinicFixture::new().await;
    let day = fixture_monday();
    let booking = Arc::new(transaction(&fixture, config()));

    let mut handles = Vec::new();
    for (index, ci) in ["1000001", "1000002", "1000003", "1000004"].into_iter().enumerate() {
        fixture.register_patient(ci, &format!("Paciente{}", index), "Prueba").await;
        let booking = booking.clone();
        let submission = request(&fixture, at(day, 9, 0), ci);
        handles.push(tokio::spawn(async move {
            booking
                .submit_appointment(submission, BookingMode::Public, instant(MORNING))
                .await
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let booked = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(booked, 1);
    for result in results.iter().filter(|result| result.is_err()) {
        assert_matches!(result, Err(AppointmentError::SlotNoLongerAvailable));
    }
    assert_eq!(fixture.store.appointment_count().await, 1);
}
