use chrono::Utc;
use uuid::Uuid;

use appointment_cell::ReportService;
use patient_cell::PatientIdentity;
use shared_models::scheduling::{Appointment, Provider, Service, Speciality, WeeklyPlan};
use shared_utils::test_utils::{at, fixture_monday, ClinicFixture};

async fn second_provider(fixture: &ClinicFixture) -> (Provider, Service) {
    let speciality = Speciality {
        id: Uuid::new_v4(),
        name: "Pediatría".to_string(),
    };
    let service = Service {
        id: Uuid::new_v4(),
        name: "Control niño sano".to_string(),
        speciality_id: Some(speciality.id),
        duration_minutes: 30,
    };
    let provider = Provider {
        id: Uuid::new_v4(),
        first_name: "Ana".to_string(),
        last_name: "Vargas".to_string(),
        timezone: "America/La_Paz".to_string(),
        services: vec![service.id],
        working_plan: WeeklyPlan::default(),
    };
    fixture.store.insert_speciality(speciality).await;
    fixture.store.insert_service(service.clone()).await;
    fixture.store.insert_provider(provider.clone()).await;
    (provider, service)
}

#[tokio::test]
async fn speciality_report_groups_by_speciality_and_provider() {
    let fixture = ClinicFixture::new().await;
    let day = fixture_monday();
    let rosa = fixture.customer("4567890", "Rosa", "Quispe");
    let luis = fixture.customer("9988776", "Luis", "Condori");
    fixture.store.insert_customer(rosa.clone()).await;
    fixture.store.insert_customer(luis.clone()).await;

    fixture.book(rosa.id, at(day, 11, 0), 20).await;
    let mut early = fixture.book(luis.id, at(day, 8, 0), 20).await;
    early.notes = Some("Hipertensión".to_string());
    early.municipality = Some("El Alto".to_string());
    fixture.store.insert_appointment(early).await;

    let (pediatrician, pediatrics) = second_provider(&fixture).await;
    fixture
        .store
        .insert_appointment(Appointment {
            id: Uuid::new_v4(),
            provider_id: pediatrician.id,
            service_id: pediatrics.id,
            customer_id: rosa.id,
            start_datetime: at(day, 9, 0),
            end_datetime: at(day, 9, 30),
            notes: None,
            book_datetime: Utc::now(),
            hash: "ped".to_string(),
            municipality: None,
            medical_center: Some("Centro de Salud Villa Dolores".to_string()),
        })
        .await;

    let reports = ReportService::new(fixture.store.clone());
    let all = reports.by_speciality(None, day).await.unwrap();
    let keys: Vec<_> = all.iter().map(|group| group.key.as_str()).collect();
    assert_eq!(keys, vec!["Cardiología - Rojas Carla", "Pediatría - Vargas Ana"]);

    let cardiology = &all[0];
    let names: Vec<_> = cardiology.patients.iter().map(|p| p.first_name.as_str()).collect();
    assert_eq!(names, vec!["Luis", "Rosa"]);
    assert_eq!(cardiology.patients[0].diagnostic, "Hipertensión");
    assert_eq!(cardiology.patients[0].municipality, "El Alto");
    assert_eq!(cardiology.patients[1].diagnostic, "");

    let only_cardiology = reports
        .by_speciality(Some(fixture.speciality.id), day)
        .await
        .unwrap();
    assert_eq!(only_cardiology.len(), 1);
    assert_eq!(only_cardiology[0].provider_last_name, "Rojas");

    let pediatrics_group = &all[1];
    assert_eq!(pediatrics_group.patients.len(), 1);
    assert_eq!(pediatrics_group.patients[0].medical_center, "Centro de Salud Villa Dolores");

    assert!(reports
        .by_speciality(None, day.succ_opt().unwrap())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn last_appointment_by_ci_picks_latest() {
    let fixture = ClinicFixture::new().await;
    let day = fixture_monday();
    let mut rosa = fixture.customer("4.567.890", "Rosa", "Quispe");
    rosa.clinical_story = Some("HC-4567890".to_string());
    fixture.store.insert_customer(rosa.clone()).await;

    fixture.book(rosa.id, at(day, 8, 0), 20).await;
    let mut latest = fixture.book(rosa.id, at(day.succ_opt().unwrap(), 9, 0), 20).await;
    latest.notes = Some("Arritmia".to_string());
    fixture.store.insert_appointment(latest.clone()).await;

    let identity = PatientIdentity::parse("4567890", None).unwrap();
    let found = ReportService::new(fixture.store.clone())
        .last_appointment_by_ci(&identity)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.start_datetime, latest.start_datetime);
    assert_eq!(found.customer.id, rosa.id);
    assert_eq!(found.service, "Consulta externa");
    assert_eq!(found.provider, "Carla Rojas");
    assert_eq!(found.clinical_story.as_deref(), Some("HC-4567890"));
    assert_eq!(found.diagnostic.as_deref(), Some("Arritmia"));
}

#[tokio::test]
async fn last_appointment_by_ci_without_history_is_none() {
    let fixture = ClinicFixture::new().await;
    let rosa = fixture.customer("4567890", "Rosa", "Quispe");
    fixture.store.insert_customer(rosa).await;

    let reports = ReportService::new(fixture.store.clone());
    let known = PatientIdentity::parse("4567890", None).unwrap();
    let unknown = PatientIdentity::parse("111", None).unwrap();

    assert!(reports.last_appointment_by_ci(&known).await.unwrap().is_none());
    assert!(reports.last_appointment_by_ci(&unknown).await.unwrap().is_none());
}
