use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDateTime;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::{
    AppointmentRepository, AppointmentStatus, BookAppointmentRequest, FixedClock, RepositoryError,
    SchedulingError, SchedulingRules, SchedulingService, SlotHolder, SupabaseAppointmentRepository,
};
use availability_cell::SupabaseAvailabilityRepository;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn client(server: &MockServer) -> Arc<SupabaseClient> {
    let config = TestConfig::with_supabase_url(server.uri()).to_supabase_config();
    Arc::new(SupabaseClient::new(&config))
}

fn service(server: &MockServer) -> SchedulingService {
    let supabase = client(server);
    let now = NaiveDateTime::parse_from_str("2030-01-01 08:00", "%Y-%m-%d %H:%M").unwrap();
    SchedulingService::new(
        Arc::new(SupabaseAvailabilityRepository::new(Arc::clone(&supabase))),
        Arc::new(SupabaseAppointmentRepository::new(supabase)),
        Arc::new(FixedClock::new(now)),
        SchedulingRules::default(),
    )
}

/// Monday template and no existing bookings.
async fn mount_open_monday(server: &MockServer, doctor_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::template_response(&Uuid::new_v4().to_string(), &doctor_id.to_string(), "monday")
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

fn booking(doctor_id: Uuid) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id,
        date: "2030-01-07".parse().unwrap(),
        start_time: "09:00".to_string(),
        appointment_type: Default::default(),
        reason: Some("Check-up".to_string()),
    }
}

#[tokio::test]
async fn booked_start_times_read_postgres_time_columns() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("date", "eq.2030-01-07"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "start_time": "10:30:00" },
            { "start_time": "09:00:00" }
        ])))
        .mount(&server)
        .await;

    let times = SupabaseAppointmentRepository::new(client(&server))
        .booked_start_times(doctor_id, "2030-01-07".parse().unwrap(), None)
        .await
        .unwrap();

    let rendered: Vec<_> = times.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["09:00", "10:30"]);
}

#[tokio::test]
async fn booking_through_supabase_returns_the_stored_row() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    mount_open_monday(&server, doctor_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-01-07",
                "09:00",
                "09:30",
                "pending",
            )
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = service(&server)
        .create_appointment(patient_id, booking(doctor_id))
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.end_time.to_string(), "09:30");
}

#[tokio::test]
async fn patient_index_violation_becomes_patient_conflict() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    mount_open_monday(&server, doctor_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation_response("appointments_patient_slot_key"),
        ))
        .expect(2)
        .mount(&server)
        .await;

    let result = service(&server).create_appointment(Uuid::new_v4(), booking(doctor_id)).await;

    assert_matches!(result, Err(SchedulingError::PatientConflict { .. }));
}

#[tokio::test]
async fn doctor_index_violation_becomes_slot_unavailable() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    mount_open_monday(&server, doctor_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation_response("appointments_doctor_slot_key"),
        ))
        .mount(&server)
        .await;

    let result = service(&server).create_appointment(Uuid::new_v4(), booking(doctor_id)).await;

    assert_matches!(result, Err(SchedulingError::SlotUnavailable { .. }));
}

#[tokio::test]
async fn repository_reports_the_violated_cell() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation_response("appointments_patient_slot_key"),
        ))
        .mount(&server)
        .await;

    let row = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(),
        &patient_id.to_string(),
        &doctor_id.to_string(),
        "2030-01-07",
        "09:00",
        "09:30",
        "pending",
    );
    let appointment = serde_json::from_value(row).unwrap();

    let err = SupabaseAppointmentRepository::new(client(&server))
        .insert(appointment)
        .await
        .unwrap_err();

    assert_matches!(err, RepositoryError::UniqueViolation(key) => {
        assert_eq!(key.holder, SlotHolder::Patient);
        assert_eq!(key.holder_id, patient_id);
    });
}

#[tokio::test]
async fn server_errors_surface_as_storage_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = service(&server).get_appointment(Uuid::new_v4()).await;

    assert_matches!(result, Err(SchedulingError::Storage(_)));
}

fn stored_row(id: Uuid, patient_id: Uuid, doctor_id: Uuid, status: &str) -> serde_json::Value {
    MockSupabaseResponses::appointment_response(
        &id.to_string(),
        &patient_id.to_string(),
        &doctor_id.to_string(),
        "2030-01-07",
        "09:00",
        "09:30",
        status,
    )
}

#[tokio::test]
async fn lifecycle_writes_are_conditional_on_the_loaded_status() {
    let server = MockServer::start().await;
    let (id, patient_id, doctor_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stored_row(id, patient_id, doctor_id, "pending")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stored_row(id, patient_id, doctor_id, "confirmed")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let confirmed = service(&server)
        .confirm_appointment(id, doctor_id, None)
        .await
        .unwrap();

    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn write_from_a_stale_read_is_an_invalid_transition() {
    let server = MockServer::start().await;
    let (id, patient_id, doctor_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    // First read sees the row pending; another node cancels it before the write.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stored_row(id, patient_id, doctor_id, "pending")
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stored_row(id, patient_id, doctor_id, "cancelled")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let result = service(&server).confirm_appointment(id, doctor_id, None).await;

    assert_matches!(
        result,
        Err(SchedulingError::InvalidTransition { status: AppointmentStatus::Cancelled, action: "confirm" })
    );
}
