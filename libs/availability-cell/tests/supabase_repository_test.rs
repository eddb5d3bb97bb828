use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::{
    AvailabilityError, AvailabilityRepository, AvailabilityTemplate, DayOfWeek,
    SupabaseAvailabilityRepository, TimeRange,
};
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn repository(server: &MockServer) -> SupabaseAvailabilityRepository {
    let config = TestConfig::with_supabase_url(server.uri()).to_supabase_config();
    SupabaseAvailabilityRepository::new(Arc::new(SupabaseClient::new(&config)))
}

fn template(doctor_id: Uuid) -> AvailabilityTemplate {
    AvailabilityTemplate {
        id: Uuid::new_v4(),
        doctor_id,
        day_of_week: DayOfWeek::Monday,
        time_ranges: vec![TimeRange {
            start_time: "08:00".parse().unwrap(),
            end_time: "13:00".parse().unwrap(),
        }],
        slot_duration_minutes: 30,
        is_active: true,
        effective_from: None,
        effective_until: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn find_active_queries_by_doctor_and_day() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let template_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("day_of_week", "eq.monday"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::template_response(&template_id.to_string(), &doctor_id.to_string(), "monday")
        ])))
        .mount(&server)
        .await;

    let found = repository(&server)
        .find_active(doctor_id, DayOfWeek::Monday)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.id, template_id);
    assert_eq!(found.time_ranges[0].end_time.to_string(), "13:00");
}

#[tokio::test]
async fn unique_index_violation_maps_to_duplicate_template() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_templates"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation_response("availability_templates_active_day_key"),
        ))
        .mount(&server)
        .await;

    let result = repository(&server).insert(template(Uuid::new_v4())).await;
    assert_matches!(result, Err(AvailabilityError::DuplicateTemplate(DayOfWeek::Monday)));
}

#[tokio::test]
async fn list_is_sorted_by_weekday() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::template_response(&Uuid::new_v4().to_string(), &doctor_id, "friday"),
            MockSupabaseResponses::template_response(&Uuid::new_v4().to_string(), &doctor_id, "tuesday"),
        ])))
        .mount(&server)
        .await;

    let days: Vec<_> = repository(&server)
        .list_active_by_doctor(doctor_id.parse().unwrap())
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.day_of_week)
        .collect();
    assert_eq!(days, vec![DayOfWeek::Tuesday, DayOfWeek::Friday]);
}

#[tokio::test]
async fn delete_reports_missing_rows() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(!repository(&server).delete(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn save_of_missing_row_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = repository(&server).save(template(Uuid::new_v4())).await;
    assert_matches!(result, Err(AvailabilityError::NotFound));
}
