use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::{
    BookAppointmentRequest, FixedClock, SchedulingError, SchedulingRules, SchedulingService,
};
use availability_cell::{CreateAvailabilityRequest, TimeRangeInput};

const CONTENDERS: usize = 16;

fn service() -> Arc<SchedulingService> {
    let now = NaiveDateTime::parse_from_str("2030-01-01 08:00", "%Y-%m-%d %H:%M").unwrap();
    Arc::new(SchedulingService::in_memory_with_clock(
        SchedulingRules::default(),
        Arc::new(FixedClock::new(now)),
    ))
}

async fn monday_doctor(service: &SchedulingService) -> Uuid {
    let doctor_id = Uuid::new_v4();
    service
        .create_availability_template(
            doctor_id,
            CreateAvailabilityRequest {
                day_of_week: "monday".to_string(),
                time_ranges: vec![TimeRangeInput::new("08:00", "13:00")],
                slot_duration_minutes: Some(30),
                effective_from: None,
                effective_until: None,
            },
        )
        .await
        .unwrap();
    doctor_id
}

fn booking(doctor_id: Uuid) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id,
        date: "2030-01-07".parse().unwrap(),
        start_time: "09:00".to_string(),
        appointment_type: Default::default(),
        reason: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_of_many_patients_gets_a_contested_slot() {
    let service = service();
    let doctor_id = monday_doctor(&service).await;

    let attempts = (0..CONTENDERS).map(|_| {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.create_appointment(Uuid::new_v4(), booking(doctor_id)).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|err| matches!(
        err,
        SchedulingError::SlotUnavailable { .. } | SchedulingError::DoctorConflict { .. }
    )));

    let slots = service
        .get_available_slots(doctor_id, "2030-01-07".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(slots.len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_patient_racing_across_doctors_keeps_a_single_booking() {
    let service = service();
    let patient_id = Uuid::new_v4();
    let mut doctors = Vec::new();
    for _ in 0..CONTENDERS {
        doctors.push(monday_doctor(&service).await);
    }

    let attempts = doctors.iter().map(|&doctor_id| {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.create_appointment(patient_id, booking(doctor_id)).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, SchedulingError::PatientConflict { .. })));
}
