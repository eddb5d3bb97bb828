use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use availability_cell::ClockTime;
use shared_database::supabase::{DatabaseError, SupabaseClient};

use crate::error::RepositoryError;
use crate::models::{Appointment, AppointmentSearchQuery, AppointmentStatus, SlotHolder, SlotKey};
use crate::repository::AppointmentRepository;

const TABLE: &str = "/rest/v1/appointments";
const PATIENT_SLOT_INDEX: &str = "appointments_patient_slot_key";

/// PostgREST-backed appointments. Uniqueness is enforced by the
/// `appointments_doctor_slot_key` and `appointments_patient_slot_key`
/// partial indexes; violations come back as SQLSTATE 23505.
pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

#[derive(Deserialize)]
struct StartTimeRow {
    start_time: ClockTime,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch<T>(&self, query: &str) -> Result<Vec<T>, RepositoryError>
    where
        T: serde::de::DeserializeOwned,
    {
        let path = format!("{}?{}", TABLE, query);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(RepositoryError::from))
            .collect()
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        appointment: &Appointment,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let body = serde_json::to_value(appointment)?;
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                method,
                path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(|e| map_write_error(e, appointment))?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(RepositoryError::from)
    }
}

fn map_write_error(err: DatabaseError, appointment: &Appointment) -> RepositoryError {
    if !err.is_unique_violation() {
        return RepositoryError::from(err);
    }
    let holder = match err.violated_constraint().as_deref() {
        Some(PATIENT_SLOT_INDEX) => SlotHolder::Patient,
        _ => SlotHolder::Doctor,
    };
    warn!("Unique index rejected appointment {}: {}", appointment.id, err);
    RepositoryError::UniqueViolation(appointment.slot_key(holder))
}

fn slot_filter(doctor_id: Uuid, date: NaiveDate, exclude: Option<Uuid>) -> String {
    let mut query = format!("doctor_id=eq.{}&date=eq.{}&status=neq.cancelled", doctor_id, date);
    if let Some(id) = exclude {
        query.push_str(&format!("&id=neq.{}", id));
    }
    query
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.fetch(&format!("id=eq.{}", id)).await?.into_iter().next())
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, RepositoryError> {
        let mut filters = Vec::new();
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.date_from {
            filters.push(format!("date=gte.{}", from));
        }
        if let Some(to) = query.date_to {
            filters.push(format!("date=lte.{}", to));
        }
        filters.push("order=date.asc,start_time.asc".to_string());

        self.fetch(&filters.join("&")).await
    }

    async fn find_slot_holder(
        &self,
        key: &SlotKey,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let column = match key.holder {
            SlotHolder::Doctor => "doctor_id",
            SlotHolder::Patient => "patient_id",
        };
        let mut query = format!(
            "{}=eq.{}&date=eq.{}&start_time=eq.{}&status=neq.cancelled&limit=1",
            column,
            key.holder_id,
            key.date,
            urlencoding::encode(&key.start_time.to_string())
        );
        if let Some(id) = exclude {
            query.push_str(&format!("&id=neq.{}", id));
        }
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    async fn booked_start_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ClockTime>, RepositoryError> {
        let query = format!("select=start_time&{}", slot_filter(doctor_id, date, exclude));
        let rows: Vec<StartTimeRow> = self.fetch(&query).await?;
        let mut times: Vec<_> = rows.into_iter().map(|row| row.start_time).collect();
        times.sort();
        Ok(times)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        debug!("Inserting appointment {} for doctor {}", appointment.id, appointment.doctor_id);
        self.write(Method::POST, TABLE, &appointment)
            .await?
            .ok_or_else(|| RepositoryError::Backend("insert returned no rows".to_string()))
    }

    /// The status filter turns the PATCH into a compare-and-set, so a writer
    /// on another node holding a stale read matches no rows.
    async fn update(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, RepositoryError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", TABLE, appointment.id, expected);
        if let Some(stored) = self.write(Method::PATCH, &path, &appointment).await? {
            return Ok(stored);
        }

        match self.find_by_id(appointment.id).await? {
            Some(current) => {
                warn!(
                    "Appointment {} moved from {} to {} before the write",
                    appointment.id, expected, current.status
                );
                Err(RepositoryError::StatusChanged(current.status))
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
