use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use availability_cell::ClockTime;

use crate::error::RepositoryError;
use crate::models::{Appointment, AppointmentSearchQuery, AppointmentStatus, SlotHolder, SlotKey};
use crate::repository::AppointmentRepository;

/// Appointments held in process. Both uniqueness checks and the write happen
/// under one write lock, so concurrent inserts cannot interleave.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn taken_cell(appointments: &HashMap<Uuid, Appointment>, candidate: &Appointment) -> Option<SlotKey> {
    if !candidate.status.holds_slot() {
        return None;
    }
    [SlotHolder::Doctor, SlotHolder::Patient]
        .into_iter()
        .map(|holder| candidate.slot_key(holder))
        .find(|key| {
            appointments
                .values()
                .any(|existing| existing.id != candidate.id && key.matches(existing))
        })
}

fn sorted(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|a| (a.date, a.start_time, a.created_at));
    appointments
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, RepositoryError> {
        let found = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        Ok(sorted(found))
    }

    async fn find_slot_holder(
        &self,
        key: &SlotKey,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self
            .appointments
            .read()
            .await
            .values()
            .find(|a| Some(a.id) != exclude && key.matches(a))
            .cloned())
    }

    async fn booked_start_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ClockTime>, RepositoryError> {
        let mut times: Vec<_> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| {
                a.doctor_id == doctor_id
                    && a.date == date
                    && a.status.holds_slot()
                    && Some(a.id) != exclude
            })
            .map(|a| a.start_time)
            .collect();
        times.sort();
        Ok(times)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        if let Some(key) = taken_cell(&appointments, &appointment) {
            return Err(RepositoryError::UniqueViolation(key));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, RepositoryError> {
        let mut appointments = self.appointments.write().await;
        match appointments.get(&appointment.id) {
            None => return Err(RepositoryError::NotFound),
            Some(stored) if stored.status != expected => {
                return Err(RepositoryError::StatusChanged(stored.status))
            }
            Some(_) => {}
        }
        if let Some(key) = taken_cell(&appointments, &appointment) {
            return Err(RepositoryError::UniqueViolation(key));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }
}
