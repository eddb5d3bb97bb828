use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use availability_cell::validation::parse_clock_time;
use availability_cell::{
    AvailabilityRepository, AvailabilityService, AvailabilityTemplate, ClockTime,
    CreateAvailabilityRequest, InMemoryAvailabilityRepository, SlotGenerator,
    SupabaseAvailabilityRepository, UpdateAvailabilityRequest,
};
use shared_config::{AppConfig, StorageBackend};
use shared_database::supabase::SupabaseClient;
use shared_models::auth::ActorRole;

use crate::error::SchedulingError;
use crate::models::{
    Appointment, AppointmentEvent, AppointmentEventKind, AppointmentSearchQuery,
    AppointmentStatus, BookAppointmentRequest, SchedulingRules, UpdateAppointmentRequest,
};
use crate::repository::{
    AppointmentBookings, AppointmentRepository, InMemoryAppointmentRepository,
    SupabaseAppointmentRepository,
};
use crate::services::clock::{Clock, SystemClock};
use crate::services::conflict::BookingConflictGuard;
use crate::services::lifecycle::AppointmentLifecycle;

const EVENT_BUFFER: usize = 256;

/// Public entry point to scheduling. Callers resolve identity and
/// permissions; this layer enforces calendar integrity, the cancellation
/// notice window and valid status transitions.
pub struct SchedulingService {
    availability: Arc<AvailabilityService>,
    slots: Arc<SlotGenerator>,
    guard: Arc<BookingConflictGuard>,
    lifecycle: AppointmentLifecycle,
    appointments: Arc<dyn AppointmentRepository>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<AppointmentEvent>,
}

impl SchedulingService {
    pub fn new(
        templates: Arc<dyn AvailabilityRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        clock: Arc<dyn Clock>,
        rules: SchedulingRules,
    ) -> Self {
        let bookings = Arc::new(AppointmentBookings::new(Arc::clone(&appointments)));
        let slots = Arc::new(SlotGenerator::new(Arc::clone(&templates), bookings));
        let guard = Arc::new(BookingConflictGuard::new(
            Arc::clone(&appointments),
            Arc::clone(&slots),
            rules.reserve_retry_attempts,
        ));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let lifecycle = AppointmentLifecycle::new(
            Arc::clone(&appointments),
            Arc::clone(&guard),
            Arc::clone(&clock),
            rules,
            events.clone(),
        );

        Self {
            availability: Arc::new(AvailabilityService::new(templates)),
            slots,
            guard,
            lifecycle,
            appointments,
            clock,
            events,
        }
    }

    pub fn in_memory(rules: SchedulingRules) -> Self {
        Self::in_memory_with_clock(rules, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(rules: SchedulingRules, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(InMemoryAvailabilityRepository::new()),
            Arc::new(InMemoryAppointmentRepository::new()),
            clock,
            rules,
        )
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let rules = SchedulingRules::from_config(config);
        match config.storage_backend {
            StorageBackend::Supabase => {
                info!("Using Supabase storage at {}", config.supabase_url);
                let supabase = Arc::new(SupabaseClient::new(config));
                Self::new(
                    Arc::new(SupabaseAvailabilityRepository::new(Arc::clone(&supabase))),
                    Arc::new(SupabaseAppointmentRepository::new(supabase)),
                    Arc::new(SystemClock),
                    rules,
                )
            }
            StorageBackend::Memory => {
                info!("Using in-memory scheduling storage");
                Self::in_memory(rules)
            }
        }
    }

    pub fn availability_service(&self) -> Arc<AvailabilityService> {
        Arc::clone(&self.availability)
    }

    pub fn slot_generator(&self) -> Arc<SlotGenerator> {
        Arc::clone(&self.slots)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppointmentEvent> {
        self.events.subscribe()
    }

    // ==============================================================================
    // AVAILABILITY
    // ==============================================================================

    pub async fn create_availability_template(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilityTemplate, SchedulingError> {
        Ok(self.availability.create_template(doctor_id, request).await?)
    }

    pub async fn list_availability(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityTemplate>, SchedulingError> {
        Ok(self.availability.list_by_doctor(doctor_id).await?)
    }

    pub async fn update_availability_template(
        &self,
        template_id: Uuid,
        request: UpdateAvailabilityRequest,
    ) -> Result<AvailabilityTemplate, SchedulingError> {
        Ok(self.availability.update_template(template_id, request).await?)
    }

    pub async fn delete_availability_template(&self, template_id: Uuid) -> Result<(), SchedulingError> {
        Ok(self.availability.remove_template(template_id).await?)
    }

    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<ClockTime>, SchedulingError> {
        Ok(self.slots.compute_available_slots(doctor_id, date).await?)
    }

    // ==============================================================================
    // APPOINTMENTS
    // ==============================================================================

    pub async fn create_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        debug!(
            "Booking request: patient {} with doctor {} on {} at {}",
            patient_id, request.doctor_id, request.date, request.start_time
        );

        let start_time = parse_clock_time("start_time", &request.start_time)?;
        if request.date < self.clock.today() {
            return Err(SchedulingError::Validation(
                "Cannot book appointments in the past".to_string(),
            ));
        }

        let now = Utc::now();
        let draft = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: request.doctor_id,
            date: request.date,
            start_time,
            end_time: start_time,
            status: AppointmentStatus::Pending,
            appointment_type: request.appointment_type,
            reason: request.reason,
            notes: None,
            cancel_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            confirmed_by: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };

        let appointment = self.guard.reserve(draft).await?;
        if self
            .events
            .send(AppointmentEvent::new(AppointmentEventKind::Booked, &appointment))
            .is_err()
        {
            debug!("No subscribers for booking event on {}", appointment.id);
        }
        Ok(appointment)
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        self.appointments.find_by_id(id).await?.ok_or(SchedulingError::NotFound)
    }

    pub async fn list_appointments(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, SchedulingError> {
        Ok(self.appointments.search(query).await?)
    }

    /// Pending or confirmed appointments that have not started yet, soonest first.
    pub async fn get_upcoming(&self, patient_id: Uuid) -> Result<Vec<Appointment>, SchedulingError> {
        let now = self.clock.now();
        let query = AppointmentSearchQuery {
            patient_id: Some(patient_id),
            date_from: Some(now.date()),
            ..Default::default()
        };

        let mut upcoming: Vec<_> = self
            .appointments
            .search(&query)
            .await?
            .into_iter()
            .filter(|a| {
                matches!(a.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
                    && a.scheduled_start() >= now
            })
            .collect();
        upcoming.sort_by_key(|a| a.scheduled_start());
        Ok(upcoming)
    }

    /// Appointments in a terminal status, most recent first.
    pub async fn get_past(&self, patient_id: Uuid) -> Result<Vec<Appointment>, SchedulingError> {
        let query = AppointmentSearchQuery {
            patient_id: Some(patient_id),
            ..Default::default()
        };

        let mut past: Vec<_> = self
            .appointments
            .search(&query)
            .await?
            .into_iter()
            .filter(|a| a.status.is_terminal())
            .collect();
        past.sort_by_key(|a| std::cmp::Reverse(a.scheduled_start()));
        Ok(past)
    }

    pub async fn confirm_appointment(
        &self,
        id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        self.lifecycle.confirm(id, actor_id, notes).await
    }

    pub async fn complete_appointment(&self, id: Uuid, notes: Option<String>) -> Result<Appointment, SchedulingError> {
        self.lifecycle.complete(id, notes).await
    }

    pub async fn cancel_appointment(
        &self,
        id: Uuid,
        actor_id: Uuid,
        actor_role: ActorRole,
        reason: String,
    ) -> Result<Appointment, SchedulingError> {
        self.lifecycle.cancel(id, actor_id, actor_role, reason).await
    }

    pub async fn reschedule_appointment(
        &self,
        id: Uuid,
        new_date: Option<NaiveDate>,
        new_start_time: Option<&str>,
    ) -> Result<Appointment, SchedulingError> {
        let new_start_time = new_start_time
            .map(|raw| parse_clock_time("start_time", raw))
            .transpose()?;
        self.lifecycle.reschedule(id, new_date, new_start_time).await
    }

    pub async fn update_appointment(
        &self,
        id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        self.lifecycle.update_details(id, request).await
    }
}
