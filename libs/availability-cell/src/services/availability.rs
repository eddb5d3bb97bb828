use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilityError, AvailabilityTemplate, CreateAvailabilityRequest, UpdateAvailabilityRequest,
    DEFAULT_SLOT_DURATION_MINUTES,
};
use crate::repository::AvailabilityRepository;
use crate::validation::{
    parse_day_of_week, validate_slot_duration, validate_time_ranges, validate_validity_window,
};

/// Owns doctors' weekly availability templates.
pub struct AvailabilityService {
    repository: Arc<dyn AvailabilityRepository>,
}

impl AvailabilityService {
    pub fn new(repository: Arc<dyn AvailabilityRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> Arc<dyn AvailabilityRepository> {
        Arc::clone(&self.repository)
    }

    /// Create a weekly template for a doctor
    pub async fn create_template(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilityTemplate, AvailabilityError> {
        debug!("Creating availability for doctor {} on {}", doctor_id, request.day_of_week);

        let day_of_week = parse_day_of_week(&request.day_of_week)?;
        let time_ranges = validate_time_ranges(&request.time_ranges)?;
        let slot_duration_minutes = validate_slot_duration(
            request.slot_duration_minutes.unwrap_or(DEFAULT_SLOT_DURATION_MINUTES),
        )?;
        validate_validity_window(request.effective_from, request.effective_until)?;

        if self.repository.find_active(doctor_id, day_of_week).await?.is_some() {
            warn!("Doctor {} already has an active template for {}", doctor_id, day_of_week);
            return Err(AvailabilityError::DuplicateTemplate(day_of_week));
        }

        let now = Utc::now();
        let template = AvailabilityTemplate {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week,
            time_ranges,
            slot_duration_minutes,
            is_active: true,
            effective_from: request.effective_from,
            effective_until: request.effective_until,
            created_at: now,
            updated_at: now,
        };

        let created = self.repository.insert(template).await?;
        info!("Availability template {} created for doctor {}", created.id, doctor_id);
        Ok(created)
    }

    /// Apply a partial update. Supplied fields are validated like on create.
    pub async fn update_template(
        &self,
        template_id: Uuid,
        request: UpdateAvailabilityRequest,
    ) -> Result<AvailabilityTemplate, AvailabilityError> {
        debug!("Updating availability template {}", template_id);

        let current = self.get_template(template_id).await?;
        let mut updated = current.clone();

        if let Some(day) = request.day_of_week.as_deref() {
            updated.day_of_week = parse_day_of_week(day)?;
        }
        if let Some(ranges) = request.time_ranges.as_deref() {
            updated.time_ranges = validate_time_ranges(ranges)?;
        }
        if let Some(duration) = request.slot_duration_minutes {
            updated.slot_duration_minutes = validate_slot_duration(duration)?;
        }
        if let Some(is_active) = request.is_active {
            updated.is_active = is_active;
        }
        if request.effective_from.is_some() {
            updated.effective_from = request.effective_from;
        }
        if request.effective_until.is_some() {
            updated.effective_until = request.effective_until;
        }
        validate_validity_window(updated.effective_from, updated.effective_until)?;

        let claims_new_day = updated.is_active
            && (!current.is_active || current.day_of_week != updated.day_of_week);
        if claims_new_day {
            let existing = self
                .repository
                .find_active(updated.doctor_id, updated.day_of_week)
                .await?;
            if existing.is_some_and(|t| t.id != updated.id) {
                return Err(AvailabilityError::DuplicateTemplate(updated.day_of_week));
            }
        }

        updated.updated_at = Utc::now();
        self.repository.save(updated).await
    }

    pub async fn remove_template(&self, template_id: Uuid) -> Result<(), AvailabilityError> {
        if !self.repository.delete(template_id).await? {
            return Err(AvailabilityError::NotFound);
        }
        info!("Availability template {} deleted", template_id);
        Ok(())
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<AvailabilityTemplate, AvailabilityError> {
        self.repository
            .find_by_id(template_id)
            .await?
            .ok_or(AvailabilityError::NotFound)
    }

    /// Active templates, Monday first.
    pub async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityTemplate>, AvailabilityError> {
        let mut templates = self.repository.list_active_by_doctor(doctor_id).await?;
        templates.sort_by_key(|t| t.day_of_week);
        Ok(templates)
    }
}
