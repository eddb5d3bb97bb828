use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{DatabaseError, SupabaseClient};

use crate::models::{AvailabilityError, AvailabilityTemplate, DayOfWeek};
use crate::repository::AvailabilityRepository;

const TABLE: &str = "/rest/v1/availability_templates";

/// PostgREST-backed templates. The `availability_templates_active_day_key`
/// partial index enforces one active template per doctor and day.
pub struct SupabaseAvailabilityRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAvailabilityRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, query: &str) -> Result<Vec<AvailabilityTemplate>, AvailabilityError> {
        let path = format!("{}?{}", TABLE, query);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AvailabilityError::from))
            .collect()
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        template: &AvailabilityTemplate,
    ) -> Result<Option<AvailabilityTemplate>, AvailabilityError> {
        let body = serde_json::to_value(template)?;
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
            .map_err(|e| map_write_error(e, template.day_of_week))?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(AvailabilityError::from)
    }
}

fn map_write_error(err: DatabaseError, day_of_week: DayOfWeek) -> AvailabilityError {
    if err.is_unique_violation() {
        AvailabilityError::DuplicateTemplate(day_of_week)
    } else {
        AvailabilityError::from(err)
    }
}

#[async_trait]
impl AvailabilityRepository for SupabaseAvailabilityRepository {
    async fn insert(&self, template: AvailabilityTemplate) -> Result<AvailabilityTemplate, AvailabilityError> {
        debug!("Inserting availability template {} for doctor {}", template.id, template.doctor_id);
        self.write(Method::POST, TABLE, &template)
            .await?
            .ok_or_else(|| AvailabilityError::Storage("insert returned no rows".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AvailabilityTemplate>, AvailabilityError> {
        Ok(self.fetch(&format!("id=eq.{}", id)).await?.into_iter().next())
    }

    async fn find_active(
        &self,
        doctor_id: Uuid,
        day_of_week: DayOfWeek,
    ) -> Result<Option<AvailabilityTemplate>, AvailabilityError> {
        let query = format!(
            "doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&limit=1",
            doctor_id, day_of_week
        );
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    async fn list_active_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityTemplate>, AvailabilityError> {
        let mut templates = self
            .fetch(&format!("doctor_id=eq.{}&is_active=eq.true", doctor_id))
            .await?;
        // day_of_week is stored as text, so order here.
        templates.sort_by_key(|t| t.day_of_week);
        Ok(templates)
    }

    async fn save(&self, template: AvailabilityTemplate) -> Result<AvailabilityTemplate, AvailabilityError> {
        let path = format!("{}?id=eq.{}", TABLE, template.id);
        self.write(Method::PATCH, &path, &template)
            .await?
            .ok_or(AvailabilityError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AvailabilityError> {
        let path = format!("{}?id=eq.{}", TABLE, id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                None,
                Some(SupabaseClient::return_representation()),
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
