use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{AvailabilityError, AvailabilityTemplate, DayOfWeek};
use crate::repository::AvailabilityRepository;

#[derive(Default)]
pub struct InMemoryAvailabilityRepository {
    templates: RwLock<HashMap<Uuid, AvailabilityTemplate>>,
}

impl InMemoryAvailabilityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn active_conflict<'a>(
    templates: &'a HashMap<Uuid, AvailabilityTemplate>,
    candidate: &AvailabilityTemplate,
) -> Option<&'a AvailabilityTemplate> {
    if !candidate.is_active {
        return None;
    }
    templates.values().find(|t| {
        t.id != candidate.id
            && t.is_active
            && t.doctor_id == candidate.doctor_id
            && t.day_of_week == candidate.day_of_week
    })
}

#[async_trait]
impl AvailabilityRepository for InMemoryAvailabilityRepository {
    async fn insert(&self, template: AvailabilityTemplate) -> Result<AvailabilityTemplate, AvailabilityError> {
        let mut templates = self.templates.write().await;
        if active_conflict(&templates, &template).is_some() {
            return Err(AvailabilityError::DuplicateTemplate(template.day_of_week));
        }
        templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AvailabilityTemplate>, AvailabilityError> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn find_active(
        &self,
        doctor_id: Uuid,
        day_of_week: DayOfWeek,
    ) -> Result<Option<AvailabilityTemplate>, AvailabilityError> {
        Ok(self
            .templates
            .read()
            .await
            .values()
            .find(|t| t.is_active && t.doctor_id == doctor_id && t.day_of_week == day_of_week)
            .cloned())
    }

    async fn list_active_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityTemplate>, AvailabilityError> {
        let mut found: Vec<_> = self
            .templates
            .read()
            .await
            .values()
            .filter(|t| t.is_active && t.doctor_id == doctor_id)
            .cloned()
            .collect();
        found.sort_by_key(|t| t.day_of_week);
        Ok(found)
    }

    async fn save(&self, template: AvailabilityTemplate) -> Result<AvailabilityTemplate, AvailabilityError> {
        let mut templates = self.templates.write().await;
        if !templates.contains_key(&template.id) {
            return Err(AvailabilityError::NotFound);
        }
        if active_conflict(&templates, &template).is_some() {
            return Err(AvailabilityError::DuplicateTemplate(template.day_of_week));
        }
        templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AvailabilityError> {
        Ok(self.templates.write().await.remove(&id).is_some())
    }
}
