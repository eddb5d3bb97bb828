use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::models::{AvailabilityError, ClockTime, DayOfWeek, DaySchedule, TimeRange};
use crate::repository::AvailabilityRepository;

/// Start times already taken for a doctor on a date.
///
/// Only appointments that are not cancelled count. `exclude` removes one
/// appointment from the answer so it does not block its own reschedule.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookedSlotSource: Send + Sync {
    async fn booked_start_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ClockTime>, AvailabilityError>;
}

/// Source with nothing booked, for calendars that take no appointments.
pub struct NoBookedSlots;

#[async_trait]
impl BookedSlotSource for NoBookedSlots {
    async fn booked_start_times(
        &self,
        _doctor_id: Uuid,
        _date: NaiveDate,
        _exclude: Option<Uuid>,
    ) -> Result<Vec<ClockTime>, AvailabilityError> {
        Ok(Vec::new())
    }
}

/// Every start time at which a full slot fits inside one of `ranges`.
/// A trailing partial interval is discarded.
pub fn generate_time_slots(ranges: &[TimeRange], slot_duration_minutes: u32) -> Vec<ClockTime> {
    if slot_duration_minutes == 0 {
        return Vec::new();
    }

    let mut slots = Vec::new();
    for range in ranges {
        let end = range.end_time.minutes_since_midnight();
        let mut current = range.start_time.minutes_since_midnight();
        while current + slot_duration_minutes <= end {
            if let Some(slot) = ClockTime::from_hm(current / 60, current % 60) {
                slots.push(slot);
            }
            current += slot_duration_minutes;
        }
    }

    slots.sort();
    slots.dedup();
    slots
}

/// Derives bookable slots from the matching template and current bookings.
pub struct SlotGenerator {
    templates: Arc<dyn AvailabilityRepository>,
    bookings: Arc<dyn BookedSlotSource>,
}

impl SlotGenerator {
    pub fn new(templates: Arc<dyn AvailabilityRepository>, bookings: Arc<dyn BookedSlotSource>) -> Self {
        Self { templates, bookings }
    }

    /// The template in force for `date` together with its open slots.
    /// `None` when the doctor has no active template covering that date.
    pub async fn day_schedule(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Option<DaySchedule>, AvailabilityError> {
        let day_of_week = DayOfWeek::from_date(date);

        let template = match self.templates.find_active(doctor_id, day_of_week).await? {
            Some(template) if template.covers(date) => template,
            Some(_) => {
                debug!("Template for doctor {} on {} is outside its validity window", doctor_id, date);
                return Ok(None);
            }
            None => {
                debug!("No availability for doctor {} on {}", doctor_id, day_of_week);
                return Ok(None);
            }
        };

        let booked = self.bookings.booked_start_times(doctor_id, date, exclude).await?;
        let mut available_slots = generate_time_slots(&template.time_ranges, template.slot_duration_minutes);
        available_slots.retain(|slot| !booked.contains(slot));

        debug!(
            "Doctor {} has {} open slots on {} ({} booked)",
            doctor_id,
            available_slots.len(),
            date,
            booked.len()
        );

        Ok(Some(DaySchedule { template, available_slots }))
    }

    /// Open start times for a doctor on a date, ascending. Empty when no template applies.
    pub async fn compute_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<ClockTime>, AvailabilityError> {
        Ok(self
            .day_schedule(doctor_id, date, None)
            .await?
            .map(|schedule| schedule.available_slots)
            .unwrap_or_default())
    }

    /// Same as `compute_available_slots` but ignoring one appointment's booking.
    pub async fn compute_available_slots_excluding(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Uuid,
    ) -> Result<Vec<ClockTime>, AvailabilityError> {
        Ok(self
            .day_schedule(doctor_id, date, Some(exclude))
            .await?
            .map(|schedule| schedule.available_slots)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AvailabilityTemplate;
    use crate::repository::MockAvailabilityRepository;
    use chrono::Utc;
    use mockall::predicate::eq;

    fn t(raw: &str) -> ClockTime {
        raw.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange { start_time: t(start), end_time: t(end) }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn template(doctor_id: Uuid) -> AvailabilityTemplate {
        AvailabilityTemplate {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: DayOfWeek::Monday,
            time_ranges: vec![range("08:00", "13:00")],
            slot_duration_minutes: 30,
            is_active: true,
            effective_from: None,
            effective_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn full_slots_only() {
        let slots = generate_time_slots(&[range("08:00", "09:40")], 30);
        let rendered: Vec<_> = slots.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["08:00", "08:30", "09:00"]);
    }

    #[test]
    fn multiple_ranges_are_merged_in_order() {
        let slots = generate_time_slots(&[range("14:00", "15:00"), range("08:00", "09:00")], 30);
        let rendered: Vec<_> = slots.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["08:00", "08:30", "14:00", "14:30"]);
    }

    #[test]
    fn every_slot_fits_its_range() {
        let ranges = [range("08:10", "11:55"), range("13:00", "17:20")];
        for duration in [15, 25, 30, 45, 60, 90, 120] {
            for slot in generate_time_slots(&ranges, duration) {
                assert!(ranges.iter().any(|r| r.fits(slot, duration)), "{} does not fit", slot);
            }
        }
    }

    #[tokio::test]
    async fn booked_slots_are_removed() {
        let doctor = Uuid::new_v4();
        let mut templates = MockAvailabilityRepository::new();
        let found = template(doctor);
        templates
            .expect_find_active()
            .with(eq(doctor), eq(DayOfWeek::Monday))
            .returning(move |_, _| Ok(Some(found.clone())));

        let mut bookings = MockBookedSlotSource::new();
        bookings
            .expect_booked_start_times()
            .returning(|_, _, _| Ok(vec!["09:00".parse().unwrap()]));

        let generator = SlotGenerator::new(Arc::new(templates), Arc::new(bookings));
        let slots = generator.compute_available_slots(doctor, monday()).await.unwrap();

        assert_eq!(slots.len(), 9);
        assert!(!slots.contains(&t("09:00")));
    }

    #[tokio::test]
    async fn missing_template_yields_no_slots() {
        let mut templates = MockAvailabilityRepository::new();
        templates.expect_find_active().returning(|_, _| Ok(None));
        let mut bookings = MockBookedSlotSource::new();
        bookings.expect_booked_start_times().never();

        let generator = SlotGenerator::new(Arc::new(templates), Arc::new(bookings));
        let slots = generator.compute_available_slots(Uuid::new_v4(), monday()).await.unwrap();
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn template_outside_validity_window_is_ignored() {
        let doctor = Uuid::new_v4();
        let mut expired = template(doctor);
        expired.effective_until = Some(monday().pred_opt().unwrap());

        let mut templates = MockAvailabilityRepository::new();
        templates
            .expect_find_active()
            .returning(move |_, _| Ok(Some(expired.clone())));

        let generator = SlotGenerator::new(Arc::new(templates), Arc::new(NoBookedSlots));
        assert!(generator.day_schedule(doctor, monday(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exclusion_is_forwarded_to_booking_source() {
        let doctor = Uuid::new_v4();
        let appointment = Uuid::new_v4();
        let found = template(doctor);
        let mut templates = MockAvailabilityRepository::new();
        templates
            .expect_find_active()
            .returning(move |_, _| Ok(Some(found.clone())));

        let mut bookings = MockBookedSlotSource::new();
        bookings
            .expect_booked_start_times()
            .with(eq(doctor), eq(monday()), eq(Some(appointment)))
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let generator = SlotGenerator::new(Arc::new(templates), Arc::new(bookings));
        let slots = generator
            .compute_available_slots_excluding(doctor, monday(), appointment)
            .await
            .unwrap();
        assert_eq!(slots.len(), 10);
    }
}
