use chrono::NaiveDate;

use crate::models::{
    AvailabilityError, ClockTime, DayOfWeek, TimeRange, TimeRangeInput,
    MAX_SLOT_DURATION_MINUTES, MIN_SLOT_DURATION_MINUTES,
};

pub fn parse_clock_time(field: &str, raw: &str) -> Result<ClockTime, AvailabilityError> {
    raw.parse().map_err(|_| {
        AvailabilityError::Validation(format!("{} '{}' must use HH:MM format", field, raw))
    })
}

pub fn parse_day_of_week(raw: &str) -> Result<DayOfWeek, AvailabilityError> {
    raw.parse().map_err(AvailabilityError::Validation)
}

/// Parses every range, then checks ordering and pairwise overlap.
/// Returned ranges are sorted by start time.
pub fn validate_time_ranges(inputs: &[TimeRangeInput]) -> Result<Vec<TimeRange>, AvailabilityError> {
    if inputs.is_empty() {
        return Err(AvailabilityError::Validation(
            "At least one time range is required".to_string(),
        ));
    }

    let mut ranges = Vec::with_capacity(inputs.len());
    for input in inputs {
        let range = TimeRange {
            start_time: parse_clock_time("start_time", &input.start_time)?,
            end_time: parse_clock_time("end_time", &input.end_time)?,
        };
        if range.start_time >= range.end_time {
            return Err(AvailabilityError::Validation(format!(
                "Start time {} must be before end time {}",
                range.start_time, range.end_time
            )));
        }
        ranges.push(range);
    }

    for (i, a) in ranges.iter().enumerate() {
        if let Some(b) = ranges[i + 1..].iter().find(|b| a.overlaps(b)) {
            return Err(AvailabilityError::Validation(format!(
                "Time range {}-{} overlaps with {}-{}",
                a.start_time, a.end_time, b.start_time, b.end_time
            )));
        }
    }

    ranges.sort_by_key(|r| r.start_time);
    Ok(ranges)
}

pub fn validate_slot_duration(minutes: u32) -> Result<u32, AvailabilityError> {
    if (MIN_SLOT_DURATION_MINUTES..=MAX_SLOT_DURATION_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(AvailabilityError::Validation(format!(
            "Slot duration must be between {} and {} minutes",
            MIN_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES
        )))
    }
}

pub fn validate_validity_window(
    effective_from: Option<NaiveDate>,
    effective_until: Option<NaiveDate>,
) -> Result<(), AvailabilityError> {
    match (effective_from, effective_until) {
        (Some(from), Some(until)) if from > until => Err(AvailabilityError::Validation(format!(
            "effective_from {} is after effective_until {}",
            from, until
        ))),
        _ => Ok(()),
    }
}
