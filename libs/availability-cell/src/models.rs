// libs/availability-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use shared_database::supabase::DatabaseError;

pub const MIN_SLOT_DURATION_MINUTES: u32 = 15;
pub const MAX_SLOT_DURATION_MINUTES: u32 = 120;
pub const DEFAULT_SLOT_DURATION_MINUTES: u32 = 30;

const CLOCK_PATTERN: &str = r"^([0-1][0-9]|2[0-3]):[0-5][0-9]$";

fn clock_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(CLOCK_PATTERN).ok()).as_ref()
}

// ==============================================================================
// CLOCK TIME
// ==============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid time '{0}', expected HH:MM")]
pub struct ParseClockTimeError(pub String);

/// Wall-clock time of day with minute precision, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self((hour * 60 + minute) as u16))
        } else {
            None
        }
    }

    pub fn minutes_since_midnight(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes_since_midnight() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes_since_midnight() % 60
    }

    /// `None` when the result would pass midnight.
    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        let total = self.minutes_since_midnight().checked_add(minutes)?;
        Self::from_hm(total / 60, total % 60)
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }

    /// Accepts the `HH:MM:SS` rendering of a Postgres `time` column as long as seconds are zero.
    fn parse_lenient(raw: &str) -> Result<Self, ParseClockTimeError> {
        match raw.strip_suffix(":00") {
            Some(short) if raw.len() == 8 => short.parse(),
            _ => raw.parse(),
        }
    }
}

impl FromStr for ClockTime {
    type Err = ParseClockTimeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let matches = clock_pattern().map(|re| re.is_match(raw)).unwrap_or(false);
        if !matches {
            return Err(ParseClockTimeError(raw.to_string()));
        }

        let (hour, minute) = raw
            .split_once(':')
            .ok_or_else(|| ParseClockTimeError(raw.to_string()))?;
        let hour = hour.parse().map_err(|_| ParseClockTimeError(raw.to_string()))?;
        let minute = minute.parse().map_err(|_| ParseClockTimeError(raw.to_string()))?;

        Self::from_hm(hour, minute).ok_or_else(|| ParseClockTimeError(raw.to_string()))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ClockTime::parse_lenient(&raw).map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// DAY OF WEEK
// ==============================================================================

/// Ordered Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Weekday of a plain calendar date. No timezone is involved.
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str() == lowered)
            .ok_or_else(|| format!("invalid day of week '{}'", raw))
    }
}

// ==============================================================================
// TEMPLATES
// ==============================================================================

/// Half-open interval `[start_time, end_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

impl TimeRange {
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    pub fn fits(&self, start: ClockTime, duration_minutes: u32) -> bool {
        start >= self.start_time
            && start.minutes_since_midnight() + duration_minutes
                <= self.end_time.minutes_since_midnight()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub time_ranges: Vec<TimeRange>,
    pub slot_duration_minutes: u32,
    pub is_active: bool,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityTemplate {
    /// Whether the optional validity window includes `date`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| date >= from)
            && self.effective_until.map_or(true, |until| date <= until)
    }
}

/// Template plus the open slots computed from it for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySchedule {
    pub template: AvailabilityTemplate,
    pub available_slots: Vec<ClockTime>,
}

impl DaySchedule {
    pub fn is_open(&self, start: ClockTime) -> bool {
        self.available_slots.binary_search(&start).is_ok()
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRangeInput {
    pub start_time: String,
    pub end_time: String,
}

impl TimeRangeInput {
    pub fn new(start_time: &str, end_time: &str) -> Self {
        Self {
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: String,
    pub time_ranges: Vec<TimeRangeInput>,
    pub slot_duration_minutes: Option<u32>,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub day_of_week: Option<String>,
    pub time_ranges: Option<Vec<TimeRangeInput>>,
    pub slot_duration_minutes: Option<u32>,
    pub is_active: Option<bool>,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Availability template not found")]
    NotFound,

    #[error("An active availability template already exists for {0}")]
    DuplicateTemplate(DayOfWeek),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for AvailabilityError {
    fn from(err: DatabaseError) -> Self {
        AvailabilityError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AvailabilityError {
    fn from(err: serde_json::Error) -> Self {
        AvailabilityError::Storage(format!("malformed row: {}", err))
    }
}
