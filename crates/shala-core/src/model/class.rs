use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Session;
use crate::error::{Result, ShalaError};

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 5_000;

/// A recurring weekly offering inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: Uuid,
    pub session_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub teacher_id: Option<String>,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub capacity: u32,
    #[serde(default)]
    pub drop_in_only: bool,
}

/// Fields supplied by staff when adding a class. The id is assigned on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClass {
    pub session_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub teacher_id: Option<String>,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub capacity: u32,
    #[serde(default)]
    pub drop_in_only: bool,
}

impl Class {
    pub fn new(input: NewClass) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id: input.session_id,
            title: input.title.trim().to_string(),
            description: input.description,
            teacher_id: input.teacher_id.filter(|t| !t.trim().is_empty()),
            weekday: input.weekday,
            start_time: input.start_time,
            duration_minutes: input.duration_minutes,
            capacity: input.capacity,
            drop_in_only: input.drop_in_only,
        }
    }

    /// Concrete occurrences of this class inside `session`, on or after `from`.
    ///
    /// Times are interpreted as UTC wall-clock times.
    pub fn dates(&self, session: &Session, from: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let lower = from.max(session.starts_at);
        let mut day = lower.date_naive();
        while day.weekday() != self.weekday {
            match day.succ_opt() {
                Some(next) => day = next,
                None => return Vec::new(),
            }
        }

        let mut dates = Vec::new();
        loop {
            let occurrence = day.and_time(self.start_time).and_utc();
            if occurrence > session.ends_at {
                break;
            }
            if occurrence >= lower {
                dates.push(occurrence);
            }
            match day.checked_add_days(Days::new(7)) {
                Some(next) => day = next,
                None => break,
            }
        }
        dates
    }
}

/// Validate class fields shared by add and update.
pub fn validate_class_fields(
    title: &str,
    description: &str,
    duration_minutes: u32,
    capacity: u32,
) -> Result<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ShalaError::InvalidInput("class title cannot be empty".into()));
    }
    if trimmed.len() > MAX_TITLE_LENGTH {
        return Err(ShalaError::InvalidInput(format!(
            "class title exceeds maximum length of {MAX_TITLE_LENGTH} characters"
        )));
    }
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(ShalaError::InvalidInput(format!(
            "description exceeds maximum length of {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    if duration_minutes == 0 {
        return Err(ShalaError::InvalidInput(
            "duration must be at least one minute".into(),
        ));
    }
    if capacity == 0 {
        return Err(ShalaError::InvalidInput("capacity must be positive".into()));
    }
    Ok(())
}

/// Sort order for class listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassOrder {
    #[default]
    Title,
    StartTime,
}

impl std::fmt::Display for ClassOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::StartTime => write!(f, "start_time"),
        }
    }
}

impl std::str::FromStr for ClassOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "start" | "start_time" | "time" => Ok(Self::StartTime),
            _ => Err(format!("unknown class order: {s}")),
        }
    }
}

/// Sort classes in place. `StartTime` orders by weekday (Monday first), then
/// time of day; ties fall back to the title.
pub fn sort_classes(classes: &mut [Class], order: ClassOrder) {
    match order {
        ClassOrder::Title => classes.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        }),
        ClassOrder::StartTime => classes.sort_by(|a, b| {
            a.weekday
                .num_days_from_monday()
                .cmp(&b.weekday.num_days_from_monday())
                .then_with(|| a.start_time.cmp(&b.start_time))
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        }),
    }
}
