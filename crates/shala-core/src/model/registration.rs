use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ShalaError};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Contact details captured when a student registers. This is a snapshot,
/// not a live reference to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl StudentInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Copy with surrounding whitespace stripped from the contact fields.
    /// The id is an opaque key and is kept verbatim.
    pub fn normalized(&self) -> Self {
        Self {
            id: self.id.clone(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
        }
    }
}

/// Expects a [`StudentInfo::normalized`] value; the email must match as stored.
pub fn validate_student(student: &StudentInfo) -> Result<()> {
    if student.id.trim().is_empty() {
        return Err(ShalaError::InvalidInput("student id cannot be empty".into()));
    }
    if !EMAIL_RE.is_match(&student.email) {
        return Err(ShalaError::InvalidInput(format!(
            "invalid email address: {}",
            student.email
        )));
    }
    Ok(())
}

/// What a registration covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RegistrationKind {
    /// Every meeting of the class for the whole session.
    Session,
    /// A single meeting on `date`.
    DropIn { date: DateTime<Utc> },
}

impl RegistrationKind {
    /// Whether a registration of this kind still holds a seat at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Session => true,
            Self::DropIn { date } => *date >= now,
        }
    }

    pub fn drop_in_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Session => None,
            Self::DropIn { date } => Some(*date),
        }
    }
}

impl std::fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::DropIn { date } => write!(f, "drop-in ({})", date.format("%Y-%m-%d %H:%M")),
        }
    }
}

/// One ledger entry, keyed by `(class_id, student.id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub class_id: Uuid,
    pub student: StudentInfo,
    pub kind: RegistrationKind,
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(
        class_id: Uuid,
        student: StudentInfo,
        kind: RegistrationKind,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            class_id,
            student,
            kind,
            registered_at,
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student.id
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.kind.is_active(now)
    }
}

/// Effective occupancy: registrations still holding a seat at `now`.
pub fn occupancy(registrations: &[Registration], now: DateTime<Utc>) -> usize {
    registrations.iter().filter(|r| r.is_active(now)).count()
}

/// Roster order: last name, first name, then student id.
pub fn sort_roster(registrations: &mut [Registration]) {
    registrations.sort_by(|a, b| {
        a.student
            .last_name
            .to_lowercase()
            .cmp(&b.student.last_name.to_lowercase())
            .then_with(|| {
                a.student
                    .first_name
                    .to_lowercase()
                    .cmp(&b.student.first_name.to_lowercase())
            })
            .then_with(|| a.student.id.cmp(&b.student.id))
    });
}

/// Outcome of a successful registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "registration")]
pub enum Admission {
    /// A new entry was written.
    Registered(Registration),
    /// An active entry already existed; nothing was written.
    AlreadyRegistered(Registration),
}

impl Admission {
    pub fn registration(&self) -> &Registration {
        match self {
            Self::Registered(r) | Self::AlreadyRegistered(r) => r,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}
