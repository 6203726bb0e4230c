use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ShalaError};

pub const MAX_NAME_LENGTH: usize = 200;

/// A named date range (a term) grouping classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: String, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name,
            starts_at,
            ends_at,
        }
    }

    /// A session stays listed until its last day has passed.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ends_at >= now
    }
}

/// Validate inputs for creating a session.
pub fn validate_session_input(
    name: &str,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ShalaError::InvalidInput("session name cannot be empty".into()));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ShalaError::InvalidInput(format!(
            "session name exceeds maximum length of {MAX_NAME_LENGTH} characters"
        )));
    }
    if starts_at > ends_at {
        return Err(ShalaError::InvalidInput(
            "session must not end before it starts".into(),
        ));
    }
    Ok(())
}
