//! Registration ledger: admits or rejects registrations under capacity.
//!
//! Each attempt reads a [`ClassScope`] snapshot, decides, and commits only if
//! the class's scope version is unchanged:
//! - active entry for the student: `AlreadyRegistered`, no write
//! - effective occupancy `>= capacity`: `ClassFull`, no write
//! - otherwise: write the entry (replacing an expired drop-in under the same key)
//!
//! A version mismatch at commit is a `Conflict`; the attempt is re-run per
//! the [`RetryPolicy`] and surfaces as `ConcurrencyExhausted` once the bound
//! is spent.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, ShalaError};
use crate::model::*;
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::storage::{ClassScope, StorageBackend};

/// What one attempt decided from its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AlreadyRegistered(Registration),
    Full { occupancy: usize, capacity: u32 },
    Admit,
}

/// Pure admission rule over a snapshot.
pub fn decide(scope: &ClassScope, now: DateTime<Utc>) -> Decision {
    if let Some(existing) = &scope.existing {
        if existing.is_active(now) {
            return Decision::AlreadyRegistered(existing.clone());
        }
    }
    let occupancy = occupancy(&scope.registrations, now);
    if occupancy >= scope.class.capacity as usize {
        return Decision::Full {
            occupancy,
            capacity: scope.class.capacity,
        };
    }
    Decision::Admit
}

/// Register `student` for a class.
///
/// Input problems are reported before any storage access. A drop-in must
/// target a date that has not passed, and drop-in-only classes refuse
/// session-long registrations. Contact fields are stored trimmed.
pub async fn register(
    storage: &impl StorageBackend,
    policy: &RetryPolicy,
    student: &StudentInfo,
    class_id: Uuid,
    kind: RegistrationKind,
    now: DateTime<Utc>,
) -> Result<Admission> {
    let student = &student.normalized();
    validate_student(student)?;
    if let RegistrationKind::DropIn { date } = kind {
        if date < now {
            return Err(ShalaError::InvalidInput(format!(
                "drop-in date {} is in the past",
                date.format("%Y-%m-%d %H:%M")
            )));
        }
    }

    let result = with_retry(policy, || {
        try_register(storage, student, class_id, kind, now)
    })
    .await;

    match result {
        Ok(admission) => Ok(admission),
        Err(RetryError::Permanent(e)) => Err(e),
        Err(RetryError::Exhausted { attempts, .. }) => {
            tracing::warn!(%class_id, attempts, "registration gave up under contention");
            Err(ShalaError::ConcurrencyExhausted { class_id, attempts })
        }
    }
}

async fn try_register(
    storage: &impl StorageBackend,
    student: &StudentInfo,
    class_id: Uuid,
    kind: RegistrationKind,
    now: DateTime<Utc>,
) -> Result<Admission> {
    let scope = storage.load_scope(class_id, &student.id).await?;

    if kind == RegistrationKind::Session && scope.class.drop_in_only {
        return Err(ShalaError::InvalidInput(format!(
            "class '{}' only accepts drop-ins",
            scope.class.title
        )));
    }

    match decide(&scope, now) {
        Decision::AlreadyRegistered(existing) => {
            tracing::debug!(%class_id, student_id = %student.id, "already registered");
            Ok(Admission::AlreadyRegistered(existing))
        }
        Decision::Full {
            occupancy,
            capacity,
        } => {
            tracing::debug!(%class_id, occupancy, capacity, "class full");
            Err(ShalaError::ClassFull(class_id))
        }
        Decision::Admit => {
            let registration = Registration::new(class_id, student.clone(), kind, now);
            storage
                .commit_registration(&registration, scope.version)
                .await?;
            tracing::info!(
                %class_id,
                student_id = %student.id,
                kind = %kind,
                reclaimed = scope.existing.is_some(),
                "registered"
            );
            Ok(Admission::Registered(registration))
        }
    }
}

/// Remove a student from a class roster.
pub async fn unregister(
    storage: &impl StorageBackend,
    class_id: Uuid,
    student_id: &str,
) -> Result<()> {
    storage.delete_registration(class_id, student_id).await?;
    tracing::info!(%class_id, %student_id, "unregistered");
    Ok(())
}

/// Entries still holding a seat at `now`, in roster order.
pub async fn list_active(
    storage: &impl StorageBackend,
    class_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<Registration>> {
    storage.get_class(class_id).await?;
    let mut active: Vec<Registration> = storage
        .list_registrations_for_class(class_id)
        .await?
        .into_iter()
        .filter(|r| r.is_active(now))
        .collect();
    sort_roster(&mut active);
    Ok(active)
}

pub async fn list_by_student(
    storage: &impl StorageBackend,
    student_id: &str,
) -> Result<Vec<Registration>> {
    storage.list_registrations_by_student(student_id).await
}

pub async fn list_by_email(
    storage: &impl StorageBackend,
    email: &str,
) -> Result<Vec<Registration>> {
    storage.list_registrations_by_email(email).await
}
