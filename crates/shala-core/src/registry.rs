//! Class/session registry: the canonical schedule the ledger checks against.
//!
//! Thin validation layer over [`StorageBackend`]; all persistence and
//! atomicity guarantees come from the backend.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::*;
use crate::storage::StorageBackend;

pub async fn create_session(
    storage: &impl StorageBackend,
    name: &str,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<Session> {
    validate_session_input(name, starts_at, ends_at)?;
    let session = Session::new(name.trim().to_string(), starts_at, ends_at);
    storage.save_session(&session).await?;
    tracing::info!(session_id = %session.id, name = %session.name, "created session");
    Ok(session)
}

pub async fn get_session(storage: &impl StorageBackend, id: Uuid) -> Result<Session> {
    storage.get_session(id).await
}

/// Sessions that have not ended yet, earliest first.
pub async fn list_active_sessions(
    storage: &impl StorageBackend,
    now: DateTime<Utc>,
) -> Result<Vec<Session>> {
    storage.list_sessions_ending_after(now).await
}

pub async fn add_class(storage: &impl StorageBackend, input: NewClass) -> Result<Class> {
    validate_class_fields(
        &input.title,
        &input.description,
        input.duration_minutes,
        input.capacity,
    )?;
    storage.get_session(input.session_id).await?;

    let class = Class::new(input);
    storage.insert_class(&class).await?;
    tracing::info!(
        class_id = %class.id,
        session_id = %class.session_id,
        capacity = class.capacity,
        "added class"
    );
    Ok(class)
}

pub async fn get_class(storage: &impl StorageBackend, id: Uuid) -> Result<Class> {
    storage.get_class(id).await
}

pub async fn list_classes_in_session(
    storage: &impl StorageBackend,
    session_id: Uuid,
    order: ClassOrder,
) -> Result<Vec<Class>> {
    let mut classes = storage.list_classes_in_session(session_id).await?;
    sort_classes(&mut classes, order);
    Ok(classes)
}

/// Overwrite a class record. Last writer wins; there is no optimistic check
/// for the caller. Lowering capacity below current occupancy does not evict
/// anyone, it only blocks new admissions.
pub async fn update_class(storage: &impl StorageBackend, class: &Class) -> Result<()> {
    validate_class_fields(
        &class.title,
        &class.description,
        class.duration_minutes,
        class.capacity,
    )?;
    storage.get_session(class.session_id).await?;
    storage.update_class(class).await?;
    tracing::info!(class_id = %class.id, capacity = class.capacity, "updated class");
    Ok(())
}

/// Delete a class unless a registration is still active at `now`.
/// Expired drop-ins are removed along with it.
pub async fn delete_class(
    storage: &impl StorageBackend,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    storage.delete_class_if_idle(id, now).await?;
    tracing::info!(class_id = %id, "deleted class");
    Ok(())
}

/// Meeting dates still ahead for a class, for offering drop-in slots.
pub async fn upcoming_dates(
    storage: &impl StorageBackend,
    class_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let class = storage.get_class(class_id).await?;
    let session = storage.get_session(class.session_id).await?;
    Ok(class.dates(&session, now))
}
