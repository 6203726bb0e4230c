use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::*;

/// Everything the ledger needs to decide one admission, read at a single
/// point in time.
#[derive(Debug, Clone)]
pub struct ClassScope {
    pub class: Class,
    /// Bumped by every write to the class's contention domain.
    pub version: u64,
    /// The entry currently stored under `(class.id, student_id)`, if any.
    pub existing: Option<Registration>,
    /// Every entry stored for the class, expired drop-ins included.
    pub registrations: Vec<Registration>,
}

/// Abstract storage backend. SQLite is the primary implementation; the
/// in-memory backend serves tests and throwaway instances.
///
/// Writes that touch a class's registrations are scoped by a per-class
/// version: [`commit_registration`](Self::commit_registration) only succeeds
/// when the version is unchanged since [`load_scope`](Self::load_scope) and
/// otherwise fails with [`ShalaError::Conflict`](crate::error::ShalaError::Conflict).
pub trait StorageBackend: Send + Sync {
    // -- Sessions --

    fn save_session(&self, session: &Session)
        -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_session(&self, id: Uuid) -> impl std::future::Future<Output = Result<Session>> + Send;

    /// Sessions with `ends_at >= now`, ordered by start.
    fn list_sessions_ending_after(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<Session>>> + Send;

    // -- Classes --

    fn insert_class(&self, class: &Class) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Overwrite a stored class and bump its scope version.
    fn update_class(&self, class: &Class) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_class(&self, id: Uuid) -> impl std::future::Future<Output = Result<Class>> + Send;

    fn list_classes_in_session(
        &self,
        session_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Class>>> + Send;

    /// Atomically delete a class and its expired registrations, unless a
    /// registration is still active at `now`.
    fn delete_class_if_idle(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Ledger --

    fn load_scope(
        &self,
        class_id: Uuid,
        student_id: &str,
    ) -> impl std::future::Future<Output = Result<ClassScope>> + Send;

    /// Write `registration` under its `(class_id, student_id)` key, replacing
    /// any previous entry, iff the class scope is still at `expected_version`.
    fn commit_registration(
        &self,
        registration: &Registration,
        expected_version: u64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn delete_registration(
        &self,
        class_id: Uuid,
        student_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn list_registrations_for_class(
        &self,
        class_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Registration>>> + Send;

    fn list_registrations_by_student(
        &self,
        student_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Registration>>> + Send;

    /// Case-insensitive match on the email snapshot.
    fn list_registrations_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Registration>>> + Send;
}
