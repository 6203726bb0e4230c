mod backend;
mod memory;
mod sqlite;

pub use backend::{ClassScope, StorageBackend};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ShalaConfig;
use crate::error::{Result, ShalaError};
use crate::model::*;

/// Enum wrapper for storage backends. Dispatches to the concrete implementation.
/// Using an enum instead of `Box<dyn StorageBackend>` because the trait uses RPITIT.
pub enum Storage {
    Sqlite(SqliteStorage),
    Memory(MemoryStorage),
}

impl StorageBackend for Storage {
    async fn save_session(&self, session: &Session) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.save_session(session).await,
            Storage::Memory(s) => s.save_session(session).await,
        }
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        match self {
            Storage::Sqlite(s) => s.get_session(id).await,
            Storage::Memory(s) => s.get_session(id).await,
        }
    }

    async fn list_sessions_ending_after(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        match self {
            Storage::Sqlite(s) => s.list_sessions_ending_after(now).await,
            Storage::Memory(s) => s.list_sessions_ending_after(now).await,
        }
    }

    async fn insert_class(&self, class: &Class) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.insert_class(class).await,
            Storage::Memory(s) => s.insert_class(class).await,
        }
    }

    async fn update_class(&self, class: &Class) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.update_class(class).await,
            Storage::Memory(s) => s.update_class(class).await,
        }
    }

    async fn get_class(&self, id: Uuid) -> Result<Class> {
        match self {
            Storage::Sqlite(s) => s.get_class(id).await,
            Storage::Memory(s) => s.get_class(id).await,
        }
    }

    async fn list_classes_in_session(&self, session_id: Uuid) -> Result<Vec<Class>> {
        match self {
            Storage::Sqlite(s) => s.list_classes_in_session(session_id).await,
            Storage::Memory(s) => s.list_classes_in_session(session_id).await,
        }
    }

    async fn delete_class_if_idle(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.delete_class_if_idle(id, now).await,
            Storage::Memory(s) => s.delete_class_if_idle(id, now).await,
        }
    }

    async fn load_scope(&self, class_id: Uuid, student_id: &str) -> Result<ClassScope> {
        match self {
            Storage::Sqlite(s) => s.load_scope(class_id, student_id).await,
            Storage::Memory(s) => s.load_scope(class_id, student_id).await,
        }
    }

    async fn commit_registration(
        &self,
        registration: &Registration,
        expected_version: u64,
    ) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.commit_registration(registration, expected_version).await,
            Storage::Memory(s) => s.commit_registration(registration, expected_version).await,
        }
    }

    async fn delete_registration(&self, class_id: Uuid, student_id: &str) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.delete_registration(class_id, student_id).await,
            Storage::Memory(s) => s.delete_registration(class_id, student_id).await,
        }
    }

    async fn list_registrations_for_class(&self, class_id: Uuid) -> Result<Vec<Registration>> {
        match self {
            Storage::Sqlite(s) => s.list_registrations_for_class(class_id).await,
            Storage::Memory(s) => s.list_registrations_for_class(class_id).await,
        }
    }

    async fn list_registrations_by_student(&self, student_id: &str) -> Result<Vec<Registration>> {
        match self {
            Storage::Sqlite(s) => s.list_registrations_by_student(student_id).await,
            Storage::Memory(s) => s.list_registrations_by_student(student_id).await,
        }
    }

    async fn list_registrations_by_email(&self, email: &str) -> Result<Vec<Registration>> {
        match self {
            Storage::Sqlite(s) => s.list_registrations_by_email(email).await,
            Storage::Memory(s) => s.list_registrations_by_email(email).await,
        }
    }
}

impl Storage {
    /// Short backend name for health output.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Storage::Sqlite(_) => "sqlite",
            Storage::Memory(_) => "memory",
        }
    }
}

/// Create a storage backend from the given configuration.
pub fn create_backend(config: &ShalaConfig) -> Result<Storage> {
    match config.storage.backend.as_str() {
        "sqlite" => {
            let path = match &config.storage.path {
                Some(p) => std::path::PathBuf::from(p),
                None => default_sqlite_path()?,
            };
            let storage = SqliteStorage::open(&path)?;
            tracing::info!(path = %path.display(), "opened sqlite storage");
            Ok(Storage::Sqlite(storage))
        }
        "memory" => Ok(Storage::Memory(MemoryStorage::new())),
        other => Err(ShalaError::Config(format!(
            "unknown storage backend: {other}"
        ))),
    }
}

/// Default SQLite path: `~/.config/shala/shala.db`
fn default_sqlite_path() -> Result<std::path::PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("shala").join("shala.db"))
        .ok_or_else(|| ShalaError::Config("cannot determine config directory".to_string()))
}
