use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveTime, SecondsFormat, Utc, Weekday};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::backend::{ClassScope, StorageBackend};
use crate::error::{Result, ShalaError};
use crate::model::*;

const SESSION_COLUMNS: &str = "id, name, starts_at, ends_at";
const CLASS_COLUMNS: &str = "id, session_id, title, description, teacher_id, weekday, \
     start_time, duration_minutes, capacity, drop_in_only";
const REGISTRATION_COLUMNS: &str = "class_id, student_id, first_name, last_name, email, phone, \
     kind, drop_in_date, registered_at";

/// SQLite-backed storage for sessions, classes and the registration ledger.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks.  All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode and enables foreign keys, then creates all
    /// tables and indexes if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ShalaError::Storage(format!("failed to create database directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(&path)
            .map_err(|e| ShalaError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ShalaError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| ShalaError::Storage(format!("failed to set WAL mode: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| ShalaError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        storage.create_tables()?;
        Ok(storage)
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ShalaError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                starts_at TEXT NOT NULL,
                ends_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS classes (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                teacher_id TEXT,
                weekday INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                capacity INTEGER NOT NULL CHECK (capacity > 0),
                drop_in_only INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS class_scopes (
                class_id TEXT PRIMARY KEY REFERENCES classes(id) ON DELETE CASCADE,
                version INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS registrations (
                class_id TEXT NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                student_id TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL,
                phone TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                drop_in_date TEXT,
                registered_at TEXT NOT NULL,
                PRIMARY KEY (class_id, student_id)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ends_at ON sessions(ends_at);
            CREATE INDEX IF NOT EXISTS idx_classes_session_id ON classes(session_id);
            CREATE INDEX IF NOT EXISTS idx_registrations_student_id ON registrations(student_id);
            CREATE INDEX IF NOT EXISTS idx_registrations_email ON registrations(email COLLATE NOCASE);
            ",
        )
        .map_err(|e| ShalaError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.  This is the primary way trait methods
    /// interact with the database.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                ShalaError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| ShalaError::Storage(format!("task join error: {e}")))?
    }
}

// ── row mapping ─────────────────────────────────────────────────────────

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        starts_at: parse_ts(row, 2)?,
        ends_at: parse_ts(row, 3)?,
    })
}

fn row_to_class(row: &Row<'_>) -> rusqlite::Result<Class> {
    let weekday: u8 = row.get(5)?;
    let start_time: String = row.get(6)?;
    Ok(Class {
        id: parse_uuid(row, 0)?,
        session_id: parse_uuid(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        teacher_id: row.get(4)?,
        weekday: Weekday::try_from(weekday).map_err(|e| conversion_error(5, e))?,
        start_time: NaiveTime::parse_from_str(&start_time, "%H:%M:%S")
            .map_err(|e| conversion_error(6, e))?,
        duration_minutes: row.get(7)?,
        capacity: row.get(8)?,
        drop_in_only: row.get(9)?,
    })
}

fn row_to_registration(row: &Row<'_>) -> rusqlite::Result<Registration> {
    let kind: String = row.get(6)?;
    let kind = match kind.as_str() {
        "session" => RegistrationKind::Session,
        "drop_in" => RegistrationKind::DropIn {
            date: parse_ts(row, 7)?,
        },
        other => return Err(conversion_error(6, format!("unknown registration kind: {other}"))),
    };
    Ok(Registration {
        class_id: parse_uuid(row, 0)?,
        student: StudentInfo {
            id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            email: row.get(4)?,
            phone: row.get(5)?,
        },
        kind,
        registered_at: parse_ts(row, 8)?,
    })
}

fn kind_column(kind: &RegistrationKind) -> (&'static str, Option<String>) {
    match kind {
        RegistrationKind::Session => ("session", None),
        RegistrationKind::DropIn { date } => ("drop_in", Some(ts(date))),
    }
}

// ── synchronous queries (run inside `with_conn`) ───────────────────────

fn fetch_class(conn: &Connection, id: Uuid) -> Result<Class> {
    conn.query_row(
        &format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?1"),
        params![id.to_string()],
        row_to_class,
    )
    .optional()?
    .ok_or(ShalaError::ClassNotFound(id))
}

fn fetch_registrations(
    conn: &Connection,
    filter: &str,
    value: &str,
) -> Result<Vec<Registration>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE {filter} ORDER BY registered_at, student_id"
    ))?;
    let rows = stmt
        .query_map(params![value], row_to_registration)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn bump_scope(conn: &Connection, class_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE class_scopes SET version = version + 1 WHERE class_id = ?1",
        params![class_id.to_string()],
    )?;
    Ok(())
}

impl StorageBackend for SqliteStorage {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, name, starts_at, ends_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    starts_at = excluded.starts_at,
                    ends_at = excluded.ends_at",
                params![
                    session.id.to_string(),
                    session.name,
                    ts(&session.starts_at),
                    ts(&session.ends_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id.to_string()],
                row_to_session,
            )
            .optional()?
            .ok_or(ShalaError::SessionNotFound(id))
        })
        .await
    }

    async fn list_sessions_ending_after(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE ends_at >= ?1 ORDER BY starts_at, name"
            ))?;
            let rows = stmt
                .query_map(params![ts(&now)], row_to_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn insert_class(&self, class: &Class) -> Result<()> {
        let class = class.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO classes ({CLASS_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    class.id.to_string(),
                    class.session_id.to_string(),
                    class.title,
                    class.description,
                    class.teacher_id,
                    class.weekday.num_days_from_monday(),
                    class.start_time.format("%H:%M:%S").to_string(),
                    class.duration_minutes,
                    class.capacity,
                    class.drop_in_only,
                ],
            )?;
            tx.execute(
                "INSERT INTO class_scopes (class_id, version) VALUES (?1, 0)",
                params![class.id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update_class(&self, class: &Class) -> Result<()> {
        let class = class.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE classes SET
                    session_id = ?2, title = ?3, description = ?4, teacher_id = ?5,
                    weekday = ?6, start_time = ?7, duration_minutes = ?8,
                    capacity = ?9, drop_in_only = ?10
                 WHERE id = ?1",
                params![
                    class.id.to_string(),
                    class.session_id.to_string(),
                    class.title,
                    class.description,
                    class.teacher_id,
                    class.weekday.num_days_from_monday(),
                    class.start_time.format("%H:%M:%S").to_string(),
                    class.duration_minutes,
                    class.capacity,
                    class.drop_in_only,
                ],
            )?;
            if changed == 0 {
                return Err(ShalaError::ClassNotFound(class.id));
            }
            bump_scope(&tx, class.id)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_class(&self, id: Uuid) -> Result<Class> {
        self.with_conn(move |conn| fetch_class(conn, id)).await
    }

    async fn list_classes_in_session(&self, session_id: Uuid) -> Result<Vec<Class>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLASS_COLUMNS} FROM classes WHERE session_id = ?1"
            ))?;
            let rows = stmt
                .query_map(params![session_id.to_string()], row_to_class)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn delete_class_if_idle(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            fetch_class(&tx, id)?;
            let registrations = fetch_registrations(&tx, "class_id = ?1", &id.to_string())?;
            if occupancy(&registrations, now) > 0 {
                return Err(ShalaError::ClassNotEmpty(id));
            }
            let key = id.to_string();
            tx.execute("DELETE FROM registrations WHERE class_id = ?1", params![key])?;
            tx.execute("DELETE FROM class_scopes WHERE class_id = ?1", params![key])?;
            tx.execute("DELETE FROM classes WHERE id = ?1", params![key])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_scope(&self, class_id: Uuid, student_id: &str) -> Result<ClassScope> {
        let student_id = student_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let class = fetch_class(&tx, class_id)?;
            let version: i64 = tx
                .query_row(
                    "SELECT version FROM class_scopes WHERE class_id = ?1",
                    params![class_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| {
                    ShalaError::Storage(format!("missing scope row for class {class_id}"))
                })?;
            let registrations = fetch_registrations(&tx, "class_id = ?1", &class_id.to_string())?;
            let existing = registrations
                .iter()
                .find(|r| r.student.id == student_id)
                .cloned();
            tx.commit()?;
            Ok(ClassScope {
                class,
                version: version as u64,
                existing,
                registrations,
            })
        })
        .await
    }

    async fn commit_registration(
        &self,
        registration: &Registration,
        expected_version: u64,
    ) -> Result<()> {
        let registration = registration.clone();
        self.with_conn(move |conn| {
            let class_id = registration.class_id;
            let tx = conn.unchecked_transaction()?;
            let version: Option<i64> = tx
                .query_row(
                    "SELECT version FROM class_scopes WHERE class_id = ?1",
                    params![class_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if version != Some(expected_version as i64) {
                return Err(ShalaError::Conflict(class_id));
            }

            let (kind, drop_in_date) = kind_column(&registration.kind);
            let student = &registration.student;
            tx.execute(
                &format!(
                    "INSERT INTO registrations ({REGISTRATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(class_id, student_id) DO UPDATE SET
                        first_name = excluded.first_name,
                        last_name = excluded.last_name,
                        email = excluded.email,
                        phone = excluded.phone,
                        kind = excluded.kind,
                        drop_in_date = excluded.drop_in_date,
                        registered_at = excluded.registered_at"
                ),
                params![
                    class_id.to_string(),
                    student.id,
                    student.first_name,
                    student.last_name,
                    student.email,
                    student.phone,
                    kind,
                    drop_in_date,
                    ts(&registration.registered_at),
                ],
            )?;
            bump_scope(&tx, class_id)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_registration(&self, class_id: Uuid, student_id: &str) -> Result<()> {
        let student_id = student_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute(
                "DELETE FROM registrations WHERE class_id = ?1 AND student_id = ?2",
                params![class_id.to_string(), student_id],
            )?;
            if removed == 0 {
                return Err(ShalaError::RegistrationNotFound {
                    class_id,
                    student_id,
                });
            }
            bump_scope(&tx, class_id)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_registrations_for_class(&self, class_id: Uuid) -> Result<Vec<Registration>> {
        self.with_conn(move |conn| {
            fetch_registrations(conn, "class_id = ?1", &class_id.to_string())
        })
        .await
    }

    async fn list_registrations_by_student(&self, student_id: &str) -> Result<Vec<Registration>> {
        let student_id = student_id.to_string();
        self.with_conn(move |conn| fetch_registrations(conn, "student_id = ?1", &student_id))
            .await
    }

    async fn list_registrations_by_email(&self, email: &str) -> Result<Vec<Registration>> {
        let email = email.trim().to_string();
        self.with_conn(move |conn| {
            fetch_registrations(conn, "email = ?1 COLLATE NOCASE", &email)
        })
        .await
    }
}
