#![allow(dead_code)]

use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use shala_core::model::{Class, NewClass, StudentInfo};
use shala_core::registry;
use shala_core::retry::RetryPolicy;
use shala_core::storage::{MemoryStorage, SqliteStorage, Storage, StorageBackend};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Both backends, so each property is checked against each.
pub fn backends() -> Vec<Storage> {
    vec![
        Storage::Sqlite(SqliteStorage::open_in_memory().expect("in-memory sqlite")),
        Storage::Memory(MemoryStorage::new()),
    ]
}

pub fn student(n: usize) -> StudentInfo {
    StudentInfo {
        id: format!("student-{n:02}"),
        first_name: format!("First{n}"),
        last_name: format!("Last{n}"),
        email: format!("student{n}@example.com"),
        phone: String::new(),
    }
}

/// Generous bound: a task can only lose a race to a commit that took a seat.
pub fn contention_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 25,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// A session spanning `[0, 1_000_000]` with one class of the given capacity.
pub async fn seeded_class(storage: &impl StorageBackend, capacity: u32) -> Class {
    let session = registry::create_session(storage, "Autumn", at(0), at(1_000_000))
        .await
        .expect("create session");
    registry::add_class(
        storage,
        NewClass {
            session_id: session.id,
            title: "Power Flow".into(),
            description: "Fast-paced vinyasa".into(),
            teacher_id: Some("t-1".into()),
            weekday: Weekday::Thu,
            start_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            duration_minutes: 75,
            capacity,
            drop_in_only: false,
        },
    )
    .await
    .expect("add class")
}
