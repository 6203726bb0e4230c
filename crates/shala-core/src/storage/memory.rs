use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::backend::{ClassScope, StorageBackend};
use crate::error::{Result, ShalaError};
use crate::model::*;

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<Uuid, Session>,
    classes: HashMap<Uuid, Class>,
    versions: HashMap<Uuid, u64>,
    /// Keyed by `(class_id, student_id)` so a class's entries are contiguous.
    registrations: BTreeMap<(Uuid, String), Registration>,
}

impl MemoryState {
    fn class_registrations(&self, class_id: Uuid) -> Vec<Registration> {
        self.registrations
            .range((class_id, String::new())..)
            .take_while(|((cid, _), _)| *cid == class_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn bump(&mut self, class_id: Uuid) {
        *self.versions.entry(class_id).or_insert(0) += 1;
    }
}

/// Process-local storage. Every call takes one lock, so each call is atomic;
/// the version check in `commit_registration` still detects writes that
/// landed between a snapshot and its commit.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| ShalaError::Storage(format!("failed to acquire storage lock: {e}")))
    }
}

fn by_registration_time(mut regs: Vec<Registration>) -> Vec<Registration> {
    regs.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.student.id.cmp(&b.student.id))
    });
    regs
}

impl StorageBackend for MemoryStorage {
    async fn save_session(&self, session: &Session) -> Result<()> {
        self.lock()?.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        self.lock()?
            .sessions
            .get(&id)
            .cloned()
            .ok_or(ShalaError::SessionNotFound(id))
    }

    async fn list_sessions_ending_after(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.ends_at >= now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.name.cmp(&b.name)));
        Ok(sessions)
    }

    async fn insert_class(&self, class: &Class) -> Result<()> {
        let mut state = self.lock()?;
        if !state.sessions.contains_key(&class.session_id) {
            return Err(ShalaError::SessionNotFound(class.session_id));
        }
        if state.classes.contains_key(&class.id) {
            return Err(ShalaError::Storage(format!("class {} already exists", class.id)));
        }
        state.classes.insert(class.id, class.clone());
        state.versions.insert(class.id, 0);
        Ok(())
    }

    async fn update_class(&self, class: &Class) -> Result<()> {
        let mut state = self.lock()?;
        if !state.classes.contains_key(&class.id) {
            return Err(ShalaError::ClassNotFound(class.id));
        }
        if !state.sessions.contains_key(&class.session_id) {
            return Err(ShalaError::SessionNotFound(class.session_id));
        }
        state.classes.insert(class.id, class.clone());
        state.bump(class.id);
        Ok(())
    }

    async fn get_class(&self, id: Uuid) -> Result<Class> {
        self.lock()?
            .classes
            .get(&id)
            .cloned()
            .ok_or(ShalaError::ClassNotFound(id))
    }

    async fn list_classes_in_session(&self, session_id: Uuid) -> Result<Vec<Class>> {
        Ok(self
            .lock()?
            .classes
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn delete_class_if_idle(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        if !state.classes.contains_key(&id) {
            return Err(ShalaError::ClassNotFound(id));
        }
        if occupancy(&state.class_registrations(id), now) > 0 {
            return Err(ShalaError::ClassNotEmpty(id));
        }
        state.registrations.retain(|(cid, _), _| *cid != id);
        state.versions.remove(&id);
        state.classes.remove(&id);
        Ok(())
    }

    async fn load_scope(&self, class_id: Uuid, student_id: &str) -> Result<ClassScope> {
        let state = self.lock()?;
        let class = state
            .classes
            .get(&class_id)
            .cloned()
            .ok_or(ShalaError::ClassNotFound(class_id))?;
        let version = state.versions.get(&class_id).copied().unwrap_or(0);
        let existing = state
            .registrations
            .get(&(class_id, student_id.to_string()))
            .cloned();
        Ok(ClassScope {
            class,
            version,
            existing,
            registrations: state.class_registrations(class_id),
        })
    }

    async fn commit_registration(
        &self,
        registration: &Registration,
        expected_version: u64,
    ) -> Result<()> {
        let class_id = registration.class_id;
        let mut state = self.lock()?;
        if !state.classes.contains_key(&class_id)
            || state.versions.get(&class_id).copied() != Some(expected_version)
        {
            return Err(ShalaError::Conflict(class_id));
        }
        state.registrations.insert(
            (class_id, registration.student.id.clone()),
            registration.clone(),
        );
        state.bump(class_id);
        Ok(())
    }

    async fn delete_registration(&self, class_id: Uuid, student_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state
            .registrations
            .remove(&(class_id, student_id.to_string()))
            .is_none()
        {
            return Err(ShalaError::RegistrationNotFound {
                class_id,
                student_id: student_id.to_string(),
            });
        }
        state.bump(class_id);
        Ok(())
    }

    async fn list_registrations_for_class(&self, class_id: Uuid) -> Result<Vec<Registration>> {
        Ok(by_registration_time(
            self.lock()?.class_registrations(class_id),
        ))
    }

    async fn list_registrations_by_student(&self, student_id: &str) -> Result<Vec<Registration>> {
        let regs = self
            .lock()?
            .registrations
            .values()
            .filter(|r| r.student.id == student_id)
            .cloned()
            .collect();
        Ok(by_registration_time(regs))
    }

    async fn list_registrations_by_email(&self, email: &str) -> Result<Vec<Registration>> {
        let email = email.trim();
        let regs = self
            .lock()?
            .registrations
            .values()
            .filter(|r| r.student.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        Ok(by_registration_time(regs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Weekday};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn seeded() -> (MemoryStorage, Class) {
        let storage = MemoryStorage::new();
        let session = Session::new("Spring".into(), at(0), at(1_000));
        storage.save_session(&session).await.unwrap();
        let class = Class::new(NewClass {
            session_id: session.id,
            title: "Yin".into(),
            description: String::new(),
            teacher_id: None,
            weekday: Weekday::Sun,
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            duration_minutes: 60,
            capacity: 3,
            drop_in_only: false,
        });
        storage.insert_class(&class).await.unwrap();
        (storage, class)
    }

    fn reg(class_id: Uuid, student_id: &str) -> Registration {
        Registration::new(
            class_id,
            StudentInfo {
                id: student_id.into(),
                first_name: "F".into(),
                last_name: "L".into(),
                email: format!("{student_id}@example.com"),
                phone: String::new(),
            },
            RegistrationKind::Session,
            at(1),
        )
    }

    #[tokio::test]
    async fn insert_class_requires_session() {
        let storage = MemoryStorage::new();
        let (_, class) = seeded().await;
        assert!(matches!(
            storage.insert_class(&class).await,
            Err(ShalaError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn class_registrations_do_not_leak_between_classes() {
        let (storage, class) = seeded().await;
        let mut other = class.clone();
        other.id = Uuid::now_v7();
        storage.insert_class(&other).await.unwrap();

        storage.commit_registration(&reg(class.id, "a"), 0).await.unwrap();
        storage.commit_registration(&reg(other.id, "b"), 0).await.unwrap();

        let scope = storage.load_scope(class.id, "b").await.unwrap();
        assert_eq!(scope.registrations.len(), 1);
        assert!(scope.existing.is_none());
    }

    #[tokio::test]
    async fn stale_commit_conflicts() {
        let (storage, class) = seeded().await;
        storage.commit_registration(&reg(class.id, "a"), 0).await.unwrap();
        let err = storage
            .commit_registration(&reg(class.id, "b"), 0)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            storage.list_registrations_for_class(class.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn commit_after_delete_conflicts() {
        let (storage, class) = seeded().await;
        storage.delete_class_if_idle(class.id, at(0)).await.unwrap();
        assert!(matches!(
            storage.commit_registration(&reg(class.id, "a"), 0).await,
            Err(ShalaError::Conflict(_))
        ));
    }
}
