// libs/scheduling-cell/src/store.rs
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Session, Treatment};

/// Durable session storage used by the scheduling service.
///
/// `insert_sessions` and `delete_sessions` must be all-or-nothing.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_sessions_for_date(&self, date: NaiveDate) -> Result<Vec<Session>>;
    async fn load_sessions_for_treatment(&self, treatment_id: Uuid) -> Result<Vec<Session>>;
    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>>;
    async fn insert_sessions(&self, sessions: &[Session]) -> Result<Vec<Uuid>>;
    async fn update_session(&self, session: &Session) -> Result<()>;
    async fn delete_session(&self, session_id: Uuid) -> Result<()>;
    async fn delete_sessions(&self, session_ids: &[Uuid]) -> Result<()>;
}

/// Resolves a treatment together with its package.
#[async_trait]
pub trait TreatmentDirectory: Send + Sync {
    async fn load_treatment(&self, treatment_id: Uuid) -> Result<Option<Treatment>>;
    async fn update_treatment(&self, treatment: &Treatment) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    treatments: RwLock<HashMap<Uuid, Treatment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_treatment(&self, treatment: Treatment) -> Uuid {
        let id = treatment.id;
        self.treatments.write().await.insert(id, treatment);
        debug!("Registered treatment {}", id);
        id
    }

    /// Register every treatment in a JSON array; returns how many were loaded.
    pub async fn seed_treatments(&self, json: &str) -> Result<usize> {
        let treatments: Vec<Treatment> = serde_json::from_str(json)
            .map_err(|e| anyhow!("Invalid treatment fixture: {}", e))?;

        let count = treatments.len();
        let mut stored = self.treatments.write().await;
        for treatment in treatments {
            stored.insert(treatment.id, treatment);
        }

        debug!("Seeded {} treatments", count);
        Ok(count)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load_sessions_for_date(&self, date: NaiveDate) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<Session> = sessions
            .values()
            .filter(|session| session.scheduled_date == date)
            .cloned()
            .collect();
        found.sort_by_key(|session| (session.start_time, session.id));
        Ok(found)
    }

    async fn load_sessions_for_treatment(&self, treatment_id: Uuid) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<Session> = sessions
            .values()
            .filter(|session| session.treatment_id == treatment_id)
            .cloned()
            .collect();
        found.sort_by_key(|session| session.ordinal);
        Ok(found)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn insert_sessions(&self, new_sessions: &[Session]) -> Result<Vec<Uuid>> {
        let mut sessions = self.sessions.write().await;

        if let Some(duplicate) = new_sessions.iter().find(|s| sessions.contains_key(&s.id)) {
            return Err(anyhow!("Session {} already exists", duplicate.id));
        }

        let ids = new_sessions
            .iter()
            .map(|session| {
                sessions.insert(session.id, session.clone());
                session.id
            })
            .collect();

        Ok(ids)
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(anyhow!("Resource not found: session {}", session.id)),
        }
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("Resource not found: session {}", session_id))
    }

    async fn delete_sessions(&self, session_ids: &[Uuid]) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(missing) = session_ids.iter().find(|id| !sessions.contains_key(id)) {
            return Err(anyhow!("Resource not found: session {}", missing));
        }
        for id in session_ids {
            sessions.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl TreatmentDirectory for InMemoryStore {
    async fn load_treatment(&self, treatment_id: Uuid) -> Result<Option<Treatment>> {
        Ok(self.treatments.read().await.get(&treatment_id).cloned())
    }

    async fn update_treatment(&self, treatment: &Treatment) -> Result<()> {
        let mut treatments = self.treatments.write().await;
        match treatments.get_mut(&treatment.id) {
            Some(existing) => {
                *existing = treatment.clone();
                Ok(())
            }
            None => Err(anyhow!("Resource not found: treatment {}", treatment.id)),
        }
    }
}
