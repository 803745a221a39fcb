// libs/scheduling-cell/tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use scheduling_cell::models::{AttendanceState, Package, Session, Treatment};
use scheduling_cell::services::SchedulingService;
use scheduling_cell::store::{InMemoryStore, SessionStore, TreatmentDirectory};
use shared_config::SchedulingPolicy;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn package(required_sessions: i32, duration_minutes: Option<i32>) -> Package {
    Package {
        id: Uuid::new_v4(),
        name: format!("{} session package", required_sessions),
        required_session_count: required_sessions,
        session_duration_minutes: duration_minutes,
    }
}

/// A pending session not tied to any registered treatment.
pub fn session_at(on: NaiveDate, start: NaiveTime, duration_minutes: i32) -> Session {
    Session {
        id: Uuid::new_v4(),
        treatment_id: Uuid::new_v4(),
        ordinal: 1,
        scheduled_date: on,
        start_time: start,
        duration_minutes,
        attendance: AttendanceState::Pending,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Eight back-to-back 30 minute sessions from 08:00, filling the daily ceiling.
pub fn full_day(on: NaiveDate) -> Vec<Session> {
    (0..8)
        .map(|i| session_at(on, time(8 + i / 2, (i % 2) * 30), 30))
        .collect()
}

// ==============================================================================
// FAULT INJECTION
// ==============================================================================

/// Delegates to an `InMemoryStore`, failing writes or shifting dates on demand.
///
/// A drifting read reports the session a few days later than stored, each
/// read further than the last, so it looks like a concurrent reschedule.
#[derive(Debug)]
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    pub fail_treatment_updates: AtomicBool,
    pub fail_session_deletes: AtomicBool,
    pub session_drifts: AtomicUsize,
    pub treatment_drifts: AtomicUsize,
    shift: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_treatment_updates: AtomicBool::new(false),
            fail_session_deletes: AtomicBool::new(false),
            session_drifts: AtomicUsize::new(0),
            treatment_drifts: AtomicUsize::new(0),
            shift: AtomicUsize::new(0),
        }
    }

    fn drift(&self, remaining: &AtomicUsize) -> Option<Duration> {
        remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| Duration::days(self.shift.fetch_add(1, Ordering::SeqCst) as i64 + 1))
    }
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn load_sessions_for_date(&self, date: NaiveDate) -> Result<Vec<Session>> {
        self.inner.load_sessions_for_date(date).await
    }

    async fn load_sessions_for_treatment(&self, treatment_id: Uuid) -> Result<Vec<Session>> {
        let mut sessions = self.inner.load_sessions_for_treatment(treatment_id).await?;
        if let Some(offset) = self.drift(&self.treatment_drifts) {
            for session in &mut sessions {
                session.scheduled_date = session.scheduled_date + offset;
            }
        }
        Ok(sessions)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let mut session = self.inner.load_session(session_id).await?;
        if let Some(found) = session.as_mut() {
            if let Some(offset) = self.drift(&self.session_drifts) {
                found.scheduled_date = found.scheduled_date + offset;
            }
        }
        Ok(session)
    }

    async fn insert_sessions(&self, sessions: &[Session]) -> Result<Vec<Uuid>> {
        self.inner.insert_sessions(sessions).await
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        self.inner.update_session(session).await
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.inner.delete_session(session_id).await
    }

    async fn delete_sessions(&self, session_ids: &[Uuid]) -> Result<()> {
        if self.fail_session_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("session storage unavailable"));
        }
        self.inner.delete_sessions(session_ids).await
    }
}

#[async_trait]
impl TreatmentDirectory for FaultyStore {
    async fn load_treatment(&self, treatment_id: Uuid) -> Result<Option<Treatment>> {
        self.inner.load_treatment(treatment_id).await
    }

    async fn update_treatment(&self, treatment: &Treatment) -> Result<()> {
        if self.fail_treatment_updates.load(Ordering::SeqCst) {
            return Err(anyhow!("treatment directory unavailable"));
        }
        self.inner.update_treatment(treatment).await
    }
}

// ==============================================================================
// SERVICE SETUP
// ==============================================================================

pub struct TestSetup {
    pub store: Arc<InMemoryStore>,
    pub faults: Arc<FaultyStore>,
    pub service: Arc<SchedulingService>,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_policy(SchedulingPolicy::default())
    }

    pub fn with_policy(policy: SchedulingPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let service = Arc::new(SchedulingService::with_policy(
            policy,
            faults.clone(),
            faults.clone(),
        ));
        Self {
            store,
            faults,
            service,
        }
    }

    pub async fn treatment(&self, required_sessions: i32, duration_minutes: Option<i32>) -> Uuid {
        let treatment = Treatment::new(
            Uuid::new_v4(),
            package(required_sessions, duration_minutes),
            None,
        );
        self.store.register_treatment(treatment).await
    }

    pub async fn seed(&self, sessions: &[Session]) {
        self.store.insert_sessions(sessions).await.unwrap();
    }
}

/// Stored status of a treatment, bypassing the service.
pub async fn stored_status(store: &InMemoryStore, treatment_id: Uuid) -> scheduling_cell::models::TreatmentStatus {
    store.load_treatment(treatment_id).await.unwrap().unwrap().status
}
