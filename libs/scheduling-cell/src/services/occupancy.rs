// libs/scheduling-cell/src/services/occupancy.rs
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use shared_config::SchedulingPolicy;

use crate::models::{ConflictingSession, DensityTier, SchedulingError, Session, Slot};
use crate::services::slots::SlotCalculator;

/// Upper bounds (inclusive) of the Free/Low/Medium/High tiers.
const TIER_BOUNDS: [(usize, DensityTier); 4] = [
    (0, DensityTier::Free),
    (2, DensityTier::Low),
    (4, DensityTier::Medium),
    (6, DensityTier::High),
];

#[derive(Debug, Clone)]
struct OccupancyEntry {
    session: ConflictingSession,
    slots: BTreeSet<Slot>,
}

/// Per-date aggregation of scheduled sessions into occupied slots.
#[derive(Debug, Clone)]
pub struct OccupancyIndex {
    calculator: SlotCalculator,
    max_sessions_per_day: usize,
    days: BTreeMap<NaiveDate, Vec<OccupancyEntry>>,
}

impl OccupancyIndex {
    pub fn new(policy: &SchedulingPolicy) -> Self {
        Self {
            calculator: SlotCalculator::new(policy),
            max_sessions_per_day: policy.max_sessions_per_day,
            days: BTreeMap::new(),
        }
    }

    pub fn from_sessions<'a, I>(policy: &SchedulingPolicy, sessions: I) -> Result<Self, SchedulingError>
    where
        I: IntoIterator<Item = &'a Session>,
    {
        let mut index = Self::new(policy);
        for session in sessions {
            index.insert(session)?;
        }
        Ok(index)
    }

    pub fn insert(&mut self, session: &Session) -> Result<(), SchedulingError> {
        let slots = self
            .calculator
            .occupied_slots(session.start_time, session.duration_minutes)?;

        let entry = OccupancyEntry {
            session: ConflictingSession {
                session_id: session.id,
                treatment_id: session.treatment_id,
                ordinal: session.ordinal,
                start_time: session.start_time,
                end_time: session.end_time(),
            },
            slots,
        };

        let day = self.days.entry(session.scheduled_date).or_default();
        day.retain(|existing| existing.session.session_id != session.id);
        day.push(entry);
        Ok(())
    }

    /// Drops a session so it no longer claims its slots; returns whether it was present.
    pub fn remove(&mut self, session_id: Uuid) -> bool {
        let mut removed = false;
        for entries in self.days.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.session.session_id != session_id);
            removed |= entries.len() != before;
        }
        if removed {
            debug!("Removed session {} from occupancy index", session_id);
        }
        removed
    }

    pub fn is_slot_occupied(&self, date: NaiveDate, slot: Slot) -> bool {
        self.days
            .get(&date)
            .map(|entries| entries.iter().any(|entry| entry.slots.contains(&slot)))
            .unwrap_or(false)
    }

    pub fn occupied_slots(&self, date: NaiveDate) -> BTreeSet<Slot> {
        self.days
            .get(&date)
            .map(|entries| {
                entries
                    .iter()
                    .flat_map(|entry| entry.slots.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sessions booked on `date`, ordered by start time.
    pub fn sessions_on(&self, date: NaiveDate) -> Vec<ConflictingSession> {
        let mut sessions: Vec<ConflictingSession> = self
            .days
            .get(&date)
            .map(|entries| entries.iter().map(|entry| entry.session.clone()).collect())
            .unwrap_or_default();
        sessions.sort_by_key(|session| (session.start_time, session.session_id));
        sessions
    }

    pub fn session_count(&self, date: NaiveDate) -> usize {
        self.days.get(&date).map(Vec::len).unwrap_or(0)
    }

    pub fn density_tier(&self, date: NaiveDate) -> DensityTier {
        classify_density(self.session_count(date), self.max_sessions_per_day)
    }

    pub fn max_sessions_per_day(&self) -> usize {
        self.max_sessions_per_day
    }

    pub fn calculator(&self) -> &SlotCalculator {
        &self.calculator
    }

    /// Earliest-starting session whose slots intersect `slots`, with the first shared slot.
    pub fn first_collision(
        &self,
        date: NaiveDate,
        slots: &BTreeSet<Slot>,
    ) -> Option<(Slot, ConflictingSession)> {
        let entries = self.days.get(&date)?;

        entries
            .iter()
            .filter_map(|entry| {
                entry
                    .slots
                    .intersection(slots)
                    .next()
                    .map(|shared| (*shared, &entry.session))
            })
            .min_by_key(|(_, session)| (session.start_time, session.session_id))
            .map(|(slot, session)| (slot, session.clone()))
    }
}

pub fn classify_density(session_count: usize, max_sessions_per_day: usize) -> DensityTier {
    if session_count >= max_sessions_per_day {
        return DensityTier::Full;
    }

    TIER_BOUNDS
        .iter()
        .find(|(upper, _)| session_count <= *upper)
        .map(|(_, tier)| *tier)
        .unwrap_or(DensityTier::VeryHigh)
}
