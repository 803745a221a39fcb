// libs/scheduling-cell/src/services/conflict.rs
use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};

use crate::models::{SchedulingError, Slot};
use crate::services::occupancy::OccupancyIndex;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    pub fn new() -> Self {
        Self
    }

    /// Check a proposed session against the day's occupancy.
    ///
    /// The capacity gate runs first: a full date rejects every candidate,
    /// whatever slot it asks for. On success the candidate's slots are returned.
    pub fn check_candidate(
        &self,
        index: &OccupancyIndex,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
    ) -> Result<BTreeSet<Slot>, SchedulingError> {
        debug!(
            "Checking conflicts on {} at {} for {} minutes",
            date,
            start_time.format("%H:%M"),
            duration_minutes
        );

        if index.density_tier(date).is_closed() {
            warn!(
                "Date {} is at capacity ({} sessions)",
                date,
                index.session_count(date)
            );
            return Err(SchedulingError::DayCapacityExceeded {
                date,
                limit: index.max_sessions_per_day(),
            });
        }

        let slots = index.calculator().occupied_slots(start_time, duration_minutes)?;

        if let Some((slot, conflicting)) = index.first_collision(date, &slots) {
            warn!(
                "Slot {} on {} collides with session {}",
                slot, date, conflicting.session_id
            );
            return Err(SchedulingError::SlotConflict {
                date,
                slot,
                conflicting,
            });
        }

        Ok(slots)
    }

    pub fn has_conflict(
        &self,
        index: &OccupancyIndex,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
    ) -> bool {
        self.check_candidate(index, date, start_time, duration_minutes)
            .is_err()
    }

    /// Bookable starts on `date` where a session of `duration_minutes` fits.
    pub fn available_starts(
        &self,
        index: &OccupancyIndex,
        date: NaiveDate,
        duration_minutes: i32,
    ) -> Vec<Slot> {
        if index.density_tier(date).is_closed() {
            return Vec::new();
        }

        index
            .calculator()
            .bookable_starts()
            .into_iter()
            .filter(|slot| {
                !self.has_conflict(index, date, slot.start(), duration_minutes)
            })
            .collect()
    }
}
