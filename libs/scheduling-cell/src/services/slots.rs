// libs/scheduling-cell/src/services/slots.rs
use std::collections::BTreeSet;

use chrono::{Duration, NaiveTime, Timelike};

use shared_config::SchedulingPolicy;

use crate::models::{SchedulingError, Slot};

/// Pure slot arithmetic over the clinic's opening hours.
#[derive(Debug, Clone)]
pub struct SlotCalculator {
    open_time: NaiveTime,
    close_time: NaiveTime,
    slot_minutes: u32,
}

impl SlotCalculator {
    pub fn new(policy: &SchedulingPolicy) -> Self {
        Self {
            open_time: policy.open_time,
            close_time: policy.close_time,
            slot_minutes: policy.slot_minutes.max(1),
        }
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    /// Slots covered by a session, ceiling to the granularity.
    pub fn occupied_slots(
        &self,
        start_time: NaiveTime,
        duration_minutes: i32,
    ) -> Result<BTreeSet<Slot>, SchedulingError> {
        self.validate_duration(duration_minutes)?;
        self.validate_start(start_time)?;

        let count = self.slot_count(duration_minutes);
        let mut slots = BTreeSet::new();

        for index in 0..count {
            let offset = Duration::minutes(i64::from(index * self.slot_minutes));
            let (slot_start, wrapped) = start_time.overflowing_add_signed(offset);
            if wrapped != 0 {
                return Err(SchedulingError::InvalidDuration(duration_minutes));
            }
            slots.insert(Slot::new(slot_start));
        }

        Ok(slots)
    }

    pub fn end_time(
        &self,
        start_time: NaiveTime,
        duration_minutes: i32,
    ) -> Result<NaiveTime, SchedulingError> {
        self.validate_duration(duration_minutes)?;
        self.ensure_within_hours(start_time)?;

        let (end, wrapped) =
            start_time.overflowing_add_signed(Duration::minutes(i64::from(duration_minutes)));
        if wrapped != 0 {
            return Err(SchedulingError::InvalidDuration(duration_minutes));
        }
        Ok(end)
    }

    /// Every start the clinic accepts, open through close inclusive.
    pub fn bookable_starts(&self) -> Vec<Slot> {
        let mut starts = Vec::new();
        let step = Duration::minutes(i64::from(self.slot_minutes));
        let mut current = self.open_time;

        while current <= self.close_time {
            starts.push(Slot::new(current));
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 || next <= current {
                break;
            }
            current = next;
        }

        starts
    }

    pub fn validate_start(&self, start_time: NaiveTime) -> Result<(), SchedulingError> {
        self.ensure_within_hours(start_time)?;

        let since_open = (start_time - self.open_time).num_minutes();
        let aligned = start_time.second() == 0
            && start_time.nanosecond() == 0
            && since_open % i64::from(self.slot_minutes) == 0;

        if !aligned {
            return Err(SchedulingError::MisalignedStart(start_time));
        }
        Ok(())
    }

    fn ensure_within_hours(&self, start_time: NaiveTime) -> Result<(), SchedulingError> {
        if start_time < self.open_time || start_time > self.close_time {
            return Err(SchedulingError::OutOfHours(start_time));
        }
        Ok(())
    }

    fn validate_duration(&self, duration_minutes: i32) -> Result<(), SchedulingError> {
        if duration_minutes <= 0 {
            return Err(SchedulingError::InvalidDuration(duration_minutes));
        }
        Ok(())
    }

    fn slot_count(&self, duration_minutes: i32) -> u32 {
        (duration_minutes as u32).div_ceil(self.slot_minutes)
    }
}
