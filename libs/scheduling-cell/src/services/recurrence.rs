// libs/scheduling-cell/src/services/recurrence.rs
use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::models::{
    ExplicitSession, RecurrenceRule, ScheduleRequest, SchedulingError, SessionCandidate,
    SessionOverride,
};

/// Calendar walk that expands a session count into concrete dates.
///
/// Generation never looks at existing bookings; the candidates it returns
/// are provisional until the scheduling service validates them under lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleGenerator;

impl ScheduleGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, request: &ScheduleRequest) -> Result<Vec<SessionCandidate>, SchedulingError> {
        if request.required_session_count <= 0 {
            return Err(SchedulingError::InvalidCount(request.required_session_count));
        }

        let accepts = weekday_mask(&request.recurrence)?;
        let overrides = index_overrides(&request.overrides, request.required_session_count)?;

        let total = request.required_session_count as usize;
        let mut candidates = Vec::with_capacity(total);
        let mut current = request.start_date;

        while candidates.len() < total {
            let weekday = current.weekday().num_days_from_sunday() as usize;

            if accepts[weekday] {
                let ordinal = candidates.len() as i32 + 1;
                let custom = overrides.get(&ordinal);

                candidates.push(SessionCandidate {
                    ordinal,
                    date: current,
                    start_time: custom
                        .and_then(|o| o.start_time)
                        .unwrap_or(request.start_time),
                    duration_minutes: custom
                        .and_then(|o| o.duration_minutes)
                        .unwrap_or(request.duration_minutes),
                    notes: custom.and_then(|o| o.notes.clone()),
                });
            }

            if candidates.len() < total {
                current = next_day(current)?;
            }
        }

        debug!(
            "Generated {} candidates from {} to {}",
            candidates.len(),
            request.start_date,
            current
        );

        Ok(candidates)
    }

    /// Number caller-supplied sessions 1..N in the order given.
    pub fn explicit_candidates(
        &self,
        sessions: &[ExplicitSession],
        default_duration_minutes: i32,
    ) -> Vec<SessionCandidate> {
        sessions
            .iter()
            .enumerate()
            .map(|(index, session)| SessionCandidate {
                ordinal: index as i32 + 1,
                date: session.date,
                start_time: session.start_time,
                duration_minutes: session.duration_minutes.unwrap_or(default_duration_minutes),
                notes: session.notes.clone(),
            })
            .collect()
    }
}

fn weekday_mask(rule: &RecurrenceRule) -> Result<[bool; 7], SchedulingError> {
    match rule {
        RecurrenceRule::Consecutive => Ok([true; 7]),
        RecurrenceRule::Weekdays { days } => {
            if days.is_empty() {
                return Err(SchedulingError::InvalidRecurrence(
                    "weekday set must not be empty".to_string(),
                ));
            }

            let mut mask = [false; 7];
            for day in days {
                let slot = mask.get_mut(*day as usize).ok_or_else(|| {
                    SchedulingError::InvalidRecurrence(format!(
                        "weekday {} is outside 0 (Sunday) ..= 6 (Saturday)",
                        day
                    ))
                })?;
                *slot = true;
            }
            Ok(mask)
        }
    }
}

fn index_overrides(
    overrides: &[SessionOverride],
    max: i32,
) -> Result<HashMap<i32, &SessionOverride>, SchedulingError> {
    let mut indexed = HashMap::with_capacity(overrides.len());
    for item in overrides {
        if item.ordinal < 1 || item.ordinal > max {
            return Err(SchedulingError::InvalidOverride {
                ordinal: item.ordinal,
                max,
            });
        }
        if indexed.insert(item.ordinal, item).is_some() {
            return Err(SchedulingError::InvalidOverride {
                ordinal: item.ordinal,
                max,
            });
        }
    }
    Ok(indexed)
}

fn next_day(date: NaiveDate) -> Result<NaiveDate, SchedulingError> {
    date.succ_opt().ok_or_else(|| {
        SchedulingError::InvalidRecurrence(format!("calendar exhausted after {}", date))
    })
}
