use std::env;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    /// JSON array of treatments loaded into the store at startup.
    pub treatments_file: Option<String>,
    pub scheduling: SchedulingPolicy,
}

/// Clinic-wide booking rules shared by every scheduling operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingPolicy {
    /// First bookable start time.
    pub open_time: NaiveTime,
    /// Last bookable start time (inclusive).
    pub close_time: NaiveTime,
    pub slot_minutes: u32,
    /// Hard ceiling; a date holding this many sessions is closed to new bookings.
    pub max_sessions_per_day: usize,
    pub default_session_minutes: i32,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            open_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            close_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_minutes: 30,
            max_sessions_per_day: 8,
            default_session_minutes: 30,
        }
    }
}

impl SchedulingPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.open_time >= self.close_time {
            return Err(format!(
                "open time {} must be before close time {}",
                self.open_time.format("%H:%M"),
                self.close_time.format("%H:%M")
            ));
        }
        if self.slot_minutes == 0 {
            return Err("slot granularity must be positive".to_string());
        }
        if self.max_sessions_per_day == 0 {
            return Err("daily session ceiling must be positive".to_string());
        }
        if self.default_session_minutes <= 0 {
            return Err("default session duration must be positive".to_string());
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingPolicy::default();

        let scheduling = SchedulingPolicy {
            open_time: time_var("CLINIC_OPEN_TIME", defaults.open_time),
            close_time: time_var("CLINIC_CLOSE_TIME", defaults.close_time),
            slot_minutes: parsed_var("SLOT_MINUTES", defaults.slot_minutes),
            max_sessions_per_day: parsed_var("MAX_SESSIONS_PER_DAY", defaults.max_sessions_per_day),
            default_session_minutes: parsed_var("DEFAULT_SESSION_MINUTES", defaults.default_session_minutes),
        };

        let scheduling = match scheduling.validate() {
            Ok(()) => scheduling,
            Err(reason) => {
                warn!("Invalid scheduling policy ({}), using defaults", reason);
                defaults
            }
        };

        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| {
                warn!("BIND_ADDRESS not set, using default");
                "0.0.0.0:3000".to_string()
            }),
            treatments_file: env::var("TREATMENTS_FILE").ok().filter(|path| !path.trim().is_empty()),
            scheduling,
        }
    }
}

fn time_var(name: &str, default: NaiveTime) -> NaiveTime {
    match env::var(name) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            warn!("{} is not a valid HH:MM time ({}), using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parsed_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} could not be parsed ({}), using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_clinic_hours() {
        let policy = SchedulingPolicy::default();
        assert_eq!(policy.open_time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(policy.close_time, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert_eq!(policy.slot_minutes, 30);
        assert_eq!(policy.max_sessions_per_day, 8);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn policy_rejects_inverted_hours() {
        let policy = SchedulingPolicy {
            open_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            ..SchedulingPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_rejects_zero_capacity() {
        let policy = SchedulingPolicy {
            max_sessions_per_day: 0,
            ..SchedulingPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
