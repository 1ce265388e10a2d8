//! Rotation state carried by every certificate authority.
//!
//! The rotation protocol itself is driven by an external orchestrator. This
//! module only models its bookkeeping and checks that a stored rotation is
//! internally consistent.
//!
//! ```text
//! standby ──► init ──► update_clients ──► update_servers ──► standby
//!               │             │                  │
//!               └─────────────┴──────► rollback ─┘
//! ```
//!
//! All timestamps are [`DateTime<Utc>`]. Values deserialized with any other
//! offset are converted to the same instant in UTC, so comparisons never
//! depend on how a timestamp was written.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthorityError, AuthorityResult};

/// Whether a rotation is running.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    /// No rotation is running.
    #[default]
    Standby,
    /// A rotation is running.
    InProgress,
}

/// The step a rotation is in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    /// Only active keys are used.
    #[default]
    Standby,
    /// New keys were generated into the additional key set and are trusted.
    Init,
    /// Clients receive certificates from the new keys.
    UpdateClients,
    /// Servers receive certificates from the new keys.
    UpdateServers,
    /// The rotation is being reverted.
    Rollback,
}

impl RotationPhase {
    /// Returns the canonical string name of this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Init => "init",
            Self::UpdateClients => "update_clients",
            Self::UpdateServers => "update_servers",
            Self::Rollback => "rollback",
        }
    }
}

/// Whether phases advance on a schedule or by operator action.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// An operator advances each phase.
    #[default]
    Manual,
    /// Phases advance at the times in [`RotationSchedule`].
    Auto,
}

/// When each automatic phase transition happens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSchedule {
    /// Transition to `update_clients`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_clients: Option<DateTime<Utc>>,
    /// Transition to `update_servers`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_servers: Option<DateTime<Utc>>,
    /// Transition back to `standby`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standby: Option<DateTime<Utc>>,
}

impl RotationSchedule {
    /// Splits `grace_period` into three equal steps starting at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] when the grace period is zero
    /// or too large to represent.
    pub fn generate(now: DateTime<Utc>, grace_period: Duration) -> AuthorityResult<Self> {
        if grace_period.is_zero() {
            return Err(AuthorityError::validation("rotation grace period must be positive"));
        }
        let step = TimeDelta::from_std(grace_period / 3)
            .map_err(|_| AuthorityError::validation("rotation grace period is out of range"))?;
        let at = |n: i32| {
            step.checked_mul(n)
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| AuthorityError::validation("rotation schedule overflows"))
        };
        Ok(Self { update_clients: Some(at(1)?), update_servers: Some(at(2)?), standby: Some(at(3)?) })
    }

    /// Checks that scheduled transitions are in phase order.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] naming the first out-of-order
    /// transition.
    pub fn check(&self) -> AuthorityResult<()> {
        if let (Some(clients), Some(servers)) = (self.update_clients, self.update_servers) {
            if servers < clients {
                return Err(AuthorityError::validation(
                    "phase update_servers can not be scheduled before update_clients",
                ));
            }
        }
        if let (Some(servers), Some(standby)) = (self.update_servers, self.standby) {
            if standby < servers {
                return Err(AuthorityError::validation(
                    "phase standby can not be scheduled before update_servers",
                ));
            }
        }
        Ok(())
    }
}

/// Rotation bookkeeping of one authority.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Rotation {
    /// Whether a rotation is running.
    #[serde(default)]
    #[builder(default)]
    pub state: RotationState,

    /// Current phase.
    #[serde(default)]
    #[builder(default)]
    pub phase: RotationPhase,

    /// Manual or scheduled advancement.
    #[serde(default)]
    #[builder(default)]
    pub mode: RotationMode,

    /// Identifier of the current rotation, empty when none ever ran.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[builder(default, into)]
    pub current_id: String,

    /// When the current rotation started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,

    /// How long previously issued certificates stay trusted.
    #[serde(with = "humantime_serde", default)]
    #[builder(default)]
    pub grace_period: Duration,

    /// When the last rotation completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotated: Option<DateTime<Utc>>,

    /// Automatic transition times.
    #[serde(default)]
    #[builder(default)]
    pub schedule: RotationSchedule,
}

impl Rotation {
    /// Returns `true` when a rotation is running.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.state == RotationState::InProgress
    }

    /// Checks that state, phase and schedule agree.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] when a standby rotation is in
    /// a non-standby phase, a running rotation is in the standby phase or
    /// has no start time, or the schedule is out of order.
    pub fn check(&self) -> AuthorityResult<()> {
        match (self.state, self.phase) {
            (RotationState::Standby, RotationPhase::Standby) => {},
            (RotationState::Standby, phase) => {
                return Err(AuthorityError::validation(format!(
                    "rotation in standby state can not be in phase {}",
                    phase.as_str()
                )));
            },
            (RotationState::InProgress, RotationPhase::Standby) => {
                return Err(AuthorityError::validation(
                    "rotation in progress can not be in phase standby",
                ));
            },
            (RotationState::InProgress, _) => {
                if self.started.is_none() {
                    return Err(AuthorityError::validation(
                        "rotation in progress is missing its start time",
                    ));
                }
            },
        }
        self.schedule.check()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    #[test]
    fn test_default_is_consistent() {
        let rotation = Rotation::default();
        assert!(!rotation.is_in_progress());
        assert!(rotation.check().is_ok());
    }

    #[test]
    fn test_generate_schedule_thirds() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let schedule = RotationSchedule::generate(now, Duration::from_secs(3 * 3600)).unwrap();
        assert_eq!(schedule.update_clients, Some(now + TimeDelta::hours(1)));
        assert_eq!(schedule.update_servers, Some(now + TimeDelta::hours(2)));
        assert_eq!(schedule.standby, Some(now + TimeDelta::hours(3)));
        assert!(schedule.check().is_ok());
    }

    #[test]
    fn test_generate_rejects_zero_grace() {
        assert!(RotationSchedule::generate(Utc::now(), Duration::ZERO).is_err());
    }

    #[test]
    fn test_schedule_out_of_order() {
        let now = Utc::now();
        let schedule = RotationSchedule {
            update_clients: Some(now),
            update_servers: Some(now - TimeDelta::minutes(1)),
            standby: None,
        };
        assert!(schedule.check().unwrap_err().to_string().contains("update_servers"));
    }

    #[test]
    fn test_phase_state_mismatch() {
        let rotation = Rotation::builder().phase(RotationPhase::Init).build();
        assert!(rotation.check().is_err());

        let running = Rotation::builder().state(RotationState::InProgress).build();
        assert!(running.check().is_err());

        let started = Rotation::builder()
            .state(RotationState::InProgress)
            .phase(RotationPhase::UpdateClients)
            .started(Utc::now())
            .build();
        assert!(started.check().is_ok());
    }

    #[test]
    fn test_offset_timestamps_normalize_to_utc() {
        let offset = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap();
        let rotation = Rotation::builder().last_rotated(local.with_timezone(&Utc)).build();

        let json = r#"{"last_rotated":"2024-03-01T15:30:00+05:30","grace_period":"0s"}"#;
        let decoded: Rotation = serde_json::from_str(json).unwrap();

        assert_eq!(decoded, rotation);
        assert_eq!(decoded.last_rotated.unwrap().to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_serde_names() {
        let rotation = Rotation::builder()
            .state(RotationState::InProgress)
            .phase(RotationPhase::UpdateServers)
            .mode(RotationMode::Auto)
            .grace_period(Duration::from_secs(30 * 3600))
            .build();
        let json = serde_json::to_string(&rotation).unwrap();
        assert!(json.contains("\"state\":\"in_progress\""));
        assert!(json.contains("\"phase\":\"update_servers\""));
        assert!(json.contains("\"mode\":\"auto\""));
        let back: Rotation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.grace_period, Duration::from_secs(30 * 3600));
    }
}
