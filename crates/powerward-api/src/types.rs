//! Shared types for the powerwardd API

use chrono::{DateTime, Utc};
use powerward_util::{TransitionId, WallClock};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Power state of the managed host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Online,
    Offline,
}

impl PowerState {
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Which transition procedure is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    PowerOn,
    PowerOff,
}

impl Direction {
    /// Power state the procedure drives the host towards
    pub fn target(&self) -> PowerState {
        match self {
            Self::PowerOn => PowerState::Online,
            Self::PowerOff => PowerState::Offline,
        }
    }

    /// Procedure needed to reach `state`
    pub fn towards(state: PowerState) -> Self {
        match state {
            PowerState::Online => Self::PowerOn,
            PowerState::Offline => Self::PowerOff,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerOn => write!(f, "power-on"),
            Self::PowerOff => write!(f, "power-off"),
        }
    }
}

/// What started a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// Reconciliation loop saw believed != desired
    Schedule,
    /// Control-surface request
    Manual,
}

/// How much the believed power state can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Seeded from the reachability probe at startup
    Probed,
    /// The last transition's reachability poll confirmed the target state
    Verified,
    /// The last transition exhausted its reachability poll without confirmation
    Unverified,
}

/// The loop's current best guess of the host's power state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BelievedState {
    pub power: PowerState,
    pub verification: Verification,
    pub since: DateTime<Utc>,
}

impl BelievedState {
    pub fn probed(online: bool, at: DateTime<Utc>) -> Self {
        Self {
            power: PowerState::from_online(online),
            verification: Verification::Probed,
            since: at,
        }
    }
}

/// Result of a transition procedure that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Reachability matched the target after `attempts` probes
    Verified { attempts: u32 },
    /// All `attempts` probes disagreed with the target; completed best-effort
    Unverified { attempts: u32 },
}

impl TransitionOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    pub fn verification(&self) -> Verification {
        match self {
            Self::Verified { .. } => Verification::Verified,
            Self::Unverified { .. } => Verification::Unverified,
        }
    }
}

/// A best-effort step that failed without aborting its procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
}

/// Record of a completed transition procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionReport {
    pub transition_id: TransitionId,
    pub direction: Direction,
    pub trigger: TransitionTrigger,
    pub outcome: TransitionOutcome,
    #[serde(default)]
    pub step_failures: Vec<StepFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Record of a transition procedure that aborted on a fatal step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionFailure {
    pub transition_id: TransitionId,
    pub direction: Direction,
    pub trigger: TransitionTrigger,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// A transition procedure currently holding the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightTransition {
    pub transition_id: TransitionId,
    pub direction: Direction,
    pub trigger: TransitionTrigger,
    pub started_at: DateTime<Utc>,
}

/// Operating window as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub start: WallClock,
    pub end: WallClock,
    pub timezone: String,
}

impl fmt::Display for ScheduleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} {}", self.start, self.end, self.timezone)
    }
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    /// Whether the reconciliation loop is running
    pub managed: bool,
    pub believed: BelievedState,
    /// What the schedule wants right now
    pub desired: PowerState,
    pub schedule: ScheduleInfo,
    pub in_flight: Option<InFlightTransition>,
    pub last_transition: Option<TransitionReport>,
    pub last_failure: Option<TransitionFailure>,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Local admin - may trigger power transitions
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_trigger(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub managed: bool,
    pub transition_in_flight: bool,
}
