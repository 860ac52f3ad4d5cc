//! Event types for powerwardd -> client streaming

use chrono::{DateTime, Utc};
use powerward_util::TransitionId;
use serde::{Deserialize, Serialize};

use crate::{
    BelievedState, Direction, TransitionFailure, TransitionReport, TransitionTrigger, API_VERSION,
};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: powerward_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A procedure acquired the host and is about to issue its first step
    TransitionStarted {
        transition_id: TransitionId,
        direction: Direction,
        trigger: TransitionTrigger,
    },

    /// A procedure ran to completion (verified or not)
    TransitionFinished(TransitionReport),

    /// A procedure aborted on a fatal step
    TransitionFailed(TransitionFailure),

    /// The reconciliation loop updated its believed state
    BelievedStateChanged(BelievedState),

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PowerState, Verification};

    #[test]
    fn started_event_wire_format() {
        let event = Event::new(EventPayload::TransitionStarted {
            transition_id: TransitionId::new(),
            direction: Direction::PowerOn,
            trigger: TransitionTrigger::Schedule,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"transition_started\""));
        assert!(json.contains("\"direction\":\"power_on\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
    }

    #[test]
    fn believed_state_event_keeps_verification() {
        let event = Event::new(EventPayload::BelievedStateChanged(BelievedState {
            power: PowerState::Offline,
            verification: Verification::Unverified,
            since: powerward_util::now(),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            EventPayload::BelievedStateChanged(state) => {
                assert_eq!(state.power, PowerState::Offline);
                assert_eq!(state.verification, Verification::Unverified);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
