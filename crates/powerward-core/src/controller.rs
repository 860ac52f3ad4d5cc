//! Control surface: manual triggers and status queries

use chrono::{DateTime, Utc};
use powerward_api::{
    API_VERSION, Direction, HealthStatus, ServiceStateSnapshot, TransitionTrigger,
};
use powerward_util::TransitionId;
use tracing::info;

use crate::{Schedule, StateReader, TransitionExecutor, TransitionResult};

/// Manual operations that share the executor (and its guard) with the loop.
///
/// Manual procedures never write the believed state themselves; the loop
/// adopts their reports on its next tick.
#[derive(Clone)]
pub struct PowerController {
    executor: TransitionExecutor,
    schedule: Schedule,
    state: StateReader,
    managed: bool,
}

impl PowerController {
    pub fn new(
        executor: TransitionExecutor,
        schedule: Schedule,
        state: StateReader,
        managed: bool,
    ) -> Self {
        Self {
            executor,
            schedule,
            state,
            managed,
        }
    }

    /// Start the power-on procedure in the background
    pub fn trigger_power_on(&self) -> TransitionResult<TransitionId> {
        self.trigger(Direction::PowerOn)
    }

    /// Start the power-off procedure in the background
    pub fn trigger_power_off(&self) -> TransitionResult<TransitionId> {
        self.trigger(Direction::PowerOff)
    }

    fn trigger(&self, direction: Direction) -> TransitionResult<TransitionId> {
        // Acquired here so a concurrent caller sees Busy synchronously
        let permit = self.executor.try_begin(direction, TransitionTrigger::Manual)?;
        let transition_id = permit.id().clone();
        info!(transition = %transition_id.short(), %direction, "Manual transition accepted");

        let executor = self.executor.clone();
        tokio::spawn(async move {
            // Outcome is logged, recorded and broadcast by the executor
            let _ = executor.run(permit).await;
        });

        Ok(transition_id)
    }

    /// Probe the host right now
    pub async fn query_reachable(&self) -> bool {
        self.executor.gateway().probe_reachable().await
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ServiceStateSnapshot {
        let history = self.executor.history();
        ServiceStateSnapshot {
            api_version: API_VERSION,
            managed: self.managed,
            believed: self.state.current(),
            desired: self.schedule.desired_state(now),
            schedule: self.schedule.info(),
            in_flight: self.executor.in_flight(),
            last_transition: history.last_transition,
            last_failure: history.last_failure,
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            live: true,
            ready: true,
            managed: self.managed,
            transition_in_flight: self.executor.in_flight().is_some(),
        }
    }
}
