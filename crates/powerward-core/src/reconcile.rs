//! Reconciliation loop: keeps believed power state aligned with the schedule

use chrono::{DateTime, Utc};
use powerward_api::{
    BelievedState, Direction, PowerState, TransitionReport, TransitionTrigger, Verification,
};
use powerward_host_api::HostGateway;
use powerward_util::TransitionId;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{CoreEvent, Schedule, StateWriter, TransitionError, TransitionExecutor};

/// What a single tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Believed and desired state agree
    InSync,
    /// A procedure ran to completion and the believed state was updated
    Transitioned(TransitionReport),
    /// A manual override is in effect until the schedule next changes
    Held,
    /// The procedure failed but a follow-up check showed the host already
    /// in the target state
    Observed(PowerState),
    /// A procedure aborted; believed state unchanged, retried next tick
    Failed,
    /// Another procedure holds the guard; retried next tick
    Busy,
}

/// Probe the host once to seed the believed state at startup
pub async fn seed_believed_state(gateway: &dyn HostGateway, now: DateTime<Utc>) -> BelievedState {
    let online = gateway.probe_reachable().await;
    info!(online, "Seeded believed state from startup probe");
    BelievedState::probed(online, now)
}

/// Manual results taken over by the loop
#[derive(Debug, Default)]
struct ManualOverride {
    /// Last manual transition already folded into the believed state
    adopted: Option<TransitionId>,
    /// Desired state at adoption time; reconciliation is suspended while
    /// the schedule still asks for it
    hold: Option<PowerState>,
}

/// Long-lived control loop. Owns the only writer of the believed state.
///
/// Manual procedures run outside the loop. Their completed reports are
/// picked up on the next tick and override the schedule until the desired
/// state next changes.
pub struct Reconciler {
    schedule: Schedule,
    executor: TransitionExecutor,
    state: StateWriter,
    poll_interval: Duration,
    manual: Mutex<ManualOverride>,
}

impl Reconciler {
    pub fn new(
        schedule: Schedule,
        executor: TransitionExecutor,
        state: StateWriter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            schedule,
            executor,
            state,
            poll_interval,
            manual: Mutex::new(ManualOverride::default()),
        }
    }

    pub fn state(&self) -> &StateWriter {
        &self.state
    }

    /// Compare believed and desired state once, running a procedure on mismatch
    pub async fn reconcile_once(&self, now: DateTime<Utc>) -> TickOutcome {
        let desired = self.schedule.desired_state(now);
        if self.adopt_manual(desired) {
            return TickOutcome::Held;
        }

        let believed = self.state.current();
        if believed.power == desired {
            debug!(state = %believed.power, "In sync with schedule");
            return TickOutcome::InSync;
        }

        let direction = Direction::towards(desired);
        info!(
            believed = %believed.power,
            desired = %desired,
            %direction,
            "Believed state differs from schedule"
        );

        let result = match direction {
            Direction::PowerOn => self.executor.power_on(TransitionTrigger::Schedule).await,
            Direction::PowerOff => self.executor.power_off(TransitionTrigger::Schedule).await,
        };

        match result {
            Ok(report) => {
                self.write_state(BelievedState {
                    power: direction.target(),
                    verification: report.outcome.verification(),
                    since: report.finished_at,
                });
                TickOutcome::Transitioned(report)
            }
            Err(TransitionError::Busy {
                direction: running, ..
            }) => {
                debug!(%running, "Procedure already running, retrying next tick");
                TickOutcome::Busy
            }
            Err(TransitionError::PowerOffFailed(e)) if e.is_connectivity() => {
                // A host that cannot be reached may simply be off already
                if self.executor.gateway().probe_reachable().await {
                    warn!(error = %e, "Power-off failed, host still reachable; retrying next tick");
                    return TickOutcome::Failed;
                }
                info!(error = %e, "Power-off failed but host is unreachable; treating as offline");
                self.write_state(BelievedState {
                    power: PowerState::Offline,
                    verification: Verification::Verified,
                    since: powerward_util::now(),
                });
                TickOutcome::Observed(PowerState::Offline)
            }
            Err(e) => {
                warn!(error = %e, "Believed state unchanged, retrying next tick");
                TickOutcome::Failed
            }
        }
    }

    /// Fold a finished manual procedure into the believed state and report
    /// whether an override currently suspends reconciliation.
    fn adopt_manual(&self, desired: PowerState) -> bool {
        let adopted = {
            let mut manual = self.manual.lock().unwrap_or_else(|e| e.into_inner());

            let adopted = match self.executor.history().last_transition {
                Some(report)
                    if report.trigger == TransitionTrigger::Manual
                        && manual.adopted.as_ref() != Some(&report.transition_id) =>
                {
                    manual.adopted = Some(report.transition_id.clone());
                    manual.hold = Some(desired);
                    Some(report)
                }
                _ => None,
            };

            if manual.hold.is_some_and(|held| held != desired) {
                debug!(%desired, "Schedule changed, manual override released");
                manual.hold = None;
            }
            if manual.hold.is_some() && adopted.is_none() {
                let believed = self.state.current().power;
                if believed != desired {
                    debug!(%believed, %desired, "Manual override in effect");
                    return true;
                }
            }
            adopted
        };

        let Some(report) = adopted else {
            return false;
        };
        let power = report.direction.target();
        info!(
            transition_id = %report.transition_id,
            %power,
            "Adopting result of manual procedure"
        );
        self.write_state(BelievedState {
            power,
            verification: report.outcome.verification(),
            since: report.finished_at,
        });
        power != desired
    }

    /// Tick every poll interval until `shutdown` flips to true.
    ///
    /// A procedure in progress is finished before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            schedule = %self.schedule.info(),
            "Reconciliation loop started"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.reconcile_once(powerward_util::now()).await;
                }
            }
        }

        info!("Reconciliation loop stopped");
    }

    fn write_state(&self, state: BelievedState) {
        let power = state.power;
        let verification = state.verification;
        if self.state.set(state.clone()) {
            info!(%power, ?verification, "Believed state updated");
            self.executor.emit(CoreEvent::BelievedStateChanged(state));
        }
    }
}
