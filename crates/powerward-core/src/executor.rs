//! Power-on and power-off procedures

use powerward_api::{
    Direction, InFlightTransition, StepFailure, TransitionFailure, TransitionOutcome,
    TransitionReport, TransitionTrigger,
};
use powerward_config::{RetryPolicy, ShutdownPolicy};
use powerward_host_api::{GatewayError, HostGateway, MacAddress, RemoteCommand};
use powerward_util::TransitionId;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use crate::{CoreEvent, FlightPermit, SingleFlight};

/// Fatal procedure errors
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("{direction} {transition_id} is already in progress")]
    Busy {
        direction: Direction,
        transition_id: TransitionId,
    },

    #[error("Wake signal could not be sent: {0}")]
    WakeFailed(#[source] GatewayError),

    #[error("Power-off command failed: {0}")]
    PowerOffFailed(#[source] GatewayError),
}

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Last outcomes, kept for status queries
#[derive(Debug, Clone, Default)]
pub struct TransitionHistory {
    pub last_transition: Option<TransitionReport>,
    pub last_failure: Option<TransitionFailure>,
}

/// Runs transition procedures against the managed host.
///
/// Cheap to clone; clones share the gateway, the single-flight guard and
/// the history.
#[derive(Clone)]
pub struct TransitionExecutor {
    gateway: Arc<dyn HostGateway>,
    hardware: MacAddress,
    retry: RetryPolicy,
    shutdown: ShutdownPolicy,
    guard: SingleFlight,
    history: Arc<Mutex<TransitionHistory>>,
    events: mpsc::UnboundedSender<CoreEvent>,
}

impl TransitionExecutor {
    pub fn new(
        gateway: Arc<dyn HostGateway>,
        hardware: MacAddress,
        retry: RetryPolicy,
        shutdown: ShutdownPolicy,
        events: mpsc::UnboundedSender<CoreEvent>,
    ) -> Self {
        Self {
            gateway,
            hardware,
            retry,
            shutdown,
            guard: SingleFlight::new(),
            history: Arc::new(Mutex::new(TransitionHistory::default())),
            events,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn HostGateway> {
        &self.gateway
    }

    pub fn in_flight(&self) -> Option<InFlightTransition> {
        self.guard.current()
    }

    pub fn history(&self) -> TransitionHistory {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn emit(&self, event: CoreEvent) {
        // Receiver is gone only during shutdown
        let _ = self.events.send(event);
    }

    /// Acquire the single-flight guard without starting anything
    pub fn try_begin(
        &self,
        direction: Direction,
        trigger: TransitionTrigger,
    ) -> TransitionResult<FlightPermit> {
        self.guard.try_acquire(direction, trigger).ok_or_else(|| {
            let current = self.guard.current();
            TransitionError::Busy {
                direction: current.as_ref().map_or(direction, |c| c.direction),
                transition_id: current.map(|c| c.transition_id).unwrap_or_default(),
            }
        })
    }

    pub async fn power_on(&self, trigger: TransitionTrigger) -> TransitionResult<TransitionReport> {
        let permit = self.try_begin(Direction::PowerOn, trigger)?;
        self.run(permit).await
    }

    pub async fn power_off(
        &self,
        trigger: TransitionTrigger,
    ) -> TransitionResult<TransitionReport> {
        let permit = self.try_begin(Direction::PowerOff, trigger)?;
        self.run(permit).await
    }

    /// Run the procedure the permit was acquired for, releasing the guard at the end
    pub async fn run(&self, permit: FlightPermit) -> TransitionResult<TransitionReport> {
        let info = permit.info().clone();
        let id = info.transition_id.short();
        info!(
            transition = %id,
            direction = %info.direction,
            trigger = ?info.trigger,
            "Transition started"
        );
        self.emit(CoreEvent::TransitionStarted(info.clone()));

        let mut step_failures = Vec::new();
        let result = match info.direction {
            Direction::PowerOn => self.run_power_on(&id, &mut step_failures).await,
            Direction::PowerOff => self.run_power_off(&id, &mut step_failures).await,
        };
        drop(permit);

        let finished_at = powerward_util::now();
        match result {
            Ok(outcome) => {
                info!(
                    transition = %id,
                    direction = %info.direction,
                    ?outcome,
                    step_failures = step_failures.len(),
                    "Transition finished"
                );
                let report = TransitionReport {
                    transition_id: info.transition_id,
                    direction: info.direction,
                    trigger: info.trigger,
                    outcome,
                    step_failures,
                    started_at: info.started_at,
                    finished_at,
                };
                self.record(|h| h.last_transition = Some(report.clone()));
                self.emit(CoreEvent::TransitionFinished(report.clone()));
                Ok(report)
            }
            Err(e) => {
                error!(
                    transition = %id,
                    direction = %info.direction,
                    error = %e,
                    "Transition aborted"
                );
                let failure = TransitionFailure {
                    transition_id: info.transition_id,
                    direction: info.direction,
                    trigger: info.trigger,
                    error: e.to_string(),
                    at: finished_at,
                };
                self.record(|h| h.last_failure = Some(failure.clone()));
                self.emit(CoreEvent::TransitionFailed(failure));
                Err(e)
            }
        }
    }

    async fn run_power_on(
        &self,
        id: &str,
        step_failures: &mut Vec<StepFailure>,
    ) -> TransitionResult<TransitionOutcome> {
        info!(transition = %id, hardware = %self.hardware, "Sending wake signal");
        self.gateway
            .send_wake_signal(&self.hardware)
            .await
            .map_err(TransitionError::WakeFailed)?;

        let outcome = self.verify_reachability(id, true).await;

        // Issued regardless of verification
        self.best_effort(id, RemoteCommand::ExitMaintenanceMode, step_failures)
            .await;
        self.best_effort(id, RemoteCommand::BootAllVms, step_failures)
            .await;

        Ok(outcome)
    }

    async fn run_power_off(
        &self,
        id: &str,
        step_failures: &mut Vec<StepFailure>,
    ) -> TransitionResult<TransitionOutcome> {
        self.best_effort(id, RemoteCommand::ShutdownAllVms, step_failures)
            .await;
        self.wait_for_guests(id).await;
        self.best_effort(id, RemoteCommand::EnterMaintenanceMode, step_failures)
            .await;

        info!(transition = %id, "Powering off host");
        self.gateway
            .run_remote_command(RemoteCommand::PowerOff)
            .await
            .map_err(TransitionError::PowerOffFailed)?;

        Ok(self.verify_reachability(id, false).await)
    }

    /// Run a step whose failure is logged and recorded but never aborts
    async fn best_effort(
        &self,
        id: &str,
        command: RemoteCommand,
        step_failures: &mut Vec<StepFailure>,
    ) {
        debug!(transition = %id, step = %command, "Running step");
        if let Err(e) = self.gateway.run_remote_command(command).await {
            warn!(transition = %id, step = %command, error = %e, "Step failed, continuing");
            step_failures.push(StepFailure {
                step: command.step_name().to_string(),
                error: e.to_string(),
            });
        }
    }

    /// Probe until reachability equals `target` or attempts run out
    async fn verify_reachability(&self, id: &str, target: bool) -> TransitionOutcome {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if self.gateway.probe_reachable().await == target {
                info!(transition = %id, attempt, reachable = target, "Host reached target state");
                return TransitionOutcome::Verified { attempts: attempt };
            }
            if attempt < max_attempts {
                debug!(
                    transition = %id,
                    attempt,
                    delay_secs = self.retry.delay.as_secs(),
                    "Host not yet in target state, retrying"
                );
                sleep(self.retry.delay).await;
            }
        }

        warn!(
            transition = %id,
            attempts = max_attempts,
            delay_secs = self.retry.delay.as_secs(),
            expected_reachable = target,
            "Host never reached target state, continuing unverified"
        );
        TransitionOutcome::Unverified {
            attempts: max_attempts,
        }
    }

    /// Give guests time to stop: poll running VMs when the gateway can
    /// count them, otherwise wait out the whole grace period.
    async fn wait_for_guests(&self, id: &str) {
        let deadline = Instant::now() + self.shutdown.grace_period;

        loop {
            match self.gateway.running_vm_count().await {
                Ok(Some(0)) => {
                    info!(transition = %id, "All VMs stopped");
                    return;
                }
                Ok(Some(running)) => {
                    debug!(transition = %id, running, "Waiting for VMs to stop");
                }
                Ok(None) => {
                    debug!(
                        transition = %id,
                        grace_secs = self.shutdown.grace_period.as_secs(),
                        "Waiting guest grace period"
                    );
                    sleep_until(deadline).await;
                    return;
                }
                Err(e) => {
                    warn!(transition = %id, error = %e, "Cannot list VM states, waiting full grace period");
                    sleep_until(deadline).await;
                    return;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(transition = %id, "Grace period elapsed with VMs still running");
                return;
            }
            sleep(self.shutdown.vm_poll_interval.min(deadline - now)).await;
        }
    }

    fn record(&self, update: impl FnOnce(&mut TransitionHistory)) {
        update(&mut self.history.lock().unwrap_or_else(|e| e.into_inner()));
    }
}
