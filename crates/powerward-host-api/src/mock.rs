//! Mock gateway for testing

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{GatewayError, GatewayResult, HostGateway, MacAddress, RemoteCommand};

/// One recorded interaction with the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Wake(MacAddress),
    Probe,
    Command(RemoteCommand),
    VmCount,
}

/// How the mock answers probes
#[derive(Debug, Clone)]
pub enum Reachability {
    /// Always the same answer
    Fixed(bool),
    /// Answers popped in order; the last answer repeats once exhausted
    Script(VecDeque<bool>),
    /// Reachable exactly while the simulated host is powered
    FollowPower,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<GatewayCall>,
    reachability: Reachability,
    last_scripted: bool,
    powered: bool,
    fail_wake: bool,
    failing: HashSet<RemoteCommand>,
    vm_counts: Option<VecDeque<usize>>,
    last_vm_count: usize,
    delay: Option<Duration>,
}

impl MockState {
    fn next_probe_answer(&mut self) -> bool {
        match &mut self.reachability {
            Reachability::Fixed(answer) => *answer,
            Reachability::Script(script) => {
                if let Some(answer) = script.pop_front() {
                    self.last_scripted = answer;
                }
                self.last_scripted
            }
            Reachability::FollowPower => self.powered,
        }
    }
}

/// In-memory gateway that records every call.
///
/// Clones share state, so a test can keep a handle while the executor owns
/// another.
#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    /// Reachable host, every command succeeds
    pub fn new() -> Self {
        Self::with_reachability(Reachability::Fixed(true))
    }

    pub fn with_reachability(reachability: Reachability) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                reachability,
                last_scripted: false,
                powered: false,
                fail_wake: false,
                failing: HashSet::new(),
                vm_counts: None,
                last_vm_count: 0,
                delay: None,
            })),
        }
    }

    /// Probes answer from `answers` in order
    pub fn with_probe_script(answers: impl IntoIterator<Item = bool>) -> Self {
        Self::with_reachability(Reachability::Script(answers.into_iter().collect()))
    }

    /// Simulated host that wakes on a wake signal and goes down on power-off
    pub fn following_power(initially_powered: bool) -> Self {
        let mock = Self::with_reachability(Reachability::FollowPower);
        mock.lock().powered = initially_powered;
        mock
    }

    /// `running_vm_count` answers from `counts`; the last one repeats
    pub fn with_vm_counts(self, counts: impl IntoIterator<Item = usize>) -> Self {
        self.lock().vm_counts = Some(counts.into_iter().collect());
        self
    }

    /// Every wake and command takes this long
    pub fn with_command_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    pub fn set_fail_wake(&self, fail: bool) {
        self.lock().fail_wake = fail;
    }

    pub fn fail_command(&self, command: RemoteCommand) {
        self.lock().failing.insert(command);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing.clear();
        state.fail_wake = false;
    }

    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Remote commands issued, probes excluded
    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Command(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Probe))
    }

    pub fn wake_count(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Wake(_)))
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn count(&self, pred: impl Fn(&GatewayCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostGateway for MockGateway {
    async fn send_wake_signal(&self, hardware: &MacAddress) -> GatewayResult<()> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.calls.push(GatewayCall::Wake(*hardware));
        if state.fail_wake {
            return Err(GatewayError::Wake("simulated send failure".into()));
        }
        state.powered = true;
        Ok(())
    }

    async fn run_remote_command(&self, command: RemoteCommand) -> GatewayResult<String> {
        self.simulate_latency().await;

        let mut state = self.lock();
        if command == RemoteCommand::Probe {
            state.calls.push(GatewayCall::Probe);
            return if state.next_probe_answer() {
                Ok("esxcli 8.0.2".into())
            } else {
                Err(GatewayError::Connect("simulated host unreachable".into()))
            };
        }

        state.calls.push(GatewayCall::Command(command));
        if matches!(state.reachability, Reachability::FollowPower) && !state.powered {
            return Err(GatewayError::Connect("simulated host powered off".into()));
        }
        if state.failing.contains(&command) {
            return Err(GatewayError::CommandFailed {
                command,
                code: Some(1),
                stderr: "simulated failure".into(),
            });
        }
        if command == RemoteCommand::PowerOff {
            state.powered = false;
        }
        Ok(String::new())
    }

    async fn running_vm_count(&self) -> GatewayResult<Option<usize>> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::VmCount);
        let next = state.vm_counts.as_mut().map(|counts| counts.pop_front());
        match next {
            None => Ok(None),
            Some(Some(count)) => {
                state.last_vm_count = count;
                Ok(Some(count))
            }
            Some(None) => Ok(Some(state.last_vm_count)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        MacAddress::new([0, 0x1b, 0x21, 0xaa, 0xbb, 0xcc])
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let mock = MockGateway::new();
        mock.send_wake_signal(&mac()).await.unwrap();
        assert!(mock.probe_reachable().await);
        mock.run_remote_command(RemoteCommand::ExitMaintenanceMode)
            .await
            .unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                GatewayCall::Wake(mac()),
                GatewayCall::Probe,
                GatewayCall::Command(RemoteCommand::ExitMaintenanceMode),
            ]
        );
        assert_eq!(mock.commands(), vec![RemoteCommand::ExitMaintenanceMode]);
    }

    #[tokio::test]
    async fn probe_script_repeats_last_answer() {
        let mock = MockGateway::with_probe_script([false, true]);
        assert!(!mock.probe_reachable().await);
        assert!(mock.probe_reachable().await);
        assert!(mock.probe_reachable().await);
        assert_eq!(mock.probe_count(), 3);
    }

    #[tokio::test]
    async fn follow_power_tracks_wake_and_power_off() {
        let mock = MockGateway::following_power(false);
        assert!(!mock.probe_reachable().await);
        assert!(
            mock.run_remote_command(RemoteCommand::BootAllVms)
                .await
                .is_err()
        );

        mock.send_wake_signal(&mac()).await.unwrap();
        assert!(mock.probe_reachable().await);

        mock.run_remote_command(RemoteCommand::PowerOff).await.unwrap();
        assert!(!mock.is_powered());
        assert!(!mock.probe_reachable().await);
    }

    #[tokio::test]
    async fn configured_failures() {
        let mock = MockGateway::new();
        mock.set_fail_wake(true);
        mock.fail_command(RemoteCommand::ShutdownAllVms);

        assert!(matches!(
            mock.send_wake_signal(&mac()).await,
            Err(GatewayError::Wake(_))
        ));
        assert!(matches!(
            mock.run_remote_command(RemoteCommand::ShutdownAllVms).await,
            Err(GatewayError::CommandFailed { .. })
        ));

        mock.clear_failures();
        assert!(mock.send_wake_signal(&mac()).await.is_ok());
    }

    #[tokio::test]
    async fn vm_counts_drain_then_repeat() {
        let mock = MockGateway::new();
        assert_eq!(mock.running_vm_count().await.unwrap(), None);

        let mock = MockGateway::new().with_vm_counts([3, 1, 0]);
        assert_eq!(mock.running_vm_count().await.unwrap(), Some(3));
        assert_eq!(mock.running_vm_count().await.unwrap(), Some(1));
        assert_eq!(mock.running_vm_count().await.unwrap(), Some(0));
        assert_eq!(mock.running_vm_count().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let mock = MockGateway::new();
        let other = mock.clone();
        other.send_wake_signal(&mac()).await.unwrap();
        assert_eq!(mock.wake_count(), 1);
        mock.clear_calls();
        assert!(other.calls().is_empty());
    }
}
