//! Managed-host gateway trait

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::{MacAddress, RemoteCommand};

/// Errors from gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No session could be established (refused, unreachable, auth failure)
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Connecting or running the command took longer than allowed
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Session established but the remote command reported failure
    #[error("Remote command '{command}' failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: RemoteCommand,
        code: Option<i32>,
        stderr: String,
    },

    /// The wake packet could not be built or sent
    #[error("Wake signal failed: {0}")]
    Wake(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Whether the failure happened before the remote side saw the command
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Wake(_) | Self::Io(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway to the single managed host - implemented by transport adapters
#[async_trait]
pub trait HostGateway: Send + Sync {
    /// Broadcast a wake signal to the given hardware address.
    ///
    /// Success means the signal left this machine, not that the host woke.
    async fn send_wake_signal(&self, hardware: &MacAddress) -> GatewayResult<()>;

    /// Run one remote operation in a fresh, short-lived session and return
    /// its output.
    async fn run_remote_command(&self, command: RemoteCommand) -> GatewayResult<String>;

    /// Whether the host answers a trivial remote command.
    ///
    /// Never fails: the underlying error is logged and reported as `false`.
    async fn probe_reachable(&self) -> bool {
        match self.run_remote_command(RemoteCommand::Probe).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Host not reachable");
                false
            }
        }
    }

    /// Optional: number of VMs still powered on.
    ///
    /// `Ok(None)` means the transport cannot tell, and callers fall back to
    /// a fixed wait.
    async fn running_vm_count(&self) -> GatewayResult<Option<usize>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Gateway that only implements the required methods
    struct CommandOnly {
        fail_probe: bool,
        seen: Mutex<Vec<RemoteCommand>>,
    }

    #[async_trait]
    impl HostGateway for CommandOnly {
        async fn send_wake_signal(&self, _hardware: &MacAddress) -> GatewayResult<()> {
            Ok(())
        }

        async fn run_remote_command(&self, command: RemoteCommand) -> GatewayResult<String> {
            self.seen.lock().unwrap().push(command);
            if self.fail_probe {
                Err(GatewayError::Connect("connection refused".into()))
            } else {
                Ok("esxcli 8.0.2".into())
            }
        }
    }

    #[tokio::test]
    async fn default_probe_runs_probe_command() {
        let gateway = CommandOnly {
            fail_probe: false,
            seen: Mutex::new(Vec::new()),
        };
        assert!(gateway.probe_reachable().await);
        assert_eq!(*gateway.seen.lock().unwrap(), vec![RemoteCommand::Probe]);
    }

    #[tokio::test]
    async fn default_probe_swallows_errors() {
        let gateway = CommandOnly {
            fail_probe: true,
            seen: Mutex::new(Vec::new()),
        };
        assert!(!gateway.probe_reachable().await);
    }

    #[tokio::test]
    async fn vm_count_unsupported_by_default() {
        let gateway = CommandOnly {
            fail_probe: false,
            seen: Mutex::new(Vec::new()),
        };
        assert!(gateway.running_vm_count().await.unwrap().is_none());
    }

    #[test]
    fn connectivity_classification() {
        assert!(GatewayError::Connect("refused".into()).is_connectivity());
        assert!(GatewayError::Wake("no route".into()).is_connectivity());
        assert!(
            !GatewayError::CommandFailed {
                command: RemoteCommand::PowerOff,
                code: Some(1),
                stderr: String::new(),
            }
            .is_connectivity()
        );
    }
}
