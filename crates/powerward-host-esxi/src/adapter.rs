//! ESXi gateway implementation

use async_trait::async_trait;
use powerward_config::HostSettings;
use powerward_host_api::{GatewayError, GatewayResult, HostGateway, MacAddress, RemoteCommand};
use std::borrow::Cow;
use std::net::SocketAddr;
use tracing::{debug, info};

use crate::{SshRunner, send_magic_packet};

/// Lists VM ids, one per line, skipping the `getallvms` header
const LIST_VM_IDS: &str = "vim-cmd vmsvc/getallvms | awk 'NR>1{print $1}'";

/// Line `vim-cmd vmsvc/power.getstate` prints for a running VM
const POWERED_ON: &str = "Powered on";

/// Gateway for a standalone ESXi host reached over SSH and woken over LAN
#[derive(Debug, Clone)]
pub struct EsxiGateway {
    ssh: SshRunner,
    wake_target: SocketAddr,
    shutdown_reason: String,
}

impl EsxiGateway {
    pub fn new(ssh: SshRunner, wake_target: SocketAddr, shutdown_reason: impl Into<String>) -> Self {
        Self {
            ssh,
            wake_target,
            shutdown_reason: shutdown_reason.into(),
        }
    }

    pub fn from_settings(host: &HostSettings) -> Self {
        Self::new(
            SshRunner::from_settings(host),
            host.wake_broadcast,
            host.shutdown_reason.clone(),
        )
    }

    /// The ESXi shell command line behind each operation
    pub fn command_line(&self, command: RemoteCommand) -> String {
        match command {
            RemoteCommand::Probe => "esxcli --version".into(),
            RemoteCommand::EnterMaintenanceMode => {
                "esxcli system maintenanceMode set --enable true".into()
            }
            RemoteCommand::ExitMaintenanceMode => {
                "esxcli system maintenanceMode set --enable false".into()
            }
            RemoteCommand::BootAllVms => for_each_vm("vim-cmd vmsvc/power.on $vmid"),
            // Guest shutdown needs VMware Tools; hard power-off otherwise
            RemoteCommand::ShutdownAllVms => for_each_vm(
                "vim-cmd vmsvc/power.shutdown $vmid || vim-cmd vmsvc/power.off $vmid",
            ),
            RemoteCommand::ListVmPowerStates => {
                for_each_vm("vim-cmd vmsvc/power.getstate $vmid | tail -1")
            }
            RemoteCommand::PowerOff => format!(
                "esxcli system shutdown poweroff --reason {}",
                shell_escape::unix::escape(Cow::Borrowed(self.shutdown_reason.as_str()))
            ),
        }
    }
}

fn for_each_vm(body: &str) -> String {
    format!("for vmid in $({}); do {}; done", LIST_VM_IDS, body)
}

/// Count VMs reported as powered on by the power-state listing
pub fn count_powered_on(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.trim() == POWERED_ON)
        .count()
}

#[async_trait]
impl HostGateway for EsxiGateway {
    async fn send_wake_signal(&self, hardware: &MacAddress) -> GatewayResult<()> {
        info!(%hardware, target = %self.wake_target, "Sending Wake-on-LAN packet");
        send_magic_packet(hardware, self.wake_target)
            .await
            .map_err(|e| GatewayError::Wake(e.to_string()))
    }

    async fn run_remote_command(&self, command: RemoteCommand) -> GatewayResult<String> {
        let line = self.command_line(command);
        let output = self.ssh.run(command, &line).await?;
        if !output.is_empty() {
            debug!(step = %command, %output, "Remote command succeeded");
        }
        Ok(output)
    }

    async fn running_vm_count(&self) -> GatewayResult<Option<usize>> {
        let output = self
            .run_remote_command(RemoteCommand::ListVmPowerStates)
            .await?;
        Ok(Some(count_powered_on(&output)))
    }
}
