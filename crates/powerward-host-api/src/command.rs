//! Remote operations the core asks the gateway to run

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single remote operation against the managed host.
///
/// The gateway decides the concrete command line; the core only decides
/// which operation to run and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    /// Trivial command whose success proves the host is up
    Probe,
    EnterMaintenanceMode,
    ExitMaintenanceMode,
    /// Power on every registered VM, as one batch
    BootAllVms,
    /// Power off every registered VM, as one batch
    ShutdownAllVms,
    /// Report the power state of every registered VM
    ListVmPowerStates,
    /// Power off the host itself
    PowerOff,
}

impl RemoteCommand {
    /// Human-readable step name, used in logs and step-failure records
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::EnterMaintenanceMode => "enter maintenance mode",
            Self::ExitMaintenanceMode => "exit maintenance mode",
            Self::BootAllVms => "boot all VMs",
            Self::ShutdownAllVms => "shut down all VMs",
            Self::ListVmPowerStates => "list VM power states",
            Self::PowerOff => "power off host",
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}
