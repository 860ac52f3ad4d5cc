//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    /// Managed host; fields may also come from the environment
    #[serde(default)]
    pub host: RawHostConfig,

    pub schedule: RawScheduleConfig,

    #[serde(default)]
    pub retry: RawRetryConfig,

    #[serde(default)]
    pub shutdown: RawShutdownConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/powerward/powerwardd.sock)
    pub socket_path: Option<PathBuf>,

    /// How often the reconciliation loop compares believed and desired state
    pub poll_interval_seconds: Option<u64>,
}

/// Connection descriptor for the managed host
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHostConfig {
    /// Hostname or IP address
    pub address: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    /// Prefer `POWERWARD_HOST_PASSWORD` over writing this into the file
    pub password: Option<String>,
    /// SSH private key; used instead of the password when set
    pub identity_file: Option<PathBuf>,
    /// MAC address of the wake-capable NIC
    pub mac_address: Option<String>,
    /// Destination of the wake packet (`ip:port`)
    pub wake_broadcast: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    /// Upper bound on a single remote command, including connect
    pub command_timeout_seconds: Option<u64>,
    /// Reason recorded by the host's power-off command
    pub shutdown_reason: Option<String>,
}

/// Daily operating window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawScheduleConfig {
    /// Start time (HH:MM, inclusive)
    pub start: String,
    /// End time (HH:MM, exclusive)
    pub end: String,
    /// IANA timezone name, e.g. "Europe/London"
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRetryConfig {
    pub max_attempts: Option<u32>,
    pub delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawShutdownConfig {
    /// Longest wait for guests after asking them to shut down
    pub grace_period_seconds: Option<u64>,
    /// Interval between running-VM checks during the grace period
    pub vm_poll_interval_seconds: Option<u64>,
}
