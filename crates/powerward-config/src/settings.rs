//! Validated settings structures

use crate::schema::{RawConfig, RawHostConfig, RawServiceConfig};
use crate::validation::parse_time;
use powerward_host_api::MacAddress;
use powerward_util::WallClock;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_WAKE_BROADCAST: &str = "255.255.255.255:9";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_REASON: &str = "routine shutdown";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_VM_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Environment variables that override `[host]` fields
pub const ENV_HOST_ADDRESS: &str = "POWERWARD_HOST_ADDRESS";
pub const ENV_HOST_USER: &str = "POWERWARD_HOST_USER";
pub const ENV_HOST_PASSWORD: &str = "POWERWARD_HOST_PASSWORD";
pub const ENV_HOST_MAC: &str = "POWERWARD_HOST_MAC";

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub host: HostSettings,
    pub schedule: ScheduleSettings,
    pub retry: RetryPolicy,
    pub shutdown: ShutdownPolicy,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub(crate) fn from_raw(raw: RawConfig) -> Option<Self> {
        Some(Self {
            service: ServiceSettings::from_raw(raw.service),
            host: HostSettings::from_raw(raw.host)?,
            schedule: ScheduleSettings {
                start: parse_time(&raw.schedule.start).ok()?,
                end: parse_time(&raw.schedule.end).ok()?,
                timezone: raw.schedule.timezone,
            },
            retry: RetryPolicy {
                max_attempts: raw.retry.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                delay: raw
                    .retry
                    .delay_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_DELAY),
            },
            shutdown: ShutdownPolicy {
                grace_period: raw
                    .shutdown
                    .grace_period_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_GRACE_PERIOD),
                vm_poll_interval: raw
                    .shutdown
                    .vm_poll_interval_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_VM_POLL_INTERVAL),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub poll_interval: Duration,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(powerward_util::socket_path_without_env),
            poll_interval: raw
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        }
    }
}

/// How the gateway authenticates to the managed host
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    IdentityFile(PathBuf),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::IdentityFile(path) => f.debug_tuple("IdentityFile").field(path).finish(),
        }
    }
}

/// Immutable connection descriptor for the managed host
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    pub mac_address: MacAddress,
    pub wake_broadcast: SocketAddr,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub shutdown_reason: String,
}

impl HostSettings {
    fn from_raw(raw: RawHostConfig) -> Option<Self> {
        // An identity file wins over a password so key auth stays in BatchMode
        let credential = match (raw.identity_file, raw.password) {
            (Some(path), _) => Credential::IdentityFile(path),
            (None, Some(password)) => Credential::Password(password),
            (None, None) => return None,
        };

        Some(Self {
            address: raw.address?.trim().to_string(),
            port: raw.port.unwrap_or(DEFAULT_SSH_PORT),
            user: raw.user?.trim().to_string(),
            credential,
            mac_address: raw.mac_address?.parse().ok()?,
            wake_broadcast: raw
                .wake_broadcast
                .as_deref()
                .unwrap_or(DEFAULT_WAKE_BROADCAST)
                .parse()
                .ok()?,
            connect_timeout: raw
                .connect_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            command_timeout: raw
                .command_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            shutdown_reason: raw
                .shutdown_reason
                .unwrap_or_else(|| DEFAULT_SHUTDOWN_REASON.to_string()),
        })
    }
}

/// Fixed daily operating window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub start: WallClock,
    pub end: WallClock,
    /// IANA name, resolved by the schedule oracle on every evaluation
    pub timezone: String,
}

/// Attempts and spacing for verification polling, shared by both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Upper bound on waiting for guests to stop
    pub grace_period: Duration,
    pub vm_poll_interval: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            vm_poll_interval: DEFAULT_VM_POLL_INTERVAL,
        }
    }
}

/// Overlay `POWERWARD_HOST_*` variables onto the `[host]` section
pub fn apply_env_overrides(raw: &mut RawConfig, lookup: impl Fn(&str) -> Option<String>) {
    let host = &mut raw.host;
    for (var, field) in [
        (ENV_HOST_ADDRESS, &mut host.address),
        (ENV_HOST_USER, &mut host.user),
        (ENV_HOST_PASSWORD, &mut host.password),
        (ENV_HOST_MAC, &mut host.mac_address),
    ] {
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            tracing::debug!(variable = var, "Applying environment override");
            *field = Some(value);
        }
    }
}
