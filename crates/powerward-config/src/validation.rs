//! Configuration validation

use crate::schema::{RawConfig, RawHostConfig, RawScheduleConfig};
use powerward_host_api::MacAddress;
use powerward_util::WallClock;
use std::net::SocketAddr;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid time format for schedule.{field} '{value}': {message}")]
    InvalidTimeFormat {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Schedule window is empty: start {start} is not before end {end}")]
    EmptyWindow { start: String, end: String },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid MAC address '{value}': {message}")]
    InvalidMacAddress { value: String, message: String },

    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("No credential for the managed host: set host.password or host.identity_file")]
    MissingCredential,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Validate a raw configuration, collecting every error
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_schedule(&config.schedule));
    errors.extend(validate_host(&config.host));

    if config.retry.max_attempts == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "retry.max_attempts",
            message: "must be at least 1".into(),
        });
    }

    if config.service.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "service.poll_interval_seconds",
            message: "must be greater than 0".into(),
        });
    }

    if config.shutdown.vm_poll_interval_seconds == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "shutdown.vm_poll_interval_seconds",
            message: "must be greater than 0".into(),
        });
    }

    errors
}

fn validate_schedule(schedule: &RawScheduleConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let start = parse_time(&schedule.start).map_err(|message| ValidationError::InvalidTimeFormat {
        field: "start",
        value: schedule.start.clone(),
        message,
    });
    let end = parse_time(&schedule.end).map_err(|message| ValidationError::InvalidTimeFormat {
        field: "end",
        value: schedule.end.clone(),
        message,
    });

    match (start, end) {
        (Ok(start), Ok(end)) => {
            if start >= end {
                errors.push(ValidationError::EmptyWindow {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
        }
        (start, end) => {
            errors.extend(start.err());
            errors.extend(end.err());
        }
    }

    if parse_timezone(&schedule.timezone).is_none() {
        errors.push(ValidationError::UnknownTimezone(schedule.timezone.clone()));
    }

    errors
}

fn validate_host(host: &RawHostConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if host.address.as_deref().is_none_or(|a| a.trim().is_empty()) {
        errors.push(ValidationError::MissingField("host.address"));
    }
    if host.user.as_deref().is_none_or(|u| u.trim().is_empty()) {
        errors.push(ValidationError::MissingField("host.user"));
    }

    let has_password = host.password.as_deref().is_some_and(|p| !p.is_empty());
    if !has_password && host.identity_file.is_none() {
        errors.push(ValidationError::MissingCredential);
    }

    match host.mac_address.as_deref() {
        None => errors.push(ValidationError::MissingField("host.mac_address")),
        Some(raw) => {
            if let Err(e) = raw.parse::<MacAddress>() {
                errors.push(ValidationError::InvalidMacAddress {
                    value: e.value,
                    message: e.message,
                });
            }
        }
    }

    if let Some(target) = host.wake_broadcast.as_deref()
        && target.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidValue {
            field: "host.wake_broadcast",
            message: format!("'{}' is not an ip:port address", target),
        });
    }

    if host.port == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "host.port",
            message: "must be greater than 0".into(),
        });
    }
    if host.connect_timeout_seconds == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "host.connect_timeout_seconds",
            message: "must be greater than 0".into(),
        });
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<WallClock, String> {
    let (hour, minute) = s
        .split_once(':')
        .ok_or_else(|| "Expected HH:MM format".to_string())?;

    let hour: u8 = hour.parse().map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = minute.parse().map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    WallClock::new(hour, minute).ok_or_else(|| "Out of range".into())
}

/// Resolve an IANA timezone name
pub fn parse_timezone(name: &str) -> Option<chrono_tz::Tz> {
    name.parse().ok()
}
