//! Config validation CLI tool
//!
//! Validates a powerwardd configuration file and reports any errors.

use powerward_config::{ConfigError, Credential, CURRENT_CONFIG_VERSION};
use powerward_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a powerwardd configuration file.");
            eprintln!("POWERWARD_HOST_* environment overrides are applied first.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match powerward_config::load_config(&config_path) {
        Ok(settings) => {
            let credential = match &settings.host.credential {
                Credential::Password(_) => "password".to_string(),
                Credential::IdentityFile(path) => format!("key {}", path.display()),
            };

            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!(
                "  Host: {}@{}:{} ({})",
                settings.host.user, settings.host.address, settings.host.port, credential
            );
            println!(
                "  Wake: {} via {}",
                settings.host.mac_address, settings.host.wake_broadcast
            );
            println!(
                "  Window: {}-{} {}",
                settings.schedule.start, settings.schedule.end, settings.schedule.timezone
            );
            println!(
                "  Retry: {} attempts, {} apart",
                settings.retry.max_attempts,
                format_duration(settings.retry.delay)
            );
            println!(
                "  Guest grace period: {}",
                format_duration(settings.shutdown.grace_period)
            );
            println!("  Socket: {}", settings.service.socket_path.display());

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
