//! Short-lived SSH sessions through the system `ssh` client

use powerward_config::{Credential, HostSettings};
use powerward_host_api::{GatewayError, GatewayResult, RemoteCommand};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// `ssh` reserves this exit code for its own (connection) errors
const SSH_CONNECT_FAILURE: i32 = 255;

/// `sshpass` exit codes that mean no session was established
const SSHPASS_CONNECT_FAILURES: [i32; 3] = [3, 5, 6];

/// Environment variable `sshpass -e` reads the password from
const SSHPASS_ENV: &str = "SSHPASS";

/// Fully resolved process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment; values may be secret
    pub env: Vec<(&'static str, String)>,
}

/// Runs one command per session against a fixed host
#[derive(Debug, Clone)]
pub struct SshRunner {
    address: String,
    port: u16,
    user: String,
    credential: Credential,
    connect_timeout: Duration,
    command_timeout: Duration,
    ssh_program: String,
    sshpass_program: String,
}

impl SshRunner {
    pub fn new(address: impl Into<String>, user: impl Into<String>, credential: Credential) -> Self {
        Self {
            address: address.into(),
            port: 22,
            user: user.into(),
            credential,
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(60),
            ssh_program: "ssh".into(),
            sshpass_program: "sshpass".into(),
        }
    }

    pub fn from_settings(host: &HostSettings) -> Self {
        Self::new(host.address.clone(), host.user.clone(), host.credential.clone())
            .with_port(host.port)
            .with_timeouts(host.connect_timeout, host.command_timeout)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, command: Duration) -> Self {
        self.connect_timeout = connect;
        self.command_timeout = command;
        self
    }

    /// Override the client binaries (tests point these at stub scripts)
    pub fn with_programs(mut self, ssh: impl Into<String>, sshpass: impl Into<String>) -> Self {
        self.ssh_program = ssh.into();
        self.sshpass_program = sshpass.into();
        self
    }

    fn user_at_host(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    fn uses_sshpass(&self) -> bool {
        matches!(self.credential, Credential::Password(_))
    }

    fn ssh_args(&self, remote_line: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];

        match &self.credential {
            Credential::IdentityFile(key) => {
                args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
                args.extend(["-i".to_string(), path_arg(key)]);
            }
            Credential::Password(_) => {
                args.extend([
                    "-o".to_string(),
                    "PreferredAuthentications=password,keyboard-interactive".to_string(),
                    "-o".to_string(),
                    "NumberOfPasswordPrompts=1".to_string(),
                ]);
            }
        }

        args.push(self.user_at_host());
        args.push(remote_line.to_string());
        args
    }

    /// Build the process invocation for one remote command line
    pub fn invocation(&self, remote_line: &str) -> SshInvocation {
        let ssh_args = self.ssh_args(remote_line);
        match &self.credential {
            Credential::IdentityFile(_) => SshInvocation {
                program: self.ssh_program.clone(),
                args: ssh_args,
                env: Vec::new(),
            },
            Credential::Password(password) => {
                let mut args = vec!["-e".to_string(), self.ssh_program.clone()];
                args.extend(ssh_args);
                SshInvocation {
                    program: self.sshpass_program.clone(),
                    args,
                    env: vec![(SSHPASS_ENV, password.clone())],
                }
            }
        }
    }

    /// Open a session, run `remote_line`, return stdout.
    ///
    /// `command` only labels errors.
    pub async fn run(&self, command: RemoteCommand, remote_line: &str) -> GatewayResult<String> {
        let invocation = self.invocation(remote_line);
        debug!(host = %self.address, step = %command, line = remote_line, "Running remote command");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| GatewayError::Timeout(self.command_timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        trace!(step = %command, %stdout, %stderr, "Remote command output");

        if output.status.success() {
            return Ok(stdout);
        }

        let code = output.status.code();
        if self.is_connect_failure(code) {
            return Err(GatewayError::Connect(if stderr.is_empty() {
                format!("{} exited with {:?}", invocation.program, code)
            } else {
                stderr
            }));
        }

        Err(GatewayError::CommandFailed {
            command,
            code,
            stderr,
        })
    }

    fn is_connect_failure(&self, code: Option<i32>) -> bool {
        match code {
            // Killed by a signal
            None => true,
            Some(SSH_CONNECT_FAILURE) => true,
            Some(c) => self.uses_sshpass() && SSHPASS_CONNECT_FAILURES.contains(&c),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn key_runner() -> SshRunner {
        SshRunner::new(
            "esxi.lan",
            "root",
            Credential::IdentityFile(PathBuf::from("/etc/powerward/id_ed25519")),
        )
    }

    fn stub_script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("fake-ssh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn key_auth_uses_batch_mode() {
        let inv = key_runner().with_port(2222).invocation("esxcli --version");

        assert_eq!(inv.program, "ssh");
        assert!(inv.env.is_empty());
        assert!(inv.args.contains(&"BatchMode=yes".to_string()));
        assert!(inv.args.contains(&"ConnectTimeout=5".to_string()));
        assert!(inv.args.contains(&"/etc/powerward/id_ed25519".to_string()));
        assert_eq!(inv.args[0..2], ["-p".to_string(), "2222".to_string()]);
        assert_eq!(
            inv.args[inv.args.len() - 2..],
            ["root@esxi.lan".to_string(), "esxcli --version".to_string()]
        );
    }

    #[test]
    fn password_auth_goes_through_sshpass_env() {
        let runner = SshRunner::new("10.0.0.5", "root", Credential::Password("hunter2".into()));
        let inv = runner.invocation("esxcli --version");

        assert_eq!(inv.program, "sshpass");
        assert_eq!(inv.args[0..2], ["-e".to_string(), "ssh".to_string()]);
        assert_eq!(inv.env, vec![("SSHPASS", "hunter2".to_string())]);
        // Password never lands on the command line
        assert!(!inv.args.iter().any(|a| a.contains("hunter2")));
        assert!(!inv.args.contains(&"BatchMode=yes".to_string()));
    }

    #[tokio::test]
    async fn success_returns_trimmed_stdout() {
        let dir = TempDir::new().unwrap();
        let ssh = stub_script(&dir, "echo \"  esxcli 8.0.2  \"");
        let runner = key_runner().with_programs(ssh, "sshpass");

        let out = runner.run(RemoteCommand::Probe, "esxcli --version").await.unwrap();
        assert_eq!(out, "esxcli 8.0.2");
    }

    #[tokio::test]
    async fn exit_255_is_connect_error() {
        let dir = TempDir::new().unwrap();
        let ssh = stub_script(&dir, "echo 'Connection refused' >&2; exit 255");
        let runner = key_runner().with_programs(ssh, "sshpass");

        match runner.run(RemoteCommand::Probe, "esxcli --version").await {
            Err(GatewayError::Connect(msg)) => assert!(msg.contains("Connection refused")),
            other => panic!("expected connect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn other_exit_is_command_failure() {
        let dir = TempDir::new().unwrap();
        let ssh = stub_script(&dir, "echo 'not permitted' >&2; exit 1");
        let runner = key_runner().with_programs(ssh, "sshpass");

        match runner.run(RemoteCommand::PowerOff, "esxcli system shutdown poweroff").await {
            Err(GatewayError::CommandFailed {
                command,
                code,
                stderr,
            }) => {
                assert_eq!(command, RemoteCommand::PowerOff);
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "not permitted");
            }
            other => panic!("expected command failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sshpass_auth_failure_is_connect_error() {
        let dir = TempDir::new().unwrap();
        let sshpass = stub_script(&dir, "exit 5");
        let runner = SshRunner::new("10.0.0.5", "root", Credential::Password("wrong".into()))
            .with_programs("ssh", sshpass);

        assert!(matches!(
            runner.run(RemoteCommand::Probe, "esxcli --version").await,
            Err(GatewayError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = TempDir::new().unwrap();
        let ssh = stub_script(&dir, "sleep 5");
        let runner = key_runner()
            .with_programs(ssh, "sshpass")
            .with_timeouts(Duration::from_secs(1), Duration::from_millis(200));

        assert!(matches!(
            runner.run(RemoteCommand::Probe, "esxcli --version").await,
            Err(GatewayError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn missing_client_is_io_error() {
        let runner = key_runner().with_programs("/nonexistent/ssh", "sshpass");
        assert!(matches!(
            runner.run(RemoteCommand::Probe, "esxcli --version").await,
            Err(GatewayError::Io(_))
        ));
    }
}
