//! Remote command execution on PodNet nodes
//!
//! The deployment protocol talks to nodes only through [`RemoteExecutor`].
//! Its one operation separates two failure levels:
//!
//! - `Err(ChannelFailure)`: the node could not be reached or authenticated
//! - `Ok(CommandOutput)` with a non-zero exit code: the command ran and failed
//!
//! [`SshExecutor`] is the production implementation. It runs each command
//! through the system `ssh` client in batch mode, so key-based access for
//! the configured user must already be in place.
//!
//! # Example
//!
//! ```no_run
//! use podfw::core::topology::{Node, NodeRole};
//! use podfw::remote::{RemoteExecutor, SshExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ssh = SshExecutor::new("ssh", "robot", 10);
//! let node = Node::new("2a02:2078:3::10:0:2", NodeRole::Enabled);
//! let output = ssh.run(&node, "ip netns list").await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::core::topology::Node;

/// Exit status ssh uses for its own failures (connection, authentication)
const SSH_CHANNEL_EXIT: i32 = 255;

/// Result of a command that ran on the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Transport-level failure: the command never reached the node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("channel failure reaching {host}: {message}")]
pub struct ChannelFailure {
    pub host: String,
    /// Exit status of the transport, when it produced one
    pub code: Option<i32>,
    pub message: String,
}

impl ChannelFailure {
    pub fn new(host: impl Into<String>, code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            code,
            message: message.into(),
        }
    }
}

/// Runs shell commands on a node
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs `command` through the node's shell.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelFailure`] only when the node could not be reached.
    /// A command exiting non-zero is `Ok` with its exit code.
    async fn run(&self, node: &Node, command: &str) -> Result<CommandOutput, ChannelFailure>;
}

/// [`RemoteExecutor`] backed by the system ssh client
#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: String,
    user: String,
    connect_timeout_secs: u64,
}

impl SshExecutor {
    pub fn new(program: impl Into<String>, user: impl Into<String>, connect_timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            user: user.into(),
            connect_timeout_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ssh_program.clone(),
            config.ssh_user.clone(),
            config.connect_timeout_secs,
        )
    }

    /// Builds the ssh invocation without spawning it.
    pub fn command(&self, node: &Node, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg(format!("{}@{}", self.user, node.host))
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, node: &Node, command: &str) -> Result<CommandOutput, ChannelFailure> {
        debug!(host = %node.host, %command, "Running remote command");

        let output = self
            .command(node, command)
            .output()
            .await
            .map_err(|e| {
                ChannelFailure::new(&node.host, None, format!("failed to spawn {}: {e}", self.program))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let Some(code) = output.status.code() else {
            warn!(host = %node.host, "ssh terminated by signal");
            return Err(ChannelFailure::new(&node.host, None, "ssh terminated by signal"));
        };

        if code == SSH_CHANNEL_EXIT {
            warn!(host = %node.host, stderr = %stderr.trim(), "ssh channel failure");
            return Err(ChannelFailure::new(&node.host, Some(code), stderr.trim()));
        }

        Ok(CommandOutput::new(code, stdout, stderr))
    }
}

/// Quotes a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
