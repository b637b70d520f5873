// crates/toolgate-cli/src/process.rs
// ============================================================================
// Module: Process Tool Handlers
// Description: Tool handlers backed by external programs.
// Purpose: Run configured programs for gated commands.
// Dependencies: async-trait, tokio, toolgate-config, toolgate-core, toolgate-dispatch
// ============================================================================

//! ## Overview
//! A [`ProcessToolHandler`] runs one configured program per invocation with
//! only its configured arguments. Requester input never reaches the argument
//! list: the identity, the command label, and the payload (text or file path)
//! are passed through the environment. Standard output becomes a text
//! artifact; a non-zero exit becomes a [`ToolError`] carrying the tail of
//! standard error.
//!
//! The child is killed if the invocation is dropped or exceeds its timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::process::Output;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use toolgate_config::ToolConfig;
use toolgate_core::Artifact;
use toolgate_core::CommandName;
use toolgate_core::Identity;
use toolgate_core::Payload;
use toolgate_core::ToolError;
use toolgate_dispatch::ToolHandler;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable carrying the requesting identity.
pub const IDENTITY_ENV: &str = "TOOLGATE_IDENTITY";

/// Environment variable carrying the command label.
pub const COMMAND_ENV: &str = "TOOLGATE_COMMAND";

/// Environment variable carrying a text payload.
pub const PAYLOAD_ENV: &str = "TOOLGATE_PAYLOAD";

/// Environment variable carrying a file payload's path.
pub const FILE_ENV: &str = "TOOLGATE_FILE";

/// Maximum characters of standard error echoed in a failure.
const MAX_STDERR_CHARS: usize = 512;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Tool handler that executes an external program.
#[derive(Debug, Clone)]
pub struct ProcessToolHandler {
    /// Command served by this handler.
    command: CommandName,
    /// Program to execute.
    program: String,
    /// Fixed leading arguments.
    args: Vec<String>,
    /// Optional wall-clock limit.
    timeout: Option<Duration>,
}

impl ProcessToolHandler {
    /// Creates a handler for `command` running `program`.
    #[must_use]
    pub const fn new(
        command: CommandName,
        program: String,
        args: Vec<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            command,
            program,
            args,
            timeout,
        }
    }

    /// Creates a handler from a `[tools.<command>]` table.
    #[must_use]
    pub fn from_config(command: CommandName, tool: &ToolConfig) -> Self {
        Self::new(command, tool.program.clone(), tool.args.clone(), tool.timeout())
    }

    /// Builds the child command for one invocation.
    fn build(&self, identity: &Identity, payload: &Payload) -> Result<Command, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.env_remove(PAYLOAD_ENV);
        cmd.env_remove(FILE_ENV);
        match payload {
            Payload::Empty => {}
            Payload::Text(text) => {
                cmd.env(PAYLOAD_ENV, env_value(OsStr::new(text))?);
            }
            Payload::File(file) => {
                cmd.env(FILE_ENV, env_value(file.path.as_os_str())?);
            }
        }
        cmd.env(IDENTITY_ENV, env_value(OsStr::new(identity.as_str()))?);
        cmd.env(COMMAND_ENV, self.command.as_str());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        Ok(cmd)
    }

    /// Waits for the child, honoring the timeout.
    async fn run(&self, mut cmd: Command) -> Result<Output, ToolError> {
        let child = cmd.spawn().map_err(|err| {
            ToolError::new("tool_spawn_failed", format!("failed to start {}: {err}", self.command))
        })?;
        let waiting = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, waiting).await.map_err(|_| {
                ToolError::new(
                    "tool_timeout",
                    format!("{} exceeded {} ms", self.command, limit.as_millis()),
                )
            })?,
            None => waiting.await,
        };
        output.map_err(|err| ToolError::new("tool_io", format!("{} io failure: {err}", self.command)))
    }
}

#[async_trait]
impl ToolHandler for ProcessToolHandler {
    async fn invoke(&self, identity: &Identity, payload: &Payload) -> Result<Artifact, ToolError> {
        let output = self.run(self.build(identity, payload)?).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr_tail(stderr.trim());
            let message = if detail.is_empty() {
                format!("{} exited with {}", self.command, output.status)
            } else {
                format!("{} exited with {}: {detail}", self.command, output.status)
            };
            return Err(ToolError::new("tool_failed", message));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Artifact::Text(stdout.trim_end().to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects values the environment cannot carry.
fn env_value(value: &OsStr) -> Result<&OsStr, ToolError> {
    if value.as_encoded_bytes().contains(&0) {
        return Err(ToolError::new("invalid_payload", "request contains a NUL byte"));
    }
    Ok(value)
}

/// Returns the last [`MAX_STDERR_CHARS`] characters of `stderr`.
fn stderr_tail(stderr: &str) -> String {
    let count = stderr.chars().count();
    stderr.chars().skip(count.saturating_sub(MAX_STDERR_CHARS)).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
