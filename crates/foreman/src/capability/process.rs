//! APPRENTICES: shell commands inside the workshop

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::path_utils::validate_workspace_path;
use super::{
    parse_params, Capability, CapabilityDescriptor, CapabilityError, InvocationContext, ParamType,
};
use crate::history::truncate_chars;

const MAX_STREAM_CHARS: usize = 10000;

/// Runs `sh -c <command>` with the workshop as default working directory
pub struct ProcessManager {
    timeout_secs: u64,
    workspace: PathBuf,
    descriptor: CapabilityDescriptor,
}

impl ProcessManager {
    pub fn new(workspace: PathBuf, timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            workspace,
            descriptor: CapabilityDescriptor::new(
                "process_manager",
                "Run a shell command in the workshop. Returns stdout, stderr and exit code.",
            )
            .required("command", ParamType::String, "Shell command line")
            .optional(
                "working_dir",
                ParamType::String,
                "Working directory inside the workshop",
            ),
        }
    }
}

#[derive(Deserialize)]
struct ProcessArgs {
    command: String,
    working_dir: Option<String>,
}

#[async_trait]
impl Capability for ProcessManager {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        let args: ProcessArgs = parse_params(params)?;

        let working_dir = match args.working_dir {
            Some(dir) => validate_workspace_path(&dir, &self.workspace).await?,
            None => {
                tokio::fs::create_dir_all(&self.workspace).await?;
                self.workspace.clone()
            }
        };

        debug!("◆ EXECUTING (step {}): {}", ctx.step, args.command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future drops the child, which kills it.
        let output = tokio::select! {
            res = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output()) => {
                match res {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        return Err(CapabilityError::new(format!("Failed to start command: {}", e)))
                    }
                    Err(_) => {
                        return Err(CapabilityError::new(format!(
                            "Command timed out after {} seconds",
                            self.timeout_secs
                        )))
                    }
                }
            }
            _ = ctx.cancel.cancelled() => {
                warn!("◆ COMMAND KILLED ON CANCEL: {}", args.command);
                return Err(CapabilityError::new("Command cancelled"));
            }
        };

        Ok(json!({
            "stdout": truncate_chars(&String::from_utf8_lossy(&output.stdout), MAX_STREAM_CHARS),
            "stderr": truncate_chars(&String::from_utf8_lossy(&output.stderr), MAX_STREAM_CHARS),
            "exit_code": output.status.code().unwrap_or(-1),
        }))
    }
}
