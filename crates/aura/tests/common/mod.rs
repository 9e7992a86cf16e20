//! Common test utilities for aura integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// A throwaway HOME so nothing touches the real ~/.aura
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub workspace_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".aura");
        let workspace_dir = data_dir.join("workshop");

        Ok(Self {
            temp_dir,
            data_dir,
            workspace_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn workspace_file(&self, name: &str) -> PathBuf {
        self.workspace_dir.join(name)
    }

    /// The binary with HOME redirected and ambient overrides cleared
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_aura"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("AURA_API_KEY");
        cmd.env_remove("AURA_MODEL");
        cmd.env_remove("BRAVE_API_KEY");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn write_config(&self, config: &Value) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    /// Point the oracle at a local mock backend
    pub fn config_with_backend(&self, api_base: &str) -> anyhow::Result<()> {
        self.write_config(&json!({
            "oracle": {
                "provider": "openrouter",
                "api_key": "sk-test",
                "api_base": api_base,
                "model": "test/model"
            },
            "foreman": {
                "max_reasoning_retries": 2,
                "oracle_timeout_secs": 10
            }
        }))
    }
}

/// A chat-completion body whose message content is `content`
pub fn completion(content: &str) -> String {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

/// A chat-completion body carrying one native tool call
pub fn tool_call(name: &str, arguments: Value) -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
    .to_string()
}
