//! Execution results, their wire form, and the executors that produce them.

use std::{
    fmt,
    path::PathBuf,
    process::Stdio,
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{process::Command, time::timeout};

use crate::config::Config;
use crate::dump::DumpNode;

pub mod guard;

/// Prefix of a failure message that carries the last tracked offset.
pub const EXCEPTION_TAG: &str = "___EXCEPTION_____At offset: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Values the fragment asked to show, in the order they were produced.
    Success(Vec<(String, DumpNode)>),
    /// `offset` is `None` for plain messages that carry no location.
    Failure { offset: Option<usize>, message: String },
}

impl ExecutionResult {
    pub fn failure(message: impl fmt::Display) -> Self {
        ExecutionResult::Failure { offset: None, message: message.to_string() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn to_response(&self) -> ExecuteResponse {
        match self {
            ExecutionResult::Success(values) => ExecuteResponse {
                error_message: None,
                results: Some(
                    values
                        .iter()
                        .map(|(k, v)| ResultEntry { key: k.clone(), value: v.clone() })
                        .collect(),
                ),
            },
            ExecutionResult::Failure { offset, message } => ExecuteResponse {
                error_message: Some(match offset {
                    Some(o) => format_failure(*o, message),
                    None => message.clone(),
                }),
                results: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    #[serde(rename = "ResultKey")]
    pub key: String,
    #[serde(rename = "ResultValue")]
    pub value: DumpNode,
}

/// JSON reply to an `ExecuteAssembly` request, also printed by the local
/// runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(rename = "ErrorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "Results", default)]
    pub results: Option<Vec<ResultEntry>>,
}

impl ExecuteResponse {
    /// A non-empty error message wins over results; a reply with neither
    /// carries nothing.
    pub fn into_result(self) -> Option<ExecutionResult> {
        if let Some(msg) = self.error_message.filter(|m| !m.is_empty()) {
            let (offset, message) = parse_failure(&msg);
            return Some(ExecutionResult::Failure { offset, message });
        }
        self.results.map(|entries| {
            ExecutionResult::Success(entries.into_iter().map(|e| (e.key, e.value)).collect())
        })
    }
}

pub fn format_failure(offset: usize, message: &str) -> String {
    format!("{}{}__{}", EXCEPTION_TAG, offset, message)
}

/// Split a tagged failure message into its offset and text. Anything that
/// does not follow the tag format comes back whole, without an offset.
pub fn parse_failure(raw: &str) -> (Option<usize>, String) {
    let parsed = raw.strip_prefix(EXCEPTION_TAG).and_then(|rest| {
        let (num, message) = rest.split_once("__")?;
        let offset = num.trim().parse::<usize>().ok()?;
        Some((offset, message.to_string()))
    });
    match parsed {
        Some((offset, message)) => (Some(offset), message),
        None => (None, raw.to_string()),
    }
}

/// Decode an execution reply. Empty or unparseable replies yield `None`.
pub fn decode_reply(body: &[u8]) -> Option<ExecutionResult> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        tracing::warn!("empty execution reply ignored");
        return None;
    }
    match serde_json::from_slice::<ExecuteResponse>(body) {
        Ok(resp) => {
            let result = resp.into_result();
            if result.is_none() {
                tracing::warn!("execution reply carried neither results nor an error");
            }
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "unparseable execution reply ignored");
            None
        }
    }
}

/// A compiled assembly ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the artifact. `Ok(None)` means the runtime answered with nothing
    /// usable; `Err` is reserved for the channel itself failing.
    async fn execute(&self, artifact: &Artifact) -> Result<Option<ExecutionResult>>;
}

/// Runs artifacts on this machine through a host program that loads the
/// assembly, calls its entry point and prints an [`ExecuteResponse`].
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    pub runner: String,
    pub host: String,
    pub timeout: Duration,
}

impl LocalExecutor {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            runner: cfg.get("LOCAL_RUNNER").unwrap_or_else(|| "mono".into()),
            host: cfg.get("LOCAL_RUNNER_HOST").unwrap_or_else(|| "protopad-host.exe".into()),
            timeout: cfg.timeout("REQUEST_TIMEOUT"),
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, artifact: &Artifact) -> Result<Option<ExecutionResult>> {
        let mut cmd = Command::new(&self.runner);
        if !self.host.trim().is_empty() {
            cmd.arg(&self.host);
        }
        cmd.arg(&artifact.path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(runner = %self.runner, artifact = %artifact.path.display(), "running locally");
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(Some(ExecutionResult::failure(format!(
                    "failed to start local runner {}: {}",
                    self.runner, e
                ))))
            }
        };

        let out = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(out) => out.context("waiting for local runner")?,
            Err(_) => {
                return Ok(Some(ExecutionResult::failure(format!(
                    "local execution timed out after {}s",
                    self.timeout.as_secs()
                ))))
            }
        };

        if out.stdout.iter().all(|b| b.is_ascii_whitespace()) && !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let code = out.status.code().unwrap_or(-1);
            return Ok(Some(ExecutionResult::failure(format!(
                "local runner exited with code {}: {}",
                code, stderr
            ))));
        }
        Ok(decode_reply(&out.stdout))
    }
}
