//! Command/response exchange with a remote runtime.
//!
//! Every command is a `POST` to `http://<address>/<Command>` whose body is
//! the raw request payload; the reply body is the raw response.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use thiserror::Error;

use crate::config::Config;
use crate::execution::{decode_reply, Artifact, ExecutionResult, Executor};
use crate::target::LOCAL_ADDRESS;

pub mod frame;

pub use frame::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ExecuteAssembly,
    GetFileContents,
    UpdatePixateCss,
    GetMainXamarinAssembly,
    GetPixateCssFiles,
}

impl Command {
    pub fn wire_name(self) -> &'static str {
        match self {
            Command::ExecuteAssembly => "ExecuteAssembly",
            Command::GetFileContents => "GetFileContents",
            Command::UpdatePixateCss => "UpdatePixateCSS",
            Command::GetMainXamarinAssembly => "GetMainXamarinAssembly",
            Command::GetPixateCssFiles => "GetPixateCssFiles",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} needs a remote target; the local target has no channel")]
    LocalTarget(Command),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{command} answered with HTTP {status}")]
    Status { command: Command, status: u16 },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
}

impl Transport {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        if address == LOCAL_ADDRESS {
            return Err(TransportError::LocalTarget(Command::ExecuteAssembly));
        }
        let trimmed = address.trim().trim_end_matches('/');
        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn from_config(cfg: &Config, address: &str) -> Result<Self, TransportError> {
        Self::new(address, cfg.timeout("REQUEST_TIMEOUT"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one command and return the raw reply body.
    pub async fn send(&self, command: Command, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/{}", self.base_url, command.wire_name());
        tracing::debug!(%command, bytes = body.len(), "sending command");
        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Status { command, status: resp.status().as_u16() });
        }
        let bytes = resp.bytes().await?;
        tracing::debug!(%command, bytes = bytes.len(), "reply received");
        Ok(bytes.to_vec())
    }

    /// Ship an artifact; an empty or unparseable reply is `None`.
    pub async fn execute_assembly(&self, bytes: Vec<u8>) -> Result<Option<ExecutionResult>, TransportError> {
        let reply = self.send(Command::ExecuteAssembly, bytes).await?;
        Ok(decode_reply(&reply))
    }

    pub async fn get_file_contents(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.send(Command::GetFileContents, path.as_bytes().to_vec()).await
    }

    pub async fn update_style_sheet(&self, path: &str, css: &str) -> Result<(), TransportError> {
        let body = frame::encode(path, css)?;
        self.send(Command::UpdatePixateCss, body).await?;
        Ok(())
    }

    /// Name of the target's main assembly; blank replies mean none.
    pub async fn main_assembly(&self) -> Result<Option<String>, TransportError> {
        let reply = self.send(Command::GetMainXamarinAssembly, Vec::new()).await?;
        let text = String::from_utf8_lossy(&reply).trim().trim_matches('"').to_string();
        Ok(Some(text).filter(|t| !t.is_empty()))
    }

    /// Style-sheet paths the target exposes. `None` when the target does not
    /// answer with a JSON string array.
    pub async fn style_sheet_files(&self) -> Result<Option<Vec<String>>, TransportError> {
        let reply = self.send(Command::GetPixateCssFiles, Vec::new()).await?;
        if reply.is_empty() {
            return Ok(None);
        }
        match serde_json::from_slice::<Vec<String>>(&reply) {
            Ok(files) => Ok(Some(files)),
            Err(e) => {
                tracing::warn!(error = %e, "style sheet list reply ignored");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Executor for Transport {
    async fn execute(&self, artifact: &Artifact) -> anyhow::Result<Option<ExecutionResult>> {
        Ok(self.execute_assembly(artifact.bytes.clone()).await?)
    }
}
