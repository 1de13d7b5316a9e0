//! Reference plugin that configures nothing
//!
//! `cni-noop` records each invocation and reports whatever its network
//! configuration tells it to. Useful for exercising runtimes and the
//! skeleton itself.
//!
//! ```json
//! {
//!   "name": "test",
//!   "cniVersion": "0.4.0",
//!   "type": "cni-noop",
//!   "reportResult": {"cniVersion": "0.4.0", "ips": []},
//!   "reportError": "no route to host",
//!   "reportErrorCode": 5,
//!   "commandLog": "/tmp/noop.log"
//! }
//! ```
//!
//! `CNI_ARGS` may carry `DEBUG=<path>`, which takes precedence over
//! `commandLog`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{ErrorKind, ProtocolError};
use crate::skel::{HandlerError, InvocationRequest, Plugin};

/// Default versions advertised by `cni-noop`
pub const SUPPORTED_VERSIONS: [&str; 3] = ["0.3.0", "0.3.1", "0.4.0"];

#[derive(Debug, Error)]
pub enum NoopError {
    #[error("{0}")]
    Reported(String),

    #[error("failed to write command log {path}")]
    CommandLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write result")]
    Output(#[source] io::Error),
}

/// Settings read from the network configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoopConfig {
    pub name: String,

    pub cni_version: String,

    /// Printed verbatim on ADD
    #[serde(default)]
    pub report_result: Option<serde_json::Value>,

    /// Fail every command with this message
    #[serde(default)]
    pub report_error: Option<String>,

    /// Wire code for `report_error`; without it the error is untyped
    #[serde(default)]
    pub report_error_code: Option<u32>,

    #[serde(default)]
    pub command_log: Option<PathBuf>,
}

impl NoopConfig {
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(body).map_err(|e| {
            ProtocolError::new(
                ErrorKind::FailedDecode,
                format!("failed to load noop config: {}", e),
                "",
            )
        })
    }
}

/// One line of the command log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub command: String,
    pub container_id: String,
    pub netns: String,
    pub if_name: String,
    pub args: String,
    pub path: String,
    pub stdin: String,
}

impl From<&InvocationRequest> for CommandRecord {
    fn from(req: &InvocationRequest) -> Self {
        Self {
            command: req.operation().to_string(),
            container_id: req.container_id().to_string(),
            netns: req.netns().unwrap_or_default().to_string(),
            if_name: req.if_name().to_string(),
            args: req.extra_args().unwrap_or_default().to_string(),
            path: req.search_path().to_string(),
            stdin: String::from_utf8_lossy(req.config_body()).into_owned(),
        }
    }
}

/// The no-op handler set
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Noop {
    fn handle(&self, req: &InvocationRequest) -> Result<NoopConfig, HandlerError> {
        let config = NoopConfig::parse(req.config_body())?;

        let debug_path = req
            .extra_args_pairs()?
            .into_iter()
            .find(|(key, _)| key == "DEBUG")
            .map(|(_, value)| PathBuf::from(value));

        if let Some(path) = debug_path.or_else(|| config.command_log.clone()) {
            append_record(&path, &CommandRecord::from(req))?;
        }

        if let Some(message) = &config.report_error {
            debug!(message = %message, "reporting configured error");
            let err: HandlerError = match config.report_error_code {
                Some(code) => ProtocolError::from_code(code, message.clone(), "").into(),
                None => NoopError::Reported(message.clone()).into(),
            };
            return Err(err);
        }

        Ok(config)
    }
}

fn append_record(path: &Path, record: &CommandRecord) -> Result<(), NoopError> {
    let to_log_error = |source: io::Error| NoopError::CommandLog {
        path: path.to_path_buf(),
        source,
    };

    let mut line = serde_json::to_vec(record).map_err(|e| to_log_error(e.into()))?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_log_error)?;
    file.write_all(&line).map_err(to_log_error)
}

impl Plugin for Noop {
    fn add(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError> {
        let config = self.handle(request)?;
        let result = config
            .report_result
            .unwrap_or_else(|| serde_json::json!({ "cniVersion": config.cni_version }));

        let mut buf = serde_json::to_vec(&result)?;
        buf.push(b'\n');
        out.write_all(&buf).map_err(NoopError::Output)?;
        Ok(())
    }

    fn check(&self, request: &InvocationRequest, _out: &mut dyn Write) -> Result<(), HandlerError> {
        self.handle(request).map(|_| ())
    }

    fn del(&self, request: &InvocationRequest, _out: &mut dyn Write) -> Result<(), HandlerError> {
        self.handle(request).map(|_| ())
    }
}
