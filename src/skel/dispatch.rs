//! Dispatch state machine
//!
//! ```text
//! extract ──► validate config ──► reconcile version ──► handler ──► done
//!    │               │                   │                 │
//!    └───────────────┴───────────────────┴─────────────────┴──► ProtocolError
//! ```

use std::any::Any;
use std::error::Error;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::request::{EnvSnapshot, Environment, InvocationRequest, Operation};
use crate::error::{exit_status, ErrorKind, ProtocolError};
use crate::version::{ConfigDecoder, PluginInfo, Reconciler};

/// Error type handlers return. A boxed [`ProtocolError`] is reported as is.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// The network operations a plugin implements
///
/// `out` is the protocol output stream; ADD results go there.
pub trait Plugin {
    fn add(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError>;

    fn check(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError>;

    fn del(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError>;
}

/// Adapts three closures to [`Plugin`]
pub struct FnPlugin<A, C, D> {
    add: A,
    check: C,
    del: D,
}

impl<A, C, D> FnPlugin<A, C, D>
where
    A: Fn(&InvocationRequest, &mut dyn Write) -> Result<(), HandlerError>,
    C: Fn(&InvocationRequest, &mut dyn Write) -> Result<(), HandlerError>,
    D: Fn(&InvocationRequest, &mut dyn Write) -> Result<(), HandlerError>,
{
    pub fn new(add: A, check: C, del: D) -> Self {
        Self { add, check, del }
    }
}

impl<A, C, D> Plugin for FnPlugin<A, C, D>
where
    A: Fn(&InvocationRequest, &mut dyn Write) -> Result<(), HandlerError>,
    C: Fn(&InvocationRequest, &mut dyn Write) -> Result<(), HandlerError>,
    D: Fn(&InvocationRequest, &mut dyn Write) -> Result<(), HandlerError>,
{
    fn add(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError> {
        (self.add)(request, out)
    }

    fn check(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError> {
        (self.check)(request, out)
    }

    fn del(&self, request: &InvocationRequest, out: &mut dyn Write) -> Result<(), HandlerError> {
        (self.del)(request, out)
    }
}

/// The part of a network configuration the dispatcher looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
///
/// A `null` value counts as absent.
pub struct ConfigDocument {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "cniVersion", default)]
    pub cni_version: Option<String>,

    /// Plugin-specific fields, untouched
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl ConfigDocument {
    /// Parses a body. Valid JSON `null` yields `None`.
    pub fn parse(body: &[u8]) -> Result<Option<Self>, ProtocolError> {
        serde_json::from_slice(body).map_err(|e| {
            ProtocolError::new(
                ErrorKind::FailedDecode,
                format!("error unmarshall network config: {}", e),
                "",
            )
        })
    }
}

/// Checks that the body is JSON and names the network
pub fn validate_config(body: &[u8]) -> Result<ConfigDocument, ProtocolError> {
    match ConfigDocument::parse(body)? {
        Some(doc) if doc.name.as_deref().is_some_and(|name| !name.is_empty()) => Ok(doc),
        _ => Err(ProtocolError::new(
            ErrorKind::InvalidNetworkConfig,
            "missing network name",
            "",
        )),
    }
}

/// Runs one plugin invocation against explicit I/O
///
/// Nothing here touches process globals, so a dispatcher can be driven
/// entirely from memory.
pub struct Dispatcher<E, R, W, D> {
    env: E,
    stdin: R,
    stdout: W,
    stderr: D,
    decoder: ConfigDecoder,
    reconciler: Reconciler,
}

impl<E, R, W, D> Dispatcher<E, R, W, D>
where
    E: Environment,
    R: Read,
    W: Write,
    D: Write,
{
    pub fn new(env: E, stdin: R, stdout: W, stderr: D) -> Self {
        Self {
            env,
            stdin,
            stdout,
            stderr,
            decoder: ConfigDecoder,
            reconciler: Reconciler,
        }
    }

    /// Handles the invocation and returns the protocol error, if any.
    ///
    /// With no `CNI_COMMAND` at all and a non-empty `about`, `about` is
    /// written to stderr and the run counts as a success.
    pub fn dispatch(
        &mut self,
        plugin: &dyn Plugin,
        info: &dyn PluginInfo,
        about: &str,
    ) -> Result<(), ProtocolError> {
        let snapshot = EnvSnapshot::capture(&self.env)?;
        if snapshot.command().is_empty() && !about.is_empty() {
            debug!("no CNI_COMMAND, printing about string");
            if let Err(e) = writeln!(self.stderr, "{}", about) {
                warn!(error = %e, "failed to write about string");
            }
            return Ok(());
        }
        let request = snapshot.into_request(&mut self.stdin)?;

        let operation = request.operation();
        debug!(
            command = %operation,
            container_id = request.container_id(),
            if_name = request.if_name(),
            "dispatching CNI command"
        );

        if operation != Operation::Version {
            validate_config(request.config_body())?;
        }

        match operation {
            Operation::Add => {
                self.reconcile(&request, info)?;
                self.call(|out| plugin.add(&request, out))
            }
            Operation::Check => {
                let declared = self.decoder.decode(request.config_body())?;
                let selected = self.reconciler.check_for_check(&declared, info)?;
                debug!(declared = %declared, selected = %selected, "CHECK version accepted");
                self.call(|out| plugin.check(&request, out))
            }
            Operation::Delete => {
                self.reconcile(&request, info)?;
                self.call(|out| plugin.del(&request, out))
            }
            Operation::Version => info.encode(&mut self.stdout).map_err(|e| {
                ProtocolError::new(ErrorKind::FailedEncode, e.to_string(), "")
            }),
        }
    }

    /// Dispatches, writes any error document to stdout and returns the
    /// exit status.
    pub fn run(&mut self, plugin: &dyn Plugin, info: &dyn PluginInfo, about: &str) -> i32 {
        let result = self.dispatch(plugin, info, about);
        if let Err(e) = &result {
            debug!(code = e.code(), error = %e, "CNI command failed");
            e.report_to(&mut self.stdout);
        }
        exit_status(&result)
    }

    pub fn into_parts(self) -> (W, D) {
        (self.stdout, self.stderr)
    }

    fn reconcile(&self, request: &InvocationRequest, info: &dyn PluginInfo) -> Result<(), ProtocolError> {
        let declared = self.decoder.decode(request.config_body())?;
        self.reconciler.check(&declared, info)
    }

    /// Runs one handler. A panic is caught and reported like an error.
    fn call<F>(&mut self, handler: F) -> Result<(), ProtocolError>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), HandlerError>,
    {
        let out: &mut dyn Write = &mut self.stdout;
        match panic::catch_unwind(AssertUnwindSafe(|| handler(out))) {
            Ok(result) => result.map_err(normalize_handler_error),
            Err(payload) => Err(panic_error(payload)),
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> ProtocolError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    ProtocolError::new(ErrorKind::FailedHandlerCall, message, "plugin handler panicked")
}

/// Typed errors pass through; anything else is wrapped once.
fn normalize_handler_error(err: HandlerError) -> ProtocolError {
    match err.downcast::<ProtocolError>() {
        Ok(typed) => *typed,
        Err(other) => {
            let mut chain = other.to_string();
            let mut source = other.source();
            while let Some(cause) = source {
                chain.push_str(": ");
                chain.push_str(&cause.to_string());
                source = cause.source();
            }
            ProtocolError::new(ErrorKind::FailedHandlerCall, other.to_string(), chain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_named_config() {
        let doc = validate_config(br#"{"name": "net", "cniVersion": "0.4.0", "bridge": "cni0"}"#).unwrap();
        assert_eq!(doc.name.as_deref(), Some("net"));
        assert_eq!(doc.cni_version.as_deref(), Some("0.4.0"));
        assert_eq!(doc.rest["bridge"], "cni0");
    }

    #[test]
    fn validate_rejects_missing_or_empty_name() {
        let bodies: [&[u8]; 5] = [
            br#"{"cniVersion": "0.4.0"}"#,
            br#"{"name": ""}"#,
            br#"{"name": null, "cniVersion": "0.4.0"}"#,
            br#"{"name": null, "cniVersion": null}"#,
            b"null",
        ];
        for body in bodies {
            let err = validate_config(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidNetworkConfig);
            assert_eq!(err.message(), "missing network name");
        }
    }

    #[test]
    fn validate_rejects_bad_json() {
        let err = validate_config(b"{\"name\": ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedDecode);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("netlink request failed")]
    struct NetlinkError(#[source] std::io::Error);

    #[test]
    fn plain_errors_are_wrapped_with_source_chain() {
        let err: HandlerError = Box::new(NetlinkError(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "operation not permitted",
        )));
        let typed = normalize_handler_error(err);

        assert_eq!(typed.kind(), ErrorKind::FailedHandlerCall);
        assert_eq!(typed.message(), "netlink request failed");
        assert_eq!(typed.details(), "netlink request failed: operation not permitted");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = panic_error(Box::new("boom"));
        assert_eq!(err.kind(), ErrorKind::FailedHandlerCall);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.details(), "plugin handler panicked");

        let err = panic_error(Box::new(format!("index {} out of range", 3)));
        assert_eq!(err.message(), "index 3 out of range");

        assert_eq!(panic_error(Box::new(42u8)).message(), "unknown panic payload");
    }

    #[test]
    fn typed_errors_pass_through() {
        let original = ProtocolError::new(ErrorKind::InvalidNetworkConfig, "bad subnet", "10.0.0.0/33");
        let typed = normalize_handler_error(Box::new(original.clone()));
        assert_eq!(typed, original);
    }
}
