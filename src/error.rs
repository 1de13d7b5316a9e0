//! Protocol error model
//!
//! Every failure a plugin reports to the runtime is a [`ProtocolError`]:
//! a code from a closed set, a message and a free-form details string.
//! On the wire it is a single JSON document on stdout:
//!
//! ```json
//! {"cniVersion": "0.4.0", "code": 3, "msg": "...", "details": "..."}
//! ```
//!
//! The numeric codes are stable; runtimes use them to tell retryable
//! failures from fatal ones.

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::version;

/// Exit status of a plugin run that reported no error
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status of a plugin run that printed an error document
pub const EXIT_FAILURE: i32 = 1;

/// Closed set of protocol error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ErrorKind {
    MissingEnvironmentVariables,
    FailedIo,
    FailedDecode,
    FailedEncode,
    InvalidNetworkConfig,
    IncompatibleVersion,
    UnknownOperation,
    FailedHandlerCall,
    /// Fallback for failures outside the vocabulary above
    Internal,
}

impl ErrorKind {
    /// Every kind, in code order
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::MissingEnvironmentVariables,
        ErrorKind::FailedIo,
        ErrorKind::FailedDecode,
        ErrorKind::FailedEncode,
        ErrorKind::InvalidNetworkConfig,
        ErrorKind::IncompatibleVersion,
        ErrorKind::UnknownOperation,
        ErrorKind::FailedHandlerCall,
        ErrorKind::Internal,
    ];

    /// Returns the wire code. These values must never be reassigned.
    pub const fn code(self) -> u32 {
        match self {
            ErrorKind::MissingEnvironmentVariables => 1,
            ErrorKind::FailedIo => 2,
            ErrorKind::FailedDecode => 3,
            ErrorKind::FailedEncode => 4,
            ErrorKind::InvalidNetworkConfig => 5,
            ErrorKind::IncompatibleVersion => 6,
            ErrorKind::UnknownOperation => 7,
            ErrorKind::FailedHandlerCall => 8,
            ErrorKind::Internal => 999,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingEnvironmentVariables => "missing_environment_variables",
            ErrorKind::FailedIo => "failed_io",
            ErrorKind::FailedDecode => "failed_decode",
            ErrorKind::FailedEncode => "failed_encode",
            ErrorKind::InvalidNetworkConfig => "invalid_network_config",
            ErrorKind::IncompatibleVersion => "incompatible_version",
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::FailedHandlerCall => "failed_handler_call",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown protocol error code: {0}")]
pub struct UnknownCodeError(pub u32);

impl TryFrom<u32> for ErrorKind {
    type Error = UnknownCodeError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or(UnknownCodeError(code))
    }
}

impl From<ErrorKind> for u32 {
    fn from(kind: ErrorKind) -> Self {
        kind.code()
    }
}

/// A typed protocol error
///
/// Created where the failure is detected and carried unchanged to the
/// process boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    kind: ErrorKind,
    message: String,
    details: String,
}

impl ProtocolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: details.into(),
        }
    }

    /// Builds an error from a raw wire code. Codes outside the known set
    /// become [`ErrorKind::Internal`].
    pub fn from_code(code: u32, message: impl Into<String>, details: impl Into<String>) -> Self {
        let kind = ErrorKind::try_from(code).unwrap_or(ErrorKind::Internal);
        Self::new(kind, message, details)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Exit status the process must terminate with after reporting this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }

    /// Wire form of this error
    pub fn to_document(&self) -> ErrorDocument {
        ErrorDocument {
            cni_version: version::CURRENT.to_string(),
            code: self.kind,
            msg: self.message.clone(),
            details: self.details.clone(),
        }
    }

    /// Parses a wire document back into an error
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let doc: ErrorDocument = serde_json::from_slice(bytes)?;
        Ok(doc.into())
    }

    /// Writes the wire document to `out` as one buffered write, so the
    /// stream never carries a partial document.
    pub fn print_to(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut buf = serde_json::to_vec_pretty(&self.to_document())?;
        buf.push(b'\n');
        out.write_all(&buf)?;
        out.flush()
    }

    /// Prints the wire document to stdout
    pub fn print(&self) -> io::Result<()> {
        self.print_to(&mut io::stdout().lock())
    }

    /// Like [`print_to`](Self::print_to) but failures are only logged
    pub fn report_to(&self, out: &mut dyn Write) {
        if let Err(e) = self.print_to(out) {
            warn!(error = %e, code = self.code(), "Error writing error JSON to stdout");
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}; {}", self.message, self.details)
        }
    }
}

impl std::error::Error for ProtocolError {}

/// JSON document a failed plugin run prints on stdout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDocument {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,

    pub code: ErrorKind,

    pub msg: String,

    #[serde(default)]
    pub details: String,
}

impl From<ErrorDocument> for ProtocolError {
    fn from(doc: ErrorDocument) -> Self {
        ProtocolError::new(doc.code, doc.msg, doc.details)
    }
}

/// Maps a dispatch outcome to the process exit status
pub fn exit_status(result: &Result<(), ProtocolError>) -> i32 {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => e.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_ordered() {
        let codes: Vec<u32> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn code_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::try_from(kind.code()), Ok(kind));
        }
        assert_eq!(ErrorKind::try_from(42), Err(UnknownCodeError(42)));
    }

    #[test]
    fn from_code_falls_back_to_internal() {
        let err = ProtocolError::from_code(4242, "boom", "");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), 999);
    }

    #[test]
    fn display_includes_details() {
        let err = ProtocolError::new(ErrorKind::FailedIo, "read failed", "broken pipe");
        assert_eq!(err.to_string(), "read failed; broken pipe");

        let err = ProtocolError::new(ErrorKind::FailedIo, "read failed", "");
        assert_eq!(err.to_string(), "read failed");
    }

    #[test]
    fn print_writes_one_document() {
        let err = ProtocolError::new(ErrorKind::UnknownOperation, "unknown CNI_COMMAND: FROB", "");
        let mut out = Vec::new();
        err.print_to(&mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["cniVersion"], version::CURRENT);
        assert_eq!(value["code"], 7);
        assert_eq!(value["msg"], "unknown CNI_COMMAND: FROB");
        assert_eq!(value["details"], "");
    }

    #[test]
    fn parses_document_without_details() {
        let err = ProtocolError::from_json(br#"{"code": 5, "msg": "missing network name"}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidNetworkConfig);
        assert_eq!(err.details(), "");
    }

    #[test]
    fn rejects_unknown_wire_code() {
        assert!(ProtocolError::from_json(br#"{"code": 12, "msg": "x"}"#).is_err());
    }

    #[test]
    fn exit_status_mapping() {
        assert_eq!(exit_status(&Ok(())), EXIT_SUCCESS);
        let err = ProtocolError::new(ErrorKind::FailedDecode, "bad", "");
        assert_eq!(exit_status(&Err(err)), EXIT_FAILURE);
    }
}
