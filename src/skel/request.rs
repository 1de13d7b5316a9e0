//! Invocation request extraction
//!
//! The runtime passes the operation and its parameters in `CNI_*`
//! environment variables and the network configuration on stdin.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use thiserror::Error;

use crate::error::{ErrorKind, ProtocolError};

pub const CNI_COMMAND: &str = "CNI_COMMAND";
pub const CNI_CONTAINERID: &str = "CNI_CONTAINERID";
pub const CNI_NETNS: &str = "CNI_NETNS";
pub const CNI_IFNAME: &str = "CNI_IFNAME";
pub const CNI_ARGS: &str = "CNI_ARGS";
pub const CNI_PATH: &str = "CNI_PATH";

/// Lifecycle operation requested by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Check,
    Delete,
    Version,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "ADD",
            Operation::Check => "CHECK",
            Operation::Delete => "DEL",
            Operation::Version => "VERSION",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Operation::Add),
            "CHECK" => Ok(Operation::Check),
            "DEL" => Ok(Operation::Delete),
            "VERSION" => Ok(Operation::Version),
            other => Err(ProtocolError::new(
                ErrorKind::UnknownOperation,
                format!("unknown CNI_COMMAND: {}", other),
                "",
            )),
        }
    }
}

/// Source of environment variables. Unset and empty are the same thing.
pub trait Environment {
    fn var_os(&self, name: &str) -> Option<OsString>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var_os(&self, name: &str) -> Option<OsString> {
        std::env::var_os(name)
    }
}

impl Environment for HashMap<String, String> {
    fn var_os(&self, name: &str) -> Option<OsString> {
        self.get(name).map(OsString::from)
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn var_os(&self, name: &str) -> Option<OsString> {
        (**self).var_os(name)
    }
}

/// Whether a parameter must be present for ADD, CHECK and DEL
struct Requirement {
    name: &'static str,
    add: bool,
    check: bool,
    del: bool,
}

impl Requirement {
    fn required_for(&self, command: &str) -> bool {
        match command {
            "ADD" => self.add,
            "CHECK" => self.check,
            "DEL" => self.del,
            _ => false,
        }
    }
}

/// Parameters in reporting order
const REQUIREMENTS: [Requirement; 6] = [
    Requirement { name: CNI_COMMAND, add: true, check: true, del: true },
    Requirement { name: CNI_CONTAINERID, add: true, check: true, del: true },
    Requirement { name: CNI_NETNS, add: true, check: true, del: false },
    Requirement { name: CNI_IFNAME, add: true, check: true, del: true },
    Requirement { name: CNI_ARGS, add: false, check: false, del: false },
    Requirement { name: CNI_PATH, add: true, check: true, del: true },
];

/// Everything the runtime supplied for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    operation: Operation,
    container_id: String,
    netns: String,
    if_name: String,
    args: String,
    path: String,
    config: Vec<u8>,
}

impl InvocationRequest {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Network namespace path; optional for DEL
    pub fn netns(&self) -> Option<&str> {
        non_empty(&self.netns)
    }

    pub fn if_name(&self) -> &str {
        &self.if_name
    }

    /// Raw `CNI_ARGS`
    pub fn extra_args(&self) -> Option<&str> {
        non_empty(&self.args)
    }

    /// `CNI_ARGS` split into key/value pairs
    pub fn extra_args_pairs(&self) -> Result<Vec<(String, String)>, ProtocolError> {
        parse_extra_args(&self.args).map_err(|e| {
            ProtocolError::new(ErrorKind::InvalidNetworkConfig, e.to_string(), "")
        })
    }

    /// Plugin search path (`CNI_PATH`)
    pub fn search_path(&self) -> &str {
        &self.path
    }

    /// Search path split into directories
    pub fn search_dirs(&self) -> impl Iterator<Item = &str> {
        self.path.split(':').filter(|dir| !dir.is_empty())
    }

    /// Raw network configuration from stdin; empty for VERSION
    pub fn config_body(&self) -> &[u8] {
        &self.config
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// The `CNI_*` variables, read once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSnapshot {
    values: [String; 6],
}

impl EnvSnapshot {
    /// Reads every parameter. A value that is set but not UTF-8 is a
    /// [`ErrorKind::FailedDecode`], not a missing variable.
    pub fn capture(env: &dyn Environment) -> Result<Self, ProtocolError> {
        let mut values: [String; 6] = Default::default();
        for (slot, req) in values.iter_mut().zip(&REQUIREMENTS) {
            if let Some(raw) = env.var_os(req.name) {
                *slot = raw.into_string().map_err(|_| {
                    ProtocolError::new(
                        ErrorKind::FailedDecode,
                        format!("env variable {} is not valid UTF-8", req.name),
                        "",
                    )
                })?;
            }
        }
        Ok(Self { values })
    }

    /// Raw `CNI_COMMAND`, empty when unset
    pub fn command(&self) -> &str {
        &self.values[0]
    }

    /// Validates the parameters for the command and reads stdin.
    ///
    /// Every missing required variable is reported at once. The command
    /// must be known before stdin is touched, and VERSION never reads
    /// stdin.
    pub fn into_request(self, stdin: &mut dyn Read) -> Result<InvocationRequest, ProtocolError> {
        let command = self.command();

        let missing: Vec<&str> = REQUIREMENTS
            .iter()
            .zip(&self.values)
            .filter(|(req, value)| {
                value.is_empty() && (req.name == CNI_COMMAND || req.required_for(command))
            })
            .map(|(req, _)| req.name)
            .collect();

        if !missing.is_empty() {
            return Err(ProtocolError::new(
                ErrorKind::MissingEnvironmentVariables,
                format!("required env variables [{}] missing", missing.join(",")),
                "",
            ));
        }

        let operation: Operation = command.parse()?;

        let mut config = Vec::new();
        if operation != Operation::Version {
            stdin.read_to_end(&mut config).map_err(|e| {
                ProtocolError::new(
                    ErrorKind::FailedIo,
                    format!("error reading from stdin: {}", e),
                    "",
                )
            })?;
        }

        let [_, container_id, netns, if_name, args, path] = self.values;

        Ok(InvocationRequest {
            operation,
            container_id,
            netns,
            if_name,
            args,
            path,
            config,
        })
    }
}

/// Builds a request from the environment and stdin
pub fn extract(env: &dyn Environment, stdin: &mut dyn Read) -> Result<InvocationRequest, ProtocolError> {
    EnvSnapshot::capture(env)?.into_request(stdin)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("ARGS: invalid pair {0:?}")]
    InvalidPair(String),
}

/// Parses `K1=V1;K2=V2`. Values may contain `=`; keys may not be empty.
pub fn parse_extra_args(raw: &str) -> Result<Vec<(String, String)>, ArgsError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    raw.split(';')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ArgsError::InvalidPair(pair.to_string())),
        })
        .collect()
}
