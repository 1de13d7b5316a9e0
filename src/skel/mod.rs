//! # Plugin Skeleton
//!
//! Everything a CNI plugin binary needs around its network logic.
//!
//! ## Overview
//!
//! The container runtime runs the plugin once per lifecycle event:
//!
//! ```text
//! Runtime                        Plugin
//!  │                               │
//!  ├── env: CNI_COMMAND=ADD ...    │
//!  ├── stdin: {"name": "mynet", "cniVersion": "0.4.0", ...}
//!  │                               │
//!  └── stdout: result JSON, or {"code": 6, "msg": "...", ...} + exit 1
//! ```
//!
//! ## Parameters
//!
//! | Variable | ADD | CHECK | DEL |
//! |----------|-----|-------|-----|
//! | `CNI_COMMAND` | required | required | required |
//! | `CNI_CONTAINERID` | required | required | required |
//! | `CNI_NETNS` | required | required | optional |
//! | `CNI_IFNAME` | required | required | required |
//! | `CNI_ARGS` | optional | optional | optional |
//! | `CNI_PATH` | required | required | required |
//!
//! `VERSION` needs only `CNI_COMMAND` and ignores stdin.
//!
//! ## Entry Points
//!
//! - [`plugin_main`] - Reports errors itself and exits with status 1
//! - [`plugin_main_with_error`] - Returns the error to the caller
//! - [`Dispatcher`] - The same logic over caller-supplied I/O

mod dispatch;
mod request;

use std::io;

pub use dispatch::{validate_config, ConfigDocument, Dispatcher, FnPlugin, HandlerError, Plugin};
pub use request::{
    extract, parse_extra_args, ArgsError, EnvSnapshot, Environment, InvocationRequest, Operation,
    ProcessEnv, CNI_ARGS, CNI_COMMAND, CNI_CONTAINERID, CNI_IFNAME, CNI_NETNS, CNI_PATH,
};

use crate::error::ProtocolError;
use crate::version::PluginInfo;

/// Runs the plugin against the process environment and stdio, returning
/// any protocol error.
///
/// Printing the error and choosing the exit status is left to the caller.
pub fn plugin_main_with_error(
    plugin: &dyn Plugin,
    info: &dyn PluginInfo,
    about: &str,
) -> Result<(), ProtocolError> {
    Dispatcher::new(ProcessEnv, io::stdin().lock(), io::stdout().lock(), io::stderr())
        .dispatch(plugin, info, about)
}

/// Runs the plugin against the process environment and stdio.
///
/// On failure the error document is printed to stdout and the process
/// exits with status 1. `about` is printed to stderr when the plugin is
/// run without `CNI_COMMAND`.
pub fn plugin_main(plugin: &dyn Plugin, info: &dyn PluginInfo, about: &str) {
    if let Err(e) = plugin_main_with_error(plugin, info, about) {
        e.report_to(&mut io::stdout().lock());
        std::process::exit(e.exit_code());
    }
}
