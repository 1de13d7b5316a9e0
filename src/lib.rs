//! cni-skel - Invocation skeleton for CNI network plugins
//!
//! A CNI plugin is a short-lived process the container runtime runs once
//! per lifecycle event. This crate handles the envelope around the
//! plugin's network logic: reading `CNI_*` variables and the network
//! configuration, reconciling protocol versions, routing to the right
//! handler and reporting failures as protocol error documents.

pub mod error;
pub mod logging;
pub mod noop;
pub mod skel;
pub mod version;

pub use error::{ErrorKind, ProtocolError};
pub use skel::{
    plugin_main, plugin_main_with_error, Dispatcher, FnPlugin, HandlerError, InvocationRequest,
    Operation, Plugin,
};
pub use version::{PluginInfo, PluginSupports};
