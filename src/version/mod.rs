//! # Protocol Versions
//!
//! Reconciles the protocol version a network configuration declares
//! (`cniVersion`) with the versions a plugin implements.
//!
//! ## Rules
//!
//! | Operation | Requirement |
//! |-----------|-------------|
//! | ADD, DEL | declared version is one of the plugin's supported versions |
//! | CHECK | declared version >= [`CHECK_FLOOR`] and some supported version >= declared |
//! | VERSION | none, the supported set is printed |
//!
//! ## Key Types
//!
//! - [`ProtocolVersion`] - Parsed, ordered `major.minor.patch`
//! - [`ConfigDecoder`] - Pulls `cniVersion` out of a configuration body
//! - [`Reconciler`] - Compatibility decisions
//! - [`PluginInfo`] / [`PluginSupports`] - What the plugin implements

mod plugin;
mod reconcile;
mod semantic;

pub use plugin::{PluginInfo, PluginInfoError, PluginSupports};
pub use reconcile::{ConfigDecoder, Reconciler};
pub use semantic::{greater_or_equal, ProtocolVersion, VersionError};

/// Protocol version this crate speaks natively
pub const CURRENT: &str = "0.4.0";

/// Oldest configuration version for which CHECK is defined
pub const CHECK_FLOOR: &str = "0.4.0";

/// Every protocol version released up to [`CURRENT`]
pub const ALL: [&str; 5] = ["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_versions_are_ordered_and_end_at_current() {
        let parsed: Vec<ProtocolVersion> = ALL.iter().map(|v| v.parse().unwrap()).collect();
        assert!(parsed.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ALL.last(), Some(&CURRENT));
        assert!(greater_or_equal(CURRENT, CHECK_FLOOR).unwrap());
    }
}
