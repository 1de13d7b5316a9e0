//! Version decoding and compatibility decisions

use serde::Deserialize;

use super::semantic::{greater_or_equal, VersionError};
use super::{PluginInfo, CHECK_FLOOR};
use crate::error::{ErrorKind, ProtocolError};

/// Extracts the declared protocol version from a configuration body
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigDecoder;

#[derive(Deserialize)]
struct VersionField {
    #[serde(rename = "cniVersion")]
    cni_version: String,
}

impl ConfigDecoder {
    /// Returns the `cniVersion` field. Invalid JSON, a missing field or an
    /// empty value are all [`ErrorKind::FailedDecode`].
    pub fn decode(&self, body: &[u8]) -> Result<String, ProtocolError> {
        let field: VersionField = serde_json::from_slice(body).map_err(|e| {
            ProtocolError::new(
                ErrorKind::FailedDecode,
                format!("decoding version from network config: {}", e),
                "",
            )
        })?;

        if field.cni_version.is_empty() {
            return Err(ProtocolError::new(
                ErrorKind::FailedDecode,
                "decoding version from network config: empty cniVersion",
                "",
            ));
        }

        Ok(field.cni_version)
    }
}

/// Decides whether a declared version can be served by a plugin
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// General compatibility: the declared version must be one the plugin
    /// lists.
    pub fn check(&self, declared: &str, info: &dyn PluginInfo) -> Result<(), ProtocolError> {
        if info.supports(declared) {
            return Ok(());
        }

        Err(ProtocolError::new(
            ErrorKind::IncompatibleVersion,
            "incompatible CNI versions",
            format!(
                "config is {:?}, plugin supports {:?}",
                declared,
                info.supported_versions()
            ),
        ))
    }

    /// CHECK compatibility.
    ///
    /// The declared version must be at least [`CHECK_FLOOR`], and the
    /// plugin must list a version at least as new as the declared one.
    /// Returns the first such version in the plugin's own order.
    pub fn check_for_check(
        &self,
        declared: &str,
        info: &dyn PluginInfo,
    ) -> Result<String, ProtocolError> {
        if !greater_or_equal(declared, CHECK_FLOOR).map_err(decode_error)? {
            return Err(ProtocolError::new(
                ErrorKind::IncompatibleVersion,
                "config version does not allow CHECK",
                format!("config is {:?}, CHECK requires at least {:?}", declared, CHECK_FLOOR),
            ));
        }

        self.select_for_check(declared, info)
    }

    /// First supported version, in declared order, that is >= `declared`.
    /// The floor is not applied here.
    pub fn select_for_check(
        &self,
        declared: &str,
        info: &dyn PluginInfo,
    ) -> Result<String, ProtocolError> {
        for supported in info.supported_versions() {
            if greater_or_equal(supported, declared).map_err(decode_error)? {
                return Ok(supported.clone());
            }
        }

        Err(ProtocolError::new(
            ErrorKind::IncompatibleVersion,
            "plugin version does not allow CHECK",
            format!(
                "config is {:?}, plugin supports {:?}",
                declared,
                info.supported_versions()
            ),
        ))
    }
}

fn decode_error(e: VersionError) -> ProtocolError {
    ProtocolError::new(ErrorKind::FailedDecode, e.to_string(), "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PluginSupports;

    #[test]
    fn decode_reads_version() {
        let version = ConfigDecoder
            .decode(br#"{"name": "net", "cniVersion": "0.3.1", "type": "bridge"}"#)
            .unwrap();
        assert_eq!(version, "0.3.1");
    }

    #[test]
    fn decode_failures() {
        let bodies: [&[u8]; 4] = [b"{", br#"{"name": "net"}"#, br#"{"cniVersion": ""}"#, b""];
        for body in bodies {
            let err = ConfigDecoder.decode(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FailedDecode, "body {:?}", body);
        }
    }

    #[test]
    fn general_check_names_versions() {
        let info = PluginSupports::new(["0.3.0", "0.4.0"]);
        assert!(Reconciler.check("0.4.0", &info).is_ok());

        let err = Reconciler.check("0.2.0", &info).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleVersion);
        assert!(err.details().contains("0.2.0"));
        assert!(err.details().contains("0.3.0"));
        assert!(err.details().contains("0.4.0"));
    }

    #[test]
    fn select_first_supported_not_older_than_declared() {
        let info = PluginSupports::new(["0.3.0", "0.4.0"]);
        assert_eq!(Reconciler.select_for_check("0.3.1", &info).unwrap(), "0.4.0");

        let err = Reconciler.select_for_check("0.5.0", &info).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleVersion);
    }

    #[test]
    fn select_keeps_declared_order() {
        let info = PluginSupports::new(["1.0.0", "0.4.0"]);
        assert_eq!(Reconciler.select_for_check("0.4.0", &info).unwrap(), "1.0.0");
    }

    #[test]
    fn check_floor_applies_before_selection() {
        let info = PluginSupports::new(["0.3.0", "0.3.1", "0.4.0"]);
        let err = Reconciler.check_for_check("0.3.1", &info).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleVersion);
        assert_eq!(err.message(), "config version does not allow CHECK");

        assert_eq!(Reconciler.check_for_check("0.4.0", &info).unwrap(), "0.4.0");
    }

    #[test]
    fn check_with_malformed_versions_is_decode_error() {
        let info = PluginSupports::new(["zero"]);
        let err = Reconciler.check_for_check("0.4.0", &info).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedDecode);

        let err = Reconciler.check_for_check("four", &info).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedDecode);
    }
}
