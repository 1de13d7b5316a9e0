//! What a plugin declares about its own protocol support

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CURRENT;

#[derive(Debug, Error)]
pub enum PluginInfoError {
    #[error("decoding version info: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("decoding version info: missing field supportedVersions")]
    NoSupportedVersions,
}

/// Version information a plugin hands to the dispatcher
pub trait PluginInfo {
    /// Supported protocol versions, in the plugin's order of preference
    fn supported_versions(&self) -> &[String];

    /// Writes the VERSION response document
    fn encode(&self, out: &mut dyn Write) -> io::Result<()> {
        let doc = VersionDocument {
            cni_version: CURRENT.to_string(),
            supported_versions: self.supported_versions().to_vec(),
        };
        let mut buf = serde_json::to_vec(&doc)?;
        buf.push(b'\n');
        out.write_all(&buf)?;
        out.flush()
    }

    fn supports(&self, version: &str) -> bool {
        self.supported_versions().iter().any(|v| v == version)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionDocument {
    #[serde(rename = "cniVersion", default)]
    cni_version: String,

    #[serde(rename = "supportedVersions", default)]
    supported_versions: Vec<String>,
}

/// A fixed list of supported versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSupports {
    versions: Vec<String>,
}

impl PluginSupports {
    /// Declares support for `versions`. Order is kept as given.
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
        }
    }

    /// Decodes the output of a plugin's VERSION command
    pub fn decode(bytes: &[u8]) -> Result<Self, PluginInfoError> {
        let doc: VersionDocument = serde_json::from_slice(bytes)?;
        if doc.supported_versions.is_empty() {
            return Err(PluginInfoError::NoSupportedVersions);
        }
        Ok(Self::new(doc.supported_versions))
    }
}

impl PluginInfo for PluginSupports {
    fn supported_versions(&self) -> &[String] {
        &self.versions
    }
}
