//! Encapsulation configuration
//!
//! Plain serde types; loading them from a file is left to the caller.

use crate::extension::extension_by_name;
use crate::net::{Profile, UpperProtocol};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extension entry: which handler to register and whether to build with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSpec {
    /// Handler name ("padding", "test")
    pub name: String,
    /// Apply the extension to outbound SNDUs
    #[serde(default)]
    pub activate: bool,
}

impl ExtensionSpec {
    pub fn new(name: impl Into<String>, activate: bool) -> Self {
        ExtensionSpec {
            name: name.into(),
            activate,
        }
    }

    /// Every built-in extension, registered for decoding only
    pub fn defaults() -> Vec<ExtensionSpec> {
        vec![
            ExtensionSpec::new("padding", false),
            ExtensionSpec::new("test", false),
        ]
    }
}

/// MPEG-TS framing options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpegConfig {
    /// Keep partially filled frames open for the next SNDU
    #[serde(default = "default_packing")]
    pub packing: bool,
    /// PID used when none is derived from the route
    #[serde(default = "default_pid")]
    pub default_pid: u16,
}

fn default_packing() -> bool {
    true
}

fn default_pid() -> u16 {
    0x0100
}

impl Default for MpegConfig {
    fn default() -> Self {
        MpegConfig {
            packing: default_packing(),
            default_pid: default_pid(),
        }
    }
}

/// ULE encapsulation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncapConfig {
    /// Satellite forwarding profile
    #[serde(default)]
    pub profile: Profile,
    /// Protocol carried above ULE
    #[serde(default = "default_upper_protocol")]
    pub upper_protocol: UpperProtocol,
    /// Append and check the CRC-32 trailer
    #[serde(default = "default_crc_enabled")]
    pub crc_enabled: bool,
    /// Extension handlers to register
    #[serde(default = "ExtensionSpec::defaults")]
    pub extensions: Vec<ExtensionSpec>,
    /// MPEG-TS framing
    #[serde(default)]
    pub mpeg: MpegConfig,
}

fn default_upper_protocol() -> UpperProtocol {
    UpperProtocol::Ip
}

fn default_crc_enabled() -> bool {
    true
}

impl Default for EncapConfig {
    fn default() -> Self {
        EncapConfig {
            profile: Profile::default(),
            upper_protocol: default_upper_protocol(),
            crc_enabled: default_crc_enabled(),
            extensions: ExtensionSpec::defaults(),
            mpeg: MpegConfig::default(),
        }
    }
}

impl EncapConfig {
    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.profile.supports(self.upper_protocol) {
            return Err(ConfigError::Invalid(format!(
                "{} is not available in the {:?} profile",
                self.upper_protocol, self.profile
            )));
        }
        if let Some(spec) = self
            .extensions
            .iter()
            .find(|spec| extension_by_name(&spec.name).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "unknown extension '{}'",
                spec.name
            )));
        }
        if self.mpeg.default_pid > crate::mpeg::MAX_PID {
            return Err(ConfigError::Invalid(format!(
                "PID 0x{:x} does not fit in 13 bits",
                self.mpeg.default_pid
            )));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Extension registry: {0}")]
    Registry(#[from] crate::registry::RegistryError),
}
