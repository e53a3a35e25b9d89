//! Configuration file support for the satlink CLI

use satlink_protocol::config::{EncapConfig, ExtensionSpec, MpegConfig};
use satlink_protocol::net::{Profile, UpperProtocol};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Combined configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Input file (raw payload for `encap`, TS stream for `decap`)
    #[serde(default = "default_input")]
    pub input: String,
    /// Output file
    #[serde(default = "default_output")]
    pub output: String,
    /// Largest upper-layer packet cut from the input stream
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    /// EtherType announced for the payload; defaults to the upper protocol's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ether_type: Option<u16>,
    /// ULE and MPEG-TS settings
    #[serde(default)]
    pub encap: EncapConfig,
}

fn default_input() -> String {
    "-".to_string()
}

fn default_output() -> String {
    "-".to_string()
}

fn default_mtu() -> usize {
    1500
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            input: default_input(),
            output: default_output(),
            mtu: default_mtu(),
            ether_type: None,
            encap: EncapConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: CliConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example configuration carrying ROHC with padding over the regenerative profile
    pub fn example() -> Self {
        CliConfig {
            input: "payload.bin".to_string(),
            output: "payload.ts".to_string(),
            mtu: 1400,
            ether_type: None,
            encap: EncapConfig {
                profile: Profile::Regenerative,
                upper_protocol: UpperProtocol::Rohc,
                crc_enabled: true,
                extensions: vec![
                    ExtensionSpec::new("padding", true),
                    ExtensionSpec::new("test", false),
                ],
                mpeg: MpegConfig {
                    packing: true,
                    default_pid: 0x0100,
                },
            },
        }
    }

    /// EtherType stamped on outbound packets
    pub fn payload_ether_type(&self) -> u16 {
        self.ether_type
            .unwrap_or_else(|| self.encap.upper_protocol.ether_type())
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu == 0 {
            return Err(ConfigError::Invalid("mtu must be positive".to_string()));
        }
        if let Some(ether_type) = self.ether_type {
            if !satlink_protocol::ule::is_ether_type(ether_type) {
                return Err(ConfigError::Invalid(format!(
                    "0x{:04x} is below the EtherType range",
                    ether_type
                )));
            }
        }
        self.encap.validate()?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Encap(#[from] satlink_protocol::config::ConfigError),
}
