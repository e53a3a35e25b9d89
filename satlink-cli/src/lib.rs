//! Satlink CLI Library
//!
//! Shared functionality for the `satlink` command-line tool.

pub mod config;
pub mod layer;
pub mod stats;

pub use config::{CliConfig, ConfigError};
pub use layer::StreamLayer;
pub use stats::{display_decap_summary, display_encap_summary, format_bytes};
