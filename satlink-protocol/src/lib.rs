//! Satellite Link Encapsulation Core
//!
//! This crate implements the link layer of an emulated satellite system:
//! ULE (RFC 4326) SNDU encoding with chained extension headers, and the
//! MPEG-2 Transport Stream framing that carries SNDUs in 188-byte frames.

pub mod config;
pub mod context;
pub mod crc;
pub mod extension;
pub mod framing;
pub mod mpeg;
pub mod net;
pub mod registry;
pub mod ule;

pub use config::{ConfigError, EncapConfig, ExtensionSpec, MpegConfig};
pub use context::{EncapError, EncapStats, UleContext};
pub use extension::{ExtensionStatus, PaddingExtension, TestExtension, UleExtension};
pub use framing::{pid_for_route, FramingStats, MpegError, TsDeframer, TsFrame, TsPacketizer};
pub use mpeg::{MpegFrameContext, TS_PACKET_SIZE};
pub use net::{NetBurst, NetPacket, Profile, ProtocolLayer, Route, UpperLayer, UpperProtocol};
pub use registry::{ExtensionRegistry, RegistryError};
pub use ule::{Sndu, UleError, UlePacket};
