//! ULE encapsulation context
//!
//! Turns upper-layer packets into SNDUs, running them through the active
//! extension chain, and turns SNDUs back into upper-layer packets by peeling
//! off every extension header announced in the Type field.
//!
//! Failures are per packet: the burst operations drop the offending packet,
//! log why, and carry on with the rest of the burst.

use crate::config::{ConfigError, EncapConfig};
use crate::extension::{
    split_next_header, ExtensionStatus, UleExtension, MANDATORY_HLEN, MAX_OPTIONAL_HLEN,
};
use crate::net::{NetBurst, NetPacket, Profile, ProtocolLayer, UpperLayer};
use crate::registry::ExtensionRegistry;
use crate::ule::{self, is_ether_type, Sndu, UleError, UlePacket};
use std::sync::Arc;
use thiserror::Error;

/// Per-packet encapsulation and decapsulation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncapError {
    #[error("Malformed SNDU: {0}")]
    MalformedHeader(#[from] UleError),

    #[error("CRC mismatch")]
    InvalidCrc,

    #[error("No {} extension registered for type 0x{ext_type:02x}", extension_kind(.mandatory))]
    UnsupportedExtension { ext_type: u8, mandatory: bool },

    #[error("Reserved extension H-LEN {0}")]
    MalformedExtensionLength(u8),

    #[error("Extension '{name}' failed to build: {reason}")]
    ExtensionBuildFailed { name: &'static str, reason: String },

    #[error("Extension '{name}' failed to decode: {reason}")]
    ExtensionDecodeFailed { name: &'static str, reason: String },

    #[error("Extension 0x{0:02x} requested discard")]
    ExtensionDiscardRequested(u8),

    #[error("Extension 0x{ext_type:02x} already registered as {}", extension_kind(.mandatory))]
    DuplicateExtensionRegistration { ext_type: u8, mandatory: bool },

    #[error("Upper layer rejected payload of type 0x{ether_type:04x}")]
    UpperLayerRejected { ether_type: u16 },
}

fn extension_kind(mandatory: &bool) -> &'static str {
    if *mandatory {
        "mandatory"
    } else {
        "optional"
    }
}

impl EncapError {
    /// Protocol-mandated silent drop rather than a failure
    pub fn is_discard(&self) -> bool {
        matches!(self, EncapError::ExtensionDiscardRequested(_))
    }
}

/// Burst processing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncapStats {
    /// Upper-layer packets offered for encapsulation
    pub encap_in: u64,
    /// SNDUs produced
    pub encap_out: u64,
    /// SNDUs offered for decapsulation
    pub decap_in: u64,
    /// Upper-layer packets recovered
    pub decap_out: u64,
    /// Packets dropped on error
    pub dropped: u64,
    /// Packets discarded on an extension's request
    pub discarded: u64,
}

/// ULE encapsulation context
pub struct UleContext {
    registry: ExtensionRegistry,
    upper: Arc<dyn UpperLayer>,
    profile: Profile,
    crc_enabled: bool,
    stats: EncapStats,
}

impl UleContext {
    /// Create a context around an existing registry
    pub fn new(
        registry: ExtensionRegistry,
        upper: Arc<dyn UpperLayer>,
        crc_enabled: bool,
    ) -> Self {
        UleContext {
            registry,
            upper,
            profile: Profile::default(),
            crc_enabled,
            stats: EncapStats::default(),
        }
    }

    /// Create a context from configuration, using the built-in protocol layer
    pub fn from_config(config: &EncapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = ExtensionRegistry::from_config(&config.extensions)?;
        let upper = Arc::new(ProtocolLayer::new(config.upper_protocol));
        Ok(Self::new(registry, upper, config.crc_enabled).with_profile(config.profile))
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.registry
    }

    /// Register an extension handler with the context's registry
    ///
    /// A handler already present for the same magic number and kind is kept
    /// and the new one is refused.
    pub fn add_extension(
        &mut self,
        handler: Arc<dyn UleExtension>,
        activate: bool,
    ) -> Result<(), EncapError> {
        let ext_type = handler.ext_type();
        let mandatory = handler.is_mandatory();
        self.registry
            .add_extension(handler, activate)
            .map_err(|_| EncapError::DuplicateExtensionRegistration { ext_type, mandatory })
    }

    pub fn upper_layer(&self) -> &dyn UpperLayer {
        self.upper.as_ref()
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn crc_enabled(&self) -> bool {
        self.crc_enabled
    }

    pub fn stats(&self) -> EncapStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = EncapStats::default();
    }

    /// Handler announced by a Next-Header Type field
    pub fn extension_for(
        &self,
        payload_type: u16,
    ) -> Result<&Arc<dyn UleExtension>, EncapError> {
        let (hlen, ext_type) = split_next_header(payload_type);
        if hlen > MAX_OPTIONAL_HLEN {
            return Err(EncapError::MalformedExtensionLength(hlen));
        }
        self.registry
            .lookup(hlen, ext_type)
            .ok_or(EncapError::UnsupportedExtension {
                ext_type,
                mandatory: hlen == MANDATORY_HLEN,
            })
    }

    /// Encapsulate one upper-layer packet
    pub fn encapsulate_packet(&self, packet: &NetPacket) -> Result<UlePacket, EncapError> {
        let mut payload_type = packet.ether_type;
        let mut payload = packet.data.clone();

        for ext in self.registry.build_order() {
            match ext.build(payload_type, payload) {
                ExtensionStatus::Ok {
                    payload_type: next_type,
                    payload: next_payload,
                } => {
                    tracing::trace!(
                        name = ext.name(),
                        payload_type = next_type,
                        len = next_payload.len(),
                        "extension built"
                    );
                    payload_type = next_type;
                    payload = next_payload;
                }
                ExtensionStatus::Discard => {
                    return Err(EncapError::ExtensionDiscardRequested(ext.ext_type()));
                }
                ExtensionStatus::Error(reason) => {
                    return Err(EncapError::ExtensionBuildFailed {
                        name: ext.name(),
                        reason,
                    });
                }
            }
        }

        let sndu = UlePacket::build(payload_type, None, payload, self.crc_enabled)?;
        Ok(sndu.with_route(packet.route))
    }

    /// Decapsulate one SNDU
    pub fn decapsulate_packet(&self, sndu: &Sndu) -> Result<NetPacket, EncapError> {
        let packet = UlePacket::from_bytes(&sndu.data, self.crc_enabled)?;
        if !packet.is_valid(self.crc_enabled) {
            return Err(EncapError::InvalidCrc);
        }

        let mut payload_type = packet.payload_type;
        let mut payload = packet.payload;

        while !is_ether_type(payload_type) {
            let ext = self.extension_for(payload_type)?;
            let (hlen, _) = split_next_header(payload_type);
            match ext.decode(hlen, payload) {
                ExtensionStatus::Ok {
                    payload_type: next_type,
                    payload: next_payload,
                } => {
                    tracing::trace!(
                        name = ext.name(),
                        payload_type = next_type,
                        len = next_payload.len(),
                        "extension decoded"
                    );
                    payload_type = next_type;
                    payload = next_payload;
                }
                ExtensionStatus::Discard => {
                    return Err(EncapError::ExtensionDiscardRequested(ext.ext_type()));
                }
                ExtensionStatus::Error(reason) => {
                    return Err(EncapError::ExtensionDecodeFailed {
                        name: ext.name(),
                        reason,
                    });
                }
            }
        }

        self.upper
            .build(payload_type, payload, sndu.route)
            .ok_or(EncapError::UpperLayerRejected {
                ether_type: payload_type,
            })
    }

    /// Encapsulate a burst, dropping packets that fail
    pub fn encapsulate(&mut self, burst: NetBurst) -> Vec<UlePacket> {
        let mut sndus = Vec::with_capacity(burst.len());
        for packet in burst {
            self.stats.encap_in += 1;
            match self.encapsulate_packet(&packet) {
                Ok(sndu) => {
                    self.stats.encap_out += 1;
                    sndus.push(sndu);
                }
                Err(e) => self.record_drop("encapsulation", packet.ether_type, &e),
            }
        }
        sndus
    }

    /// Decapsulate a burst, dropping SNDUs that fail or are discarded
    pub fn decapsulate(&mut self, burst: Vec<Sndu>) -> NetBurst {
        let mut packets = Vec::with_capacity(burst.len());
        for sndu in burst {
            self.stats.decap_in += 1;
            match self.decapsulate_packet(&sndu) {
                Ok(packet) => {
                    self.stats.decap_out += 1;
                    packets.push(packet);
                }
                Err(e) => {
                    let payload_type = ule::payload_type(&sndu.data).unwrap_or_default();
                    self.record_drop("decapsulation", payload_type, &e);
                }
            }
        }
        packets
    }

    fn record_drop(&mut self, stage: &'static str, payload_type: u16, error: &EncapError) {
        if error.is_discard() {
            self.stats.discarded += 1;
            tracing::debug!(stage, payload_type, "packet discarded: {}", error);
        } else {
            self.stats.dropped += 1;
            tracing::warn!(stage, payload_type, "packet dropped: {}", error);
        }
    }
}
