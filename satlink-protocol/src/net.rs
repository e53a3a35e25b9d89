//! Upper-layer packets and protocol handlers
//!
//! The encapsulation layer sits below a chain of network protocols (ROHC,
//! PHS, IP, Ethernet). This module holds the packet container exchanged with
//! that chain, the routing metadata travelling alongside every packet, and the
//! [`UpperLayer`] seam used to rebuild packets on the receive path.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// EtherType values below this are ULE Next-Header encodings (RFC 4326)
pub const ETHER_TYPE_THRESHOLD: u16 = 1536;

/// IPv4
pub const ETHER_TYPE_IPV4: u16 = 0x0800;
/// IPv6
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;
/// Robust Header Compression
pub const ETHER_TYPE_ROHC: u16 = 0x22F1;
/// Transparent Ethernet bridging
pub const ETHER_TYPE_ETHERNET: u16 = 0x6558;
/// Payload Header Suppression (IEEE local experimental EtherType)
pub const ETHER_TYPE_PHS: u16 = 0x88B5;

/// Length of an Ethernet MAC header (dst, src, type)
const ETH_HEADER_LEN: usize = 14;

/// Routing metadata carried next to a packet, never on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Route {
    /// QoS class
    pub qos: u8,
    /// Source terminal
    pub src_tal_id: u16,
    /// Destination terminal
    pub dst_tal_id: u16,
    /// Destination spot beam
    pub dst_spot: u16,
}

impl Route {
    pub fn new(qos: u8, src_tal_id: u16, dst_tal_id: u16, dst_spot: u16) -> Self {
        Route {
            qos,
            src_tal_id,
            dst_tal_id,
            dst_spot,
        }
    }
}

/// Upper-layer network packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetPacket {
    /// Protocol of `data` as an EtherType
    pub ether_type: u16,
    /// Packet bytes
    pub data: Bytes,
    /// Routing metadata
    pub route: Route,
}

impl NetPacket {
    pub fn new(ether_type: u16, data: Bytes, route: Route) -> Self {
        NetPacket {
            ether_type,
            data,
            route,
        }
    }

    /// Packet length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered group of packets processed together
pub type NetBurst = Vec<NetPacket>;

/// Protocols that may sit directly above the encapsulation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpperProtocol {
    Rohc,
    Phs,
    Ip,
    Ethernet,
}

impl UpperProtocol {
    /// Parse a protocol name as written in configuration
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rohc" => Some(UpperProtocol::Rohc),
            "phs" => Some(UpperProtocol::Phs),
            "ip" => Some(UpperProtocol::Ip),
            "ethernet" => Some(UpperProtocol::Ethernet),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UpperProtocol::Rohc => "ROHC",
            UpperProtocol::Phs => "PHS",
            UpperProtocol::Ip => "IP",
            UpperProtocol::Ethernet => "Ethernet",
        }
    }

    /// EtherType this protocol is announced with
    ///
    /// IP announces IPv4; IPv6 is accepted as well, see [`accepts`](Self::accepts).
    pub fn ether_type(self) -> u16 {
        match self {
            UpperProtocol::Rohc => ETHER_TYPE_ROHC,
            UpperProtocol::Phs => ETHER_TYPE_PHS,
            UpperProtocol::Ip => ETHER_TYPE_IPV4,
            UpperProtocol::Ethernet => ETHER_TYPE_ETHERNET,
        }
    }

    /// Check whether an EtherType belongs to this protocol
    pub fn accepts(self, ether_type: u16) -> bool {
        match self {
            UpperProtocol::Ip => ether_type == ETHER_TYPE_IPV4 || ether_type == ETHER_TYPE_IPV6,
            other => ether_type == other.ether_type(),
        }
    }
}

impl fmt::Display for UpperProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Satellite forwarding profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Transparent,
    Regenerative,
}

impl Profile {
    /// Upper protocols that can be stacked on the encapsulation layer
    pub fn upper_protocols(self) -> &'static [UpperProtocol] {
        const ALL: [UpperProtocol; 4] = [
            UpperProtocol::Rohc,
            UpperProtocol::Phs,
            UpperProtocol::Ip,
            UpperProtocol::Ethernet,
        ];
        match self {
            Profile::Transparent | Profile::Regenerative => &ALL,
        }
    }

    pub fn supports(self, protocol: UpperProtocol) -> bool {
        self.upper_protocols().contains(&protocol)
    }
}

/// Protocol handler above the encapsulation layer
///
/// Decapsulation hands every recovered payload to one of these. Returning
/// `None` from [`build`](UpperLayer::build) rejects the payload.
pub trait UpperLayer: Send + Sync {
    /// Human readable protocol name
    fn name(&self) -> &str;

    /// Default EtherType of packets produced by this handler
    fn ether_type(&self) -> u16;

    /// Check whether a decoded EtherType is handled here
    fn accepts(&self, ether_type: u16) -> bool {
        ether_type == self.ether_type()
    }

    /// Rebuild an upper-layer packet from a decapsulated payload
    fn build(&self, ether_type: u16, data: Bytes, route: Route) -> Option<NetPacket>;
}

/// Built-in handler performing the sanity checks of each protocol
#[derive(Debug, Clone, Copy)]
pub struct ProtocolLayer {
    protocol: UpperProtocol,
}

impl ProtocolLayer {
    pub fn new(protocol: UpperProtocol) -> Self {
        ProtocolLayer { protocol }
    }

    pub fn protocol(&self) -> UpperProtocol {
        self.protocol
    }

    fn well_formed(&self, ether_type: u16, data: &[u8]) -> bool {
        match self.protocol {
            UpperProtocol::Ip => match data.first().map(|b| b >> 4) {
                Some(4) => ether_type == ETHER_TYPE_IPV4,
                Some(6) => ether_type == ETHER_TYPE_IPV6,
                _ => false,
            },
            UpperProtocol::Ethernet => data.len() >= ETH_HEADER_LEN,
            UpperProtocol::Rohc | UpperProtocol::Phs => !data.is_empty(),
        }
    }
}

impl UpperLayer for ProtocolLayer {
    fn name(&self) -> &str {
        self.protocol.name()
    }

    fn ether_type(&self) -> u16 {
        self.protocol.ether_type()
    }

    fn accepts(&self, ether_type: u16) -> bool {
        self.protocol.accepts(ether_type)
    }

    fn build(&self, ether_type: u16, data: Bytes, route: Route) -> Option<NetPacket> {
        if !self.accepts(ether_type) || !self.well_formed(ether_type, &data) {
            return None;
        }
        Some(NetPacket::new(ether_type, data, route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        assert_eq!(UpperProtocol::from_name("ROHC"), Some(UpperProtocol::Rohc));
        assert_eq!(UpperProtocol::from_name("ip"), Some(UpperProtocol::Ip));
        assert_eq!(UpperProtocol::from_name("gse"), None);
        assert_eq!(UpperProtocol::Ethernet.to_string(), "Ethernet");
    }

    #[test]
    fn test_profiles_offer_all_protocols() {
        for profile in [Profile::Transparent, Profile::Regenerative] {
            assert!(profile.supports(UpperProtocol::Rohc));
            assert!(profile.supports(UpperProtocol::Phs));
            assert!(profile.supports(UpperProtocol::Ip));
            assert!(profile.supports(UpperProtocol::Ethernet));
        }
    }

    #[test]
    fn test_ip_layer_checks_version() {
        let layer = ProtocolLayer::new(UpperProtocol::Ip);
        let route = Route::new(1, 2, 3, 4);

        let v4 = Bytes::from_static(&[0x45, 0x00, 0x00, 0x14]);
        let pkt = layer.build(ETHER_TYPE_IPV4, v4.clone(), route).unwrap();
        assert_eq!(pkt.ether_type, ETHER_TYPE_IPV4);
        assert_eq!(pkt.route, route);

        // IPv4 bytes announced as IPv6
        assert!(layer.build(ETHER_TYPE_IPV6, v4, route).is_none());

        let v6 = Bytes::from_static(&[0x60, 0x00, 0x00, 0x00]);
        assert!(layer.build(ETHER_TYPE_IPV6, v6, route).is_some());

        assert!(layer.build(ETHER_TYPE_IPV4, Bytes::new(), route).is_none());
    }

    #[test]
    fn test_layer_rejects_foreign_ether_type() {
        let layer = ProtocolLayer::new(UpperProtocol::Rohc);
        let data = Bytes::from_static(b"compressed");
        assert!(layer.build(ETHER_TYPE_IPV4, data.clone(), Route::default()).is_none());
        assert!(layer.build(ETHER_TYPE_ROHC, data, Route::default()).is_some());
    }

    #[test]
    fn test_ethernet_layer_needs_mac_header() {
        let layer = ProtocolLayer::new(UpperProtocol::Ethernet);
        let short = Bytes::from(vec![0u8; 13]);
        let frame = Bytes::from(vec![0u8; 64]);
        assert!(layer.build(ETHER_TYPE_ETHERNET, short, Route::default()).is_none());
        assert!(layer.build(ETHER_TYPE_ETHERNET, frame, Route::default()).is_some());
    }
}
