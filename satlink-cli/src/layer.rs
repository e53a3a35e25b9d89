//! Upper layer for opaque byte streams
//!
//! The CLI cuts arbitrary files into packets, so the payload cannot pass the
//! content checks of the built-in protocol layers. This layer only checks the
//! EtherType.

use bytes::Bytes;
use satlink_protocol::net::{NetPacket, Route, UpperLayer};

#[derive(Debug, Clone, Copy)]
pub struct StreamLayer {
    ether_type: u16,
}

impl StreamLayer {
    pub fn new(ether_type: u16) -> Self {
        StreamLayer { ether_type }
    }
}

impl UpperLayer for StreamLayer {
    fn name(&self) -> &str {
        "stream"
    }

    fn ether_type(&self) -> u16 {
        self.ether_type
    }

    fn build(&self, ether_type: u16, data: Bytes, route: Route) -> Option<NetPacket> {
        if !self.accepts(ether_type) {
            return None;
        }
        Some(NetPacket::new(ether_type, data, route))
    }
}
