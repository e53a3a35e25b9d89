//! ULE SNDU Structures and Serialization
//!
//! Unidirectional Lightweight Encapsulation (RFC 4326) wraps one network
//! packet into a Subnetwork Data Unit:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-----------------------------+-------------------------------+
//! |D|           Length            |             Type              |
//! +-+-----------------------------+-------------------------------+
//! |     Destination Address (6 bytes, present only when D == 0)   |
//! +---------------------------------------------------------------+
//! |                        Payload ...                            |
//! +---------------------------------------------------------------+
//! |                    CRC-32 (when enabled)                      |
//! +---------------------------------------------------------------+
//! ```
//!
//! The Length field counts payload and CRC bytes. The destination address
//! is accounted for separately, see [`total_length`].

use crate::crc::{Crc32, CRC_SIZE};
use crate::net::{Route, ETHER_TYPE_THRESHOLD};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the fixed SNDU header (D bit + Length, Type)
pub const HEADER_SIZE: usize = 4;

/// Size of the optional destination address
pub const DEST_ADDR_SIZE: usize = 6;

/// Largest value of the 15-bit Length field
pub const MAX_LENGTH: usize = 0x7FFF;

/// Largest Length of an SNDU without destination address
///
/// A D bit of 1 with Length 0x7FFF encodes `0xFF 0xFF`, the End Indicator
/// that marks stuffing in a TS frame.
pub const MAX_LENGTH_NO_ADDR: usize = MAX_LENGTH - 1;

/// D bit in the first header byte: set when the address is absent
const D_BIT: u8 = 0x80;

/// Mask for the Length field (bits 0-14 of the first header word)
const LENGTH_MASK: u16 = 0x7FFF;

/// MAC-style destination address
pub type DestAddr = [u8; DEST_ADDR_SIZE];

/// Compute the on-wire size of an SNDU from its first two bytes
///
/// Returns `None` when fewer than two bytes are available.
pub fn total_length(header: &[u8]) -> Option<usize> {
    if header.len() < 2 {
        return None;
    }
    let addr_len = if header[0] & D_BIT == 0 {
        DEST_ADDR_SIZE
    } else {
        0
    };
    let length = (((header[0] & 0x7F) as usize) << 8) | header[1] as usize;
    Some(HEADER_SIZE + addr_len + length)
}

/// Read the Type field of an SNDU header
pub fn payload_type(header: &[u8]) -> Option<u16> {
    header
        .get(2..HEADER_SIZE)
        .map(|t| u16::from_be_bytes([t[0], t[1]]))
}

/// Check whether a Type field carries an EtherType rather than an extension
#[inline]
pub fn is_ether_type(payload_type: u16) -> bool {
    payload_type >= ETHER_TYPE_THRESHOLD
}

/// One ULE SNDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlePacket {
    /// Length field: payload plus CRC bytes
    pub length: u16,
    /// Type field: EtherType or Next-Header encoding
    pub payload_type: u16,
    /// Destination address, present iff the D bit is clear
    pub dest_addr: Option<DestAddr>,
    /// Payload bytes (extension headers included)
    pub payload: Bytes,
    /// Trailing CRC, present iff CRC is enabled
    pub crc: Option<u32>,
    /// Routing metadata
    pub route: Route,
}

impl UlePacket {
    /// Build an SNDU around a payload
    ///
    /// The Length field and, when `crc_enabled`, the CRC trailer are
    /// computed here.
    pub fn build(
        payload_type: u16,
        dest_addr: Option<DestAddr>,
        payload: Bytes,
        crc_enabled: bool,
    ) -> Result<Self, UleError> {
        let crc_len = if crc_enabled { CRC_SIZE } else { 0 };
        let max_length = if dest_addr.is_some() {
            MAX_LENGTH
        } else {
            MAX_LENGTH_NO_ADDR
        };
        let length = payload.len() + crc_len;
        if length > max_length {
            return Err(UleError::PayloadTooLarge {
                size: payload.len(),
                max: max_length - crc_len,
            });
        }

        let mut packet = UlePacket {
            length: length as u16,
            payload_type,
            dest_addr,
            payload,
            crc: None,
            route: Route::default(),
        };
        if crc_enabled {
            packet.crc = Some(packet.compute_crc());
        }
        Ok(packet)
    }

    /// Attach routing metadata
    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Whether the destination address is carried (D bit clear)
    #[inline]
    pub fn dest_addr_present(&self) -> bool {
        self.dest_addr.is_some()
    }

    /// Encoded header: D bit, Length, Type
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut first = ((self.length & LENGTH_MASK) >> 8) as u8;
        if self.dest_addr.is_none() {
            first |= D_BIT;
        }
        let [type_hi, type_lo] = self.payload_type.to_be_bytes();
        [first, (self.length & 0xFF) as u8, type_hi, type_lo]
    }

    /// CRC over header, address and payload
    pub fn compute_crc(&self) -> u32 {
        let mut crc = Crc32::new();
        crc.update(&self.header_bytes());
        if let Some(addr) = &self.dest_addr {
            crc.update(addr);
        }
        crc.update(&self.payload);
        crc.finish()
    }

    /// Check the CRC trailer
    ///
    /// Always true when CRC is disabled. A packet expected to carry a CRC
    /// but holding none is invalid.
    pub fn is_valid(&self, crc_enabled: bool) -> bool {
        if !crc_enabled {
            return true;
        }
        match self.crc {
            Some(crc) => crc == self.compute_crc(),
            None => false,
        }
    }

    /// Whether the Type field announces an extension header
    pub fn has_extension(&self) -> bool {
        !is_ether_type(self.payload_type)
    }

    /// Total size on the wire
    pub fn size(&self) -> usize {
        let addr_len = if self.dest_addr.is_some() {
            DEST_ADDR_SIZE
        } else {
            0
        };
        let crc_len = if self.crc.is_some() { CRC_SIZE } else { 0 };
        HEADER_SIZE + addr_len + self.payload.len() + crc_len
    }

    /// Serialize the SNDU to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(&self.header_bytes());
        if let Some(addr) = &self.dest_addr {
            buf.put_slice(addr);
        }
        buf.put_slice(&self.payload);
        if let Some(crc) = self.crc {
            buf.put_u32(crc);
        }
        buf
    }

    /// Serialize into a raw SNDU keeping the routing metadata
    pub fn to_sndu(&self) -> Sndu {
        Sndu::new(self.to_bytes().freeze(), self.route)
    }

    /// Parse an SNDU from bytes (network byte order)
    ///
    /// Bytes beyond the size announced by the header are ignored. The CRC is
    /// read but not checked, see [`is_valid`](Self::is_valid).
    pub fn from_bytes(bytes: &[u8], crc_enabled: bool) -> Result<Self, UleError> {
        if bytes.len() < HEADER_SIZE {
            return Err(UleError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        if bytes[..2] == [0xFF, 0xFF] {
            return Err(UleError::MalformedHeader("End Indicator instead of an SNDU"));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let first_word = buf.get_u16();
        let payload_type = buf.get_u16();
        let length = first_word & LENGTH_MASK;
        let addr_present = bytes[0] & D_BIT == 0;

        // never None: at least HEADER_SIZE bytes are present
        let total = total_length(bytes).unwrap_or(HEADER_SIZE);
        if bytes.len() < total {
            return Err(UleError::Truncated {
                expected: total,
                actual: bytes.len(),
            });
        }

        let crc_len = if crc_enabled { CRC_SIZE } else { 0 };
        if (length as usize) < crc_len {
            return Err(UleError::MalformedHeader(
                "length field shorter than the CRC trailer",
            ));
        }

        let mut offset = HEADER_SIZE;
        let dest_addr = if addr_present {
            let mut addr = [0u8; DEST_ADDR_SIZE];
            addr.copy_from_slice(&bytes[offset..offset + DEST_ADDR_SIZE]);
            offset += DEST_ADDR_SIZE;
            Some(addr)
        } else {
            None
        };

        let payload_end = total - crc_len;
        let payload = Bytes::copy_from_slice(&bytes[offset..payload_end]);
        let crc = if crc_enabled {
            let mut trailer = &bytes[payload_end..total];
            Some(trailer.get_u32())
        } else {
            None
        };

        Ok(UlePacket {
            length,
            payload_type,
            dest_addr,
            payload,
            crc,
            route: Route::default(),
        })
    }
}

/// Raw SNDU bytes with their routing metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sndu {
    pub data: Bytes,
    pub route: Route,
}

impl Sndu {
    pub fn new(data: Bytes, route: Route) -> Self {
        Sndu { data, route }
    }
}

/// SNDU parsing and building errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UleError {
    #[error("Truncated SNDU: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Malformed SNDU header: {0}")]
    MalformedHeader(&'static str),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
