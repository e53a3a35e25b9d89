//! ULE extension headers
//!
//! When the SNDU Type field is below 1536 it is a Next-Header encoding:
//!
//! ```text
//! +---------+-------+-----------------+
//! | 0 0 0 0 0| H-LEN |     H-Type     |
//! +---------+-------+-----------------+
//!   5 bits    3 bits      8 bits
//! ```
//!
//! H-LEN 0 marks a mandatory extension, 1 to 5 an optional extension of
//! `2 * H-LEN` bytes whose last 16-bit word is the next Type field. H-LEN 6
//! and 7 are reserved.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// H-LEN value of mandatory extensions
pub const MANDATORY_HLEN: u8 = 0;

/// Largest H-LEN of an optional extension
pub const MAX_OPTIONAL_HLEN: u8 = 5;

/// Encode an H-LEN / H-Type pair into a Type field
#[inline]
pub fn next_header(hlen: u8, ext_type: u8) -> u16 {
    (((hlen & 0x07) as u16) << 8) | ext_type as u16
}

/// Split a Type field into its H-LEN and H-Type parts
#[inline]
pub fn split_next_header(payload_type: u16) -> (u8, u8) {
    (((payload_type >> 8) & 0x07) as u8, (payload_type & 0xFF) as u8)
}

/// Outcome of building or decoding one extension header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionStatus {
    /// Header processed; carries the Type and payload seen by the next stage
    Ok { payload_type: u16, payload: Bytes },
    /// The SNDU must be silently dropped
    Discard,
    /// The header could not be processed
    Error(String),
}

/// Handler for one extension header type
///
/// Implementations are stateless: everything they produce is returned in
/// the [`ExtensionStatus`].
pub trait UleExtension: Send + Sync + fmt::Debug {
    /// H-Type magic number
    fn ext_type(&self) -> u8;

    /// Whether the extension is mandatory (H-LEN 0)
    fn is_mandatory(&self) -> bool;

    /// Name used in configuration and logs
    fn name(&self) -> &'static str;

    /// Wrap `payload` in this extension, `payload_type` becoming the next Type
    fn build(&self, payload_type: u16, payload: Bytes) -> ExtensionStatus;

    /// Strip this extension from `payload`
    fn decode(&self, hlen: u8, payload: Bytes) -> ExtensionStatus;
}

/// Optional padding extension (H-Type 0x00)
///
/// Builds four zero 16-bit words followed by the next Type, i.e. H-LEN 5.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaddingExtension;

impl PaddingExtension {
    pub const TYPE: u8 = 0x00;
    const PADDING_WORDS: usize = 4;

    pub fn new() -> Self {
        PaddingExtension
    }
}

impl UleExtension for PaddingExtension {
    fn ext_type(&self) -> u8 {
        Self::TYPE
    }

    fn is_mandatory(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "padding"
    }

    fn build(&self, payload_type: u16, payload: Bytes) -> ExtensionStatus {
        let header_len = (Self::PADDING_WORDS + 1) * 2;
        let mut buf = BytesMut::with_capacity(header_len + payload.len());
        buf.put_bytes(0, Self::PADDING_WORDS * 2);
        buf.put_u16(payload_type);
        buf.put_slice(&payload);

        ExtensionStatus::Ok {
            payload_type: next_header((Self::PADDING_WORDS + 1) as u8, Self::TYPE),
            payload: buf.freeze(),
        }
    }

    fn decode(&self, hlen: u8, payload: Bytes) -> ExtensionStatus {
        if hlen == MANDATORY_HLEN || hlen > MAX_OPTIONAL_HLEN {
            return ExtensionStatus::Error(format!("invalid H-LEN {} for padding", hlen));
        }
        let header_len = hlen as usize * 2;
        if payload.len() < header_len {
            return ExtensionStatus::Error(format!(
                "padding header needs {} bytes, got {}",
                header_len,
                payload.len()
            ));
        }
        let payload_type = u16::from_be_bytes([payload[header_len - 2], payload[header_len - 1]]);
        ExtensionStatus::Ok {
            payload_type,
            payload: payload.slice(header_len..),
        }
    }
}

/// Mandatory Test SNDU extension (H-Type 0x00)
///
/// Receivers always discard Test SNDUs (RFC 4326 section 5.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct TestExtension;

impl TestExtension {
    pub const TYPE: u8 = 0x00;

    pub fn new() -> Self {
        TestExtension
    }
}

impl UleExtension for TestExtension {
    fn ext_type(&self) -> u8 {
        Self::TYPE
    }

    fn is_mandatory(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "test"
    }

    fn build(&self, _payload_type: u16, payload: Bytes) -> ExtensionStatus {
        // the Test SNDU carries no next Type: whatever follows is opaque
        ExtensionStatus::Ok {
            payload_type: next_header(MANDATORY_HLEN, Self::TYPE),
            payload,
        }
    }

    fn decode(&self, _hlen: u8, _payload: Bytes) -> ExtensionStatus {
        ExtensionStatus::Discard
    }
}

/// Create a handler from its configuration name
pub fn extension_by_name(name: &str) -> Option<Arc<dyn UleExtension>> {
    match name.to_ascii_lowercase().as_str() {
        "padding" => Some(Arc::new(PaddingExtension::new())),
        "test" => Some(Arc::new(TestExtension::new())),
        _ => None,
    }
}
