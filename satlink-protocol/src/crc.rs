//! CRC-32 used by the ULE trailer
//!
//! ULE uses the MPEG-2 CRC-32: polynomial 0x04C11DB7, initial value
//! 0xFFFFFFFF, no input/output reflection and no final xor. The value is
//! transmitted in network byte order after the SNDU payload.

/// CRC-32 polynomial (ISO/IEC 13818-1)
const CRC32_POLY: u32 = 0x04C1_1DB7;

/// Initial register value
const CRC32_INIT: u32 = 0xFFFF_FFFF;

/// Size of the CRC trailer in bytes
pub const CRC_SIZE: usize = 4;

static CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ CRC32_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Incremental CRC-32 calculator
///
/// Lets the codec feed header, address and payload separately without
/// first copying them into one contiguous buffer.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    /// Start a new computation
    pub fn new() -> Self {
        Crc32 { state: CRC32_INIT }
    }

    /// Feed more bytes
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            let index = ((crc >> 24) ^ (byte as u32)) as usize;
            crc = (crc << 8) ^ CRC32_TABLE[index];
        }
        self.state = crc;
    }

    /// Current CRC value
    #[inline]
    pub fn finish(self) -> u32 {
        self.state
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the CRC-32 of a byte range in one call
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}
