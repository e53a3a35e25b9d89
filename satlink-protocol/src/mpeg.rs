//! MPEG-2 Transport Stream frame construction
//!
//! One [`MpegFrameContext`] exists per PID. It holds the frame currently being
//! filled and the PID's continuity counter:
//!
//! ```text
//! byte 0     : sync byte 0x47
//! bytes 1-2  : TEI(1) PUSI(1) priority(1) PID(13)
//! byte 3     : scrambling(2) adaptation field control(2) CC(4)
//! [byte 4]   : payload pointer, present when PUSI is set
//! ...        : payload, stuffed with 0xFF up to 188 bytes
//! ```

use bytes::Bytes;

/// Size of a TS packet
pub const TS_PACKET_SIZE: usize = 188;

/// Size of the TS header
pub const TS_HEADER_SIZE: usize = 4;

/// Sync byte opening every TS packet
pub const SYNC_BYTE: u8 = 0x47;

/// Byte used to fill unused payload space
pub const STUFFING_BYTE: u8 = 0xFF;

/// Largest 13-bit PID
pub const MAX_PID: u16 = 0x1FFF;

/// PUSI flag in header byte 1
pub const PUSI_FLAG: u8 = 0x40;

/// Adaptation field control `01`: payload only
const PAYLOAD_ONLY: u8 = 0x10;

/// Continuity counter mask
const CC_MASK: u8 = 0x0F;

/// Frame under construction for one PID
#[derive(Clone)]
pub struct MpegFrameContext {
    pid: u16,
    cc: u8,
    dest_spot: u16,
    frame: [u8; TS_PACKET_SIZE],
    len: usize,
    pusi: bool,
    pointer_set: bool,
}

impl MpegFrameContext {
    /// Create a context with an initialised, empty frame
    ///
    /// The PID is truncated to 13 bits and the counter to 4 bits.
    pub fn new(pid: u16, cc: u8, dest_spot: u16) -> Self {
        let mut ctx = MpegFrameContext {
            pid: pid & MAX_PID,
            cc: cc & CC_MASK,
            dest_spot,
            frame: [0u8; TS_PACKET_SIZE],
            len: 0,
            pusi: false,
            pointer_set: false,
        };
        ctx.init_frame();
        ctx
    }

    /// Write the TS header at the start of the frame
    ///
    /// Does not touch the continuity counter; it only advances when a frame
    /// is emitted.
    pub fn init_frame(&mut self) {
        let pusi = if self.pusi { PUSI_FLAG } else { 0 };
        self.frame[0] = SYNC_BYTE;
        self.frame[1] = pusi | ((self.pid >> 8) as u8 & 0x1F);
        self.frame[2] = (self.pid & 0xFF) as u8;
        self.frame[3] = PAYLOAD_ONLY | (self.cc & CC_MASK);
        self.len = self.len.max(TS_HEADER_SIZE);
    }

    /// Append as much of `data` as fits
    ///
    /// Returns the number of bytes written; the caller carries the rest
    /// over to the next frame.
    pub fn add(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.left());
        self.frame[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// Free bytes left in the frame
    #[inline]
    pub fn left(&self) -> usize {
        TS_PACKET_SIZE - self.len
    }

    /// Current frame length, header included
    #[inline]
    pub fn length(&self) -> usize {
        self.len
    }

    /// Whether any payload byte has been written
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.len > TS_HEADER_SIZE
    }

    /// Mark that a new SNDU starts in this frame
    pub fn set_pusi(&mut self) {
        self.frame[1] |= PUSI_FLAG;
        self.pusi = true;
    }

    pub fn pusi(&self) -> bool {
        self.pusi
    }

    /// Insert the payload pointer right after the header
    ///
    /// Its value is the number of payload bytes already in the frame, i.e.
    /// the offset of the SNDU about to be added. Returns false when PUSI is
    /// not set, a pointer is already present, or the frame is full.
    pub fn add_payload_pointer(&mut self) -> bool {
        if !self.pusi || self.pointer_set || self.left() == 0 {
            return false;
        }
        let pointer = (self.len - TS_HEADER_SIZE) as u8;
        self.frame.copy_within(TS_HEADER_SIZE..self.len, TS_HEADER_SIZE + 1);
        self.frame[TS_HEADER_SIZE] = pointer;
        self.len += 1;
        self.pointer_set = true;
        true
    }

    /// Fill the rest of the frame with stuffing bytes
    pub fn padding(&mut self) {
        self.frame[self.len..].fill(STUFFING_BYTE);
        self.len = TS_PACKET_SIZE;
    }

    /// Start a new frame with the next continuity counter
    pub fn reset(&mut self) {
        self.cc = (self.cc + 1) & CC_MASK;
        self.pusi = false;
        self.pointer_set = false;
        self.frame.fill(0);
        self.len = 0;
        self.init_frame();
    }

    /// Pad the frame, hand out a copy and start the next one
    pub fn take_frame(&mut self) -> Bytes {
        self.padding();
        let frame = Bytes::copy_from_slice(&self.frame);
        self.reset();
        frame
    }

    /// Bytes written so far
    pub fn data(&self) -> &[u8] {
        &self.frame[..self.len]
    }

    /// Whether the frame holds exactly 188 bytes
    pub fn is_complete(&self) -> bool {
        self.len == TS_PACKET_SIZE
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Continuity counter of the frame under construction
    pub fn cc(&self) -> u8 {
        self.cc
    }

    pub fn dest_spot(&self) -> u16 {
        self.dest_spot
    }
}

impl std::fmt::Debug for MpegFrameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpegFrameContext")
            .field("pid", &self.pid)
            .field("cc", &self.cc)
            .field("dest_spot", &self.dest_spot)
            .field("len", &self.len)
            .field("pusi", &self.pusi)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_frame_header() {
        let ctx = MpegFrameContext::new(0x1ABC, 7, 1);
        assert_eq!(ctx.data(), &[0x47, 0x1A, 0xBC, 0x17]);
        assert_eq!(ctx.left(), 184);
        assert!(!ctx.has_payload());
    }

    #[test]
    fn test_pid_and_cc_are_masked() {
        let ctx = MpegFrameContext::new(0xFFFF, 0x3F, 0);
        assert_eq!(ctx.pid(), 0x1FFF);
        assert_eq!(ctx.cc(), 0x0F);
    }

    #[test]
    fn test_add_is_bounded() {
        let mut ctx = MpegFrameContext::new(0x100, 0, 0);
        let data = vec![0xAB; 500];
        assert_eq!(ctx.add(&data), 184);
        assert_eq!(ctx.left(), 0);
        assert_eq!(ctx.add(&data), 0);
        assert!(ctx.is_complete());
        assert_eq!(ctx.data().len(), TS_PACKET_SIZE);
    }

    #[test]
    fn test_pusi_and_pointer() {
        let mut ctx = MpegFrameContext::new(0x100, 0, 0);
        ctx.add(&[1, 2, 3]);
        ctx.set_pusi();
        assert!(ctx.add_payload_pointer());
        assert!(!ctx.add_payload_pointer());
        ctx.add(&[9]);

        assert_eq!(ctx.data(), &[0x47, 0x41, 0x00, 0x10, 3, 1, 2, 3, 9]);
    }

    #[test]
    fn test_pointer_requires_pusi() {
        let mut ctx = MpegFrameContext::new(0x100, 0, 0);
        assert!(!ctx.add_payload_pointer());
        assert_eq!(ctx.length(), TS_HEADER_SIZE);
    }

    #[test]
    fn test_padding_fills_frame() {
        let mut ctx = MpegFrameContext::new(0x42, 0, 0);
        ctx.add(&[0x01; 10]);
        ctx.padding();
        assert!(ctx.is_complete());
        assert!(ctx.data()[14..].iter().all(|&b| b == STUFFING_BYTE));
    }

    #[test]
    fn test_reset_advances_cc() {
        let mut ctx = MpegFrameContext::new(0x42, 14, 3);
        ctx.set_pusi();
        ctx.add(&[0x55; 20]);

        let frame = ctx.take_frame();
        assert_eq!(frame.len(), TS_PACKET_SIZE);
        assert_eq!(frame[3] & 0x0F, 14);
        assert_eq!(frame[1] & PUSI_FLAG, PUSI_FLAG);

        assert_eq!(ctx.cc(), 15);
        assert!(!ctx.pusi());
        assert_eq!(ctx.data(), &[0x47, 0x00, 0x42, 0x1F]);

        ctx.reset();
        assert_eq!(ctx.cc(), 0);
        assert_eq!(ctx.dest_spot(), 3);
    }
}
