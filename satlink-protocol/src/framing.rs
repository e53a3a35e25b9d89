//! ULE over MPEG-2 TS: packetizing SNDUs into frames and reassembling them
//!
//! The sender packs SNDUs back to back into 188-byte frames, one frame
//! context per PID. A frame in which at least one SNDU starts carries PUSI
//! and a payload pointer to the first such SNDU. The end of the useful data
//! in a frame is marked by stuffing (`0xFF 0xFF`, or a single trailing byte).
//!
//! The receiver follows each PID's continuity counter and drops the pending
//! SNDU whenever a frame is lost.

use crate::mpeg::{
    MpegFrameContext, MAX_PID, PUSI_FLAG, STUFFING_BYTE, SYNC_BYTE, TS_HEADER_SIZE,
    TS_PACKET_SIZE,
};
use crate::net::Route;
use crate::ule::total_length;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use thiserror::Error;

/// Room needed to start an SNDU: its two length bytes
const SNDU_START: usize = 2;

/// Deframing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MpegError {
    #[error("Invalid TS frame size: {0} bytes")]
    InvalidSize(usize),

    #[error("Bad sync byte: 0x{0:02x}")]
    BadSync(u8),

    #[error("Payload pointer {pointer} beyond {available} payload bytes")]
    InvalidPointer { pointer: usize, available: usize },
}

/// Framing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingStats {
    /// TS frames emitted or received
    pub frames: u64,
    /// SNDUs packed or recovered
    pub sndus: u64,
    /// Stuffing bytes emitted
    pub stuffing_bytes: u64,
    /// Continuity counter discontinuities
    pub cc_errors: u64,
    /// Partially received SNDUs thrown away
    pub dropped_sndus: u64,
}

/// One emitted TS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsFrame {
    pub pid: u16,
    pub dest_spot: u16,
    /// Exactly 188 bytes
    pub data: Bytes,
}

/// PID carrying traffic for a route
pub fn pid_for_route(route: &Route) -> u16 {
    route.dst_tal_id & MAX_PID
}

/// Packs SNDUs into TS frames, one frame context per PID
#[derive(Debug)]
pub struct TsPacketizer {
    contexts: HashMap<u16, MpegFrameContext>,
    packing: bool,
    stats: FramingStats,
}

impl TsPacketizer {
    /// Create a packetizer
    ///
    /// With `packing` a partially filled frame stays open for the next SNDU
    /// of the same PID until [`flush`](Self::flush) is called.
    pub fn new(packing: bool) -> Self {
        TsPacketizer {
            contexts: HashMap::new(),
            packing,
            stats: FramingStats::default(),
        }
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }

    /// Frame context of a PID, if any
    pub fn context(&self, pid: u16) -> Option<&MpegFrameContext> {
        self.contexts.get(&(pid & MAX_PID))
    }

    /// Forget a PID, returning its context and any unflushed frame
    pub fn remove_pid(&mut self, pid: u16) -> Option<MpegFrameContext> {
        self.contexts.remove(&(pid & MAX_PID))
    }

    /// Pack one SNDU, returning the frames completed along the way
    pub fn push(&mut self, pid: u16, dest_spot: u16, sndu: &[u8]) -> Vec<TsFrame> {
        let pid = pid & MAX_PID;
        let packing = self.packing;
        let stats = &mut self.stats;
        let ctx = self
            .contexts
            .entry(pid)
            .or_insert_with(|| MpegFrameContext::new(pid, 0, dest_spot));

        let mut frames = Vec::new();
        if sndu.is_empty() {
            return frames;
        }

        let needed = if ctx.pusi() {
            SNDU_START
        } else {
            SNDU_START + 1
        };
        if ctx.left() < needed {
            frames.push(emit(ctx, stats));
        }
        if !ctx.pusi() {
            ctx.set_pusi();
            ctx.add_payload_pointer();
        }

        let mut offset = 0;
        while offset < sndu.len() {
            offset += ctx.add(&sndu[offset..]);
            if ctx.left() == 0 {
                frames.push(emit(ctx, stats));
            }
        }
        stats.sndus += 1;

        if !packing && ctx.has_payload() {
            frames.push(emit(ctx, stats));
        }
        frames
    }

    /// Pad and emit the pending frame of a PID
    pub fn flush(&mut self, pid: u16) -> Option<TsFrame> {
        let stats = &mut self.stats;
        let ctx = self.contexts.get_mut(&(pid & MAX_PID))?;
        if ctx.has_payload() {
            Some(emit(ctx, stats))
        } else {
            None
        }
    }

    /// Pad and emit every pending frame, in PID order
    pub fn flush_all(&mut self) -> Vec<TsFrame> {
        let mut pids: Vec<u16> = self.contexts.keys().copied().collect();
        pids.sort_unstable();
        pids.into_iter().filter_map(|pid| self.flush(pid)).collect()
    }
}

fn emit(ctx: &mut MpegFrameContext, stats: &mut FramingStats) -> TsFrame {
    stats.frames += 1;
    stats.stuffing_bytes += ctx.left() as u64;
    let pid = ctx.pid();
    let cc = ctx.cc();
    let frame = TsFrame {
        pid,
        dest_spot: ctx.dest_spot(),
        data: ctx.take_frame(),
    };
    tracing::trace!(pid, cc, "TS frame emitted");
    frame
}

/// Reassembly state of one PID
#[derive(Debug)]
struct PidState {
    /// Last continuity counter seen
    cc: Option<u8>,
    /// Waiting for a frame with PUSI before accepting data
    need_pusi: bool,
    /// SNDU being reassembled
    partial: BytesMut,
}

impl PidState {
    fn new() -> Self {
        PidState {
            cc: None,
            need_pusi: true,
            partial: BytesMut::new(),
        }
    }
}

/// Rebuilds SNDUs from TS frames
#[derive(Debug, Default)]
pub struct TsDeframer {
    states: HashMap<u16, PidState>,
    stats: FramingStats,
}

impl TsDeframer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }

    /// Forget a PID and any SNDU pending on it
    pub fn remove_pid(&mut self, pid: u16) {
        self.states.remove(&(pid & MAX_PID));
    }

    /// Process one frame, returning the SNDUs it completes
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<Vec<Bytes>, MpegError> {
        if frame.len() != TS_PACKET_SIZE {
            return Err(MpegError::InvalidSize(frame.len()));
        }
        if frame[0] != SYNC_BYTE {
            return Err(MpegError::BadSync(frame[0]));
        }

        let pusi = frame[1] & PUSI_FLAG != 0;
        let pid = u16::from_be_bytes([frame[1], frame[2]]) & MAX_PID;
        let cc = frame[3] & 0x0F;
        self.stats.frames += 1;

        let stats = &mut self.stats;
        let state = self.states.entry(pid).or_insert_with(PidState::new);

        if let Some(last) = state.cc {
            if cc != (last + 1) & 0x0F {
                stats.cc_errors += 1;
                tracing::warn!(
                    pid,
                    expected = (last + 1) & 0x0F,
                    got = cc,
                    "TS continuity error"
                );
                drop_partial(state, stats);
                state.need_pusi = true;
            }
        }
        state.cc = Some(cc);

        let mut sndus = Vec::new();
        let mut payload = &frame[TS_HEADER_SIZE..];

        if pusi {
            let pointer = payload[0] as usize;
            payload = &payload[1..];
            if pointer > payload.len() {
                drop_partial(state, stats);
                state.need_pusi = true;
                return Err(MpegError::InvalidPointer {
                    pointer,
                    available: payload.len(),
                });
            }

            let (head, rest) = payload.split_at(pointer);
            if state.need_pusi || state.partial.is_empty() {
                drop_partial(state, stats);
            } else {
                // the pending SNDU must end exactly where the pointer says
                state.partial.extend_from_slice(head);
                if total_length(&state.partial) == Some(state.partial.len()) {
                    sndus.push(state.partial.split().freeze());
                } else {
                    drop_partial(state, stats);
                }
            }
            state.need_pusi = false;
            take_sndus(&mut state.partial, rest, true, &mut sndus);
        } else if !state.need_pusi {
            take_sndus(&mut state.partial, payload, false, &mut sndus);
        }

        stats.sndus += sndus.len() as u64;
        Ok(sndus)
    }

    /// Process a byte stream made of whole TS frames
    pub fn push_stream(&mut self, data: &[u8]) -> Result<Vec<Bytes>, MpegError> {
        if data.len() % TS_PACKET_SIZE != 0 {
            return Err(MpegError::InvalidSize(data.len() % TS_PACKET_SIZE));
        }
        let mut sndus = Vec::new();
        for frame in data.chunks_exact(TS_PACKET_SIZE) {
            sndus.extend(self.push_frame(frame)?);
        }
        Ok(sndus)
    }
}

fn drop_partial(state: &mut PidState, stats: &mut FramingStats) {
    if !state.partial.is_empty() {
        stats.dropped_sndus += 1;
        tracing::debug!(len = state.partial.len(), "dropping incomplete SNDU");
        state.partial.clear();
    }
}

/// Move SNDU bytes from `payload` into `partial`, collecting complete SNDUs
///
/// New SNDUs are only started when `allow_start` is set, i.e. in frames
/// carrying PUSI.
fn take_sndus(
    partial: &mut BytesMut,
    mut payload: &[u8],
    allow_start: bool,
    out: &mut Vec<Bytes>,
) {
    loop {
        if partial.is_empty()
            && (!allow_start
                || payload.len() < SNDU_START
                || payload[..SNDU_START] == [STUFFING_BYTE, STUFFING_BYTE])
        {
            return;
        }

        if partial.len() < SNDU_START {
            let take = (SNDU_START - partial.len()).min(payload.len());
            partial.extend_from_slice(&payload[..take]);
            payload = &payload[take..];
        }
        let total = match total_length(partial) {
            Some(total) => total,
            None => return,
        };

        let take = (total - partial.len()).min(payload.len());
        partial.extend_from_slice(&payload[..take]);
        payload = &payload[take..];

        if partial.len() < total {
            return;
        }
        out.push(partial.split().freeze());
    }
}
