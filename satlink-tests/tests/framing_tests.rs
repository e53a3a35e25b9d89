//! Integration tests for ULE over MPEG-TS framing

use bytes::Bytes;
use satlink_protocol::framing::{pid_for_route, MpegError, TsDeframer, TsFrame, TsPacketizer};
use satlink_protocol::mpeg::{PUSI_FLAG, STUFFING_BYTE, TS_PACKET_SIZE};
use satlink_protocol::net::{NetPacket, ProtocolLayer, Route, UpperProtocol, ETHER_TYPE_IPV4};
use satlink_protocol::registry::ExtensionRegistry;
use satlink_protocol::ule::{Sndu, UleError, UlePacket, MAX_LENGTH, MAX_LENGTH_NO_ADDR};
use satlink_protocol::UleContext;
use std::sync::Arc;

fn sndu(len: usize, fill: u8) -> Bytes {
    UlePacket::build(0x0800, None, Bytes::from(vec![fill; len]), true)
        .unwrap()
        .to_bytes()
        .freeze()
}

fn deframe_all(deframer: &mut TsDeframer, frames: &[TsFrame]) -> Vec<Bytes> {
    let mut out = Vec::new();
    for frame in frames {
        out.extend(deframer.push_frame(&frame.data).unwrap());
    }
    out
}

#[test]
fn test_interleaved_pids() {
    let mut packetizer = TsPacketizer::new(true);
    let a = [sndu(100, 0xA0), sndu(300, 0xA1)];
    let b = [sndu(50, 0x10), sndu(10, 0x11)];

    let mut frames = Vec::new();
    frames.extend(packetizer.push(0x101, 1, &a[0]));
    frames.extend(packetizer.push(0x202, 2, &b[0]));
    frames.extend(packetizer.push(0x101, 1, &a[1]));
    frames.extend(packetizer.push(0x202, 2, &b[1]));
    frames.extend(packetizer.flush_all());

    for frame in &frames {
        assert_eq!(frame.data.len(), TS_PACKET_SIZE);
        let expected_spot = if frame.pid == 0x101 { 1 } else { 2 };
        assert_eq!(frame.dest_spot, expected_spot);
    }

    let mut deframer = TsDeframer::new();
    let out = deframe_all(&mut deframer, &frames);
    let from_a: Vec<Bytes> = out.iter().filter(|s| s[4] >= 0xA0).cloned().collect();
    let from_b: Vec<Bytes> = out.iter().filter(|s| s[4] < 0xA0).cloned().collect();
    assert_eq!(from_a, a.to_vec());
    assert_eq!(from_b, b.to_vec());
    assert_eq!(deframer.stats().cc_errors, 0);
}

#[test]
fn test_flush_all_is_pid_ordered() {
    let mut packetizer = TsPacketizer::new(true);
    for pid in [0x300, 0x010, 0x120] {
        assert!(packetizer.push(pid, 0, &sndu(20, 1)).is_empty());
    }
    let pids: Vec<u16> = packetizer.flush_all().iter().map(|f| f.pid).collect();
    assert_eq!(pids, vec![0x010, 0x120, 0x300]);
    assert!(packetizer.flush_all().is_empty());
}

#[test]
fn test_continuity_counter_wraps() {
    let mut packetizer = TsPacketizer::new(false);
    let frames: Vec<TsFrame> = (0..20)
        .flat_map(|i| packetizer.push(0x40, 0, &sndu(10, i as u8)))
        .collect();
    assert_eq!(frames.len(), 20);

    let ccs: Vec<u8> = frames.iter().map(|f| f.data[3] & 0x0F).collect();
    let expected: Vec<u8> = (0..20).map(|i| (i % 16) as u8).collect();
    assert_eq!(ccs, expected);

    let out = deframe_all(&mut TsDeframer::new(), &frames);
    assert_eq!(out.len(), 20);
}

#[test]
fn test_unpacked_frames_are_stuffed() {
    let mut packetizer = TsPacketizer::new(false);
    let data = sndu(50, 0x77);
    let frames = packetizer.push(0x50, 0, &data);
    assert_eq!(frames.len(), 1);

    let payload = &frames[0].data[5..];
    assert_eq!(&payload[..data.len()], &data[..]);
    assert!(payload[data.len()..].iter().all(|&b| b == STUFFING_BYTE));

    let stats = packetizer.stats();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.sndus, 1);
    assert_eq!(stats.stuffing_bytes, (TS_PACKET_SIZE - 5 - data.len()) as u64);
}

#[test]
fn test_new_sndu_needs_three_bytes_in_continuation_frame() {
    let mut packetizer = TsPacketizer::new(true);
    // 183 + 184 + 182 bytes: the third frame ends with 2 free bytes and no PUSI
    let first = sndu(541, 0x01);
    assert_eq!(first.len(), 549);
    let mut frames = packetizer.push(0x60, 0, &first);
    assert_eq!(frames.len(), 2);
    assert_eq!(packetizer.context(0x60).unwrap().left(), 2);
    assert!(!packetizer.context(0x60).unwrap().pusi());

    let second = sndu(20, 0x02);
    frames.extend(packetizer.push(0x60, 0, &second));
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].data[1] & PUSI_FLAG, 0);
    assert_eq!(&frames[2].data[186..], &[STUFFING_BYTE, STUFFING_BYTE]);

    frames.extend(packetizer.flush_all());
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[3].data[4], 0);

    let out = deframe_all(&mut TsDeframer::new(), &frames);
    assert_eq!(out, vec![first, second]);
}

#[test]
fn test_lost_frame_resyncs_on_next_pusi() {
    let mut packetizer = TsPacketizer::new(true);
    let sndus: Vec<Bytes> = (0..6).map(|i| sndu(150, i)).collect();
    let mut frames = Vec::new();
    for s in &sndus {
        frames.extend(packetizer.push(0x70, 0, s));
    }
    frames.extend(packetizer.flush_all());

    let mut deframer = TsDeframer::new();
    let mut out = Vec::new();
    for (i, frame) in frames.iter().enumerate() {
        if i == 2 {
            continue;
        }
        out.extend(deframer.push_frame(&frame.data).unwrap());
    }

    let stats = deframer.stats();
    assert_eq!(stats.cc_errors, 1);
    assert!(out.len() < sndus.len());
    // everything recovered is intact and in order
    let mut expected = sndus.iter();
    for s in &out {
        assert!(expected.any(|e| e == s));
    }
    assert_eq!(out.last(), sndus.last());
}

#[test]
fn test_largest_sndu_without_address_survives_framing() {
    // Length 0x7FFF with the D bit set would start with the End Indicator
    assert!(matches!(
        UlePacket::build(0x0800, None, Bytes::from(vec![0x5A; MAX_LENGTH - 4]), true),
        Err(UleError::PayloadTooLarge { .. })
    ));

    let data = sndu(MAX_LENGTH_NO_ADDR - 4, 0x5A);
    assert_eq!(&data[..2], &[0xFF, 0xFE]);
    let trailer = sndu(10, 0x01);

    let mut packetizer = TsPacketizer::new(false);
    let mut frames = packetizer.push(0x20, 0, &data);
    frames.extend(packetizer.push(0x20, 0, &trailer));

    let mut deframer = TsDeframer::new();
    assert_eq!(deframe_all(&mut deframer, &frames), vec![data, trailer]);
    assert_eq!(deframer.stats().cc_errors, 0);
}

#[test]
fn test_push_stream() {
    let mut packetizer = TsPacketizer::new(false);
    let data = sndu(400, 0x99);
    let frames = packetizer.push(0x80, 0, &data);
    let stream: Vec<u8> = frames.iter().flat_map(|f| f.data.iter().copied()).collect();

    let mut deframer = TsDeframer::new();
    assert_eq!(deframer.push_stream(&stream).unwrap(), vec![data]);

    assert_eq!(
        TsDeframer::new().push_stream(&stream[..200]),
        Err(MpegError::InvalidSize(12))
    );
}

#[test]
fn test_remove_pid_forgets_state() {
    let mut packetizer = TsPacketizer::new(true);
    packetizer.push(0x90, 3, &sndu(10, 0));
    let ctx = packetizer.remove_pid(0x90).unwrap();
    assert!(ctx.has_payload());
    assert_eq!(ctx.dest_spot(), 3);
    assert!(packetizer.flush(0x90).is_none());

    // a fresh context restarts the continuity counter
    let frames = packetizer.push(0x90, 3, &sndu(10, 0));
    assert!(frames.is_empty());
    assert_eq!(packetizer.context(0x90).unwrap().cc(), 0);
}

#[test]
fn test_encapsulate_frame_deframe_decapsulate() {
    let upper = Arc::new(ProtocolLayer::new(UpperProtocol::Ip));
    let mut ctx = UleContext::new(ExtensionRegistry::with_defaults(), upper, true);
    let route = Route::new(0, 1, 0x0456, 2);
    let burst: Vec<NetPacket> = (0..8)
        .map(|i| {
            let mut data = vec![i as u8; 40 + i * 97];
            data[0] = 0x45;
            NetPacket::new(ETHER_TYPE_IPV4, Bytes::from(data), route)
        })
        .collect();

    let pid = pid_for_route(&route);
    let mut packetizer = TsPacketizer::new(true);
    let mut frames = Vec::new();
    for ule in ctx.encapsulate(burst.clone()) {
        frames.extend(packetizer.push(pid, route.dst_spot, &ule.to_bytes()));
    }
    frames.extend(packetizer.flush_all());
    assert!(frames.iter().all(|f| f.pid == 0x0456));

    let mut deframer = TsDeframer::new();
    let sndus: Vec<Sndu> = deframe_all(&mut deframer, &frames)
        .into_iter()
        .map(|data| Sndu::new(data, route))
        .collect();
    assert_eq!(ctx.decapsulate(sndus), burst);
}
