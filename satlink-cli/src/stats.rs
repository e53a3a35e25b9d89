//! Statistics display and formatting

use satlink_protocol::{EncapStats, FramingStats};

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Display the result of an encapsulation run
pub fn display_encap_summary(encap: &EncapStats, framing: &FramingStats, bytes_in: u64) {
    let bytes_out = framing.frames * satlink_protocol::TS_PACKET_SIZE as u64;

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ ENCAPSULATION                                               │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Packets:  {} in / {} SNDUs / {} dropped / {} discarded",
        encap.encap_in, encap.encap_out, encap.dropped, encap.discarded
    );
    println!(
        "│ Frames:   {} ({} stuffing, {:.1}%)",
        framing.frames,
        format_bytes(framing.stuffing_bytes),
        percentage(framing.stuffing_bytes, bytes_out)
    );
    println!(
        "│ Bytes:    {} in / {} out",
        format_bytes(bytes_in),
        format_bytes(bytes_out)
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display the result of a decapsulation run
pub fn display_decap_summary(encap: &EncapStats, framing: &FramingStats, bytes_out: u64) {
    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ DECAPSULATION                                               │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Frames:   {} ({} continuity errors)",
        framing.frames, framing.cc_errors
    );
    println!(
        "│ SNDUs:    {} recovered / {} incomplete dropped",
        framing.sndus, framing.dropped_sndus
    );
    println!(
        "│ Packets:  {} out / {} dropped / {} discarded",
        encap.decap_out, encap.dropped, encap.discarded
    );
    println!("│ Bytes:    {} out", format_bytes(bytes_out));
    println!("└─────────────────────────────────────────────────────────────┘");
}
