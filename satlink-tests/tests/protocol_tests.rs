//! Integration tests for ULE encapsulation and decapsulation

use bytes::Bytes;
use satlink_protocol::crc::crc32;
use satlink_protocol::net::{
    NetPacket, Profile, ProtocolLayer, Route, UpperProtocol, ETHER_TYPE_ETHERNET, ETHER_TYPE_IPV4,
    ETHER_TYPE_IPV6, ETHER_TYPE_ROHC,
};
use satlink_protocol::registry::ExtensionRegistry;
use satlink_protocol::ule::{Sndu, UleError, UlePacket, MAX_LENGTH};
use satlink_protocol::{EncapConfig, EncapError, ExtensionSpec, UleContext};
use std::sync::Arc;

fn context(protocol: UpperProtocol, specs: &[ExtensionSpec]) -> UleContext {
    let registry = ExtensionRegistry::from_config(specs).unwrap();
    UleContext::new(registry, Arc::new(ProtocolLayer::new(protocol)), true)
}

fn ipv4(len: usize, route: Route) -> NetPacket {
    let mut data = vec![0x11u8; len];
    data[0] = 0x45;
    NetPacket::new(ETHER_TYPE_IPV4, Bytes::from(data), route)
}

#[test]
fn test_ip_sndu_wire_bytes() {
    let ctx = context(UpperProtocol::Ip, &[]);
    let mut data = vec![0xAAu8; 20];
    data[0] = 0x45;
    let packet = NetPacket::new(ETHER_TYPE_IPV4, Bytes::from(data.clone()), Route::default());

    let ule = ctx.encapsulate_packet(&packet).unwrap();
    let wire = ule.to_bytes();

    assert_eq!(&wire[..4], &[0x80, 0x18, 0x08, 0x00]);
    assert_eq!(&wire[4..24], &data[..]);
    let crc = crc32(&wire[..24]);
    assert_eq!(&wire[24..], &crc.to_be_bytes());
    assert_eq!(crc32(&wire), 0);
}

#[test]
fn test_raw_sndu_scenario() {
    let packet = UlePacket::build(0x0800, None, Bytes::from(vec![0xAA; 20]), true).unwrap();
    let wire = packet.to_bytes();
    assert_eq!(wire.len(), 28);
    assert_eq!(&wire[..4], &[0x80, 0x18, 0x08, 0x00]);
    assert!(wire[4..24].iter().all(|&b| b == 0xAA));

    let parsed = UlePacket::from_bytes(&wire, true).unwrap();
    assert!(parsed.is_valid(true));
    assert!(!parsed.dest_addr_present());
    assert_eq!(parsed.length, 24);
}

#[test]
fn test_every_protocol_roundtrips() {
    let mut eth = vec![0u8; 60];
    eth[12] = 0x08;
    let cases = [
        (UpperProtocol::Ip, ETHER_TYPE_IPV4, {
            let mut v = vec![0u8; 40];
            v[0] = 0x45;
            v
        }),
        (UpperProtocol::Ip, ETHER_TYPE_IPV6, {
            let mut v = vec![0u8; 60];
            v[0] = 0x60;
            v
        }),
        (UpperProtocol::Rohc, ETHER_TYPE_ROHC, vec![0xE0, 0x01, 0x02]),
        (UpperProtocol::Ethernet, ETHER_TYPE_ETHERNET, eth),
    ];

    for (protocol, ether_type, data) in cases {
        let ctx = context(protocol, &ExtensionSpec::defaults());
        let packet = NetPacket::new(ether_type, Bytes::from(data), Route::new(1, 2, 3, 4));
        let ule = ctx.encapsulate_packet(&packet).unwrap();
        let decoded = ctx.decapsulate_packet(&ule.to_sndu()).unwrap();
        assert_eq!(decoded, packet, "{} roundtrip", protocol);
    }
}

#[test]
fn test_route_travels_with_sndu() {
    let ctx = context(UpperProtocol::Ip, &[]);
    let route = Route::new(3, 7, 9, 2);
    let ule = ctx.encapsulate_packet(&ipv4(30, route)).unwrap();
    assert_eq!(ule.route, route);

    let sndu = ule.to_sndu();
    assert_eq!(sndu.route, route);
    assert_eq!(ctx.decapsulate_packet(&sndu).unwrap().route, route);
}

#[test]
fn test_crc_disabled() {
    let registry = ExtensionRegistry::new();
    let ctx = UleContext::new(registry, Arc::new(ProtocolLayer::new(UpperProtocol::Ip)), false);
    let ule = ctx.encapsulate_packet(&ipv4(20, Route::default())).unwrap();
    assert_eq!(ule.length, 20);
    assert!(ule.crc.is_none());
    assert_eq!(ule.to_bytes().len(), 24);

    // without a CRC, corruption goes unnoticed by the codec
    let mut raw = ule.to_bytes();
    raw[20] ^= 0x01;
    let sndu = Sndu::new(raw.freeze(), Route::default());
    assert!(ctx.decapsulate_packet(&sndu).is_ok());
}

#[test]
fn test_decapsulate_errors() {
    let ctx = context(UpperProtocol::Ip, &[]);

    let short = Sndu::new(Bytes::from_static(&[0x80, 0x18]), Route::default());
    assert_eq!(
        ctx.decapsulate_packet(&short),
        Err(EncapError::MalformedHeader(UleError::Truncated {
            expected: 4,
            actual: 2
        }))
    );

    let ule = ctx.encapsulate_packet(&ipv4(20, Route::default())).unwrap();
    let mut raw = ule.to_bytes();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    let bad_crc = Sndu::new(raw.freeze(), Route::default());
    assert_eq!(ctx.decapsulate_packet(&bad_crc), Err(EncapError::InvalidCrc));
}

#[test]
fn test_oversized_packet_is_dropped() {
    let mut ctx = context(UpperProtocol::Ip, &[]);
    let burst = vec![
        ipv4(100, Route::default()),
        ipv4(MAX_LENGTH, Route::default()),
        ipv4(200, Route::default()),
    ];

    let err = ctx.encapsulate_packet(&burst[1]).unwrap_err();
    assert!(matches!(
        err,
        EncapError::MalformedHeader(UleError::PayloadTooLarge { .. })
    ));

    let sndus = ctx.encapsulate(burst);
    assert_eq!(sndus.len(), 2);
    assert_eq!(sndus[0].payload.len(), 100);
    assert_eq!(sndus[1].payload.len(), 200);
    assert_eq!(ctx.stats().dropped, 1);
}

#[test]
fn test_burst_roundtrip_and_reset_stats() {
    let mut ctx = context(UpperProtocol::Ip, &[ExtensionSpec::new("padding", true)]);
    let burst: Vec<NetPacket> = (0..10).map(|i| ipv4(20 + i * 10, Route::default())).collect();

    let sndus: Vec<Sndu> = ctx
        .encapsulate(burst.clone())
        .iter()
        .map(UlePacket::to_sndu)
        .collect();
    let out = ctx.decapsulate(sndus);
    assert_eq!(out, burst);

    let stats = ctx.stats();
    assert_eq!(stats.encap_out, 10);
    assert_eq!(stats.decap_out, 10);
    assert_eq!(stats.dropped + stats.discarded, 0);

    ctx.reset_stats();
    assert_eq!(ctx.stats().encap_in, 0);
}

#[test]
fn test_context_from_config() {
    let config = EncapConfig {
        profile: Profile::Regenerative,
        upper_protocol: UpperProtocol::Ethernet,
        extensions: vec![ExtensionSpec::new("padding", true)],
        ..Default::default()
    };
    let ctx = UleContext::from_config(&config).unwrap();
    assert_eq!(ctx.profile(), Profile::Regenerative);
    assert_eq!(ctx.upper_layer().ether_type(), ETHER_TYPE_ETHERNET);
    assert_eq!(ctx.registry().build_order().len(), 1);
    assert!(ctx.crc_enabled());

    let bad = EncapConfig {
        extensions: vec![ExtensionSpec::new("compression", false)],
        ..Default::default()
    };
    assert!(UleContext::from_config(&bad).is_err());
}
