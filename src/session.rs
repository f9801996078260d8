//! The downstream session layer, seen from the pipeline's side.
//!
//! The pipeline does not track connections itself; it hands every fully
//! decapsulated and reassembled IP datagram to a [`SessionSink`], along
//! with protocol anomalies ("weirds") and tunnel events. The sink is
//! synchronous from the pipeline's point of view.

use crate::encap::{EncapsulatingConn, EncapsulationStack};
use crate::ip::IpHdr;
use crate::packet::PacketBuffer;

/// Receiver for everything the packet analysis core produces.
///
/// Weird names come from a controlled vocabulary (`tunnel_depth`,
/// `exceeded_tunnel_max_depth`, `truncated_GRE`, `unknown_gre_version`,
/// `unknown_gre_flags`, `gre_routing`, `non_ip_packet_in_encap`,
/// `egre_protocol_type`, `invalid_inner_IP_version`, `truncated_inner_IP`,
/// `inner_IP_payload_length_mismatch`, `IP_tunnel`, `GRE_tunnel`,
/// `fragment_overlap`, `fragment_inconsistency`,
/// `fragment_protocol_violation`, and a handful of link/IP-layer names).
pub trait SessionSink {
    /// One inner IP datagram, ready for connection analysis. `payload`
    /// starts at the transport header; `encap` is the tunnel stack the
    /// datagram arrived through, if any.
    fn deliver_packet(
        &mut self,
        t: f64,
        hdr: &IpHdr,
        payload: &[u8],
        encap: Option<&EncapsulationStack>,
    );

    /// A named protocol anomaly tied to an IP header (when one was
    /// decodable) and the encapsulation it occurred within.
    fn weird(&mut self, name: &'static str, ip: Option<&IpHdr>, encap: Option<&EncapsulationStack>);

    /// A named anomaly for a packet whose IP layer was not reached.
    fn weird_packet(&mut self, name: &'static str, packet: &PacketBuffer<'_>);

    /// An analyzer-level violation with a human-readable reason; used by
    /// analyzers lifted out of per-connection analysis (VXLAN).
    fn protocol_violation(&mut self, _reason: &'static str) {}

    /// A VXLAN frame was decapsulated: the tunnel hop, the inner IP
    /// header, and the 24-bit VNI.
    fn vxlan_packet(&mut self, _outer: &EncapsulatingConn, _inner: &IpHdr, _vni: u32) {}

    /// The VXLAN analyzer finished a delivery.
    fn udp_session_done(&mut self) {}
}

/// Sink that drops everything; useful for benchmarks and for driving the
/// pipeline purely for its side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SessionSink for NullSink {
    fn deliver_packet(
        &mut self,
        _t: f64,
        _hdr: &IpHdr,
        _payload: &[u8],
        _encap: Option<&EncapsulationStack>,
    ) {
    }

    fn weird(
        &mut self,
        _name: &'static str,
        _ip: Option<&IpHdr>,
        _encap: Option<&EncapsulationStack>,
    ) {
    }

    fn weird_packet(&mut self, _name: &'static str, _packet: &PacketBuffer<'_>) {}
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use std::net::IpAddr;

    /// One delivered datagram, flattened for assertions.
    #[derive(Debug, Clone)]
    pub struct Delivered {
        pub t: f64,
        pub src: IpAddr,
        pub dst: IpAddr,
        pub proto: u8,
        pub payload: Vec<u8>,
        pub encap_depth: usize,
        pub encap_uids: Vec<u64>,
    }

    /// Sink that records everything it is handed.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub delivered: Vec<Delivered>,
        pub weirds: Vec<&'static str>,
        pub violations: Vec<&'static str>,
        pub vxlan_events: Vec<(u64, u32)>,
        pub udp_done: usize,
    }

    impl SessionSink for RecordingSink {
        fn deliver_packet(
            &mut self,
            t: f64,
            hdr: &IpHdr,
            payload: &[u8],
            encap: Option<&EncapsulationStack>,
        ) {
            self.delivered.push(Delivered {
                t,
                src: hdr.src_addr(),
                dst: hdr.dst_addr(),
                proto: hdr.next_proto(),
                payload: payload.to_vec(),
                encap_depth: encap.map(|e| e.depth()).unwrap_or(0),
                encap_uids: encap
                    .map(|e| e.iter().map(|c| c.uid).collect())
                    .unwrap_or_default(),
            });
        }

        fn weird(
            &mut self,
            name: &'static str,
            _ip: Option<&IpHdr>,
            _encap: Option<&EncapsulationStack>,
        ) {
            self.weirds.push(name);
        }

        fn weird_packet(&mut self, name: &'static str, _packet: &PacketBuffer<'_>) {
            self.weirds.push(name);
        }

        fn protocol_violation(&mut self, reason: &'static str) {
            self.violations.push(reason);
        }

        fn vxlan_packet(&mut self, outer: &EncapsulatingConn, _inner: &IpHdr, vni: u32) {
            self.vxlan_events.push((outer.uid, vni));
        }

        fn udp_session_done(&mut self) {
            self.udp_done += 1;
        }
    }
}
