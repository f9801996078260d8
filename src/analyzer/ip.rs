//! IPv4/IPv6 analyzer.
//!
//! Parses the IP header, routes fragments through the fragment manager,
//! dispatches tunnel carriers by protocol number, and delivers everything
//! else to the session layer.

use tracing::error;

use crate::engine::Pipeline;
use crate::error::IpError;
use crate::fragment::FragKey;
use crate::ip::{parse_ip_packet, IpHdr, IpVersion};
use crate::packet::{L3Proto, PacketBuffer};
use crate::session::SessionSink;
use crate::timer::TimerKind;

use super::{Analyzer, AnalyzerId};

/// Network-layer analyzer handling both IP versions.
#[derive(Debug, Clone, Copy)]
pub struct IpAnalyzer;

impl Analyzer for IpAnalyzer {
    fn name(&self) -> &'static str {
        "IP"
    }

    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        // A tunnel carrier may have parsed the inner header already.
        let hdr = match packet.key_store.encap_inner_ip.take() {
            Some(hdr) => hdr,
            None => match parse_ip_packet(data, None) {
                Ok(hdr) => hdr,
                Err(IpError::Truncated) => {
                    pl.sink.weird_packet("truncated_IP", packet);
                    return false;
                }
                Err(IpError::InvalidVersion { .. }) => {
                    pl.sink.weird_packet("unknown_ip_version", packet);
                    return false;
                }
                Err(IpError::LengthMismatch { .. }) => {
                    pl.sink.weird_packet("internally_truncated_header", packet);
                    return false;
                }
            },
        };

        packet.l3_proto = match hdr.version() {
            IpVersion::V4 => L3Proto::Ipv4,
            IpVersion::V6 => L3Proto::Ipv6,
        };

        if !hdr.is_fragment() {
            return self.analyze_datagram(id, &hdr, data, packet, pl);
        }

        // Fragment path: collect until the datagram is whole, then feed
        // the rebuilt datagram through the same dispatch.
        let t = packet.time();
        let key = FragKey::for_datagram(&hdr);
        let frag_timeout = pl.state.config.frag_timeout;

        let (created, reassembled) = {
            let (reassembler, created) = pl.state.fragments.next_fragment(t, &hdr);
            reassembler.add_fragment(&hdr, data, pl.sink);
            (created, reassembler.take_reassembled())
        };

        if created {
            pl.state
                .timers
                .schedule(t + frag_timeout, TimerKind::FragExpire(key.clone()));
        }

        let Some(datagram) = reassembled else {
            return true; // waiting for more fragments
        };

        pl.state.fragments.remove(&key);

        match parse_ip_packet(&datagram, None) {
            Ok(whole) => self.analyze_datagram(id, &whole, &datagram, packet, pl),
            Err(e) => {
                // The reassembler only hands back datagrams it built from
                // validated fragments.
                error!(error = %e, "reassembled datagram failed to parse");
                true
            }
        }
    }
}

impl IpAnalyzer {
    /// Dispatch one whole datagram: tunnels by protocol number, the
    /// session layer otherwise.
    fn analyze_datagram<S: SessionSink>(
        &self,
        id: AnalyzerId,
        hdr: &IpHdr,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let proto = hdr.next_proto();
        let payload = hdr.payload(data);

        packet.key_store.ip_hdr = Some(hdr.clone());
        packet.key_store.proto = Some(proto);

        let handled = pl.forward(id, proto as u32, payload, packet);
        if !handled {
            packet.session_analysis = true;
            pl.sink.deliver_packet(
                packet.time(),
                hdr,
                payload,
                packet.key_store.encap.as_ref(),
            );
        }
        true
    }
}
