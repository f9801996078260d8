//! IP tunnel analyzer: IP-in-IP and the payload side of GRE.
//!
//! Every tunnel whose payload is a bare packet ends up here. The analyzer
//! validates the inner packet, records the tunnel in the `ip_tunnels`
//! activity map (one entry per endpoint pair, shared by both directions),
//! and re-enters the pipeline with a synthesized inner packet.

use std::collections::BTreeMap;
use std::net::IpAddr;

use tracing::error;

use crate::encap::{EncapsulatingConn, EncapsulationStack, TunnelType};
use crate::engine::Pipeline;
use crate::error::IpError;
use crate::ip::{parse_ip_packet, IpHdr};
use crate::packet::{LinkType, PacketBuffer, Timestamp};
use crate::session::SessionSink;
use crate::timer::TimerKind;

use super::{Analyzer, AnalyzerId};

/// Canonically ordered endpoint pair identifying a tunnel regardless of
/// direction.
pub type IpPair = (IpAddr, IpAddr);

/// A tunnel's identity and the time it last carried traffic.
pub type TunnelActivity = (EncapsulatingConn, f64);

/// Activity map for all known IP tunnels.
pub type IpTunnelMap = BTreeMap<IpPair, TunnelActivity>;

/// IP tunnel analyzer.
#[derive(Debug, Clone, Copy)]
pub struct IpTunnelAnalyzer;

impl Analyzer for IpTunnelAnalyzer {
    fn name(&self) -> &'static str {
        "IPTunnel"
    }

    fn analyze_packet<S: SessionSink>(
        &self,
        _id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let encap = packet.key_store.encap.clone();
        let Some(ip_hdr) = packet.key_store.ip_hdr.clone() else {
            error!("IPTunnel: ip_hdr not found in packet key store");
            return false;
        };

        let proto = packet.key_store.proto;
        let gre_version = packet.key_store.gre_version;
        let tunnel_type = packet.key_store.tunnel_type.unwrap_or(TunnelType::Ip);
        let gre_link_type = packet.key_store.gre_link_type.unwrap_or(LinkType::Raw);

        if tunnel_type == TunnelType::Ip && !pl.state.config.tunnel.enable_ip {
            pl.sink.weird("IP_tunnel", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        let depth = encap.as_ref().map(|e| e.depth()).unwrap_or(0);
        if depth >= pl.state.config.tunnel.max_depth {
            pl.sink
                .weird("exceeded_tunnel_max_depth", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        // For anything but GRE version 0 the payload is a bare IP packet;
        // check it before committing to the tunnel.
        let mut inner = None;
        if gre_version != Some(0) {
            match parse_ip_packet(data, proto) {
                Ok(hdr) => inner = Some(hdr),
                Err(IpError::InvalidVersion { .. }) => {
                    pl.sink
                        .weird("invalid_inner_IP_version", Some(&ip_hdr), encap.as_ref());
                    return false;
                }
                Err(IpError::Truncated) => {
                    pl.sink
                        .weird("truncated_inner_IP", Some(&ip_hdr), encap.as_ref());
                    return false;
                }
                Err(IpError::LengthMismatch { .. }) => {
                    pl.sink.weird(
                        "inner_IP_payload_length_mismatch",
                        Some(&ip_hdr),
                        encap.as_ref(),
                    );
                    return false;
                }
            }
        }

        // Look up whether we have already seen this tunnel, identified by
        // the pair of outer addresses, so both directions share one
        // identity.
        let src = ip_hdr.src_addr();
        let dst = ip_hdr.dst_addr();
        let tunnel_idx: IpPair = if src < dst { (src, dst) } else { (dst, src) };

        let t = pl.state.network_time;
        let timeout = pl.state.config.tunnel.ip_tunnel_timeout;

        let conn = if let Some(activity) = pl.state.ip_tunnels.get_mut(&tunnel_idx) {
            activity.1 = t;
            activity.0.clone()
        } else {
            let uid = pl.state.next_uid();
            let conn = EncapsulatingConn::new(src, dst, tunnel_type, uid);
            pl.state.ip_tunnels.insert(tunnel_idx, (conn.clone(), t));
            pl.state
                .timers
                .schedule(t + timeout, TimerKind::IpTunnelInactivity(tunnel_idx));
            conn
        };

        let outer = encap.unwrap_or_default().with(conn);

        match inner {
            None => self.process_encapsulated_frame(packet.ts, data, gre_link_type, outer, pl),
            Some(hdr) => self.process_encapsulated_ip(packet.ts, hdr, data, outer, pl),
        };

        true
    }
}

impl IpTunnelAnalyzer {
    /// Re-enter the pipeline with a payload that still carries framing of
    /// its own (raw IP or an Ethernet frame, per the GRE payload type).
    fn process_encapsulated_frame<S: SessionSink>(
        &self,
        ts: Timestamp,
        data: &[u8],
        link_type: LinkType,
        outer: EncapsulationStack,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let len = data.len() as u32;
        let mut inner_packet = PacketBuffer::new(link_type, ts, len, len, data);
        inner_packet.key_store.encap = Some(outer);
        pl.process_inner(&mut inner_packet)
    }

    /// Re-enter the pipeline with an already-parsed inner IP packet. The
    /// parsed header rides along in the key store so the IP analyzer does
    /// not parse it twice.
    fn process_encapsulated_ip<S: SessionSink>(
        &self,
        ts: Timestamp,
        inner: IpHdr,
        data: &[u8],
        outer: EncapsulationStack,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let total_len = inner.total_len();
        let mut inner_packet = PacketBuffer::new(
            LinkType::Raw,
            ts,
            total_len as u32,
            total_len as u32,
            &data[..total_len],
        );
        inner_packet.key_store.encap = Some(outer);
        inner_packet.key_store.encap_inner_ip = Some(inner);
        pl.process_inner(&mut inner_packet)
    }
}
