//! VXLAN (Virtual Extensible LAN) analyzer.
//!
//! VXLAN frames arrive on UDP port 4789 and wrap a complete Ethernet
//! frame behind an 8-byte header. The inner frame is processed as a
//! brand-new packet; on success a `vxlan_packet` event carries the inner
//! IP header and the VNI to the scripting layer.
//!
//! RFC 7348: Virtual eXtensible Local Area Network (VXLAN)

use tracing::error;

use crate::encap::{EncapsulatingConn, TunnelType};
use crate::engine::Pipeline;
use crate::ip::{ip_proto, parse_ip_packet};
use crate::packet::{L3Proto, LinkType, PacketBuffer};
use crate::session::SessionSink;

use super::{Analyzer, AnalyzerId};

/// Standard VXLAN UDP destination port.
pub const VXLAN_PORT: u16 = 4789;

const VXLAN_HDR_LEN: usize = 8;

/// Validate the VXLAN header and extract the 24-bit VNI. Returns the
/// violation message otherwise.
pub(crate) fn parse_vxlan(data: &[u8]) -> Result<u32, &'static str> {
    if data.len() < VXLAN_HDR_LEN {
        return Err("VXLAN header truncation");
    }

    // The "I" flag must be set for the VNI to be valid.
    if data[0] & 0x08 == 0 {
        return Err("VXLAN 'I' flag not set");
    }

    Ok(((data[4] as u32) << 16) | ((data[5] as u32) << 8) | (data[6] as u32))
}

/// VXLAN tunnel analyzer.
#[derive(Debug, Clone, Copy)]
pub struct VxlanAnalyzer;

impl Analyzer for VxlanAnalyzer {
    fn name(&self) -> &'static str {
        "VXLAN"
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
            error!("VXLAN: ip_hdr not found in packet key store");
            return false;
        };

        if !pl.state.config.tunnel.enable_vxlan {
            pl.sink.weird("VXLAN_tunnel", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        let vni = match parse_vxlan(data) {
            Ok(vni) => vni,
            Err(reason) => {
                pl.sink.protocol_violation(reason);
                return false;
            }
        };

        let depth = encap.as_ref().map(|e| e.depth()).unwrap_or(0);
        if depth >= pl.state.config.tunnel.max_depth {
            pl.sink.weird("tunnel_depth", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        let uid = pl.state.next_uid();
        let conn =
            EncapsulatingConn::new(ip_hdr.src_addr(), ip_hdr.dst_addr(), TunnelType::Vxlan, uid);
        let outer = encap.unwrap_or_default().with(conn.clone());

        // Skip over the VXLAN header and process the inner Ethernet frame
        // as a new packet.
        let inner_frame = &data[VXLAN_HDR_LEN..];
        let len = inner_frame.len() as u32;
        let mut inner_packet = PacketBuffer::new(LinkType::Ethernet, packet.ts, len, len, inner_frame);
        inner_packet.key_store.encap = Some(outer);

        pl.process_inner(&mut inner_packet);

        if !inner_packet.l2_valid {
            pl.sink
                .protocol_violation("VXLAN invalid inner ethernet frame");
            return false;
        }

        // Decode the inner IP header for the event payload.
        let inner_ip_data = &inner_frame[inner_packet.hdr_size..];
        let expected = match inner_packet.l3_proto {
            L3Proto::Ipv4 => Some(ip_proto::IPIP),
            L3Proto::Ipv6 => Some(ip_proto::IPV6),
            _ => return true,
        };

        match parse_ip_packet(inner_ip_data, expected) {
            Ok(inner_hdr) => {
                pl.sink.vxlan_packet(&conn, &inner_hdr, vni);
                pl.sink.udp_session_done();
                true
            }
            Err(_) => {
                pl.sink
                    .protocol_violation("Truncated VXLAN or invalid inner IP");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(vni: u32, i_flag: bool) -> [u8; 8] {
        let mut hdr = [0u8; 8];
        if i_flag {
            hdr[0] = 0x08;
        }
        hdr[4] = (vni >> 16) as u8;
        hdr[5] = (vni >> 8) as u8;
        hdr[6] = vni as u8;
        hdr
    }

    // Test 1: VNI extraction
    #[test]
    fn test_vni_extraction() {
        for vni in [0u32, 1, 100, 4096, 0xFFFFFF] {
            assert_eq!(parse_vxlan(&header(vni, true)), Ok(vni));
        }
    }

    // Test 2: I flag must be set
    #[test]
    fn test_i_flag_required() {
        assert_eq!(
            parse_vxlan(&header(100, false)),
            Err("VXLAN 'I' flag not set")
        );
    }

    // Test 3: header must be 8 bytes
    #[test]
    fn test_truncated_header() {
        assert_eq!(
            parse_vxlan(&[0x08, 0, 0, 0]),
            Err("VXLAN header truncation")
        );
        assert_eq!(parse_vxlan(&[]), Err("VXLAN header truncation"));
    }
}
