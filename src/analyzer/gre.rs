//! GRE (Generic Routing Encapsulation) analyzer.
//!
//! Handles standard GRE (RFC 2784/2890), PPTP enhanced GRE (RFC 2637),
//! transparent Ethernet bridging, and ERSPAN types II and III. The GRE
//! header is stripped here; the remaining payload packet falls through to
//! the IP tunnel analyzer, which only needs to know the tunnel kind, the
//! GRE version and the payload link type.

use tracing::error;

use crate::encap::TunnelType;
use crate::engine::Pipeline;
use crate::ip::ip_proto;
use crate::packet::{LinkType, PacketBuffer};
use crate::session::SessionSink;

use super::{Analyzer, AnalyzerId};

/// PPP protocol identifiers permitted inside enhanced GRE.
mod ppp_proto {
    pub const IPV4: u16 = 0x0021;
    pub const IPV6: u16 = 0x0057;
}

/// GRE header length implied by the flag bits: 4 bytes of flags and
/// protocol type, plus 4 each for checksum, key, sequence and
/// acknowledgement when present. The deprecated routing field is rejected
/// before this matters.
fn gre_header_len(flags: u16) -> usize {
    let mut len = 4;

    if flags & 0x8000 != 0 {
        // Checksum/Reserved1 present.
        len += 4;
    }

    if flags & 0x2000 != 0 {
        // Key present.
        len += 4;
    }

    if flags & 0x1000 != 0 {
        // Sequence present.
        len += 4;
    }

    if flags & 0x0080 != 0 {
        // Acknowledgement present.
        len += 4;
    }

    len
}

/// GRE tunnel analyzer.
#[derive(Debug, Clone, Copy)]
pub struct GreAnalyzer;

impl Analyzer for GreAnalyzer {
    fn name(&self) -> &'static str {
        "GRE"
    }

    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let encap = packet.key_store.encap.clone();
        let Some(ip_hdr) = packet.key_store.ip_hdr.clone() else {
            error!("GRE: ip_hdr not found in packet key store");
            return false;
        };

        if !pl.state.config.tunnel.enable_gre {
            pl.sink.weird("GRE_tunnel", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        let depth = encap.as_ref().map(|e| e.depth()).unwrap_or(0);
        if depth >= pl.state.config.tunnel.max_depth {
            pl.sink
                .weird("exceeded_tunnel_max_depth", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        if data.len() < 4 {
            pl.sink.weird("truncated_GRE", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        let flags_ver = u16::from_be_bytes([data[0], data[1]]);
        let proto_typ = u16::from_be_bytes([data[2], data[3]]);
        let gre_version = (flags_ver & 0x0007) as u8;

        let gre_len = gre_header_len(flags_ver);
        let ppp_len = if gre_version == 1 { 4 } else { 0 };
        let mut erspan_len = 0usize;
        let mut eth_len = 0usize;
        let mut gre_link_type = LinkType::Raw;

        if gre_version != 0 && gre_version != 1 {
            pl.sink
                .weird("unknown_gre_version", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        if gre_version == 0 {
            match proto_typ {
                0x6558 => {
                    // Transparent Ethernet bridging.
                    if data.len() > gre_len + 14 {
                        eth_len = 14;
                        gre_link_type = LinkType::Ethernet;
                    } else {
                        pl.sink.weird("truncated_GRE", Some(&ip_hdr), encap.as_ref());
                        return false;
                    }
                }
                0x88be => {
                    // ERSPAN type II.
                    if data.len() > gre_len + 14 + 8 {
                        erspan_len = 8;
                        eth_len = 14;
                        gre_link_type = LinkType::Ethernet;
                    } else {
                        pl.sink.weird("truncated_GRE", Some(&ip_hdr), encap.as_ref());
                        return false;
                    }
                }
                0x22eb => {
                    // ERSPAN type III.
                    if data.len() > gre_len + 14 + 12 {
                        erspan_len = 12;
                        eth_len = 14;
                        gre_link_type = LinkType::Ethernet;

                        // Low bit of the last flags byte announces an
                        // 8-byte optional subheader.
                        let flags = data[gre_len + erspan_len - 1];
                        if flags & 0x01 == 0x01 {
                            if data.len() > gre_len + erspan_len + 8 + eth_len {
                                erspan_len += 8;
                            } else {
                                pl.sink.weird("truncated_GRE", Some(&ip_hdr), encap.as_ref());
                                return false;
                            }
                        }
                    } else {
                        pl.sink.weird("truncated_GRE", Some(&ip_hdr), encap.as_ref());
                        return false;
                    }
                }
                _ => {}
            }
        } else {
            // Enhanced GRE payload must be PPP.
            if proto_typ != 0x880b {
                pl.sink
                    .weird("egre_protocol_type", Some(&ip_hdr), encap.as_ref());
                return false;
            }
        }

        if flags_ver & 0x4000 != 0 {
            // RFC 2784 deprecates the variable-length routing field
            // specified by RFC 1701. Skip such packets entirely.
            pl.sink.weird("gre_routing", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        if flags_ver & 0x0078 != 0 {
            // The last four flag bits are reserved, undefined.
            pl.sink
                .weird("unknown_gre_flags", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        if data.len() < gre_len + ppp_len + eth_len + erspan_len {
            pl.sink.weird("truncated_GRE", Some(&ip_hdr), encap.as_ref());
            return false;
        }

        let mut proto = None;
        if gre_version == 1 {
            let ppp = u16::from_be_bytes([data[gre_len + 2], data[gre_len + 3]]);
            if ppp != ppp_proto::IPV4 && ppp != ppp_proto::IPV6 {
                pl.sink
                    .weird("non_ip_packet_in_encap", Some(&ip_hdr), encap.as_ref());
                return false;
            }
            proto = Some(if ppp == ppp_proto::IPV4 {
                ip_proto::IPIP
            } else {
                ip_proto::IPV6
            });
        }

        // GRE header stripped; what remains is the payload packet. The
        // tunnel analyzer treats it like any IP tunnel, just with a
        // different tunnel kind.
        let strip = gre_len + ppp_len + erspan_len;

        packet.key_store.tunnel_type = Some(TunnelType::Gre);
        packet.key_store.gre_version = Some(gre_version);
        packet.key_store.gre_link_type = Some(gre_link_type);
        if proto.is_some() {
            packet.key_store.proto = proto;
        }

        pl.forward_default(id, &data[strip..], packet);

        true
    }
}
