//! Link-layer analyzer for Ethernet frames.

use etherparse::Ethernet2HeaderSlice;

use crate::engine::Pipeline;
use crate::packet::{L3Proto, PacketBuffer};
use crate::session::SessionSink;

use super::{Analyzer, AnalyzerId};

/// Well-known EtherType values (IEEE 802).
#[allow(dead_code)]
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const RARP: u16 = 0x8035;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ: u16 = 0x88A8;
    /// Transparent Ethernet Bridging, carried by GRE.
    pub const TEB: u16 = 0x6558;
}

/// Decoded link-layer fields of one Ethernet frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LinkDecode {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub eth_type: u16,
    pub vlan: Option<u16>,
    pub inner_vlan: Option<u16>,
    pub hdr_size: usize,
}

/// Decode the Ethernet header, peeling up to two VLAN tags (802.1Q and
/// Q-in-Q). Returns None when the frame is too short.
pub(crate) fn decode_ethernet(data: &[u8]) -> Option<LinkDecode> {
    let eth = Ethernet2HeaderSlice::from_slice(data).ok()?;

    let mut eth_type = eth.ether_type().0;
    let mut offset = eth.slice().len();
    let mut vlan = None;
    let mut inner_vlan = None;

    while eth_type == ethertype::VLAN || eth_type == ethertype::QINQ {
        if data.len() < offset + 4 {
            return None;
        }
        let tci = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let tag = tci & 0x0FFF;
        if vlan.is_none() {
            vlan = Some(tag);
        } else if inner_vlan.is_none() {
            inner_vlan = Some(tag);
        }
        eth_type = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
        offset += 4;
    }

    Some(LinkDecode {
        dst: eth.destination(),
        src: eth.source(),
        eth_type,
        vlan,
        inner_vlan,
        hdr_size: offset,
    })
}

/// Link-layer analyzer: decodes the Ethernet header, records the L2
/// fields on the packet and forwards by ethertype.
#[derive(Debug, Clone, Copy)]
pub struct EthernetAnalyzer;

impl Analyzer for EthernetAnalyzer {
    fn name(&self) -> &'static str {
        "Ethernet"
    }

    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let Some(link) = decode_ethernet(data) else {
            pl.sink.weird_packet("truncated_ethernet_frame", packet);
            return false;
        };

        packet.l2_dst = Some(link.dst);
        packet.l2_src = Some(link.src);
        packet.eth_type = link.eth_type;
        packet.vlan = link.vlan;
        packet.inner_vlan = link.inner_vlan;
        packet.hdr_size = link.hdr_size;

        match link.eth_type {
            ethertype::IPV4 | ethertype::IPV6 => {
                pl.forward(id, link.eth_type as u32, &data[link.hdr_size..], packet)
            }
            ethertype::ARP | ethertype::RARP => {
                // ARP handling is outside packet analysis; the frame is
                // still a valid layer 2 decode.
                packet.l3_proto = L3Proto::Arp;
                true
            }
            _ => true,
        }
    }
}
