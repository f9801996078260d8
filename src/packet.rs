//! Captured frame representation.
//!
//! A [`PacketBuffer`] wraps one link-layer frame together with its capture
//! metadata, the fields decoded by the link-layer analyzer, and the typed
//! [`KeyStore`] side channel analyzers use to pass context down the chain.
//! The byte slice is either borrowed from the capture source or owned by
//! the buffer (synthetic inner packets built by tunnel analyzers own a
//! slice of the outer payload's lifetime instead).

use std::borrow::Cow;

use compact_str::CompactString;

use crate::encap::{EncapsulationStack, TunnelType};
use crate::ip::IpHdr;

/// Capture timestamp with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: u32,
}

impl Timestamp {
    pub fn new(sec: i64, usec: u32) -> Self {
        Self { sec, usec }
    }

    pub fn from_secs_f64(t: f64) -> Self {
        let sec = t.floor() as i64;
        let usec = ((t - sec as f64) * 1e6).round() as u32;
        Self {
            sec,
            usec: usec.min(999_999),
        }
    }

    /// Timestamp as a floating-point number of seconds.
    pub fn time(&self) -> f64 {
        self.sec as f64 + self.usec as f64 / 1e6
    }
}

/// Link-layer encapsulation of a captured frame, named by the pcap
/// LINKTYPE registry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// IEEE 802.3 Ethernet (LINKTYPE_ETHERNET, 1).
    Ethernet,
    /// Raw IP starting directly at the version nibble (LINKTYPE_RAW, 101).
    Raw,
    /// Anything else; carried through untouched.
    Unknown(u16),
}

impl LinkType {
    pub fn from_dlt(dlt: u32) -> Self {
        match dlt {
            1 => LinkType::Ethernet,
            101 => LinkType::Raw,
            other => LinkType::Unknown(other as u16),
        }
    }

    pub fn dlt(self) -> u32 {
        match self {
            LinkType::Ethernet => 1,
            LinkType::Raw => 101,
            LinkType::Unknown(v) => v as u32,
        }
    }
}

/// Layer-3 protocol discovered by the link-layer analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum L3Proto {
    #[default]
    Unknown,
    Ipv4,
    Ipv6,
    Arp,
}

/// Typed side channel for analyzer-to-analyzer context within one packet's
/// lifetime. Each field is set by the analyzer that learned it and read by
/// whichever successor needs it; all are cleared with the packet.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    /// Encapsulation stack accumulated by enclosing tunnels.
    pub encap: Option<EncapsulationStack>,
    /// The most recently parsed IP header.
    pub ip_hdr: Option<IpHdr>,
    /// Inner protocol number claimed by a tunnel carrier (4 or 41).
    pub proto: Option<u8>,
    /// Tunnel kind recorded by the analyzer that recognized the tunnel.
    pub tunnel_type: Option<TunnelType>,
    /// GRE version, when the packet came through a GRE header.
    pub gre_version: Option<u8>,
    /// Link type of the GRE payload (raw IP, or Ethernet for TEB/ERSPAN).
    pub gre_link_type: Option<LinkType>,
    /// Inner IP header already parsed by a tunnel carrier; the IP analyzer
    /// reuses it instead of parsing again.
    pub encap_inner_ip: Option<IpHdr>,
}

/// One captured (or synthesized) frame moving through the pipeline.
#[derive(Debug)]
pub struct PacketBuffer<'a> {
    /// Capture timestamp.
    pub ts: Timestamp,
    /// Link-layer encapsulation.
    pub link_type: LinkType,
    /// Length on the wire.
    pub len: u32,
    /// Captured length; never exceeds `len`.
    pub cap_len: u32,
    /// Frame bytes, borrowed from the source or owned by this buffer.
    pub data: Cow<'a, [u8]>,
    /// Bytes consumed by link-layer decode.
    pub hdr_size: usize,

    // Decoded layer-2 fields, valid only for Ethernet frames.
    pub l2_src: Option<[u8; 6]>,
    pub l2_dst: Option<[u8; 6]>,
    pub eth_type: u16,
    pub vlan: Option<u16>,
    pub inner_vlan: Option<u16>,

    pub l3_proto: L3Proto,
    /// False until the link-layer analyzer succeeds; the driver clears it
    /// when analysis fails.
    pub l2_valid: bool,
    pub l2_checksummed: bool,
    pub l3_checksummed: bool,

    /// Whether the session layer should see this packet.
    pub session_analysis: bool,
    /// Whether an active dumper should record this frame.
    pub dump_packet: bool,
    /// Free-form tag from the capture source.
    pub tag: Option<CompactString>,

    /// Typed analyzer-to-analyzer side channel.
    pub key_store: KeyStore,
}

impl<'a> PacketBuffer<'a> {
    /// Wrap a borrowed frame.
    pub fn new(link_type: LinkType, ts: Timestamp, cap_len: u32, len: u32, data: &'a [u8]) -> Self {
        Self::from_cow(link_type, ts, cap_len, len, Cow::Borrowed(data))
    }

    /// Wrap an owned frame; the bytes are dropped with the buffer.
    pub fn new_owned(
        link_type: LinkType,
        ts: Timestamp,
        cap_len: u32,
        len: u32,
        data: Vec<u8>,
    ) -> Self {
        Self::from_cow(link_type, ts, cap_len, len, Cow::Owned(data))
    }

    fn from_cow(
        link_type: LinkType,
        ts: Timestamp,
        cap_len: u32,
        len: u32,
        data: Cow<'a, [u8]>,
    ) -> Self {
        // Captured length can never exceed the on-wire length.
        let len = len.max(cap_len);
        let l2_valid = !data.is_empty();
        Self {
            ts,
            link_type,
            len,
            cap_len,
            data,
            hdr_size: 0,
            l2_src: None,
            l2_dst: None,
            eth_type: 0,
            vlan: None,
            inner_vlan: None,
            l3_proto: L3Proto::Unknown,
            l2_valid,
            l2_checksummed: false,
            l3_checksummed: false,
            session_analysis: false,
            dump_packet: false,
            tag: None,
            key_store: KeyStore::default(),
        }
    }

    /// Capture timestamp as seconds.
    pub fn time(&self) -> f64 {
        self.ts.time()
    }

    /// The frame bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Attach a source tag.
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(CompactString::new(tag));
        self
    }
}
