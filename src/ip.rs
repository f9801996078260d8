//! IP datagram header views.
//!
//! [`IpHdr`] is the decoded form of one IPv4 or IPv6 header chain. It owns a
//! copy of the raw header prefix so it can outlive the frame it was parsed
//! from; fragment reassembly reuses that prefix verbatim when rebuilding the
//! original datagram.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use etherparse::{Ipv4HeaderSlice, Ipv6HeaderSlice};

use crate::error::IpError;

/// IP protocol numbers the pipeline dispatches on.
#[allow(dead_code)]
pub mod ip_proto {
    pub const HOP_BY_HOP: u8 = 0;
    pub const ICMP: u8 = 1;
    /// IPv4 encapsulated in IP (IPIP)
    pub const IPIP: u8 = 4;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    /// IPv6 encapsulated in IP
    pub const IPV6: u8 = 41;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const GRE: u8 = 47;
    pub const AH: u8 = 51;
    pub const ICMPV6: u8 = 58;
    pub const NO_NEXT_HEADER: u8 = 59;
    pub const DESTINATION: u8 = 60;
    pub const MOBILITY: u8 = 135;
}

/// IP version of a parsed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

/// Decoded view of one IP header chain.
///
/// For IPv6 the view covers the base header plus any extension headers up to
/// (and including) the fragment header; `next_proto` is then the protocol
/// carried *after* the fragment header, as declared by the fragment header
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpHdr {
    version: IpVersion,
    src: IpAddr,
    dst: IpAddr,
    /// Transport protocol (IPv4 protocol field, or the next-header value
    /// after the walked IPv6 extension chain).
    next_proto: u8,
    /// Declared datagram length: IPv4 total length, or 40 + payload length.
    total_len: usize,
    /// Bytes consumed before the (fragment) payload begins.
    payload_offset: usize,
    /// Fragment identification; 16 bits for IPv4, 32 for IPv6.
    ident: u32,
    /// Fragment offset in bytes (the wire field scaled by 8).
    frag_offset: usize,
    mf: bool,
    df: bool,
    /// Copy of the header prefix used when rebuilding a fragmented
    /// datagram: the full IPv4 header including options, or the IPv6
    /// chain up to but not including the fragment header.
    proto_hdr: Vec<u8>,
    /// Position inside `proto_hdr` of the next-header byte that names the
    /// fragment header (IPv6 only); patched during reassembly.
    next_proto_pos: Option<usize>,
}

impl IpHdr {
    pub fn version(&self) -> IpVersion {
        self.version
    }

    pub fn src_addr(&self) -> IpAddr {
        self.src
    }

    pub fn dst_addr(&self) -> IpAddr {
        self.dst
    }

    pub fn next_proto(&self) -> u8 {
        self.next_proto
    }

    /// Declared length of the whole datagram.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Bytes of header preceding the payload, extension headers included.
    pub fn hdr_len(&self) -> usize {
        self.payload_offset
    }

    pub fn ident(&self) -> u32 {
        self.ident
    }

    /// Fragment offset in bytes.
    pub fn frag_offset(&self) -> usize {
        self.frag_offset
    }

    pub fn more_fragments(&self) -> bool {
        self.mf
    }

    pub fn dont_fragment(&self) -> bool {
        self.df
    }

    /// True when this datagram is one piece of a larger one.
    pub fn is_fragment(&self) -> bool {
        self.frag_offset > 0 || self.mf
    }

    /// The captured header prefix reused by fragment reassembly.
    pub fn protocol_header(&self) -> &[u8] {
        &self.proto_hdr
    }

    pub(crate) fn next_proto_pos(&self) -> Option<usize> {
        self.next_proto_pos
    }

    /// Slice the datagram payload out of the buffer this header was
    /// parsed from.
    pub fn payload<'d>(&self, data: &'d [u8]) -> &'d [u8] {
        let end = self.total_len.min(data.len());
        &data[self.payload_offset.min(end)..end]
    }
}

/// Parse one IP datagram out of `data`.
///
/// `expected_proto` is the carrier's claim about the payload: protocol 4
/// demands IPv4, protocol 41 demands IPv6, `None` accepts either. The error
/// variants preserve the session layer's legacy return-code contract
/// (`Truncated` = -1, `InvalidVersion` = -2, `LengthMismatch` = the byte
/// deficit).
pub fn parse_ip_packet(data: &[u8], expected_proto: Option<u8>) -> Result<IpHdr, IpError> {
    if data.is_empty() {
        return Err(IpError::Truncated);
    }

    let version = data[0] >> 4;
    let version_ok = match expected_proto {
        Some(ip_proto::IPIP) => version == 4,
        Some(ip_proto::IPV6) => version == 6,
        _ => version == 4 || version == 6,
    };
    if !version_ok {
        return Err(IpError::InvalidVersion { version });
    }

    match version {
        4 => parse_ipv4(data),
        6 => parse_ipv6(data),
        v => Err(IpError::InvalidVersion { version: v }),
    }
}

fn parse_ipv4(data: &[u8]) -> Result<IpHdr, IpError> {
    let ipv4 = Ipv4HeaderSlice::from_slice(data).map_err(|_| IpError::Truncated)?;

    let hdr_len = ipv4.slice().len();
    let total_len = ipv4.total_len() as usize;
    if total_len < hdr_len {
        return Err(IpError::Truncated);
    }
    if total_len > data.len() {
        return Err(IpError::LengthMismatch {
            excess: total_len - data.len(),
        });
    }

    Ok(IpHdr {
        version: IpVersion::V4,
        src: IpAddr::V4(Ipv4Addr::from(ipv4.source())),
        dst: IpAddr::V4(Ipv4Addr::from(ipv4.destination())),
        next_proto: ipv4.protocol().0,
        total_len,
        payload_offset: hdr_len,
        ident: ipv4.identification() as u32,
        frag_offset: ipv4.fragments_offset().value() as usize * 8,
        mf: ipv4.more_fragments(),
        df: ipv4.dont_fragment(),
        proto_hdr: data[..hdr_len].to_vec(),
        next_proto_pos: None,
    })
}

fn parse_ipv6(data: &[u8]) -> Result<IpHdr, IpError> {
    let ipv6 = Ipv6HeaderSlice::from_slice(data).map_err(|_| IpError::Truncated)?;

    let total_len = 40 + ipv6.payload_length() as usize;
    if total_len > data.len() {
        return Err(IpError::LengthMismatch {
            excess: total_len - data.len(),
        });
    }

    let src = IpAddr::V6(Ipv6Addr::from(ipv6.source()));
    let dst = IpAddr::V6(Ipv6Addr::from(ipv6.destination()));

    // Walk the extension chain up to the transport header or the fragment
    // header, whichever comes first. `next_pos` tracks the byte that names
    // the header at `pos`, so reassembly can re-point it.
    let mut pos = 40usize;
    let mut next = ipv6.next_header().0;
    let mut next_pos = 6usize;

    loop {
        match next {
            ip_proto::HOP_BY_HOP
            | ip_proto::ROUTING
            | ip_proto::DESTINATION
            | ip_proto::MOBILITY => {
                if pos + 2 > total_len {
                    return Err(IpError::Truncated);
                }
                let ext_len = (data[pos + 1] as usize + 1) * 8;
                if pos + ext_len > total_len {
                    return Err(IpError::Truncated);
                }
                next = data[pos];
                next_pos = pos;
                pos += ext_len;
            }
            ip_proto::AH => {
                if pos + 2 > total_len {
                    return Err(IpError::Truncated);
                }
                let ext_len = (data[pos + 1] as usize + 2) * 4;
                if pos + ext_len > total_len {
                    return Err(IpError::Truncated);
                }
                next = data[pos];
                next_pos = pos;
                pos += ext_len;
            }
            ip_proto::FRAGMENT => {
                if pos + 8 > total_len {
                    return Err(IpError::Truncated);
                }
                let off_flags = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);
                let ident = u32::from_be_bytes([
                    data[pos + 4],
                    data[pos + 5],
                    data[pos + 6],
                    data[pos + 7],
                ]);
                return Ok(IpHdr {
                    version: IpVersion::V6,
                    src,
                    dst,
                    next_proto: data[pos],
                    total_len,
                    payload_offset: pos + 8,
                    ident,
                    frag_offset: (off_flags & 0xFFF8) as usize,
                    mf: (off_flags & 0x0001) != 0,
                    df: false,
                    proto_hdr: data[..pos].to_vec(),
                    next_proto_pos: Some(next_pos),
                });
            }
            _ => break,
        }
    }

    Ok(IpHdr {
        version: IpVersion::V6,
        src,
        dst,
        next_proto: next,
        total_len,
        payload_offset: pos,
        ident: 0,
        frag_offset: 0,
        mf: false,
        df: false,
        proto_hdr: data[..pos].to_vec(),
        next_proto_pos: Some(next_pos),
    })
}
