//! UDP tunnel lift.
//!
//! The pipeline does not analyze UDP itself; this analyzer only peeks at
//! the destination port to lift UDP-carried tunnels (VXLAN) out of the
//! datagram stream. A datagram whose port matches nothing falls back to
//! the session layer untouched.

use crate::engine::Pipeline;
use crate::packet::PacketBuffer;
use crate::session::SessionSink;

use super::{Analyzer, AnalyzerId};

const UDP_HDR_LEN: usize = 8;

/// UDP destination-port dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct UdpAnalyzer;

impl Analyzer for UdpAnalyzer {
    fn name(&self) -> &'static str {
        "UDP"
    }

    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        if data.len() < UDP_HDR_LEN {
            return false;
        }

        let dst_port = u16::from_be_bytes([data[2], data[3]]);
        pl.forward(id, dst_port as u32, &data[UDP_HDR_LEN..], packet)
    }
}
