//! Convenient re-exports for common usage.
//!
//! # Example
//!
//! ```rust
//! use tapcore::prelude::*;
//!
//! let mut engine = Engine::new(EngineConfig::default(), NullSink);
//! let frame: &[u8] = &[0u8; 14];
//! let mut packet = PacketBuffer::new(LinkType::Ethernet, Timestamp::default(), 14, 14, frame);
//! engine.process_packet(&mut packet);
//! ```

// Engine types
pub use crate::config::{EngineConfig, TunnelConfig};
pub use crate::engine::{Engine, PacketDumper, Pipeline};

// Packet types
pub use crate::packet::{KeyStore, L3Proto, LinkType, PacketBuffer, Timestamp};

// Analyzer types
pub use crate::analyzer::{
    default_registry, Analyzer, AnalyzerId, AnalyzerRegistry, BuiltinAnalyzer, DispatchTable,
};

// IP and encapsulation types
pub use crate::encap::{EncapsulatingConn, EncapsulationStack, TunnelType};
pub use crate::ip::{parse_ip_packet, IpHdr, IpVersion};

// Fragment reassembly
pub use crate::fragment::{FragKey, FragReassembler, FragmentManager};

// Session interface
pub use crate::session::{NullSink, SessionSink};

// Capture I/O
pub use crate::pcap::{PcapFileReader, PcapWriter, RawFrame};

// Error types
pub use crate::error::{Error, Result};
