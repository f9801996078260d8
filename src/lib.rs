//! # tapcore
//!
//! Packet analysis core for a passive network monitor.
//!
//! This crate covers the layers between "packet bytes off the wire" and
//! "one inner IP datagram ready for session analysis": a pluggable
//! analyzer pipeline that peels encapsulation (Ethernet, VLAN, GRE,
//! IP-in-IP, VXLAN) with bounded nesting depth and per-tunnel inactivity
//! tracking, and an IP fragment reassembler with hole tracking, overlap
//! detection and timed expiry. Session/connection analysis itself is an
//! external collaborator behind the [`SessionSink`] trait.
//!
//! ## Features
//!
//! - **Analyzer chain**: identifier-keyed dispatch tables form a DAG of
//!   zero-sized analyzers rooted at the link-type dispatcher
//! - **Tunnel decapsulation**: GRE v0/v1 (incl. TEB and ERSPAN II/III),
//!   IP-in-IP, VXLAN; each hop recorded on a bounded encapsulation stack
//! - **Fragment reassembly**: per-(src, dst, id) hole tracking with
//!   first-writer-wins overlap semantics and timer-driven expiry
//! - **PCAP I/O**: legacy pcap reading for capture input, writing for the
//!   optional trace sink
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tapcore::prelude::*;
//!
//! let mut engine = Engine::new(EngineConfig::default(), NullSink);
//!
//! let mut reader = PcapFileReader::open("capture.pcap").unwrap();
//! while let Some(frame) = reader.next_frame().unwrap() {
//!     let mut packet = frame.to_packet();
//!     engine.process_packet(&mut packet);
//! }
//! engine.finish();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                             tapcore                                |
//! +--------------------------------------------------------------------+
//! |  engine/    - Engine driver, Pipeline, timers, counters            |
//! |  analyzer/  - Analyzer trait, registry, Ethernet/IP/GRE/           |
//! |               IPTunnel/UDP/VXLAN analyzers                         |
//! |  fragment/  - FragmentManager, FragReassembler                     |
//! |  packet/    - PacketBuffer, typed key store                        |
//! |  encap/     - EncapsulationStack, tunnel hops                      |
//! |  ip/        - IpHdr views, datagram parsing                        |
//! |  session/   - SessionSink boundary to connection analysis          |
//! |  pcap/      - capture input, trace-write sink                      |
//! |  error/     - error types                                         |
//! +--------------------------------------------------------------------+
//! ```
//!
//! The pipeline is single-threaded and cooperative: one packet is
//! processed to completion (tunnel re-entries and fragment completion
//! included) before the next is drawn from the source, and the only
//! deferred work is timer dispatch between packets.

pub mod analyzer;
pub mod config;
pub mod encap;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod ip;
pub mod packet;
pub mod pcap;
pub mod prelude;
pub mod session;
pub mod timer;

// Re-export commonly used types at crate root for convenience
pub use analyzer::{default_registry, Analyzer, AnalyzerId, AnalyzerRegistry, BuiltinAnalyzer};
pub use config::{EngineConfig, TunnelConfig};
pub use encap::{EncapsulatingConn, EncapsulationStack, TunnelType};
pub use engine::{Engine, PacketDumper, Pipeline};
pub use error::{Error, IpError, PcapError, Result};
pub use fragment::{FragKey, FragReassembler, FragmentManager};
pub use ip::{parse_ip_packet, IpHdr, IpVersion};
pub use packet::{KeyStore, L3Proto, LinkType, PacketBuffer, Timestamp};
pub use pcap::{PcapFileReader, PcapWriter, RawFrame};
pub use session::{NullSink, SessionSink};
pub use timer::{Timer, TimerKind, TimerManager};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
