//! Packet analyzer framework.
//!
//! This module provides:
//! - [`Analyzer`] trait for implementing packet analyzers
//! - [`AnalyzerRegistry`] holding the registered analyzers and the
//!   identifier-keyed dispatch tables that chain them into a DAG
//! - Built-in analyzers for the supported encapsulations
//!
//! ## Analyzer chain
//!
//! | Stage | Dispatch key | Successors |
//! |-------|--------------|------------|
//! | Root | pcap link type | Ethernet, IP |
//! | Ethernet | ethertype | IP |
//! | IP | IP protocol | GRE, IPTunnel, UDP |
//! | GRE | (default) | IPTunnel |
//! | UDP | destination port | VXLAN |
//!
//! Tunnel analyzers re-enter the pipeline at the root with a synthesized
//! inner packet; the nesting depth is bounded by the engine configuration.

pub mod ethernet;
pub mod gre;
pub mod ip;
pub mod iptunnel;
pub mod udp;
pub mod vxlan;

use smallvec::SmallVec;

use crate::engine::Pipeline;
use crate::packet::PacketBuffer;
use crate::session::SessionSink;

pub use ethernet::EthernetAnalyzer;
pub use gre::GreAnalyzer;
pub use ip::IpAnalyzer;
pub use iptunnel::IpTunnelAnalyzer;
pub use udp::UdpAnalyzer;
pub use vxlan::VxlanAnalyzer;

/// Handle ("tag") of a registered analyzer.
pub type AnalyzerId = usize;

/// Core trait all packet analyzers implement.
///
/// `analyze_packet` receives the bytes remaining at this layer and the
/// packet being analyzed. The contract on the return value: `true` means
/// the analyzer consumed its header and either forwarded the remainder,
/// recognized end-of-analysis, or reported a violation it wants treated
/// as final; `false` means "not handled here", allowing the caller to try
/// an alternative (for the link layer that invalidates the packet).
pub trait Analyzer {
    /// Name of this analyzer (e.g. "GRE").
    fn name(&self) -> &'static str;

    /// Analyze the remaining bytes of `packet` at this layer.
    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool;
}

/// Dispatch table of one analyzer: a small identifier-to-successor map
/// (ethertype, IP protocol number, UDP destination port, link type)
/// plus an optional default successor for analyzers with exactly one exit.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    entries: SmallVec<[(u32, AnalyzerId); 8]>,
    default: Option<AnalyzerId>,
}

impl DispatchTable {
    /// Register a successor under an identifier. A repeated identifier
    /// replaces the previous successor.
    pub fn register(&mut self, key: u32, id: AnalyzerId) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = id;
        } else {
            self.entries.push((key, id));
        }
    }

    pub fn set_default(&mut self, id: AnalyzerId) {
        self.default = Some(id);
    }

    /// Look up the successor for an identifier (linear search, N is small).
    #[inline]
    pub fn lookup(&self, key: u32) -> Option<AnalyzerId> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, id)| *id)
    }

    pub fn default_successor(&self) -> Option<AnalyzerId> {
        self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dispatcher for the link type a frame arrived with; the root of the
/// analyzer DAG.
#[derive(Debug, Clone, Copy)]
pub struct RootAnalyzer;

impl Analyzer for RootAnalyzer {
    fn name(&self) -> &'static str {
        "Root"
    }

    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        let key = packet.link_type.dlt();
        pl.forward(id, key, data, packet)
    }
}

/// Enum of all built-in analyzers.
///
/// This enables static dispatch (no vtable) and lets analyzers stay
/// zero-sized: all mutable state lives in the engine, keyed so that the
/// analyzers themselves are freely copyable.
#[derive(Debug, Clone, Copy)]
pub enum BuiltinAnalyzer {
    Root(RootAnalyzer),
    Ethernet(EthernetAnalyzer),
    Ip(IpAnalyzer),
    Gre(GreAnalyzer),
    IpTunnel(IpTunnelAnalyzer),
    Udp(UdpAnalyzer),
    Vxlan(VxlanAnalyzer),
}

/// Macro to delegate Analyzer trait methods to inner types.
macro_rules! delegate_analyzer {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            BuiltinAnalyzer::Root(a) => a.$method($($arg),*),
            BuiltinAnalyzer::Ethernet(a) => a.$method($($arg),*),
            BuiltinAnalyzer::Ip(a) => a.$method($($arg),*),
            BuiltinAnalyzer::Gre(a) => a.$method($($arg),*),
            BuiltinAnalyzer::IpTunnel(a) => a.$method($($arg),*),
            BuiltinAnalyzer::Udp(a) => a.$method($($arg),*),
            BuiltinAnalyzer::Vxlan(a) => a.$method($($arg),*),
        }
    };
}

impl Analyzer for BuiltinAnalyzer {
    #[inline]
    fn name(&self) -> &'static str {
        delegate_analyzer!(self, name)
    }

    #[inline]
    fn analyze_packet<S: SessionSink>(
        &self,
        id: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
        pl: &mut Pipeline<'_, S>,
    ) -> bool {
        delegate_analyzer!(self, analyze_packet, id, data, packet, pl)
    }
}

impl From<RootAnalyzer> for BuiltinAnalyzer {
    fn from(a: RootAnalyzer) -> Self {
        BuiltinAnalyzer::Root(a)
    }
}

impl From<EthernetAnalyzer> for BuiltinAnalyzer {
    fn from(a: EthernetAnalyzer) -> Self {
        BuiltinAnalyzer::Ethernet(a)
    }
}

impl From<IpAnalyzer> for BuiltinAnalyzer {
    fn from(a: IpAnalyzer) -> Self {
        BuiltinAnalyzer::Ip(a)
    }
}

impl From<GreAnalyzer> for BuiltinAnalyzer {
    fn from(a: GreAnalyzer) -> Self {
        BuiltinAnalyzer::Gre(a)
    }
}

impl From<IpTunnelAnalyzer> for BuiltinAnalyzer {
    fn from(a: IpTunnelAnalyzer) -> Self {
        BuiltinAnalyzer::IpTunnel(a)
    }
}

impl From<UdpAnalyzer> for BuiltinAnalyzer {
    fn from(a: UdpAnalyzer) -> Self {
        BuiltinAnalyzer::Udp(a)
    }
}

impl From<VxlanAnalyzer> for BuiltinAnalyzer {
    fn from(a: VxlanAnalyzer) -> Self {
        BuiltinAnalyzer::Vxlan(a)
    }
}

/// Registry of analyzers and the dispatch tables wiring them together.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<(BuiltinAnalyzer, DispatchTable)>,
    root: AnalyzerId,
}

impl AnalyzerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer, returning its tag.
    pub fn register<A: Into<BuiltinAnalyzer>>(&mut self, analyzer: A) -> AnalyzerId {
        self.analyzers
            .push((analyzer.into(), DispatchTable::default()));
        self.analyzers.len() - 1
    }

    /// Wire `from`'s dispatch table so `key` selects `to`.
    pub fn connect(&mut self, from: AnalyzerId, key: u32, to: AnalyzerId) {
        self.analyzers[from].1.register(key, to);
    }

    /// Wire `from`'s single default exit to `to`.
    pub fn set_default_successor(&mut self, from: AnalyzerId, to: AnalyzerId) {
        self.analyzers[from].1.set_default(to);
    }

    /// Name the analyzer every packet enters through.
    pub fn set_root(&mut self, id: AnalyzerId) {
        self.root = id;
    }

    pub fn root(&self) -> AnalyzerId {
        self.root
    }

    pub fn get(&self, id: AnalyzerId) -> &BuiltinAnalyzer {
        &self.analyzers[id].0
    }

    pub fn dispatch(&self, id: AnalyzerId) -> &DispatchTable {
        &self.analyzers[id].1
    }

    /// Look up an analyzer's tag by name.
    pub fn get_analyzer(&self, name: &str) -> Option<AnalyzerId> {
        self.analyzers.iter().position(|(a, _)| a.name() == name)
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

/// Create a registry with all built-in analyzers wired into the default
/// chain.
pub fn default_registry() -> AnalyzerRegistry {
    use crate::ip::ip_proto;
    use crate::packet::LinkType;

    let mut registry = AnalyzerRegistry::new();

    let root = registry.register(RootAnalyzer);
    let eth = registry.register(EthernetAnalyzer);
    let ip = registry.register(IpAnalyzer);
    let gre = registry.register(GreAnalyzer);
    let iptunnel = registry.register(IpTunnelAnalyzer);
    let udp = registry.register(UdpAnalyzer);
    let vxlan = registry.register(VxlanAnalyzer);

    registry.set_root(root);

    // Link layer
    registry.connect(root, LinkType::Ethernet.dlt(), eth);
    registry.connect(root, LinkType::Raw.dlt(), ip);

    // Network layer
    registry.connect(eth, ethernet::ethertype::IPV4 as u32, ip);
    registry.connect(eth, ethernet::ethertype::IPV6 as u32, ip);

    // Tunnels
    registry.connect(ip, ip_proto::GRE as u32, gre);
    registry.connect(ip, ip_proto::IPIP as u32, iptunnel);
    registry.connect(ip, ip_proto::IPV6 as u32, iptunnel);
    registry.connect(ip, ip_proto::UDP as u32, udp);
    registry.set_default_successor(gre, iptunnel);
    registry.connect(udp, vxlan::VXLAN_PORT as u32, vxlan);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_analyzer_size() {
        // All analyzers are zero-sized unit structs, so the enum is just
        // the discriminant.
        let size = std::mem::size_of::<BuiltinAnalyzer>();
        assert!(size <= 8, "BuiltinAnalyzer is {} bytes, expected <= 8", size);
    }

    #[test]
    fn test_dispatch_table() {
        let mut table = DispatchTable::default();
        assert!(table.lookup(47).is_none());

        table.register(47, 3);
        table.register(4, 4);
        assert_eq!(table.lookup(47), Some(3));
        assert_eq!(table.lookup(4), Some(4));
        assert_eq!(table.len(), 2);

        // Re-registration replaces.
        table.register(47, 5);
        assert_eq!(table.lookup(47), Some(5));
        assert_eq!(table.len(), 2);

        assert!(table.default_successor().is_none());
        table.set_default(1);
        assert_eq!(table.default_successor(), Some(1));
    }

    #[test]
    fn test_default_registry_wiring() {
        let registry = default_registry();
        assert_eq!(registry.len(), 7);

        let root = registry.root();
        assert_eq!(registry.get(root).name(), "Root");

        let eth = registry.dispatch(root).lookup(1).unwrap();
        assert_eq!(registry.get(eth).name(), "Ethernet");

        let ip = registry.dispatch(eth).lookup(0x0800).unwrap();
        assert_eq!(registry.get(ip).name(), "IP");
        assert_eq!(registry.dispatch(eth).lookup(0x86DD), Some(ip));
        assert_eq!(registry.dispatch(root).lookup(101), Some(ip));

        let gre = registry.dispatch(ip).lookup(47).unwrap();
        assert_eq!(registry.get(gre).name(), "GRE");

        let iptunnel = registry.dispatch(gre).default_successor().unwrap();
        assert_eq!(registry.get(iptunnel).name(), "IPTunnel");
        assert_eq!(registry.dispatch(ip).lookup(4), Some(iptunnel));
        assert_eq!(registry.dispatch(ip).lookup(41), Some(iptunnel));

        let udp = registry.dispatch(ip).lookup(17).unwrap();
        let vxlan = registry.dispatch(udp).lookup(4789).unwrap();
        assert_eq!(registry.get(vxlan).name(), "VXLAN");
    }

    #[test]
    fn test_get_analyzer_by_name() {
        let registry = default_registry();
        assert!(registry.get_analyzer("GRE").is_some());
        assert!(registry.get_analyzer("IPTunnel").is_some());
        assert!(registry.get_analyzer("nonexistent").is_none());
    }
}
