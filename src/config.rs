//! Process-wide configuration, read-only after engine construction.

/// Tunnel decapsulation options.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Decapsulate GRE. When false every GRE packet raises a `GRE_tunnel`
    /// weird and is left to the session layer as an opaque datagram.
    pub enable_gre: bool,
    /// Decapsulate IP-in-IP. Same drop semantics as `enable_gre`.
    pub enable_ip: bool,
    /// Decapsulate VXLAN.
    pub enable_vxlan: bool,
    /// Maximum nesting depth of the encapsulation stack.
    pub max_depth: usize,
    /// Inactivity timeout (seconds) for entries in the IP tunnel map.
    pub ip_tunnel_timeout: f64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enable_gre: true,
            enable_ip: true,
            enable_vxlan: true,
            max_depth: 2,
            ip_tunnel_timeout: 86400.0, // 24 hours
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tunnel: TunnelConfig,
    /// Maximum time (seconds) a fragment reassembler lives without completing.
    pub frag_timeout: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tunnel: TunnelConfig::default(),
            frag_timeout: 30.0,
        }
    }
}
