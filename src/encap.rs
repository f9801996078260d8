//! Tunnel encapsulation tracking.
//!
//! Every tunnel hop a packet traverses is recorded as an
//! [`EncapsulatingConn`]; the ordered list of hops forms an
//! [`EncapsulationStack`]. The stack is a plain value: re-entering the
//! pipeline through a tunnel clones the parent stack and appends the new
//! hop, so ownership follows the synthetic inner packet naturally.

use std::net::IpAddr;

use smallvec::SmallVec;

/// Kind of tunnel a hop was carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelType {
    /// IP-in-IP (protocols 4 and 41).
    Ip,
    /// GRE, including PPTP enhanced GRE, TEB and ERSPAN framings.
    Gre,
    /// VXLAN (UDP port 4789).
    Vxlan,
}

/// One hop of encapsulation: the outer endpoints and the tunnel kind.
///
/// The `uid` ties the two directions of a tunnel to a single identity;
/// both `a -> b` and `b -> a` packets of one IP tunnel share the UID of
/// the tunnel-map entry that first observed the pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulatingConn {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub tunnel_type: TunnelType,
    pub uid: u64,
}

impl EncapsulatingConn {
    pub fn new(src: IpAddr, dst: IpAddr, tunnel_type: TunnelType, uid: u64) -> Self {
        Self {
            src,
            dst,
            tunnel_type,
            uid,
        }
    }
}

/// Ordered list of tunnel hops for one packet, outermost first.
///
/// Depth is bounded by `Tunnel::max_depth` in the engine configuration;
/// the bound is enforced by the tunnel analyzers before they append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncapsulationStack {
    hops: SmallVec<[EncapsulatingConn; 2]>,
}

impl EncapsulationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nested tunnels.
    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// Append a hop in place.
    pub fn add(&mut self, conn: EncapsulatingConn) {
        self.hops.push(conn);
    }

    /// Clone this stack with one more hop appended. This is the shape
    /// tunnel re-entry wants: the outer stack stays with the outer packet.
    pub fn with(&self, conn: EncapsulatingConn) -> Self {
        let mut next = self.clone();
        next.add(conn);
        next
    }

    /// The innermost (most recently appended) hop.
    pub fn last(&self) -> Option<&EncapsulatingConn> {
        self.hops.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncapsulatingConn> {
        self.hops.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    // Test 1: depth grows with each hop
    #[test]
    fn test_depth() {
        let mut stack = EncapsulationStack::new();
        assert_eq!(stack.depth(), 0);

        stack.add(EncapsulatingConn::new(
            addr("10.0.0.1"),
            addr("10.0.0.2"),
            TunnelType::Gre,
            1,
        ));
        assert_eq!(stack.depth(), 1);

        stack.add(EncapsulatingConn::new(
            addr("192.168.0.1"),
            addr("192.168.0.2"),
            TunnelType::Vxlan,
            2,
        ));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.last().unwrap().tunnel_type, TunnelType::Vxlan);
    }

    // Test 2: with() leaves the original stack untouched
    #[test]
    fn test_with_clones() {
        let outer = EncapsulationStack::new().with(EncapsulatingConn::new(
            addr("10.0.0.1"),
            addr("10.0.0.2"),
            TunnelType::Ip,
            7,
        ));
        let inner = outer.with(EncapsulatingConn::new(
            addr("172.16.0.1"),
            addr("172.16.0.2"),
            TunnelType::Gre,
            8,
        ));

        assert_eq!(outer.depth(), 1);
        assert_eq!(inner.depth(), 2);
        assert_eq!(inner.last().unwrap().uid, 8);
        assert_eq!(outer.last().unwrap().uid, 7);
    }
}
