//! Deadline scheduling for fragment expiry and tunnel inactivity.
//!
//! Timers carry a weak handle (the fragment key or tunnel endpoint pair)
//! rather than a pointer to the state they guard. Firing looks the handle
//! up in the owning map; an entry that has since been removed makes the
//! firing a silent no-op, so cancellation is just removal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::net::IpAddr;

use crate::fragment::FragKey;

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Expire the fragment reassembler for this key if it still exists.
    FragExpire(FragKey),
    /// Re-check inactivity of the IP tunnel with these (canonically
    /// ordered) endpoints.
    IpTunnelInactivity((IpAddr, IpAddr)),
}

/// A scheduled timer, ready to dispatch.
#[derive(Debug, Clone)]
pub struct Timer {
    /// The time the timer was scheduled to fire at.
    pub at: f64,
    pub kind: TimerKind,
}

// BinaryHeap is a max-heap; reverse the ordering to pop the earliest
// deadline first. `seq` keeps same-deadline timers in insertion order.
#[derive(Debug)]
struct Entry {
    at: f64,
    seq: u64,
    kind: TimerKind,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending timers, dispatched between packets.
#[derive(Debug, Default)]
pub struct TimerManager {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire at time `at`.
    pub fn schedule(&mut self, at: f64, kind: TimerKind) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Entry { at, seq, kind });
    }

    /// Pop the next timer whose deadline is at or before `now`.
    pub fn next_due(&mut self, now: f64) -> Option<Timer> {
        if self.heap.peek().map(|e| e.at <= now)? {
            let e = self.heap.pop().unwrap();
            Some(Timer {
                at: e.at,
                kind: e.kind,
            })
        } else {
            None
        }
    }

    /// Pop every remaining timer regardless of deadline; used at shutdown,
    /// where callbacks must only clean up and never reschedule.
    pub fn drain(&mut self) -> Vec<Timer> {
        let mut out: Vec<Timer> = Vec::with_capacity(self.heap.len());
        while let Some(e) = self.heap.pop() {
            out.push(Timer {
                at: e.at,
                kind: e.kind,
            });
        }
        out
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag_key(ident: u32) -> FragKey {
        FragKey {
            src: "10.0.0.1".parse().unwrap(),
            dst: "10.0.0.2".parse().unwrap(),
            ident,
        }
    }

    // Test 1: earliest deadline pops first
    #[test]
    fn test_ordering() {
        let mut timers = TimerManager::new();
        timers.schedule(30.0, TimerKind::FragExpire(frag_key(2)));
        timers.schedule(10.0, TimerKind::FragExpire(frag_key(1)));
        timers.schedule(20.0, TimerKind::FragExpire(frag_key(3)));

        let t = timers.next_due(100.0).unwrap();
        assert_eq!(t.at, 10.0);
        assert_eq!(timers.next_due(100.0).unwrap().at, 20.0);
        assert_eq!(timers.next_due(100.0).unwrap().at, 30.0);
        assert!(timers.next_due(100.0).is_none());
    }

    // Test 2: timers after `now` stay scheduled
    #[test]
    fn test_not_yet_due() {
        let mut timers = TimerManager::new();
        timers.schedule(30.0, TimerKind::FragExpire(frag_key(1)));

        assert!(timers.next_due(29.999).is_none());
        assert_eq!(timers.len(), 1);
        assert!(timers.next_due(30.0).is_some());
        assert!(timers.is_empty());
    }

    // Test 3: same deadline dispatches in insertion order
    #[test]
    fn test_insertion_order() {
        let mut timers = TimerManager::new();
        timers.schedule(5.0, TimerKind::FragExpire(frag_key(1)));
        timers.schedule(5.0, TimerKind::FragExpire(frag_key(2)));

        assert_eq!(
            timers.next_due(5.0).unwrap().kind,
            TimerKind::FragExpire(frag_key(1))
        );
        assert_eq!(
            timers.next_due(5.0).unwrap().kind,
            TimerKind::FragExpire(frag_key(2))
        );
    }

    // Test 4: drain empties everything regardless of deadline
    #[test]
    fn test_drain() {
        let mut timers = TimerManager::new();
        timers.schedule(1e9, TimerKind::FragExpire(frag_key(1)));
        timers.schedule(5.0, TimerKind::FragExpire(frag_key(2)));

        let drained = timers.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].at, 5.0);
        assert!(timers.is_empty());
    }
}
