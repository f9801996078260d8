//! Table of live fragment reassemblers.

use std::collections::BTreeMap;

use crate::ip::IpHdr;
use crate::session::SessionSink;

use super::{FragKey, FragReassembler};

/// Owns every live [`FragReassembler`], keyed by the datagram identity.
///
/// Expiry timers reference entries by key; a key that is no longer present
/// makes the firing a no-op, which is how completion "cancels" the timer.
#[derive(Debug, Default)]
pub struct FragmentManager {
    fragments: BTreeMap<FragKey, FragReassembler>,
    max_fragments: usize,
}

impl FragmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the reassembler for this fragment's datagram, creating it
    /// on first sight. Returns the entry and whether it was just created
    /// (the caller schedules the expiry timer for new entries).
    pub fn next_fragment(&mut self, t: f64, ip: &IpHdr) -> (&mut FragReassembler, bool) {
        let key = FragKey::for_datagram(ip);
        let created = !self.fragments.contains_key(&key);
        if created {
            self.max_fragments = self.max_fragments.max(self.fragments.len() + 1);
        }
        let entry = self
            .fragments
            .entry(key.clone())
            .or_insert_with(|| FragReassembler::new(key, ip, t));
        (entry, created)
    }

    /// Drop the reassembler for `key`. Idempotent: removing a key twice is
    /// a no-op the second time.
    pub fn remove(&mut self, key: &FragKey) -> bool {
        self.fragments.remove(key).is_some()
    }

    /// Expiry timer fired for `key`. Silent no-op when the entry is
    /// already gone (completed or cleared).
    pub fn expire<S: SessionSink>(&mut self, key: &FragKey, t: f64, sink: &mut S) {
        if let Some(r) = self.fragments.remove(key) {
            r.expire(t, sink);
        }
    }

    /// Drop all reassemblers; called at shutdown.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    pub fn get(&self, key: &FragKey) -> Option<&FragReassembler> {
        self.fragments.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FragKey, &FragReassembler)> {
        self.fragments.iter()
    }

    /// Number of live reassemblers.
    pub fn size(&self) -> usize {
        self.fragments.len()
    }

    /// High-water mark of live reassemblers.
    pub fn max_fragments(&self) -> usize {
        self.max_fragments
    }

    /// Bytes held across all reassemblers.
    pub fn memory_allocation(&self) -> usize {
        self.fragments
            .values()
            .map(|r| r.memory_allocation())
            .sum()
    }
}
