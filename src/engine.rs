//! Pipeline driver.
//!
//! The [`Engine`] bundles what the pipeline needs process-wide: the
//! analyzer registry, the fragment manager, the IP tunnel activity map,
//! the timer manager and the counters. Everything is constructed together
//! at startup and torn down together by [`Engine::finish`].
//!
//! Packets are processed one at a time to completion, tunnel re-entries
//! and fragment completions included; the only deferred work is timer
//! dispatch, which happens on the same thread between packets.

use std::borrow::Cow;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace, warn};

use crate::analyzer::iptunnel::IpTunnelMap;
use crate::analyzer::{default_registry, Analyzer, AnalyzerId, AnalyzerRegistry};
use crate::config::EngineConfig;
use crate::fragment::FragmentManager;
use crate::packet::PacketBuffer;
use crate::session::SessionSink;
use crate::timer::{Timer, TimerKind, TimerManager};

/// Sink for raw frames, fed by the driver when a packet is flagged for
/// dumping.
pub trait PacketDumper {
    fn dump_packet(&mut self, packet: &PacketBuffer<'_>) -> std::io::Result<()>;
}

/// Mutable pipeline state shared by all analyzers.
#[derive(Debug)]
pub struct EngineState {
    pub config: EngineConfig,
    pub fragments: FragmentManager,
    pub ip_tunnels: IpTunnelMap,
    pub timers: TimerManager,
    /// Timestamp of the packet currently being processed.
    pub network_time: f64,
    pub packets_processed: u64,
    uid_counter: u64,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            fragments: FragmentManager::new(),
            ip_tunnels: IpTunnelMap::new(),
            timers: TimerManager::new(),
            network_time: 0.0,
            packets_processed: 0,
            uid_counter: 0,
        }
    }

    /// Fresh identity for a tunnel hop.
    pub fn next_uid(&mut self) -> u64 {
        self.uid_counter += 1;
        self.uid_counter
    }
}

/// One packet's trip through the analyzer chain: the registry to dispatch
/// through, the engine state, and the session sink.
pub struct Pipeline<'e, S: SessionSink> {
    pub registry: &'e AnalyzerRegistry,
    pub state: &'e mut EngineState,
    pub sink: &'e mut S,
}

impl<'e, S: SessionSink> Pipeline<'e, S> {
    /// Invoke one analyzer on the remaining bytes.
    pub fn run(&mut self, id: AnalyzerId, data: &[u8], packet: &mut PacketBuffer<'_>) -> bool {
        let analyzer = *self.registry.get(id);
        trace!(analyzer = analyzer.name(), len = data.len(), "analyzing");
        analyzer.analyze_packet(id, data, packet, self)
    }

    /// Look up `from`'s successor for `key` and invoke it. A missing
    /// successor is not an error; the caller decides what end-of-chain
    /// means for it.
    pub fn forward(
        &mut self,
        from: AnalyzerId,
        key: u32,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
    ) -> bool {
        match self.registry.dispatch(from).lookup(key) {
            Some(next) => self.run(next, data, packet),
            None => {
                trace!(
                    from = self.registry.get(from).name(),
                    key,
                    "no analyzer for identifier"
                );
                false
            }
        }
    }

    /// Invoke `from`'s default successor.
    pub fn forward_default(
        &mut self,
        from: AnalyzerId,
        data: &[u8],
        packet: &mut PacketBuffer<'_>,
    ) -> bool {
        match self.registry.dispatch(from).default_successor() {
            Some(next) => self.run(next, data, packet),
            None => {
                trace!(
                    from = self.registry.get(from).name(),
                    "no default successor"
                );
                false
            }
        }
    }

    /// Process a packet from the root analyzer on. Tunnel analyzers use
    /// this to re-enter the pipeline with a synthesized inner packet;
    /// it skips the dumping and counting the driver does for captured
    /// frames.
    pub fn process_inner(&mut self, packet: &mut PacketBuffer<'_>) -> bool {
        // The frame bytes step out of the buffer for the duration so the
        // analyzers can hold slices of them while mutating the packet.
        let data = mem::replace(&mut packet.data, Cow::Borrowed(&[]));
        let ok = self.run(self.registry.root(), &data, packet);
        packet.data = data;
        if !ok {
            packet.l2_valid = false;
        }
        ok
    }
}

/// Top-level pipeline driver.
pub struct Engine<S: SessionSink> {
    registry: AnalyzerRegistry,
    state: EngineState,
    sink: S,
    dumper: Option<Box<dyn PacketDumper>>,
}

impl<S: SessionSink> Engine<S> {
    /// Create an engine with the default analyzer chain.
    pub fn new(config: EngineConfig, sink: S) -> Self {
        Self::with_registry(config, default_registry(), sink)
    }

    /// Create an engine with a caller-assembled analyzer chain.
    pub fn with_registry(config: EngineConfig, registry: AnalyzerRegistry, sink: S) -> Self {
        Self {
            registry,
            state: EngineState::new(config),
            sink,
            dumper: None,
        }
    }

    /// Install a trace-write sink for packets flagged with `dump_packet`.
    pub fn set_dumper(&mut self, dumper: Box<dyn PacketDumper>) {
        self.dumper = Some(dumper);
    }

    /// Process one captured frame to completion.
    pub fn process_packet(&mut self, packet: &mut PacketBuffer<'_>) {
        let t = packet.time();
        self.dispatch_timers(t, false);
        if t > self.state.network_time {
            self.state.network_time = t;
        }

        if packet.dump_packet {
            if let Some(dumper) = self.dumper.as_mut() {
                if let Err(e) = dumper.dump_packet(packet) {
                    warn!(error = %e, "packet dump failed");
                }
            }
        }

        let registry = &self.registry;
        let state = &mut self.state;
        let sink = &mut self.sink;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut pl = Pipeline {
                registry,
                state,
                sink,
            };
            pl.process_inner(packet)
        }));

        if outcome.is_err() {
            // No error crosses packet boundaries; note it and move on.
            error!("analyzer panicked; dropping packet");
            packet.l2_valid = false;
        }

        self.state.packets_processed += 1;
    }

    /// Process a synthesized inner packet from the root analyzer on,
    /// without dumping or counting. Returns whether analysis succeeded.
    pub fn process_inner_packet(&mut self, packet: &mut PacketBuffer<'_>) -> bool {
        let mut pl = Pipeline {
            registry: &self.registry,
            state: &mut self.state,
            sink: &mut self.sink,
        };
        pl.process_inner(packet)
    }

    /// Dispatch timers whose deadline is at or before `now` and move the
    /// clock forward.
    pub fn advance_time(&mut self, now: f64) {
        self.dispatch_timers(now, false);
        if now > self.state.network_time {
            self.state.network_time = now;
        }
    }

    /// Shut the engine down: fire remaining timers in cleanup-only mode
    /// and drop all per-flow state.
    pub fn finish(&mut self) {
        let pending = self.state.timers.drain();
        for timer in pending {
            self.dispatch_timer(timer, true);
        }
        self.state.fragments.clear();
        self.state.ip_tunnels.clear();
    }

    fn dispatch_timers(&mut self, now: f64, is_expire: bool) {
        while let Some(timer) = self.state.timers.next_due(now) {
            self.dispatch_timer(timer, is_expire);
        }
    }

    fn dispatch_timer(&mut self, timer: Timer, is_expire: bool) {
        match timer.kind {
            TimerKind::FragExpire(key) => {
                self.state.fragments.expire(&key, timer.at, &mut self.sink);
            }
            TimerKind::IpTunnelInactivity(pair) => {
                let timeout = self.state.config.tunnel.ip_tunnel_timeout;
                if let Some(activity) = self.state.ip_tunnels.get(&pair) {
                    let last_active = activity.1;
                    let inactive = if timer.at > last_active {
                        timer.at - last_active
                    } else {
                        0.0
                    };
                    if inactive >= timeout {
                        // Tunnel activity timed out; forget the tunnel.
                        self.state.ip_tunnels.remove(&pair);
                    } else if !is_expire {
                        // Still active; check again one period later.
                        self.state
                            .timers
                            .schedule(timer.at + timeout, TimerKind::IpTunnelInactivity(pair));
                    }
                }
            }
        }
    }

    /// Number of captured frames fed through `process_packet`.
    pub fn packets_processed(&self) -> u64 {
        self.state.packets_processed
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    pub fn fragments(&self) -> &FragmentManager {
        &self.state.fragments
    }

    pub fn ip_tunnels(&self) -> &IpTunnelMap {
        &self.state.ip_tunnels
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
