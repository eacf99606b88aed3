// SPDX-License-Identifier: MIT OR Apache-2.0
//! Opt-in per-stage timing traces.
//!
//! A [`Tracer`] is a cheap cloneable handle. A disabled tracer (the default)
//! records nothing; an enabled one collects `(task, start, duration)` events
//! from any thread and exports them as CSV with the header
//! `task,start_ns,duration_ns`. Start times are relative to the first
//! recorded event.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Handle to a finished-or-pending trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(usize);

#[derive(Debug)]
struct TraceEvent {
    task: &'static str,
    start: Instant,
    duration_ns: u64,
}

#[derive(Debug)]
struct Shared {
    epoch: Instant,
    events: Mutex<Vec<TraceEvent>>,
}

/// Collector of per-stage timing spans.
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    shared: Option<Arc<Shared>>,
}

impl Tracer {
    /// A tracer that records nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { shared: None }
    }

    /// A tracer that collects events.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            shared: Some(Arc::new(Shared {
                epoch: Instant::now(),
                events: Mutex::new(Vec::new()),
            })),
        }
    }

    /// Whether this handle records events.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.shared.is_some()
    }

    /// Begin timing `task`. Returns `None` when disabled.
    pub fn start(&self, task: &'static str) -> Option<TraceId> {
        let shared = self.shared.as_ref()?;
        let mut events = shared.events.lock();
        events.push(TraceEvent {
            task,
            start: Instant::now(),
            duration_ns: 0,
        });
        Some(TraceId(events.len() - 1))
    }

    /// Finish the event previously returned by [`start`](Self::start).
    pub fn finish(&self, id: Option<TraceId>) {
        let (Some(shared), Some(TraceId(idx))) = (self.shared.as_ref(), id) else {
            return;
        };
        let mut events = shared.events.lock();
        if let Some(event) = events.get_mut(idx) {
            event.duration_ns = event.start.elapsed().as_nanos() as u64;
        }
    }

    /// Export all recorded events as CSV. Empty string when disabled or
    /// nothing was recorded.
    #[must_use]
    pub fn export_csv(&self) -> String {
        let Some(shared) = self.shared.as_ref() else {
            return String::new();
        };
        let events = shared.events.lock();
        if events.is_empty() {
            return String::new();
        }
        let mut out = String::from("task,start_ns,duration_ns\n");
        for event in events.iter() {
            let start_ns = event.start.duration_since(shared.epoch).as_nanos() as u64;
            let _ = writeln!(out, "{},{},{}", event.task, start_ns, event.duration_ns);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracer_is_silent() {
        let tracer = Tracer::disabled();
        let id = tracer.start("indexing");
        assert!(id.is_none());
        tracer.finish(id);
        assert_eq!(tracer.export_csv(), "");
    }

    #[test]
    fn enabled_tracer_exports_csv() {
        let tracer = Tracer::enabled();
        let id = tracer.start("automaton");
        tracer.finish(id);
        let csv = tracer.export_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("task,start_ns,duration_ns"));
        let row = lines.next().expect("one event row");
        assert!(row.starts_with("automaton,"));
    }

    #[test]
    fn clones_share_the_event_buffer() {
        let tracer = Tracer::enabled();
        let clone = tracer.clone();
        clone.finish(clone.start("indexing"));
        assert_eq!(tracer.export_csv().lines().count(), 2);
    }
}
