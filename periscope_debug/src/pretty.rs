// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use periscope_core::admission::Admission;
use periscope_core::collector::FrameSource;
use periscope_core::time::{HostTime, Timebase};
use periscope_core::trace::{
    AdmissionEvent, AdvisoryEvent, CollectorEvent, CollectorState, CycleBeginEvent,
    CycleEndEvent, ListenerRunEvent, PublishEvent, TraceSink,
};
use periscope_core::viewport::ChangeFlags;

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn flags_name(flags: ChangeFlags) -> &'static str {
    match (flags.scroll, flags.dimensions) {
        (true, true) => "scroll+dimensions",
        (true, false) => "scroll",
        (false, true) => "dimensions",
        (false, false) => "none",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_publish(&mut self, e: &PublishEvent) {
        let _ = writeln!(
            self.writer,
            "[publish] {:?} {} at {:.1}µs",
            e.kind,
            flags_name(e.flags),
            self.host_us(e.timestamp),
        );
    }

    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        let budget = e
            .listener_budget_ms
            .map_or_else(|| "off".to_owned(), |b| format!("{b:.2}ms"));
        let _ = writeln!(
            self.writer,
            "[cycle:begin] #{} {} {} at {:.1}µs registered={} candidates={} budget={budget}",
            e.cycle_index,
            e.pass.as_str(),
            flags_name(e.flags),
            self.host_us(e.timestamp),
            e.registrations,
            e.candidates,
        );
    }

    fn on_admission(&mut self, e: &AdmissionEvent) {
        let decision = match e.admission {
            Admission::Run(reason) => format!("run ({reason:?})"),
            Admission::Skip { probability } => format!("skip (p={probability:.3})"),
        };
        let _ = writeln!(
            self.writer,
            "[admit] #{} listener={} {} avg={:.2}ms skipped={} {decision}",
            e.cycle_index,
            e.listener.0,
            e.priority.as_str(),
            e.average_cost_ms,
            e.skipped_iterations,
        );
    }

    fn on_listener_run(&mut self, e: &ListenerRunEvent) {
        let _ = writeln!(
            self.writer,
            "[run] #{} listener={} layout={:.1}µs cost={:.3}ms avg={:.3}ms",
            e.cycle_index,
            e.listener.0,
            self.ticks_to_us(e.layout_ticks),
            e.cost_ms,
            e.average_cost_ms,
        );
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        let _ = writeln!(
            self.writer,
            "[cycle:end] #{} at {:.1}µs dispatched={} skipped={}",
            e.cycle_index,
            self.host_us(e.timestamp),
            e.dispatched,
            e.skipped,
        );
    }

    fn on_collector(&mut self, e: &CollectorEvent) {
        let state = match e.state {
            CollectorState::Started(FrameSource::AnimationFrame) => {
                "started (animation frame)".to_owned()
            }
            CollectorState::Started(FrameSource::Timer { interval }) => {
                format!("started (timer {:.1}µs)", self.ticks_to_us(interval.ticks()))
            }
            CollectorState::Stopped => "stopped".to_owned(),
        };
        let _ = writeln!(
            self.writer,
            "[collector] {state} at {:.1}µs",
            self.host_us(e.timestamp),
        );
    }

    fn on_advisory(&mut self, e: &AdvisoryEvent) {
        let _ = writeln!(self.writer, "[advisory] {}", e.advisory.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use periscope_core::admission::Priority;
    use periscope_core::registry::ListenerId;
    use periscope_core::scheduler::PassKind;

    #[test]
    fn pretty_print_cycle() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::MICROS);
        sink.on_cycle_begin(&CycleBeginEvent {
            cycle_index: 1,
            pass: PassKind::Idle,
            flags: ChangeFlags::NONE,
            timestamp: HostTime(1_000),
            registrations: 2,
            candidates: 1,
            listener_budget_ms: None,
        });
        sink.on_admission(&AdmissionEvent {
            cycle_index: 1,
            listener: ListenerId(4),
            priority: Priority::Low,
            average_cost_ms: 3.0,
            skipped_iterations: 2,
            admission: Admission::Skip { probability: 0.046_875 },
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("[cycle:begin] #1 idle"), "got: {output}");
        assert!(output.contains("budget=off"), "got: {output}");
        assert!(output.contains("listener=4 low"), "got: {output}");
        assert!(output.contains("skip (p=0.047)"), "got: {output}");
    }
}
