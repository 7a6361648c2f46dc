// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Cycles become duration slices on thread 0 and handler runs become complete
//! slices on thread 1, so a cycle visually contains the handlers it dispatched.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use periscope_core::admission::Admission;
use periscope_core::collector::FrameSource;
use periscope_core::time::{HostTime, Timebase};
use periscope_core::trace::CollectorState;

use crate::recorder::{RecordedEvent, decode};

const CYCLE_TID: u32 = 0;
const HANDLER_TID: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let us = |t: HostTime| ticks_to_us(t.ticks(), timebase);
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Publish(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("Publish:{:?}", e.kind),
                    "cat": "Collector",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "s": "t",
                    "args": {
                        "scroll": e.flags.scroll,
                        "dimensions": e.flags.dimensions,
                    }
                }));
            }
            RecordedEvent::CycleBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("Cycle:{}", e.pass.as_str()),
                    "cat": "Scheduler",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "args": {
                        "cycle_index": e.cycle_index,
                        "registrations": e.registrations,
                        "candidates": e.candidates,
                        "listener_budget_ms": e.listener_budget_ms,
                    }
                }));
            }
            RecordedEvent::Admission(e) => {
                // Runs show up as handler slices; only skips get a marker.
                if let Admission::Skip { probability } = e.admission {
                    let ts = events_last_ts(&events);
                    events.push(json!({
                        "ph": "i",
                        "name": "Skip",
                        "cat": "Admission",
                        "ts": ts,
                        "pid": 0,
                        "tid": HANDLER_TID,
                        "s": "t",
                        "args": {
                            "cycle_index": e.cycle_index,
                            "listener": e.listener.0,
                            "priority": e.priority.as_str(),
                            "average_cost_ms": e.average_cost_ms,
                            "skipped_iterations": e.skipped_iterations,
                            "probability": probability,
                        }
                    }));
                }
            }
            RecordedEvent::ListenerRun(e) => {
                let start = us(e.handler_start) - ticks_to_us(e.layout_ticks, timebase);
                events.push(json!({
                    "ph": "X",
                    "name": format!("Listener {}", e.listener.0),
                    "cat": "Handler",
                    "ts": start,
                    "dur": us(e.handler_end) - start,
                    "pid": 0,
                    "tid": HANDLER_TID,
                    "args": {
                        "cycle_index": e.cycle_index,
                        "layout_us": ticks_to_us(e.layout_ticks, timebase),
                        "cost_ms": e.cost_ms,
                        "average_cost_ms": e.average_cost_ms,
                    }
                }));
            }
            RecordedEvent::CycleEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "cat": "Scheduler",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "args": {
                        "dispatched": e.dispatched,
                        "skipped": e.skipped,
                    }
                }));
            }
            RecordedEvent::Collector(e) => {
                let (name, source) = match e.state {
                    CollectorState::Started(FrameSource::AnimationFrame) => {
                        ("CollectorStarted", json!("animation_frame"))
                    }
                    CollectorState::Started(FrameSource::Timer { interval }) => (
                        "CollectorStarted",
                        json!({ "timer_us": ticks_to_us(interval.ticks(), timebase) }),
                    ),
                    CollectorState::Stopped => ("CollectorStopped", Value::Null),
                };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "Collector",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "s": "p",
                    "args": { "source": source }
                }));
            }
            RecordedEvent::Advisory(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Advisory",
                    "cat": "Collector",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "s": "g",
                    "args": { "message": e.advisory.message() }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

/// Admission events carry no timestamp; place them at the latest event.
fn events_last_ts(events: &[Value]) -> f64 {
    events
        .last()
        .and_then(|e| e["ts"].as_f64())
        .unwrap_or(0.0)
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}
