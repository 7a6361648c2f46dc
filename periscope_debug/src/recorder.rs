// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].

use periscope_core::admission::{Admission, Priority, RunReason};
use periscope_core::collector::{FrameSource, PublishKind};
use periscope_core::host::Advisory;
use periscope_core::registry::ListenerId;
use periscope_core::scheduler::PassKind;
use periscope_core::time::{Duration, HostTime};
use periscope_core::trace::{
    AdmissionEvent, AdvisoryEvent, CollectorEvent, CollectorState, CycleBeginEvent,
    CycleEndEvent, ListenerRunEvent, PublishEvent, TraceSink,
};
use periscope_core::viewport::ChangeFlags;

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_PUBLISH: u8 = 1;
const TAG_CYCLE_BEGIN: u8 = 2;
const TAG_ADMISSION: u8 = 3;
const TAG_LISTENER_RUN: u8 = 4;
const TAG_CYCLE_END: u8 = 5;
const TAG_COLLECTOR: u8 = 6;
const TAG_ADVISORY: u8 = 7;

// Admission outcome codes. Runs use the reason's code, skips use `SKIP`.
const ADMISSION_SKIP: u8 = 0xff;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_option_f64(&mut self, v: Option<f64>) {
        self.write_u8(u8::from(v.is_some()));
        self.write_f64(v.unwrap_or(0.0));
    }

    fn write_flags(&mut self, flags: ChangeFlags) {
        self.write_u8(u8::from(flags.scroll) | (u8::from(flags.dimensions) << 1));
    }

    fn write_priority(&mut self, p: Priority) {
        self.write_u8(match p {
            Priority::Highest => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        });
    }

    fn write_admission(&mut self, a: Admission) {
        match a {
            Admission::Run(reason) => {
                self.write_u8(match reason {
                    RunReason::Initial => 0,
                    RunReason::Highest => 1,
                    RunReason::WithinBudget => 2,
                    RunReason::Cheap => 3,
                    RunReason::Forced => 4,
                    RunReason::Drawn => 5,
                });
                self.write_f64(1.0);
            }
            Admission::Skip { probability } => {
                self.write_u8(ADMISSION_SKIP);
                self.write_f64(probability);
            }
        }
    }
}

impl TraceSink for RecorderSink {
    fn on_publish(&mut self, e: &PublishEvent) {
        self.write_u8(TAG_PUBLISH);
        self.write_u64(e.timestamp.ticks());
        self.write_u8(match e.kind {
            PublishKind::Change => 0,
            PublishKind::Idle => 1,
        });
        self.write_flags(e.flags);
    }

    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        self.write_u8(TAG_CYCLE_BEGIN);
        self.write_u64(e.cycle_index);
        self.write_u8(match e.pass {
            PassKind::Change => 0,
            PassKind::Idle => 1,
            PassKind::Reinitialize => 2,
        });
        self.write_flags(e.flags);
        self.write_u64(e.timestamp.ticks());
        self.write_u32(e.registrations);
        self.write_u32(e.candidates);
        self.write_option_f64(e.listener_budget_ms);
    }

    fn on_admission(&mut self, e: &AdmissionEvent) {
        self.write_u8(TAG_ADMISSION);
        self.write_u64(e.cycle_index);
        self.write_u64(e.listener.0);
        self.write_priority(e.priority);
        self.write_f64(e.average_cost_ms);
        self.write_u32(e.skipped_iterations);
        self.write_admission(e.admission);
    }

    fn on_listener_run(&mut self, e: &ListenerRunEvent) {
        self.write_u8(TAG_LISTENER_RUN);
        self.write_u64(e.cycle_index);
        self.write_u64(e.listener.0);
        self.write_u64(e.layout_ticks);
        self.write_u64(e.handler_start.ticks());
        self.write_u64(e.handler_end.ticks());
        self.write_f64(e.cost_ms);
        self.write_f64(e.average_cost_ms);
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        self.write_u8(TAG_CYCLE_END);
        self.write_u64(e.cycle_index);
        self.write_u64(e.timestamp.ticks());
        self.write_u32(e.dispatched);
        self.write_u32(e.skipped);
    }

    fn on_collector(&mut self, e: &CollectorEvent) {
        self.write_u8(TAG_COLLECTOR);
        self.write_u64(e.timestamp.ticks());
        match e.state {
            CollectorState::Stopped => {
                self.write_u8(0);
                self.write_u64(0);
            }
            CollectorState::Started(FrameSource::AnimationFrame) => {
                self.write_u8(1);
                self.write_u64(0);
            }
            CollectorState::Started(FrameSource::Timer { interval }) => {
                self.write_u8(2);
                self.write_u64(interval.ticks());
            }
        }
    }

    fn on_advisory(&mut self, e: &AdvisoryEvent) {
        self.write_u8(TAG_ADVISORY);
        self.write_u64(e.timestamp.ticks());
        self.write_u8(match e.advisory {
            Advisory::AnimationFrameUnavailable => 0,
            Advisory::ResizeObserverUnavailable => 1,
        });
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`PublishEvent`].
    Publish(PublishEvent),
    /// A [`CycleBeginEvent`].
    CycleBegin(CycleBeginEvent),
    /// An [`AdmissionEvent`].
    Admission(AdmissionEvent),
    /// A [`ListenerRunEvent`].
    ListenerRun(ListenerRunEvent),
    /// A [`CycleEndEvent`].
    CycleEnd(CycleEndEvent),
    /// A [`CollectorEvent`].
    Collector(CollectorEvent),
    /// An [`AdvisoryEvent`].
    Advisory(AdvisoryEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first truncated record or unknown tag.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_option_f64(&mut self) -> Option<Option<f64>> {
        let present = self.read_u8()?;
        let val = self.read_f64()?;
        Some((present != 0).then_some(val))
    }

    fn read_flags(&mut self) -> Option<ChangeFlags> {
        let bits = self.read_u8()?;
        Some(ChangeFlags {
            scroll: bits & 1 != 0,
            dimensions: bits & 2 != 0,
        })
    }

    fn read_priority(&mut self) -> Option<Priority> {
        Some(match self.read_u8()? {
            0 => Priority::Highest,
            1 => Priority::High,
            2 => Priority::Normal,
            3 => Priority::Low,
            _ => return None,
        })
    }

    fn read_admission(&mut self) -> Option<Admission> {
        let code = self.read_u8()?;
        let probability = self.read_f64()?;
        let reason = match code {
            ADMISSION_SKIP => return Some(Admission::Skip { probability }),
            0 => RunReason::Initial,
            1 => RunReason::Highest,
            2 => RunReason::WithinBudget,
            3 => RunReason::Cheap,
            4 => RunReason::Forced,
            5 => RunReason::Drawn,
            _ => return None,
        };
        Some(Admission::Run(reason))
    }

    fn decode_publish(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Publish(PublishEvent {
            timestamp: self.read_time()?,
            kind: match self.read_u8()? {
                0 => PublishKind::Change,
                1 => PublishKind::Idle,
                _ => return None,
            },
            flags: self.read_flags()?,
        }))
    }

    fn decode_cycle_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CycleBegin(CycleBeginEvent {
            cycle_index: self.read_u64()?,
            pass: match self.read_u8()? {
                0 => PassKind::Change,
                1 => PassKind::Idle,
                2 => PassKind::Reinitialize,
                _ => return None,
            },
            flags: self.read_flags()?,
            timestamp: self.read_time()?,
            registrations: self.read_u32()?,
            candidates: self.read_u32()?,
            listener_budget_ms: self.read_option_f64()?,
        }))
    }

    fn decode_admission(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Admission(AdmissionEvent {
            cycle_index: self.read_u64()?,
            listener: ListenerId(self.read_u64()?),
            priority: self.read_priority()?,
            average_cost_ms: self.read_f64()?,
            skipped_iterations: self.read_u32()?,
            admission: self.read_admission()?,
        }))
    }

    fn decode_listener_run(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::ListenerRun(ListenerRunEvent {
            cycle_index: self.read_u64()?,
            listener: ListenerId(self.read_u64()?),
            layout_ticks: self.read_u64()?,
            handler_start: self.read_time()?,
            handler_end: self.read_time()?,
            cost_ms: self.read_f64()?,
            average_cost_ms: self.read_f64()?,
        }))
    }

    fn decode_cycle_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CycleEnd(CycleEndEvent {
            cycle_index: self.read_u64()?,
            timestamp: self.read_time()?,
            dispatched: self.read_u32()?,
            skipped: self.read_u32()?,
        }))
    }

    fn decode_collector(&mut self) -> Option<RecordedEvent> {
        let timestamp = self.read_time()?;
        let code = self.read_u8()?;
        let interval = Duration(self.read_u64()?);
        let state = match code {
            0 => CollectorState::Stopped,
            1 => CollectorState::Started(FrameSource::AnimationFrame),
            2 => CollectorState::Started(FrameSource::Timer { interval }),
            _ => return None,
        };
        Some(RecordedEvent::Collector(CollectorEvent { timestamp, state }))
    }

    fn decode_advisory(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Advisory(AdvisoryEvent {
            timestamp: self.read_time()?,
            advisory: match self.read_u8()? {
                0 => Advisory::AnimationFrameUnavailable,
                1 => Advisory::ResizeObserverUnavailable,
                _ => return None,
            },
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_PUBLISH => self.decode_publish(),
            TAG_CYCLE_BEGIN => self.decode_cycle_begin(),
            TAG_ADMISSION => self.decode_admission(),
            TAG_LISTENER_RUN => self.decode_listener_run(),
            TAG_CYCLE_END => self.decode_cycle_end(),
            TAG_COLLECTOR => self.decode_collector(),
            TAG_ADVISORY => self.decode_advisory(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
