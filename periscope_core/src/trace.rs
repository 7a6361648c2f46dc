// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the update loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! provider and scheduler call at each stage of a cycle. All method bodies
//! default to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::admission::{Admission, Priority};
use crate::collector::{FrameSource, PublishKind};
use crate::host::Advisory;
use crate::registry::ListenerId;
use crate::scheduler::PassKind;
use crate::time::HostTime;
use crate::viewport::ChangeFlags;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the collector publishes a snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PublishEvent {
    /// Host time of the publish.
    pub timestamp: HostTime,
    /// Change or idle publish.
    pub kind: PublishKind,
    /// What changed.
    pub flags: ChangeFlags,
}

/// Marks the beginning of a dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleBeginEvent {
    /// Monotonic cycle counter.
    pub cycle_index: u64,
    /// What kind of pass this is.
    pub pass: PassKind,
    /// Flags the cycle was started with.
    pub flags: ChangeFlags,
    /// Host time at the start of the cycle.
    pub timestamp: HostTime,
    /// Registrations captured for this cycle.
    pub registrations: u32,
    /// Registrations that passed the interest filter.
    pub candidates: u32,
    /// Per-listener budget, when admission control is active.
    pub listener_budget_ms: Option<f64>,
}

/// Emitted for every admission decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdmissionEvent {
    /// Cycle counter.
    pub cycle_index: u64,
    /// Which listener.
    pub listener: ListenerId,
    /// The listener's priority this cycle.
    pub priority: Priority,
    /// Average cost the decision was based on.
    pub average_cost_ms: f64,
    /// Consecutive skips before the decision.
    pub skipped_iterations: u32,
    /// The decision.
    pub admission: Admission,
}

/// Emitted after a listener's handler returns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListenerRunEvent {
    /// Cycle counter.
    pub cycle_index: u64,
    /// Which listener.
    pub listener: ListenerId,
    /// Time spent in the listener's layout snapshot, in ticks.
    pub layout_ticks: u64,
    /// Host time when the handler was invoked.
    pub handler_start: HostTime,
    /// Host time when the handler returned.
    pub handler_end: HostTime,
    /// Layout plus handler time in milliseconds.
    pub cost_ms: f64,
    /// Moving average after this run.
    pub average_cost_ms: f64,
}

/// Marks the end of a dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleEndEvent {
    /// Cycle counter.
    pub cycle_index: u64,
    /// Host time at the end of the cycle.
    pub timestamp: HostTime,
    /// Listeners whose handler ran.
    pub dispatched: u32,
    /// Listeners skipped by admission control.
    pub skipped: u32,
}

/// Collector lifecycle transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    /// The collector started with the given frame source.
    Started(FrameSource),
    /// The collector stopped.
    Stopped,
}

/// Emitted when the collector starts or stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectorEvent {
    /// Host time of the transition.
    pub timestamp: HostTime,
    /// The new state.
    pub state: CollectorState,
}

/// Emitted once per advisory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvisoryEvent {
    /// Host time the advisory was raised.
    pub timestamp: HostTime,
    /// Which advisory.
    pub advisory: Advisory,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the update loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when the collector publishes.
    fn on_publish(&mut self, e: &PublishEvent) {
        _ = e;
    }

    /// Called at the beginning of a cycle.
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        _ = e;
    }

    /// Called for each admission decision.
    fn on_admission(&mut self, e: &AdmissionEvent) {
        _ = e;
    }

    /// Called after each handler runs.
    fn on_listener_run(&mut self, e: &ListenerRunEvent) {
        _ = e;
    }

    /// Called at the end of a cycle.
    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        _ = e;
    }

    /// Called when the collector starts or stops.
    fn on_collector(&mut self, e: &CollectorEvent) {
        _ = e;
    }

    /// Called when an advisory is raised.
    fn on_advisory(&mut self, e: &AdvisoryEvent) {
        _ = e;
    }
}

/// Shares one sink between the provider and its owner, e.g. to read a
/// recording back while tracing continues.
impl<S: TraceSink + ?Sized> TraceSink for Rc<RefCell<S>> {
    fn on_publish(&mut self, e: &PublishEvent) {
        self.borrow_mut().on_publish(e);
    }

    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        self.borrow_mut().on_cycle_begin(e);
    }

    fn on_admission(&mut self, e: &AdmissionEvent) {
        self.borrow_mut().on_admission(e);
    }

    fn on_listener_run(&mut self, e: &ListenerRunEvent) {
        self.borrow_mut().on_listener_run(e);
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        self.borrow_mut().on_cycle_end(e);
    }

    fn on_collector(&mut self, e: &CollectorEvent) {
        self.borrow_mut().on_collector(e);
    }

    fn on_advisory(&mut self, e: &AdvisoryEvent) {
        self.borrow_mut().on_advisory(e);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! emit {
    ($self:ident, $method:ident, $e:ident) => {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that dispatches to `sink` if there is one.
    #[inline]
    #[must_use]
    pub fn maybe(sink: Option<&'a mut dyn TraceSink>) -> Self {
        match sink {
            Some(sink) => Self::new(sink),
            None => Self::none(),
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`PublishEvent`].
    #[inline]
    pub fn publish(&mut self, e: &PublishEvent) {
        emit!(self, on_publish, e);
    }

    /// Emits a [`CycleBeginEvent`].
    #[inline]
    pub fn cycle_begin(&mut self, e: &CycleBeginEvent) {
        emit!(self, on_cycle_begin, e);
    }

    /// Emits an [`AdmissionEvent`].
    #[inline]
    pub fn admission(&mut self, e: &AdmissionEvent) {
        emit!(self, on_admission, e);
    }

    /// Emits a [`ListenerRunEvent`].
    #[inline]
    pub fn listener_run(&mut self, e: &ListenerRunEvent) {
        emit!(self, on_listener_run, e);
    }

    /// Emits a [`CycleEndEvent`].
    #[inline]
    pub fn cycle_end(&mut self, e: &CycleEndEvent) {
        emit!(self, on_cycle_end, e);
    }

    /// Emits a [`CollectorEvent`].
    #[inline]
    pub fn collector(&mut self, e: &CollectorEvent) {
        emit!(self, on_collector, e);
    }

    /// Emits an [`AdvisoryEvent`].
    #[inline]
    pub fn advisory(&mut self, e: &AdvisoryEvent) {
        emit!(self, on_advisory, e);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
