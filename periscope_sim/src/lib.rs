// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic simulation harness for periscope.
//!
//! [`SimHost`] is a [`Host`] with a virtual clock and settable scroll offset
//! and geometry. [`SimDriver`] plays the role of a browser event loop around a
//! [`ViewportProvider`]: it delivers scroll and resize events while the
//! provider collects, fires animation frames on a fixed 16ms vsync grid and
//! services the provider's deadlines in time order.
//!
//! Nothing here reads a real clock, so runs are reproducible. Handler cost is
//! emulated by advancing the clock, either explicitly from inside a handler
//! ([`SimHost::advance`]) or per host read ([`SimHost::set_read_cost`]).

#![no_std]

extern crate alloc;

use alloc::rc::Rc;
use core::cell::Cell;

use periscope_core::host::{Host, HostCapabilities};
use periscope_core::provider::{ProviderConfig, ViewportProvider};
use periscope_core::time::{Duration, HostTime, Timebase};
use periscope_core::viewport::{DimensionsSample, ScrollSample};

/// Timebase of every simulated clock: 1 tick = 1 µs.
pub const TIMEBASE: Timebase = Timebase::MICROS;

/// Converts milliseconds to simulated ticks.
#[must_use]
pub const fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis, TIMEBASE)
}

/// A desktop-sized window over a long document.
pub const DEFAULT_DIMENSIONS: DimensionsSample = DimensionsSample {
    inner_width: 1280.0,
    inner_height: 800.0,
    outer_width: 1280.0,
    outer_height: 880.0,
    client_width: 1265.0,
    client_height: 800.0,
    scroll_width: 1265.0,
    scroll_height: 6000.0,
    offset_width: 1265.0,
    offset_height: 6000.0,
};

#[derive(Debug)]
struct SimState {
    now: Cell<HostTime>,
    scroll: Cell<ScrollSample>,
    dimensions: Cell<DimensionsSample>,
    capabilities: Cell<HostCapabilities>,
    read_cost: Cell<Duration>,
    scroll_reads: Cell<u32>,
    dimension_reads: Cell<u32>,
}

/// A [`Host`] with a virtual clock.
///
/// Clones share state, so a test can keep a handle to the host it gave to a
/// provider and move the clock or the page from outside (or from inside a
/// handler).
#[derive(Clone, Debug)]
pub struct SimHost {
    state: Rc<SimState>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// A host at time zero, scrolled to the origin, with every capability.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(SimState {
                now: Cell::new(HostTime(0)),
                scroll: Cell::new(ScrollSample::default()),
                dimensions: Cell::new(DEFAULT_DIMENSIONS),
                capabilities: Cell::new(HostCapabilities::FULL),
                read_cost: Cell::new(Duration::ZERO),
                scroll_reads: Cell::new(0),
                dimension_reads: Cell::new(0),
            }),
        }
    }

    /// Sets the capabilities reported to the provider.
    #[must_use]
    pub fn with_capabilities(self, capabilities: HostCapabilities) -> Self {
        self.state.capabilities.set(capabilities);
        self
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let s = &self.state;
        s.now.set(s.now.get().saturating_add(by));
    }

    /// Moves the clock to `t` if it is later than now.
    pub fn advance_to(&self, t: HostTime) {
        let s = &self.state;
        s.now.set(s.now.get().max(t));
    }

    /// Sets the scroll offset without notifying anyone.
    pub fn set_scroll(&self, x: f64, y: f64) {
        self.state.scroll.set(ScrollSample { x, y });
    }

    /// Replaces the geometry without notifying anyone.
    pub fn set_dimensions(&self, dimensions: DimensionsSample) {
        self.state.dimensions.set(dimensions);
    }

    /// Resizes the window, keeping the document size.
    pub fn set_window_size(&self, width: f64, height: f64) {
        let mut d = self.state.dimensions.get();
        d.inner_width = width;
        d.inner_height = height;
        d.outer_width = width;
        d.outer_height = height + (d.outer_height - d.inner_height);
        d.client_width = width;
        d.client_height = height;
        self.state.dimensions.set(d);
    }

    /// Time charged to every scroll or geometry read.
    pub fn set_read_cost(&self, cost: Duration) {
        self.state.read_cost.set(cost);
    }

    /// Number of scroll reads so far.
    #[must_use]
    pub fn scroll_reads(&self) -> u32 {
        self.state.scroll_reads.get()
    }

    /// Number of geometry reads so far.
    #[must_use]
    pub fn dimension_reads(&self) -> u32 {
        self.state.dimension_reads.get()
    }

    fn charge_read(&self, counter: &Cell<u32>) {
        counter.set(counter.get() + 1);
        self.advance(self.state.read_cost.get());
    }
}

impl Host for SimHost {
    fn now(&self) -> HostTime {
        self.state.now.get()
    }

    fn timebase(&self) -> Timebase {
        TIMEBASE
    }

    fn capabilities(&self) -> HostCapabilities {
        self.state.capabilities.get()
    }

    fn sample_scroll(&self) -> ScrollSample {
        self.charge_read(&self.state.scroll_reads);
        self.state.scroll.get()
    }

    fn sample_dimensions(&self) -> DimensionsSample {
        self.charge_read(&self.state.dimension_reads);
        self.state.dimensions.get()
    }
}

/// What the driver delivered in one [`SimDriver::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// An animation frame at the given vsync.
    Frame(HostTime),
    /// A provider deadline.
    Deadline(HostTime),
}

/// Browser-like event loop around a [`ViewportProvider`].
#[derive(Debug)]
pub struct SimDriver {
    host: SimHost,
    provider: ViewportProvider<SimHost>,
    vsync: Duration,
    frames: Cell<u64>,
    wakes: Rc<Cell<u64>>,
}

/// Steps taken by [`SimDriver::settle`] before giving up.
const SETTLE_LIMIT: usize = 100_000;

impl SimDriver {
    /// Drives a new provider with the default configuration.
    #[must_use]
    pub fn new(host: SimHost) -> Self {
        let config = ProviderConfig::for_timebase(TIMEBASE);
        Self::with_provider(ViewportProvider::with_config(host, config))
    }

    /// Drives an existing provider. Replaces its wake hook.
    #[must_use]
    pub fn with_provider(provider: ViewportProvider<SimHost>) -> Self {
        let wakes = Rc::new(Cell::new(0_u64));
        let counter = Rc::clone(&wakes);
        provider.set_wake(move || counter.set(counter.get() + 1));
        Self {
            host: provider.host().clone(),
            provider,
            vsync: ms(16),
            frames: Cell::new(0),
            wakes,
        }
    }

    /// The driven provider.
    #[must_use]
    pub fn provider(&self) -> &ViewportProvider<SimHost> {
        &self.provider
    }

    /// The simulated host.
    #[must_use]
    pub fn host(&self) -> &SimHost {
        &self.host
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.host.now()
    }

    /// Animation frames delivered so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.get()
    }

    /// Times the provider's wake hook ran.
    #[must_use]
    pub fn wakes(&self) -> u64 {
        self.wakes.get()
    }

    /// Scrolls the page, delivering a scroll event if anyone listens.
    pub fn scroll_to(&self, x: f64, y: f64) {
        self.host.set_scroll(x, y);
        if self.provider.is_collecting() {
            self.provider.on_scroll();
        }
    }

    /// Resizes the window, delivering a resize event if anyone listens.
    pub fn resize(&self, width: f64, height: f64) {
        self.host.set_window_size(width, height);
        if self.provider.is_collecting() {
            self.provider.on_resize();
        }
    }

    /// Returns `true` when there is nothing left to deliver.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.provider.next_deadline().is_none() && !self.provider.wants_animation_frame()
    }

    /// The next delivery and when it is due.
    fn next_delivery(&self) -> Option<Delivery> {
        let now = self.now();
        let frame = self
            .provider
            .wants_animation_frame()
            .then(|| self.next_vsync(now));
        let deadline = self.provider.next_deadline().map(|d| d.max(now));
        match (deadline, frame) {
            // Timers due at or before the vsync run first.
            (Some(d), Some(f)) if d <= f => Some(Delivery::Deadline(d)),
            (_, Some(f)) => Some(Delivery::Frame(f)),
            (Some(d), None) => Some(Delivery::Deadline(d)),
            (None, None) => None,
        }
    }

    fn next_vsync(&self, now: HostTime) -> HostTime {
        let period = self.vsync.ticks().max(1);
        HostTime((now.ticks() / period + 1) * period)
    }

    /// Delivers the next frame or deadline if it is due at or before `limit`.
    pub fn step(&self, limit: HostTime) -> Option<Delivery> {
        let delivery = self.next_delivery()?;
        match delivery {
            Delivery::Frame(at) if at <= limit => {
                self.host.advance_to(at);
                self.frames.set(self.frames.get() + 1);
                self.provider.on_animation_frame();
            }
            Delivery::Deadline(at) if at <= limit => {
                self.host.advance_to(at);
                self.provider.advance();
            }
            _ => return None,
        }
        Some(delivery)
    }

    /// Delivers everything due up to `end`, then moves the clock to `end`.
    pub fn run_until(&self, end: HostTime) {
        while self.step(end).is_some() {}
        self.host.advance_to(end);
    }

    /// Runs the event loop for `duration` of virtual time.
    pub fn run_for(&self, duration: Duration) {
        self.run_until(self.now().saturating_add(duration));
    }

    /// Runs until nothing is pending.
    ///
    /// Returns `false` if the provider still had work after a large number of
    /// deliveries.
    pub fn settle(&self) -> bool {
        for _ in 0..SETTLE_LIMIT {
            if self.step(HostTime(u64::MAX)).is_none() {
                return true;
            }
        }
        self.is_quiescent()
    }
}
