// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The public viewport provider.
//!
//! [`ViewportProvider`] ties a [`Host`], a [`Scheduler`] and a lazily started
//! [`Collector`] together. Observers subscribe and unsubscribe through it;
//! backends feed it host events and service its deadlines.
//!
//! # Driving a provider
//!
//! The provider owns no timers and never calls into the platform. A backend:
//!
//! - forwards scroll events to [`on_scroll`](ViewportProvider::on_scroll),
//!   resize and orientation events to
//!   [`on_resize`](ViewportProvider::on_resize), and animation-frame
//!   callbacks to [`on_animation_frame`](ViewportProvider::on_animation_frame);
//! - keeps one animation-frame request alive while
//!   [`wants_animation_frame`](ViewportProvider::wants_animation_frame) is
//!   `true`;
//! - keeps one timer armed for
//!   [`next_deadline`](ViewportProvider::next_deadline) and calls
//!   [`advance`](ViewportProvider::advance) when it fires;
//! - re-reads both after the [`set_wake`](ViewportProvider::set_wake) hook
//!   runs.
//!
//! Registry changes and reinitialization requests take effect on the next
//! turn, which is due immediately: subscribing and unsubscribing before the
//! backend gets to call `advance` never starts the collector.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::collector::{Collector, CollectorConfig, FrameSource, Publish, PublishKind};
use crate::host::{Advisory, Host};
use crate::reduce::{reduce_dimensions, reduce_scroll};
use crate::registry::{
    ConfigurationError, ListenerId, ListenerOptions, ListenerStats, ViewportHandler,
};
use crate::scheduler::{CycleReport, PassKind, Scheduler, SchedulerConfig};
use crate::time::{Duration, HostTime, Timebase};
use crate::trace::{AdvisoryEvent, CollectorEvent, CollectorState, PublishEvent, TraceSink, Tracer};
use crate::viewport::{ChangeFlags, ScrollState, Viewport};

/// Configuration for a [`ViewportProvider`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProviderConfig {
    /// Dispatch configuration.
    pub scheduler: SchedulerConfig,
    /// Collection timing.
    pub collector: CollectorConfig,
    /// How long a sampled snapshot answers
    /// [`current_viewport`](ViewportProvider::current_viewport) while the
    /// collector is stopped.
    pub snapshot_ttl: Duration,
}

impl ProviderConfig {
    /// Default configuration for a host timebase.
    #[must_use]
    pub const fn for_timebase(timebase: Timebase) -> Self {
        Self {
            scheduler: SchedulerConfig::new(),
            collector: CollectorConfig::for_timebase(timebase),
            snapshot_ttl: Duration::from_millis(1000, timebase),
        }
    }
}

type Wake = Rc<dyn Fn()>;
type SinkSlot = RefCell<Option<Box<dyn TraceSink>>>;

struct Inner<H> {
    host: H,
    config: ProviderConfig,
    scheduler: Scheduler,
    collector: RefCell<Option<Collector>>,
    /// When the pending turn was requested.
    turn: Cell<Option<HostTime>>,
    reconcile: Cell<bool>,
    reinitialize: Cell<bool>,
    sampled: Cell<Option<(HostTime, Viewport)>>,
    advised_animation_frame: Cell<bool>,
    advised_resize_observer: Cell<bool>,
    wake: RefCell<Option<Wake>>,
    sink: SinkSlot,
}

/// A shared handle to a viewport scheduler.
///
/// Cloning the handle shares the provider. Every method takes `&self` and
/// may be called from inside a handler.
pub struct ViewportProvider<H: Host> {
    inner: Rc<Inner<H>>,
}

impl<H: Host> Clone for ViewportProvider<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Host> fmt::Debug for ViewportProvider<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewportProvider")
            .field("listeners", &self.inner.scheduler.len())
            .field("collecting", &self.is_collecting())
            .field("turn", &self.inner.turn.get())
            .finish_non_exhaustive()
    }
}

impl<H: Host> ViewportProvider<H> {
    /// Creates a provider with the default configuration for the host's
    /// timebase.
    pub fn new(host: H) -> Self {
        let config = ProviderConfig::for_timebase(host.timebase());
        Self::with_config(host, config)
    }

    /// Creates a provider with an explicit configuration.
    pub fn with_config(host: H, config: ProviderConfig) -> Self {
        Self::with_scheduler(host, config, Scheduler::new(config.scheduler))
    }

    /// Creates a provider around a prepared scheduler, e.g. one with an
    /// injected random source.
    ///
    /// `config.scheduler` is ignored in favor of the scheduler's own.
    pub fn with_scheduler(host: H, config: ProviderConfig, scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                config: ProviderConfig {
                    scheduler: scheduler.config(),
                    ..config
                },
                scheduler,
                collector: RefCell::new(None),
                turn: Cell::new(None),
                reconcile: Cell::new(false),
                reinitialize: Cell::new(false),
                sampled: Cell::new(None),
                advised_animation_frame: Cell::new(false),
                advised_resize_observer: Cell::new(false),
                wake: RefCell::new(None),
                sink: RefCell::new(None),
            }),
        }
    }

    /// The host this provider reads from.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> ProviderConfig {
        self.inner.config
    }

    // -----------------------------------------------------------------------
    // Observer API
    // -----------------------------------------------------------------------

    /// Subscribes `handler`, replacing any existing registration for it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if `options` is missing a required
    /// setting. Nothing is registered in that case.
    pub fn add_listener(
        &self,
        handler: &ViewportHandler,
        options: ListenerOptions,
    ) -> Result<ListenerId, ConfigurationError> {
        let id = self.inner.scheduler.add(handler, options)?;
        tracing::debug!(listener = id.0, "viewport listener added");
        self.inner.reconcile.set(true);
        self.request_turn();
        Ok(id)
    }

    /// Unsubscribes `handler`. Does nothing if it is not subscribed.
    pub fn remove_listener(&self, handler: &ViewportHandler) {
        if self.inner.scheduler.remove(handler) {
            tracing::debug!("viewport listener removed");
            self.inner.reconcile.set(true);
            self.request_turn();
        }
    }

    /// The current viewport.
    ///
    /// While the collector runs this is the last published snapshot.
    /// Otherwise the host is sampled, and the sample is reused for
    /// [`ProviderConfig::snapshot_ttl`]. Stopping the collector discards the
    /// cached sample.
    #[must_use]
    pub fn current_viewport(&self) -> Viewport {
        let inner = &*self.inner;
        if let Some(collector) = inner.collector.borrow().as_ref()
            && collector.has_published()
        {
            return collector.published();
        }

        let now = inner.host.now();
        if let Some((at, viewport)) = inner.sampled.get()
            && now.saturating_duration_since(at) < inner.config.snapshot_ttl
        {
            return viewport;
        }
        let viewport = Viewport {
            scroll: reduce_scroll(&ScrollState::default(), inner.host.sample_scroll()),
            dimensions: reduce_dimensions(&inner.host.sample_dimensions()),
        };
        inner.sampled.set(Some((now, viewport)));
        viewport
    }

    /// Requests one fresh dispatch for `handler` on the next turn, even if
    /// nothing changed. Does nothing if it is not subscribed.
    pub fn schedule_reinitialize(&self, handler: &ViewportHandler) {
        if self.inner.scheduler.mark_uninitialized(handler) {
            self.inner.reinitialize.set(true);
            self.request_turn();
        }
    }

    /// Cost statistics for every listener, in dispatch order.
    #[must_use]
    pub fn listener_stats(&self) -> Vec<ListenerStats> {
        self.inner.scheduler.stats()
    }

    /// Number of subscribed listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.scheduler.len()
    }

    // -----------------------------------------------------------------------
    // Backend API
    // -----------------------------------------------------------------------

    /// Returns `true` while the collector is running.
    ///
    /// Backends subscribe to host events while this is `true`.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.inner.collector.borrow().is_some()
    }

    /// Returns `true` if the backend should deliver an animation frame.
    #[must_use]
    pub fn wants_animation_frame(&self) -> bool {
        self.inner
            .collector
            .borrow()
            .as_ref()
            .is_some_and(Collector::wants_animation_frame)
    }

    /// When [`advance`](Self::advance) should next be called.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        let collector = self
            .inner
            .collector
            .borrow()
            .as_ref()
            .and_then(Collector::next_deadline);
        match (self.inner.turn.get(), collector) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Installs the hook invoked whenever the answers of
    /// [`is_collecting`](Self::is_collecting),
    /// [`wants_animation_frame`](Self::wants_animation_frame) or
    /// [`next_deadline`](Self::next_deadline) may have changed.
    pub fn set_wake(&self, wake: impl Fn() + 'static) {
        *self.inner.wake.borrow_mut() = Some(Rc::new(wake));
    }

    /// Removes the wake hook.
    pub fn clear_wake(&self) {
        self.inner.wake.borrow_mut().take();
    }

    /// Handles a host scroll event.
    pub fn on_scroll(&self) {
        let now = self.inner.host.now();
        if let Some(collector) = self.inner.collector.borrow_mut().as_mut() {
            collector.note_scroll(now);
        }
        self.wake();
    }

    /// Handles a host resize or orientation event.
    pub fn on_resize(&self) {
        let now = self.inner.host.now();
        if let Some(collector) = self.inner.collector.borrow_mut().as_mut() {
            collector.note_resize(now);
        }
        self.wake();
    }

    /// Handles a host animation-frame callback.
    pub fn on_animation_frame(&self) {
        let now = self.inner.host.now();
        let publish = self
            .inner
            .collector
            .borrow_mut()
            .as_mut()
            .and_then(|c| c.on_frame(now, &self.inner.host));
        if let Some(publish) = publish {
            self.dispatch(publish, now);
        }
        self.wake();
    }

    /// Runs the pending turn and services every deadline due now.
    pub fn advance(&self) {
        let inner = &*self.inner;
        let now = inner.host.now();

        if inner.turn.take().is_some() {
            if inner.reconcile.take() {
                self.reconcile(now);
            }
            if inner.reinitialize.take() {
                self.reinitialize_pass();
            }
        }

        let due = inner
            .collector
            .borrow_mut()
            .as_mut()
            .map(|c| c.poll(now, &inner.host))
            .unwrap_or_default();
        if let Some(publish) = due.change {
            self.dispatch(publish, now);
        }
        if let Some(publish) = due.idle {
            self.dispatch(publish, now);
        }
        self.wake();
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Installs a trace sink, replacing any previous one.
    pub fn set_trace_sink(&self, sink: Box<dyn TraceSink>) {
        *self.inner.sink.borrow_mut() = Some(sink);
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&self) -> Option<Box<dyn TraceSink>> {
        self.inner.sink.borrow_mut().take()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn request_turn(&self) {
        if self.inner.turn.get().is_none() {
            self.inner.turn.set(Some(self.inner.host.now()));
        }
        self.wake();
    }

    fn wake(&self) {
        let wake = self.inner.wake.borrow().clone();
        if let Some(wake) = wake {
            wake();
        }
    }

    fn reconcile(&self, now: HostTime) {
        let inner = &*self.inner;
        let wanted = inner.scheduler.has_listeners();
        let running = self.is_collecting();
        if wanted && !running {
            self.start_collector(now);
        } else if !wanted && running {
            inner.collector.borrow_mut().take();
            // Samples from before the collector ran are older than what it
            // published.
            inner.sampled.set(None);
            tracing::debug!("viewport collector stopped");
            self.with_tracer(|t| {
                t.collector(&CollectorEvent {
                    timestamp: now,
                    state: CollectorState::Stopped,
                });
            });
        }
    }

    fn start_collector(&self, now: HostTime) {
        let inner = &*self.inner;
        let capabilities = inner.host.capabilities();
        for advisory in Advisory::for_capabilities(capabilities) {
            self.advise(advisory, now);
        }

        let frame_source = if capabilities.animation_frame {
            FrameSource::AnimationFrame
        } else {
            FrameSource::Timer {
                interval: inner.config.collector.fallback_frame_interval,
            }
        };
        let collector = Collector::new(inner.config.collector, frame_source, now);
        *inner.collector.borrow_mut() = Some(collector);
        tracing::debug!(?frame_source, "viewport collector started");
        self.with_tracer(|t| {
            t.collector(&CollectorEvent {
                timestamp: now,
                state: CollectorState::Started(frame_source),
            });
        });
    }

    fn advise(&self, advisory: Advisory, now: HostTime) {
        let once = match advisory {
            Advisory::AnimationFrameUnavailable => &self.inner.advised_animation_frame,
            Advisory::ResizeObserverUnavailable => &self.inner.advised_resize_observer,
        };
        if once.replace(true) {
            return;
        }
        tracing::warn!("{}", advisory.message());
        self.with_tracer(|t| t.advisory(&AdvisoryEvent { timestamp: now, advisory }));
    }

    fn reinitialize_pass(&self) {
        let published = self
            .inner
            .collector
            .borrow()
            .as_ref()
            .filter(|c| c.has_published())
            .map(Collector::published);
        // Before the first publish, the first frame reaches every
        // uninitialized listener.
        if let Some(viewport) = published {
            self.run_cycle(&viewport, ChangeFlags::NONE, PassKind::Reinitialize);
        }
    }

    fn dispatch(&self, publish: Publish, now: HostTime) {
        self.with_tracer(|t| {
            t.publish(&PublishEvent {
                timestamp: now,
                kind: publish.kind,
                flags: publish.flags,
            });
        });
        let pass = match publish.kind {
            PublishKind::Change => PassKind::Change,
            PublishKind::Idle => PassKind::Idle,
        };
        self.run_cycle(&publish.viewport, publish.flags, pass);
    }

    fn run_cycle(&self, viewport: &Viewport, flags: ChangeFlags, pass: PassKind) -> CycleReport {
        let inner = &*self.inner;
        let report = self.with_tracer(|t| {
            inner
                .scheduler
                .run_cycle(viewport, flags, pass, &inner.host, t)
        });
        tracing::trace!(
            cycle = report.cycle_index,
            pass = pass.as_str(),
            dispatched = report.dispatched,
            skipped = report.skipped,
            "dispatch cycle"
        );
        report
    }

    /// Runs `f` with the installed sink, if any.
    ///
    /// The sink is moved out of its slot for the duration so handlers may
    /// install or take a sink while a cycle runs.
    fn with_tracer<R>(&self, f: impl FnOnce(&mut Tracer<'_>) -> R) -> R {
        let mut guard = SinkGuard {
            slot: &self.inner.sink,
            sink: self.inner.sink.borrow_mut().take(),
        };
        let mut tracer = match guard.sink.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        };
        f(&mut tracer)
    }
}

/// Puts a borrowed sink back into its slot, unless one was installed in the
/// meantime.
struct SinkGuard<'a> {
    slot: &'a SinkSlot,
    sink: Option<Box<dyn TraceSink>>,
}

impl Drop for SinkGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = self.sink.take();
        }
    }
}
