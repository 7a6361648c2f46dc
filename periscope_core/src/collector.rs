// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-rate collection of raw host events.
//!
//! The [`Collector`] turns a burst of raw scroll and resize notifications into
//! at most one re-sample per display frame, reduces the samples into derived
//! state, and publishes a [`Publish`] only when the derived state differs
//! field-wise from the last published snapshot.
//!
//! # Timers
//!
//! The collector never owns platform timers. Every timer it needs is a
//! deadline in [`HostTime`], exposed through [`Collector::next_deadline`] and
//! serviced by [`Collector::poll`]:
//!
//! - the resize debounce (resize and orientation events are coalesced because
//!   geometry reads are comparatively expensive),
//! - the fallback frame tick when the host has no animation-frame primitive,
//! - the idle timer, which fires once no publish has happened for a quiet
//!   window and re-publishes the latest snapshot with the flags accumulated
//!   since the previous idle publish.
//!
//! Dropping a collector therefore cancels every pending timer and the pending
//! frame request at once.

use crate::host::Host;
use crate::reduce::{reduce_dimensions, reduce_scroll};
use crate::time::{Duration, HostTime, Timebase};
use crate::viewport::{ChangeFlags, DimensionsState, ScrollState, Viewport};

/// Timing configuration for the [`Collector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Quiet period after the last resize event before geometry is re-read.
    pub resize_debounce: Duration,
    /// Quiet period after the last publish before an idle publish.
    pub idle_delay: Duration,
    /// Frame interval used when the host has no animation-frame primitive.
    pub fallback_frame_interval: Duration,
}

impl CollectorConfig {
    /// Default configuration: 88ms resize debounce, 166ms idle window and a
    /// 60Hz fallback frame rate.
    #[must_use]
    pub const fn for_timebase(timebase: Timebase) -> Self {
        Self {
            resize_debounce: Duration::from_millis(88, timebase),
            idle_delay: Duration::from_millis(166, timebase),
            // 1000/60 ms.
            fallback_frame_interval: Duration::from_micros(16_667, timebase),
        }
    }
}

/// How the collector is paced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameSource {
    /// The host delivers frame callbacks via
    /// [`Collector::on_frame`].
    AnimationFrame,
    /// Frames are paced by a fixed-rate deadline serviced in
    /// [`Collector::poll`].
    Timer {
        /// Delay between a frame request and the frame.
        interval: Duration,
    },
}

/// Why a snapshot was published.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PublishKind {
    /// A frame observed a change.
    Change,
    /// The quiet window elapsed after one or more changes.
    Idle,
}

/// A snapshot handed to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Publish {
    /// The published viewport.
    pub viewport: Viewport,
    /// What changed. For idle publishes, everything that changed since the
    /// previous idle publish.
    pub flags: ChangeFlags,
    /// What triggered the publish.
    pub kind: PublishKind,
}

/// Publishes produced by one [`Collector::poll`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CollectorPoll {
    /// A timer-paced frame observed a change.
    pub change: Option<Publish>,
    /// The idle timer fired.
    pub idle: Option<Publish>,
}

/// Owns the current and last-published viewport state.
#[derive(Debug)]
pub struct Collector {
    config: CollectorConfig,
    frame_source: FrameSource,
    scroll: ScrollState,
    dimensions: DimensionsState,
    published: Viewport,
    synced_once: bool,
    scroll_pending: bool,
    dimensions_pending: bool,
    frame_requested: bool,
    frame_deadline: Option<HostTime>,
    resize_deadline: Option<HostTime>,
    idle_deadline: Option<HostTime>,
    idle_flags: ChangeFlags,
}

impl Collector {
    /// Creates a collector and schedules the initial full sample.
    ///
    /// Both scroll and geometry are marked pending so the first frame reads
    /// the host without waiting for an event.
    #[must_use]
    pub fn new(config: CollectorConfig, frame_source: FrameSource, now: HostTime) -> Self {
        let mut collector = Self {
            config,
            frame_source,
            scroll: ScrollState::default(),
            dimensions: DimensionsState::default(),
            published: Viewport::default(),
            synced_once: false,
            scroll_pending: true,
            dimensions_pending: true,
            frame_requested: false,
            frame_deadline: None,
            resize_deadline: None,
            idle_deadline: None,
            idle_flags: ChangeFlags::NONE,
        };
        collector.request_frame(now);
        collector
    }

    /// Records a scroll event. Every occurrence requests a frame.
    pub fn note_scroll(&mut self, now: HostTime) {
        self.scroll_pending = true;
        self.request_frame(now);
    }

    /// Records a resize or orientation event, restarting the debounce window.
    pub fn note_resize(&mut self, now: HostTime) {
        self.resize_deadline = Some(now.saturating_add(self.config.resize_debounce));
    }

    /// Handles a host frame callback.
    ///
    /// Re-samples whatever is pending and returns a publish if the derived
    /// state changed (or if this is the first sync since the collector
    /// started).
    pub fn on_frame<H: Host + ?Sized>(&mut self, now: HostTime, host: &H) -> Option<Publish> {
        self.frame_requested = false;
        self.frame_deadline = None;
        if !self.scroll_pending && !self.dimensions_pending {
            return None;
        }
        self.sync(now, host)
    }

    /// Services every deadline that is due at `now`.
    pub fn poll<H: Host + ?Sized>(&mut self, now: HostTime, host: &H) -> CollectorPoll {
        let mut out = CollectorPoll::default();

        if self.resize_deadline.is_some_and(|t| t <= now) {
            self.resize_deadline = None;
            self.dimensions_pending = true;
            self.request_frame(now);
        }

        if self.frame_deadline.is_some_and(|t| t <= now) {
            out.change = self.on_frame(now, host);
        }

        if self.idle_deadline.is_some_and(|t| t <= now) {
            self.idle_deadline = None;
            let flags = core::mem::take(&mut self.idle_flags);
            out.idle = Some(Publish {
                viewport: self.published,
                flags,
                kind: PublishKind::Idle,
            });
        }

        out
    }

    /// The earliest pending deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        [self.resize_deadline, self.frame_deadline, self.idle_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Returns `true` if a frame callback from the host is wanted.
    #[must_use]
    pub fn wants_animation_frame(&self) -> bool {
        self.frame_requested && self.frame_source == FrameSource::AnimationFrame
    }

    /// How this collector is paced.
    #[must_use]
    pub fn frame_source(&self) -> FrameSource {
        self.frame_source
    }

    /// The last published snapshot.
    #[must_use]
    pub fn published(&self) -> Viewport {
        self.published
    }

    /// Returns `true` once the first frame has synced.
    #[must_use]
    pub fn has_published(&self) -> bool {
        self.synced_once
    }

    fn request_frame(&mut self, now: HostTime) {
        if self.frame_requested {
            return;
        }
        self.frame_requested = true;
        if let FrameSource::Timer { interval } = self.frame_source {
            self.frame_deadline = Some(now.saturating_add(interval));
        }
    }

    fn sync<H: Host + ?Sized>(&mut self, now: HostTime, host: &H) -> Option<Publish> {
        if self.scroll_pending {
            self.scroll = reduce_scroll(&self.scroll, host.sample_scroll());
        }
        if self.dimensions_pending {
            self.dimensions = reduce_dimensions(&host.sample_dimensions());
        }

        let flags = ChangeFlags {
            scroll: self.scroll_pending && self.scroll != self.published.scroll,
            dimensions: self.dimensions_pending && self.dimensions != self.published.dimensions,
        };
        self.scroll_pending = false;
        self.dimensions_pending = false;

        let first = !self.synced_once;
        self.synced_once = true;
        if !flags.any() && !first {
            return None;
        }

        self.published = Viewport {
            scroll: self.scroll,
            dimensions: self.dimensions,
        };
        self.idle_flags = self.idle_flags.union(flags);
        self.idle_deadline = Some(now.saturating_add(self.config.idle_delay));

        Some(Publish {
            viewport: self.published,
            flags,
            kind: PublishKind::Change,
        })
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::host::HostCapabilities;
    use crate::viewport::{DimensionsSample, ScrollSample};

    const TB: Timebase = Timebase::MICROS;

    struct TestHost {
        scroll: Cell<ScrollSample>,
        width: Cell<f64>,
        scroll_reads: Cell<u32>,
        dimension_reads: Cell<u32>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                scroll: Cell::new(ScrollSample::default()),
                width: Cell::new(800.0),
                scroll_reads: Cell::new(0),
                dimension_reads: Cell::new(0),
            }
        }

        fn scroll_to(&self, y: f64) {
            self.scroll.set(ScrollSample { x: 0.0, y });
        }
    }

    impl Host for TestHost {
        fn now(&self) -> HostTime {
            HostTime(0)
        }

        fn timebase(&self) -> Timebase {
            TB
        }

        fn capabilities(&self) -> HostCapabilities {
            HostCapabilities::FULL
        }

        fn sample_scroll(&self) -> ScrollSample {
            self.scroll_reads.set(self.scroll_reads.get() + 1);
            self.scroll.get()
        }

        fn sample_dimensions(&self) -> DimensionsSample {
            self.dimension_reads.set(self.dimension_reads.get() + 1);
            DimensionsSample {
                inner_width: self.width.get(),
                inner_height: 600.0,
                ..DimensionsSample::default()
            }
        }
    }

    fn ms(n: u64) -> HostTime {
        HostTime(n * 1000)
    }

    fn started(host: &TestHost) -> Collector {
        let mut c = Collector::new(
            CollectorConfig::for_timebase(TB),
            FrameSource::AnimationFrame,
            ms(0),
        );
        assert!(c.wants_animation_frame(), "start requests a frame");
        let first = c.on_frame(ms(1), host);
        assert!(first.is_some(), "first sync always publishes");
        c
    }

    #[test]
    fn burst_of_scrolls_samples_once_per_frame() {
        let host = TestHost::new();
        let mut c = started(&host);
        let reads_before = host.scroll_reads.get();

        for y in 1..=5 {
            host.scroll_to(f64::from(y) * 10.0);
            c.note_scroll(ms(2));
        }
        let publish = c.on_frame(ms(17), &host).expect("scroll changed");
        assert_eq!(host.scroll_reads.get(), reads_before + 1);
        assert_eq!(publish.viewport.scroll.y, 50.0);
        assert_eq!(
            publish.flags,
            ChangeFlags {
                scroll: true,
                dimensions: false
            }
        );
        assert_eq!(host.dimension_reads.get(), 1, "geometry was not re-read");
    }

    #[test]
    fn unchanged_sample_publishes_nothing() {
        let host = TestHost::new();
        let mut c = started(&host);
        c.note_scroll(ms(5));
        assert_eq!(c.on_frame(ms(17), &host), None);
    }

    #[test]
    fn resize_is_debounced() {
        let host = TestHost::new();
        let mut c = started(&host);
        host.width.set(1024.0);

        c.note_resize(ms(10));
        c.note_resize(ms(50));
        assert_eq!(c.next_deadline(), Some(ms(138)), "debounce restarted");
        assert!(c.poll(ms(120), &host).change.is_none());
        assert!(!c.wants_animation_frame(), "still inside the debounce window");

        let _ = c.poll(ms(138), &host);
        assert!(c.wants_animation_frame(), "debounce elapsed, frame requested");
        let publish = c.on_frame(ms(140), &host).expect("geometry changed");
        assert!(publish.flags.dimensions);
        assert_eq!(publish.viewport.dimensions.viewport_width, 1024.0);
    }

    #[test]
    fn idle_publish_coalesces_flags() {
        let host = TestHost::new();
        let mut c = started(&host);
        // Drain the idle publish for the initial sync.
        let _ = c.poll(ms(500), &host);

        host.scroll_to(100.0);
        c.note_scroll(ms(1000));
        c.on_frame(ms(1001), &host).expect("scroll");
        host.width.set(900.0);
        c.note_resize(ms(1002));
        let _ = c.poll(ms(1090), &host);
        c.on_frame(ms(1091), &host).expect("resize");

        assert!(c.poll(ms(1200), &host).idle.is_none(), "window restarted");
        let idle = c.poll(ms(1257), &host).idle.expect("idle fires");
        assert_eq!(idle.kind, PublishKind::Idle);
        assert_eq!(idle.flags, ChangeFlags::ALL);
        assert_eq!(idle.viewport.scroll.y, 100.0);
        assert_eq!(c.next_deadline(), None, "nothing left to fire");
    }

    #[test]
    fn timer_source_paces_frames_through_deadlines() {
        let host = TestHost::new();
        let interval = Duration::from_micros(16_667, TB);
        let mut c = Collector::new(
            CollectorConfig::for_timebase(TB),
            FrameSource::Timer { interval },
            ms(0),
        );
        assert!(!c.wants_animation_frame());
        assert_eq!(c.next_deadline(), Some(HostTime(16_667)));

        let out = c.poll(HostTime(16_667), &host);
        assert!(out.change.is_some(), "timer frame performed the first sync");

        host.scroll_to(5.0);
        c.note_scroll(ms(20));
        c.note_scroll(ms(21));
        assert_eq!(c.next_deadline(), Some(HostTime(36_667)), "one frame per burst");
    }
}
