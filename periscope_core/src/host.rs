// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The host environment seen by the scheduler.
//!
//! A [`Host`] is a read-only window onto the platform: a monotonic clock and
//! on-demand samples of scroll offset and geometry. Event delivery (scroll,
//! resize, frame callbacks, timers) is not part of this trait; backends call
//! into [`ViewportProvider`](crate::provider::ViewportProvider) when those
//! happen.

use crate::time::{HostTime, Timebase};
use crate::viewport::{DimensionsSample, ScrollSample};

/// Optional platform primitives the collector can take advantage of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostCapabilities {
    /// The host can schedule a callback aligned with the next display frame.
    ///
    /// Without it, frames are paced by a fixed-rate timer.
    pub animation_frame: bool,
    /// The host can observe document resizes that are not window resizes.
    ///
    /// Without it, dimension updates rely on resize and orientation events.
    pub resize_observer: bool,
}

impl HostCapabilities {
    /// Every optional primitive is available.
    pub const FULL: Self = Self {
        animation_frame: true,
        resize_observer: true,
    };

    /// No optional primitive is available.
    pub const MINIMAL: Self = Self {
        animation_frame: false,
        resize_observer: false,
    };
}

/// Read-only access to host time and viewport state.
///
/// Samples are pure functions of current host state; implementations keep no
/// derived state of their own.
pub trait Host {
    /// Current monotonic time.
    fn now(&self) -> HostTime;

    /// Conversion factor for [`HostTime`] ticks.
    fn timebase(&self) -> Timebase;

    /// Which optional primitives the host provides.
    fn capabilities(&self) -> HostCapabilities;

    /// Reads the current scroll offset.
    fn sample_scroll(&self) -> ScrollSample;

    /// Reads the current viewport and document geometry.
    fn sample_dimensions(&self) -> DimensionsSample;
}

/// A one-time notice that the host lacks an optional primitive and a
/// fallback is in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Advisory {
    /// Frames are paced by a fixed-rate timer.
    AnimationFrameUnavailable,
    /// Document resizes are only seen through resize and orientation events.
    ResizeObserverUnavailable,
}

impl Advisory {
    /// Human-readable description.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::AnimationFrameUnavailable => {
                "animation frames are unavailable; falling back to a 60Hz timer"
            }
            Self::ResizeObserverUnavailable => {
                "resize observation is unavailable; document size changes that are not \
                 window resizes will not be reported"
            }
        }
    }

    /// The advisories implied by a set of capabilities.
    pub fn for_capabilities(capabilities: HostCapabilities) -> impl Iterator<Item = Self> {
        [
            (!capabilities.animation_frame).then_some(Self::AnimationFrameUnavailable),
            (!capabilities.resize_observer).then_some(Self::ResizeObserverUnavailable),
        ]
        .into_iter()
        .flatten()
    }
}
