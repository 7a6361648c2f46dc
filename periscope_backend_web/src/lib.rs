// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Web backend for periscope.
//!
//! This crate drives a [`ViewportProvider`] from browser APIs:
//!
//! - [`WindowHost`]: samples scroll offset and geometry from `window`
//! - [`RafLoop`]: `requestAnimationFrame` frame source
//! - [`Timeout`]: `setTimeout` handle for provider deadlines
//! - [`WebViewport`]: attaches DOM listeners while the provider collects and
//!   keeps the frame request and timeout in step with it
//!
//! ```ignore
//! let viewport = WebViewport::new()?;
//! let handler = ViewportHandler::new(|v, _| log(v.scroll.y));
//! viewport.provider().add_listener(&handler, ListenerOptions::scroll())?;
//! ```
//!
//! [`ViewportProvider`]: periscope_core::ViewportProvider

#![no_std]

extern crate alloc;

mod driver;
mod host;
mod raf;
mod timer;

pub use driver::WebViewport;
pub use host::{WebError, WindowHost};
pub use raf::RafLoop;
pub use timer::{Timeout, timeout_delay};

use kurbo::Rect;
use periscope_core::time::{HostTime, Timebase};

/// Returns the current host time from `performance.now()`.
///
/// The returned [`HostTime`] is in microsecond ticks; see [`timebase`].
#[must_use]
pub fn now() -> HostTime {
    raf::host_time_from_millis(raf::performance_now())
}

/// Returns the web [`Timebase`]: 1 tick = 1 µs = 1000 ns.
#[must_use]
pub fn timebase() -> Timebase {
    Timebase::MICROS
}

/// The element's border box in viewport coordinates.
///
/// Add the viewport's scroll offset to get document coordinates.
#[must_use]
pub fn element_rect(element: &web_sys::Element) -> Rect {
    let r = element.get_bounding_client_rect();
    Rect::new(r.left(), r.top(), r.right(), r.bottom())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_is_microsecond() {
        let tb = timebase();
        assert_eq!(tb.ticks_to_nanos(1), 1000, "1 tick is 1 µs");
        assert_eq!(tb.ticks_to_nanos(1_000_000), 1_000_000_000, "1 s");
    }
}
