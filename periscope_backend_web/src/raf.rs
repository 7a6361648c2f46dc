// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Repeating `requestAnimationFrame` task.
//!
//! [`RafLoop`] calls its callback once per display frame while running. The
//! JS closure is created once and re-registered by the loop itself; at most
//! one frame request is outstanding at any time, so [`RafLoop::stop`] cancels
//! everything with a single handle.
//!
//! Each callback receives the frame's [`DOMHighResTimeStamp`][mdn]
//! (milliseconds from `performance.now()`) converted to microsecond
//! [`HostTime`] ticks.
//!
//! [mdn]: https://developer.mozilla.org/en-US/docs/Web/API/DOMHighResTimeStamp

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};

use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;

use periscope_core::time::HostTime;

// Direct global bindings instead of `web_sys::Window` methods: avoids
// fetching (and unwrapping) the Window/Performance objects on every frame.
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = performance, js_name = "now")]
    pub(crate) fn performance_now() -> f64;

    #[wasm_bindgen(js_name = "requestAnimationFrame")]
    fn request_animation_frame(callback: &JsValue) -> i32;

    #[wasm_bindgen(js_name = "cancelAnimationFrame")]
    fn cancel_animation_frame(id: i32);
}

/// Converts a `DOMHighResTimeStamp` in milliseconds to microsecond ticks.
pub(crate) fn host_time_from_millis(ms: f64) -> HostTime {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "timestamps are small positive f64; µs fits in u64"
    )]
    let us = (ms * 1000.0) as u64;
    HostTime(us)
}

/// A repeating `requestAnimationFrame` task.
///
/// Create with [`RafLoop::new`], then call [`start`](Self::start). The loop
/// re-registers itself each frame until [`stop`](Self::stop) is called or the
/// `RafLoop` is dropped. Both may be called from inside the callback.
pub struct RafLoop {
    inner: Rc<RafInner>,
}

type RafClosure = Closure<dyn FnMut(f64)>;

struct RafInner {
    /// The JS closure registered with `requestAnimationFrame`.
    closure: RefCell<Option<RafClosure>>,

    /// The user callback.
    callback: RefCell<Box<dyn FnMut(HostTime)>>,

    /// Whether the loop is currently running.
    running: Cell<bool>,

    /// The ID of the outstanding frame request, if any.
    pending: Cell<Option<i32>>,

    /// Number of frames delivered.
    frames: Cell<u64>,
}

impl RafInner {
    fn request(&self) {
        if self.pending.get().is_some() {
            return;
        }
        if let Some(ref closure) = *self.closure.borrow() {
            let id = request_animation_frame(closure.as_ref().unchecked_ref());
            self.pending.set(Some(id));
        }
    }

    fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            cancel_animation_frame(id);
        }
    }
}

impl RafLoop {
    /// Creates a loop that is **not yet running**.
    pub fn new(callback: impl FnMut(HostTime) + 'static) -> Self {
        let inner = Rc::new(RafInner {
            closure: RefCell::new(None),
            callback: RefCell::new(Box::new(callback)),
            running: Cell::new(false),
            pending: Cell::new(None),
            frames: Cell::new(0),
        });

        let weak: Weak<RafInner> = Rc::downgrade(&inner);
        let closure = Closure::wrap(Box::new(move |timestamp_ms: f64| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.pending.set(None);
            if !inner.running.get() {
                return;
            }
            inner.frames.set(inner.frames.get() + 1);

            inner.callback.borrow_mut()(host_time_from_millis(timestamp_ms));

            // The callback may have stopped (or stopped and restarted) the
            // loop; `request` keeps at most one frame outstanding.
            if inner.running.get() {
                inner.request();
            }
        }) as Box<dyn FnMut(f64)>);
        *inner.closure.borrow_mut() = Some(closure);

        Self { inner }
    }

    /// Starts the loop. If already running, this is a no-op.
    pub fn start(&self) {
        if self.inner.running.replace(true) {
            return;
        }
        self.inner.request();
    }

    /// Stops the loop and cancels the outstanding frame request.
    ///
    /// Can be restarted by calling [`start`](Self::start) again.
    pub fn stop(&self) {
        if !self.inner.running.replace(false) {
            return;
        }
        self.inner.cancel();
    }

    /// Returns `true` if the loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Returns `true` if a frame request is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.get().is_some()
    }
}

impl Drop for RafLoop {
    fn drop(&mut self) {
        self.stop();
        // Drop the JS closure so it doesn't leak.
        self.inner.closure.borrow_mut().take();
    }
}

impl core::fmt::Debug for RafLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RafLoop")
            .field("running", &self.inner.running.get())
            .field("pending", &self.inner.pending.get())
            .field("frames", &self.inner.frames.get())
            .finish()
    }
}
