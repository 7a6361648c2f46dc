// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single re-armable `setTimeout` handle.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};

use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;

use periscope_core::time::{HostTime, Timebase};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = "setTimeout")]
    fn set_timeout(callback: &JsValue, delay_ms: i32) -> i32;

    #[wasm_bindgen(js_name = "clearTimeout")]
    fn clear_timeout(id: i32);
}

/// Milliseconds until `deadline`, rounded up so the timer never fires early.
#[must_use]
pub fn timeout_delay(deadline: HostTime, now: HostTime, timebase: Timebase) -> i32 {
    let nanos = timebase.ticks_to_nanos(deadline.saturating_duration_since(now).ticks());
    i32::try_from(nanos.div_ceil(1_000_000)).unwrap_or(i32::MAX)
}

/// One `setTimeout` registration at a time.
///
/// [`arm`](Self::arm) replaces any pending timeout, so there is never more
/// than one outstanding.
pub struct Timeout {
    inner: Rc<TimeoutInner>,
}

struct TimeoutInner {
    closure: RefCell<Option<Closure<dyn FnMut()>>>,
    callback: RefCell<Box<dyn FnMut()>>,
    pending: Cell<Option<i32>>,
}

impl Timeout {
    /// Creates an unarmed timeout.
    pub fn new(callback: impl FnMut() + 'static) -> Self {
        let inner = Rc::new(TimeoutInner {
            closure: RefCell::new(None),
            callback: RefCell::new(Box::new(callback)),
            pending: Cell::new(None),
        });
        let weak: Weak<TimeoutInner> = Rc::downgrade(&inner);
        let closure = Closure::wrap(Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.pending.set(None);
            inner.callback.borrow_mut()();
        }) as Box<dyn FnMut()>);
        *inner.closure.borrow_mut() = Some(closure);
        Self { inner }
    }

    /// Fires the callback after `delay_ms`, replacing any pending timeout.
    pub fn arm(&self, delay_ms: i32) {
        self.cancel();
        if let Some(ref closure) = *self.inner.closure.borrow() {
            let id = set_timeout(closure.as_ref().unchecked_ref(), delay_ms);
            self.inner.pending.set(Some(id));
        }
    }

    /// Cancels the pending timeout, if any.
    pub fn cancel(&self) {
        if let Some(id) = self.inner.pending.take() {
            clear_timeout(id);
        }
    }

    /// Returns `true` if a timeout is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.pending.get().is_some()
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.cancel();
        self.inner.closure.borrow_mut().take();
    }
}

impl core::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Timeout")
            .field("pending", &self.inner.pending.get())
            .finish()
    }
}
