// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Browser event loop glue for a [`ViewportProvider`].
//!
//! [`WebViewport`] answers the provider's wake hook by reconciling three
//! pieces of browser state with what the provider asks for:
//!
//! - DOM listeners are attached exactly while the provider is collecting;
//! - one `requestAnimationFrame` is kept alive while it wants frames;
//! - one `setTimeout` is armed for its next deadline.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{AddEventListenerOptions, EventTarget, ResizeObserver};

use periscope_core::host::Host;
use periscope_core::provider::{ProviderConfig, ViewportProvider};
use periscope_core::time::HostTime;

use crate::host::{WebError, WindowHost};
use crate::raf::RafLoop;
use crate::timer::{Timeout, timeout_delay};

const WINDOW_EVENTS: [(&str, Source); 3] = [
    ("scroll", Source::Scroll),
    ("resize", Source::Resize),
    ("orientationchange", Source::Resize),
];

#[derive(Clone, Copy, Debug)]
enum Source {
    Scroll,
    Resize,
}

/// A [`ViewportProvider`] bound to the browser window.
///
/// Dropping the `WebViewport` detaches every DOM listener and cancels the
/// frame request and timer. Clones of the provider stay usable but are no
/// longer driven.
#[derive(Debug)]
pub struct WebViewport {
    driver: Rc<Driver>,
}

struct Driver {
    provider: ViewportProvider<WindowHost>,
    raf: RafLoop,
    timeout: Timeout,
    armed_for: Cell<Option<HostTime>>,
    listeners: RefCell<Option<DomListeners>>,
    this: Weak<Self>,
}

impl WebViewport {
    /// Binds a provider with default configuration to the global window.
    pub fn new() -> Result<Self, WebError> {
        let host = WindowHost::new()?;
        let config = ProviderConfig::for_timebase(host.timebase());
        Ok(Self::with_provider(ViewportProvider::with_config(host, config)))
    }

    /// Drives an existing provider.
    ///
    /// Replaces the provider's wake hook.
    pub fn with_provider(provider: ViewportProvider<WindowHost>) -> Self {
        let driver = Rc::new_cyclic(|this: &Weak<Driver>| {
            let on_frame = this.clone();
            let on_timeout = this.clone();
            Driver {
                provider,
                raf: RafLoop::new(move |_| {
                    if let Some(driver) = on_frame.upgrade() {
                        driver.provider.on_animation_frame();
                    }
                }),
                timeout: Timeout::new(move || {
                    if let Some(driver) = on_timeout.upgrade() {
                        driver.armed_for.set(None);
                        driver.provider.advance();
                    }
                }),
                armed_for: Cell::new(None),
                listeners: RefCell::new(None),
                this: this.clone(),
            }
        });
        let wake = Rc::downgrade(&driver);
        driver.provider.set_wake(move || {
            if let Some(driver) = wake.upgrade() {
                driver.sync();
            }
        });
        driver.sync();
        Self { driver }
    }

    /// The driven provider.
    #[must_use]
    pub fn provider(&self) -> &ViewportProvider<WindowHost> {
        &self.driver.provider
    }

    /// Returns `true` while DOM listeners are attached.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.driver.listeners.borrow().is_some()
    }
}

impl Drop for WebViewport {
    fn drop(&mut self) {
        self.driver.provider.clear_wake();
        self.driver.listeners.borrow_mut().take();
        self.driver.raf.stop();
        self.driver.timeout.cancel();
    }
}

impl Driver {
    fn sync(&self) {
        let provider = &self.provider;
        let plan = SyncPlan::new(
            provider.is_collecting(),
            self.listeners.borrow().is_some(),
            provider.wants_animation_frame(),
            provider.next_deadline(),
            self.armed_for.get(),
        );

        match plan.listeners {
            ListenerAction::Attach => {
                match DomListeners::attach(provider.host(), self.this.clone()) {
                    Ok(listeners) => *self.listeners.borrow_mut() = Some(listeners),
                    Err(err) => tracing::warn!(?err, "failed to attach viewport listeners"),
                }
            }
            ListenerAction::Detach => drop(self.listeners.borrow_mut().take()),
            ListenerAction::Keep => {}
        }

        if plan.animation_frame {
            self.raf.start();
        } else {
            self.raf.stop();
        }

        match plan.timeout {
            TimeoutAction::Arm(deadline) => {
                let host = provider.host();
                self.timeout
                    .arm(timeout_delay(deadline, host.now(), host.timebase()));
                self.armed_for.set(Some(deadline));
            }
            TimeoutAction::Keep => {}
            TimeoutAction::Cancel => {
                self.timeout.cancel();
                self.armed_for.set(None);
            }
        }
    }

    fn deliver(&self, source: Source) {
        match source {
            Source::Scroll => self.provider.on_scroll(),
            Source::Resize => self.provider.on_resize(),
        }
    }
}

impl core::fmt::Debug for Driver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Driver")
            .field("provider", &self.provider)
            .field("raf", &self.raf)
            .field("timeout", &self.timeout)
            .field("listening", &self.listeners.borrow().is_some())
            .finish_non_exhaustive()
    }
}

/// What [`Driver::sync`] does to the DOM listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListenerAction {
    Attach,
    Detach,
    Keep,
}

/// What [`Driver::sync`] does to the timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimeoutAction {
    Arm(HostTime),
    Keep,
    Cancel,
}

/// Browser state changes needed to match the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SyncPlan {
    listeners: ListenerAction,
    animation_frame: bool,
    timeout: TimeoutAction,
}

impl SyncPlan {
    fn new(
        collecting: bool,
        listening: bool,
        wants_frame: bool,
        deadline: Option<HostTime>,
        armed_for: Option<HostTime>,
    ) -> Self {
        let listeners = match (collecting, listening) {
            (true, false) => ListenerAction::Attach,
            (false, true) => ListenerAction::Detach,
            _ => ListenerAction::Keep,
        };
        let timeout = match deadline {
            Some(deadline) if armed_for != Some(deadline) => TimeoutAction::Arm(deadline),
            Some(_) => TimeoutAction::Keep,
            None => TimeoutAction::Cancel,
        };
        Self {
            listeners,
            animation_frame: wants_frame,
            timeout,
        }
    }
}

type EventClosure = Closure<dyn FnMut()>;

/// DOM subscriptions held while the provider collects.
///
/// Dropping removes every listener and disconnects the observer.
struct DomListeners {
    target: EventTarget,
    window_events: alloc::vec::Vec<(&'static str, EventClosure)>,
    observer: Option<(ResizeObserver, EventClosure)>,
}

impl DomListeners {
    fn attach(host: &WindowHost, driver: Weak<Driver>) -> Result<Self, JsValue> {
        let target: EventTarget = host.window().clone().unchecked_into();
        let options = AddEventListenerOptions::new();
        options.set_passive(true);

        let mut listeners = Self {
            target,
            window_events: alloc::vec::Vec::with_capacity(WINDOW_EVENTS.len()),
            observer: None,
        };
        for (name, source) in WINDOW_EVENTS {
            let closure = event_closure(driver.clone(), source);
            listeners
                .target
                .add_event_listener_with_callback_and_add_event_listener_options(
                    name,
                    closure.as_ref().unchecked_ref(),
                    &options,
                )?;
            listeners.window_events.push((name, closure));
        }

        let body = host.document().body();
        if let Some(body) = body.filter(|_| host.capabilities().resize_observer) {
            let closure = event_closure(driver, Source::Resize);
            let observer = ResizeObserver::new(closure.as_ref().unchecked_ref())?;
            observer.observe(&body);
            listeners.observer = Some((observer, closure));
        }
        Ok(listeners)
    }
}

fn event_closure(driver: Weak<Driver>, source: Source) -> EventClosure {
    Closure::wrap(Box::new(move || {
        if let Some(driver) = driver.upgrade() {
            driver.deliver(source);
        }
    }) as Box<dyn FnMut()>)
}

impl Drop for DomListeners {
    fn drop(&mut self) {
        for (name, closure) in &self.window_events {
            let _ = self
                .target
                .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
        if let Some((observer, _)) = &self.observer {
            observer.disconnect();
        }
    }
}
