// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`Host`] implementation backed by the browser `window`.

use core::fmt;

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, HtmlElement, Window};

use periscope_core::host::{Host, HostCapabilities};
use periscope_core::time::{HostTime, Timebase};
use periscope_core::viewport::{DimensionsSample, ScrollSample};

/// Errors from setting up the web backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebError {
    /// There is no global `window` (for example inside a worker).
    NoWindow,
    /// The window has no `document`.
    NoDocument,
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWindow => f.write_str("no global window"),
            Self::NoDocument => f.write_str("window has no document"),
        }
    }
}

impl core::error::Error for WebError {}

/// Reads time, scroll and geometry from the global `window`.
#[derive(Clone, Debug)]
pub struct WindowHost {
    window: Window,
    document: Document,
    capabilities: HostCapabilities,
}

impl WindowHost {
    /// Binds to the global `window` and probes its capabilities.
    pub fn new() -> Result<Self, WebError> {
        let window = web_sys::window().ok_or(WebError::NoWindow)?;
        let document = window.document().ok_or(WebError::NoDocument)?;
        let capabilities = HostCapabilities {
            animation_frame: has_global(&window, "requestAnimationFrame"),
            resize_observer: has_global(&window, "ResizeObserver"),
        };
        Ok(Self {
            window,
            document,
            capabilities,
        })
    }

    /// Overrides the probed capabilities.
    ///
    /// Useful for exercising the fallback paths in a full browser.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The bound window.
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// The bound document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }
}

fn has_global(window: &Window, name: &str) -> bool {
    js_sys::Reflect::has(window, &JsValue::from_str(name)).unwrap_or(false)
}

fn number(value: Result<JsValue, JsValue>) -> f64 {
    value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
}

impl Host for WindowHost {
    fn now(&self) -> HostTime {
        crate::now()
    }

    fn timebase(&self) -> Timebase {
        crate::timebase()
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn sample_scroll(&self) -> ScrollSample {
        let x = self
            .window
            .scroll_x()
            .or_else(|_| self.window.page_x_offset())
            .unwrap_or(0.0);
        let y = self
            .window
            .scroll_y()
            .or_else(|_| self.window.page_y_offset())
            .unwrap_or(0.0);
        ScrollSample { x, y }
    }

    fn sample_dimensions(&self) -> DimensionsSample {
        let mut sample = DimensionsSample {
            inner_width: number(self.window.inner_width()),
            inner_height: number(self.window.inner_height()),
            outer_width: number(self.window.outer_width()),
            outer_height: number(self.window.outer_height()),
            ..DimensionsSample::default()
        };
        if let Some(root) = self.document.document_element() {
            sample.client_width = f64::from(root.client_width());
            sample.client_height = f64::from(root.client_height());
            sample.scroll_width = f64::from(root.scroll_width());
            sample.scroll_height = f64::from(root.scroll_height());
        }
        // `offsetWidth` lives on HTMLElement; the root of an HTML document is
        // one, the root of an SVG document is not.
        if let Some(root) = self
            .document
            .document_element()
            .and_then(|e| e.dyn_into::<HtmlElement>().ok())
        {
            sample.offset_width = f64::from(root.offset_width());
            sample.offset_height = f64::from(root.offset_height());
        }
        sample
    }
}
