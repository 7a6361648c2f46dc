// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Viewport state handed to observers.
//!
//! Raw host readings arrive as [`ScrollSample`] and [`DimensionsSample`]; the
//! [`reduce`](crate::reduce) functions turn them into the derived
//! [`ScrollState`] and [`DimensionsState`], which together form an immutable
//! [`Viewport`] snapshot. Equality everywhere is field-wise.

use kurbo::{Rect, Size};

/// Derived scroll state with motion semantics.
///
/// At most one of `is_scrolling_up`/`is_scrolling_down` (and of
/// `is_scrolling_left`/`is_scrolling_right`) is set. When the position on an
/// axis does not change, the direction flags keep their previous values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollState {
    /// Horizontal scroll offset.
    pub x: f64,
    /// Vertical scroll offset.
    pub y: f64,
    /// Horizontal coordinate at the most recent direction reversal.
    pub x_turn: f64,
    /// Vertical coordinate at the most recent direction reversal.
    pub y_turn: f64,
    /// `x - x_turn`.
    pub x_delta_since_turn: f64,
    /// `y - y_turn`.
    pub y_delta_since_turn: f64,
    /// The last vertical movement was towards the top.
    pub is_scrolling_up: bool,
    /// The last vertical movement was towards the bottom.
    pub is_scrolling_down: bool,
    /// The last horizontal movement was towards the left.
    pub is_scrolling_left: bool,
    /// The last horizontal movement was towards the right.
    pub is_scrolling_right: bool,
}

/// Derived viewport and document geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DimensionsState {
    /// Width of the layout viewport including scrollbars.
    pub viewport_width: f64,
    /// Height of the layout viewport including scrollbars.
    pub viewport_height: f64,
    /// Width of the root element's client area.
    pub client_width: f64,
    /// Height of the root element's client area.
    pub client_height: f64,
    /// Outer width of the host window.
    pub outer_width: f64,
    /// Outer height of the host window.
    pub outer_height: f64,
    /// `max(scroll_width, offset_width, client_width)`.
    pub document_width: f64,
    /// `max(scroll_height, offset_height, client_height)`.
    pub document_height: f64,
}

impl DimensionsState {
    /// Size of the layout viewport.
    #[must_use]
    pub fn viewport_size(&self) -> Size {
        Size::new(self.viewport_width, self.viewport_height)
    }

    /// Size of the scrollable document.
    #[must_use]
    pub fn document_size(&self) -> Size {
        Size::new(self.document_width, self.document_height)
    }
}

/// An immutable snapshot of scroll and geometry state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    /// Scroll position and motion.
    pub scroll: ScrollState,
    /// Viewport and document geometry.
    pub dimensions: DimensionsState,
}

impl Viewport {
    /// The visible region in document coordinates.
    #[must_use]
    pub fn visible_rect(&self) -> Rect {
        Rect::from_origin_size(
            (self.scroll.x, self.scroll.y),
            self.dimensions.viewport_size(),
        )
    }

    /// Returns `true` if `rect` (document coordinates) overlaps the visible
    /// region with a non-zero area.
    #[must_use]
    pub fn intersects(&self, rect: Rect) -> bool {
        self.visible_rect().intersect(rect).area() > 0.0
    }
}

/// A raw scroll offset read from the host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollSample {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// Raw geometry read from the host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DimensionsSample {
    /// Window inner width.
    pub inner_width: f64,
    /// Window inner height.
    pub inner_height: f64,
    /// Window outer width.
    pub outer_width: f64,
    /// Window outer height.
    pub outer_height: f64,
    /// Root element client width.
    pub client_width: f64,
    /// Root element client height.
    pub client_height: f64,
    /// Root element scroll width.
    pub scroll_width: f64,
    /// Root element scroll height.
    pub scroll_height: f64,
    /// Root element offset width.
    pub offset_width: f64,
    /// Root element offset height.
    pub offset_height: f64,
}

/// Which parts of the viewport changed in a publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChangeFlags {
    /// The scroll state changed.
    pub scroll: bool,
    /// The dimensions state changed.
    pub dimensions: bool,
}

impl ChangeFlags {
    /// No change.
    pub const NONE: Self = Self {
        scroll: false,
        dimensions: false,
    };

    /// Both sub-states changed.
    pub const ALL: Self = Self {
        scroll: true,
        dimensions: true,
    };

    /// Returns `true` if either sub-state changed.
    #[inline]
    #[must_use]
    pub const fn any(self) -> bool {
        self.scroll || self.dimensions
    }

    /// Combines two sets of flags.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            scroll: self.scroll || other.scroll,
            dimensions: self.dimensions || other.dimensions,
        }
    }
}
