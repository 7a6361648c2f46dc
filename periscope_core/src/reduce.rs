// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pure reduction of raw host samples into derived viewport state.
//!
//! [`reduce_scroll`] derives direction flags and turn points from the previous
//! [`ScrollState`] and a new [`ScrollSample`]. [`reduce_dimensions`] derives
//! document extents from a [`DimensionsSample`]. Both are total and
//! deterministic; neither performs I/O.
//!
//! # Turn points
//!
//! A turn point is the coordinate at which motion on an axis last reversed.
//! It moves only when the direction flips from one set direction to the other,
//! and then takes the coordinate where the reversal happened (the previous
//! position). Leaving the initial neutral state is not a reversal, so the very
//! first movement keeps the initial turn point.
//!
//! Taking the new coordinate instead would place the turn wherever the first
//! sample after the reversal landed, and `delta_since_turn` would read zero on
//! that sample. The previous coordinate is the extreme the scroll reached, so
//! `0 → 1000 → 500` yields a turn of `1000` and a delta of `-500`.

use crate::viewport::{DimensionsSample, DimensionsState, ScrollSample, ScrollState};

/// Computes the next scroll state from the previous one and a new sample.
#[must_use]
pub fn reduce_scroll(prev: &ScrollState, sample: ScrollSample) -> ScrollState {
    let x = step_axis(
        Axis {
            coordinate: prev.x,
            turn: prev.x_turn,
            negative: prev.is_scrolling_left,
            positive: prev.is_scrolling_right,
        },
        sample.x,
    );
    let y = step_axis(
        Axis {
            coordinate: prev.y,
            turn: prev.y_turn,
            negative: prev.is_scrolling_up,
            positive: prev.is_scrolling_down,
        },
        sample.y,
    );

    ScrollState {
        x: x.coordinate,
        y: y.coordinate,
        x_turn: x.turn,
        y_turn: y.turn,
        x_delta_since_turn: x.coordinate - x.turn,
        y_delta_since_turn: y.coordinate - y.turn,
        is_scrolling_up: y.negative,
        is_scrolling_down: y.positive,
        is_scrolling_left: x.negative,
        is_scrolling_right: x.positive,
    }
}

/// Computes dimensions state from a raw geometry sample.
#[must_use]
pub fn reduce_dimensions(sample: &DimensionsSample) -> DimensionsState {
    DimensionsState {
        viewport_width: sample.inner_width,
        viewport_height: sample.inner_height,
        client_width: sample.client_width,
        client_height: sample.client_height,
        outer_width: sample.outer_width,
        outer_height: sample.outer_height,
        document_width: sample
            .scroll_width
            .max(sample.offset_width)
            .max(sample.client_width),
        document_height: sample
            .scroll_height
            .max(sample.offset_height)
            .max(sample.client_height),
    }
}

/// One axis of scroll state. `negative` is up/left, `positive` down/right.
#[derive(Clone, Copy, Debug)]
struct Axis {
    coordinate: f64,
    turn: f64,
    negative: bool,
    positive: bool,
}

fn step_axis(prev: Axis, next: f64) -> Axis {
    let (negative, positive) = if next < prev.coordinate {
        (true, false)
    } else if next > prev.coordinate {
        (false, true)
    } else {
        (prev.negative, prev.positive)
    };

    let was_moving = prev.negative || prev.positive;
    let reversed = was_moving && negative != prev.negative;

    Axis {
        coordinate: next,
        turn: if reversed { prev.coordinate } else { prev.turn },
        negative,
        positive,
    }
}
