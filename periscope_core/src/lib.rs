// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive viewport-update scheduling.
//!
//! `periscope_core` tracks a host's viewport (scroll position and geometry)
//! and distributes change notifications to many observers under a soft
//! real-time budget. It is `no_std` compatible (with `alloc`) and performs no
//! I/O of its own: platform backends feed it events and service its
//! deadlines.
//!
//! # Architecture
//!
//! Data flows one direction per cycle:
//!
//! ```text
//!   host event ──► Collector ──► Publish ──► Scheduler::run_cycle()
//!   (scroll,          │                         │
//!    resize,      Host::sample_*()        filter ─► admit ─► layout ─► dispatch
//!    frame)           │                                                  │
//!                reduce_scroll()                                   handler(viewport)
//!                reduce_dimensions()
//! ```
//!
//! **[`reduce`]**: pure reduction of raw samples into derived state with
//! direction flags and turn points.
//!
//! **[`host`]**: the [`Host`](host::Host) trait through which time and
//! viewport state are read.
//!
//! **[`collector`]**: coalesces raw events into at most one re-sample per
//! frame, publishes only real changes, debounces resizes and emits idle
//! publishes after a quiet window.
//!
//! **[`registry`]**: observer registrations with per-cycle interest settings
//! and running cost statistics.
//!
//! **[`admission`]**: cooperative admission control with priority tiers and a
//! starvation floor.
//!
//! **[`scheduler`]**: filters, admits and dispatches one cycle, measuring
//! each observer's cost.
//!
//! **[`provider`]**: the public handle; lazily starts and stops the collector
//! and exposes the deadlines a backend must service.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! cycle instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod admission;
pub mod collector;
pub mod host;
pub mod provider;
pub mod reduce;
pub mod registry;
pub mod scheduler;
pub mod time;
pub mod trace;
pub mod viewport;

pub use provider::{ProviderConfig, ViewportProvider};
pub use registry::{ListenerOptions, ViewportHandler};
pub use viewport::Viewport;
