// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observer registrations.
//!
//! A registration pairs a [`ViewportHandler`] with its interest settings and
//! running cost statistics. Interest settings are [`Setting`]s so that a
//! registration can change what it wants between cycles without
//! re-subscribing; the scheduler evaluates them at the start of every cycle.
//!
//! Handler identity is the identity of the shared callback allocation: cloning
//! a [`ViewportHandler`] yields the same listener, while two handlers built
//! from identical closures are distinct.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::Cell;
use core::fmt;

use crate::admission::Priority;
use crate::viewport::Viewport;

/// Stable identifier for a registration, assigned when it is added.
///
/// Re-adding a handler assigns a new id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

type Callback = dyn Fn(&Viewport, Option<&dyn Any>);

/// A shared viewport callback.
///
/// The second argument is the value produced by the registration's layout
/// snapshot, if it has one.
#[derive(Clone)]
pub struct ViewportHandler(Rc<Callback>);

impl ViewportHandler {
    /// Wraps a callback.
    pub fn new(f: impl Fn(&Viewport, Option<&dyn Any>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Wraps a callback that expects a layout snapshot of type `T`.
    ///
    /// The callback receives `None` when the registration has no snapshot or
    /// the snapshot is of a different type.
    pub fn with_snapshot<T: 'static>(f: impl Fn(&Viewport, Option<&T>) + 'static) -> Self {
        Self::new(move |viewport, snapshot| {
            f(viewport, snapshot.and_then(|s| s.downcast_ref::<T>()));
        })
    }

    /// Returns `true` if both handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub(crate) fn call(&self, viewport: &Viewport, snapshot: Option<&dyn Any>) {
        (self.0)(viewport, snapshot);
    }
}

impl fmt::Debug for ViewportHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ViewportHandler")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// A value that is either fixed at subscribe time or re-read every cycle.
pub enum Setting<T> {
    /// A constant.
    Fixed(T),
    /// Evaluated at the start of every cycle.
    Dynamic(Rc<dyn Fn() -> T>),
}

impl<T: Copy> Setting<T> {
    /// Creates a setting re-read from `f` every cycle.
    pub fn dynamic(f: impl Fn() -> T + 'static) -> Self {
        Self::Dynamic(Rc::new(f))
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        match self {
            Self::Fixed(value) => *value,
            Self::Dynamic(f) => f(),
        }
    }
}

impl<T> From<T> for Setting<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

impl<T: Clone> Clone for Setting<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Dynamic(f) => Self::Dynamic(Rc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// Produces a value from current layout, run before any handler in a cycle.
pub type LayoutSnapshot = Rc<dyn Fn(&Viewport) -> Box<dyn Any>>;

/// What a listener wants to be told about.
///
/// The four interest settings are required; [`ListenerOptions::new`] leaves
/// them unset so that a missing one is reported by
/// [`Scheduler::add`](crate::scheduler::Scheduler::add). The presets fill all
/// four.
#[derive(Clone, Default)]
pub struct ListenerOptions {
    /// Notify when scroll state changes.
    pub notify_scroll: Option<Setting<bool>>,
    /// Notify when dimensions change.
    pub notify_dimensions: Option<Setting<bool>>,
    /// Only notify on idle passes.
    pub notify_only_when_idle: Option<Setting<bool>>,
    /// Admission priority.
    pub priority: Option<Setting<Priority>>,
    /// Optional layout read performed before handlers run.
    pub layout_snapshot: Option<LayoutSnapshot>,
}

impl ListenerOptions {
    /// Options with nothing set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scroll and dimension updates at normal priority, not deferred.
    #[must_use]
    pub fn viewport() -> Self {
        Self::new()
            .notify_scroll(true)
            .notify_dimensions(true)
            .notify_only_when_idle(false)
            .priority(Priority::Normal)
    }

    /// Scroll updates only.
    #[must_use]
    pub fn scroll() -> Self {
        Self::viewport().notify_dimensions(false)
    }

    /// Dimension updates only.
    #[must_use]
    pub fn dimensions() -> Self {
        Self::viewport().notify_scroll(false)
    }

    /// Sets the scroll interest.
    #[must_use]
    pub fn notify_scroll(mut self, setting: impl Into<Setting<bool>>) -> Self {
        self.notify_scroll = Some(setting.into());
        self
    }

    /// Sets the dimensions interest.
    #[must_use]
    pub fn notify_dimensions(mut self, setting: impl Into<Setting<bool>>) -> Self {
        self.notify_dimensions = Some(setting.into());
        self
    }

    /// Sets whether the listener only runs on idle passes.
    #[must_use]
    pub fn notify_only_when_idle(mut self, setting: impl Into<Setting<bool>>) -> Self {
        self.notify_only_when_idle = Some(setting.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn priority(mut self, setting: impl Into<Setting<Priority>>) -> Self {
        self.priority = Some(setting.into());
        self
    }

    /// Sets a layout snapshot whose value is handed to the handler.
    #[must_use]
    pub fn layout_snapshot<T: 'static>(mut self, f: impl Fn(&Viewport) -> T + 'static) -> Self {
        self.layout_snapshot = Some(Rc::new(move |viewport: &Viewport| {
            Box::new(f(viewport)) as Box<dyn Any>
        }));
        self
    }
}

impl fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("notify_scroll", &self.notify_scroll)
            .field("notify_dimensions", &self.notify_dimensions)
            .field("notify_only_when_idle", &self.notify_only_when_idle)
            .field("priority", &self.priority)
            .field("layout_snapshot", &self.layout_snapshot.is_some())
            .finish()
    }
}

/// A registration was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A required interest setting was not provided.
    MissingSetting(&'static str),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "listener options are missing `{name}`"),
        }
    }
}

impl core::error::Error for ConfigurationError {}

/// Running cost statistics for one registration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostStats {
    /// Number of completed dispatches.
    pub iterations: u64,
    /// Moving average of layout + handler time in milliseconds.
    pub average_cost_ms: f64,
    /// Consecutive cycles skipped by admission control.
    pub skipped_iterations: u32,
    /// Whether the registration has been dispatched since it was added or
    /// last marked for reinitialization.
    pub initialized: bool,
}

impl CostStats {
    /// Folds one dispatch cost into the average and marks the registration
    /// initialized.
    pub fn record(&mut self, cost_ms: f64) {
        let n = (self.iterations + 1) as f64;
        self.average_cost_ms += (cost_ms - self.average_cost_ms) / n;
        self.iterations += 1;
        self.skipped_iterations = 0;
        self.initialized = true;
    }

    /// Counts one skip.
    pub fn record_skip(&mut self) {
        self.skipped_iterations = self.skipped_iterations.saturating_add(1);
    }
}

/// A read-only view of one registration, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListenerStats {
    /// The registration's id.
    pub id: ListenerId,
    /// Priority as of the call.
    pub priority: Priority,
    /// Cost statistics.
    pub cost: CostStats,
}

/// Interest settings resolved for one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) scroll: bool,
    pub(crate) dimensions: bool,
    pub(crate) only_when_idle: bool,
    pub(crate) priority: Priority,
}

pub(crate) struct Registration {
    pub(crate) id: ListenerId,
    pub(crate) handler: ViewportHandler,
    notify_scroll: Setting<bool>,
    notify_dimensions: Setting<bool>,
    notify_only_when_idle: Setting<bool>,
    priority: Setting<Priority>,
    pub(crate) layout_snapshot: Option<LayoutSnapshot>,
    pub(crate) stats: Cell<CostStats>,
}

impl Registration {
    fn new(
        id: ListenerId,
        handler: ViewportHandler,
        options: ListenerOptions,
    ) -> Result<Self, ConfigurationError> {
        let missing = ConfigurationError::MissingSetting;
        Ok(Self {
            id,
            handler,
            notify_scroll: options.notify_scroll.ok_or(missing("notify_scroll"))?,
            notify_dimensions: options
                .notify_dimensions
                .ok_or(missing("notify_dimensions"))?,
            notify_only_when_idle: options
                .notify_only_when_idle
                .ok_or(missing("notify_only_when_idle"))?,
            priority: options.priority.ok_or(missing("priority"))?,
            layout_snapshot: options.layout_snapshot,
            stats: Cell::new(CostStats::default()),
        })
    }

    /// Evaluates every interest setting.
    pub(crate) fn interest(&self) -> Interest {
        Interest {
            scroll: self.notify_scroll.get(),
            dimensions: self.notify_dimensions.get(),
            only_when_idle: self.notify_only_when_idle.get(),
            priority: self.priority.get(),
        }
    }

    pub(crate) fn listener_stats(&self) -> ListenerStats {
        ListenerStats {
            id: self.id,
            priority: self.priority.get(),
            cost: self.stats.get(),
        }
    }

    pub(crate) fn update_stats(&self, f: impl FnOnce(&mut CostStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("handler", &self.handler)
            .field("stats", &self.stats.get())
            .finish_non_exhaustive()
    }
}

/// Ordered set of registrations, unique by handler.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Rc<Registration>>,
    next_id: u64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration, replacing any existing one for the same handler.
    ///
    /// A replacement is appended at the end with fresh statistics.
    pub fn insert(
        &mut self,
        handler: &ViewportHandler,
        options: ListenerOptions,
    ) -> Result<ListenerId, ConfigurationError> {
        let id = ListenerId(self.next_id);
        let registration = Registration::new(id, handler.clone(), options)?;
        self.next_id += 1;
        self.remove(handler);
        self.entries.push(Rc::new(registration));
        Ok(id)
    }

    /// Removes the registration for `handler`. Returns `false` if absent.
    pub fn remove(&mut self, handler: &ViewportHandler) -> bool {
        let before = self.entries.len();
        self.entries.retain(|r| !r.handler.same(handler));
        self.entries.len() != before
    }

    /// Marks the registration for `handler` as needing a fresh dispatch.
    pub fn mark_uninitialized(&self, handler: &ViewportHandler) -> bool {
        match self.find(handler) {
            Some(registration) => {
                registration.update_stats(|s| s.initialized = false);
                true
            }
            None => false,
        }
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the registration for `handler`, if any.
    #[must_use]
    pub fn id_of(&self, handler: &ViewportHandler) -> Option<ListenerId> {
        self.find(handler).map(|r| r.id)
    }

    /// Statistics for every registration, in insertion order.
    pub fn stats(&self) -> impl Iterator<Item = ListenerStats> + '_ {
        self.entries.iter().map(|r| r.listener_stats())
    }

    /// A snapshot of the current registrations, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Rc<Registration>> {
        self.entries.clone()
    }

    fn find(&self, handler: &ViewportHandler) -> Option<&Rc<Registration>> {
        self.entries.iter().find(|r| r.handler.same(handler))
    }
}
