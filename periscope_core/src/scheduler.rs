// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Budgeted dispatch of viewport updates.
//!
//! The [`Scheduler`] owns the listener [`Registry`] and runs one dispatch
//! cycle per collector publish. See [`Scheduler::run_cycle`] for the phases
//! of a cycle.
//!
//! Every method takes `&self`. Handlers are user code and may subscribe,
//! unsubscribe or request reinitialization while a cycle is running; the
//! scheduler holds no borrow of its registry or random source while a
//! handler, layout snapshot or dynamic setting is being evaluated.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::admission::{
    Admission, Candidate, RandomSource, SeededRandom, admit, per_listener_budget,
};
use crate::host::Host;
use crate::registry::{
    ConfigurationError, Interest, ListenerId, ListenerOptions, ListenerStats, Registration,
    Registry, ViewportHandler,
};
use crate::time::Duration;
use crate::trace::{AdmissionEvent, CycleBeginEvent, CycleEndEvent, ListenerRunEvent, Tracer};
use crate::viewport::{ChangeFlags, Viewport};

/// Configuration for the [`Scheduler`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Enables admission control on change passes.
    ///
    /// Experimental; when disabled every filtered listener runs.
    pub budget_mode: bool,
    /// Total time budget per change cycle, in milliseconds.
    pub frame_budget_ms: f64,
}

impl SchedulerConfig {
    /// Admission control off, 16ms frame budget.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            budget_mode: false,
            frame_budget_ms: 16.0,
        }
    }

    /// Admission control on, 16ms frame budget.
    #[must_use]
    pub const fn budgeted() -> Self {
        Self {
            budget_mode: true,
            ..Self::new()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What started a dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// The collector published a change.
    Change,
    /// The collector's quiet window elapsed.
    Idle,
    /// One or more listeners asked for a fresh dispatch.
    Reinitialize,
}

impl PassKind {
    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Idle => "idle",
            Self::Reinitialize => "reinitialize",
        }
    }
}

/// Outcome of one [`Scheduler::run_cycle`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle counter.
    pub cycle_index: u64,
    /// Listeners that passed the interest filter.
    pub candidates: u32,
    /// Listeners whose handler ran.
    pub dispatched: u32,
    /// Listeners skipped by admission control.
    pub skipped: u32,
}

/// Owns the registry and runs dispatch cycles.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: RefCell<Registry>,
    rng: RefCell<Box<dyn RandomSource>>,
    cycle_index: Cell<u64>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("cycle_index", &self.cycle_index.get())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler with a fixed-seed random source.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_random(config, SeededRandom::new(0x5eed))
    }

    /// Creates a scheduler with the given random source.
    #[must_use]
    pub fn with_random(config: SchedulerConfig, rng: impl RandomSource + 'static) -> Self {
        Self {
            config,
            registry: RefCell::new(Registry::new()),
            rng: RefCell::new(Box::new(rng)),
            cycle_index: Cell::new(0),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Adds or replaces the registration for `handler`.
    pub fn add(
        &self,
        handler: &ViewportHandler,
        options: ListenerOptions,
    ) -> Result<ListenerId, ConfigurationError> {
        self.registry.borrow_mut().insert(handler, options)
    }

    /// Removes the registration for `handler`. Returns `false` if absent.
    pub fn remove(&self, handler: &ViewportHandler) -> bool {
        self.registry.borrow_mut().remove(handler)
    }

    /// Marks `handler` as needing a fresh dispatch. Returns `false` if absent.
    pub fn mark_uninitialized(&self, handler: &ViewportHandler) -> bool {
        self.registry.borrow().mark_uninitialized(handler)
    }

    /// Returns `true` if any registration exists.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.registry.borrow().is_empty()
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Returns `true` if there are no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_listeners()
    }

    /// Id of the registration for `handler`, if any.
    #[must_use]
    pub fn id_of(&self, handler: &ViewportHandler) -> Option<ListenerId> {
        self.registry.borrow().id_of(handler)
    }

    /// Statistics for every registration, in insertion order.
    ///
    /// Evaluates each registration's priority setting.
    #[must_use]
    pub fn stats(&self) -> Vec<ListenerStats> {
        let registrations = self.registry.borrow().snapshot();
        registrations.iter().map(|r| r.listener_stats()).collect()
    }

    /// Runs one dispatch cycle.
    ///
    /// 1. **Filter.** Registrations captured at the start of the cycle are
    ///    kept, in insertion order, if they have never been dispatched, or if
    ///    they want this kind of pass (or have been skipped before) and are
    ///    interested in something that changed.
    /// 2. **Admission.** On change passes with budget mode enabled, each
    ///    candidate goes through [`admit`] with an even share of the frame
    ///    budget.
    /// 3. **Layout.** Every admitted registration with a layout snapshot
    ///    reads layout before any handler runs.
    /// 4. **Dispatch.** Handlers run in order; each one's layout and handler
    ///    time is folded into its moving average before the next handler
    ///    runs.
    ///
    /// A panicking handler aborts the rest of the cycle. Registrations that
    /// already ran keep their updated statistics.
    pub fn run_cycle<H: Host + ?Sized>(
        &self,
        viewport: &Viewport,
        flags: ChangeFlags,
        pass: PassKind,
        host: &H,
        tracer: &mut Tracer<'_>,
    ) -> CycleReport {
        let cycle_index = self.cycle_index.get();
        self.cycle_index.set(cycle_index + 1);

        let registrations = self.registry.borrow().snapshot();
        let candidates: Vec<(Rc<Registration>, Interest)> = registrations
            .iter()
            .filter_map(|r| {
                let interest = r.interest();
                wants_dispatch(&interest, r, flags, pass).then(|| (Rc::clone(r), interest))
            })
            .collect();

        let candidate_count = count(candidates.len());
        let admission_active = self.config.budget_mode && pass == PassKind::Change;
        let budget_ms = per_listener_budget(self.config.frame_budget_ms, candidates.len());

        tracer.cycle_begin(&CycleBeginEvent {
            cycle_index,
            pass,
            flags,
            timestamp: host.now(),
            registrations: count(registrations.len()),
            candidates: candidate_count,
            listener_budget_ms: admission_active.then_some(budget_ms),
        });

        let mut skipped = 0_u32;
        let admitted: Vec<Rc<Registration>> = candidates
            .into_iter()
            .filter_map(|(registration, interest)| {
                if !admission_active {
                    return Some(registration);
                }
                let stats = registration.stats.get();
                let candidate = Candidate {
                    priority: interest.priority,
                    average_cost_ms: stats.average_cost_ms,
                    skipped_iterations: stats.skipped_iterations,
                    initialized: stats.initialized,
                };
                let admission = admit(&candidate, budget_ms, &mut **self.rng.borrow_mut());
                tracer.admission(&AdmissionEvent {
                    cycle_index,
                    listener: registration.id,
                    priority: interest.priority,
                    average_cost_ms: stats.average_cost_ms,
                    skipped_iterations: stats.skipped_iterations,
                    admission,
                });
                match admission {
                    Admission::Run(_) => Some(registration),
                    Admission::Skip { .. } => {
                        registration.update_stats(|s| s.record_skip());
                        skipped += 1;
                        None
                    }
                }
            })
            .collect();

        let timebase = host.timebase();
        let layouts: Vec<(Option<Box<dyn Any>>, u64)> = admitted
            .iter()
            .map(|registration| match &registration.layout_snapshot {
                Some(snapshot) => {
                    let start = host.now();
                    let value = snapshot(viewport);
                    let ticks = host.now().saturating_duration_since(start).ticks();
                    (Some(value), ticks)
                }
                None => (None, 0),
            })
            .collect();

        let mut dispatched = 0_u32;
        for (registration, (layout, layout_ticks)) in admitted.iter().zip(layouts) {
            let handler_start = host.now();
            registration.handler.call(viewport, layout.as_deref());
            let handler_end = host.now();

            let ticks = layout_ticks + handler_end.saturating_duration_since(handler_start).ticks();
            let cost_ms = Duration(ticks).as_millis_f64(timebase);
            registration.update_stats(|s| s.record(cost_ms));
            dispatched += 1;

            tracer.listener_run(&ListenerRunEvent {
                cycle_index,
                listener: registration.id,
                layout_ticks,
                handler_start,
                handler_end,
                cost_ms,
                average_cost_ms: registration.stats.get().average_cost_ms,
            });
        }

        let report = CycleReport {
            cycle_index,
            candidates: candidate_count,
            dispatched,
            skipped,
        };
        tracer.cycle_end(&CycleEndEvent {
            cycle_index,
            timestamp: host.now(),
            dispatched,
            skipped,
        });
        report
    }
}

fn wants_dispatch(
    interest: &Interest,
    registration: &Registration,
    flags: ChangeFlags,
    pass: PassKind,
) -> bool {
    let stats = registration.stats.get();
    if !stats.initialized {
        return true;
    }
    let idle_pass = pass == PassKind::Idle;
    let starved = stats.skipped_iterations > 0;
    let pass_matches = interest.only_when_idle == idle_pass || starved;
    let changed = (interest.scroll && flags.scroll) || (interest.dimensions && flags.dimensions);
    pass_matches && changed
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    use super::*;
    use crate::admission::{Priority, RunReason};
    use crate::host::HostCapabilities;
    use crate::registry::Setting;
    use crate::time::{HostTime, Timebase};
    use crate::viewport::{DimensionsSample, ScrollSample};

    /// A host whose clock only moves when a test advances it.
    #[derive(Default)]
    struct Clock {
        now_us: Cell<u64>,
    }

    impl Clock {
        fn spend_ms(&self, ms: u64) {
            self.now_us.set(self.now_us.get() + ms * 1000);
        }
    }

    impl Host for Clock {
        fn now(&self) -> HostTime {
            HostTime(self.now_us.get())
        }

        fn timebase(&self) -> Timebase {
            Timebase::MICROS
        }

        fn capabilities(&self) -> HostCapabilities {
            HostCapabilities::FULL
        }

        fn sample_scroll(&self) -> ScrollSample {
            ScrollSample::default()
        }

        fn sample_dimensions(&self) -> DimensionsSample {
            DimensionsSample::default()
        }
    }

    const SCROLL: ChangeFlags = ChangeFlags {
        scroll: true,
        dimensions: false,
    };
    const DIMENSIONS: ChangeFlags = ChangeFlags {
        scroll: false,
        dimensions: true,
    };

    fn counting(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> ViewportHandler {
        let log = Rc::clone(log);
        ViewportHandler::new(move |_, _| log.borrow_mut().push(name))
    }

    fn cycle(s: &Scheduler, host: &Clock, flags: ChangeFlags, pass: PassKind) -> CycleReport {
        s.run_cycle(&Viewport::default(), flags, pass, host, &mut Tracer::none())
    }

    /// Runs one cycle so every registration is initialized.
    fn settle(s: &Scheduler, host: &Clock) {
        cycle(s, host, ChangeFlags::NONE, PassKind::Reinitialize);
    }

    #[test]
    fn uninitialized_listeners_run_regardless_of_flags() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Scheduler::new(SchedulerConfig::new());
        s.add(&counting(&log, "a"), ListenerOptions::dimensions())
            .unwrap();

        let report = cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(report.dispatched, 1);
        assert_eq!(*log.borrow(), vec!["a"]);

        let report = cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(report.dispatched, 0, "initialized, and not interested in scroll");
    }

    #[test]
    fn filter_respects_interest_and_pass() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Scheduler::new(SchedulerConfig::new());
        s.add(&counting(&log, "scroll"), ListenerOptions::scroll())
            .unwrap();
        s.add(&counting(&log, "dims"), ListenerOptions::dimensions())
            .unwrap();
        s.add(
            &counting(&log, "idle"),
            ListenerOptions::viewport().notify_only_when_idle(true),
        )
        .unwrap();
        settle(&s, &host);
        log.borrow_mut().clear();

        cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["scroll"]);
        log.borrow_mut().clear();

        cycle(&s, &host, DIMENSIONS, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["dims"]);
        log.borrow_mut().clear();

        cycle(&s, &host, ChangeFlags::ALL, PassKind::Idle);
        assert_eq!(*log.borrow(), vec!["idle"]);
        log.borrow_mut().clear();

        cycle(&s, &host, ChangeFlags::NONE, PassKind::Idle);
        assert!(log.borrow().is_empty(), "nothing changed");
    }

    #[test]
    fn dispatch_follows_insertion_order() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Scheduler::new(SchedulerConfig::new());
        let a = counting(&log, "a");
        s.add(&a, ListenerOptions::viewport()).unwrap();
        s.add(&counting(&log, "b"), ListenerOptions::viewport())
            .unwrap();
        // Re-adding moves `a` behind `b`.
        s.add(&a, ListenerOptions::viewport()).unwrap();

        cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn layout_runs_before_any_handler() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Scheduler::new(SchedulerConfig::new());
        for name in ["a", "b"] {
            let handler_log = Rc::clone(&log);
            let layout_log = Rc::clone(&log);
            s.add(
                &ViewportHandler::with_snapshot::<&'static str>(move |_, snap| {
                    handler_log.borrow_mut().push(snap.copied().unwrap_or("?"));
                }),
                ListenerOptions::viewport().layout_snapshot(move |_| {
                    layout_log.borrow_mut().push("layout");
                    name
                }),
            )
            .unwrap();
        }

        cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["layout", "layout", "a", "b"]);
    }

    #[test]
    fn cost_includes_layout_and_handler_time() {
        let host = Rc::new(Clock::default());
        let s = Scheduler::new(SchedulerConfig::new());
        let h_host = Rc::clone(&host);
        let l_host = Rc::clone(&host);
        s.add(
            &ViewportHandler::new(move |_, _| h_host.spend_ms(3)),
            ListenerOptions::viewport().layout_snapshot(move |_| l_host.spend_ms(1)),
        )
        .unwrap();

        for _ in 0..10 {
            s.run_cycle(
                &Viewport::default(),
                SCROLL,
                PassKind::Change,
                &*host,
                &mut Tracer::none(),
            );
        }
        let stats = s.stats()[0].cost;
        assert_eq!(stats.iterations, 10);
        assert!((stats.average_cost_ms - 4.0).abs() < 1e-9, "{stats:?}");
    }

    #[test]
    fn admission_is_inactive_without_budget_mode() {
        let host = Rc::new(Clock::default());
        let s = Scheduler::with_random(SchedulerConfig::new(), || 0.999);
        let h_host = Rc::clone(&host);
        s.add(
            &ViewportHandler::new(move |_, _| h_host.spend_ms(100)),
            ListenerOptions::viewport().priority(Priority::Low),
        )
        .unwrap();
        for _ in 0..5 {
            let report = s.run_cycle(
                &Viewport::default(),
                SCROLL,
                PassKind::Change,
                &*host,
                &mut Tracer::none(),
            );
            assert_eq!(report.dispatched, 1);
        }
    }

    #[test]
    fn expensive_low_priority_is_skipped_then_forced() {
        let host = Rc::new(Clock::default());
        let s = Scheduler::with_random(SchedulerConfig::budgeted(), || 0.999);
        let runs = Rc::new(Cell::new(0_u32));
        let r = Rc::clone(&runs);
        let h_host = Rc::clone(&host);
        s.add(
            &ViewportHandler::new(move |_, _| {
                r.set(r.get() + 1);
                h_host.spend_ms(8);
            }),
            ListenerOptions::viewport().priority(Priority::Low),
        )
        .unwrap();

        let run = || {
            s.run_cycle(
                &Viewport::default(),
                SCROLL,
                PassKind::Change,
                &*host,
                &mut Tracer::none(),
            )
        };
        // First dispatch establishes the initial value and an 8ms average,
        // half the 16ms single-listener budget.
        assert_eq!(run().dispatched, 1);
        for i in 0..63 {
            let report = run();
            assert_eq!(report.skipped, 1, "cycle {i}");
        }
        assert_eq!(s.stats()[0].cost.skipped_iterations, 63);
        assert_eq!(run().dispatched, 1, "forced on the 64th opportunity");
        assert_eq!(runs.get(), 2);
        assert_eq!(s.stats()[0].cost.skipped_iterations, 0, "run resets skips");
    }

    #[test]
    fn starved_listener_is_considered_on_idle_pass() {
        let host = Rc::new(Clock::default());
        let s = Scheduler::with_random(SchedulerConfig::budgeted(), || 0.999);
        let runs = Rc::new(Cell::new(0_u32));
        let r = Rc::clone(&runs);
        let h_host = Rc::clone(&host);
        s.add(
            &ViewportHandler::new(move |_, _| {
                r.set(r.get() + 1);
                h_host.spend_ms(40);
            }),
            ListenerOptions::viewport().priority(Priority::Normal),
        )
        .unwrap();
        let run = |pass| {
            s.run_cycle(
                &Viewport::default(),
                SCROLL,
                pass,
                &*host,
                &mut Tracer::none(),
            )
        };
        run(PassKind::Change);
        assert_eq!(run(PassKind::Change).skipped, 1);
        assert_eq!(run(PassKind::Idle).dispatched, 1, "starved and not idle-only");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn highest_priority_is_never_skipped() {
        let host = Rc::new(Clock::default());
        let s = Scheduler::with_random(SchedulerConfig::budgeted(), || 0.999);
        let h_host = Rc::clone(&host);
        s.add(
            &ViewportHandler::new(move |_, _| h_host.spend_ms(50)),
            ListenerOptions::viewport().priority(Priority::Highest),
        )
        .unwrap();
        for _ in 0..10 {
            let report = s.run_cycle(
                &Viewport::default(),
                SCROLL,
                PassKind::Change,
                &*host,
                &mut Tracer::none(),
            );
            assert_eq!(report.dispatched, 1);
        }
    }

    #[test]
    fn settings_are_evaluated_each_cycle() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Scheduler::new(SchedulerConfig::new());
        let wants = Rc::new(Cell::new(false));
        let w = Rc::clone(&wants);
        s.add(
            &counting(&log, "a"),
            ListenerOptions::viewport().notify_scroll(Setting::dynamic(move || w.get())),
        )
        .unwrap();
        settle(&s, &host);
        log.borrow_mut().clear();

        cycle(&s, &host, SCROLL, PassKind::Change);
        assert!(log.borrow().is_empty());
        wants.set(true);
        cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn removal_during_cycle_applies_next_cycle() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::new(Scheduler::new(SchedulerConfig::new()));
        let victim = counting(&log, "victim");

        let sched = Rc::clone(&s);
        let v = victim.clone();
        let remover_log = Rc::clone(&log);
        s.add(
            &ViewportHandler::new(move |_, _| {
                remover_log.borrow_mut().push("remover");
                sched.remove(&v);
            }),
            ListenerOptions::viewport(),
        )
        .unwrap();
        s.add(&victim, ListenerOptions::viewport()).unwrap();

        cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["remover", "victim"]);
        log.borrow_mut().clear();
        cycle(&s, &host, SCROLL, PassKind::Change);
        assert_eq!(*log.borrow(), vec!["remover"]);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn reinitialize_pass_only_reaches_marked_listeners() {
        let host = Clock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s = Scheduler::new(SchedulerConfig::new());
        let a = counting(&log, "a");
        s.add(&a, ListenerOptions::viewport()).unwrap();
        s.add(&counting(&log, "b"), ListenerOptions::viewport())
            .unwrap();
        settle(&s, &host);
        log.borrow_mut().clear();

        assert!(s.mark_uninitialized(&a));
        cycle(&s, &host, ChangeFlags::NONE, PassKind::Reinitialize);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn admission_decisions_are_traced() {
        use crate::trace::{AdmissionEvent, TraceSink};

        #[derive(Default)]
        struct Decisions(Vec<Admission>);
        impl TraceSink for Decisions {
            fn on_admission(&mut self, e: &AdmissionEvent) {
                self.0.push(e.admission);
            }
        }

        let host = Clock::default();
        let s = Scheduler::new(SchedulerConfig::budgeted());
        s.add(&ViewportHandler::new(|_, _| {}), ListenerOptions::viewport())
            .unwrap();
        let mut sink = Decisions::default();
        s.run_cycle(
            &Viewport::default(),
            SCROLL,
            PassKind::Change,
            &host,
            &mut Tracer::new(&mut sink),
        );
        #[cfg(feature = "trace")]
        assert_eq!(sink.0, vec![Admission::Run(RunReason::Initial)]);
        #[cfg(not(feature = "trace"))]
        {
            assert!(sink.0.is_empty(), "tracing compiled out");
            let _ = RunReason::Initial;
        }
    }
}
