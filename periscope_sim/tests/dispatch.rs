// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change gating, idle coalescing and dispatch order, end to end.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use periscope_core::viewport::Viewport;
use periscope_core::{ListenerOptions, ViewportHandler};
use periscope_sim::{SimDriver, SimHost, ms};

type Log<T> = Rc<RefCell<Vec<T>>>;

fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

fn capture(log: &Log<Viewport>) -> ViewportHandler {
    let log = Rc::clone(log);
    ViewportHandler::new(move |v, _| log.borrow_mut().push(*v))
}

/// A driver with `listeners` subscribed and their initial values delivered.
fn started(listeners: &[(&ViewportHandler, ListenerOptions)]) -> SimDriver {
    let driver = SimDriver::new(SimHost::new());
    for (handler, options) in listeners {
        driver
            .provider()
            .add_listener(handler, options.clone())
            .unwrap();
    }
    assert!(driver.settle(), "initial dispatch settles");
    driver
}

#[test]
fn listeners_only_hear_about_what_they_asked_for() {
    let scrolls = log();
    let sizes = log();
    let on_scroll = capture(&scrolls);
    let on_size = capture(&sizes);
    let driver = started(&[
        (&on_scroll, ListenerOptions::scroll()),
        (&on_size, ListenerOptions::dimensions()),
    ]);
    assert_eq!((scrolls.borrow().len(), sizes.borrow().len()), (1, 1));

    driver.scroll_to(0.0, 120.0);
    driver.settle();
    assert_eq!(scrolls.borrow().len(), 2, "scroll listener ran");
    assert_eq!(sizes.borrow().len(), 1, "dimensions listener did not");

    driver.resize(900.0, 700.0);
    driver.settle();
    assert_eq!(scrolls.borrow().len(), 2, "scroll listener did not");
    assert_eq!(sizes.borrow().len(), 2, "dimensions listener ran");
    let last = sizes.borrow()[1];
    assert_eq!(last.dimensions.viewport_width, 900.0);
    assert_eq!(last.dimensions.document_height, 6000.0);
}

#[test]
fn unchanged_samples_publish_nothing() {
    let seen = log();
    let handler = capture(&seen);
    let driver = started(&[(&handler, ListenerOptions::viewport())]);

    // A scroll event that lands on the same offset.
    driver.scroll_to(0.0, 0.0);
    driver.settle();
    assert_eq!(seen.borrow().len(), 1, "no field changed");
}

#[test]
fn burst_of_scroll_events_reads_once_per_frame() {
    let seen = log();
    let handler = capture(&seen);
    let driver = started(&[(&handler, ListenerOptions::scroll())]);
    let reads = driver.host().scroll_reads();

    for y in 1..=5 {
        driver.scroll_to(0.0, f64::from(y) * 10.0);
    }
    driver.run_for(ms(16));
    assert_eq!(driver.host().scroll_reads(), reads + 1, "one read per frame");
    assert_eq!(seen.borrow().last().map(|v| v.scroll.y), Some(50.0));
}

#[test]
fn resize_events_are_debounced() {
    let seen = log();
    let handler = capture(&seen);
    let driver = started(&[(&handler, ListenerOptions::dimensions())]);
    let reads = driver.host().dimension_reads();

    for step in 0..5 {
        driver.resize(1000.0 + f64::from(step) * 10.0, 700.0);
        driver.run_for(ms(40));
    }
    assert_eq!(
        driver.host().dimension_reads(),
        reads,
        "no read while events keep arriving"
    );
    driver.settle();
    assert_eq!(driver.host().dimension_reads(), reads + 1, "one read after the quiet window");
    let widths: Vec<f64> = seen
        .borrow()
        .iter()
        .map(|v| v.dimensions.viewport_width)
        .collect();
    assert_eq!(widths, [1280.0, 1040.0], "only the final size is delivered");
}

#[test]
fn idle_listener_receives_one_coalesced_update() {
    let live = log();
    let idle = log();
    let on_live = capture(&live);
    let on_idle = capture(&idle);
    let driver = started(&[
        (&on_live, ListenerOptions::scroll()),
        (&on_idle, ListenerOptions::scroll().notify_only_when_idle(true)),
    ]);
    assert_eq!(idle.borrow().len(), 1, "initial value reaches idle listeners too");

    for i in 1..=10 {
        driver.scroll_to(0.0, f64::from(i) * 25.0);
        driver.run_for(ms(16));
    }
    assert_eq!(live.borrow().len(), 11, "every frame reached the live listener");
    assert_eq!(idle.borrow().len(), 1, "nothing yet while scrolling");

    driver.settle();
    let idle = idle.borrow();
    assert_eq!(idle.len(), 2, "exactly one idle dispatch");
    assert_eq!(idle[1].scroll.y, 250.0, "with the final coordinate");
    assert_eq!(live.borrow().len(), 11, "idle pass skips live listeners");
}

#[test]
fn direction_and_turn_points_follow_the_scroll() {
    let seen = log();
    let handler = capture(&seen);
    let driver = started(&[(&handler, ListenerOptions::scroll())]);

    for y in [100.0, 200.0, 150.0] {
        driver.scroll_to(0.0, y);
        driver.run_for(ms(16));
    }
    let seen = seen.borrow();
    let down = seen[2].scroll;
    assert!(down.is_scrolling_down && !down.is_scrolling_up);
    assert_eq!(down.y_turn, 0.0, "first movement keeps the initial turn");

    let up = seen[3].scroll;
    assert!(up.is_scrolling_up && !up.is_scrolling_down);
    assert_eq!(up.y_turn, 200.0, "reversal turns at the previous coordinate");
    assert_eq!(up.y_delta_since_turn, -50.0);
    assert!(!up.is_scrolling_left && !up.is_scrolling_right, "x never moved");
}

#[test]
fn layout_snapshots_run_before_any_handler() {
    let order: Log<String> = log();
    let listener = |name: &'static str| {
        let handler_log = Rc::clone(&order);
        let layout_log = Rc::clone(&order);
        let handler = ViewportHandler::with_snapshot::<f64>(move |_, top| {
            handler_log
                .borrow_mut()
                .push(format!("{name}: handler {top:?}"));
        });
        let options = ListenerOptions::scroll().layout_snapshot(move |v: &Viewport| {
            layout_log.borrow_mut().push(format!("{name}: layout"));
            v.scroll.y + 10.0
        });
        (handler, options)
    };
    let (a, a_options) = listener("a");
    let (b, b_options) = listener("b");
    let driver = started(&[(&a, a_options), (&b, b_options)]);
    order.borrow_mut().clear();

    driver.scroll_to(0.0, 40.0);
    driver.run_for(ms(16));
    assert_eq!(
        *order.borrow(),
        [
            "a: layout",
            "b: layout",
            "a: handler Some(50.0)",
            "b: handler Some(50.0)",
        ]
    );
}

#[test]
fn handlers_may_unsubscribe_during_dispatch() {
    let driver = SimDriver::new(SimHost::new());
    let p = driver.provider().clone();
    let calls = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<ViewportHandler>>> = Rc::new(RefCell::new(None));

    let counter = Rc::clone(&calls);
    let me = Rc::clone(&slot);
    let provider = p.clone();
    let handler = ViewportHandler::new(move |_, _| {
        counter.set(counter.get() + 1);
        if let Some(h) = me.borrow().as_ref() {
            provider.remove_listener(h);
        }
    });
    *slot.borrow_mut() = Some(handler.clone());
    p.add_listener(&handler, ListenerOptions::viewport()).unwrap();

    assert!(driver.settle(), "settles");
    assert_eq!(calls.get(), 1, "ran once, then removed itself");
    assert!(!p.is_collecting(), "collector stopped on the next turn");
    slot.borrow_mut().take();
}

#[test]
#[should_panic(expected = "handler failure")]
fn handler_panics_propagate() {
    let handler = ViewportHandler::new(|_, _| panic!("handler failure"));
    let driver = SimDriver::new(SimHost::new());
    driver
        .provider()
        .add_listener(&handler, ListenerOptions::viewport())
        .unwrap();
    driver.settle();
}

#[test]
fn state_survives_a_panicking_handler() {
    let fail = Rc::new(Cell::new(false));
    let a_calls = Rc::new(Cell::new(0));
    let b_calls = Rc::new(Cell::new(0));

    let (flag, counter) = (Rc::clone(&fail), Rc::clone(&a_calls));
    let a = ViewportHandler::new(move |_, _| {
        counter.set(counter.get() + 1);
        assert!(!flag.get(), "handler failure");
    });
    let counter = Rc::clone(&b_calls);
    let b = ViewportHandler::new(move |_, _| counter.set(counter.get() + 1));
    let driver = started(&[
        (&a, ListenerOptions::scroll()),
        (&b, ListenerOptions::scroll()),
    ]);
    assert_eq!((a_calls.get(), b_calls.get()), (1, 1));

    fail.set(true);
    driver.scroll_to(0.0, 100.0);
    let result = catch_unwind(AssertUnwindSafe(|| driver.run_for(ms(16))));
    assert!(result.is_err(), "panic reached the caller");
    assert_eq!((a_calls.get(), b_calls.get()), (2, 1), "cycle aborted after a");

    fail.set(false);
    driver.scroll_to(0.0, 200.0);
    driver.settle();
    assert_eq!((a_calls.get(), b_calls.get()), (3, 2), "both dispatched again");

    let p = driver.provider();
    assert_eq!(p.listener_count(), 2, "registry intact");
    for stats in p.listener_stats() {
        assert_eq!(stats.cost.iterations, 2, "aborted run not recorded");
        assert!(stats.cost.initialized);
        assert_eq!(stats.cost.skipped_iterations, 0);
    }
    assert_eq!(p.current_viewport().scroll.y, 200.0);
}
