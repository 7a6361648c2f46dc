// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Admission control and cost tracking under budget mode, end to end.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use periscope_core::admission::Priority;
use periscope_core::provider::{ProviderConfig, ViewportProvider};
use periscope_core::registry::Setting;
use periscope_core::scheduler::SchedulerConfig;
use periscope_core::time::Duration;
use periscope_core::viewport::Viewport;
use periscope_core::{ListenerOptions, ViewportHandler};
use periscope_sim::{SimDriver, SimHost, TIMEBASE, ms};

fn budgeted() -> SimDriver {
    let host = SimHost::new();
    let config = ProviderConfig {
        scheduler: SchedulerConfig::budgeted(),
        ..ProviderConfig::for_timebase(TIMEBASE)
    };
    SimDriver::with_provider(ViewportProvider::with_config(host, config))
}

/// A handler that costs `cost` of virtual time and logs `name` when it runs.
fn costly(
    host: &SimHost,
    cost: Duration,
    name: &'static str,
    log: &Rc<RefCell<Vec<&'static str>>>,
) -> ViewportHandler {
    let host = host.clone();
    let log = Rc::clone(log);
    ViewportHandler::new(move |_, _| {
        host.advance(cost);
        log.borrow_mut().push(name);
    })
}

/// Scrolls one step and lets the resulting frame run.
fn scroll_frame(driver: &SimDriver, step: u32) {
    driver.scroll_to(0.0, f64::from(step) * 8.0);
    driver.run_for(ms(16));
}

#[test]
fn expensive_low_priority_listener_is_never_starved_past_its_limit() {
    let driver = budgeted();
    let log = Rc::new(RefCell::new(Vec::new()));
    let cheap = costly(driver.host(), Duration::ZERO, "cheap", &log);
    let heavy = costly(driver.host(), ms(30), "heavy", &log);
    let p = driver.provider();
    p.add_listener(&cheap, ListenerOptions::scroll()).unwrap();
    p.add_listener(&heavy, ListenerOptions::scroll().priority(Priority::Low))
        .unwrap();
    driver.settle();
    assert_eq!(*log.borrow(), ["cheap", "heavy"], "initial dispatch admits all");
    log.borrow_mut().clear();

    let cycles = 400;
    for step in 1..=cycles {
        scroll_frame(&driver, step);
    }

    let log = log.borrow();
    let cheap_runs = log.iter().filter(|n| **n == "cheap").count();
    assert_eq!(cheap_runs, cycles as usize, "within-budget listener runs every cycle");

    let mut since_heavy = 0;
    let mut longest_gap = 0;
    let mut heavy_runs = 0;
    for name in log.iter() {
        match *name {
            "cheap" => since_heavy += 1,
            _ => {
                heavy_runs += 1;
                // The cycle the heavy listener runs in also ran `cheap`.
                longest_gap = longest_gap.max(since_heavy - 1);
                since_heavy = 0;
            }
        }
    }
    longest_gap = longest_gap.max(since_heavy);
    assert!(heavy_runs > 0, "heavy listener ran at least once");
    assert!(heavy_runs < cycles as usize, "heavy listener was throttled");
    assert!(
        longest_gap <= 63,
        "at most 63 consecutive skips for low priority, got {longest_gap}"
    );
}

#[test]
fn highest_priority_always_runs() {
    let driver = budgeted();
    let log = Rc::new(RefCell::new(Vec::new()));
    let critical = costly(driver.host(), ms(40), "critical", &log);
    let p = driver.provider();
    p.add_listener(
        &critical,
        ListenerOptions::scroll().priority(Priority::Highest),
    )
    .unwrap();
    driver.settle();

    for step in 1..=20 {
        scroll_frame(&driver, step);
    }
    assert_eq!(log.borrow().len(), 21, "never skipped");
    let stats = &p.listener_stats()[0];
    assert_eq!(stats.cost.skipped_iterations, 0);
    assert!((stats.cost.average_cost_ms - 40.0).abs() < 1e-9, "cost measured");
}

#[test]
fn skipped_listener_catches_up_on_idle() {
    let driver = budgeted();
    let log = Rc::new(RefCell::new(Vec::new()));
    let cheap = costly(driver.host(), Duration::ZERO, "cheap", &log);
    let heavy = costly(driver.host(), ms(30), "heavy", &log);
    let p = driver.provider();
    p.add_listener(&cheap, ListenerOptions::scroll()).unwrap();
    p.add_listener(&heavy, ListenerOptions::scroll().priority(Priority::Low))
        .unwrap();
    driver.settle();

    // Scroll until the heavy listener is skipped at least once.
    let mut step = 0;
    loop {
        step += 1;
        scroll_frame(&driver, step);
        if p.listener_stats()[1].cost.skipped_iterations > 0 {
            break;
        }
        assert!(step < 1000, "heavy listener never skipped");
    }
    log.borrow_mut().clear();

    driver.settle();
    assert_eq!(*log.borrow(), ["heavy"], "idle pass serves the starved listener");
    assert_eq!(p.listener_stats()[1].cost.skipped_iterations, 0);
}

#[test]
fn budget_mode_off_runs_everyone() {
    let driver = SimDriver::new(SimHost::new());
    let log = Rc::new(RefCell::new(Vec::new()));
    let heavy = costly(driver.host(), ms(30), "heavy", &log);
    driver
        .provider()
        .add_listener(&heavy, ListenerOptions::scroll().priority(Priority::Low))
        .unwrap();
    driver.settle();
    for step in 1..=10 {
        scroll_frame(&driver, step);
    }
    assert_eq!(log.borrow().len(), 11, "no admission control by default");
}

#[test]
fn average_cost_includes_layout_and_handler_time() {
    let driver = SimDriver::new(SimHost::new());
    let host = driver.host().clone();
    let layout_host = host.clone();
    let runs = Rc::new(Cell::new(0_u32));
    let counter = Rc::clone(&runs);
    let handler = ViewportHandler::new(move |_, _| {
        // Alternate 2ms and 6ms handler cost.
        let n = counter.get();
        counter.set(n + 1);
        host.advance(if n % 2 == 0 { ms(2) } else { ms(6) });
    });
    let options = ListenerOptions::scroll().layout_snapshot(move |_: &Viewport| {
        layout_host.advance(ms(1));
    });
    let p = driver.provider();
    p.add_listener(&handler, options).unwrap();
    driver.settle();

    for step in 1..=9 {
        scroll_frame(&driver, step);
    }
    let stats = p.listener_stats()[0].cost;
    assert_eq!(stats.iterations, 10);
    assert!(stats.initialized);
    assert!(
        (stats.average_cost_ms - 5.0).abs() < 1e-9,
        "mean of 3ms and 7ms runs, got {}",
        stats.average_cost_ms
    );
}

#[test]
fn dynamic_priority_is_read_every_cycle() {
    let driver = budgeted();
    let log = Rc::new(RefCell::new(Vec::new()));
    let cheap = costly(driver.host(), Duration::ZERO, "cheap", &log);
    let heavy = costly(driver.host(), ms(30), "heavy", &log);
    let urgent = Rc::new(Cell::new(false));
    let flag = Rc::clone(&urgent);
    let priority = Setting::dynamic(move || {
        if flag.get() {
            Priority::Highest
        } else {
            Priority::Low
        }
    });
    let p = driver.provider();
    p.add_listener(&cheap, ListenerOptions::scroll()).unwrap();
    p.add_listener(&heavy, ListenerOptions::scroll().priority(priority))
        .unwrap();
    driver.settle();

    urgent.set(true);
    log.borrow_mut().clear();
    for step in 1..=10 {
        scroll_frame(&driver, step);
    }
    let heavy_runs = log.borrow().iter().filter(|n| **n == "heavy").count();
    assert_eq!(heavy_runs, 10, "promoted listener runs every cycle");
    assert_eq!(p.listener_stats()[1].priority, Priority::Highest);
}
