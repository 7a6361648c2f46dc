// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated scroll session that exercises the tracing and diagnostics
//! pipeline.
//!
//! Drives a budgeted provider with a mix of cheap and expensive listeners
//! through a fling, a reversal and a window resize on a virtual clock,
//! printing every event with a
//! [`PrettyPrintSink`](periscope_debug::pretty::PrettyPrintSink) while a
//! [`RecorderSink`](periscope_debug::recorder::RecorderSink) captures them,
//! then exports a Chrome trace JSON file.

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use periscope_core::admission::Priority;
use periscope_core::provider::{ProviderConfig, ViewportProvider};
use periscope_core::scheduler::SchedulerConfig;
use periscope_core::time::Duration;
use periscope_core::trace::{
    AdmissionEvent, AdvisoryEvent, CollectorEvent, CycleBeginEvent, CycleEndEvent,
    ListenerRunEvent, PublishEvent, TraceSink,
};
use periscope_core::viewport::Viewport;
use periscope_core::{ListenerOptions, ViewportHandler};
use periscope_debug::pretty::PrettyPrintSink;
use periscope_debug::recorder::RecorderSink;
use periscope_sim::{SimDriver, SimHost, TIMEBASE, ms};

/// Scroll positions of a decelerating fling, one per frame.
const FLING: [f64; 12] = [
    40.0, 110.0, 200.0, 290.0, 370.0, 440.0, 500.0, 545.0, 580.0, 600.0, 612.0, 618.0,
];

/// Forwards every event to two sinks.
struct Tee<A, B>(A, B);

impl<A: TraceSink, B: TraceSink> TraceSink for Tee<A, B> {
    fn on_publish(&mut self, e: &PublishEvent) {
        self.0.on_publish(e);
        self.1.on_publish(e);
    }

    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        self.0.on_cycle_begin(e);
        self.1.on_cycle_begin(e);
    }

    fn on_admission(&mut self, e: &AdmissionEvent) {
        self.0.on_admission(e);
        self.1.on_admission(e);
    }

    fn on_listener_run(&mut self, e: &ListenerRunEvent) {
        self.0.on_listener_run(e);
        self.1.on_listener_run(e);
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        self.0.on_cycle_end(e);
        self.1.on_cycle_end(e);
    }

    fn on_collector(&mut self, e: &CollectorEvent) {
        self.0.on_collector(e);
        self.1.on_collector(e);
    }

    fn on_advisory(&mut self, e: &AdvisoryEvent) {
        self.0.on_advisory(e);
        self.1.on_advisory(e);
    }
}

/// A listener whose handler costs `cost` of virtual time.
fn busy(host: &SimHost, cost: Duration) -> ViewportHandler {
    let host = host.clone();
    ViewportHandler::new(move |_, _| host.advance(cost))
}

fn main() {
    let host = SimHost::new();
    let config = ProviderConfig {
        scheduler: SchedulerConfig::budgeted(),
        ..ProviderConfig::for_timebase(TIMEBASE)
    };
    let driver = SimDriver::with_provider(ViewportProvider::with_config(host.clone(), config));
    let provider = driver.provider();

    // -- sinks -------------------------------------------------------------
    let recorder = Rc::new(RefCell::new(RecorderSink::new()));
    let pretty = PrettyPrintSink::new(Box::new(std::io::stdout()), TIMEBASE);
    provider.set_trace_sink(Box::new(Tee(pretty, Rc::clone(&recorder))));

    // -- listeners ---------------------------------------------------------
    let header = busy(&host, ms(1));
    let parallax = busy(&host, ms(6));
    let analytics = busy(&host, ms(25));
    let layout_host = host.clone();
    let loaded = Rc::new(Cell::new(0.0_f64));
    let lazy_loaded = Rc::clone(&loaded);
    let lazy_images = ViewportHandler::with_snapshot::<f64>(move |_, reach| {
        if let Some(&reach) = reach {
            lazy_loaded.set(lazy_loaded.get().max(reach));
        }
    });

    let listeners = [
        (&header, ListenerOptions::scroll().priority(Priority::Highest)),
        (&parallax, ListenerOptions::scroll().priority(Priority::High)),
        (&analytics, ListenerOptions::viewport().priority(Priority::Low)),
        (
            &lazy_images,
            ListenerOptions::viewport()
                .notify_only_when_idle(true)
                .layout_snapshot(move |v: &Viewport| {
                    // Pretend to measure every image against the viewport.
                    layout_host.advance(ms(2));
                    v.scroll.y + v.dimensions.viewport_height
                }),
        ),
    ];
    for (handler, options) in listeners {
        if let Err(err) = provider.add_listener(handler, options) {
            eprintln!("failed to subscribe: {err}");
            return;
        }
    }
    driver.settle();

    // -- session -------------------------------------------------------------
    for y in FLING {
        driver.scroll_to(0.0, y);
        driver.run_for(ms(16));
    }
    driver.run_for(ms(300));
    for y in [560.0, 480.0, 400.0] {
        driver.scroll_to(0.0, y);
        driver.run_for(ms(16));
    }
    driver.resize(900.0, 700.0);
    driver.settle();

    provider.schedule_reinitialize(&lazy_images);
    driver.settle();

    println!("images loaded down to y={}", loaded.get());
    for stats in provider.listener_stats() {
        println!(
            "listener {} ({}): {} runs, avg {:.2}ms",
            stats.id.0,
            stats.priority.as_str(),
            stats.cost.iterations,
            stats.cost.average_cost_ms,
        );
    }

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let file = match File::create(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to create {path}: {err}");
            return;
        }
    };
    let mut writer = BufWriter::new(file);
    let recorded = recorder.borrow();
    if let Err(err) = periscope_debug::chrome::export(recorded.as_bytes(), TIMEBASE, &mut writer) {
        eprintln!("failed to write Chrome trace: {err}");
        return;
    }

    println!("Wrote {path} ({} bytes recorded)", recorded.as_bytes().len());
}
