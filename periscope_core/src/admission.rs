// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative admission control.
//!
//! When budget mode is enabled, each change cycle splits a fixed frame budget
//! evenly across the listeners that want to run, and [`admit`] decides per
//! listener whether it fits. Listeners that do not fit are skipped with a
//! probability that falls as their consecutive skips accumulate, and are
//! forced to run once they reach their tier's [`Priority::max_skips`].

use rand::rngs::SmallRng;
use rand::{Rng as _, SeedableRng as _};

/// Listener priority tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Always runs.
    Highest,
    /// Runs when within budget; tolerates at most 4 consecutive skips.
    High,
    /// Runs when within budget; tolerates at most 16 consecutive skips.
    #[default]
    Normal,
    /// Only runs within budget when very cheap; tolerates at most 64
    /// consecutive skips.
    Low,
}

impl Priority {
    /// Maximum number of consecutive skips before the listener is forced to
    /// run.
    ///
    /// # Panics
    ///
    /// Panics for [`Priority::Highest`], which is never skipped.
    #[must_use]
    pub const fn max_skips(self) -> u32 {
        match self {
            Self::High => 4,
            Self::Normal => 16,
            Self::Low => 64,
            Self::Highest => panic!("highest-priority listeners have no skip limit"),
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

/// Source of uniform random values in `[0, 1)`.
pub trait RandomSource {
    /// Returns the next uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64;
}

impl<F: FnMut() -> f64> RandomSource for F {
    fn next_unit(&mut self) -> f64 {
        self()
    }
}

/// A seeded small PRNG.
#[derive(Clone, Debug)]
pub struct SeededRandom {
    rng: SmallRng,
}

impl SeededRandom {
    /// Creates a generator from a 64-bit seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }
}

/// What admission control knows about a listener.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// The listener's current priority.
    pub priority: Priority,
    /// Moving average of the listener's cost in milliseconds.
    pub average_cost_ms: f64,
    /// Consecutive cycles the listener has been skipped.
    pub skipped_iterations: u32,
    /// Whether the listener has ever been dispatched.
    pub initialized: bool,
}

/// Why a listener was admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunReason {
    /// The listener has no value yet.
    Initial,
    /// Highest-priority listeners always run.
    Highest,
    /// The listener's average cost fits its share of the budget.
    WithinBudget,
    /// The listener costs at most a tenth of its share.
    Cheap,
    /// The listener reached its skip limit.
    Forced,
    /// The random draw admitted it.
    Drawn,
}

/// The outcome of [`admit`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Admission {
    /// The listener runs this cycle.
    Run(RunReason),
    /// The listener is skipped this cycle.
    Skip {
        /// The run probability the draw was compared against.
        probability: f64,
    },
}

impl Admission {
    /// Returns `true` if the listener runs.
    #[must_use]
    pub const fn runs(&self) -> bool {
        matches!(self, Self::Run(_))
    }
}

/// Splits the frame budget across `count` listeners.
#[must_use]
pub fn per_listener_budget(frame_budget_ms: f64, count: usize) -> f64 {
    frame_budget_ms / count.max(1) as f64
}

/// Decides whether a listener runs this cycle.
///
/// The skip probability uses the skip count this cycle would produce, so a
/// listener skipped `max_skips - 1` times in a row always runs on the next
/// opportunity. Below that limit, a uniform draw greater than the
/// probability skips the listener: the more often a listener has been
/// skipped, the more likely it runs.
pub fn admit(candidate: &Candidate, budget_ms: f64, rng: &mut dyn RandomSource) -> Admission {
    if !candidate.initialized {
        return Admission::Run(RunReason::Initial);
    }
    if candidate.priority == Priority::Highest {
        return Admission::Run(RunReason::Highest);
    }
    if candidate.priority != Priority::Low && candidate.average_cost_ms <= budget_ms {
        return Admission::Run(RunReason::WithinBudget);
    }
    if candidate.average_cost_ms <= budget_ms / 10.0 {
        return Admission::Run(RunReason::Cheap);
    }

    let max_skips = candidate.priority.max_skips();
    assert!(max_skips > 0, "skip limit must be positive");
    let probability = f64::from(candidate.skipped_iterations + 1) / f64::from(max_skips);
    if probability >= 1.0 {
        return Admission::Run(RunReason::Forced);
    }
    if rng.next_unit() > probability {
        Admission::Skip { probability }
    } else {
        Admission::Run(RunReason::Drawn)
    }
}
