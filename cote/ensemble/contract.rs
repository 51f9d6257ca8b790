//! Wall-clock training contracts.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Share of a contract handed to modules; the rest covers orchestration and
/// estimate computation.
pub const SAFETY_MARGIN: f64 = 0.99;

/// Unit a contract amount is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractUnit {
    /// Nanoseconds.
    Nanoseconds,
    /// Microseconds.
    Microseconds,
    /// Milliseconds.
    Milliseconds,
    /// Seconds.
    #[default]
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl ContractUnit {
    /// Nanoseconds in one unit.
    #[must_use]
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60 * 1_000_000_000,
            Self::Hours => 3_600 * 1_000_000_000,
            Self::Days => 86_400 * 1_000_000_000,
        }
    }

    /// Converts `amount` of this unit to whole nanoseconds, saturating.
    #[must_use]
    pub fn to_nanos(self, amount: f64) -> i64 {
        let nanos = amount * self.nanos_per_unit() as f64;
        if nanos.is_nan() || nanos <= 0.0 {
            0
        } else if nanos >= i64::MAX as f64 {
            i64::MAX
        } else {
            nanos as i64
        }
    }
}

/// Budget bookkeeping for one build call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractBudget {
    /// Total contract.
    pub total_nanos: i64,
    /// Time charged so far; never decreases.
    pub consumed_nanos: i64,
    /// Budget per contractable module once allocated.
    pub per_module_share: Option<i64>,
}

impl ContractBudget {
    /// Fresh budget of `total_nanos`.
    #[must_use]
    pub const fn new(total_nanos: i64) -> Self {
        Self {
            total_nanos,
            consumed_nanos: 0,
            per_module_share: None,
        }
    }

    /// Budget of `amount` in `unit`.
    #[must_use]
    pub fn from_unit(amount: f64, unit: ContractUnit) -> Self {
        Self::new(unit.to_nanos(amount))
    }
}

/// Tracks elapsed time against a [`ContractBudget`] from the moment it is created.
///
/// Only the orchestrating thread mutates the manager; workers never see it.
#[derive(Debug, Clone)]
pub struct ContractManager {
    budget: ContractBudget,
    started: Instant,
    credited_nanos: i64,
}

impl ContractManager {
    /// Starts the clock on `budget`.
    #[must_use]
    pub fn start(budget: ContractBudget) -> Self {
        Self {
            budget,
            started: Instant::now(),
            credited_nanos: 0,
        }
    }

    /// Starts the clock on a budget of `total_nanos`.
    #[must_use]
    pub fn with_nanos(total_nanos: i64) -> Self {
        Self::start(ContractBudget::new(total_nanos))
    }

    /// Current budget snapshot.
    #[must_use]
    pub const fn budget(&self) -> &ContractBudget {
        &self.budget
    }

    /// Total contract in nanoseconds.
    #[must_use]
    pub const fn total_nanos(&self) -> i64 {
        self.budget.total_nanos
    }

    /// Wall-clock time since start plus any credited time.
    #[must_use]
    pub fn elapsed_nanos(&self) -> i64 {
        let wall = i64::try_from(self.started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        wall.saturating_add(self.credited_nanos)
    }

    /// `max(0, budget - elapsed)`.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        (self.budget.total_nanos - self.elapsed_nanos()).max(0)
    }

    /// Whether another unit of work may start.
    #[must_use]
    pub fn within_budget(&self) -> bool {
        self.remaining() > 0
    }

    /// Fixes the per-module share for this build and returns it.
    ///
    /// Sequential builds split the discounted budget evenly. Concurrent builds
    /// give every module the whole discounted budget, since all of them race the
    /// same deadline. Returns `None` when nothing is contractable. Once fixed,
    /// later calls return the same share.
    pub fn allocate(&mut self, num_contractable: usize, concurrent: bool) -> Option<i64> {
        if let Some(share) = self.budget.per_module_share {
            return Some(share);
        }
        if num_contractable == 0 {
            return None;
        }
        let discounted = self.budget.total_nanos as f64 * SAFETY_MARGIN;
        let share = if concurrent {
            discounted
        } else {
            discounted / num_contractable as f64
        };
        let share = share as i64;
        self.budget.per_module_share = Some(share);
        Some(share)
    }

    /// Charges `nanos` of work. Negative amounts are ignored.
    pub fn record(&mut self, nanos: i64) {
        if nanos > 0 {
            self.budget.consumed_nanos = self.budget.consumed_nanos.saturating_add(nanos);
        }
    }

    /// Moves the clock forward by time spent in an earlier, interrupted build.
    pub fn credit(&mut self, nanos: i64) {
        if nanos > 0 {
            self.credited_nanos = self.credited_nanos.saturating_add(nanos);
            self.record(nanos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_share_is_discounted_split() {
        let mut manager = ContractManager::start(ContractBudget::from_unit(9.0, ContractUnit::Seconds));
        let share = manager.allocate(3, false).unwrap();
        assert!((share - 2_970_000_000).abs() <= 1);
        assert_eq!(manager.allocate(1, false), Some(share));
    }

    #[test]
    fn concurrent_share_is_whole_discounted_budget() {
        let mut manager = ContractManager::with_nanos(1_000_000);
        assert_eq!(manager.allocate(4, true), Some(990_000));
    }

    #[test]
    fn nothing_contractable_allocates_nothing() {
        let mut manager = ContractManager::with_nanos(1_000);
        assert_eq!(manager.allocate(0, false), None);
    }

    #[test]
    fn consumed_never_decreases() {
        let mut manager = ContractManager::with_nanos(100);
        manager.record(40);
        manager.record(-10);
        assert_eq!(manager.budget().consumed_nanos, 40);
    }

    #[test]
    fn credit_exhausts_budget() {
        let mut manager = ContractManager::with_nanos(ContractUnit::Minutes.nanos_per_unit());
        assert!(manager.within_budget());
        manager.credit(ContractUnit::Minutes.nanos_per_unit());
        assert!(!manager.within_budget());
        assert_eq!(manager.remaining(), 0);
    }

    #[test]
    fn units_convert_and_saturate() {
        assert_eq!(ContractUnit::Milliseconds.to_nanos(1.5), 1_500_000);
        assert_eq!(ContractUnit::Days.to_nanos(1e12), i64::MAX);
        assert_eq!(ContractUnit::Seconds.to_nanos(-1.0), 0);
    }
}
