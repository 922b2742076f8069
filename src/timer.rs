/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The view-change timer.
//!
//! The timer is deadline-based: the worker loop [checks](ViewChangeTimer::expired) it on every
//! iteration rather than parking on an OS timer. Each consecutive timeout without progress
//! doubles the wait (the "change cycle"), so a partitioned replica backs off instead of
//! broadcasting view changes at a fixed rate. Committing a block, reaching a new view, or an
//! explicit reset restores the base timeout.

use std::time::{Duration, Instant};

/// Upper bound on the change cycle. Keeps the doubled timeout within `base * 2^10`.
const MAX_CHANGE_CYCLE: u32 = 10;

pub(crate) struct ViewChangeTimer {
    base: Duration,
    change_cycle: u32,
    deadline: Instant,
}

impl ViewChangeTimer {
    /// Create a started timer with the given base timeout.
    pub(crate) fn new(base: Duration) -> Self {
        Self {
            base,
            change_cycle: 0,
            deadline: Instant::now() + base,
        }
    }

    /// Check whether the current deadline has passed.
    pub(crate) fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// The wait for the current change cycle: `base * 2^change_cycle`.
    pub(crate) fn current_timeout(&self) -> Duration {
        self.base
            .checked_mul(1 << self.change_cycle.min(MAX_CHANGE_CYCLE))
            .unwrap_or(Duration::MAX)
    }

    /// Restart the countdown for the current change cycle.
    pub(crate) fn restart(&mut self, now: Instant) {
        self.deadline = now + self.current_timeout();
    }

    /// Enter the next change cycle and restart. Called when the timer fires without the replica
    /// having made progress.
    pub(crate) fn enter_next_change_cycle(&mut self, now: Instant) {
        self.change_cycle = (self.change_cycle + 1).min(MAX_CHANGE_CYCLE);
        self.restart(now);
    }

    /// Drop back to the base timeout and restart. Called on every committed block and on every
    /// reached new view.
    pub(crate) fn reset_change_cycle(&mut self, now: Instant) {
        self.change_cycle = 0;
        self.restart(now);
    }

    /// Replace the base timeout (from a ledger configuration change) and restart at the base
    /// cycle.
    pub(crate) fn set_base(&mut self, base: Duration, now: Instant) {
        self.base = base;
        self.reset_change_cycle(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_change_cycle() {
        let now = Instant::now();
        let mut timer = ViewChangeTimer::new(Duration::from_millis(100));
        assert_eq!(timer.current_timeout(), Duration::from_millis(100));

        timer.enter_next_change_cycle(now);
        assert_eq!(timer.current_timeout(), Duration::from_millis(200));

        timer.enter_next_change_cycle(now);
        assert_eq!(timer.current_timeout(), Duration::from_millis(400));

        timer.reset_change_cycle(now);
        assert_eq!(timer.current_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn change_cycle_is_capped() {
        let now = Instant::now();
        let mut timer = ViewChangeTimer::new(Duration::from_millis(1));
        for _ in 0..100 {
            timer.enter_next_change_cycle(now);
        }
        assert_eq!(
            timer.current_timeout(),
            Duration::from_millis(1 << MAX_CHANGE_CYCLE)
        );
    }

    #[test]
    fn expiry_follows_the_deadline() {
        let now = Instant::now();
        let mut timer = ViewChangeTimer::new(Duration::from_millis(50));
        timer.restart(now);
        assert!(!timer.expired(now));
        assert!(timer.expired(now + Duration::from_millis(51)));
    }
}
