//! Shared capacity accounting for concurrently running groups.
//!
//! `CapacityState` is a counting resource guarded by a single
//! `parking_lot::Mutex`, paired with a `parking_lot::Condvar` so blocked
//! dispatchers sleep until a slot is released instead of polling.
//!
//! Slots are not tied to threads. A worker holding one slot may take more for
//! its children; as long as it only uses [`CapacityState::try_acquire`] for
//! that, it can never wait on a slot that only it could free.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::SchedulerError;

/// Point-in-time view of capacity usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    /// Slots currently held.
    pub active: usize,
    /// Configured maximum concurrency.
    pub max: usize,
    /// Highest `active` value observed since construction.
    pub peak: usize,
}

#[derive(Debug)]
struct Counts {
    active: usize,
    peak: usize,
}

/// Lock-guarded counter of active slots with blocking acquisition.
#[derive(Debug)]
pub struct CapacityState {
    max: usize,
    counts: Mutex<Counts>,
    released: Condvar,
}

impl CapacityState {
    /// Create capacity state allowing `max_concurrency` simultaneous slots.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if `max_concurrency` is zero.
    pub fn new(max_concurrency: usize) -> Result<Self, SchedulerError> {
        if max_concurrency == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrency must be greater than 0".into(),
            ));
        }
        Ok(Self {
            max: max_concurrency,
            counts: Mutex::new(Counts { active: 0, peak: 0 }),
            released: Condvar::new(),
        })
    }

    /// Configured maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max
    }

    /// Take a slot if one is free. Never blocks on availability.
    pub fn try_acquire(&self) -> bool {
        let mut counts = self.counts.lock();
        self.take_slot(&mut counts)
    }

    /// Take a slot, sleeping on the condvar until one is released.
    pub fn acquire(&self) {
        let mut counts = self.counts.lock();
        self.released.wait_while(&mut counts, |c| c.active >= self.max);
        let taken = self.take_slot(&mut counts);
        debug_assert!(taken, "slot must be free after wait_while");
    }

    /// Take a slot, waiting at most `timeout`. Returns `false` on expiry.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counts = self.counts.lock();
        while counts.active >= self.max {
            if self.released.wait_until(&mut counts, deadline).timed_out() {
                return self.take_slot(&mut counts);
            }
        }
        self.take_slot(&mut counts)
    }

    /// Give a slot back and wake one blocked acquirer.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::CapacityInvariantViolation` when no slot is
    /// held. The counter is left at zero.
    pub fn release(&self) -> Result<(), SchedulerError> {
        let mut counts = self.counts.lock();
        if counts.active == 0 {
            error!(max = self.max, "release called with no active slots");
            return Err(SchedulerError::CapacityInvariantViolation {
                active: 0,
                max: self.max,
            });
        }
        counts.active -= 1;
        let active = counts.active;
        drop(counts);
        self.released.notify_one();
        debug!(active, max = self.max, "capacity slot released");
        Ok(())
    }

    /// Current active, maximum, and peak values, read under the lock.
    #[must_use]
    pub fn snapshot(&self) -> CapacitySnapshot {
        let counts = self.counts.lock();
        debug_assert!(counts.active <= self.max, "active slots exceed maximum");
        CapacitySnapshot {
            active: counts.active,
            max: self.max,
            peak: counts.peak,
        }
    }

    /// Non-blocking acquisition returning a guard that releases on drop.
    #[must_use]
    pub fn try_permit(self: &Arc<Self>) -> Option<CapacityPermit> {
        self.try_acquire().then(|| CapacityPermit {
            state: Arc::clone(self),
        })
    }

    /// Blocking acquisition returning a guard that releases on drop.
    #[must_use]
    pub fn permit(self: &Arc<Self>) -> CapacityPermit {
        self.acquire();
        CapacityPermit {
            state: Arc::clone(self),
        }
    }

    fn take_slot(&self, counts: &mut Counts) -> bool {
        if counts.active > self.max {
            error!(
                active = counts.active,
                max = self.max,
                "active slots exceed maximum"
            );
            debug_assert!(counts.active <= self.max, "active slots exceed maximum");
        }
        if counts.active >= self.max {
            return false;
        }
        counts.active += 1;
        counts.peak = counts.peak.max(counts.active);
        true
    }
}

/// A held capacity slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct CapacityPermit {
    state: Arc<CapacityState>,
}

impl Drop for CapacityPermit {
    fn drop(&mut self) {
        let released = self.state.release();
        if let Err(e) = &released {
            error!(error = %e, "capacity permit released an unheld slot");
        }
        debug_assert!(released.is_ok(), "capacity permit released an unheld slot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            CapacityState::new(0),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_try_acquire_gates_at_max() {
        let state = CapacityState::new(2).unwrap();
        assert!(state.try_acquire());
        assert!(state.try_acquire());
        assert!(!state.try_acquire());

        let snap = state.snapshot();
        assert_eq!(snap.active, 2);
        assert_eq!(snap.max, 2);
        assert_eq!(snap.peak, 2);
    }

    #[test]
    fn test_release_without_acquire_is_violation() {
        let state = CapacityState::new(1).unwrap();
        assert!(state.try_acquire());
        state.release().unwrap();

        let err = state.release().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::CapacityInvariantViolation { active: 0, max: 1 }
        ));
        assert_eq!(state.snapshot().active, 0);
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let state = Arc::new(CapacityState::new(1).unwrap());
        {
            let _permit = state.try_permit().expect("slot free");
            assert!(state.try_permit().is_none());
        }
        assert_eq!(state.snapshot().active, 0);
        assert!(state.try_permit().is_some());
    }

    #[test]
    fn test_acquire_timeout_expires_when_full() {
        let state = CapacityState::new(1).unwrap();
        assert!(state.try_acquire());
        let start = Instant::now();
        assert!(!state.acquire_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let state = Arc::new(CapacityState::new(1).unwrap());
        let held = state.permit();

        let waiter_state = Arc::clone(&state);
        let waiter = thread::spawn(move || {
            let _permit = waiter_state.permit();
            waiter_state.snapshot().active
        });

        thread::sleep(Duration::from_millis(20));
        drop(held);

        assert_eq!(waiter.join().unwrap(), 1);
        assert_eq!(state.snapshot().active, 0);
    }
}
