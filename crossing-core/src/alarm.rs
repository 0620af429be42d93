/*
 * Restartable software alarms, patterned after the hardware alarm pool
 * on small microcontrollers: a callback fires once the deadline passes
 * and its return value decides whether the alarm chain continues.
 *
 * Two rules keep overlapping callbacks from acting on the same state.
 * First, an `Alarm` carries at most one deadline: arming an armed alarm
 * replaces the old deadline instead of stacking a second one. Second,
 * the handler does not reschedule itself; it *returns* the next delay
 * and `poll` re-arms deterministically from the deadline that fired, so
 * a periodic chain never drifts even when polled late.
 *
 * The type never reads a clock. The caller passes `now` in and asks
 * `deadline()` when to come back, which keeps every user of this module
 * testable without waiting on real time.
 */

use embassy_time::{Duration, Instant};

/// What an expiry handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rearm {
    /// Fire again this long after the deadline that just fired.
    After(Duration),
    /// The chain is done; the alarm goes idle.
    Stop,
}

/// A single logical alarm role: idle, or armed with one deadline.
#[derive(Debug)]
pub struct Alarm {
    deadline: Option<Instant>,
}

impl Alarm {
    pub const fn new() -> Self {
        Alarm { deadline: None }
    }

    /// Arm the alarm to fire `delay` after `now`. An already-armed
    /// alarm is re-armed; the previous deadline is discarded.
    pub fn start(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Move the alarm to a new deadline, counted from `now`. Same
    /// replacement rule as `start`; the name marks call sites that
    /// adjust a running alarm rather than begin a chain.
    pub fn reschedule(&mut self, now: Instant, new_delay: Duration) {
        self.start(now, new_delay);
    }

    /// Cancelling an idle (or already-fired) alarm is a no-op, never an
    /// error.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if armed. Callers use the minimum over
    /// their alarms to decide how long to sleep.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fire the alarm if its deadline has passed. The handler receives
    /// the deadline that fired and returns how to continue; re-arming
    /// is relative to that deadline, not to `now`. Returns whether the
    /// handler ran.
    pub fn poll<F>(&mut self, now: Instant, handler: F) -> bool
    where
        F: FnOnce(Instant) -> Rearm,
    {
        match self.deadline {
            Some(fired) if now >= fired => {
                self.deadline = None;
                if let Rearm::After(delay) = handler(fired) {
                    self.deadline = Some(fired + delay);
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_ticks(0) + Duration::from_millis(ms)
    }

    #[test]
    fn does_not_fire_early() {
        let mut alarm = Alarm::new();
        alarm.start(at(0), Duration::from_millis(100));

        assert!(!alarm.poll(at(99), |_| Rearm::Stop));
        assert!(alarm.is_armed());
        assert!(alarm.poll(at(100), |_| Rearm::Stop));
        assert!(!alarm.is_armed());
    }

    #[test]
    fn restart_replaces_outstanding_deadline() {
        let mut alarm = Alarm::new();
        alarm.start(at(0), Duration::from_millis(100));
        alarm.reschedule(at(50), Duration::from_millis(100));

        // The original deadline at t=100 must be gone.
        assert!(!alarm.poll(at(100), |_| Rearm::Stop));
        assert!(alarm.poll(at(150), |_| Rearm::Stop));
    }

    #[test]
    fn cancel_idle_is_noop() {
        let mut alarm = Alarm::new();
        alarm.cancel();
        assert!(!alarm.is_armed());

        alarm.start(at(0), Duration::from_millis(10));
        alarm.cancel();
        assert!(!alarm.poll(at(10), |_| Rearm::Stop));
    }

    #[test]
    fn rearm_is_relative_to_fired_deadline() {
        let mut alarm = Alarm::new();
        alarm.start(at(0), Duration::from_millis(100));

        // Poll 30 ms late; the next fire must still land on the grid.
        assert!(alarm.poll(at(130), |fired| {
            assert_eq!(fired, at(100));
            Rearm::After(Duration::from_millis(100))
        }));
        assert_eq!(alarm.deadline(), Some(at(200)));
    }

    #[test]
    fn periodic_chain_counts_every_period() {
        let mut alarm = Alarm::new();
        alarm.start(at(0), Duration::from_millis(10));

        let mut fires = 0;
        for ms in 0..=100 {
            alarm.poll(at(ms), |_| {
                fires += 1;
                Rearm::After(Duration::from_millis(10))
            });
        }
        assert_eq!(fires, 10);
    }
}
