/*
 * The pedestrian-crossing light: RED -> GREEN -> YELLOW -> RED, each
 * phase timed by an alarm, with a once-per-second countdown for the
 * display and an audible pulse while the light is green.
 *
 * The controller owns no pins and no clock. A driving loop feeds it
 * `tick(now)` whenever `next_deadline()` passes and reads the lamp
 * state back out, the same split the rest of this crate uses.
 */

use embassy_time::{Duration, Instant};

use crate::alarm::{Alarm, Rearm};

const RED_TIME: Duration = Duration::from_secs(10);
const GREEN_TIME: Duration = Duration::from_secs(10);
const YELLOW_TIME: Duration = Duration::from_secs(3);

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

// The green-phase pulse alternates every half second and runs for the
// nominal green time at most, as many toggles as fit.
const BEEP_HALF_PERIOD: Duration = Duration::from_millis(500);
const BEEP_TOGGLE_LIMIT: u64 = 2 * GREEN_TIME.as_secs();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Red,
    Green,
    Yellow,
}

impl Phase {
    /*
     * Determine the phase after this one, without changing anything.
     */
    fn next(self) -> Phase {
        match self {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Yellow,
            Phase::Yellow => Phase::Red,
        }
    }
}

#[derive(Debug)]
pub struct TrafficLight {
    phase: Phase,
    transition: Alarm,
    countdown: Alarm,
    beeper: Alarm,
    remaining_secs: u64,
    beeper_on: bool,
    beep_toggles: u64,
}

impl TrafficLight {
    /// A fresh controller starts at RED with all timers running.
    pub fn new(now: Instant) -> Self {
        let mut light = TrafficLight {
            phase: Phase::Red,
            transition: Alarm::new(),
            countdown: Alarm::new(),
            beeper: Alarm::new(),
            remaining_secs: 0,
            beeper_on: false,
            beep_toggles: 0,
        };
        light.enter(Phase::Red, now);
        light
    }

    fn enter(&mut self, phase: Phase, now: Instant) {
        self.phase = phase;
        self.transition.start(now, self.phase_time());
        self.remaining_secs = self.phase_time().as_secs();
        self.countdown.start(now, COUNTDOWN_STEP);

        if phase == Phase::Green {
            // Zero delay: the first toggle lands on green entry itself.
            self.beep_toggles = 0;
            self.beeper.start(now, Duration::from_ticks(0));
        } else {
            self.beeper.cancel();
            self.beeper_on = false;
        }
    }

    /// Run every timer whose deadline has passed. Call with a
    /// non-decreasing `now`, at the latest when `next_deadline()`
    /// comes due.
    pub fn tick(&mut self, now: Instant) {
        // Countdown before transition: at a phase boundary both fire on
        // the same instant, and the countdown must reach zero in the
        // outgoing phase before the new phase resets it.
        self.countdown.poll(now, |_| {
            if self.remaining_secs > 1 {
                self.remaining_secs -= 1;
                Rearm::After(COUNTDOWN_STEP)
            } else {
                self.remaining_secs = 0;
                Rearm::Stop
            }
        });

        let mut advance = None;
        self.transition.poll(now, |_| {
            advance = Some(self.phase.next());
            Rearm::Stop
        });
        if let Some(next) = advance {
            self.enter(next, now);
        }

        // After the transition, so a beeper armed on green entry fires
        // within the same tick.
        self.beeper.poll(now, |_| {
            if self.phase != Phase::Green || self.beep_toggles >= BEEP_TOGGLE_LIMIT {
                self.beeper_on = false;
                Rearm::Stop
            } else {
                self.beeper_on = !self.beeper_on;
                self.beep_toggles += 1;
                Rearm::After(BEEP_HALF_PERIOD)
            }
        });
    }

    /// A crossing request from the debounced pedestrian button. Honored
    /// only while the light is green: the green phase ends on the spot
    /// and YELLOW starts at its full length. In any other phase the
    /// press is dropped, not queued; returns whether it was honored.
    pub fn pedestrian_request(&mut self, now: Instant) -> bool {
        if self.phase != Phase::Green {
            return false;
        }

        self.transition.cancel();
        self.enter(Phase::Yellow, now);
        true
    }

    /// When `tick` next needs to run. `None` never happens while the
    /// controller is in use; the transition alarm is always armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.transition.deadline(),
            self.countdown.deadline(),
            self.beeper.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_time(&self) -> Duration {
        match self.phase {
            Phase::Red => RED_TIME,
            Phase::Green => GREEN_TIME,
            Phase::Yellow => YELLOW_TIME,
        }
    }

    /// Seconds left in the current phase, for the display. Hits zero
    /// exactly when the next transition fires.
    pub fn countdown(&self) -> u64 {
        self.remaining_secs
    }

    pub fn red(&self) -> bool {
        self.phase == Phase::Red
    }

    pub fn amber(&self) -> bool {
        self.phase == Phase::Yellow
    }

    pub fn green(&self) -> bool {
        self.phase == Phase::Green
    }

    pub fn beeper(&self) -> bool {
        self.beeper_on
    }
}
