/*
 * Software debouncing for mechanical inputs.
 *
 * A pressed contact does not produce one clean edge; it chatters for a
 * few milliseconds. The filter here is the lockout kind: the first edge
 * is accepted and starts a window during which every further edge on
 * the same input is dropped. Only an *accepted* edge moves the window,
 * so a long burst of chatter collapses to exactly one press.
 */

use embassy_time::{Duration, Instant};

/// Default lockout window. 25 ms rides out contact chatter without
/// eating deliberate double presses.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(25);

/// Debounce state for one monitored input.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub const fn new(window: Duration) -> Self {
        Debouncer {
            window,
            last_accepted: None,
        }
    }

    /// Report a raw edge seen at `at`. Returns whether the edge is
    /// accepted as a press. Timestamps are expected to be
    /// non-decreasing per input; an edge that lands before the last
    /// accepted one is rejected rather than wrapped into a huge
    /// unsigned difference.
    pub fn accept(&mut self, at: Instant) -> bool {
        let accepted = match self.last_accepted {
            None => true,
            Some(last) => match at.checked_duration_since(last) {
                Some(elapsed) => elapsed >= self.window,
                None => false,
            },
        };

        if accepted {
            // Update before anything else reacts to the press, so a
            // re-entered handler already sees the new window.
            self.last_accepted = Some(at);
        }
        accepted
    }
}

/// One debouncer per input identity, indexed by ordinal. The shared
/// interrupt-handler pattern funnels every input through one callback
/// and dispatches by identity; this is the per-identity state backing
/// that callback.
#[derive(Debug)]
pub struct DebounceBank<const N: usize> {
    inputs: [Debouncer; N],
}

impl<const N: usize> DebounceBank<N> {
    /// All inputs share the same window; per-input windows have not
    /// been needed.
    pub fn new(window: Duration) -> Self {
        DebounceBank {
            inputs: core::array::from_fn(|_| Debouncer::new(window)),
        }
    }

    pub fn accept(&mut self, input: usize, at: Instant) -> bool {
        self.inputs[input].accept(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_ticks(0) + Duration::from_millis(ms)
    }

    #[test]
    fn burst_collapses_to_first_edge() {
        let mut button = Debouncer::new(DEBOUNCE_WINDOW);

        // Chatter every 5 ms, all inside one window.
        assert!(button.accept(at(100)));
        for ms in [105, 110, 115, 120] {
            assert!(!button.accept(at(ms)));
        }

        // The window is anchored at the accepted edge, not the last
        // rejected one, so t=125 clears it.
        assert!(button.accept(at(125)));
    }

    #[test]
    fn spaced_edges_all_accepted() {
        let mut button = Debouncer::new(DEBOUNCE_WINDOW);

        for ms in [0, 25, 50, 100, 1000] {
            assert!(button.accept(at(ms)));
        }
    }

    #[test]
    fn out_of_order_timestamp_rejected() {
        let mut button = Debouncer::new(DEBOUNCE_WINDOW);

        assert!(button.accept(at(100)));
        assert!(!button.accept(at(90)));
        // The anchor must not have moved backwards.
        assert!(button.accept(at(125)));
    }

    #[test]
    fn inputs_debounce_independently() {
        let mut bank: DebounceBank<2> = DebounceBank::new(DEBOUNCE_WINDOW);

        assert!(bank.accept(0, at(0)));
        assert!(bank.accept(1, at(1)));
        assert!(!bank.accept(0, at(2)));
        assert!(!bank.accept(1, at(2)));
    }
}
