//! Von Neumann stereo extractor and the error-state flush machine.

use crate::fips::{SlidingWindow, TestOutcome};

/// Three-valued ordering used by the extractor: equal maps to the discard
/// sentinel `-1`, rather than to `0`.
fn order(a: i32, b: i32) -> i32 {
    use std::cmp::Ordering::*;
    match a.cmp(&b) {
        Equal => -1,
        Greater => 1,
        Less => 0,
    }
}

/// Running state of the Von Neumann extractor across calls to `feed_group`.
pub struct ExtractorState {
    psl: i32,
    psr: i32,
    alternator: i32,
    byte_out: u8,
    bit_counter: u8,
}

impl ExtractorState {
    pub fn new() -> Self {
        ExtractorState {
            psl: 0,
            psr: 0,
            alternator: 1,
            byte_out: 0,
            bit_counter: 0,
        }
    }

    /// Feed one group of four stereo samples (`w1, w2` = pair A left/right,
    /// `w3, w4` = pair B left/right). Returns a completed byte whenever the
    /// accumulator reaches 8 bits.
    pub fn feed_group(&mut self, w1: i32, w2: i32, w3: i32, w4: i32) -> Option<u8> {
        // Both comparisons use the same (stale, pre-update) psl/psr.
        let o1 = order(w1 - self.psl, w2 - self.psr);
        let o2 = order(w3 - self.psl, w4 - self.psr);

        if self.alternator > 0 {
            self.psl = w3;
            self.psr = w4;
        } else {
            self.psl = w1;
            self.psr = w2;
        }

        if o1 == o2 || o1 == -1 || o2 == -1 {
            self.alternator = -self.alternator;
            return None;
        }

        let bit = if self.alternator > 0 { o1 } else { o2 } as u8;
        self.byte_out = (self.byte_out << 1) | bit;
        self.bit_counter += 1;

        if self.bit_counter == 8 {
            let completed = self.byte_out;
            self.byte_out = 0;
            self.bit_counter = 0;
            Some(completed)
        } else {
            None
        }
    }
}

impl Default for ExtractorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Error-state (flush) machine gating broadband output against the FIPS monitor.
pub enum ErrorState {
    Ok,
    Flush(u32),
}

impl ErrorState {
    pub fn new() -> Self {
        ErrorState::Ok
    }

    /// Feed one emitted byte through the monitor and the flush machine.
    /// `output` accumulates bytes that survive (i.e. are not withheld while
    /// flushing). Returns the FIPS outcome observed this call.
    pub fn observe(
        &mut self,
        byte: u8,
        window: &mut SlidingWindow,
        output: &mut Vec<u8>,
        health_check_enabled: bool,
    ) -> TestOutcome {
        window.add(byte);
        let outcome = window.tick();

        if !health_check_enabled {
            output.push(byte);
            return outcome;
        }

        match self {
            ErrorState::Ok => {
                output.push(byte);
                if outcome == TestOutcome::Fail {
                    log::error!("CRIT: RNG health check failed, entering flush state");
                    output.clear();
                    *self = ErrorState::Flush(2500);
                }
            }
            ErrorState::Flush(n) => {
                if *n <= 1 {
                    *self = ErrorState::Ok;
                    log::info!("RNG health check recovered");
                } else {
                    *self = ErrorState::Flush(*n - 1);
                }
            }
        }

        outcome
    }
}

impl Default for ErrorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- order() ---

    #[test]
    fn order_equal_is_discard_sentinel() {
        assert_eq!(order(5, 5), -1);
    }

    #[test]
    fn order_greater_and_less() {
        assert_eq!(order(5, 3), 1);
        assert_eq!(order(3, 5), 0);
    }

    // --- S4: discard on equality ---

    #[test]
    fn s4_identical_pair_orderings_discard_and_flip_alternator() {
        let mut ext = ExtractorState::new();
        let emitted = ext.feed_group(100, 100, 200, 200);
        assert!(emitted.is_none());
        assert_eq!(ext.bit_counter, 0);
        assert_eq!(ext.alternator, -1);
    }

    #[test]
    fn identical_orderings_across_many_groups_never_emit() {
        let mut ext = ExtractorState::new();
        let mut total_bits = 0u32;
        for _ in 0..2000 {
            if ext.feed_group(10, 10, 20, 20).is_some() {
                total_bits += 8;
            }
        }
        assert_eq!(total_bits, 0);
    }

    #[test]
    fn distinct_orderings_eventually_emit_a_byte() {
        let mut ext = ExtractorState::new();
        let mut got_byte = false;
        // psl/psr start at 0; pair A (10,-10) and pair B (-10,10) give
        // opposite, non-equal orderings against the same previous samples.
        for _ in 0..64 {
            if ext.feed_group(10, -10, -10, 10).is_some() {
                got_byte = true;
                break;
            }
        }
        assert!(got_byte);
    }

    // --- error-state machine ---

    #[test]
    fn ok_state_appends_bytes_and_feeds_monitor() {
        let mut state = ErrorState::new();
        let mut window = SlidingWindow::new();
        let mut out = Vec::new();
        state.observe(0x42, &mut window, &mut out, true);
        assert_eq!(out, vec![0x42]);
        assert_eq!(window.fill_bits(), 8);
    }

    #[test]
    fn monobit_failure_enters_flush_and_clears_buffer() {
        let mut state = ErrorState::new();
        let mut window = SlidingWindow::new();
        let mut out = Vec::new();
        for _ in 0..2500 {
            state.observe(0xFF, &mut window, &mut out, true);
        }
        assert!(out.is_empty());
        assert!(matches!(state, ErrorState::Flush(_)));
    }

    #[test]
    fn flush_state_withholds_output_but_still_feeds_monitor() {
        let mut state = ErrorState::Flush(2);
        let mut window = SlidingWindow::new();
        let mut out = Vec::new();
        state.observe(0x11, &mut window, &mut out, true);
        assert!(out.is_empty());
        assert_eq!(window.fill_bits(), 8);
        assert!(matches!(state, ErrorState::Flush(1)));
    }

    #[test]
    fn flush_transitions_to_ok_at_zero_and_logs_recovery() {
        let mut state = ErrorState::Flush(1);
        let mut window = SlidingWindow::new();
        let mut out = Vec::new();
        state.observe(0x11, &mut window, &mut out, true);
        assert!(matches!(state, ErrorState::Ok));
    }

    #[test]
    fn disabled_health_check_always_appends() {
        let mut state = ErrorState::Flush(5);
        let mut window = SlidingWindow::new();
        let mut out = Vec::new();
        state.observe(0x11, &mut window, &mut out, false);
        assert_eq!(out, vec![0x11]);
    }
}
