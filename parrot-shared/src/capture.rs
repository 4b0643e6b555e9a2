//! Polled capture of an IR receiver line into a [`SignalTrace`].

use embedded_hal::digital::v2::InputPin;

use crate::clock::Clock;
use crate::trace::{EdgeRecorder, SignalTrace};

/// Default listening window: two seconds is enough for several repeats of
/// any common remote protocol.
pub const DEFAULT_WINDOW_US: u64 = 2_000_000;

/// Default pause between line samples. IR demodulator output changes on the
/// order of hundreds of microseconds, so 10 us sampling oversamples each
/// pulse comfortably.
pub const DEFAULT_SAMPLE_DELAY_US: u64 = 10;

/// Settings for one capture run.
///
/// `invert` is on by default because the common demodulating receivers pull
/// the line low while they see the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub window_us: u64,
    pub sample_delay_us: u64,
    pub invert: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            window_us: DEFAULT_WINDOW_US,
            sample_delay_us: DEFAULT_SAMPLE_DELAY_US,
            invert: true,
        }
    }
}

/// Samples `pin` for the configured window and records its transitions.
///
/// Blocks the calling thread for the whole window; there is no early exit.
/// The line is read once immediately so a change right after the call still
/// has a reference level to compare against. A transition shorter than the
/// sample delay can be missed or land on the next sample tick; that is the
/// resolution limit of polling.
///
/// Returns the normalized trace, which is empty when the line never changed.
/// Note that a capture that starts in the middle of a pulse cannot see the
/// start of that pulse; its first recorded edge is the next transition.
///
/// # Panics
///
/// Panics if `cfg.sample_delay_us` is zero. That configuration cannot make
/// progress against a virtual clock and is a bug at the call site.
pub fn poll_capture<P, C>(pin: &P, clock: &mut C, cfg: &CaptureConfig) -> Result<SignalTrace, P::Error>
where
    P: InputPin,
    C: Clock,
{
    assert!(cfg.sample_delay_us > 0, "sample delay must be nonzero");
    log::debug!(
        "capturing for {} us (sample every {} us, invert: {})",
        cfg.window_us,
        cfg.sample_delay_us,
        cfg.invert
    );

    let mut recorder = EdgeRecorder::new(cfg.invert);
    let start = clock.now_us();
    recorder.sample(0, pin.is_high()?);
    loop {
        clock.delay_us(cfg.sample_delay_us);
        let elapsed = clock.now_us() - start;
        recorder.sample(elapsed, pin.is_high()?);
        if elapsed >= cfg.window_us {
            break;
        }
    }

    let trace = recorder.finish();
    if trace.is_empty() {
        log::info!("No IR signals detected.");
    } else {
        log::debug!("captured {} edges spanning {} us", trace.len(), trace.span_us());
    }
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ScheduledInput, VirtualClock};
    use crate::trace::{Edge, SignalTrace};

    fn capture_scheduled(
        idle_level: bool,
        transitions: Vec<(u64, bool)>,
        cfg: &CaptureConfig,
    ) -> SignalTrace {
        let mut clock = VirtualClock::new();
        let pin = ScheduledInput::new(&clock, idle_level, transitions);
        poll_capture(&pin, &mut clock, cfg).unwrap()
    }

    #[test]
    fn test_capture_normalizes_transitions() {
        // Line high, dips low between 15 us and 25 us, sampled every 5 us:
        // raw samples 1 1 1 0 0 1 1.
        let cfg = CaptureConfig {
            window_us: 30,
            sample_delay_us: 5,
            invert: false,
        };
        let trace = capture_scheduled(true, vec![(15, false), (25, true)], &cfg);
        assert_eq!(trace.edges(), &[Edge::new(0, false), Edge::new(10, true)]);
    }

    #[test]
    fn test_inverted_capture_is_complement() {
        let transitions = vec![(15, false), (25, true)];
        let plain = capture_scheduled(
            true,
            transitions.clone(),
            &CaptureConfig {
                window_us: 30,
                sample_delay_us: 5,
                invert: false,
            },
        );
        let inverted = capture_scheduled(
            true,
            transitions,
            &CaptureConfig {
                window_us: 30,
                sample_delay_us: 5,
                invert: true,
            },
        );
        assert_eq!(plain.len(), inverted.len());
        for (a, b) in plain.edges().iter().zip(inverted.edges()) {
            assert_eq!(a.ts_us, b.ts_us);
            assert_eq!(a.level, !b.level);
        }
    }

    #[test]
    fn test_silent_window_yields_empty_trace() {
        let cfg = CaptureConfig {
            window_us: 1_000,
            sample_delay_us: 10,
            invert: true,
        };
        let trace = capture_scheduled(true, Vec::new(), &cfg);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_pulse_between_samples_is_missed() {
        // A 4 us dip between the 10 us sample ticks never gets sampled.
        let cfg = CaptureConfig {
            window_us: 40,
            sample_delay_us: 10,
            invert: false,
        };
        let trace = capture_scheduled(true, vec![(12, false), (16, true)], &cfg);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_slow_sampling_quantizes_edges() {
        // The dip at 12 us is first seen at the 20 us tick.
        let cfg = CaptureConfig {
            window_us: 40,
            sample_delay_us: 10,
            invert: false,
        };
        let trace = capture_scheduled(true, vec![(12, false), (35, true)], &cfg);
        assert_eq!(trace.edges(), &[Edge::new(0, false), Edge::new(20, true)]);
    }

    #[test]
    fn test_transition_on_window_boundary_is_kept() {
        let cfg = CaptureConfig {
            window_us: 30,
            sample_delay_us: 10,
            invert: false,
        };
        let trace = capture_scheduled(true, vec![(30, false)], &cfg);
        assert_eq!(trace.edges(), &[Edge::new(0, false)]);
    }

    #[test]
    fn test_captured_trace_upholds_invariants() {
        let schedules = vec![
            vec![(10, false), (20, true), (30, false), (31, true), (90, false)],
            vec![(5, false)],
            vec![(7, false), (8, true), (9, false), (700, true)],
        ];
        for transitions in schedules {
            let cfg = CaptureConfig {
                window_us: 1_000,
                sample_delay_us: 10,
                invert: false,
            };
            let trace = capture_scheduled(true, transitions, &cfg);
            assert!(
                SignalTrace::try_from_edges(trace.edges().to_vec()).is_ok(),
                "captured trace violates invariants: {:?}",
                trace
            );
        }
    }

    #[test]
    #[should_panic(expected = "sample delay must be nonzero")]
    fn test_zero_sample_delay_panics() {
        let mut clock = VirtualClock::new();
        let pin = ScheduledInput::silent(&clock, true);
        let cfg = CaptureConfig {
            window_us: 100,
            sample_delay_us: 0,
            invert: false,
        };
        let _ = poll_capture(&pin, &mut clock, &cfg);
    }
}
