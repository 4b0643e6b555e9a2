//! One IR transceiver: a carrier output, an optional receiver input and a
//! clock, bundled behind an object-safe trait for the daemon.

use std::fmt::Debug;
use std::ops::Div;

use embedded_hal::digital::v2::InputPin;
use embedded_hal::PwmPin;
use thiserror::Error;

use crate::capture::{poll_capture, CaptureConfig};
use crate::carrier::CarrierDriver;
use crate::clock::Clock;
use crate::trace::SignalTrace;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The receiver line could not be read. Carries the pin driver's own
    /// error rendering, since pin error types vary per backend.
    #[error("IR receiver read failed: {0}")]
    Pin(String),
}

/// What the daemon needs from a transceiver, without its pin generics.
pub trait IrDevice {
    /// Listens on the receiver line. See [`IrRemote::capture`].
    fn capture(&mut self, window_us: u64, invert: bool) -> Result<SignalTrace, CaptureError>;

    /// Plays `trace` out through the carrier. Blocks for the trace's span.
    fn replay(&mut self, trace: &SignalTrace);

    /// Carrier frequency the emitter pin was configured with.
    fn carrier_hz(&self) -> u32;

    /// Whether a receiver input is wired up at all.
    fn can_capture(&self) -> bool;
}

/// Concrete transceiver over embedded-hal pins.
pub struct IrRemote<P, RX, C> {
    carrier: CarrierDriver<P>,
    receiver: Option<RX>,
    clock: C,
    carrier_hz: u32,
    settings: CaptureConfig,
}

impl<P, RX, C> IrRemote<P, RX, C>
where
    P: PwmPin,
    P::Duty: Copy + Div<Output = P::Duty> + From<u8>,
    RX: InputPin,
    C: Clock,
{
    /// Wraps `pin`, which must already be configured for `carrier_hz`.
    pub fn new(pin: P, carrier_hz: u32, clock: C) -> Self {
        IrRemote {
            carrier: CarrierDriver::new(pin),
            receiver: None,
            clock,
            carrier_hz,
            settings: CaptureConfig::default(),
        }
    }

    pub fn with_receiver(mut self, receiver: RX) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_capture_settings(mut self, settings: CaptureConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Blocks and records the receiver line for `window_us` microseconds.
    ///
    /// `window_us` and `invert` override the configured defaults for this
    /// run only; the sample delay always comes from the settings.
    ///
    /// # Panics
    ///
    /// Panics when no receiver input was configured. Callers are expected
    /// to check [`IrRemote::has_receiver`] (or route around capture
    /// entirely) instead of probing with calls.
    pub fn capture(&mut self, window_us: u64, invert: bool) -> Result<SignalTrace, RX::Error> {
        let receiver = self
            .receiver
            .as_ref()
            .expect("capture requested without an IR receiver input configured");
        let cfg = CaptureConfig {
            window_us,
            invert,
            ..self.settings
        };
        poll_capture(receiver, &mut self.clock, &cfg)
    }

    /// Plays `trace` out through the carrier, blocking for its span.
    pub fn replay(&mut self, trace: &SignalTrace) {
        self.carrier.replay(trace, &mut self.clock);
    }

    pub fn has_receiver(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn carrier_hz(&self) -> u32 {
        self.carrier_hz
    }
}

impl<P, RX, C> IrDevice for IrRemote<P, RX, C>
where
    P: PwmPin,
    P::Duty: Copy + Div<Output = P::Duty> + From<u8>,
    RX: InputPin,
    RX::Error: Debug,
    C: Clock,
{
    fn capture(&mut self, window_us: u64, invert: bool) -> Result<SignalTrace, CaptureError> {
        IrRemote::capture(self, window_us, invert)
            .map_err(|e| CaptureError::Pin(format!("{:?}", e)))
    }

    fn replay(&mut self, trace: &SignalTrace) {
        IrRemote::replay(self, trace);
    }

    fn carrier_hz(&self) -> u32 {
        self.carrier_hz
    }

    fn can_capture(&self) -> bool {
        self.receiver.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{demo_input, RecordingPwm, ScheduledInput, VirtualClock};

    fn sim_remote(clock: &VirtualClock) -> IrRemote<RecordingPwm, ScheduledInput, VirtualClock> {
        let pwm = RecordingPwm::new(clock);
        IrRemote::new(pwm, 38_000, clock.clone())
            .with_receiver(demo_input(clock))
            .with_capture_settings(CaptureConfig {
                window_us: 250_000,
                sample_delay_us: 10,
                invert: true,
            })
    }

    #[test]
    fn test_capture_then_replay_through_trait_object() {
        let clock = VirtualClock::new();
        let mut device: Box<dyn IrDevice> = Box::new(sim_remote(&clock));
        assert!(device.can_capture());
        assert_eq!(device.carrier_hz(), 38_000);

        let trace = device.capture(250_000, true).unwrap();
        assert_eq!(trace.len(), 12, "demo burst has 12 edges");

        let before = clock.now_us();
        device.replay(&trace);
        assert_eq!(clock.now_us() - before, trace.span_us());
    }

    #[test]
    fn test_capture_override_wins_over_settings() {
        let clock = VirtualClock::new();
        let mut remote = sim_remote(&clock);
        // Inverted off: the active-low demo line reads as marks-off.
        let plain = remote.capture(250_000, false).unwrap();
        assert_eq!(plain.edges()[0].level, false);
    }

    #[test]
    fn test_receiverless_device_reports_no_capture() {
        let clock = VirtualClock::new();
        let pwm = RecordingPwm::new(&clock);
        let remote: IrRemote<RecordingPwm, ScheduledInput, VirtualClock> =
            IrRemote::new(pwm, 38_000, clock.clone());
        assert!(!remote.has_receiver());
        let device: Box<dyn IrDevice> = Box::new(remote);
        assert!(!device.can_capture());
    }

    #[test]
    #[should_panic(expected = "without an IR receiver")]
    fn test_capture_without_receiver_panics() {
        let clock = VirtualClock::new();
        let pwm = RecordingPwm::new(&clock);
        let mut remote: IrRemote<RecordingPwm, ScheduledInput, VirtualClock> =
            IrRemote::new(pwm, 38_000, clock.clone());
        let _ = remote.capture(1_000, true);
    }
}
