//! Carrier control: gates a fixed-frequency PWM output on and off to
//! reproduce a recorded trace.

use std::ops::Div;

use embedded_hal::PwmPin;

use crate::clock::Clock;
use crate::trace::{Edge, SignalTrace};

/// Drives the IR emitter through any [`PwmPin`].
///
/// The pin's frequency is configured by whoever constructs it; this driver
/// only ever touches the duty cycle. Mark is roughly 50% duty (half of the
/// pin's full scale), space and idle are 0%.
pub struct CarrierDriver<P> {
    pin: P,
}

impl<P> CarrierDriver<P>
where
    P: PwmPin,
    P::Duty: Copy + Div<Output = P::Duty> + From<u8>,
{
    /// Takes over the pin, forces it idle and enables the output.
    pub fn new(mut pin: P) -> Self {
        pin.set_duty(P::Duty::from(0u8));
        pin.enable();
        CarrierDriver { pin }
    }

    /// Carrier on: half of the pin's full duty scale.
    pub fn set_active(&mut self) {
        let half = self.pin.get_max_duty() / P::Duty::from(2u8);
        self.pin.set_duty(half);
    }

    /// Carrier off.
    pub fn set_idle(&mut self) {
        self.pin.set_duty(P::Duty::from(0u8));
    }

    fn set_level(&mut self, level: bool) {
        if level {
            self.set_active();
        } else {
            self.set_idle();
        }
    }

    /// Plays back `trace` against real time as told by `clock`.
    ///
    /// Each edge's level is applied at its timestamp; the final edge's level
    /// is applied and then the carrier is forced idle, so the line never
    /// stays on after playback. An empty trace does nothing at all.
    ///
    /// Blocks for the full span of the trace.
    pub fn replay<C: Clock>(&mut self, trace: &SignalTrace, clock: &mut C) {
        if trace.is_empty() {
            log::info!("No signal data to send.");
            return;
        }
        log::debug!("replaying {} edges over {} us", trace.len(), trace.span_us());
        self.replay_edges(trace.edges(), clock);
        log::info!("IR signal sent successfully.");
    }

    /// Playback over a bare edge slice.
    ///
    /// Validated traces always advance in time; should an interval still
    /// come out non-positive, only the wait is skipped and the level write
    /// goes ahead, so playback degrades to "too fast" instead of hanging or
    /// dying mid-signal. The carrier ends up idle on every path out.
    pub(crate) fn replay_edges<C: Clock>(&mut self, edges: &[Edge], clock: &mut C) {
        let tx = IdleOnDrop { driver: self };
        for pair in edges.windows(2) {
            tx.driver.set_level(pair[0].level);
            match pair[1].ts_us.checked_sub(pair[0].ts_us) {
                Some(d) if d > 0 => clock.delay_us(d),
                _ => {}
            }
        }
        if let Some(last) = edges.last() {
            tx.driver.set_level(last.level);
        }
    }

    /// Gives the pin back, leaving the driver's idle guarantee behind.
    pub fn release(mut self) -> P {
        self.set_idle();
        self.pin
    }
}

struct IdleOnDrop<'a, P>
where
    P: PwmPin,
    P::Duty: Copy + Div<Output = P::Duty> + From<u8>,
{
    driver: &'a mut CarrierDriver<P>,
}

impl<'a, P> Drop for IdleOnDrop<'a, P>
where
    P: PwmPin,
    P::Duty: Copy + Div<Output = P::Duty> + From<u8>,
{
    fn drop(&mut self) {
        self.driver.set_idle();
    }
}
