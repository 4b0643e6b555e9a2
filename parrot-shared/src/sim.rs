//! Simulated hardware: a virtual clock plus pins that run against it.
//!
//! These back the `--simulate` mode of the daemon and every timing test in
//! the crate. They are deliberately single threaded (`Rc`, not `Arc`), same
//! as the capture and replay paths that drive them.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_hal::PwmPin;

use crate::clock::Clock;

/// A clock that only moves when someone calls [`Clock::delay_us`].
///
/// Clones share the same underlying counter, so a pin holding a clone sees
/// exactly the instants at which the driver code delayed.
#[derive(Clone, Default)]
pub struct VirtualClock {
    now: Rc<Cell<u64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock::default()
    }
}

impl Clock for VirtualClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }

    fn delay_us(&mut self, us: u64) {
        self.now.set(self.now.get() + us);
    }
}

/// An input line that follows a fixed schedule of level changes.
///
/// The line sits at `idle_level` until the first scheduled transition, then
/// holds each scheduled level until the next one. With a repeat period the
/// schedule wraps around, which models a remote button held down.
pub struct ScheduledInput {
    clock: VirtualClock,
    idle_level: bool,
    transitions: Vec<(u64, bool)>,
    period_us: Option<u64>,
}

impl ScheduledInput {
    pub fn new(clock: &VirtualClock, idle_level: bool, mut transitions: Vec<(u64, bool)>) -> Self {
        transitions.sort_by_key(|t| t.0);
        ScheduledInput {
            clock: clock.clone(),
            idle_level,
            transitions,
            period_us: None,
        }
    }

    pub fn repeating(
        clock: &VirtualClock,
        idle_level: bool,
        period_us: u64,
        transitions: Vec<(u64, bool)>,
    ) -> Self {
        let mut input = ScheduledInput::new(clock, idle_level, transitions);
        input.period_us = Some(period_us);
        input
    }

    /// A line that never changes state.
    pub fn silent(clock: &VirtualClock, idle_level: bool) -> Self {
        ScheduledInput::new(clock, idle_level, Vec::new())
    }

    fn level_at(&self, ts_us: u64) -> bool {
        let t = match self.period_us {
            Some(period) if period > 0 => ts_us % period,
            _ => ts_us,
        };
        self.transitions
            .iter()
            .rev()
            .find(|(at, _)| *at <= t)
            .map(|(_, level)| *level)
            .unwrap_or(self.idle_level)
    }
}

impl InputPin for ScheduledInput {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.level_at(self.clock.now_us()))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.level_at(self.clock.now_us()))
    }
}

/// One duty-cycle write, as seen by [`RecordingPwm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmEvent {
    pub ts_us: u64,
    pub duty: u16,
}

/// PWM output that records every duty write together with the virtual time.
pub struct RecordingPwm {
    clock: VirtualClock,
    duty: u16,
    enabled: bool,
    events: Rc<RefCell<Vec<PwmEvent>>>,
}

impl RecordingPwm {
    const MAX_DUTY: u16 = 1000;

    pub fn new(clock: &VirtualClock) -> Self {
        RecordingPwm {
            clock: clock.clone(),
            duty: 0,
            enabled: false,
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle onto the event log; stays valid after the pin moves into a
    /// driver.
    pub fn events(&self) -> Rc<RefCell<Vec<PwmEvent>>> {
        Rc::clone(&self.events)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl PwmPin for RecordingPwm {
    type Duty = u16;

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn get_duty(&self) -> u16 {
        self.duty
    }

    fn get_max_duty(&self) -> u16 {
        Self::MAX_DUTY
    }

    fn set_duty(&mut self, duty: u16) {
        self.duty = duty;
        self.events.borrow_mut().push(PwmEvent {
            ts_us: self.clock.now_us(),
            duty,
        });
    }
}

/// Indicator LED backed by a shared flag instead of a GPIO line.
pub struct SimLed {
    lit: Rc<Cell<bool>>,
}

impl SimLed {
    pub fn new() -> Self {
        SimLed {
            lit: Rc::new(Cell::new(false)),
        }
    }

    /// Handle for observing the LED state from outside.
    pub fn handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.lit)
    }

    pub fn set(&mut self, lit: bool) {
        self.lit.set(lit);
    }

    pub fn is_lit(&self) -> bool {
        self.lit.get()
    }
}

impl Default for SimLed {
    fn default() -> Self {
        SimLed::new()
    }
}

impl OutputPin for SimLed {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.lit.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.lit.set(true);
        Ok(())
    }
}

/// Input schedule used by simulated boards: a 12-edge burst of 600 us
/// half-periods, 20 ms into every 250 ms repeat window, on an active-low
/// line. Long enough to look like a real remote, short enough for tests.
pub fn demo_input(clock: &VirtualClock) -> ScheduledInput {
    let mut transitions = Vec::new();
    let mut t = 20_000;
    for _ in 0..6 {
        transitions.push((t, false));
        t += 600;
        transitions.push((t, true));
        t += 600;
    }
    ScheduledInput::repeating(clock, true, 250_000, transitions)
}
