//! Board assembly: turns CLI options into a working set of peripherals.
//!
//! Two backends exist. The simulated one is always compiled and backs both
//! `--simulate` and the test suite. The Raspberry Pi one sits behind the
//! `rpi` feature so the daemon builds on any host.

use parrot_shared::sim::{demo_input, RecordingPwm, SimLed, VirtualClock};
use parrot_shared::{CaptureConfig, IrDevice, IrRemote};

/// Indicator LED, whatever is behind it.
pub trait StatusLed {
    fn set_lit(&mut self, lit: bool);
}

impl StatusLed for SimLed {
    fn set_lit(&mut self, lit: bool) {
        self.set(lit);
    }
}

/// Everything the daemon needs from the hardware.
pub struct Board {
    pub ir: Box<dyn IrDevice>,
    pub led: Option<Box<dyn StatusLed>>,
}

/// A board made of simulated parts: virtual clock, a repeating demo burst
/// on the receiver line, a recording PWM and a flag-backed LED.
pub fn simulated_board(carrier_hz: u32, settings: CaptureConfig) -> Board {
    let clock = VirtualClock::new();
    let pwm = RecordingPwm::new(&clock);
    let remote = IrRemote::new(pwm, carrier_hz, clock.clone())
        .with_receiver(demo_input(&clock))
        .with_capture_settings(settings);
    Board {
        ir: Box::new(remote),
        led: Some(Box::new(SimLed::new())),
    }
}

#[cfg(feature = "rpi")]
pub use self::rpi::rpi_board;

#[cfg(feature = "rpi")]
mod rpi {
    //! Raspberry Pi backend: hardware PWM for the carrier, GPIO for the
    //! receiver and LED. BCM pin numbering throughout.

    use std::convert::Infallible;

    use anyhow::{bail, Context};
    use embedded_hal::digital::v2::InputPin;
    use embedded_hal::PwmPin;
    use rppal::gpio::Gpio;
    use rppal::pwm::{Channel, Polarity, Pwm};

    use parrot_shared::{CaptureConfig, IrRemote, StdClock};

    use super::{Board, StatusLed};

    /// Hardware PWM as a [`PwmPin`] with duty on a 0.0..=1.0 scale.
    ///
    /// rppal's calls can fail at runtime (sysfs goes away, permissions);
    /// the embedded-hal 0.2 trait has no error channel, so failures are
    /// logged and the write is dropped.
    pub struct RpiCarrierPin {
        pwm: Pwm,
    }

    impl PwmPin for RpiCarrierPin {
        type Duty = f64;

        fn disable(&mut self) {
            if let Err(err) = self.pwm.disable() {
                log::warn!("disabling carrier PWM failed: {}", err);
            }
        }

        fn enable(&mut self) {
            if let Err(err) = self.pwm.enable() {
                log::warn!("enabling carrier PWM failed: {}", err);
            }
        }

        fn get_duty(&self) -> f64 {
            self.pwm.duty_cycle().unwrap_or(0.0)
        }

        fn get_max_duty(&self) -> f64 {
            1.0
        }

        fn set_duty(&mut self, duty: f64) {
            if let Err(err) = self.pwm.set_duty_cycle(duty) {
                log::warn!("carrier duty write failed: {}", err);
            }
        }
    }

    pub struct RpiIrInput {
        pin: rppal::gpio::InputPin,
    }

    impl InputPin for RpiIrInput {
        type Error = Infallible;

        fn is_high(&self) -> Result<bool, Infallible> {
            Ok(self.pin.is_high())
        }

        fn is_low(&self) -> Result<bool, Infallible> {
            Ok(self.pin.is_low())
        }
    }

    struct RpiLed {
        pin: rppal::gpio::OutputPin,
    }

    impl StatusLed for RpiLed {
        fn set_lit(&mut self, lit: bool) {
            if lit {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        }
    }

    /// Opens the Pi peripherals and assembles a board from them.
    pub fn rpi_board(
        carrier_hz: u32,
        pwm_channel: u8,
        input_pin: Option<u8>,
        led_pin: Option<u8>,
        settings: CaptureConfig,
    ) -> anyhow::Result<Board> {
        let channel = match pwm_channel {
            0 => Channel::Pwm0,
            1 => Channel::Pwm1,
            other => bail!("PWM channel must be 0 or 1, got {}", other),
        };
        let pwm = Pwm::with_frequency(channel, f64::from(carrier_hz), 0.0, Polarity::Normal, true)
            .context("opening hardware PWM for the carrier")?;
        let gpio = Gpio::new().context("opening GPIO")?;

        let mut remote = IrRemote::<RpiCarrierPin, RpiIrInput, StdClock>::new(
            RpiCarrierPin { pwm },
            carrier_hz,
            StdClock::new(),
        )
        .with_capture_settings(settings);
        if let Some(bcm) = input_pin {
            let pin = gpio
                .get(bcm)
                .with_context(|| format!("claiming IR receiver pin {}", bcm))?
                .into_input();
            remote = remote.with_receiver(RpiIrInput { pin });
        } else {
            log::warn!("no IR receiver pin given, capture will be unavailable");
        }

        let led = match led_pin {
            Some(bcm) => {
                let pin = gpio
                    .get(bcm)
                    .with_context(|| format!("claiming LED pin {}", bcm))?
                    .into_output();
                Some(Box::new(RpiLed { pin }) as Box<dyn StatusLed>)
            }
            None => None,
        };

        Ok(Board {
            ir: Box::new(remote),
            led,
        })
    }
}
