//! Core of the parrot IR transceiver: normalized edge traces, polled
//! capture, carrier playback and the simulated hardware used for testing.
//!
//! Everything in here is single threaded and blocking. Time is abstracted
//! behind [`clock::Clock`] and pins behind embedded-hal traits, so the same
//! code runs against GPIO hardware and against the simulator.

pub mod capture;
pub mod carrier;
pub mod clock;
pub mod device;
pub mod sim;
pub mod trace;

pub use capture::{poll_capture, CaptureConfig, DEFAULT_SAMPLE_DELAY_US, DEFAULT_WINDOW_US};
pub use carrier::CarrierDriver;
pub use clock::{Clock, StdClock};
pub use device::{CaptureError, IrDevice, IrRemote};
pub use trace::{Edge, EdgeRecorder, SignalTrace, TraceError};
