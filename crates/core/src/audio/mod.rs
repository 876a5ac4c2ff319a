//! cpal device layer shared by the tone emitter and the signal sampler.
//!
//! Device handles are acquired in the engines' `start` paths and released
//! on `stop` or drop, so every exit path gives the hardware back.

mod capture;
mod output;

pub use capture::InputCapture;
pub use output::{AudioOutput, SampleClock};
