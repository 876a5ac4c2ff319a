//! Core library for the strum trainer application.
//!
//! Two cooperative real-time engines share this crate: a look-ahead
//! metronome that commits click events ahead of the playback clock, and a
//! strum detector that reduces live input to an energy envelope and gates
//! it through a debounced hysteresis latch. Each module owns a distinct
//! subsystem (clock sources, device I/O, spectral analysis, scheduling,
//! detection) and the engines are plain owned values with their clock and
//! sinks injected, so several can coexist and tests can drive them
//! deterministically.

pub mod analysis;
pub mod audio;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod metronome;
pub mod synth;

pub use analysis::SpectralEnergy;
pub use audio::{AudioOutput, InputCapture, SampleClock};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, DetectorConfig, MetronomeConfig};
pub use detector::{OnsetGate, StrumDetector, StrumEvent};
pub use error::{Result, TrainerError};
pub use metronome::{BeatEvent, Metronome, ToneSink};
pub use synth::{ClickVoice, TonePulse, VoicePool};
