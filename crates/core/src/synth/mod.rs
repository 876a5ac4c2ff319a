use std::f32::consts::TAU;

/// Length of one click from onset to hard stop, in seconds.
pub const CLICK_DURATION: f64 = 0.03;
/// Portion of the click over which the envelope decays to the floor.
const DECAY_TIME: f64 = 0.02;
/// Residual gain the envelope decays to before the hard stop.
const DECAY_FLOOR: f32 = 1e-3;
/// Output level of a freshly triggered click.
const CLICK_LEVEL: f32 = 0.8;

/// A percussive pulse committed to an absolute time on the output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TonePulse {
    /// Absolute start time in seconds on the tone sink's clock.
    pub start_time: f64,
    /// Sine frequency in Hz. Bar starts use a higher, accented pitch.
    pub frequency: f32,
    /// Pulse length in seconds.
    pub duration: f64,
}

impl TonePulse {
    /// A standard metronome click at the given time and pitch.
    pub fn click(start_time: f64, frequency: f32) -> Self {
        Self {
            start_time,
            frequency,
            duration: CLICK_DURATION,
        }
    }
}

/// Renders one [`TonePulse`] sample-by-sample inside the output callback.
///
/// A voice is a sine oscillator under an exponential decay envelope, with
/// a sample countdown standing in for the scheduled start delay so the
/// callback needs no clock reads of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickVoice {
    frequency: f32,
    phase: f32,
    gain: f32,
    decay: f32,
    delay_samples: u32,
    samples_left: u32,
    active: bool,
}

impl ClickVoice {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of samples until this voice falls silent, including any
    /// remaining start delay.
    fn remaining(&self) -> u32 {
        self.delay_samples.saturating_add(self.samples_left)
    }

    /// Arms the voice for `pulse`, with the start delay measured from `now`
    /// on the same clock the pulse was scheduled against. Pulses whose time
    /// has already passed begin immediately.
    pub fn trigger(&mut self, pulse: &TonePulse, now: f64, sample_rate: f32) {
        let delay = (pulse.start_time - now).max(0.0);
        self.delay_samples = (delay * f64::from(sample_rate)) as u32;
        self.samples_left = (pulse.duration * f64::from(sample_rate)) as u32;
        self.frequency = pulse.frequency;
        self.phase = 0.0;
        self.gain = CLICK_LEVEL;
        self.decay = decay_per_sample(sample_rate);
        self.active = true;
    }

    /// Produces the next output sample, advancing the envelope.
    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        if !self.active {
            return 0.0;
        }
        if self.delay_samples > 0 {
            self.delay_samples -= 1;
            return 0.0;
        }
        if self.samples_left == 0 {
            self.active = false;
            return 0.0;
        }

        let value = (self.phase * TAU).sin() * self.gain;
        self.phase = (self.phase + self.frequency / sample_rate).fract();
        self.gain *= self.decay;
        self.samples_left -= 1;
        value
    }
}

/// Per-sample gain multiplier that reaches [`DECAY_FLOOR`] after
/// [`DECAY_TIME`] seconds.
fn decay_per_sample(sample_rate: f32) -> f32 {
    let samples = (DECAY_TIME * f64::from(sample_rate)).max(1.0) as f32;
    DECAY_FLOOR.powf(1.0 / samples)
}

/// Fixed-size pool of click voices mixed inside the audio callback.
///
/// The pool never allocates after construction. When every voice is busy,
/// the one closest to finishing is stolen.
#[derive(Debug, Clone)]
pub struct VoicePool {
    voices: [ClickVoice; Self::CAPACITY],
}

impl VoicePool {
    pub const CAPACITY: usize = 8;

    pub fn new() -> Self {
        Self {
            voices: [ClickVoice::default(); Self::CAPACITY],
        }
    }

    /// Assigns `pulse` to an idle voice, stealing the most-finished voice
    /// when none is idle.
    pub fn trigger(&mut self, pulse: &TonePulse, now: f64, sample_rate: f32) {
        let slot = self
            .voices
            .iter_mut()
            .min_by_key(|voice| if voice.is_active() { voice.remaining() } else { 0 });
        if let Some(voice) = slot {
            voice.trigger(pulse, now, sample_rate);
        }
    }

    /// Mixes the next sample across all active voices.
    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        self.voices
            .iter_mut()
            .map(|voice| voice.next_sample(sample_rate))
            .sum()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }
}

impl Default for VoicePool {
    fn default() -> Self {
        Self::new()
    }
}
