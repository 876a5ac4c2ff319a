use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Producer, RingBuffer};

use crate::{
    clock::Clock,
    metronome::ToneSink,
    synth::{TonePulse, VoicePool},
    Result, TrainerError,
};

/// Pending pulses between the control thread and the render callback.
const PULSE_QUEUE: usize = 64;

/// Clock derived from the number of frames the output stream has rendered.
/// Clicks are scheduled against the same timebase that plays them.
#[derive(Clone)]
pub struct SampleClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl Clock for SampleClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate
    }
}

impl std::fmt::Debug for SampleClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleClock")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Tone playback on the default output device.
///
/// The control thread pushes [`TonePulse`]es through an SPSC ring; the
/// render callback assigns them to a fixed voice pool and mixes, so the
/// audio thread never allocates or locks. Dropping the engine (or calling
/// [`AudioOutput::close`]) tears the stream down; clicks already rendered
/// into the device buffer finish naturally.
pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    clock: SampleClock,
    pulses: Producer<TonePulse>,
    healthy: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Opens the default output device and starts the render stream.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(TrainerError::DeviceUnavailable("output"))?;
        let supported = device
            .default_output_config()
            .map_err(|_| TrainerError::DeviceUnavailable("output"))?;
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let frames = Arc::new(AtomicU64::new(0));
        let healthy = Arc::new(AtomicBool::new(true));
        let (producer, mut consumer) = RingBuffer::<TonePulse>::new(PULSE_QUEUE);
        let clock = SampleClock {
            frames: frames.clone(),
            sample_rate: f64::from(sample_rate),
        };

        let mut pool = VoicePool::new();
        let rate = sample_rate as f32;
        let render_frames = frames.clone();
        let stream_health = healthy.clone();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let start = render_frames.load(Ordering::Acquire);
                    let now = start as f64 / f64::from(rate);
                    while let Ok(pulse) = consumer.pop() {
                        pool.trigger(&pulse, now, rate);
                    }

                    let mut rendered = 0;
                    for frame in data.chunks_mut(channels) {
                        let sample = pool.next_sample(rate);
                        for out in frame {
                            *out = sample;
                        }
                        rendered += 1;
                    }
                    render_frames.store(start + rendered, Ordering::Release);
                },
                move |err| {
                    tracing::warn!(%err, "output stream error");
                    stream_health.store(false, Ordering::Release);
                },
                None,
            )
            .map_err(TrainerError::backend)?;
        stream.play().map_err(TrainerError::backend)?;
        tracing::debug!(sample_rate, channels, "output stream started");

        Ok(Self {
            stream: Some(stream),
            clock,
            pulses: producer,
            healthy,
        })
    }

    /// Handle onto the stream's sample clock.
    pub fn clock(&self) -> SampleClock {
        self.clock.clone()
    }

    /// Stops playback and releases the device.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("output stream closed");
        }
    }
}

impl ToneSink for AudioOutput {
    fn ensure_ready(&mut self) -> Result<()> {
        if self.stream.is_some() && self.healthy.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TrainerError::DeviceUnavailable("output"))
        }
    }

    fn schedule(&mut self, pulse: TonePulse) -> Result<()> {
        self.pulses
            .push(pulse)
            .map_err(|_| TrainerError::backend("tone queue full"))
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}
