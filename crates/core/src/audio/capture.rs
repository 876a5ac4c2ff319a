use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, RingBuffer};

use crate::{Result, TrainerError};

/// Seconds of audio the capture ring can hold before old samples are shed.
const CAPTURE_BUFFER_SECONDS: f64 = 0.5;

/// Microphone capture on the default input device.
///
/// The stream callback downmixes to mono and pushes into an SPSC ring;
/// the detector drains the ring once per tick on the control thread. The
/// stream is released by [`InputCapture::close`] or on drop, so a failed
/// or abandoned session never leaks the device.
pub struct InputCapture {
    stream: Option<cpal::Stream>,
    samples: Consumer<f32>,
    sample_rate: u32,
}

impl InputCapture {
    /// Opens the default input device and starts capturing.
    ///
    /// Permission or hardware failures surface as
    /// [`TrainerError::DeviceUnavailable`]; the caller decides whether to
    /// report or retry.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(TrainerError::DeviceUnavailable("input"))?;
        let supported = device
            .default_input_config()
            .map_err(|_| TrainerError::DeviceUnavailable("input"))?;
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let capacity = (f64::from(sample_rate) * CAPTURE_BUFFER_SECONDS) as usize;
        let (mut producer, consumer) = RingBuffer::<f32>::new(capacity.max(1));

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        let mono = frame.iter().sum::<f32>() / channels as f32;
                        if producer.push(mono).is_err() {
                            // Ring full: the detector has fallen behind and
                            // the freshest window it holds still wins.
                            break;
                        }
                    }
                },
                |err| tracing::warn!(%err, "input stream error"),
                None,
            )
            .map_err(|err| match err {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    TrainerError::DeviceUnavailable("input")
                }
                other => TrainerError::backend(other),
            })?;
        stream.play().map_err(TrainerError::backend)?;
        tracing::debug!(sample_rate, channels, "input stream started");

        Ok(Self {
            stream: Some(stream),
            samples: consumer,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Moves everything captured since the last call into `sink`,
    /// replacing its previous contents. Bounded by the ring capacity.
    pub fn drain_into(&mut self, sink: &mut Vec<f32>) {
        sink.clear();
        while let Ok(sample) = self.samples.pop() {
            sink.push(sample);
        }
    }

    /// Stops capturing and releases the device.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("input stream closed");
        }
    }
}

impl Drop for InputCapture {
    fn drop(&mut self) {
        self.close();
    }
}
