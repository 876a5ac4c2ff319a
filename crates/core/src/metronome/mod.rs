use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::{clock::Clock, config::MetronomeConfig, synth::TonePulse, Result};

/// Slowest supported tempo in beats per minute.
pub const MIN_BPM: u32 = 30;
/// Fastest supported tempo in beats per minute.
pub const MAX_BPM: u32 = 300;
/// Longest supported bar.
pub const MAX_BEATS_PER_BAR: u32 = 16;

/// Pitch of the accent click on beat 0 of each bar.
pub const ACCENT_FREQUENCY: f32 = 1000.0;
/// Pitch of every other click.
pub const BEAT_FREQUENCY: f32 = 800.0;

/// Capacity of the beat notification channel. At the fastest tempo this
/// holds more than twelve seconds of beats, so events are only shed when
/// the consumer has effectively stopped reading.
const EVENT_QUEUE: usize = 64;

/// Destination for scheduled clicks.
///
/// The live implementation is the cpal output engine; tests substitute a
/// recording sink and drive the scheduler with a manual clock.
pub trait ToneSink {
    /// Called once by `start()`. Failing leaves the metronome stopped.
    fn ensure_ready(&mut self) -> Result<()> {
        Ok(())
    }

    /// Commits one click to the timeline. Pulses arrive in strictly
    /// increasing start-time order.
    fn schedule(&mut self, pulse: TonePulse) -> Result<()>;
}

/// A beat committed to the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Index of the beat within its bar, cycling `0..beats_per_bar`.
    pub beat_in_bar: u32,
    /// Absolute scheduled time on the metronome's clock, in seconds.
    pub time: f64,
}

impl BeatEvent {
    /// Whether this beat carries the bar-start accent.
    pub fn is_accent(&self) -> bool {
        self.beat_in_bar == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Stopped,
    Running,
}

/// Look-ahead click scheduler.
///
/// A short host-driven `tick` cadence combined with a larger scheduling
/// horizon means each pass commits however many beats currently fit the
/// window, so coarse or starved invocation timing never drops or delays a
/// beat. Tempo and signature changes apply to beats not yet committed;
/// events already handed to the tone sink keep their times.
pub struct Metronome<S: ToneSink> {
    clock: Arc<dyn Clock>,
    sink: S,
    bpm: AtomicU32,
    beats_per_bar: AtomicU32,
    schedule_ahead: f64,
    start_lead: f64,
    transport: Transport,
    next_beat_time: f64,
    beat_in_bar: u32,
    pending: VecDeque<BeatEvent>,
    events_tx: Sender<BeatEvent>,
    events_rx: Receiver<BeatEvent>,
}

impl<S: ToneSink> Metronome<S> {
    pub fn new(clock: Arc<dyn Clock>, sink: S, config: &MetronomeConfig) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE);
        Self {
            clock,
            sink,
            bpm: AtomicU32::new(config.bpm.clamp(MIN_BPM, MAX_BPM)),
            beats_per_bar: AtomicU32::new(config.beats_per_bar.clamp(1, MAX_BEATS_PER_BAR)),
            schedule_ahead: config.schedule_ahead,
            start_lead: config.start_lead,
            transport: Transport::Stopped,
            next_beat_time: 0.0,
            beat_in_bar: 0,
            pending: VecDeque::new(),
            events_tx,
            events_rx,
        }
    }

    /// Current tempo in beats per minute.
    pub fn tempo(&self) -> u32 {
        self.bpm.load(Ordering::Relaxed)
    }

    /// Updates the tempo. Takes effect for beats not yet scheduled;
    /// committed beats keep their absolute times.
    pub fn set_tempo(&self, bpm: u32) {
        self.bpm.store(bpm.clamp(MIN_BPM, MAX_BPM), Ordering::Relaxed);
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar.load(Ordering::Relaxed)
    }

    /// Updates the bar length. Affects only the beat-index modulo of
    /// not-yet-scheduled beats, never the inter-beat interval.
    pub fn set_beats_per_bar(&self, beats: u32) {
        self.beats_per_bar
            .store(beats.clamp(1, MAX_BEATS_PER_BAR), Ordering::Relaxed);
    }

    /// Receiver for time-aligned beat notifications. Events are released
    /// once their scheduled time arrives, in beat order, so a display
    /// consumer stays in step with the audible click.
    pub fn events(&self) -> Receiver<BeatEvent> {
        self.events_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.transport == Transport::Running
    }

    /// Begins scheduling from the top of a bar. A small lead keeps the
    /// first click out of the past. No-op when already running; if the
    /// tone sink is unavailable the error is returned and the metronome
    /// stays stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.transport == Transport::Running {
            return Ok(());
        }
        self.sink.ensure_ready()?;
        self.beat_in_bar = 0;
        self.next_beat_time = self.clock.now() + self.start_lead;
        self.pending.clear();
        self.transport = Transport::Running;
        tracing::debug!(bpm = self.tempo(), beats = self.beats_per_bar(), "metronome started");
        Ok(())
    }

    /// Stops scheduling. Idempotent. Clicks already committed to the tone
    /// sink finish naturally; undelivered beat notifications are dropped
    /// so no further events fire after this call returns.
    pub fn stop(&mut self) {
        if self.transport == Transport::Stopped {
            return;
        }
        self.transport = Transport::Stopped;
        self.pending.clear();
        tracing::debug!("metronome stopped");
    }

    /// One scheduling pass. The host invokes this on a short fixed cadence
    /// (`MetronomeConfig::tick_interval`); each pass is non-blocking and
    /// does O(beats-in-window) work. Does nothing when stopped.
    pub fn tick(&mut self) -> Result<()> {
        if self.transport != Transport::Running {
            return Ok(());
        }

        let now = self.clock.now();
        let horizon = now + self.schedule_ahead;
        while self.next_beat_time < horizon {
            let beat = BeatEvent {
                beat_in_bar: self.beat_in_bar,
                time: self.next_beat_time,
            };
            let frequency = if beat.is_accent() {
                ACCENT_FREQUENCY
            } else {
                BEAT_FREQUENCY
            };
            self.sink.schedule(TonePulse::click(beat.time, frequency))?;
            self.pending.push_back(beat);

            self.next_beat_time += 60.0 / f64::from(self.tempo());
            self.beat_in_bar = (self.beat_in_bar + 1) % self.beats_per_bar();
        }

        self.release_due(now);
        Ok(())
    }

    /// Releases queued notifications whose scheduled time has arrived.
    /// Driven by the same look-ahead pass that schedules the audio, so the
    /// displayed beat tracks the audible one.
    fn release_due(&mut self, now: f64) {
        while self
            .pending
            .front()
            .is_some_and(|beat| beat.time <= now)
        {
            let Some(beat) = self.pending.pop_front() else {
                break;
            };
            match self.events_tx.try_send(beat) {
                Ok(()) => {}
                Err(TrySendError::Full(beat)) => {
                    tracing::warn!(beat = beat.beat_in_bar, "beat notification dropped");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

impl<S: ToneSink> std::fmt::Debug for Metronome<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metronome")
            .field("bpm", &self.tempo())
            .field("beats_per_bar", &self.beats_per_bar())
            .field("running", &self.is_running())
            .finish()
    }
}
