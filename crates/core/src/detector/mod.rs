use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::{
    analysis::SpectralEnergy, audio::InputCapture, clock::Clock, config::DetectorConfig, Result,
};

/// Capacity of the strum notification channel.
const EVENT_QUEUE: usize = 64;

/// One detected strum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrumEvent {
    /// Detection time on the detector's clock, in seconds.
    pub time: f64,
    /// Energy scalar that crossed the trigger threshold.
    pub energy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Latch {
    Armed,
    Triggered,
}

/// Hysteresis-and-debounce latch over the energy envelope.
///
/// Pure state machine: triggering requires an armed latch, energy above
/// the upper threshold and an elapsed debounce window; only energy below
/// the lower threshold re-arms. The gap between the thresholds keeps a
/// sustained strum hovering near one boundary from chattering, and the
/// silence-gated reset keeps it from multi-firing outright.
///
/// This is a coarse energy-envelope detector, not spectral-flux or pitch
/// onset detection. Replacements must keep the contract: one event per
/// physical strum, re-armed only by a quiet gap.
#[derive(Debug)]
pub struct OnsetGate {
    upper: f32,
    lower: f32,
    debounce: f64,
    latch: Latch,
    last_trigger: f64,
}

impl OnsetGate {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            upper: config.upper_threshold,
            lower: config.lower_threshold,
            debounce: config.debounce_window,
            latch: Latch::Armed,
            last_trigger: f64::NEG_INFINITY,
        }
    }

    /// Feeds one energy sample taken at `now`. Returns `true` exactly when
    /// a new onset is accepted.
    pub fn feed(&mut self, energy: f32, now: f64) -> bool {
        if self.latch == Latch::Armed
            && energy > self.upper
            && now - self.last_trigger > self.debounce
        {
            self.latch = Latch::Triggered;
            self.last_trigger = now;
            return true;
        }
        if energy < self.lower {
            self.latch = Latch::Armed;
        }
        false
    }
}

/// Live resources held for the span of one listening session.
struct Listening {
    capture: InputCapture,
    energy: SpectralEnergy,
    gate: OnsetGate,
    events: Sender<StrumEvent>,
    scratch: Vec<f32>,
}

/// Strum detection over the default input device.
///
/// `start` acquires the microphone and returns the event receiver; the
/// host then invokes [`StrumDetector::tick`] once per display-refresh
/// interval, and each tick performs one fixed-cost sample-and-decide
/// step. `stop` releases everything and may be called at any time.
pub struct StrumDetector {
    clock: Arc<dyn Clock>,
    config: DetectorConfig,
    session: Option<Listening>,
}

impl StrumDetector {
    pub fn new(clock: Arc<dyn Clock>, config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clock,
            config,
            session: None,
        })
    }

    /// Acquires the input stream and begins a listening session, returning
    /// the receiver strum notifications arrive on.
    ///
    /// Fails with [`crate::TrainerError::DeviceUnavailable`] when the
    /// microphone cannot be acquired; nothing is retried internally and
    /// the detector is left cleanly not-listening. A session that is
    /// already live is torn down first, releasing its device before the
    /// new acquisition.
    pub fn start(&mut self) -> Result<Receiver<StrumEvent>> {
        self.stop();

        let capture = InputCapture::open()?;
        let energy = SpectralEnergy::new(&self.config);
        let gate = OnsetGate::new(&self.config);
        let (events, receiver) = bounded(EVENT_QUEUE);
        let scratch = Vec::with_capacity(capture.sample_rate() as usize / 2);
        self.session = Some(Listening {
            capture,
            energy,
            gate,
            events,
            scratch,
        });
        tracing::debug!("strum detector listening");
        Ok(receiver)
    }

    /// One sample-and-decide step: drain the capture ring, reduce the
    /// newest window to an energy scalar and feed the latch. Does nothing
    /// when not listening.
    pub fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Listening {
            capture,
            energy,
            gate,
            events,
            scratch,
        } = session;

        capture.drain_into(scratch);
        energy.extend(scratch);
        let value = energy.sample()?;
        if gate.feed(value, now) {
            match events.try_send(StrumEvent {
                time: now,
                energy: value,
            }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("strum notification dropped");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        Ok(())
    }

    /// Ends the listening session and releases the input stream and
    /// analysis resources. Synchronous and idempotent; safe to call when
    /// never started.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.capture.close();
            tracing::debug!("strum detector stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }
}

impl std::fmt::Debug for StrumDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrumDetector")
            .field("listening", &self.is_listening())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> OnsetGate {
        OnsetGate::new(&DetectorConfig::default())
    }

    #[test]
    fn spike_then_silence_then_spike_yields_two_events() {
        let mut gate = gate();
        assert!(gate.feed(20.0, 0.0));
        assert!(!gate.feed(0.0, 0.05));
        assert!(gate.feed(20.0, 0.4));
    }

    #[test]
    fn sustained_energy_fires_once() {
        let mut gate = gate();
        let mut events = 0;
        let mut now = 0.0;
        while now < 1.0 {
            if gate.feed(20.0, now) {
                events += 1;
            }
            now += 0.016;
        }
        assert_eq!(events, 1);
    }

    #[test]
    fn hovering_above_upper_without_reset_cannot_chatter() {
        let mut gate = gate();
        let mut events = 0;
        // Oscillates between just above and just below the upper threshold
        // but never drops below the lower one.
        for (step, energy) in [16.0, 14.0, 16.0, 14.0, 16.0, 14.0, 16.0]
            .iter()
            .enumerate()
        {
            if gate.feed(*energy, step as f64 * 0.2) {
                events += 1;
            }
        }
        assert_eq!(events, 1);
    }

    #[test]
    fn spike_inside_debounce_is_suppressed_but_leaves_the_gate_armed() {
        let mut gate = gate();
        assert!(gate.feed(20.0, 0.0));
        assert!(!gate.feed(0.0, 0.1));
        // Re-armed, above upper, but still inside the debounce window.
        assert!(!gate.feed(20.0, 0.2));
        // Once the window elapses the armed gate accepts the sustained spike.
        assert!(gate.feed(20.0, 0.35));
    }

    #[test]
    fn boundary_values_do_not_trigger_or_reset() {
        let mut gate = gate();
        // Exactly the upper threshold is not "above" it.
        assert!(!gate.feed(15.0, 0.0));
        assert!(gate.feed(15.1, 1.0));
        // Exactly the lower threshold does not re-arm.
        assert!(!gate.feed(10.0, 1.1));
        assert!(!gate.feed(20.0, 2.0));
        // Below it does.
        assert!(!gate.feed(9.9, 2.1));
        assert!(gate.feed(20.0, 3.0));
    }

    #[test]
    fn first_trigger_needs_no_prior_silence() {
        let mut gate = gate();
        // last-trigger starts at negative infinity, so the debounce window
        // is always considered elapsed for the first event.
        assert!(gate.feed(100.0, 0.0));
    }

    #[test]
    fn detector_stop_without_start_is_a_no_op() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut detector = StrumDetector::new(clock, DetectorConfig::default()).unwrap();
        assert!(!detector.is_listening());
        detector.stop();
        detector.stop();
        assert!(!detector.is_listening());
        // Ticking while not listening is also a no-op.
        detector.tick().unwrap();
    }

    #[test]
    fn detector_rejects_invalid_config() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let config = DetectorConfig {
            upper_threshold: 5.0,
            lower_threshold: 10.0,
            ..DetectorConfig::default()
        };
        assert!(StrumDetector::new(clock, config).is_err());
    }
}
