/*!
Bridges audio playback lifecycle events to per-frame lip sync state.

The audio side calls [SpeechHooks] whenever it feels like it, the render loop
calls [SpeechCoordinator::tick] once per frame. Both run on the same thread, so
the only rule is that the most recent hook call wins.
*/

use chrono::{DateTime, Utc};
use log::{debug, trace};

use super::{
    timeline::{VisemeTimeline, DEFAULT_WORDS_PER_MINUTE},
    Viseme,
};

/// Intensity lost per second.
pub const INTENSITY_DECAY_PER_SECOND: f32 = 1.5;

/// Source of wall-clock time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Lifecycle hooks an audio driver calls while playing speech.
pub trait SpeechHooks {
    /// Playback of `text` actually started.
    fn on_start(&mut self, text: &str);

    /// Periodic progress pulse while audio is playing.
    fn on_boundary(&mut self);

    /// Playback is over, for whatever reason. Must be safe to call repeatedly.
    fn on_end(&mut self);
}

/// Mouth state shared between the speech coordinator and the animator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LipSyncState {
    pub active: bool,
    /// Seconds since the current utterance started.
    pub t: f32,
    /// 0.0-1.0, re-energised by boundary pulses and decaying in between.
    pub intensity: f32,
    pub current_viseme: Option<Viseme>,
    pub timeline: Option<VisemeTimeline>,
    pub started_at: Option<DateTime<Utc>>,
    /// Bumped for every started utterance.
    pub utterance: u64,
}

impl LipSyncState {
    /// Replace whatever was playing with a new utterance.
    pub fn start(&mut self, timeline: VisemeTimeline, now: DateTime<Utc>) {
        self.active = true;
        self.t = 0.0;
        self.intensity = 1.0;
        self.current_viseme = None;
        self.timeline = Some(timeline);
        self.started_at = Some(now);
        self.utterance += 1;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.timeline = None;
        self.current_viseme = None;
        self.started_at = None;
    }

    pub fn peak(&mut self) {
        self.intensity = 1.0;
    }

    /// Advance speech time and decay intensity by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        if self.active {
            self.t += dt;
        }
        self.intensity = (self.intensity - dt * INTENSITY_DECAY_PER_SECOND).max(0.0);
    }

    /// Milliseconds since the utterance started, zero if nothing is playing.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> f64 {
        match self.started_at {
            Some(v) => (now - v).num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0,
            None => 0.0,
        }
    }
}

/// Owns the [LipSyncState] and keeps it in step with the audio driver.
#[derive(Debug)]
pub struct SpeechCoordinator<C: Clock = SystemClock> {
    state: LipSyncState,
    clock: C,
    words_per_minute: f32,
    viseme_override: Option<Viseme>,
}

impl Default for SpeechCoordinator<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> SpeechCoordinator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: LipSyncState::default(),
            clock,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            viseme_override: None,
        }
    }

    pub fn with_words_per_minute(mut self, words_per_minute: f32) -> Self {
        self.words_per_minute = words_per_minute;
        self
    }

    pub fn state(&self) -> &LipSyncState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Force a viseme instead of reading it from the text timeline.
    ///
    /// Meant for hosts that have real phoneme data. Only applies while speech is
    /// active.
    pub fn set_viseme_override(&mut self, viseme: Option<Viseme>) {
        self.viseme_override = viseme;
    }

    /// Per-frame update, called before the animator reads the state.
    pub fn tick(&mut self, dt: f32) {
        self.state.current_viseme = if !self.state.active {
            None
        } else if let Some(v) = self.viseme_override {
            Some(v)
        } else {
            match &self.state.timeline {
                Some(timeline) => timeline.viseme_at(self.state.elapsed_ms(self.clock.now())),
                None => None,
            }
        };

        self.state.advance(dt);
    }
}

impl<C: Clock> SpeechHooks for SpeechCoordinator<C> {
    fn on_start(&mut self, text: &str) {
        if self.state.active {
            debug!("Replacing utterance {} before it ended", self.state.utterance);
            self.state.stop();
        }

        let timeline = VisemeTimeline::build(text, self.words_per_minute);
        debug!(
            "Lip sync started with {} viseme segments over {:.0}ms",
            timeline.len(),
            timeline.total_ms()
        );
        self.state.start(timeline, self.clock.now());
    }

    fn on_boundary(&mut self) {
        if !self.state.active {
            trace!("Ignoring boundary pulse while idle");
            return;
        }

        self.state.peak();
    }

    fn on_end(&mut self) {
        if self.state.active {
            debug!("Lip sync stopped after {:.2}s", self.state.t);
        }

        self.state.stop();
        self.viseme_override = None;
    }
}
