/*!
A receiver for speech audio.

Plays an already synthesized [AudioStream] and reports its lifecycle to an
[AvatarPuppet]. Streams carry no word timing, so progress is reported with
fixed-interval boundary pulses while the player is playing.
*/

use godot::{
    engine::{AudioStream, AudioStreamPlayer},
    prelude::*,
};
use log::{debug, warn};

use crate::{
    gstring, logger,
    puppets::avatar_puppet::AvatarPuppet,
    speech::{BoundaryPulse, SpeechHooks},
    vstring,
};

/// Playback bookkeeping, independent of any engine objects.
///
/// Guarantees one `on_end` per started utterance no matter how playback stops.
#[derive(Debug, Default)]
struct Playback {
    pulse: BoundaryPulse,
    speaking: bool,
}

impl Playback {
    /// `interval` is the boundary pulse period for this utterance.
    fn start(&mut self, hooks: &mut impl SpeechHooks, text: &str, interval: f32) {
        self.finish(hooks);

        self.speaking = true;
        self.pulse = BoundaryPulse::new(interval);
        hooks.on_start(text);
    }

    /// Returns whether playback ended this frame.
    fn tick(&mut self, hooks: &mut impl SpeechHooks, dt: f32, playing: bool) -> bool {
        if !self.speaking {
            return false;
        }

        if !playing {
            self.finish(hooks);
            return true;
        }
        if self.pulse.advance(dt, playing) {
            hooks.on_boundary();
        }

        false
    }

    /// Returns whether anything was playing.
    fn finish(&mut self, hooks: &mut impl SpeechHooks) -> bool {
        if !self.speaking {
            return false;
        }

        self.speaking = false;
        self.pulse.reset();
        hooks.on_end();

        true
    }
}

/// Plays speech audio for a puppet.
#[derive(Debug, GodotClass)]
#[class(base = Node)]
pub struct SpeechReceiver {
    #[base]
    base: Base<Node>,

    /// The `AudioStreamPlayer` to play speech on.
    #[var]
    pub player_path: NodePath,
    /// The `AvatarPuppet` to drive. Its config sets the boundary interval.
    #[var]
    pub puppet_path: NodePath,

    player: Option<Gd<AudioStreamPlayer>>,
    puppet: Option<Gd<AvatarPuppet>>,
    playback: Playback,
}

#[godot_api]
impl NodeVirtual for SpeechReceiver {
    fn init(base: godot::obj::Base<Self::Base>) -> Self {
        Self {
            base,

            player_path: NodePath::default(),
            puppet_path: NodePath::default(),

            player: None,
            puppet: None,
            playback: Playback::default(),
        }
    }

    fn ready(&mut self) {
        logger::ensure_init();

        self.player = self
            .base
            .get_node_or_null(self.player_path.clone())
            .and_then(|v| v.try_cast::<AudioStreamPlayer>());
        if self.player.is_none() {
            warn!("player_path {} is not an AudioStreamPlayer", self.player_path);
        }

        self.puppet = self
            .base
            .get_node_or_null(self.puppet_path.clone())
            .and_then(|v| v.try_cast::<AvatarPuppet>());
        if self.puppet.is_none() {
            warn!("puppet_path {} is not an AvatarPuppet", self.puppet_path);
        }
    }

    fn process(&mut self, delta: f64) {
        let playing = self.player.as_ref().is_some_and(|v| v.is_playing());
        let Some(mut puppet) = self.puppet.as_ref().map(|v| v.share()) else {
            return;
        };

        if self.playback.tick(&mut puppet, delta as f32, playing) {
            debug!("Speech playback ended");
            self.emit_finished();
        }
    }
}

#[godot_api]
impl SpeechReceiver {
    #[signal]
    fn speech_started(text: GodotString);

    #[signal]
    fn speech_finished();

    /// Play `stream` as the spoken form of `text`.
    ///
    /// Anything still playing is finished first. A missing stream or player
    /// counts as a failed utterance and only finishes.
    #[func]
    pub fn speak(&mut self, text: GodotString, stream: Option<Gd<AudioStream>>) -> bool {
        let Some(mut puppet) = self.puppet.as_ref().map(|v| v.share()) else {
            warn!("No puppet to speak with");
            return false;
        };

        let Some(stream) = stream.filter(|_| self.player.is_some()) else {
            warn!("Unable to play speech for: {text}");
            if self.playback.finish(&mut puppet) {
                self.emit_finished();
            }
            return false;
        };

        if let Some(player) = self.player.as_mut() {
            player.stop();
            player.set_stream(stream);
            player.play();
        }

        let interval = puppet.bind().boundary_interval();
        self.playback.start(&mut puppet, &text.to_string(), interval);
        self.base
            .emit_signal(StringName::from("speech_started"), &[vstring!(text)]);

        true
    }

    /// Stop playback early.
    #[func]
    pub fn stop(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }

        let Some(mut puppet) = self.puppet.as_ref().map(|v| v.share()) else {
            return;
        };
        if self.playback.finish(&mut puppet) {
            self.emit_finished();
        }
    }

    #[func]
    pub fn is_speaking(&self) -> bool {
        self.playback.speaking
    }
}

impl SpeechReceiver {
    fn emit_finished(&mut self) {
        self.base.emit_signal(StringName::from("speech_finished"), &[]);
    }
}
