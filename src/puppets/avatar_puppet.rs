use std::str::FromStr;

use godot::{engine::Camera3D, prelude::*};
use log::{debug, error, info, warn};

use crate::{
    gstring, logger,
    model::{config::Framing, AvatarConfig},
    session::AvatarSession,
    speech::{SpeechHooks, Viseme},
    vstring,
};

use super::{
    from_vec3,
    godot_rig::{GodotRig, GodotRigSource},
};

/// A talking 3D avatar.
///
/// Loads `model_path` on ready and animates it every frame. Speech is driven
/// through [AvatarPuppet::speech_started], [AvatarPuppet::speech_boundary] and
/// [AvatarPuppet::speech_finished], usually by a
/// [crate::receivers::speech::SpeechReceiver].
#[derive(Debug, GodotClass)]
#[class(base = Node3D)]
pub struct AvatarPuppet {
    #[base]
    base: Base<Node3D>,

    /// `res://`, `user://`, a filesystem glTF or a JSON rig description.
    #[var]
    pub model_path: GodotString,
    /// Optional clip layered over the upper body while talking.
    #[var]
    pub gesture_clip_path: GodotString,
    /// Camera to frame the model with.
    #[var]
    pub camera_path: NodePath,
    /// Config overrides as JSON. Empty means defaults.
    #[var]
    pub config_json: GodotString,
    #[var]
    pub avatar_scale: f32,

    session: Option<AvatarSession<GodotRigSource>>,
    rig: Option<GodotRig>,
}

#[godot_api]
impl Node3DVirtual for AvatarPuppet {
    fn init(base: godot::obj::Base<Self::Base>) -> Self {
        Self {
            base,

            model_path: GodotString::new(),
            gesture_clip_path: GodotString::new(),
            camera_path: NodePath::default(),
            config_json: GodotString::new(),
            avatar_scale: 1.0,

            session: None,
            rig: None,
        }
    }

    fn ready(&mut self) {
        logger::ensure_init();

        if self.model_path.to_string().is_empty() {
            debug!("No model_path set, waiting for load_model");
            return;
        }

        self.load_model();
    }

    fn process(&mut self, delta: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.update(delta as f32);

        if let (Some(rig), Some(scene)) = (self.rig.as_mut(), session.scene()) {
            rig.apply(scene);
        }
    }
}

#[godot_api]
impl AvatarPuppet {
    /// (Re)load the model from `model_path`.
    ///
    /// Returns whether the model loaded. On failure the previous model is kept.
    #[func]
    pub fn load_model(&mut self) -> bool {
        let config = match self.avatar_config() {
            Ok(v) => v,
            Err(e) => {
                error!("Invalid config_json, not loading: {e}");
                return false;
            }
        };

        let url = self.model_path.to_string();
        let mut session = AvatarSession::new(GodotRigSource::default(), url.as_str(), config);
        if !self.gesture_clip_path.to_string().is_empty() {
            session = session.with_gesture_clip(self.gesture_clip_path.to_string());
        }
        self.avatar_scale = session.set_scale(self.avatar_scale);

        if !session.try_load() {
            return false;
        }

        if let Some(old) = self.rig.take() {
            old.root().queue_free();
        }
        match session.source_mut().take(&url) {
            Some(rig) => {
                self.base.add_child(rig.root().upcast());
                self.rig = Some(rig);
            }
            None => warn!("{url} has no engine nodes, nothing will be drawn"),
        }
        session.source_mut().clear();

        self.frame_camera(session.framing());
        info!("Avatar {url} ready");

        self.session = Some(session);

        true
    }

    /// Uniform model scale. Returns the scale actually applied.
    #[func]
    pub fn set_avatar_scale(&mut self, scale: f32) -> f32 {
        self.avatar_scale = match self.session.as_mut() {
            Some(v) => v.set_scale(scale),
            None => scale,
        };

        self.avatar_scale
    }

    #[func]
    pub fn speech_started(&mut self, text: GodotString) {
        if let Some(session) = self.session.as_mut() {
            session.speech_mut().on_start(&text.to_string());
        }
    }

    #[func]
    pub fn speech_boundary(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.speech_mut().on_boundary();
        }
    }

    #[func]
    pub fn speech_finished(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.speech_mut().on_end();
        }
    }

    /// Force a viseme while speaking. An empty string goes back to the text
    /// timeline.
    #[func]
    pub fn set_viseme(&mut self, symbol: GodotString) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let symbol = symbol.to_string();
        if symbol.is_empty() {
            session.speech_mut().set_viseme_override(None);
            return;
        }

        match Viseme::from_str(&symbol) {
            Ok(v) => session.speech_mut().set_viseme_override(Some(v)),
            Err(e) => warn!("{e}"),
        }
    }

    /// Seconds between boundary pulses for audio without word timing.
    #[func]
    pub fn boundary_interval(&self) -> f32 {
        match self.session.as_ref() {
            Some(v) => v.config().boundary_interval,
            None => self.avatar_config().unwrap_or_default().boundary_interval,
        }
    }

    /// Snapshot of the lip sync state, for debugging overlays.
    #[func]
    pub fn lip_sync_state(&self) -> Dictionary {
        let mut r = Dictionary::new();

        let Some(session) = self.session.as_ref() else {
            r.insert("loaded", false);
            return r;
        };
        let lip = session.lip_sync();

        r.insert("loaded", true);
        r.insert("active", lip.active);
        r.insert("t", lip.t);
        r.insert("intensity", lip.intensity);
        r.insert(
            "viseme",
            match lip.current_viseme {
                Some(v) => vstring!(v.as_ref()),
                None => vstring!(""),
            },
        );
        r.insert("utterance", lip.utterance as i64);
        r.insert(
            "tier",
            match session.rig() {
                Some(v) => vstring!(v.lip_sync_tier().as_ref()),
                None => vstring!(""),
            },
        );

        r
    }
}

impl AvatarPuppet {
    fn avatar_config(&self) -> Result<AvatarConfig, crate::model::config::ConfigError> {
        let data = self.config_json.to_string();
        if data.trim().is_empty() {
            return Ok(AvatarConfig::default());
        }

        AvatarConfig::from_json(&data)
    }

    fn frame_camera(&mut self, framing: &Framing) {
        if self.camera_path.to_string().is_empty() {
            return;
        }

        let Some(mut camera) = self
            .base
            .get_node_or_null(self.camera_path.clone())
            .and_then(|v| v.try_cast::<Camera3D>())
        else {
            warn!("camera_path {} is not a Camera3D", self.camera_path);
            return;
        };

        camera.set_fov(framing.fov);
        camera.set_near(framing.near);
        camera.set_far(framing.far);
        camera.look_at_from_position(
            from_vec3(framing.camera_position),
            from_vec3(framing.look_at),
        );
        debug!("Framed {} at {}", camera.get_name(), framing.camera_position);
    }
}

/// Lets an audio driver talk to a puppet directly.
impl SpeechHooks for Gd<AvatarPuppet> {
    fn on_start(&mut self, text: &str) {
        self.bind_mut().speech_started(text.into());
    }

    fn on_boundary(&mut self) {
        self.bind_mut().speech_boundary();
    }

    fn on_end(&mut self) {
        self.bind_mut().speech_finished();
    }
}
