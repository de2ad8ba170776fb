/*!
Lifecycle of one avatar: load a rig, frame it, and run it every frame.
*/

use std::{fmt::Display, path::Path};

use glam::Vec3;
use log::{debug, error, info, warn};

use crate::{
    animator::{blink, Animator},
    clip::{ActionId, AnimationClip, AnimationMixer},
    model::{
        config::{AvatarConfig, Framing},
        RigAsset,
    },
    rig::RigControlMap,
    scene::Scene,
    speech::{Clock, LipSyncState, SpeechCoordinator, SystemClock},
};

#[derive(Debug)]
pub enum LoadError {
    NotFound(String),
    Io(std::io::Error),
    Parse(String),
    Unsupported(String),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(v) => write!(f, "Rig not found: {v}"),
            Self::Io(e) => write!(f, "Unable to read rig: {e}"),
            Self::Parse(v) => write!(f, "Unable to parse rig: {v}"),
            Self::Unsupported(v) => write!(f, "Unsupported rig: {v}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

#[derive(Debug)]
pub enum SessionError {
    Load { url: String, source: LoadError },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load { url, source } => write!(f, "Failed to load {url}: {source}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Produces rig assets from an identifier.
pub trait RigSource {
    fn load_rig(&mut self, url: &str) -> std::result::Result<RigAsset, LoadError>;

    /// Only the clips of `url`. Nothing else loaded for them is kept.
    fn load_clips(&mut self, url: &str) -> std::result::Result<Vec<AnimationClip>, LoadError> {
        self.load_rig(url).map(|v| v.clips)
    }
}

/// Reads rig descriptions from JSON files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRigSource;

impl RigSource for JsonRigSource {
    fn load_rig(&mut self, url: &str) -> std::result::Result<RigAsset, LoadError> {
        let path = Path::new(url);
        if !path.exists() {
            return Err(LoadError::NotFound(url.to_string()));
        }

        let data = std::fs::read_to_string(path)?;

        Ok(RigAsset::from_json(&data)?)
    }
}

/// Everything that only exists once a rig is loaded.
#[derive(Debug)]
struct LoadedRig {
    scene: Scene,
    rig: RigControlMap,
    mixer: AnimationMixer,
    animator: Animator,
    gesture: Option<ActionId>,
}

/// Owns a rig and its lip sync, and exposes the per-frame entry point.
#[derive(Debug)]
pub struct AvatarSession<S: RigSource, C: Clock = SystemClock> {
    source: S,
    config: AvatarConfig,
    url: String,
    gesture_url: Option<String>,
    speech: SpeechCoordinator<C>,
    loaded: Option<LoadedRig>,
    scale: f32,
}

impl<S: RigSource> AvatarSession<S, SystemClock> {
    pub fn new(source: S, url: impl Into<String>, config: AvatarConfig) -> Self {
        Self::with_clock(source, url, config, SystemClock)
    }
}

impl<S: RigSource, C: Clock> AvatarSession<S, C> {
    pub fn with_clock(source: S, url: impl Into<String>, config: AvatarConfig, clock: C) -> Self {
        let speech = SpeechCoordinator::new(clock).with_words_per_minute(config.words_per_minute);

        Self {
            source,
            config,
            url: url.into(),
            gesture_url: None,
            speech,
            loaded: None,
            scale: 1.0,
        }
    }

    /// Set a clip to layer over the base animation after loading.
    pub fn with_gesture_clip(mut self, url: impl Into<String>) -> Self {
        self.gesture_url = Some(url.into());
        self
    }

    /// Load the rig, discover its controls and frame it.
    ///
    /// A failure leaves the session unloaded. Loading again replaces the
    /// current rig.
    pub fn load(&mut self) -> Result<()> {
        let asset = self
            .source
            .load_rig(&self.url)
            .map_err(|source| SessionError::Load {
                url: self.url.clone(),
                source,
            })?;
        let RigAsset { mut scene, clips } = asset;

        let rig = RigControlMap::discover(&scene);
        frame_model(&mut scene, &self.config.framing, self.scale);

        // Start with the mouth closed and eyes open
        for channel in rig.morph_targets.iter() {
            if let Some(morphs) = scene.morphs_mut(channel.mesh) {
                morphs.set(channel.index, 0.0);
            }
        }
        blink::set_blink(&mut scene, &rig.blink_channels, 0.0);

        let mut mixer = AnimationMixer::new();
        if let Some(base) = clips.into_iter().next() {
            debug!("Using {} as the base clip", base.name);
            mixer.add_action(base, &scene, 1.0);
        }

        info!("Loaded rig {} with lip sync tier {}", self.url, rig.lip_sync_tier().as_ref());

        self.loaded = Some(LoadedRig {
            scene,
            rig,
            mixer,
            animator: Animator::from_config(&self.config),
            gesture: None,
        });

        if let Some(url) = self.gesture_url.clone() {
            self.load_gesture_clip(&url);
        }

        Ok(())
    }

    /// Best effort, any failure only gets logged.
    ///
    /// Returns whether a gesture layer is now active.
    pub fn load_gesture_clip(&mut self, url: &str) -> bool {
        let Some(loaded) = self.loaded.as_mut() else {
            warn!("Tried to load gesture clip {url} without a rig");
            return false;
        };

        let clip = match self.source.load_clips(url) {
            Ok(v) => v.into_iter().next(),
            Err(e) => {
                debug!("Skipping gesture clip {url}: {e}");
                return false;
            }
        };

        match clip.as_ref().and_then(AnimationClip::upper_body) {
            Some(v) => {
                loaded.gesture = Some(loaded.mixer.add_action(v, &loaded.scene, 0.0));
                true
            }
            None => {
                debug!("Gesture clip {url} has no upper body tracks");
                false
            }
        }
    }

    /// Per-frame entry point. Does nothing until a rig is loaded.
    ///
    /// Negative or non-finite deltas count as an empty frame.
    pub fn update(&mut self, dt: f32) {
        let Some(loaded) = self.loaded.as_mut() else {
            return;
        };
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        loaded.mixer.update(dt, &mut loaded.scene);
        self.speech.tick(dt);

        let gesture = match loaded.gesture {
            Some(id) => loaded.mixer.action_mut(id),
            None => None,
        };
        loaded.animator.update(
            dt,
            &mut loaded.scene,
            &loaded.rig,
            self.speech.state(),
            gesture,
        );
    }

    /// Uniform model scale, clamped to the configured range.
    pub fn set_scale(&mut self, scale: f32) -> f32 {
        self.scale = self.config.clamp_scale(scale);
        if let Some(loaded) = self.loaded.as_mut() {
            let root = loaded.scene.root();
            if let Some(t) = loaded.scene.transform_mut(root) {
                t.scale = Vec3::splat(self.scale);
            }
        }

        self.scale
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn has_gesture_layer(&self) -> bool {
        self.loaded.as_ref().is_some_and(|v| v.gesture.is_some())
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.loaded.as_ref().map(|v| &v.scene)
    }

    pub fn rig(&self) -> Option<&RigControlMap> {
        self.loaded.as_ref().map(|v| &v.rig)
    }

    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.loaded.as_ref().map(|v| &v.mixer)
    }

    pub fn framing(&self) -> &Framing {
        &self.config.framing
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    pub fn speech(&self) -> &SpeechCoordinator<C> {
        &self.speech
    }

    /// The audio driver talks to this through [crate::speech::SpeechHooks].
    pub fn speech_mut(&mut self) -> &mut SpeechCoordinator<C> {
        &mut self.speech
    }

    pub fn lip_sync(&self) -> &LipSyncState {
        self.speech.state()
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Like [AvatarSession::load] but only logs failures.
    pub fn try_load(&mut self) -> bool {
        match self.load() {
            Ok(_) => true,
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }
}

fn frame_model(scene: &mut Scene, framing: &Framing, scale: f32) {
    let root = scene.root();
    let Some(node) = scene.node_mut(root) else {
        return;
    };

    node.rest_translation = framing.model_position;
    node.transform.translation = framing.model_position;
    node.transform.scale = Vec3::splat(scale);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        scene::{MorphSet, NodeKind},
        speech::{coordinator::tests::ManualClock, SpeechHooks, Viseme},
    };

    /// Serves prebuilt JSON rigs by name.
    #[derive(Debug, Default)]
    struct FakeSource {
        rigs: HashMap<String, String>,
        requests: Vec<String>,
    }

    impl FakeSource {
        fn with(mut self, url: &str, json: &str) -> Self {
            self.rigs.insert(url.to_string(), json.to_string());
            self
        }
    }

    impl RigSource for FakeSource {
        fn load_rig(&mut self, url: &str) -> std::result::Result<RigAsset, LoadError> {
            self.requests.push(url.to_string());
            match self.rigs.get(url) {
                Some(v) => Ok(RigAsset::from_json(v)?),
                None => Err(LoadError::NotFound(url.to_string())),
            }
        }

        fn load_clips(&mut self, url: &str) -> std::result::Result<Vec<AnimationClip>, LoadError> {
            self.requests.push(format!("clips:{url}"));
            match self.rigs.get(url) {
                Some(v) => Ok(RigAsset::from_json(v)?.clips),
                None => Err(LoadError::NotFound(url.to_string())),
            }
        }
    }

    const AVATAR: &str = r#"{
        "nodes": [
            { "name": "Face", "kind": "mesh", "morphs": ["jawOpen", "viseme_aa", "eyeBlinkLeft", "eyeBlinkRight"] },
            {
                "name": "Hips",
                "kind": "bone",
                "children": [
                    { "name": "mixamorig:Head", "kind": "bone" },
                    { "name": "mixamorig:LeftArm", "kind": "bone" }
                ]
            }
        ],
        "clips": [{
            "name": "Idle",
            "duration": 2.0,
            "tracks": [{
                "target": "Hips",
                "keyframes": [
                    { "time": 0.0, "rotation": [0.0, 0.0, 0.0, 1.0] },
                    { "time": 2.0, "rotation": [0.0, 0.0, 0.0, 1.0] }
                ]
            }]
        }]
    }"#;

    const GESTURE: &str = r#"{
        "clips": [{
            "name": "Talking",
            "duration": 1.0,
            "tracks": [
                { "target": "Hips", "keyframes": [{ "time": 0.0, "rotation": [0.0, 0.0, 0.0, 1.0] }] },
                { "target": "mixamorig:LeftHand", "keyframes": [{ "time": 0.0, "rotation": [0.0, 0.0, 0.0, 1.0] }] }
            ]
        }]
    }"#;

    const LEGS_ONLY: &str = r#"{
        "clips": [{
            "name": "Walk",
            "duration": 1.0,
            "tracks": [{ "target": "LeftUpLeg", "keyframes": [] }]
        }]
    }"#;

    fn session(source: FakeSource) -> AvatarSession<FakeSource, ManualClock> {
        let config = AvatarConfig {
            seed: Some(1),
            ..Default::default()
        };
        AvatarSession::with_clock(source, "avatar", config, ManualClock::new())
    }

    #[test]
    fn update_before_load_is_a_no_op() {
        let mut session = session(FakeSource::default());
        session.update(0.016);
        session.speech_mut().on_start("hello");
        session.update(0.016);

        assert!(!session.is_loaded());
        assert!(session.scene().is_none());
    }

    #[test]
    fn load_frames_and_resets() {
        let mut session = session(FakeSource::default().with("avatar", AVATAR));
        session.load().unwrap();

        let scene = session.scene().unwrap();
        let root = scene.node(scene.root()).unwrap();
        assert_eq!(root.transform.translation, Vec3::new(0.0, -1.5, 0.0));
        assert_eq!(root.rest_translation, Vec3::new(0.0, -1.5, 0.0));

        let face = scene.find("Face").unwrap();
        assert!(scene.morphs(face).unwrap().influences().iter().all(|v| *v == 0.0));
        assert_eq!(session.mixer().unwrap().len(), 1);
        assert!(!session.has_gesture_layer());
        assert!(session.rig().unwrap().has_lip_sync());
    }

    #[test]
    fn load_failure_propagates() {
        let mut session = session(FakeSource::default());

        match session.load() {
            Err(SessionError::Load { url, source }) => {
                assert_eq!(url, "avatar");
                assert!(matches!(source, LoadError::NotFound(_)));
            }
            v => panic!("unexpected {v:?}"),
        }
        assert!(!session.is_loaded());
        assert!(!session.try_load());
    }

    #[test]
    fn gesture_clip_is_filtered() {
        let source = FakeSource::default()
            .with("avatar", AVATAR)
            .with("gesture", GESTURE);
        let mut session = session(source).with_gesture_clip("gesture");
        session.load().unwrap();

        assert!(session.has_gesture_layer());
        let mixer = session.mixer().unwrap();
        assert_eq!(mixer.len(), 2);

        let source = &session.source;
        assert_eq!(source.requests, vec!["avatar", "clips:gesture"]);
    }

    #[test]
    fn gesture_from_the_model_file_only_reads_clips() {
        let source = FakeSource::default().with("avatar", AVATAR);
        let mut session = session(source).with_gesture_clip("avatar");
        session.load().unwrap();

        assert_eq!(session.source.requests, vec!["avatar", "clips:avatar"]);
        let scene = session.scene().unwrap();
        assert!(scene.find("Face").is_some());
        assert!(scene.find("mixamorig:Head").is_some());
    }

    #[test]
    fn bad_frame_delta_keeps_clips_sane() {
        let mut session = session(FakeSource::default().with("avatar", AVATAR));
        session.load().unwrap();

        session.update(f32::NAN);
        session.update(f32::INFINITY);
        session.update(-1.0);
        session.update(0.016);

        let mixer = session.mixer().unwrap();
        let time = mixer.iter().next().unwrap().time();
        assert!((time - 0.016).abs() < 1e-6, "{time}");

        let scene = session.scene().unwrap();
        for (_, node) in scene.iter() {
            assert!(node.transform.rotation.is_finite(), "{}", node.name);
        }
    }

    #[test]
    fn gesture_failures_are_silent() {
        let source = FakeSource::default()
            .with("avatar", AVATAR)
            .with("legs", LEGS_ONLY);
        let mut session = session(source).with_gesture_clip("missing");
        session.load().unwrap();
        assert!(!session.has_gesture_layer());

        assert!(!session.load_gesture_clip("legs"));
        assert!(!session.has_gesture_layer());
        assert_eq!(session.mixer().unwrap().len(), 1);
    }

    #[test]
    fn scale_is_clamped() {
        let mut session = session(FakeSource::default().with("avatar", AVATAR));
        assert_eq!(session.set_scale(10.0), 5.0);

        session.load().unwrap();
        let scene = session.scene().unwrap();
        assert_eq!(scene.node(scene.root()).unwrap().transform.scale, Vec3::splat(5.0));

        assert_eq!(session.set_scale(0.1), 0.6);
        let scene = session.scene().unwrap();
        assert_eq!(scene.node(scene.root()).unwrap().transform.scale, Vec3::splat(0.6));
    }

    #[test]
    fn speech_drives_mouth() {
        let mut session = session(FakeSource::default().with("avatar", AVATAR));
        session.load().unwrap();

        session.speech_mut().on_start("aaaa aaaa");
        session.speech_mut().set_viseme_override(Some(Viseme::A));
        for _ in 0..5 {
            session.speech_mut().clock_mut().advance_ms(16);
            session.update(0.016);
        }

        let scene = session.scene().unwrap();
        let face = scene.find("Face").unwrap();
        let aa = scene.morphs(face).unwrap().get(1).unwrap();
        assert!((0.6..=1.0).contains(&aa), "{aa}");

        session.speech_mut().on_end();
        session.update(0.016);
        let scene = session.scene().unwrap();
        assert_eq!(scene.morphs(face).unwrap().get(1), Some(0.0));
        assert!(!session.lip_sync().active);
    }

    #[test]
    fn json_source_reads_files() {
        let path = std::env::temp_dir().join("libavatar-session-test.json");
        std::fs::write(&path, AVATAR).unwrap();

        let mut source = JsonRigSource;
        let asset = source.load_rig(path.to_str().unwrap()).unwrap();
        assert!(asset.scene.find("Face").is_some());
        assert_eq!(asset.clips.len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            source.load_rig(path.to_str().unwrap()),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn mesh_without_morphs_is_fine() {
        let mut scene = Scene::new("root");
        scene.add_child(scene.root(), "Body", NodeKind::Mesh(MorphSet::default()));
        frame_model(&mut scene, &Framing::default(), 1.0);

        assert!(!RigControlMap::discover(&scene).has_lip_sync());
    }
}
