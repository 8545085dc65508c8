//! Playback engine: turns requests (state, emotion, interaction) into clip
//! playback, and keeps something sensible on screen between requests.
//!
//! Two timers can switch clips on their own. The idle cycler rotates idle
//! clips while the avatar is idle; the watchdog recovers from a stalled or
//! missing action. At most one of them acts per tick, the idle cycler first.
//! The watchdog stands down while a load is pending or an interaction
//! one-shot is waiting to return to idle.

use crate::behavior::BehaviorState;
use crate::cache::{ClipCache, ClipLoad, LoadError, LoadedClip};
use crate::catalog::{AnimationCatalog, ClipCategory};
use crate::config::EngineConfig;
use crate::expression::ExpressionBlender;
use crate::history::RecentHistory;
use crate::loader::ClipSource;
use crate::mixer::{LoopMode, Mixer, MixerEvent, PlaybackAction};
use crate::skeleton::{apply_rest_pose, AvatarRig};
use futures::FutureExt;
use marionette_core::{MarionetteError, Result};
use marionette_runtime::{Countdown, InteractionType};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

/// Fade used by gestures and their return
const GESTURE_FADE: f64 = 0.3;
/// Fade used when starting a dance
const DANCE_FADE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub looping: bool,
    /// Crossfade length; `None` uses the configured blend duration
    pub fade_in: Option<f64>,
    pub time_scale: f64,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            looping: true,
            fade_in: None,
            time_scale: 1.0,
        }
    }
}

impl PlayOptions {
    pub fn once() -> Self {
        Self {
            looping: false,
            ..Default::default()
        }
    }

    pub fn with_fade(mut self, seconds: f64) -> Self {
        self.fade_in = Some(seconds);
        self
    }

    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatus {
    /// The clip was ready and is now fading in
    Started,
    /// The same looping clip was already running
    Unchanged,
    /// Parked until its load settles
    Loading,
    /// No catalog entry
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Nothing requested, or stopped
    Idle,
    /// Playback requested. The watchdog treats a missing or finished action as a stall.
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub struct EmotionOptions {
    /// Clip crossfade; `None` uses `emotion_blend_duration`
    pub blend: Option<f64>,
    pub looping: bool,
    /// Expression blend; `None` uses `expression_duration`
    pub expression_duration: Option<f64>,
}

impl Default for EmotionOptions {
    fn default() -> Self {
        Self {
            blend: None,
            looping: true,
            expression_duration: None,
        }
    }
}

/// What `set_emotion` chose
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionOutcome {
    pub emotion: String,
    pub clip: Option<String>,
    pub status: PlayStatus,
    pub expression: String,
    pub intensity: f32,
    pub look_up: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ClipStarted { name: String, looping: bool },
    /// A non-looping clip reached its end
    ClipFinished { name: String },
    /// An interaction one-shot finished and the idle clip was requested
    ReturnToIdle,
    LoadFailed(LoadError),
    /// The watchdog found nothing running and tried a random clip
    RecoveryAttempted,
    RestPoseApplied,
    ExpressionSettled { channel: String },
}

#[derive(Debug, Clone, PartialEq)]
enum AfterPlay {
    Stay,
    ReturnToIdle,
    /// Return to this clip, looping
    ReturnTo(String),
}

#[derive(Debug, Clone)]
struct PlayRequest {
    name: String,
    looping: bool,
    fade: f64,
    time_scale: f64,
    /// Catalog duration, used to time returns
    nominal: f64,
    after: AfterPlay,
}

struct PendingPlay {
    load: ClipLoad,
    request: PlayRequest,
}

/// Snapshot for diagnostics and UIs
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub current_clip: Option<String>,
    pub phase: PlaybackPhase,
    pub is_playing: bool,
    pub pending_clip: Option<String>,
    pub emotion: String,
}

pub struct AnimationEngine {
    catalog: AnimationCatalog,
    config: EngineConfig,
    cache: ClipCache,
    mixer: Mixer,
    expressions: ExpressionBlender,
    rng: StdRng,
    phase: PlaybackPhase,
    current_clip: Option<String>,
    pending: Option<PendingPlay>,
    preloads: Vec<ClipLoad>,
    history: RecentHistory,
    idle_elapsed: f64,
    idle_target: f64,
    watchdog_elapsed: f64,
    return_to_idle: Countdown,
    gesture_return: Countdown,
    gesture_previous: Option<String>,
    rest_pose_applied: bool,
    emotion: String,
    events: Vec<EngineEvent>,
}

impl AnimationEngine {
    pub fn new(catalog: AnimationCatalog, source: Rc<dyn ClipSource>) -> Self {
        let config = catalog.engine_config().clone();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let idle_target = roll_idle_target(&config, &mut rng);
        Self {
            history: RecentHistory::new(config.recent_history),
            catalog,
            config,
            cache: ClipCache::new(source),
            mixer: Mixer::new(),
            expressions: ExpressionBlender::new(),
            rng,
            phase: PlaybackPhase::Idle,
            current_clip: None,
            pending: None,
            preloads: Vec::new(),
            idle_elapsed: 0.0,
            idle_target,
            watchdog_elapsed: 0.0,
            return_to_idle: Countdown::idle(),
            gesture_return: Countdown::idle(),
            gesture_previous: None,
            rest_pose_applied: false,
            emotion: "neutral".to_string(),
            events: Vec::new(),
        }
    }

    /// Replace the RNG with a seeded one
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.idle_target = roll_idle_target(&self.config, &mut self.rng);
        self
    }

    pub fn catalog(&self) -> &AnimationCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ClipCache {
        &self.cache
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn expressions(&self) -> &ExpressionBlender {
        &self.expressions
    }

    pub fn expressions_mut(&mut self) -> &mut ExpressionBlender {
        &mut self.expressions
    }

    pub fn history(&self) -> &RecentHistory {
        &self.history
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.current_clip.as_deref()
    }

    pub fn current_emotion(&self) -> &str {
        &self.emotion
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
            && self.mixer.current().map_or(false, PlaybackAction::is_running)
    }

    /// Seconds until the next idle cycle, while idle
    pub fn idle_cycle_remaining(&self) -> f64 {
        (self.idle_target - self.idle_elapsed).max(0.0)
    }

    pub fn is_returning_to_idle(&self) -> bool {
        self.return_to_idle.is_running()
    }

    pub fn rest_pose_applied(&self) -> bool {
        self.rest_pose_applied
    }

    // ── Requests ─────────────────────────────────────────

    /// Play a clip by name, crossfading from whatever is active.
    ///
    /// A load that has already failed is returned as `LoadFailure`. A load
    /// still in flight replaces any earlier parked request.
    pub fn play(&mut self, name: &str, options: PlayOptions) -> Result<PlayStatus> {
        self.request(name, options, AfterPlay::Stay)
    }

    fn request(&mut self, name: &str, options: PlayOptions, after: AfterPlay) -> Result<PlayStatus> {
        let Some(descriptor) = self.catalog.get(name).cloned() else {
            tracing::warn!("{}", MarionetteError::CatalogMiss(format!("no clip named '{}'", name)));
            return Ok(PlayStatus::Missing);
        };

        if options.looping && after == AfterPlay::Stay {
            if let Some(action) = self.mixer.current_mut() {
                if action.name() == name && action.is_looping() && action.is_running() {
                    action.time_scale = options.time_scale;
                    self.pending = None;
                    return Ok(PlayStatus::Unchanged);
                }
            }
        }

        let request = PlayRequest {
            name: descriptor.name.clone(),
            looping: options.looping,
            fade: options.fade_in.unwrap_or(self.config.blend_duration),
            time_scale: options.time_scale,
            nominal: descriptor.duration,
            after,
        };

        let load = self.cache.load(&descriptor);
        match load.clone().now_or_never() {
            Some(Ok(clip)) => {
                self.pending = None;
                self.start(clip, request);
                Ok(PlayStatus::Started)
            }
            Some(Err(err)) => {
                // Still meant to be playing, so the watchdog picks this up
                self.pending = None;
                self.phase = PlaybackPhase::Playing;
                Err(err.into())
            }
            None => {
                tracing::debug!(clip = %request.name, "clip loading, play parked");
                self.phase = PlaybackPhase::Playing;
                self.pending = Some(PendingPlay { load, request });
                Ok(PlayStatus::Loading)
            }
        }
    }

    fn start(&mut self, clip: Rc<LoadedClip>, request: PlayRequest) {
        let mode = if request.looping {
            LoopMode::Repeat
        } else {
            LoopMode::Once
        };
        let action = PlaybackAction::new(clip, mode, request.time_scale);
        self.mixer.crossfade_to(action, request.fade);

        self.phase = PlaybackPhase::Playing;
        self.current_clip = Some(request.name.clone());
        self.history.push(&request.name);
        self.rest_pose_applied = false;

        self.return_to_idle.cancel();
        self.gesture_return.cancel();
        match request.after {
            AfterPlay::Stay => {}
            AfterPlay::ReturnToIdle => self
                .return_to_idle
                .start(request.nominal + self.config.return_to_idle_padding),
            AfterPlay::ReturnTo(previous) => {
                self.gesture_previous = Some(previous);
                self.gesture_return.start(request.nominal);
            }
        }

        tracing::debug!(clip = %request.name, looping = request.looping, "clip started");
        self.events.push(EngineEvent::ClipStarted {
            name: request.name,
            looping: request.looping,
        });
    }

    /// Fade the active clip out and forget it
    pub fn stop(&mut self, fade_out: f64) {
        self.mixer.fade_out(fade_out);
        self.current_clip = None;
        self.pending = None;
        self.phase = PlaybackPhase::Idle;
        self.return_to_idle.cancel();
        self.gesture_return.cancel();
    }

    pub fn pause(&mut self) {
        if self.phase != PlaybackPhase::Playing {
            return;
        }
        if let Some(action) = self.mixer.current_mut() {
            action.paused = true;
        }
        self.phase = PlaybackPhase::Paused;
    }

    pub fn resume(&mut self) {
        if self.phase != PlaybackPhase::Paused {
            return;
        }
        if let Some(action) = self.mixer.current_mut() {
            action.paused = false;
        }
        self.phase = PlaybackPhase::Playing;
    }

    /// Play the catalog's preferred clip for a behavior state, looping
    pub fn play_for_state(&mut self, state: BehaviorState) -> Result<PlayStatus> {
        self.play_for_key(state.as_str())
    }

    /// Play the preferred clip for any preference key (states or scenarios)
    pub fn play_for_key(&mut self, key: &str) -> Result<PlayStatus> {
        let Some(name) = self
            .catalog
            .preferred_for_key(key, &mut self.rng)
            .map(|d| d.name.clone())
        else {
            tracing::warn!("{}", MarionetteError::CatalogMiss(format!("no clip for '{}'", key)));
            return Ok(PlayStatus::Missing);
        };
        self.play(&name, PlayOptions::default())
    }

    /// Start loading a state's clip without playing it
    pub fn preload_state(&mut self, state: BehaviorState) {
        let Some(descriptor) = self.catalog.preferred_for(state, &mut self.rng).cloned() else {
            return;
        };
        if !self.cache.has(&descriptor.name) {
            self.preloads.push(self.cache.load(&descriptor));
        }
    }

    /// Play a clip for an emotion and blend the face toward its expression.
    ///
    /// The expression blend is longer than the clip crossfade so the face
    /// settles after the body has changed.
    pub fn set_emotion(&mut self, id: &str, options: EmotionOptions) -> Result<EmotionOutcome> {
        let Some(profile) = self.catalog.emotion(id).cloned() else {
            tracing::warn!("{}", MarionetteError::CatalogMiss(format!("no emotion '{}'", id)));
            return Ok(EmotionOutcome {
                emotion: id.to_string(),
                clip: None,
                status: PlayStatus::Missing,
                expression: String::new(),
                intensity: 0.0,
                look_up: false,
            });
        };

        let candidate = profile
            .clips
            .choose(&mut self.rng)
            .filter(|name| self.catalog.get(name).is_some())
            .cloned()
            .or_else(|| {
                profile
                    .category
                    .and_then(|c| self.catalog.random_of(c, &mut self.rng))
                    .map(|d| d.name.clone())
            });

        let duration = options
            .expression_duration
            .unwrap_or(self.config.expression_duration);
        self.expressions
            .blend_to(&profile.expression, profile.intensity, duration);
        self.emotion = profile.id.clone();

        let status = match &candidate {
            Some(name) => {
                let fade = options.blend.unwrap_or(self.config.emotion_blend_duration);
                let play = PlayOptions {
                    looping: options.looping,
                    fade_in: Some(fade),
                    time_scale: 1.0,
                };
                self.play(name, play)?
            }
            None => PlayStatus::Missing,
        };

        tracing::debug!(emotion = %profile.id, clip = ?candidate, "emotion set");
        Ok(EmotionOutcome {
            emotion: profile.id,
            clip: candidate,
            status,
            expression: profile.expression,
            intensity: profile.intensity,
            look_up: profile.look_up,
        })
    }

    /// Play the one-shot mapped to an interaction, then return to idle
    pub fn handle_interaction(&mut self, kind: InteractionType) -> Result<PlayStatus> {
        let Some(profile) = self.catalog.interaction(kind).cloned() else {
            tracing::warn!(
                "{}",
                MarionetteError::CatalogMiss(format!("no clip mapped to '{}'", kind))
            );
            return Ok(PlayStatus::Missing);
        };
        let name = profile
            .clip
            .filter(|name| self.catalog.get(name).is_some())
            .or_else(|| {
                self.catalog
                    .random_of(profile.category, &mut self.rng)
                    .map(|d| d.name.clone())
            });
        let Some(name) = name else {
            return Ok(PlayStatus::Missing);
        };

        tracing::debug!(interaction = %kind, clip = %name, "interaction mapped");
        self.request(&name, PlayOptions::once(), AfterPlay::ReturnToIdle)
    }

    /// Play a random clip from the whole catalog, preferring ones not played recently
    pub fn play_random(&mut self) -> Result<PlayStatus> {
        let names = self.catalog.all_names();
        let fresh: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !self.history.contains(n))
            .collect();
        let pool = if fresh.is_empty() { &names } else { &fresh };
        let Some(descriptor) = pool
            .choose(&mut self.rng)
            .and_then(|n| self.catalog.get(n))
            .cloned()
        else {
            return Ok(PlayStatus::Missing);
        };
        self.play(
            &descriptor.name,
            PlayOptions {
                looping: descriptor.looping,
                ..Default::default()
            },
        )
    }

    /// Play a short greeting or reaction once, then go back to the clip
    /// that was playing before
    pub fn play_random_gesture(&mut self) -> Result<PlayStatus> {
        let Some(name) = self
            .catalog
            .idle_gestures()
            .choose(&mut self.rng)
            .map(|d| d.name.clone())
        else {
            return Ok(PlayStatus::Missing);
        };
        let after = match self.current_clip.clone() {
            Some(previous) => AfterPlay::ReturnTo(previous),
            None => AfterPlay::ReturnToIdle,
        };
        self.request(&name, PlayOptions::once().with_fade(GESTURE_FADE), after)
    }

    /// Play a named dance, or the dancing preference
    pub fn play_dance(&mut self, name: Option<&str>) -> Result<PlayStatus> {
        let name = match name {
            Some(name) => name.to_string(),
            None => match self.catalog.preferred_for(BehaviorState::Dancing, &mut self.rng) {
                Some(d) => d.name.clone(),
                None => return Ok(PlayStatus::Missing),
            },
        };
        self.play(&name, PlayOptions::default().with_fade(DANCE_FADE))
    }

    // ── Frame update ─────────────────────────────────────

    /// Advance by `dt` seconds and write the mixed pose into `rig`
    pub fn update(
        &mut self,
        dt: f64,
        behavior: BehaviorState,
        rig: &mut dyn AvatarRig,
    ) -> Vec<EngineEvent> {
        self.preloads
            .retain(|load| load.clone().now_or_never().is_none());
        self.settle_pending();

        for event in self.mixer.advance(dt) {
            let MixerEvent::Finished(name) = event;
            self.events.push(EngineEvent::ClipFinished { name });
        }

        if self.return_to_idle.tick(dt) {
            self.events.push(EngineEvent::ReturnToIdle);
            if let Err(err) = self.play_for_state(BehaviorState::Idle) {
                tracing::warn!("return to idle failed: {}", err);
            }
        }

        if self.gesture_return.tick(dt) {
            if let Some(previous) = self.gesture_previous.take() {
                let options = PlayOptions::default().with_fade(GESTURE_FADE);
                if let Err(err) = self.play(&previous, options) {
                    tracing::warn!("gesture return failed: {}", err);
                }
            }
        }

        let cycled = self.tick_idle_cycle(dt, behavior);
        self.tick_watchdog(dt, cycled, rig);

        for done in self.expressions.update(dt) {
            if !done.interrupted {
                self.events.push(EngineEvent::ExpressionSettled {
                    channel: done.channel,
                });
            }
        }

        self.mixer.apply(rig);
        std::mem::take(&mut self.events)
    }

    fn settle_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.load.clone().now_or_never() {
            Some(Ok(clip)) => self.start(clip, pending.request),
            Some(Err(err)) => {
                tracing::warn!("{}", err);
                self.events.push(EngineEvent::LoadFailed(err));
            }
            None => self.pending = Some(pending),
        }
    }

    /// Returns true if the idle cycler switched clips
    fn tick_idle_cycle(&mut self, dt: f64, behavior: BehaviorState) -> bool {
        if behavior != BehaviorState::Idle {
            self.idle_elapsed = 0.0;
            return false;
        }
        if self.return_to_idle.is_running() || self.gesture_return.is_running() {
            return false;
        }
        self.idle_elapsed += dt;
        if self.idle_elapsed < self.idle_target {
            return false;
        }
        self.idle_elapsed = 0.0;
        self.idle_target = roll_idle_target(&self.config, &mut self.rng);

        let Some(name) = self.next_idle_clip() else {
            return false;
        };
        tracing::debug!(clip = %name, "idle cycle");
        match self.play(&name, PlayOptions::default()) {
            Ok(PlayStatus::Started) | Ok(PlayStatus::Loading) => true,
            Ok(_) => false,
            Err(err) => {
                tracing::warn!("idle cycle failed: {}", err);
                false
            }
        }
    }

    /// An idle clip that is neither current nor recent. When every idle clip
    /// is recent the history restarts, still skipping the current clip.
    fn next_idle_clip(&mut self) -> Option<String> {
        let current = self.current_clip.as_deref();
        let idle = self.catalog.category(ClipCategory::Idle);
        let fresh: Vec<&str> = idle
            .iter()
            .map(|d| d.name.as_str())
            .filter(|n| Some(*n) != current && !self.history.contains(n))
            .collect();
        if let Some(name) = fresh.choose(&mut self.rng) {
            return Some(name.to_string());
        }

        self.history.clear();
        let others: Vec<&str> = idle
            .iter()
            .map(|d| d.name.as_str())
            .filter(|n| Some(*n) != current)
            .collect();
        others
            .choose(&mut self.rng)
            .map(|n| n.to_string())
            .or_else(|| idle.first().map(|d| d.name.clone()))
    }

    fn tick_watchdog(&mut self, dt: f64, cycled: bool, rig: &mut dyn AvatarRig) {
        self.watchdog_elapsed += dt;
        if self.watchdog_elapsed < self.config.watchdog_interval {
            return;
        }
        self.watchdog_elapsed = 0.0;

        if cycled
            || self.pending.is_some()
            || self.return_to_idle.is_running()
            || self.gesture_return.is_running()
        {
            return;
        }

        let stalled = self.phase == PlaybackPhase::Playing
            && self.mixer.current().map_or(true, |action| !action.is_running());
        if !stalled {
            return;
        }

        tracing::info!(clip = ?self.current_clip, "playback stalled, recovering");
        self.events.push(EngineEvent::RecoveryAttempted);
        let recovered = match self.play_random() {
            Ok(PlayStatus::Started) | Ok(PlayStatus::Loading) | Ok(PlayStatus::Unchanged) => true,
            Ok(PlayStatus::Missing) => false,
            Err(err) => {
                tracing::warn!("recovery play failed: {}", err);
                false
            }
        };

        if !recovered && !self.rest_pose_applied {
            let bones = apply_rest_pose(rig);
            self.rest_pose_applied = true;
            tracing::warn!(bones, "no clip playable, applied rest pose");
            self.events.push(EngineEvent::RestPoseApplied);
        }
    }

    /// Events queued since the last `update`, without advancing
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_clip: self.current_clip.clone(),
            phase: self.phase,
            is_playing: self.is_playing(),
            pending_clip: self.pending.as_ref().map(|p| p.request.name.clone()),
            emotion: self.emotion.clone(),
        }
    }

    /// Stop everything and drop cached clips. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.mixer.stop_all();
        self.mixer.reset_bindings();
        self.cache.dispose();
        self.expressions.clear();
        self.pending = None;
        self.preloads.clear();
        self.history.clear();
        self.phase = PlaybackPhase::Idle;
        self.current_clip = None;
        self.idle_elapsed = 0.0;
        self.watchdog_elapsed = 0.0;
        self.return_to_idle.cancel();
        self.gesture_return.cancel();
        self.gesture_previous = None;
        self.rest_pose_applied = false;
        self.emotion = "neutral".to_string();
        self.events.clear();
    }
}

fn roll_idle_target<R: Rng + ?Sized>(config: &EngineConfig, rng: &mut R) -> f64 {
    if config.idle_cycle_max > config.idle_cycle_min {
        rng.gen_range(config.idle_cycle_min..config.idle_cycle_max)
    } else {
        config.idle_cycle_min
    }
}
