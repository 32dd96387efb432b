//! Audio output capabilities consumed by the playback engine.
//!
//! Decoding and mixing happen outside this crate. The engine talks to one
//! [`AudioPlayer`] per track and to a shared [`Mixer`]. [`PausablePlayer`]
//! layers pause/resume on top of any [`OutputStream`], which only knows how to
//! start, stop and render a resource.

use std::collections::HashMap;

use crate::channel::{TrackId, NUM_TRACKS};
use crate::timeline::Millis;

/// Per-track playback capability.
pub trait AudioPlayer {
    /// Starts `resource` from the beginning, replacing anything playing.
    fn play(&mut self, resource: &str);
    fn stop(&mut self);
    /// Freezes output while keeping position. A paused player still reports
    /// `is_playing() == true`.
    fn pause(&mut self);
    fn resume(&mut self);
    fn is_playing(&self) -> bool;
    /// True while paused; reads false once the stream is no longer playing.
    fn is_paused(&self) -> bool;
}

/// Gain control for every track's channel strip.
pub trait Mixer {
    /// `gain` is linear, 0.0 to 1.0.
    fn set_gain(&mut self, track: TrackId, gain: f32);
}

/// Decode/output primitive underneath a player.
pub trait OutputStream {
    fn play(&mut self, resource: &str);
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    /// Produces `elapsed_ms` worth of output. Reaching the end of the
    /// resource stops the stream.
    fn render(&mut self, elapsed_ms: Millis);
}

/// Adds pause/resume to an [`OutputStream`] by withholding `render` calls
/// while paused.
#[derive(Debug, Clone, Default)]
pub struct PausablePlayer<S> {
    stream: S,
    paused: bool,
}

impl<S: OutputStream> PausablePlayer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            paused: false,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn render(&mut self, elapsed_ms: Millis) {
        if self.paused {
            return;
        }
        self.stream.render(elapsed_ms);
    }
}

impl<S: OutputStream> AudioPlayer for PausablePlayer<S> {
    fn play(&mut self, resource: &str) {
        if resource.is_empty() {
            tracing::warn!("play requested without a resource name, ignoring");
            return;
        }
        self.paused = false;
        self.stream.play(resource);
    }

    fn stop(&mut self) {
        self.paused = false;
        self.stream.stop();
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn is_playing(&self) -> bool {
        self.stream.is_playing()
    }

    fn is_paused(&self) -> bool {
        self.paused && self.stream.is_playing()
    }
}

/// Simulated stream with a per-resource running time. Resources without a
/// registered duration use the default, and play forever when there is none.
#[derive(Debug, Clone, Default)]
pub struct VirtualStream {
    durations: HashMap<String, Millis>,
    default_duration: Option<Millis>,
    current: Option<String>,
    remaining: Option<Millis>,
    plays: usize,
}

impl VirtualStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_duration(duration_ms: Millis) -> Self {
        Self {
            default_duration: Some(duration_ms),
            ..Self::default()
        }
    }

    pub fn set_duration(&mut self, resource: impl Into<String>, duration_ms: Millis) {
        self.durations.insert(resource.into(), duration_ms);
    }

    /// Resource currently producing output.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn remaining_ms(&self) -> Option<Millis> {
        self.remaining
    }

    /// Number of `play` calls so far.
    pub fn plays(&self) -> usize {
        self.plays
    }
}

impl OutputStream for VirtualStream {
    fn play(&mut self, resource: &str) {
        self.remaining = self
            .durations
            .get(resource)
            .copied()
            .or(self.default_duration);
        self.current = Some(resource.to_string());
        self.plays += 1;
    }

    fn stop(&mut self) {
        self.current = None;
        self.remaining = None;
    }

    fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    fn render(&mut self, elapsed_ms: Millis) {
        if self.current.is_none() {
            return;
        }
        if let Some(remaining) = self.remaining {
            if elapsed_ms >= remaining {
                self.stop();
            } else {
                self.remaining = Some(remaining - elapsed_ms);
            }
        }
    }
}

/// Mixer that records the last gain and the number of writes per track.
#[derive(Debug, Clone, Default)]
pub struct VirtualMixer {
    gains: [f32; NUM_TRACKS],
    writes: [usize; NUM_TRACKS],
}

impl VirtualMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(&self, track: TrackId) -> f32 {
        self.gains[track.index()]
    }

    pub fn writes(&self, track: TrackId) -> usize {
        self.writes[track.index()]
    }
}

impl Mixer for VirtualMixer {
    fn set_gain(&mut self, track: TrackId, gain: f32) {
        self.gains[track.index()] = gain.clamp(0.0, 1.0);
        self.writes[track.index()] += 1;
    }
}
