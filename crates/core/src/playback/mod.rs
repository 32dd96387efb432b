use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::audio::{AudioPlayer, Mixer};
use crate::catalog::TrackCatalog;
use crate::channel::{TrackId, NUM_TRACKS};
use crate::timeline::Millis;

pub const DEFAULT_VOLUME: u8 = 100;
/// Upper bound on draws when avoiding an immediate repeat of a random pick.
pub const RANDOM_PICK_ATTEMPTS: usize = 30;
/// Players do not report `is_playing` reliably right after `play`, so natural
/// end-of-track is not evaluated this soon after a start.
pub const END_OF_TRACK_GRACE_MS: Millis = 50;

#[derive(Debug, Clone)]
struct TrackState {
    target_volume: u8,
    actual_volume: u8,
    /// Set while the track is logically playing; drives fade-in.
    last_start_time: Option<Millis>,
    /// Set after a stop or pause; drives fade-out. Never set together with
    /// `last_start_time`.
    last_stop_time: Option<Millis>,
    /// Length of the fade currently in progress, shorter than the configured
    /// time when the fade starts part way.
    this_fade_in_time: Millis,
    this_fade_out_time: Millis,
    paused: bool,
    last_random_index: Option<usize>,
    loop_mode: bool,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            target_volume: DEFAULT_VOLUME,
            actual_volume: 0,
            last_start_time: None,
            last_stop_time: None,
            this_fade_in_time: 0,
            this_fade_out_time: 0,
            paused: false,
            last_random_index: None,
            loop_mode: false,
        }
    }
}

/// Owns the per-track playback lifecycle: start, stop, pause and resume with
/// linear fades, random selection from a track's collection, and looping at
/// natural end of track.
///
/// Volumes are percentages. The engine never blocks; time only moves through
/// the `now` passed to each call, and [`PlaybackEngine::do_tick`] must run once
/// per control loop iteration to advance fades.
pub struct PlaybackEngine<P, M, C> {
    players: [P; NUM_TRACKS],
    mixer: M,
    catalog: C,
    tracks: [TrackState; NUM_TRACKS],
    fade_in_time: Millis,
    fade_out_time: Millis,
    random_track_mode: bool,
    loop_mode: bool,
    rng: StdRng,
}

impl<P, M, C> PlaybackEngine<P, M, C>
where
    P: AudioPlayer,
    M: Mixer,
    C: TrackCatalog,
{
    pub fn new(players: [P; NUM_TRACKS], mixer: M, catalog: C) -> Self {
        Self::with_rng(players, mixer, catalog, StdRng::from_entropy())
    }

    /// Same as [`PlaybackEngine::new`] with an explicit random source, for
    /// reproducible selection.
    pub fn with_rng(players: [P; NUM_TRACKS], mixer: M, catalog: C, rng: StdRng) -> Self {
        Self {
            players,
            mixer,
            catalog,
            tracks: std::array::from_fn(|_| TrackState::default()),
            fade_in_time: 0,
            fade_out_time: 0,
            random_track_mode: false,
            loop_mode: false,
            rng,
        }
    }

    pub fn player(&self, track: TrackId) -> &P {
        &self.players[track.index()]
    }

    pub fn player_mut(&mut self, track: TrackId) -> &mut P {
        &mut self.players[track.index()]
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.players.iter_mut()
    }

    pub fn mixer(&self) -> &M {
        &self.mixer
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn track_name(&self, track: TrackId) -> Option<&str> {
        self.catalog.file_name(track)
    }

    /// Sets the target volume. Without a fade-in it takes effect at once.
    pub fn set_volume(&mut self, track: TrackId, percent: i32) {
        let percent = percent.clamp(0, 100) as u8;
        self.tracks[track.index()].target_volume = percent;
        if self.fade_in_time == 0 {
            self.set_actual_volume(track, percent);
        }
    }

    pub fn set_all_volumes(&mut self, percent: i32) {
        for track in TrackId::all() {
            self.set_volume(track, percent);
        }
    }

    pub fn target_volume(&self, track: TrackId) -> u8 {
        self.tracks[track.index()].target_volume
    }

    pub fn actual_volume(&self, track: TrackId) -> u8 {
        self.tracks[track.index()].actual_volume
    }

    pub fn set_fade_in_time(&mut self, milliseconds: i64) {
        self.fade_in_time = milliseconds.max(0) as Millis;
        tracing::debug!(fade_in_ms = self.fade_in_time, "fade-in time set");
    }

    pub fn set_fade_out_time(&mut self, milliseconds: i64) {
        self.fade_out_time = milliseconds.max(0) as Millis;
        tracing::debug!(fade_out_ms = self.fade_out_time, "fade-out time set");
    }

    pub fn fade_in_time(&self) -> Millis {
        self.fade_in_time
    }

    pub fn fade_out_time(&self) -> Millis {
        self.fade_out_time
    }

    pub fn set_random_track_mode(&mut self, on: bool) {
        self.random_track_mode = on;
        tracing::debug!(on, "random track mode set");
    }

    pub fn random_track_mode(&self) -> bool {
        self.random_track_mode
    }

    pub fn set_loop_mode(&mut self, on: bool) {
        self.loop_mode = on;
        tracing::debug!(on, "loop mode set");
    }

    pub fn set_track_loop_mode(&mut self, track: TrackId, on: bool) {
        self.tracks[track.index()].loop_mode = on;
        tracing::debug!(%track, on, "track loop mode set");
    }

    /// Whether `track` restarts at its natural end.
    pub fn loops(&self, track: TrackId) -> bool {
        self.loop_mode || self.tracks[track.index()].loop_mode
    }

    pub fn last_start_time(&self, track: TrackId) -> Option<Millis> {
        self.tracks[track.index()].last_start_time
    }

    pub fn last_stop_time(&self, track: TrackId) -> Option<Millis> {
        self.tracks[track.index()].last_stop_time
    }

    pub fn last_random_index(&self, track: TrackId) -> Option<usize> {
        self.tracks[track.index()].last_random_index
    }

    pub fn is_playing(&self, track: TrackId) -> bool {
        self.players[track.index()].is_playing()
    }

    /// Logical pause flag. It is set as soon as a pause is requested, even
    /// while the fade-out is still audible.
    pub fn is_paused(&self, track: TrackId) -> bool {
        self.tracks[track.index()].paused
    }

    /// Starts `track` from the beginning. Returns false when nothing could be
    /// played, in which case no state changes.
    pub fn start_track(&mut self, track: TrackId, now: Millis) -> bool {
        let started = if self.random_track_mode {
            self.play_random(track)
        } else {
            self.play_fixed(track)
        };
        if !started {
            return false;
        }

        self.tracks[track.index()].paused = false;
        self.begin_fade_in(track, now);
        tracing::debug!(%track, now, "track started");
        true
    }

    /// Stops `track`. With a fade-out configured the player keeps running
    /// until [`PlaybackEngine::do_tick`] brings the volume to zero.
    pub fn stop_track(&mut self, track: TrackId, now: Millis) {
        let i = track.index();
        if self.fade_out_time == 0 || self.tracks[i].actual_volume == 0 {
            self.players[i].stop();
            self.set_actual_volume(track, 0);
        } else {
            self.tracks[i].this_fade_out_time = self.local_fade_time(track, false);
        }

        let state = &mut self.tracks[i];
        state.paused = false;
        state.last_stop_time = Some(now);
        state.last_start_time = None;
        tracing::debug!(%track, now, "track stopped");
    }

    /// Like [`PlaybackEngine::stop_track`] but keeps the position so a later
    /// resume continues where it left off.
    pub fn pause_track(&mut self, track: TrackId, now: Millis) {
        let i = track.index();
        if self.fade_out_time == 0 || self.tracks[i].actual_volume == 0 {
            self.players[i].pause();
            self.set_actual_volume(track, 0);
        } else {
            self.tracks[i].this_fade_out_time = self.local_fade_time(track, false);
        }

        let state = &mut self.tracks[i];
        state.paused = true;
        state.last_start_time = None;
        state.last_stop_time = Some(now);
        tracing::debug!(%track, now, "track paused");
    }

    pub fn resume_track(&mut self, track: TrackId, now: Millis) -> bool {
        let i = track.index();
        if !self.players[i].is_playing() {
            // The stream ran out while paused; there is nothing to resume.
            tracing::debug!(%track, "paused track already ended, starting it again");
            self.tracks[i].paused = false;
            return self.start_track(track, now);
        }

        self.players[i].resume();
        self.tracks[i].paused = false;
        self.begin_fade_in(track, now);
        tracing::debug!(%track, now, "track resumed");
        true
    }

    /// Drops any fade in progress and silences the track without touching
    /// the player's play/pause state.
    pub fn cancel_fades(&mut self, track: TrackId) {
        let state = &mut self.tracks[track.index()];
        state.last_start_time = None;
        state.last_stop_time = None;
        self.set_actual_volume(track, 0);
    }

    /// Stops every track that is producing output, paused ones included.
    /// Returns how many were stopped.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for track in TrackId::all() {
            let i = track.index();
            if self.players[i].is_playing() {
                self.players[i].stop();
                cancelled += 1;
            }
            let state = &mut self.tracks[i];
            state.last_start_time = None;
            state.last_stop_time = None;
            state.paused = false;
            if state.actual_volume != 0 {
                self.set_actual_volume(track, 0);
            }
        }
        cancelled
    }

    /// Advances fades and handles natural end of track. Call once per loop.
    pub fn do_tick(&mut self, now: Millis) {
        for track in TrackId::all() {
            self.advance_fade(track, now);
        }
        for track in TrackId::all() {
            self.check_end_of_track(track, now);
        }
    }

    fn play_fixed(&mut self, track: TrackId) -> bool {
        let i = track.index();
        let Some(name) = self.catalog.file_name(track) else {
            tracing::warn!(%track, "no catalog entry for track, nothing to play");
            return false;
        };
        tracing::debug!(%track, name, "playing track");
        self.players[i].play(name);
        true
    }

    fn play_random(&mut self, track: TrackId) -> bool {
        let i = track.index();
        let collection = i;
        let count = self.catalog.file_count(collection);
        if count == 0 {
            tracing::warn!(%track, "random collection is empty, nothing to play");
            return false;
        }

        let last = self.tracks[i].last_random_index;
        let mut pick = self.rng.gen_range(0..count);
        let mut attempts = 1;
        while Some(pick) == last && attempts < RANDOM_PICK_ATTEMPTS {
            pick = self.rng.gen_range(0..count);
            attempts += 1;
        }
        self.tracks[i].last_random_index = Some(pick);

        let Some(name) = self.catalog.file_name_in(collection, pick) else {
            tracing::warn!(%track, pick, "random pick has no catalog entry");
            return false;
        };
        tracing::debug!(%track, pick, name, "playing random track");
        self.players[i].play(name);
        true
    }

    fn begin_fade_in(&mut self, track: TrackId, now: Millis) {
        let i = track.index();
        if self.fade_in_time == 0 {
            let target = self.tracks[i].target_volume;
            self.set_actual_volume(track, target);
        } else {
            self.tracks[i].this_fade_in_time = self.local_fade_time(track, true);
        }
        let state = &mut self.tracks[i];
        state.last_start_time = Some(now);
        state.last_stop_time = None;
    }

    /// Length of the fade from the current volume, as a share of the
    /// configured fade time proportional to the distance still to cover.
    fn local_fade_time(&self, track: TrackId, going_up: bool) -> Millis {
        let state = &self.tracks[track.index()];
        let target = state.target_volume as f64;
        if target <= 0.0 {
            return 0;
        }
        let actual = (state.actual_volume as f64).min(target);
        let (delta, fade_time) = if going_up {
            (target - actual, self.fade_in_time)
        } else {
            (actual, self.fade_out_time)
        };
        (fade_time as f64 * delta / target).round() as Millis
    }

    fn advance_fade(&mut self, track: TrackId, now: Millis) {
        let i = track.index();
        let fade_in = self.fade_in_time;
        let fade_out = self.fade_out_time;
        let state = self.tracks[i].clone();
        let target = state.target_volume as Millis;
        let actual = state.actual_volume as Millis;
        let playing = self.players[i].is_playing();

        match (state.last_start_time, state.last_stop_time) {
            (Some(start), _) if fade_in != 0 && actual < target && playing => {
                // A fade that began part way is pushed forward by the time the
                // skipped portion would have taken.
                let elapsed = now.saturating_sub(start)
                    + fade_in.saturating_sub(state.this_fade_in_time);
                let volume = (target * elapsed / fade_in).min(target);
                if volume != actual {
                    tracing::trace!(%track, volume, "fade-in step");
                    self.set_actual_volume(track, volume as u8);
                }
            }
            (_, Some(stop)) if fade_out != 0 && actual > 0 && playing => {
                let elapsed = now.saturating_sub(stop)
                    + fade_out.saturating_sub(state.this_fade_out_time);
                let volume = target.saturating_sub(target * elapsed / fade_out);
                if volume == actual {
                    return;
                }
                tracing::trace!(%track, volume, "fade-out step");
                self.set_actual_volume(track, volume as u8);
                if volume == 0 {
                    if state.paused {
                        self.players[i].pause();
                        tracing::debug!(%track, "fade-out done, track paused");
                    } else {
                        self.players[i].stop();
                        tracing::debug!(%track, "fade-out done, track stopped");
                    }
                    self.tracks[i].last_stop_time = None;
                }
            }
            _ => {}
        }
    }

    fn check_end_of_track(&mut self, track: TrackId, now: Millis) {
        let i = track.index();
        let Some(start) = self.tracks[i].last_start_time else {
            return;
        };
        if now.saturating_sub(start) <= END_OF_TRACK_GRACE_MS || self.players[i].is_playing() {
            return;
        }

        if self.loops(track) {
            tracing::info!(%track, "end of track, looping");
            self.start_track(track, now);
        } else {
            tracing::info!(%track, "end of track");
            let state = &mut self.tracks[i];
            state.last_start_time = None;
            state.last_stop_time = Some(now);
        }
    }

    fn set_actual_volume(&mut self, track: TrackId, percent: u8) {
        self.tracks[track.index()].actual_volume = percent;
        self.mixer.set_gain(track, percent as f32 / 100.0);
    }
}

impl<P, M, C> fmt::Debug for PlaybackEngine<P, M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("tracks", &self.tracks)
            .field("fade_in_time", &self.fade_in_time)
            .field("fade_out_time", &self.fade_out_time)
            .field("random_track_mode", &self.random_track_mode)
            .field("loop_mode", &self.loop_mode)
            .finish()
    }
}
