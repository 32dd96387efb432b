//! Top-level policy: maps sensor activity to track commands.
//!
//! One [`InteractionController::tick`] is one iteration of the polling loop.
//! It reads the sensors, applies the touch-driven or proximity-as-volume
//! policy, advances playback bookkeeping and finally checks the inactivity
//! timeout, always in that order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioPlayer, Mixer};
use crate::catalog::TrackCatalog;
use crate::channel::{SensorId, TrackId, NUM_SENSORS};
use crate::config::AppConfig;
use crate::playback::PlaybackEngine;
use crate::sensors::{ProximitySource, SensorDebouncer, TouchChange, TouchReport};
use crate::timeline::Millis;
use crate::{Result, TactileError};

/// Steps in one software PWM period of the activity indicator.
pub const INDICATOR_PWM_STEPS: u32 = 100;

/// Whether several tracks may play at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackExclusivity {
    /// At most one track plays; the lowest-numbered touched sensor wins.
    #[default]
    SingleTrack,
    MultiTrack,
}

/// What sensor readings control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolumeMode {
    /// Touch and release edges start and stop tracks at a fixed volume.
    #[default]
    TouchDriven,
    /// Proximity sets the volume of the track, continuously.
    ProximityAsVolume,
}

/// Command issued to the playback engine during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCommand {
    Start(TrackId),
    /// Start issued while the player was still producing output.
    Restart(TrackId),
    Resume(TrackId),
    Pause(TrackId),
    Stop(TrackId),
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub commands: Vec<TrackCommand>,
    /// Number of tracks cancelled by the inactivity timeout, when it fired.
    pub timed_out: Option<usize>,
}

/// Output that signals sensor activity, such as a status LED.
pub trait ActivityIndicator {
    fn set_lit(&mut self, lit: bool);
}

pub struct InteractionController<S, P, M, C> {
    sensors: SensorDebouncer<S>,
    playback: PlaybackEngine<P, M, C>,
    exclusivity: TrackExclusivity,
    volume_mode: VolumeMode,
    continue_track: bool,
    /// Single-track touch mode only: the one track allowed to play.
    currently_playing: Option<TrackId>,
    restart_timeout_ms: Millis,
    last_action_time: Millis,
    indicator: Option<Box<dyn ActivityIndicator>>,
    indicator_cycle: u32,
}

impl<S, P, M, C> InteractionController<S, P, M, C>
where
    S: ProximitySource,
    P: AudioPlayer,
    M: Mixer,
    C: TrackCatalog,
{
    /// Builds a controller in single-track, touch-driven, stop-on-release
    /// mode with the inactivity timeout disabled.
    pub fn new(sensors: SensorDebouncer<S>, playback: PlaybackEngine<P, M, C>, now: Millis) -> Self {
        Self {
            sensors,
            playback,
            exclusivity: TrackExclusivity::default(),
            volume_mode: VolumeMode::default(),
            continue_track: false,
            currently_playing: None,
            restart_timeout_ms: 0,
            last_action_time: now,
            indicator: None,
            indicator_cycle: 0,
        }
    }

    pub fn sensors(&self) -> &SensorDebouncer<S> {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut SensorDebouncer<S> {
        &mut self.sensors
    }

    pub fn playback(&self) -> &PlaybackEngine<P, M, C> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackEngine<P, M, C> {
        &mut self.playback
    }

    pub fn set_indicator(&mut self, indicator: Box<dyn ActivityIndicator>) {
        self.indicator = Some(indicator);
    }

    pub fn currently_playing(&self) -> Option<TrackId> {
        self.currently_playing
    }

    pub fn exclusivity(&self) -> TrackExclusivity {
        self.exclusivity
    }

    pub fn volume_mode(&self) -> VolumeMode {
        self.volume_mode
    }

    pub fn continue_track(&self) -> bool {
        self.continue_track
    }

    pub fn restart_timeout_ms(&self) -> Millis {
        self.restart_timeout_ms
    }

    pub fn last_action_time(&self) -> Millis {
        self.last_action_time
    }

    pub fn track_name(&self, track: TrackId) -> Option<&str> {
        self.playback.track_name(track)
    }

    pub fn set_touch_release_thresholds(&mut self, touch: f32, release: f32) {
        self.sensors.set_thresholds(None, touch, release);
    }

    pub fn set_sensor_thresholds(&mut self, sensor: SensorId, touch: f32, release: f32) {
        self.sensors.set_thresholds(Some(sensor), touch, release);
    }

    pub fn ignore_sensor(&mut self, sensor: SensorId, ignore: bool) {
        self.sensors.set_ignored(sensor, ignore);
    }

    pub fn set_proximity_multiplier(&mut self, sensor: SensorId, multiplier: f32) {
        self.sensors.set_proximity_multiplier(sensor, multiplier);
    }

    pub fn set_averaging_strength(&mut self, samples: i64) {
        self.sensors.set_averaging_strength(samples);
    }

    /// Touch-on/touch-off instead of touch-on/release-off.
    pub fn set_touch_to_stop(&mut self, on: bool) {
        self.sensors.set_toggle_mode(on);
    }

    pub fn set_multi_track_mode(&mut self, on: bool) {
        self.exclusivity = if on {
            TrackExclusivity::MultiTrack
        } else {
            TrackExclusivity::SingleTrack
        };
        self.currently_playing = None;
        tracing::debug!(on, "multi-track mode set");
    }

    pub fn set_continue_track_mode(&mut self, on: bool) {
        self.continue_track = on;
        tracing::debug!(on, "continue-track mode set");
    }

    /// Seconds of inactivity before every track is cancelled; 0 disables.
    pub fn set_inactivity_timeout(&mut self, seconds: i64) {
        self.restart_timeout_ms = (seconds.max(0) as Millis).saturating_mul(1000);
        tracing::debug!(timeout_ms = self.restart_timeout_ms, "inactivity timeout set");
    }

    pub fn set_play_random_track_mode(&mut self, on: bool) {
        self.playback.set_random_track_mode(on);
    }

    pub fn set_loop_mode(&mut self, on: bool) {
        self.playback.set_loop_mode(on);
    }

    pub fn set_track_loop_mode(&mut self, track: TrackId, on: bool) {
        self.playback.set_track_loop_mode(track, on);
    }

    pub fn set_volume(&mut self, percent: i32) {
        self.playback.set_all_volumes(percent);
    }

    pub fn set_track_volume(&mut self, track: TrackId, percent: i32) {
        self.playback.set_volume(track, percent);
    }

    /// Fades are incompatible with proximity-as-volume, so enabling it also
    /// zeroes both fade times.
    pub fn set_proximity_as_volume_mode(&mut self, on: bool) {
        self.volume_mode = if on {
            VolumeMode::ProximityAsVolume
        } else {
            VolumeMode::TouchDriven
        };
        self.currently_playing = None;
        if on {
            self.playback.set_fade_in_time(0);
            self.playback.set_fade_out_time(0);
        }
        tracing::debug!(on, "proximity-as-volume mode set");
    }

    /// Refused, with the previous value kept, while proximity-as-volume is on.
    pub fn set_fade_in_time(&mut self, milliseconds: i64) -> Result<()> {
        if milliseconds > 0 && self.volume_mode == VolumeMode::ProximityAsVolume {
            tracing::warn!(
                milliseconds,
                "proximity-as-volume mode is incompatible with fades, fade-in time ignored"
            );
            return Err(TactileError::Incompatible(
                "fade-in time while proximity-as-volume mode is active",
            ));
        }
        self.playback.set_fade_in_time(milliseconds);
        Ok(())
    }

    /// Refused, with the previous value kept, while proximity-as-volume is on.
    pub fn set_fade_out_time(&mut self, milliseconds: i64) -> Result<()> {
        if milliseconds > 0 && self.volume_mode == VolumeMode::ProximityAsVolume {
            tracing::warn!(
                milliseconds,
                "proximity-as-volume mode is incompatible with fades, fade-out time ignored"
            );
            return Err(TactileError::Incompatible(
                "fade-out time while proximity-as-volume mode is active",
            ));
        }
        self.playback.set_fade_out_time(milliseconds);
        Ok(())
    }

    /// Applies every option of `config` through the regular setters. Refused
    /// combinations are logged and skipped.
    pub fn apply_config(&mut self, config: &AppConfig) {
        let sensors = &config.sensors;
        self.set_touch_release_thresholds(sensors.touch_threshold, sensors.release_threshold);
        self.set_averaging_strength(sensors.averaging_samples);
        for entry in &sensors.overrides {
            let sensor = SensorId::from_external(entry.sensor);
            if entry.touch_threshold.is_some() || entry.release_threshold.is_some() {
                let touch = entry
                    .touch_threshold
                    .unwrap_or_else(|| self.sensors.touch_threshold(sensor));
                let release = entry
                    .release_threshold
                    .unwrap_or_else(|| self.sensors.release_threshold(sensor));
                self.set_sensor_thresholds(sensor, touch, release);
            }
            self.ignore_sensor(sensor, entry.ignore);
            if let Some(multiplier) = entry.proximity_multiplier {
                self.set_proximity_multiplier(sensor, multiplier);
            }
        }

        let interaction = &config.interaction;
        self.set_touch_to_stop(interaction.touch_to_stop);
        self.set_multi_track_mode(interaction.multi_track);
        self.set_continue_track_mode(interaction.continue_track);
        self.set_inactivity_timeout(interaction.inactivity_timeout_secs);

        let playback = &config.playback;
        if !interaction.proximity_as_volume {
            self.set_proximity_as_volume_mode(false);
        }
        if let Err(err) = self.set_fade_in_time(playback.fade_in_ms) {
            tracing::warn!(%err, "configuration entry skipped");
        }
        if let Err(err) = self.set_fade_out_time(playback.fade_out_ms) {
            tracing::warn!(%err, "configuration entry skipped");
        }
        if interaction.proximity_as_volume {
            if playback.fade_in_ms > 0 || playback.fade_out_ms > 0 {
                tracing::warn!("fade times are ignored in proximity-as-volume mode");
            }
            self.set_proximity_as_volume_mode(true);
        }

        self.set_volume(playback.volume);
        for entry in &playback.track_volumes {
            self.set_track_volume(TrackId::from_external(entry.track), entry.percent);
        }
        self.set_play_random_track_mode(playback.random_tracks);
        self.set_loop_mode(playback.loop_tracks);
        for track in TrackId::all() {
            self.set_track_loop_mode(track, false);
        }
        for number in &playback.looped {
            self.set_track_loop_mode(TrackId::from_external(*number), true);
        }
    }

    /// Runs one iteration of the control loop at time `now`.
    pub fn tick(&mut self, now: Millis) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        match self.volume_mode {
            VolumeMode::TouchDriven => self.touch_policy(now, &mut outcome),
            VolumeMode::ProximityAsVolume => self.proximity_policy(now, &mut outcome),
        }

        self.playback.do_tick(now);

        if self.volume_mode == VolumeMode::TouchDriven {
            self.release_finished_tracks();
        }

        if self.restart_timeout_ms > 0
            && now.saturating_sub(self.last_action_time) > self.restart_timeout_ms
        {
            let cancelled = self.playback.cancel_all();
            if cancelled > 0 {
                tracing::info!(
                    timeout_ms = self.restart_timeout_ms,
                    cancelled,
                    "inactivity timeout"
                );
                self.last_action_time = now;
                self.currently_playing = None;
                self.sensors.clear_toggle_latches();
                outcome.timed_out = Some(cancelled);
            }
        }

        outcome
    }

    fn touch_policy(&mut self, now: Millis, outcome: &mut TickOutcome) {
        let report = self.sensors.poll_status(now);

        if report.num_touched > 0 || report.num_changes > 0 {
            self.last_action_time = now;
        }
        self.light_indicator(report.num_touched > 0);

        if report.num_changes == 0 {
            return;
        }

        match self.exclusivity {
            TrackExclusivity::MultiTrack => self.multi_track_policy(&report, now, outcome),
            TrackExclusivity::SingleTrack => self.single_track_policy(&report, now, outcome),
        }
    }

    /// Every sensor drives its own track independently.
    fn multi_track_policy(&mut self, report: &TouchReport, now: Millis, outcome: &mut TickOutcome) {
        for sensor in SensorId::all() {
            let track = sensor.track();
            let playing = self.playback.is_playing(track);
            match report.change(sensor) {
                TouchChange::NewTouch if !playing => {
                    if !self.continue_track {
                        self.playback.cancel_fades(track);
                    }
                    if self.playback.start_track(track, now) {
                        tracing::info!(%track, "start track");
                        outcome.commands.push(TrackCommand::Start(track));
                    }
                }
                TouchChange::NewTouch if self.playback.is_paused(track) => {
                    if self.playback.resume_track(track, now) {
                        tracing::info!(%track, "resume track");
                        outcome.commands.push(TrackCommand::Resume(track));
                    }
                }
                TouchChange::NewTouch => {
                    if self.playback.start_track(track, now) {
                        tracing::info!(%track, "restart track");
                        outcome.commands.push(TrackCommand::Restart(track));
                    }
                }
                TouchChange::NewRelease if playing => self.release_track(track, now, outcome),
                TouchChange::NewRelease | TouchChange::NoChange => {}
            }
        }
    }

    /// Only one track plays. It keeps playing while its sensor stays touched;
    /// once released, the lowest-numbered sensor still touched takes over.
    fn single_track_policy(&mut self, report: &TouchReport, now: Millis, outcome: &mut TickOutcome) {
        if let Some(current) = self.currently_playing {
            let sensor = current.sensor();
            if report.is_touched(sensor) {
                return;
            }
            if report.change(sensor) == TouchChange::NewRelease {
                self.release_track(current, now, outcome);
                self.currently_playing = None;
            }
        }

        self.currently_playing = match report.first_touched() {
            Some(sensor) => {
                let track = sensor.track();
                self.engage_track(track, now, outcome);
                Some(track)
            }
            None => None,
        };
    }

    /// Each sensor's proximity becomes its track's volume. In single-track
    /// mode only the sensor with the highest reading is considered.
    fn proximity_policy(&mut self, now: Millis, outcome: &mut TickOutcome) {
        let mut values = [0.0_f32; NUM_SENSORS];
        let mut focus = None;
        let mut max_value = 0.0_f32;
        for sensor in SensorId::all() {
            let value = self.sensors.read_proximity_percent(sensor);
            values[sensor.index()] = value;
            if value > max_value {
                max_value = value;
                focus = Some(sensor);
            }
        }

        self.pulse_indicator(max_value);

        for sensor in SensorId::all() {
            if self.exclusivity == TrackExclusivity::SingleTrack && focus != Some(sensor) {
                continue;
            }

            let track = sensor.track();
            let value = values[sensor.index()];
            let paused = self.playback.is_paused(track);
            let playing = self.playback.is_playing(track) && !paused;

            if value > self.sensors.touch_threshold(sensor) {
                if !playing {
                    if paused {
                        if self.playback.resume_track(track, now) {
                            tracing::info!(%track, "resume track");
                            outcome.commands.push(TrackCommand::Resume(track));
                        }
                    } else if self.playback.start_track(track, now) {
                        tracing::info!(%track, "start track");
                        outcome.commands.push(TrackCommand::Start(track));
                    }
                }
                self.playback.set_volume(track, value as i32);
                self.last_action_time = now;
            } else if value < self.sensors.release_threshold(sensor) && playing {
                self.release_track(track, now, outcome);
                self.playback.set_volume(track, 0);
                self.last_action_time = now;
            }
        }
    }

    /// A track that ended on its own drops its sensor's toggle latch, so it
    /// no longer holds the single-track slot or reads as switched on.
    fn release_finished_tracks(&mut self) {
        for track in TrackId::all() {
            let sensor = track.sensor();
            if !self.sensors.is_latched(sensor)
                || self.playback.is_playing(track)
                || self.playback.is_paused(track)
                || self.playback.last_start_time(track).is_some()
            {
                continue;
            }
            tracing::debug!(%track, "track ended, releasing toggle latch");
            self.sensors.clear_toggle_latch(sensor);
            if self.currently_playing == Some(track) {
                self.currently_playing = None;
            }
        }
    }

    /// Starts or resumes `track` for a touch.
    fn engage_track(&mut self, track: TrackId, now: Millis, outcome: &mut TickOutcome) {
        if self.playback.is_paused(track) {
            if self.playback.resume_track(track, now) {
                tracing::info!(%track, "resume track");
                outcome.commands.push(TrackCommand::Resume(track));
            }
            return;
        }

        if !self.continue_track {
            self.playback.cancel_fades(track);
        }
        if self.playback.start_track(track, now) {
            tracing::info!(%track, "start track");
            outcome.commands.push(TrackCommand::Start(track));
        }
    }

    /// Pauses or stops `track` for a release, per continue-track mode.
    fn release_track(&mut self, track: TrackId, now: Millis, outcome: &mut TickOutcome) {
        if self.continue_track {
            self.playback.pause_track(track, now);
            tracing::info!(%track, "pause track");
            outcome.commands.push(TrackCommand::Pause(track));
        } else {
            self.playback.stop_track(track, now);
            tracing::info!(%track, "stop track");
            outcome.commands.push(TrackCommand::Stop(track));
        }
    }

    fn light_indicator(&mut self, lit: bool) {
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.set_lit(lit);
        }
    }

    /// Software PWM: lit for `percent` steps out of every hundred ticks.
    fn pulse_indicator(&mut self, percent: f32) {
        let lit = (self.indicator_cycle as f32) < percent;
        self.indicator_cycle = (self.indicator_cycle + 1) % INDICATOR_PWM_STEPS;
        self.light_indicator(lit);
    }
}

impl<S, P, M, C> fmt::Debug for InteractionController<S, P, M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionController")
            .field("exclusivity", &self.exclusivity)
            .field("volume_mode", &self.volume_mode)
            .field("continue_track", &self.continue_track)
            .field("currently_playing", &self.currently_playing)
            .field("restart_timeout_ms", &self.restart_timeout_ms)
            .field("last_action_time", &self.last_action_time)
            .finish()
    }
}
