use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::MemoryCatalog;
use crate::playback::DEFAULT_VOLUME;
use crate::sensors::{DEFAULT_AVERAGING_SAMPLES, DEFAULT_RELEASE_THRESHOLD, DEFAULT_TOUCH_THRESHOLD};
use crate::Result;

/// Top-level configuration structure for the installation.
///
/// Sensor and track numbers in this document are one-based, as seen by the
/// people wiring and configuring the installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sensors: SensorConfig,
    pub playback: PlaybackConfig,
    pub interaction: InteractionConfig,
    pub catalog: MemoryCatalog,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Percent, applied to every sensor before per-sensor overrides.
    pub touch_threshold: f32,
    pub release_threshold: f32,
    /// Smoothing window in samples; 0 disables smoothing.
    pub averaging_samples: i64,
    pub overrides: Vec<SensorOverride>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            touch_threshold: DEFAULT_TOUCH_THRESHOLD,
            release_threshold: DEFAULT_RELEASE_THRESHOLD,
            averaging_samples: DEFAULT_AVERAGING_SAMPLES as i64,
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorOverride {
    /// One-based sensor number.
    pub sensor: i64,
    pub touch_threshold: Option<f32>,
    pub release_threshold: Option<f32>,
    pub ignore: bool,
    pub proximity_multiplier: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Percent, applied to every track before per-track volumes.
    pub volume: i32,
    pub track_volumes: Vec<TrackVolume>,
    pub fade_in_ms: i64,
    pub fade_out_ms: i64,
    pub random_tracks: bool,
    pub loop_tracks: bool,
    /// One-based numbers of tracks that loop regardless of `loop_tracks`.
    pub looped: Vec<i64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME as i32,
            track_volumes: Vec::new(),
            fade_in_ms: 0,
            fade_out_ms: 0,
            random_tracks: false,
            loop_tracks: false,
            looped: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackVolume {
    /// One-based track number.
    pub track: i64,
    pub percent: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Each touch toggles its track instead of release stopping it.
    pub touch_to_stop: bool,
    pub multi_track: bool,
    /// Release pauses, and the next touch resumes where it left off.
    pub continue_track: bool,
    /// Seconds without activity before every track is cancelled; 0 disables.
    pub inactivity_timeout_secs: i64,
    pub proximity_as_volume: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Control loop period.
    pub tick_ms: u64,
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1,
            log_filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sensors.touch_threshold, 95.0);
        assert_eq!(config.sensors.release_threshold, 65.0);
        assert_eq!(config.sensors.averaging_samples, 200);
        assert_eq!(config.playback.volume, 100);
        assert_eq!(config.interaction.inactivity_timeout_secs, 0);
        assert_eq!(config.runtime.log_filter, "info");
    }

    #[test]
    fn parses_partial_sections() {
        let config = AppConfig::from_json_str(
            r#"{
                "sensors": { "overrides": [ { "sensor": 2, "ignore": true } ] },
                "playback": { "fade_in_ms": 1500, "track_volumes": [ { "track": 1, "percent": 40 } ] },
                "interaction": { "multi_track": true, "inactivity_timeout_secs": 30 },
                "catalog": { "tracks": ["ONE.WAV", "TWO.WAV"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.sensors.touch_threshold, 95.0);
        assert_eq!(config.sensors.overrides[0].sensor, 2);
        assert!(config.sensors.overrides[0].ignore);
        assert_eq!(config.sensors.overrides[0].proximity_multiplier, None);
        assert_eq!(config.playback.fade_in_ms, 1500);
        assert_eq!(config.playback.track_volumes[0], TrackVolume { track: 1, percent: 40 });
        assert!(config.interaction.multi_track);
        assert_eq!(config.interaction.inactivity_timeout_secs, 30);
        assert_eq!(config.catalog.tracks.len(), 2);
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = AppConfig::from_json_str(r#"{ "playback": { "volume": "loud" } }"#).unwrap_err();
        assert!(format!("{err}").starts_with("invalid configuration"));
    }

    #[test]
    fn round_trips_through_pretty_json() {
        let mut config = AppConfig::default();
        config.interaction.continue_track = true;
        let text = config.to_json_pretty().unwrap();
        assert_eq!(AppConfig::from_json_str(&text).unwrap(), config);
    }
}
