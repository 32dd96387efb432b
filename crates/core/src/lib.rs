//! Core library for the Tactile sound installation controller.
//!
//! Proximity sensors are sampled and debounced into touch events, which the
//! interaction layer turns into start, stop, pause and resume commands for
//! one playback channel per sensor. Hardware sits behind small capability
//! traits so the same logic drives real devices, the simulator and tests.

pub mod audio;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod interaction;
pub mod playback;
pub mod sensors;
pub mod timeline;

pub use audio::{AudioPlayer, Mixer, OutputStream, PausablePlayer, VirtualMixer, VirtualStream};
pub use catalog::{MemoryCatalog, TrackCatalog};
pub use channel::{SensorId, TrackId, NUM_SENSORS, NUM_TRACKS};
pub use config::{AppConfig, InteractionConfig, PlaybackConfig, RuntimeConfig, SensorConfig};
pub use error::{Result, TactileError};
pub use interaction::{
    ActivityIndicator, InteractionController, TickOutcome, TrackCommand, TrackExclusivity,
    VolumeMode,
};
pub use playback::PlaybackEngine;
pub use sensors::{
    ManualSensors, ProximitySource, SensorDebouncer, TouchChange, TouchReport, TouchStatus,
};
pub use timeline::{Clock, ManualClock, Millis, TickClock};
