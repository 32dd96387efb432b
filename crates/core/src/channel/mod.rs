//! Small integer ids for the fixed sensor and track arrays.
//!
//! Every id is range-checked at construction, so array indexing inside the
//! crate never panics. Out-of-range values are clamped to the nearest valid
//! channel with a warning rather than rejected.
//!
//! Internally channels are numbered from zero. The installation-facing
//! numbering (configuration files, the command line, log output) starts at
//! one; [`SensorId::from_external`] and the `Display` impls are the only
//! places where that conversion happens.

use std::fmt;

/// Number of physical touch sensors.
pub const NUM_SENSORS: usize = 4;

/// Number of audio tracks. Tracks are paired one-to-one with sensors.
pub const NUM_TRACKS: usize = NUM_SENSORS;

fn clamp_index(kind: &'static str, index: i64, len: usize) -> u8 {
    let last = len as i64 - 1;
    if index < 0 || index > last {
        let clamped = index.clamp(0, last);
        tracing::warn!(kind, index, clamped, "channel index out of range, clamping");
        clamped as u8
    } else {
        index as u8
    }
}

/// Identifies one of the [`NUM_SENSORS`] touch sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(u8);

impl SensorId {
    /// Builds an id from a zero-based index, clamping into range.
    pub fn new(index: usize) -> Self {
        Self(clamp_index("sensor", index.min(i64::MAX as usize) as i64, NUM_SENSORS))
    }

    /// Builds an id from the one-based number used by configuration and
    /// operators.
    pub fn from_external(number: i64) -> Self {
        Self(clamp_index("sensor", number.saturating_sub(1), NUM_SENSORS))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// One-based number for display.
    pub fn external(self) -> usize {
        self.index() + 1
    }

    /// The track paired with this sensor.
    pub fn track(self) -> TrackId {
        TrackId(self.0)
    }

    /// All sensors in ascending order.
    pub fn all() -> impl Iterator<Item = SensorId> {
        (0..NUM_SENSORS as u8).map(SensorId)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.external())
    }
}

/// Identifies one of the [`NUM_TRACKS`] audio tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u8);

impl TrackId {
    /// Builds an id from a zero-based index, clamping into range.
    pub fn new(index: usize) -> Self {
        Self(clamp_index("track", index.min(i64::MAX as usize) as i64, NUM_TRACKS))
    }

    /// Builds an id from the one-based number used by configuration and
    /// operators.
    pub fn from_external(number: i64) -> Self {
        Self(clamp_index("track", number.saturating_sub(1), NUM_TRACKS))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn external(self) -> usize {
        self.index() + 1
    }

    /// The sensor paired with this track.
    pub fn sensor(self) -> SensorId {
        SensorId(self.0)
    }

    /// All tracks in ascending order.
    pub fn all() -> impl Iterator<Item = TrackId> {
        (0..NUM_TRACKS as u8).map(TrackId)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.external())
    }
}

impl From<SensorId> for TrackId {
    fn from(sensor: SensorId) -> Self {
        sensor.track()
    }
}
