use serde::{Deserialize, Serialize};

use crate::channel::{SensorId, NUM_SENSORS};
use crate::timeline::Millis;

/// Exclusive upper bound of a raw analog reading.
pub const ADC_FULL_SCALE: u16 = 1024;
pub const DEFAULT_TOUCH_THRESHOLD: f32 = 95.0;
pub const DEFAULT_RELEASE_THRESHOLD: f32 = 65.0;
pub const DEFAULT_AVERAGING_SAMPLES: u32 = 200;

/// Low-level acquisition boundary: one raw analog sample per call.
pub trait ProximitySource {
    /// Returns the current raw reading of `sensor`, nominally in
    /// `0..ADC_FULL_SCALE`.
    fn read_raw(&mut self, sensor: SensorId) -> u16;
}

/// In-memory source whose readings are set by the caller. Used by the
/// simulator and by tests.
#[derive(Debug, Clone, Default)]
pub struct ManualSensors {
    raw: [u16; NUM_SENSORS],
}

impl ManualSensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_raw(&mut self, sensor: SensorId, value: u16) {
        self.raw[sensor.index()] = value;
    }

    /// Sets the reading that corresponds to `percent` of full scale at a
    /// multiplier of 1.0.
    pub fn set_percent(&mut self, sensor: SensorId, percent: f32) {
        let raw = (percent.clamp(0.0, 100.0) / 100.0 * ADC_FULL_SCALE as f32).round();
        self.set_raw(sensor, raw as u16);
    }

    pub fn set_all(&mut self, raw: [u16; NUM_SENSORS]) {
        self.raw = raw;
    }

    pub fn raw(&self, sensor: SensorId) -> u16 {
        self.raw[sensor.index()]
    }
}

impl ProximitySource for ManualSensors {
    fn read_raw(&mut self, sensor: SensorId) -> u16 {
        self.raw[sensor.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TouchStatus {
    #[default]
    Released,
    Touched,
}

/// Edge reported for a sensor by a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TouchChange {
    #[default]
    NoChange,
    NewTouch,
    NewRelease,
}

/// Result of one [`SensorDebouncer::poll_status`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchReport {
    pub statuses: [TouchStatus; NUM_SENSORS],
    pub changes: [TouchChange; NUM_SENSORS],
    /// Number of entries in `changes` that are not `NoChange`.
    pub num_changes: usize,
    /// Number of sensors physically inside the touched state, before any
    /// toggle-mode remapping.
    pub num_touched: usize,
}

impl TouchReport {
    pub fn status(&self, sensor: SensorId) -> TouchStatus {
        self.statuses[sensor.index()]
    }

    pub fn change(&self, sensor: SensorId) -> TouchChange {
        self.changes[sensor.index()]
    }

    pub fn is_touched(&self, sensor: SensorId) -> bool {
        self.status(sensor) == TouchStatus::Touched
    }

    /// Lowest-numbered sensor whose reported status is touched.
    pub fn first_touched(&self) -> Option<SensorId> {
        SensorId::all().find(|sensor| self.is_touched(*sensor))
    }

    /// Compact per-sensor summary: `T`/`R` for new touches and releases,
    /// `t`/`r` for held states.
    pub fn summary(&self) -> String {
        let mut out = String::with_capacity(NUM_SENSORS);
        for (status, change) in self.statuses.iter().zip(self.changes.iter()) {
            let letter = match (change, status) {
                (TouchChange::NewTouch, _) => 'T',
                (TouchChange::NewRelease, _) => 'R',
                (TouchChange::NoChange, TouchStatus::Touched) => 't',
                (TouchChange::NoChange, TouchStatus::Released) => 'r',
            };
            out.push(letter);
        }
        out
    }
}

#[derive(Debug, Clone)]
struct SensorState {
    /// Percent at or above which the sensor becomes touched.
    touch_threshold: f32,
    /// Percent below which the sensor becomes released. Always strictly below
    /// `touch_threshold`; readings in between hold the previous status.
    release_threshold: f32,
    ignored: bool,
    proximity_multiplier: f32,
    filtered_value: f32,
    last_status: TouchStatus,
    last_pseudo_status: TouchStatus,
    last_action_time: Option<Millis>,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            touch_threshold: DEFAULT_TOUCH_THRESHOLD,
            release_threshold: DEFAULT_RELEASE_THRESHOLD,
            ignored: false,
            proximity_multiplier: 1.0,
            filtered_value: 0.0,
            last_status: TouchStatus::Released,
            last_pseudo_status: TouchStatus::Released,
            last_action_time: None,
        }
    }
}

/// Clamps touch into `[1, 100]` and release into `[0, touch - 1]`.
pub fn clamp_thresholds(touch: f32, release: f32) -> (f32, f32) {
    let touch = touch.max(1.0).min(100.0);
    let release = release.max(0.0).min(touch - 1.0);
    (touch, release)
}

/// Turns continuous proximity readings into debounced touch/release edges.
///
/// Each sensor has a hysteresis band between its release and touch
/// thresholds. In toggle mode physical releases are swallowed and every other
/// physical touch is reported as a release, so alternating touches switch a
/// sensor on and off.
#[derive(Debug)]
pub struct SensorDebouncer<S> {
    source: S,
    sensors: [SensorState; NUM_SENSORS],
    averaging_samples: u32,
    toggle_mode: bool,
}

impl<S: ProximitySource> SensorDebouncer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            sensors: std::array::from_fn(|_| SensorState::default()),
            averaging_samples: DEFAULT_AVERAGING_SAMPLES,
            toggle_mode: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Sets the hysteresis band of one sensor, or of every sensor when
    /// `sensor` is `None`. Out-of-domain values are clamped.
    pub fn set_thresholds(&mut self, sensor: Option<SensorId>, touch: f32, release: f32) {
        let (touch, release) = clamp_thresholds(touch, release);
        match sensor {
            Some(sensor) => {
                let state = &mut self.sensors[sensor.index()];
                state.touch_threshold = touch;
                state.release_threshold = release;
                tracing::debug!(%sensor, touch, release, "sensor thresholds set");
            }
            None => {
                for state in &mut self.sensors {
                    state.touch_threshold = touch;
                    state.release_threshold = release;
                }
                tracing::debug!(touch, release, "thresholds set for all sensors");
            }
        }
    }

    pub fn touch_threshold(&self, sensor: SensorId) -> f32 {
        self.sensors[sensor.index()].touch_threshold
    }

    pub fn release_threshold(&self, sensor: SensorId) -> f32 {
        self.sensors[sensor.index()].release_threshold
    }

    /// An ignored sensor reads as 0% regardless of the hardware.
    pub fn set_ignored(&mut self, sensor: SensorId, ignored: bool) {
        self.sensors[sensor.index()].ignored = ignored;
        tracing::debug!(%sensor, ignored, "sensor ignore flag set");
    }

    pub fn is_ignored(&self, sensor: SensorId) -> bool {
        self.sensors[sensor.index()].ignored
    }

    /// Scales a sensor's reading before thresholding. Values above 1.0 make
    /// the sensor more sensitive. Negative or non-finite factors clamp to 0.
    pub fn set_proximity_multiplier(&mut self, sensor: SensorId, multiplier: f32) {
        let multiplier = if multiplier.is_finite() && multiplier >= 0.0 {
            multiplier
        } else {
            tracing::warn!(%sensor, multiplier, "invalid proximity multiplier, using 0");
            0.0
        };
        self.sensors[sensor.index()].proximity_multiplier = multiplier;
    }

    pub fn proximity_multiplier(&self, sensor: SensorId) -> f32 {
        self.sensors[sensor.index()].proximity_multiplier
    }

    /// Smoothing window in samples; 0 disables smoothing.
    pub fn set_averaging_strength(&mut self, samples: i64) {
        self.averaging_samples = samples.clamp(0, u32::MAX as i64) as u32;
        tracing::debug!(samples = self.averaging_samples, "averaging strength set");
    }

    pub fn averaging_strength(&self) -> u32 {
        self.averaging_samples
    }

    /// Switches between touch-on/release-off and touch-on/touch-off.
    /// Changing the mode forgets any latched toggle state.
    pub fn set_toggle_mode(&mut self, on: bool) {
        self.toggle_mode = on;
        self.clear_toggle_latches();
        tracing::debug!(on, "touch toggle mode set");
    }

    pub fn toggle_mode(&self) -> bool {
        self.toggle_mode
    }

    /// Whether toggle mode currently reports `sensor` as switched on.
    pub fn is_latched(&self, sensor: SensorId) -> bool {
        self.toggle_mode && self.sensors[sensor.index()].last_pseudo_status == TouchStatus::Touched
    }

    /// Switches one sensor's toggle latch off without reporting an edge, so
    /// its next physical touch reads as a fresh `NewTouch`.
    pub fn clear_toggle_latch(&mut self, sensor: SensorId) {
        self.sensors[sensor.index()].last_pseudo_status = TouchStatus::Released;
    }

    /// Switches every toggle latch off.
    pub fn clear_toggle_latches(&mut self) {
        for sensor in SensorId::all() {
            self.clear_toggle_latch(sensor);
        }
    }

    pub fn last_status(&self, sensor: SensorId) -> TouchStatus {
        self.sensors[sensor.index()].last_status
    }

    pub fn last_action_time(&self, sensor: SensorId) -> Option<Millis> {
        self.sensors[sensor.index()].last_action_time
    }

    /// Samples the sensor and returns its smoothed, scaled proximity in
    /// percent, capped at 100.
    pub fn read_proximity_percent(&mut self, sensor: SensorId) -> f32 {
        let samples = self.averaging_samples;
        let state = &mut self.sensors[sensor.index()];
        if state.ignored {
            return 0.0;
        }

        let raw = self.source.read_raw(sensor) as f32;
        let value = if samples > 0 {
            // IIR filter: with a strength of 10 the new average is (9 * avg + raw) / 10.
            state.filtered_value =
                (state.filtered_value * (samples - 1) as f32 + raw) / samples as f32;
            state.filtered_value
        } else {
            raw
        };

        let percent = value * 100.0 * state.proximity_multiplier / ADC_FULL_SCALE as f32;
        percent.min(100.0)
    }

    /// Reads every sensor once and reports debounced status and edges.
    pub fn poll_status(&mut self, now: Millis) -> TouchReport {
        let mut report = TouchReport::default();

        for sensor in SensorId::all() {
            let i = sensor.index();
            let proximity = self.read_proximity_percent(sensor);
            let state = &mut self.sensors[i];

            let status = if proximity >= state.touch_threshold {
                TouchStatus::Touched
            } else if proximity < state.release_threshold {
                TouchStatus::Released
            } else {
                state.last_status
            };

            let mut change = TouchChange::NoChange;
            if status != state.last_status {
                change = match status {
                    TouchStatus::Touched => TouchChange::NewTouch,
                    TouchStatus::Released => TouchChange::NewRelease,
                };
                report.num_changes += 1;
                state.last_action_time = Some(now);
            }
            // The physical status is kept, not the toggle-mode pseudo status.
            state.last_status = status;
            if status == TouchStatus::Touched {
                report.num_touched += 1;
            }

            let mut reported = status;
            if self.toggle_mode {
                match change {
                    TouchChange::NewRelease => {
                        change = TouchChange::NoChange;
                        report.num_changes -= 1;
                    }
                    TouchChange::NewTouch => {
                        if state.last_pseudo_status == TouchStatus::Touched {
                            change = TouchChange::NewRelease;
                            state.last_pseudo_status = TouchStatus::Released;
                        } else {
                            state.last_pseudo_status = TouchStatus::Touched;
                        }
                    }
                    TouchChange::NoChange => {}
                }
                reported = state.last_pseudo_status;
            }

            report.statuses[i] = reported;
            report.changes[i] = change;
        }

        if report.num_changes > 0 {
            tracing::debug!(
                changed = report.num_changes,
                sensors = %report.summary(),
                "sensor status changed"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(index: usize) -> SensorId {
        SensorId::new(index)
    }

    fn debouncer() -> SensorDebouncer<ManualSensors> {
        let mut debouncer = SensorDebouncer::new(ManualSensors::new());
        debouncer.set_averaging_strength(0);
        debouncer
    }

    fn set(debouncer: &mut SensorDebouncer<ManualSensors>, index: usize, percent: f32) {
        debouncer.source_mut().set_percent(sensor(index), percent);
    }

    #[test]
    fn thresholds_always_keep_release_below_touch() {
        let mut d = debouncer();
        let cases = [
            (95.0, 65.0),
            (50.0, 80.0),
            (150.0, 120.0),
            (-5.0, -10.0),
            (0.0, 0.0),
            (1.0, 1.0),
            (40.0, 39.5),
            (f32::NAN, f32::NAN),
        ];
        for (touch, release) in cases {
            d.set_thresholds(None, touch, release);
            for s in SensorId::all() {
                let t = d.touch_threshold(s);
                let r = d.release_threshold(s);
                assert!(r < t, "release {r} not below touch {t}");
                assert!((1.0..=100.0).contains(&t));
                assert!(r >= 0.0);
            }
        }

        d.set_thresholds(Some(sensor(2)), 50.0, 80.0);
        assert_eq!(d.touch_threshold(sensor(2)), 50.0);
        assert_eq!(d.release_threshold(sensor(2)), 49.0);
    }

    #[test]
    fn per_sensor_thresholds_leave_others_alone() {
        let mut d = debouncer();
        d.set_thresholds(Some(sensor(1)), 60.0, 30.0);
        assert_eq!(d.touch_threshold(sensor(0)), DEFAULT_TOUCH_THRESHOLD);
        assert_eq!(d.touch_threshold(sensor(1)), 60.0);
        assert_eq!(d.release_threshold(sensor(1)), 30.0);
    }

    #[test]
    fn reports_edges_with_hysteresis() {
        let mut d = debouncer();

        set(&mut d, 0, 100.0);
        let report = d.poll_status(10);
        assert_eq!(report.change(sensor(0)), TouchChange::NewTouch);
        assert_eq!(report.status(sensor(0)), TouchStatus::Touched);
        assert_eq!(report.num_changes, 1);
        assert_eq!(report.num_touched, 1);
        assert_eq!(d.last_action_time(sensor(0)), Some(10));

        // Inside the dead band: held, no edge.
        set(&mut d, 0, 80.0);
        let report = d.poll_status(20);
        assert_eq!(report.change(sensor(0)), TouchChange::NoChange);
        assert_eq!(report.status(sensor(0)), TouchStatus::Touched);
        assert_eq!(d.last_action_time(sensor(0)), Some(10));

        set(&mut d, 0, 10.0);
        let report = d.poll_status(30);
        assert_eq!(report.change(sensor(0)), TouchChange::NewRelease);
        assert_eq!(report.status(sensor(0)), TouchStatus::Released);
        assert_eq!(report.num_touched, 0);
        assert_eq!(d.last_action_time(sensor(0)), Some(30));
    }

    #[test]
    fn dead_band_never_chatters() {
        let mut d = debouncer();
        let readings = [66.0, 94.0, 70.0, 90.0, 65.5, 94.9, 80.0];

        for (step, percent) in readings.iter().enumerate() {
            set(&mut d, 3, *percent);
            let report = d.poll_status(step as Millis);
            assert_eq!(report.num_changes, 0);
            assert_eq!(report.status(sensor(3)), TouchStatus::Released);
        }

        set(&mut d, 3, 100.0);
        d.poll_status(100);
        for (step, percent) in readings.iter().enumerate() {
            set(&mut d, 3, *percent);
            let report = d.poll_status(200 + step as Millis);
            assert_eq!(report.num_changes, 0);
            assert_eq!(report.status(sensor(3)), TouchStatus::Touched);
        }
    }

    #[test]
    fn toggle_mode_alternates_touches() {
        let mut d = debouncer();
        d.set_toggle_mode(true);

        set(&mut d, 1, 100.0);
        let report = d.poll_status(0);
        assert_eq!(report.change(sensor(1)), TouchChange::NewTouch);
        assert_eq!(report.status(sensor(1)), TouchStatus::Touched);
        assert_eq!(report.num_changes, 1);

        // Physical release is swallowed and the latched status holds.
        set(&mut d, 1, 0.0);
        let report = d.poll_status(10);
        assert_eq!(report.change(sensor(1)), TouchChange::NoChange);
        assert_eq!(report.status(sensor(1)), TouchStatus::Touched);
        assert_eq!(report.num_changes, 0);
        assert_eq!(report.num_touched, 0);

        // Second touch switches it off.
        set(&mut d, 1, 100.0);
        let report = d.poll_status(20);
        assert_eq!(report.change(sensor(1)), TouchChange::NewRelease);
        assert_eq!(report.status(sensor(1)), TouchStatus::Released);
        assert_eq!(report.num_changes, 1);

        set(&mut d, 1, 0.0);
        let report = d.poll_status(30);
        assert_eq!(report.num_changes, 0);
        assert_eq!(report.status(sensor(1)), TouchStatus::Released);

        set(&mut d, 1, 100.0);
        let report = d.poll_status(40);
        assert_eq!(report.change(sensor(1)), TouchChange::NewTouch);
    }

    #[test]
    fn cleared_latch_reads_as_fresh_touch() {
        let mut d = debouncer();
        d.set_toggle_mode(true);

        set(&mut d, 0, 100.0);
        d.poll_status(0);
        set(&mut d, 0, 0.0);
        d.poll_status(10);
        assert!(d.is_latched(sensor(0)));

        d.clear_toggle_latches();
        assert!(!d.is_latched(sensor(0)));
        let report = d.poll_status(20);
        assert_eq!(report.num_changes, 0);
        assert_eq!(report.status(sensor(0)), TouchStatus::Released);

        set(&mut d, 0, 100.0);
        let report = d.poll_status(30);
        assert_eq!(report.change(sensor(0)), TouchChange::NewTouch);
        assert_eq!(report.status(sensor(0)), TouchStatus::Touched);
    }

    #[test]
    fn ignored_sensor_reads_zero() {
        let mut d = debouncer();
        set(&mut d, 2, 100.0);
        d.set_ignored(sensor(2), true);
        assert_eq!(d.read_proximity_percent(sensor(2)), 0.0);
        assert_eq!(d.poll_status(0).num_changes, 0);

        d.set_ignored(sensor(2), false);
        assert_eq!(d.poll_status(1).change(sensor(2)), TouchChange::NewTouch);
    }

    #[test]
    fn smoothing_follows_iir_formula() {
        let mut d = debouncer();
        d.set_averaging_strength(4);
        d.source_mut().set_raw(sensor(0), 1024);

        // filtered = (0 * 3 + 1024) / 4 = 256 -> 25%
        approx::assert_relative_eq!(d.read_proximity_percent(sensor(0)), 25.0);
        // filtered = (256 * 3 + 1024) / 4 = 448 -> 43.75%
        approx::assert_relative_eq!(d.read_proximity_percent(sensor(0)), 43.75);

        d.set_averaging_strength(-7);
        assert_eq!(d.averaging_strength(), 0);
    }

    #[test]
    fn multiplier_scales_and_caps_at_full() {
        let mut d = debouncer();
        d.source_mut().set_raw(sensor(0), 512);
        approx::assert_relative_eq!(d.read_proximity_percent(sensor(0)), 50.0);

        d.set_proximity_multiplier(sensor(0), 1.5);
        approx::assert_relative_eq!(d.read_proximity_percent(sensor(0)), 75.0);

        d.set_proximity_multiplier(sensor(0), 4.0);
        assert_eq!(d.read_proximity_percent(sensor(0)), 100.0);

        d.set_proximity_multiplier(sensor(0), -2.0);
        assert_eq!(d.proximity_multiplier(sensor(0)), 0.0);
    }

    #[test]
    fn summary_marks_edges_and_held_states() {
        let mut d = debouncer();
        set(&mut d, 0, 100.0);
        d.poll_status(0);
        set(&mut d, 2, 100.0);
        let report = d.poll_status(1);
        assert_eq!(report.summary(), "trTr");
        assert_eq!(report.first_touched(), Some(sensor(0)));
    }
}
