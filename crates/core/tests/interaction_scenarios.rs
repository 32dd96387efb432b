use rand::{rngs::StdRng, SeedableRng};
use tactile_core::{
    Clock, InteractionController, ManualClock, ManualSensors, MemoryCatalog, PausablePlayer,
    PlaybackEngine, SensorDebouncer, SensorId, TrackCommand, TrackId, VirtualMixer, VirtualStream,
};

type Controller =
    InteractionController<ManualSensors, PausablePlayer<VirtualStream>, VirtualMixer, MemoryCatalog>;

struct Rig {
    controller: Controller,
    clock: ManualClock,
}

impl Rig {
    fn new() -> Self {
        Self::with_stream(VirtualStream::new())
    }

    /// Every track runs for `duration_ms` before ending on its own.
    fn with_track_length(duration_ms: u64) -> Self {
        Self::with_stream(VirtualStream::with_default_duration(duration_ms))
    }

    fn with_stream(stream: VirtualStream) -> Self {
        let mut sensors = SensorDebouncer::new(ManualSensors::new());
        sensors.set_averaging_strength(0);
        let players = std::array::from_fn(|_| PausablePlayer::new(stream.clone()));
        let catalog = MemoryCatalog::with_tracks(["RAIN.WAV", "WIND.WAV", "BIRDS.WAV", "SEA.WAV"]);
        let playback =
            PlaybackEngine::with_rng(players, VirtualMixer::new(), catalog, StdRng::seed_from_u64(3));
        let clock = ManualClock::new(0);
        Self {
            controller: InteractionController::new(sensors, playback, clock.now_ms()),
            clock,
        }
    }

    /// Sets sensor readings by one-based sensor number.
    fn set(&mut self, sensor: i64, percent: f32) -> &mut Self {
        self.controller
            .sensors_mut()
            .source_mut()
            .set_percent(SensorId::from_external(sensor), percent);
        self
    }

    fn step(&mut self, delta_ms: u64) -> tactile_core::TickOutcome {
        self.clock.advance(delta_ms);
        for player in self.controller.playback_mut().players_mut() {
            player.render(delta_ms);
        }
        self.controller.tick(self.clock.now_ms())
    }

    fn playing(&self, track: usize) -> bool {
        self.controller.playback().is_playing(TrackId::new(track))
    }
}

fn track(index: usize) -> TrackId {
    TrackId::new(index)
}

#[test]
fn simultaneous_touches_select_lowest_sensor() {
    let mut rig = Rig::new();
    rig.set(2, 100.0).set(3, 100.0);

    let outcome = rig.step(1);
    assert_eq!(outcome.commands, vec![TrackCommand::Start(track(1))]);
    assert_eq!(rig.controller.currently_playing(), Some(track(1)));
    assert!(rig.playing(1));
    assert!(!rig.playing(2));
}

#[test]
fn release_and_touch_in_one_poll_switches_track() {
    let mut rig = Rig::new();
    rig.set(1, 100.0);
    rig.step(1);
    assert_eq!(rig.controller.currently_playing(), Some(track(0)));

    rig.set(1, 0.0).set(2, 100.0);
    let outcome = rig.step(1);
    assert_eq!(
        outcome.commands,
        vec![TrackCommand::Stop(track(0)), TrackCommand::Start(track(1))]
    );
    assert_eq!(rig.controller.currently_playing(), Some(track(1)));
    assert!(!rig.playing(0));
    assert!(rig.playing(1));
}

#[test]
fn multi_track_sensors_are_independent() {
    let mut rig = Rig::new();
    rig.controller.set_multi_track_mode(true);

    rig.set(1, 100.0).set(3, 100.0);
    let outcome = rig.step(1);
    assert_eq!(
        outcome.commands,
        vec![TrackCommand::Start(track(0)), TrackCommand::Start(track(2))]
    );

    rig.set(1, 0.0);
    let outcome = rig.step(1);
    assert_eq!(outcome.commands, vec![TrackCommand::Stop(track(0))]);
    assert!(!rig.playing(0));
    assert!(rig.playing(2));
}

#[test]
fn dead_band_readings_issue_no_commands() {
    let mut rig = Rig::new();
    rig.set(1, 100.0);
    rig.step(1);

    for percent in [90.0, 70.0, 66.0, 94.0, 80.0] {
        rig.set(1, percent);
        assert!(rig.step(1).commands.is_empty(), "chatter at {percent}%");
    }
    assert!(rig.playing(0));

    rig.set(1, 50.0);
    assert_eq!(rig.step(1).commands, vec![TrackCommand::Stop(track(0))]);
}

#[test]
fn toggled_track_times_out_after_inactivity() {
    let mut rig = Rig::new();
    rig.controller.set_touch_to_stop(true);
    rig.controller.set_inactivity_timeout(5);

    rig.set(2, 100.0);
    rig.step(0);
    rig.set(2, 0.0);
    rig.step(100);
    assert!(rig.playing(1), "toggle mode keeps the track after release");

    let outcome = rig.step(4900);
    assert_eq!(outcome.timed_out, None);
    assert!(rig.playing(1));

    let outcome = rig.step(1);
    assert_eq!(outcome.timed_out, Some(1));
    assert!(!rig.playing(1));
    assert_eq!(rig.controller.last_action_time(), 5001);

    // Nothing left to cancel, so later ticks stay quiet.
    assert_eq!(rig.step(6000).timed_out, None);
}

#[test]
fn timeout_clears_toggle_state_in_single_track_mode() {
    let mut rig = Rig::new();
    rig.controller.set_touch_to_stop(true);
    rig.controller.set_inactivity_timeout(5);

    rig.set(2, 100.0);
    rig.step(0);
    rig.set(2, 0.0);
    rig.step(100);
    assert_eq!(rig.step(5100).timed_out, Some(1));
    assert_eq!(rig.controller.currently_playing(), None);

    // Sensor 2 no longer reads as switched on, so sensor 4 gets its own track.
    rig.set(4, 100.0);
    let outcome = rig.step(100);
    assert_eq!(outcome.commands, vec![TrackCommand::Start(track(3))]);
    assert_eq!(rig.controller.currently_playing(), Some(track(3)));
    assert!(!rig.playing(1));
}

#[test]
fn timeout_clears_toggle_state_in_multi_track_mode() {
    let mut rig = Rig::new();
    rig.controller.set_multi_track_mode(true);
    rig.controller.set_touch_to_stop(true);
    rig.controller.set_inactivity_timeout(5);

    rig.set(2, 100.0);
    rig.step(0);
    rig.set(2, 0.0);
    rig.step(100);
    assert_eq!(rig.step(5100).timed_out, Some(1));

    rig.set(2, 100.0);
    let outcome = rig.step(100);
    assert_eq!(outcome.commands, vec![TrackCommand::Start(track(1))]);
    assert!(rig.playing(1));
}

#[test]
fn finished_toggled_track_frees_the_single_track_slot() {
    let mut rig = Rig::with_track_length(200);
    rig.controller.set_touch_to_stop(true);

    rig.set(2, 100.0);
    assert_eq!(rig.step(0).commands, vec![TrackCommand::Start(track(1))]);
    rig.set(2, 0.0);
    rig.step(10);
    assert_eq!(rig.controller.currently_playing(), Some(track(1)));

    rig.step(200);
    assert!(!rig.playing(1));
    assert_eq!(rig.controller.currently_playing(), None);
    assert!(!rig.controller.sensors().is_latched(SensorId::from_external(2)));

    rig.set(3, 100.0);
    let outcome = rig.step(190);
    assert_eq!(outcome.commands, vec![TrackCommand::Start(track(2))]);
    assert_eq!(rig.controller.currently_playing(), Some(track(2)));
}

#[test]
fn finished_toggled_track_starts_again_on_next_touch() {
    let mut rig = Rig::with_track_length(200);
    rig.controller.set_multi_track_mode(true);
    rig.controller.set_touch_to_stop(true);

    rig.set(1, 100.0);
    rig.step(0);
    rig.set(1, 0.0);
    rig.step(10);
    rig.step(200);
    assert!(!rig.playing(0));

    rig.set(1, 100.0);
    let outcome = rig.step(100);
    assert_eq!(outcome.commands, vec![TrackCommand::Start(track(0))]);
}

#[test]
fn held_touch_keeps_installation_alive() {
    let mut rig = Rig::new();
    rig.controller.set_inactivity_timeout(1);

    rig.set(4, 100.0);
    rig.step(0);
    for _ in 0..30 {
        assert_eq!(rig.step(100).timed_out, None);
    }
    assert!(rig.playing(3));
}

#[test]
fn zero_timeout_never_cancels() {
    let mut rig = Rig::new();
    rig.controller.set_touch_to_stop(true);

    rig.set(1, 100.0);
    rig.step(0);
    rig.set(1, 0.0);
    rig.step(10);

    assert_eq!(rig.step(3_600_000).timed_out, None);
    assert!(rig.playing(0));
}

#[test]
fn fades_run_through_the_control_loop() {
    let mut rig = Rig::new();
    rig.controller.set_fade_in_time(1000).unwrap();
    rig.controller.set_fade_out_time(500).unwrap();

    rig.set(1, 100.0);
    rig.step(0);
    rig.step(500);
    assert_eq!(rig.controller.playback().actual_volume(track(0)), 50);
    rig.step(500);
    assert_eq!(rig.controller.playback().actual_volume(track(0)), 100);

    rig.set(1, 0.0);
    rig.step(1);
    rig.step(250);
    assert_eq!(rig.controller.playback().actual_volume(track(0)), 50);
    assert!(rig.playing(0));
    rig.step(250);
    assert_eq!(rig.controller.playback().actual_volume(track(0)), 0);
    assert!(!rig.playing(0));
    assert_eq!(rig.controller.playback().mixer().gain(track(0)), 0.0);
}
