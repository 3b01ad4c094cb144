//! Headless testing infrastructure.
//!
//! Provides [`HeadlessPlugins`] (a window-less plugin set) and [`TestApp`]
//! (a convenience wrapper around [`App`]) so integration tests can exercise
//! game systems without a GPU or display server.

use bevy::app::PluginGroupBuilder;
use bevy::prelude::*;
use bevy::state::app::StatesPlugin;
use bevy::window::{ExitCondition, WindowPlugin};

use crate::game_state::GameState;
use crate::net::{GuestSenders, HostChannels, NetworkRole};
use crate::ArenaPlugins;

/// Minimal set of Bevy plugins that lets [`ArenaPlugins`] initialise
/// without opening a window or creating a renderer.
pub struct HeadlessPlugins;

impl PluginGroup for HeadlessPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::start::<Self>()
            .add(bevy::app::TaskPoolPlugin::default())
            .add(bevy::time::TimePlugin)
            .add(StatesPlugin)
            .add(WindowPlugin {
                primary_window: None,
                exit_condition: ExitCondition::DontExit,
                ..default()
            })
            .add(bevy::input::InputPlugin)
    }
}

/// Test harness wrapping a headless [`App`] with convenience methods.
pub struct TestApp {
    pub app: App,
}

impl TestApp {
    /// Create a new headless app with [`HeadlessPlugins`] + [`ArenaPlugins`].
    /// The app starts in [`GameState::MainMenu`].
    pub fn new() -> Self {
        let mut app = App::new();
        app.add_plugins(HeadlessPlugins);
        app.add_plugins(ArenaPlugins);
        // Run one update to let startup systems execute.
        app.update();
        TestApp { app }
    }

    /// Run a single frame.
    pub fn tick(&mut self) {
        self.app.update();
    }

    /// Run `n` frames.
    pub fn tick_n(&mut self, n: usize) {
        for _ in 0..n {
            self.app.update();
        }
    }

    /// Run exactly one fixed simulation tick, bypassing the time
    /// accumulator. Physics tests use this to get a deterministic number
    /// of integration steps regardless of wall-clock time.
    pub fn step_fixed(&mut self) {
        self.app.world_mut().run_schedule(FixedUpdate);
    }

    /// Run `n` fixed simulation ticks.
    pub fn step_fixed_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step_fixed();
        }
    }

    /// Read the current [`GameState`].
    pub fn game_state(&self) -> GameState {
        *self.app.world().resource::<State<GameState>>().get()
    }

    /// Transition to [`GameState::Playing`].
    pub fn start_game(&mut self) {
        self.app
            .world_mut()
            .resource_mut::<NextState<GameState>>()
            .set(GameState::Playing);
        self.tick();
    }

    /// Simulate pressing a key by writing a [`KeyboardInput`] event.
    pub fn press_key(&mut self, key: KeyCode) {
        self.app
            .world_mut()
            .write_message(bevy::input::keyboard::KeyboardInput {
                key_code: key,
                logical_key: bevy::input::keyboard::Key::Unidentified(
                    bevy::input::keyboard::NativeKey::Unidentified,
                ),
                state: bevy::input::ButtonState::Pressed,
                text: None,
                window: Entity::PLACEHOLDER,
                repeat: false,
            });
    }

    /// Simulate releasing a key by writing a [`KeyboardInput`] event.
    pub fn release_key(&mut self, key: KeyCode) {
        self.app
            .world_mut()
            .write_message(bevy::input::keyboard::KeyboardInput {
                key_code: key,
                logical_key: bevy::input::keyboard::Key::Unidentified(
                    bevy::input::keyboard::NativeKey::Unidentified,
                ),
                state: bevy::input::ButtonState::Released,
                text: None,
                window: Entity::PLACEHOLDER,
                repeat: false,
            });
    }

    /// Count entities that have component `T`.
    pub fn count<T: Component>(&mut self) -> usize {
        self.app
            .world_mut()
            .query::<&T>()
            .iter(self.app.world())
            .count()
    }

    /// Check whether a resource of type `T` exists.
    pub fn has_resource<T: Resource>(&self) -> bool {
        self.app.world().get_resource::<T>().is_some()
    }

    /// Get a reference to a resource.
    pub fn resource<T: Resource>(&self) -> &T {
        self.app.world().resource::<T>()
    }

    /// Configure this app as a network host without binding a socket.
    /// Returns a clone of the [`HostChannels`] so tests can feed events
    /// through the crossbeam senders.
    pub fn setup_host_mode(&mut self) -> HostChannels {
        let channels = HostChannels::default();
        let channels_clone = HostChannels {
            join_rx: channels.join_rx.clone(),
            join_tx: channels.join_tx.clone(),
            input_rx: channels.input_rx.clone(),
            input_tx: channels.input_tx.clone(),
            leave_rx: channels.leave_rx.clone(),
            leave_tx: channels.leave_tx.clone(),
        };
        self.app
            .world_mut()
            .insert_resource(NetworkRole::Host { port: 0 });
        self.app.world_mut().insert_resource(channels);
        self.app.world_mut().insert_resource(GuestSenders::default());
        channels_clone
    }
}

impl Default for TestApp {
    fn default() -> Self {
        TestApp::new()
    }
}
