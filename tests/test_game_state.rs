mod common;

use bevy::prelude::*;
use bevy_arena::game_state::GameState;
use bevy_arena::physics::SimTick;
use common::TestApp;

#[test]
fn app_starts_in_main_menu() {
    let app = TestApp::new();
    assert_eq!(app.game_state(), GameState::MainMenu);
}

#[test]
fn start_game_enters_playing() {
    let mut app = TestApp::new();
    app.start_game();
    assert_eq!(app.game_state(), GameState::Playing);
}

#[test]
fn escape_toggles_pause() {
    let mut app = TestApp::new();
    app.start_game();

    app.press_key(KeyCode::Escape);
    app.tick_n(2);
    assert_eq!(app.game_state(), GameState::Paused);

    app.release_key(KeyCode::Escape);
    app.tick();
    app.press_key(KeyCode::Escape);
    app.tick_n(2);
    assert_eq!(app.game_state(), GameState::Playing);
}

#[test]
fn escape_is_ignored_on_main_menu() {
    let mut app = TestApp::new();
    app.press_key(KeyCode::Escape);
    app.tick_n(2);
    assert_eq!(app.game_state(), GameState::MainMenu);
}

#[test]
fn simulation_halts_while_paused() {
    let mut app = TestApp::new();
    app.start_game();
    app.step_fixed_n(3);
    let ticks_before_pause = app.resource::<SimTick>().0;
    assert!(ticks_before_pause >= 3);

    app.press_key(KeyCode::Escape);
    app.tick_n(2);
    assert_eq!(app.game_state(), GameState::Paused);

    app.step_fixed_n(5);
    assert_eq!(
        app.resource::<SimTick>().0,
        ticks_before_pause,
        "the simulation tick must not advance while paused"
    );

    app.release_key(KeyCode::Escape);
    app.tick();
    app.press_key(KeyCode::Escape);
    app.tick_n(2);
    app.step_fixed();
    assert!(
        app.resource::<SimTick>().0 > ticks_before_pause,
        "unpausing should resume the simulation"
    );
}
