use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::game_state::GameState;
use crate::net::is_authoritative;
use crate::net::protocol::InputButtons;
use crate::physics::Position;
use crate::ship::PilotInput;

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LocalInput>()
            .add_systems(Update, (keyboard, mouse_aim))
            .add_systems(
                Update,
                forward_local_input
                    .after(keyboard)
                    .after(mouse_aim)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

/// The most recent locally sampled input. Consumed by prediction on
/// guests and copied onto the hosted ship's [`PilotInput`] on the
/// authority.
#[derive(Resource, Default)]
pub struct LocalInput {
    pub buttons: InputButtons,
    /// Unit vector from the controlled ship toward the cursor.
    pub mouse_dir: Vec2,
}

/// Tag that marks the entity controlled by this instance.
#[derive(Component, Clone, Copy)]
pub struct PlayerTag;

fn keyboard(
    keyboard_input: Res<ButtonInput<KeyCode>>,
    mouse_input: Res<ButtonInput<MouseButton>>,
    mut local: ResMut<LocalInput>,
) {
    let mut buttons = InputButtons::default();

    buttons.set(
        InputButtons::THRUST,
        keyboard_input.pressed(KeyCode::KeyW) || keyboard_input.pressed(KeyCode::ArrowUp),
    );
    buttons.set(
        InputButtons::REVERSE,
        keyboard_input.pressed(KeyCode::KeyS) || keyboard_input.pressed(KeyCode::ArrowDown),
    );
    buttons.set(
        InputButtons::LEFT,
        keyboard_input.pressed(KeyCode::KeyA) || keyboard_input.pressed(KeyCode::ArrowLeft),
    );
    buttons.set(
        InputButtons::RIGHT,
        keyboard_input.pressed(KeyCode::KeyD) || keyboard_input.pressed(KeyCode::ArrowRight),
    );
    buttons.set(InputButtons::BOOST, keyboard_input.pressed(KeyCode::ShiftLeft));
    buttons.set(InputButtons::RCS, keyboard_input.pressed(KeyCode::ControlLeft));
    buttons.set(
        InputButtons::FIRE,
        mouse_input.pressed(MouseButton::Left) || keyboard_input.pressed(KeyCode::Space),
    );
    buttons.set(InputButtons::DROP, keyboard_input.pressed(KeyCode::KeyQ));
    buttons.set(
        InputButtons::SHIELD,
        mouse_input.pressed(MouseButton::Right) || keyboard_input.pressed(KeyCode::KeyE),
    );

    local.buttons = buttons;
}

fn mouse_aim(
    window_query: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform)>,
    player_query: Query<&Position, With<PlayerTag>>,
    mut local: ResMut<LocalInput>,
) {
    let Ok(window) = window_query.single() else {
        return;
    };
    let Ok((camera, camera_transform)) = camera_query.single() else {
        return;
    };
    let Ok(player_position) = player_query.single() else {
        return;
    };
    let Some(cursor_pos) = window.cursor_position() else {
        return;
    };
    let Ok(cursor_world_pos) = camera.viewport_to_world_2d(camera_transform, cursor_pos) else {
        return;
    };

    let direction = (cursor_world_pos - player_position.0).normalize_or_zero();
    if direction != Vec2::ZERO {
        local.mouse_dir = direction;
    }
}

/// On the authority the local ship is driven directly; guests go through
/// the prediction path instead.
fn forward_local_input(
    local: Res<LocalInput>,
    mut ships: Query<&mut PilotInput, With<PlayerTag>>,
) {
    for mut pilot in ships.iter_mut() {
        pilot.buttons = local.buttons;
        pilot.mouse_dir = local.mouse_dir;
        pilot.sequence = pilot.sequence.wrapping_add(1);
    }
}
