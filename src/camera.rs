use bevy::prelude::*;

use crate::input::PlayerTag;
use crate::physics::Position;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup)
            .add_systems(Update, camera_follow);
    }
}

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d);
}

const X_DEAD_ZONE: f32 = 32.0;
const Y_DEAD_ZONE: f32 = 32.0;

fn camera_follow(
    targets: Query<&Position, With<PlayerTag>>,
    mut cameras: Query<&mut Transform, With<Camera2d>>,
) {
    let Ok(target) = targets.single() else {
        return;
    };
    let Ok(mut camera_transform) = cameras.single_mut() else {
        return;
    };

    let x_diff = target.0.x - camera_transform.translation.x;
    let y_diff = target.0.y - camera_transform.translation.y;
    if x_diff.abs() > X_DEAD_ZONE {
        camera_transform.translation.x = target.0.x - x_diff.signum() * X_DEAD_ZONE;
    }
    if y_diff.abs() > Y_DEAD_ZONE {
        camera_transform.translation.y = target.0.y - y_diff.signum() * Y_DEAD_ZONE;
    }
}
