pub use bevy_arena::testing::TestApp;

use bevy_arena::world::ArenaConfig;

/// Arena configuration with no gravity wells or obstacles, so physics
/// tests only see the bodies they spawn themselves.
#[allow(dead_code)]
pub fn empty_arena() -> ArenaConfig {
    ArenaConfig {
        map_size: 4096.0,
        speed_limit: 600.0,
        gravity: vec![],
        obstacles: vec![],
    }
}
