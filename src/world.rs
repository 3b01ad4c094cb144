use std::fs;
use std::path::PathBuf;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::game_state::GameState;
use crate::net::is_authoritative;
use crate::physics::{BodyBundle, Collider, RigidBody, Shape};

pub struct WorldPlugin;

impl Plugin for WorldPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ArenaConfig::load()).add_systems(
            OnEnter(GameState::Playing),
            spawn_arena.run_if(is_authoritative),
        );
    }
}

/// A gravity well pulling bodies inside its falloff radius.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GravitySource {
    pub x: f32,
    pub y: f32,
    pub strength: f32,
    pub falloff: f32,
}

impl GravitySource {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// An immovable box placed in the arena.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ObstacleSpec {
    pub x: f32,
    pub y: f32,
    pub half_width: f32,
    pub half_height: f32,
    #[serde(default)]
    pub rotation: f32,
}

/// Arena tuning: square map bounds `[0, map_size]`, the global speed limit,
/// gravity sources, and static obstacles. Loaded from `arena.json` next to
/// the executable, falling back to defaults.
#[derive(Resource, Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ArenaConfig {
    pub map_size: f32,
    pub speed_limit: f32,
    pub gravity: Vec<GravitySource>,
    pub obstacles: Vec<ObstacleSpec>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            map_size: 4096.0,
            speed_limit: 600.0,
            gravity: vec![GravitySource {
                x: 2048.0,
                y: 2048.0,
                strength: 2.0,
                falloff: 900.0,
            }],
            obstacles: vec![
                ObstacleSpec {
                    x: 1400.0,
                    y: 2048.0,
                    half_width: 90.0,
                    half_height: 40.0,
                    rotation: 0.6,
                },
                ObstacleSpec {
                    x: 2700.0,
                    y: 2048.0,
                    half_width: 90.0,
                    half_height: 40.0,
                    rotation: -0.6,
                },
            ],
        }
    }
}

impl ArenaConfig {
    pub fn load() -> Self {
        let path = config_path();
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to parse {}: {e}", path.display());
                    ArenaConfig::default()
                }
            },
            Err(_) => ArenaConfig::default(),
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::splat(self.map_size * 0.5)
    }
}

fn config_path() -> PathBuf {
    let dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join("arena.json")
}

fn spawn_arena(mut commands: Commands, config: Res<ArenaConfig>) {
    for spec in &config.obstacles {
        commands.spawn(BodyBundle::new(
            RigidBody::Static,
            Collider {
                shape: Shape::Box {
                    half_extents: Vec2::new(spec.half_width, spec.half_height),
                },
                density: 1.0,
                elasticity: 0.6,
                drag: 0.0,
            },
            Vec2::new(spec.x, spec.y),
            spec.rotation,
        ));
    }
}
