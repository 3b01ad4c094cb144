use bevy::prelude::*;

use bevy_arena::game_state::GameState;
use bevy_arena::net::guest::start_guest_connection;
use bevy_arena::net::host::start_hosting;
use bevy_arena::ArenaPlugins;

fn main() {
    let mut host_port: Option<u16> = None;
    let mut join_addr: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" => host_port = args.next().and_then(|port| port.parse().ok()),
            "--join" => join_addr = args.next(),
            other => eprintln!("Unknown argument: {other} (expected --host <port> or --join <addr>)"),
        }
    }

    let mut app = App::new();
    app.add_plugins(DefaultPlugins).add_plugins(ArenaPlugins);

    if let Some(port) = host_port {
        start_hosting(app.world_mut(), port);
    } else if let Some(addr) = join_addr {
        start_guest_connection(app.world_mut(), addr);
    }

    app.world_mut()
        .resource_mut::<NextState<GameState>>()
        .set(GameState::Playing);
    app.run();
}
