use glam::Vec2;

use rift::{LoopbackNetwork, LoopbackTransport, PacketLossSimulation, UniqueId};
use rift_client::bot::Wanderer;
use rift_client::{ClientConfig, ClientEvent, InputState, SyncClient};
use rift_server::{ServerConfig, SyncServer};

fn empty_arena() -> ServerConfig {
    ServerConfig {
        crate_count: 0,
        units_per_wave: 0,
        ..ServerConfig::default()
    }
}

fn session(
    network: &LoopbackNetwork,
) -> (SyncServer<LoopbackTransport>, SyncClient<LoopbackTransport>) {
    let server = SyncServer::new(network.listen(), empty_arena());
    let client = SyncClient::new(network.connect().unwrap(), ClientConfig::default());
    (server, client)
}

fn server_position(server: &SyncServer<LoopbackTransport>, hero: UniqueId) -> Vec2 {
    server.game().world().entity(hero).unwrap().position
}

/// Sweeps along every wall and dashes into corners.
fn scripted_input(step: u32) -> InputState {
    let phase = (step / 40) % 6;
    InputState {
        right: phase == 0 || phase == 4,
        down: phase == 1 || phase == 4,
        left: phase == 2 || phase == 5,
        up: phase == 3 || phase == 5,
        casts: [step % 7 == 0, false, step % 50 == 0, false],
        aim_angle: (step * 13 % 360) as f32,
    }
}

#[test]
fn clean_link_prediction_matches_server_exactly() {
    let network = LoopbackNetwork::new();
    let (mut server, mut client) = session(&network);
    server.tick();

    for step in 0..600 {
        client.tick(&scripted_input(step));
        client.frame(1.0 / 30.0);
        server.tick();

        let Some(hero) = client.controlled_entity() else {
            continue;
        };
        let applied = client.stats().last_applied_input;
        if applied == 0 {
            continue;
        }
        // What the client predicted for the input the server last reported.
        let predicted = client.prediction().predicted_end(applied).unwrap();
        let authoritative = client.world().entity(hero).unwrap().position;
        assert_eq!(predicted.x.to_bits(), authoritative.x.to_bits(), "step {step}");
        assert_eq!(predicted.y.to_bits(), authoritative.y.to_bits(), "step {step}");
    }

    let hero = client.controlled_entity().unwrap();
    let stats = client.prediction().stats();
    assert_eq!(stats.corrections, 0);
    assert_eq!(stats.snaps, 0);
    assert!(stats.predicted >= 599);
    assert!(client.stats().last_applied_input >= 598);

    // One idle round trip lets the client see the last input applied.
    client.tick(&InputState::default());
    server.tick();
    client.tick(&InputState::default());
    assert_eq!(client.display_position(), Some(server_position(&server, hero)));
}

#[test]
fn lossy_link_converges_once_input_stops() {
    let network = LoopbackNetwork::with_conditions(PacketLossSimulation::lossy(30.0), Some(9));
    let (mut server, mut client) = session(&network);
    let mut bot = Wanderer::new(4);
    server.tick();

    for _ in 0..400 {
        client.tick(&bot.next_input());
        client.frame(1.0 / 30.0);
        server.tick();
    }
    assert!(client.controlled_entity().is_some());
    assert!(client.network_stats().packets_dropped > 0);

    for _ in 0..120 {
        client.tick(&InputState::default());
        client.frame(1.0 / 30.0);
        server.tick();
    }
    client.tick(&InputState::default());
    client.frame(1.0 / 30.0);

    let hero = client.controlled_entity().unwrap();
    let display = client.display_position().unwrap();
    assert!(
        display.distance(server_position(&server, hero)) < 1e-3,
        "display {display} vs server {}",
        server_position(&server, hero)
    );
    assert_eq!(client.prediction().visual_offset(), Vec2::ZERO);
}

#[test]
fn out_of_band_correction_blends_within_bounded_frames() {
    let network = LoopbackNetwork::new();
    let (mut server, mut client) = session(&network);
    server.tick();
    let right = InputState {
        right: true,
        ..InputState::default()
    };
    for _ in 0..5 {
        client.tick(&right);
        server.tick();
    }

    let hero = client.controlled_entity().unwrap();
    client.drain_events().for_each(drop);
    let before = client.prediction().stats().corrections;

    // An outage longer than the input redundancy: the server never sees the first two
    // of these inputs, so it ends up short of the predicted position.
    let connection = client.connection().unwrap();
    network.set_conditions(connection, PacketLossSimulation::lossy(100.0));
    for _ in 0..6 {
        client.tick(&right);
        server.tick();
    }
    network.set_conditions(connection, PacketLossSimulation::default());
    for _ in 0..6 {
        client.tick(&InputState::default());
        server.tick();
    }

    let events: Vec<ClientEvent> = client.drain_events().collect();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::Reconciled { .. })),
        "no correction in {events:?}"
    );
    assert!(client.prediction().stats().corrections > before);

    let mut frames = 0;
    while client.prediction().visual_offset() != Vec2::ZERO {
        client.frame(1.0 / 60.0);
        frames += 1;
        assert!(frames <= 60, "still {} off", client.prediction().visual_offset());
    }
    client.tick(&InputState::default());
    server.tick();
    client.tick(&InputState::default());
    assert_eq!(client.display_position(), Some(server_position(&server, hero)));
}
