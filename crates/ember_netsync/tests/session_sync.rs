//! End-to-end replication across three in-process peers: handshake, shared
//! body lifecycle, ownership transfer, and snapshot reconciliation.

use ember_core::{Rect, Vec2};
use ember_netsync::integration::{CircleFactory, FixedClock, Simulator, TestbedSimulator};
use ember_netsync::transport::{LobbyHub, MemoryTransport};
use ember_netsync::{
    BodyId, NetSession, SessionStatus, SyncConfig, TransportConfig, DEFAULT_TICK_RATE,
};

type Session = NetSession<FixedClock, MemoryTransport, TestbedSimulator>;

const BOUNDS: Rect = Rect::new(-100.0, -100.0, 200.0, 200.0);
const DT: f32 = 1.0 / DEFAULT_TICK_RATE as f32;

struct Trio {
    clock: FixedClock,
    host: Session,
    c1: Session,
    c2: Session,
}

impl Trio {
    /// One fixed update on every peer, host first, then the shared clock
    /// advances.
    fn pump(&mut self) {
        self.host.update();
        self.c1.update();
        self.c2.update();
        self.clock.advance();
    }

    fn pump_n(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.pump();
        }
    }
}

/// Connects a host and two clients, walks the handshake to INGAME, and
/// enables physics with one circle factory on each peer.
fn in_game_trio() -> Trio {
    let hub = LobbyHub::new("room-1");
    let clock = FixedClock::new();
    let config = TransportConfig::default();

    let mut host = NetSession::new(clock.clone(), hub.endpoint("host"), config.clone());
    let mut c1 = NetSession::new(clock.clone(), hub.endpoint("client-1"), config.clone());
    let mut c2 = NetSession::new(clock.clone(), hub.endpoint("client-2"), config);

    assert!(host.connect_as_host());
    assert!(c1.connect_as_client("room-1"));
    assert!(c2.connect_as_client("room-1"));
    assert!(host.start_session());

    let mut trio = Trio { clock, host, c1, c2 };
    trio.pump_n(2);

    assert_eq!(trio.c1.short_uid(), 1);
    assert_eq!(trio.c2.short_uid(), 2);
    assert_eq!(trio.host.short_uid(), 3);

    for session in [&mut trio.host, &mut trio.c1, &mut trio.c2] {
        let engine = session.enable_physics(TestbedSimulator::new(), BOUNDS, SyncConfig::default());
        engine.attach_factory(Box::new(CircleFactory));
        assert!(session.mark_ready());
    }

    trio.pump_n(3);
    for session in [&trio.host, &trio.c1, &trio.c2] {
        assert_eq!(session.status(), SessionStatus::InGame);
    }
    trio
}

#[test]
fn three_peer_handshake_reaches_in_game() {
    let trio = in_game_trio();
    assert_eq!(trio.host.num_players(), 3);
    assert!(trio.host.is_host());
    assert!(!trio.c1.is_host());
}

#[test]
fn shared_body_creation_reaches_every_peer() {
    let mut trio = in_game_trio();

    let params = CircleFactory::params(Vec2::new(1.0, 2.0), 0.5);
    let factory = ember_netsync::FactoryId(0);
    let (id, _) = trio
        .host
        .physics_mut()
        .expect("physics enabled")
        .add_shared_body(factory, &params)
        .expect("in bounds");
    assert_eq!(id, BodyId::compose(3, 0));

    trio.pump_n(2);

    for session in [&trio.host, &trio.c1, &trio.c2] {
        let engine = session.physics().expect("physics enabled");
        let handle = engine.registry().handle_of(id).expect("replicated");
        assert_eq!(engine.simulator().position(handle), Vec2::new(1.0, 2.0));
        // Registry and simulator agree on the shared population.
        assert_eq!(engine.registry().len(), engine.simulator().body_count());
    }

    // The creator holds the permanent lease; clients hold nothing.
    assert!(trio.host.physics().unwrap().is_owned(id));
    assert!(!trio.c1.physics().unwrap().is_owned(id));
    assert!(!trio.c2.physics().unwrap().is_owned(id));
}

#[test]
fn deletion_reaches_every_peer() {
    let mut trio = in_game_trio();

    let params = CircleFactory::params(Vec2::ZERO, 0.5);
    let (id, _) = trio
        .host
        .physics_mut()
        .unwrap()
        .add_shared_body(ember_netsync::FactoryId(0), &params)
        .expect("in bounds");
    trio.pump_n(2);

    assert!(trio.host.physics_mut().unwrap().remove_shared_body(id));
    trio.pump_n(2);

    for session in [&trio.host, &trio.c1, &trio.c2] {
        let engine = session.physics().unwrap();
        assert_eq!(engine.registry().len(), 0);
        assert_eq!(engine.simulator().body_count(), 0);
    }
}

#[test]
fn snapshot_sync_converges_client_views() {
    let mut trio = in_game_trio();

    let params = CircleFactory::params(Vec2::ZERO, 0.5);
    let (id, host_handle) = trio
        .host
        .physics_mut()
        .unwrap()
        .add_shared_body(ember_netsync::FactoryId(0), &params)
        .expect("in bounds");
    trio.pump_n(2);

    // The host drives its body; clients only ever hear about it.
    trio.host
        .physics_mut()
        .unwrap()
        .simulator_mut()
        .set_linear_velocity(host_handle, Vec2::new(3.0, 0.0));
    for _ in 0..120 {
        trio.host
            .physics_mut()
            .unwrap()
            .simulator_mut()
            .step(DT, 8, 3);
        trio.pump();
    }

    // Let the body come to rest and give the clients time to converge.
    trio.host
        .physics_mut()
        .unwrap()
        .simulator_mut()
        .set_linear_velocity(host_handle, Vec2::ZERO);
    trio.pump_n(250);

    let host_pos = trio
        .host
        .physics()
        .unwrap()
        .simulator()
        .position(host_handle);
    assert!((host_pos.x - 6.0).abs() < 1e-3, "host at {host_pos:?}");

    for session in [&trio.c1, &trio.c2] {
        let engine = session.physics().unwrap();
        let handle = engine.registry().handle_of(id).expect("replicated");
        let pos = engine.simulator().position(handle);
        assert!(
            pos.distance(host_pos) < 1e-3,
            "client stuck at {pos:?}, host at {host_pos:?}"
        );
    }
}

#[test]
fn ownership_lease_round_trips_through_session() {
    let mut trio = in_game_trio();

    let params = CircleFactory::params(Vec2::ZERO, 0.5);
    let (id, _) = trio
        .host
        .physics_mut()
        .unwrap()
        .add_shared_body(ember_netsync::FactoryId(0), &params)
        .expect("in bounds");
    trio.pump_n(2);

    // Client 1 takes a five-tick lease; the claim displaces the host's
    // permanent one.
    trio.c1.physics_mut().unwrap().acquire(id, 5);
    trio.pump_n(2);
    assert!(!trio.host.physics().unwrap().is_owned(id));
    assert!(trio.c1.physics().unwrap().is_owned(id));

    // The lease expires, client 1 releases, and the host's permanent
    // ownership is back in force.
    trio.pump_n(8);
    assert!(!trio.c1.physics().unwrap().is_owned(id));
    assert!(trio.host.physics().unwrap().is_owned(id));
}

#[test]
fn custom_events_pass_through_opaquely() {
    let hub = LobbyHub::new("room-1");
    let clock = FixedClock::new();
    let config = TransportConfig::default();

    let mut host: Session = NetSession::new(clock.clone(), hub.endpoint("host"), config.clone());
    let mut client: Session = NetSession::new(clock.clone(), hub.endpoint("client"), config);

    // Peers agree on registration order before connecting.
    let tag = host.register_app_event();
    assert_eq!(tag, client.register_app_event());

    assert!(host.connect_as_host());
    assert!(client.connect_as_client("room-1"));
    assert!(host.start_session());

    let mut pump = |host: &mut Session, client: &mut Session| {
        host.update();
        client.update();
        clock.advance();
    };
    pump(&mut host, &mut client);
    pump(&mut host, &mut client);
    assert!(host.mark_ready());
    assert!(client.mark_ready());
    pump(&mut host, &mut client);
    pump(&mut host, &mut client);
    pump(&mut host, &mut client);
    assert_eq!(client.status(), SessionStatus::InGame);

    host.push_out_event(ember_netsync::EventPayload::App {
        tag,
        bytes: b"score:42".to_vec(),
    });
    pump(&mut host, &mut client);
    pump(&mut host, &mut client);

    assert!(client.is_in_available());
    let event = client.pop_in_event().expect("due event");
    assert_eq!(event.source, "host");
    match event.payload {
        ember_netsync::EventPayload::App { bytes, .. } => assert_eq!(bytes, b"score:42"),
        other => panic!("unexpected payload: {other:?}"),
    }
}
