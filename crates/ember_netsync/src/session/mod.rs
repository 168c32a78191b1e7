//! # Network Session
//!
//! Handshake and lifecycle for a multiplayer physics session.
//!
//! ## State machine
//!
//! ```text
//! IDLE ──connect──▶ CONNECTING ──transport──▶ CONNECTED
//!                                                 │ host: start_session
//!                                                 ▼
//!                       INGAME ◀── READY ◀── HANDSHAKE
//!                                                 (any transport fault ▶ NETERROR)
//! ```
//!
//! During HANDSHAKE the host hands every peer (itself included) a short-UID
//! starting at 1. Peers answer `mark_ready` once initialized; when the host
//! has seen every peer ready it broadcasts the game start, and all peers
//! record the tick the game began so event timestamps line up.
//!
//! The session also owns the event pump: each fixed update it checks the
//! transport, runs the replication engine, unwraps received frames, and
//! broadcasts everything queued for send.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use ember_core::Rect;

use crate::config::SyncConfig;
use crate::integration::{Application, Simulator};
use crate::protocol::{EventPayload, EventRegistry, GameStateEvent, ReceivedEvent};
use crate::replication::{ReplicationEngine, SyncMode};
use crate::transport::{PeerId, Transport, TransportConfig, TransportState};

/// Lifecycle of a [`NetSession`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// No connection requested.
    #[default]
    Idle,
    /// Connecting to the lobby.
    Connecting,
    /// Connected to the lobby.
    Connected,
    /// Handshaking for game start.
    Handshake,
    /// Ready for game start.
    Ready,
    /// Game is in progress.
    InGame,
    /// The transport reported a fault.
    NetError,
}

/// Event-driven network controller for a physics-synchronized game.
///
/// Generic over the application clock, the transport, and the simulator the
/// optional replication engine drives.
pub struct NetSession<A: Application, T: Transport, S: Simulator> {
    app: A,
    transport: T,
    config: TransportConfig,
    status: SessionStatus,
    room_id: String,
    is_host: bool,
    /// Host only: peers seen ready during the start handshake.
    num_ready: u32,
    short_uid: u32,
    start_game_tick: u64,
    registry: EventRegistry,
    in_events: VecDeque<ReceivedEvent>,
    out_events: Vec<EventPayload>,
    phys: Option<ReplicationEngine<S>>,
    frames_dropped: u64,
}

impl<A: Application, T: Transport, S: Simulator> NetSession<A, T, S> {
    /// Creates an idle session over the given collaborators.
    pub fn new(app: A, transport: T, config: TransportConfig) -> Self {
        Self {
            app,
            transport,
            config,
            status: SessionStatus::Idle,
            room_id: String::new(),
            is_host: false,
            num_ready: 0,
            short_uid: 0,
            start_game_tick: 0,
            registry: EventRegistry::new(),
            in_events: VecDeque::new(),
            out_events: Vec::new(),
            phys: None,
            frames_dropped: 0,
        }
    }

    /// Returns the current session status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns whether this peer is the host. Only valid after connection.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        self.is_host
    }

    /// Returns the short-UID assigned by the host, or `0` before the
    /// handshake delivers one.
    #[must_use]
    pub const fn short_uid(&self) -> u32 {
        self.short_uid
    }

    /// Returns the id of the connected room.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Returns the number of peers in the room, this one included.
    #[must_use]
    pub fn num_players(&self) -> usize {
        self.transport.players().len()
    }

    /// Returns the local tick: fixed updates since the game started.
    ///
    /// Peers land on similar values regardless of when their app launched,
    /// which is what makes sender ticks comparable.
    #[must_use]
    pub fn game_tick(&self) -> u64 {
        self.app.update_count().saturating_sub(self.start_game_tick)
    }

    /// Returns how many received frames were dropped as invalid.
    #[must_use]
    pub const fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Connects to a new lobby as host.
    ///
    /// Returns false if the transport faulted.
    pub fn connect_as_host(&mut self) -> bool {
        if self.status == SessionStatus::NetError {
            self.disconnect();
        }
        self.is_host = true;
        if self.status == SessionStatus::Idle {
            self.status = SessionStatus::Connecting;
            if let Err(err) = self.transport.open(&self.config) {
                warn!(%err, "transport refused to open");
                self.status = SessionStatus::NetError;
                return false;
            }
        }
        self.check_connection()
    }

    /// Connects to an existing lobby as client.
    ///
    /// Returns false if the transport faulted.
    pub fn connect_as_client(&mut self, room_id: &str) -> bool {
        if self.status == SessionStatus::NetError {
            self.disconnect();
        }
        self.is_host = false;
        if self.status == SessionStatus::Idle {
            self.status = SessionStatus::Connecting;
            self.room_id = room_id.to_string();
            if let Err(err) = self.transport.open(&self.config) {
                warn!(%err, "transport refused to open");
                self.status = SessionStatus::NetError;
                return false;
            }
        }
        self.check_connection()
    }

    /// Disconnects from the lobby, clearing queues and tearing down
    /// replication. In-flight events are lost.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.status = SessionStatus::Idle;
        self.room_id.clear();
        self.is_host = false;
        self.num_ready = 0;
        self.short_uid = 0;
        self.start_game_tick = 0;
        self.in_events.clear();
        self.out_events.clear();
        self.phys = None;
    }

    /// Starts the game-start handshake. Host only, while connected.
    ///
    /// Returns false if called from the wrong peer or state.
    pub fn start_session(&mut self) -> bool {
        if self.is_host && self.status == SessionStatus::Connected {
            self.transport.start_session();
            true
        } else {
            false
        }
    }

    /// Marks this peer ready for game start and broadcasts the fact.
    ///
    /// Fails unless the session is handshaking and a short-UID has been
    /// received.
    pub fn mark_ready(&mut self) -> bool {
        if self.status == SessionStatus::Handshake && self.short_uid != 0 {
            self.status = SessionStatus::Ready;
            if self.is_host {
                self.num_ready += 1;
            }
            self.out_events
                .push(EventPayload::GameState(GameStateEvent::ClientReady));
            true
        } else {
            false
        }
    }

    /// Enables physics synchronization over the given simulator.
    ///
    /// # Panics
    ///
    /// Panics if no short-UID has been assigned yet; body identifiers are
    /// minted from it.
    pub fn enable_physics(
        &mut self,
        simulator: S,
        bounds: Rect,
        config: SyncConfig,
    ) -> &mut ReplicationEngine<S> {
        assert!(
            self.short_uid != 0,
            "a short-UID must be assigned before enabling physics"
        );
        self.phys.insert(ReplicationEngine::new(
            simulator,
            self.short_uid,
            self.is_host,
            bounds,
            config,
        ))
    }

    /// Disables physics synchronization and drops the engine.
    pub fn disable_physics(&mut self) {
        self.phys = None;
    }

    /// Returns the replication engine, if physics is enabled.
    #[must_use]
    pub fn physics(&self) -> Option<&ReplicationEngine<S>> {
        self.phys.as_ref()
    }

    /// Returns the replication engine mutably, if physics is enabled.
    pub fn physics_mut(&mut self) -> Option<&mut ReplicationEngine<S>> {
        self.phys.as_mut()
    }

    /// Registers an application event type and returns its tag.
    ///
    /// Every peer must perform the same registrations in the same order.
    pub fn register_app_event(&mut self) -> u8 {
        self.registry.register_app_event()
    }

    /// Queues an event for broadcast at the end of this update.
    pub fn push_out_event(&mut self, payload: EventPayload) {
        self.out_events.push(payload);
    }

    /// Returns true if an inbound application event has become due.
    ///
    /// Events stamped with a future sender tick are held back until the
    /// local clock catches up.
    #[must_use]
    pub fn is_in_available(&self) -> bool {
        self.in_events
            .front()
            .is_some_and(|event| event.sender_tick <= self.game_tick())
    }

    /// Pops the next due inbound application event, if any.
    pub fn pop_in_event(&mut self) -> Option<ReceivedEvent> {
        if self.is_in_available() {
            self.in_events.pop_front()
        } else {
            None
        }
    }

    /// Runs one network update: connection checks, replication, receive,
    /// send. Call once per fixed update.
    pub fn update(&mut self) {
        if self.status == SessionStatus::Idle {
            return;
        }
        self.check_connection();

        if self.status == SessionStatus::InGame {
            let is_host = self.is_host;
            let tick = self.game_tick();
            if let Some(engine) = self.phys.as_mut() {
                let interval = engine.config().full_sync_interval;
                if is_host && interval > 0 && tick % interval == 0 {
                    engine.pack_snapshot(SyncMode::FullSync);
                }
                engine.fixed_update();
                let built_in = engine.drain_out_events();
                self.out_events.extend(built_in);
            }
        }

        self.process_received();
        self.send_queued();
    }

    /// Polls the transport state and advances the session accordingly.
    ///
    /// Returns false if the transport reported a fault.
    fn check_connection(&mut self) -> bool {
        match self.transport.state() {
            TransportState::Connected => {
                if self.status == SessionStatus::Connecting {
                    self.status = SessionStatus::Connected;
                    if self.is_host {
                        self.room_id = self.transport.room();
                    }
                    info!(room = %self.room_id, host = self.is_host, "connected to lobby");
                }
            }
            TransportState::InSession => {
                if self.status == SessionStatus::Connected {
                    self.status = SessionStatus::Handshake;
                    if self.is_host {
                        self.assign_short_uids();
                    }
                }
            }
            TransportState::Negotiating => {}
            state @ (TransportState::Denied
            | TransportState::Disconnected
            | TransportState::Failed
            | TransportState::Invalid
            | TransportState::Mismatched) => {
                if self.status != SessionStatus::NetError {
                    warn!(?state, "transport fault");
                    self.status = SessionStatus::NetError;
                }
                return false;
            }
        }

        // Host: once every peer reported ready, start the game.
        if self.is_host
            && self.status == SessionStatus::Ready
            && self.num_ready as usize == self.transport.players().len()
        {
            self.out_events
                .push(EventPayload::GameState(GameStateEvent::GameStart));
            self.begin_game();
        }
        true
    }

    /// Hands out short-UIDs, remote peers first in lexicographic order,
    /// the host itself last via loopback unicast.
    fn assign_short_uids(&mut self) {
        let players = self.transport.players();
        let local = self.transport.local_peer();
        let tick = self.game_tick();

        let mut uid: u32 = 1;
        for peer in players.iter().filter(|peer| **peer != local) {
            let frame = self.registry.wrap(
                &EventPayload::GameState(GameStateEvent::UidAssign { short_uid: uid }),
                tick,
            );
            self.transport.send_to(peer, &frame);
            uid += 1;
        }
        let frame = self.registry.wrap(
            &EventPayload::GameState(GameStateEvent::UidAssign { short_uid: uid }),
            tick,
        );
        self.transport.send_to(&local, &frame);
        info!(players = players.len(), "short uids assigned");
    }

    fn begin_game(&mut self) {
        self.status = SessionStatus::InGame;
        self.start_game_tick = self.app.update_count();
        info!(start_tick = self.start_game_tick, "game started");
    }

    fn process_received(&mut self) {
        let mut frames: Vec<(PeerId, Vec<u8>)> = Vec::new();
        self.transport
            .receive(&mut |peer, data| frames.push((peer, data)));

        for (peer, data) in frames {
            let receive_tick = self.game_tick();
            match self.registry.unwrap(&data, peer, receive_tick) {
                Ok(event) => self.dispatch(event),
                Err(err) => {
                    self.frames_dropped += 1;
                    debug!(%err, "dropped inbound frame");
                }
            }
        }
    }

    fn dispatch(&mut self, event: ReceivedEvent) {
        if let EventPayload::GameState(msg) = &event.payload {
            let msg = *msg;
            self.process_game_state(msg, &event.source);
            return;
        }
        if self.status != SessionStatus::InGame {
            return;
        }
        match event.payload {
            EventPayload::PhysSync(ref sync) => {
                if let Some(engine) = self.phys.as_mut() {
                    engine.process_sync(sync);
                }
            }
            EventPayload::PhysObj(ref obj) => {
                if let Some(engine) = self.phys.as_mut() {
                    engine.process_obj(obj);
                }
            }
            EventPayload::App { .. } => self.in_events.push_back(event),
            EventPayload::GameState(_) => {}
        }
    }

    fn process_game_state(&mut self, msg: GameStateEvent, source: &PeerId) {
        match msg {
            GameStateEvent::UidAssign { short_uid } => {
                if self.status == SessionStatus::Handshake {
                    self.short_uid = short_uid;
                    info!(short_uid, "short uid received");
                }
            }
            GameStateEvent::ClientReady => {
                if self.is_host {
                    self.num_ready += 1;
                    debug!(%source, ready = self.num_ready, "peer ready");
                }
            }
            GameStateEvent::GameStart => {
                if self.status == SessionStatus::Ready {
                    self.begin_game();
                }
            }
            // Reserved control codes; accepted without effect.
            GameStateEvent::GameReset | GameStateEvent::GamePause | GameStateEvent::GameResume => {}
        }
    }

    fn send_queued(&mut self) {
        let tick = self.game_tick();
        for payload in std::mem::take(&mut self.out_events) {
            let frame = self.registry.wrap(&payload, tick);
            self.transport.broadcast(&frame);
        }
    }
}
