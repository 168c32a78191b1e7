//! # In-Process Transport
//!
//! A lobby hub that connects peers living in the same process. Frames are
//! delivered instantly through per-peer mailboxes, which makes multi-peer
//! sessions fully deterministic under test.
//!
//! ## Design
//!
//! - One [`LobbyHub`] per room; endpoints register on `open`
//! - Broadcast excludes the sender; unicast to the local peer loops back
//! - Each endpoint drains its mailbox synchronously from `receive`

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};

use super::{PeerId, Transport, TransportConfig, TransportState};

type Frame = (PeerId, Vec<u8>);

#[derive(Default)]
struct HubState {
    mailboxes: BTreeMap<PeerId, Sender<Frame>>,
    in_session: bool,
}

/// Shared rendezvous point for the in-process transports of one room.
#[derive(Clone)]
pub struct LobbyHub {
    room: String,
    state: Arc<Mutex<HubState>>,
}

impl LobbyHub {
    /// Creates a hub for the given room id.
    #[must_use]
    pub fn new(room: &str) -> Self {
        Self {
            room: room.to_string(),
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// Creates an endpoint for a named peer. The endpoint joins the room
    /// when its `open` is called.
    #[must_use]
    pub fn endpoint(&self, peer: &str) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            peer: peer.to_string(),
            inbox: None,
            state: TransportState::Disconnected,
        }
    }
}

/// One peer's endpoint into a [`LobbyHub`].
pub struct MemoryTransport {
    hub: LobbyHub,
    peer: PeerId,
    inbox: Option<Receiver<Frame>>,
    state: TransportState,
}

impl MemoryTransport {
    /// Simulates a mid-flight connection failure.
    ///
    /// The endpoint leaves the room and reports [`TransportState::Failed`]
    /// until reopened.
    pub fn sever(&mut self) {
        self.hub.state.lock().mailboxes.remove(&self.peer);
        self.inbox = None;
        self.state = TransportState::Failed;
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, _config: &TransportConfig) -> SyncResult<()> {
        let (sender, receiver) = unbounded();
        let mut hub = self.hub.state.lock();
        if hub.mailboxes.contains_key(&self.peer) {
            return Err(SyncError::Transport(format!(
                "peer {} already joined room {}",
                self.peer, self.hub.room
            )));
        }
        hub.mailboxes.insert(self.peer.clone(), sender);
        self.inbox = Some(receiver);
        self.state = TransportState::Connected;
        Ok(())
    }

    fn close(&mut self) {
        self.hub.state.lock().mailboxes.remove(&self.peer);
        self.inbox = None;
        self.state = TransportState::Disconnected;
    }

    fn start_session(&mut self) {
        self.hub.state.lock().in_session = true;
    }

    fn broadcast(&mut self, data: &[u8]) {
        let hub = self.hub.state.lock();
        for (peer, mailbox) in &hub.mailboxes {
            if *peer != self.peer {
                let _ = mailbox.send((self.peer.clone(), data.to_vec()));
            }
        }
    }

    fn send_to(&mut self, peer: &PeerId, data: &[u8]) {
        let hub = self.hub.state.lock();
        if let Some(mailbox) = hub.mailboxes.get(peer) {
            let _ = mailbox.send((self.peer.clone(), data.to_vec()));
        }
    }

    fn receive(&mut self, callback: &mut dyn FnMut(PeerId, Vec<u8>)) {
        if let Some(inbox) = &self.inbox {
            while let Ok((source, data)) = inbox.try_recv() {
                callback(source, data);
            }
        }
    }

    fn state(&self) -> TransportState {
        if self.state == TransportState::Connected && self.hub.state.lock().in_session {
            TransportState::InSession
        } else {
            self.state
        }
    }

    fn local_peer(&self) -> PeerId {
        self.peer.clone()
    }

    fn players(&self) -> BTreeSet<PeerId> {
        self.hub.state.lock().mailboxes.keys().cloned().collect()
    }

    fn room(&self) -> String {
        self.hub.room.clone()
    }
}
