use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::messages::{ClientEvent, Envelope, ServerEvent};
use crate::router;
use crate::types::{ConnId, OutboundMessage, PeerHandle, RelayError, RoomId};

/// Requests serialized through the hub's single command queue
pub(crate) enum HubCommand {
    Register {
        id: ConnId,
        tx: mpsc::Sender<OutboundMessage>,
    },
    Unregister {
        id: ConnId,
    },
    Envelope {
        sender: ConnId,
        envelope: Envelope,
    },
}

/// The hub task: sole owner of both registries. Commands are processed one
/// at a time in arrival order; no other task ever touches the registries.
/// Returns the final registries once every command sender is gone.
pub(crate) async fn hub_task(mut rx: mpsc::Receiver<HubCommand>) -> HubState {
    let mut state = HubState::new();

    while let Some(cmd) = rx.recv().await {
        state.handle(cmd);
    }

    state
}

/// Connection registry plus room registry. Rooms are created lazily and
/// retained once empty; long-lived deployments accumulate empty entries.
#[derive(Debug, Default)]
pub(crate) struct HubState {
    pub(crate) connections: HashMap<ConnId, PeerHandle>,
    pub(crate) rooms: HashMap<RoomId, Vec<ConnId>>,
}

impl HubState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { id, tx } => self.register(id, tx),
            HubCommand::Unregister { id } => self.unregister(id),
            HubCommand::Envelope { sender, envelope } => self.dispatch(sender, envelope),
        }
    }

    fn register(&mut self, id: ConnId, tx: mpsc::Sender<OutboundMessage>) {
        info!("register {}", id);
        let previous = self.connections.insert(
            id,
            PeerHandle {
                id,
                room: None,
                tx,
            },
        );
        if previous.is_some() {
            warn!("{} was already registered, replaced", id);
        }
    }

    /// Idempotent removal. Dropping the stored sender is what closes the
    /// connection's mailbox, and it happens exactly once, here, after the
    /// id has left both registries.
    fn unregister(&mut self, id: ConnId) {
        let Some(peer) = self.connections.remove(&id) else {
            return;
        };
        info!("unregister {}", id);

        if let Some(room) = &peer.room {
            if let Some(members) = self.rooms.get_mut(room) {
                members.retain(|m| *m != id);
            }
        }

        let msg = ServerEvent::PeerLeft { socket_id: id }.encode();
        for other in self.connections.values() {
            other.deliver(msg.clone());
        }
    }

    fn dispatch(&mut self, sender: ConnId, envelope: Envelope) {
        let name = envelope.event_name.clone();
        match ClientEvent::from_envelope(envelope) {
            Ok(Some(event)) => router::dispatch(self, sender, event),
            Ok(None) => debug!("ignoring unknown event {:?} from {}", name, sender),
            Err(e) => warn!("dropping {:?} from {}: {}", name, sender, e),
        }
    }
}

/// Handle to communicate with the hub task
#[derive(Clone)]
pub struct HubHandle {
    pub(crate) tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a connection's mailbox under its id. Must complete before
    /// either pump starts.
    pub async fn register(
        &self,
        id: ConnId,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> Result<(), RelayError> {
        self.tx
            .send(HubCommand::Register { id, tx })
            .await
            .map_err(|_| RelayError::HubClosed)
    }

    /// Remove a connection. Safe to call for an id the hub no longer knows.
    pub async fn unregister(&self, id: ConnId) {
        let _ = self.tx.send(HubCommand::Unregister { id }).await;
    }

    /// Submit a decoded inbound envelope for dispatch.
    pub async fn envelope(&self, sender: ConnId, envelope: Envelope) {
        let _ = self.tx.send(HubCommand::Envelope { sender, envelope }).await;
    }
}
