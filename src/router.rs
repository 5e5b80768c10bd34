use tracing::{info, warn};

use crate::hub::HubState;
use crate::messages::{ClientEvent, ServerEvent};
use crate::types::{ConnId, RoomId};

/// Map a decoded signaling event onto the registries. Runs inline on the
/// hub task; nothing here may block.
pub(crate) fn dispatch(state: &mut HubState, sender: ConnId, event: ClientEvent) {
    match event {
        ClientEvent::Join { room } => join(state, sender, room),
        ClientEvent::IceCandidate { candidate, target } => forward(
            state,
            target,
            ServerEvent::IceCandidate {
                candidate,
                socket_id: sender,
            },
        ),
        ClientEvent::Offer { sdp, target } => forward(
            state,
            target,
            ServerEvent::Offer {
                sdp,
                socket_id: sender,
            },
        ),
        ClientEvent::Answer { sdp, target } => forward(
            state,
            target,
            ServerEvent::Answer {
                sdp,
                socket_id: sender,
            },
        ),
    }
}

/// Notify existing members in insertion order, append the joiner, then
/// reply with the collected ids. One room per connection: a repeat join is
/// ignored rather than switching rooms.
fn join(state: &mut HubState, sender: ConnId, room: RoomId) {
    let HubState { connections, rooms } = state;

    let Some(peer) = connections.get(&sender) else {
        return;
    };
    if let Some(current) = &peer.room {
        warn!("{} already joined room {}, ignoring join", sender, current);
        return;
    }

    let members = rooms.entry(room.clone()).or_default();
    let notice = ServerEvent::PeerJoined { socket_id: sender }.encode();
    let mut ids = Vec::with_capacity(members.len());
    for member in members.iter() {
        if let Some(existing) = connections.get(member) {
            existing.deliver(notice.clone());
        }
        ids.push(*member);
    }
    members.push(sender);

    info!("{} joined room {} with {} peers", sender, room, ids.len());

    if let Some(peer) = connections.get_mut(&sender) {
        peer.room = Some(room);
        let reply = ServerEvent::PeersList {
            connections: ids,
            you: sender,
        }
        .encode();
        peer.deliver(reply);
    }
}

/// Deliver a forwarded envelope to the target's mailbox. An unknown target
/// is normal churn (the peer may have disconnected mid-negotiation).
fn forward(state: &HubState, target: ConnId, event: ServerEvent) {
    if let Some(peer) = state.connections.get(&target) {
        peer.deliver(event.encode());
    }
}
