use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, info, warn};

use crate::hub::HubHandle;
use crate::messages::Envelope;
use crate::types::{ConnId, OutboundMessage, RelayError};

/// Time allowed to write a message to the peer.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed between inbound liveness signals from the peer.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Ping period. Must stay below READ_TIMEOUT so pings arrive in time to
/// reset the peer's liveness clock (9:10 ratio).
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Maximum message size allowed from a peer.
const MAX_MESSAGE_SIZE: usize = 50 * 1024;

/// Mailbox depth per connection.
const MAILBOX_CAPACITY: usize = 256;

/// Accept one WebSocket connection and drive it until disconnect. The
/// connection is registered before either pump starts and unregistered
/// exactly once, from the read side's exit path.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: HubHandle,
) -> Result<(), RelayError> {
    let config = WebSocketConfig::default().max_message_size(Some(MAX_MESSAGE_SIZE));
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(config))
        .await
        .map_err(RelayError::Handshake)?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let id = ConnId::generate();
    info!("{} connected from {}", id, addr);

    let (tx, rx) = mpsc::channel::<OutboundMessage>(MAILBOX_CAPACITY);
    hub.register(id, tx).await?;

    let write_task = tokio::spawn(write_pump(ws_tx, rx));

    read_pump(&mut ws_rx, id, &hub).await;

    hub.unregister(id).await;

    // Unregistration closes the mailbox; wait for the write pump to drain
    // it, emit the Close frame, and shut the sink.
    let _ = write_task.await;

    info!("{} disconnected", id);
    Ok(())
}

/// Read frames until the transport fails or the peer goes silent past the
/// deadline. Malformed envelopes are dropped, not fatal.
async fn read_pump(
    ws_rx: &mut SplitStream<WebSocketStream<TcpStream>>,
    id: ConnId,
    hub: &HubHandle,
) {
    let mut deadline = Instant::now() + READ_TIMEOUT;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                warn!("{} read deadline expired", id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        debug!("{} read error: {}", id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => hub.envelope(id, envelope).await,
                            Err(e) => warn!("{} sent malformed envelope: {}", id, e),
                        }
                    }
                    Message::Pong(_) => {
                        deadline = Instant::now() + READ_TIMEOUT;
                    }
                    Message::Close(_) => {
                        debug!("{} sent close", id);
                        break;
                    }
                    // Binary frames are out of scope; Ping is answered by
                    // tungstenite itself.
                    _ => {}
                }
            }
        }
    }
}

/// Drain the mailbox onto the wire and keep the peer alive with periodic
/// pings. Mailbox closure is the clean-shutdown path: a final Close frame
/// is sent and the pump exits.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(msg) => {
                    if write(&mut ws_tx, Message::Text(msg.into_inner())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = write(&mut ws_tx, Message::Close(None)).await;
                    break;
                }
            },

            _ = ticker.tick() => {
                if write(&mut ws_tx, Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;
}

/// Write one frame under the write deadline.
async fn write(
    ws_tx: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    msg: Message,
) -> Result<(), RelayError> {
    match tokio::time::timeout(WRITE_TIMEOUT, ws_tx.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!("write failed: {}", e);
            Err(RelayError::Transport(e))
        }
        Err(_) => {
            warn!("write deadline expired");
            Err(RelayError::WriteTimeout)
        }
    }
}
