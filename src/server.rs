use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::conn::handle_connection;
use crate::hub::{HubCommand, HubHandle, hub_task};

pub const DEFAULT_RELAY_PORT: u16 = 8000;
const HUB_QUEUE_DEPTH: usize = 1024;

/// WebSocket signaling relay: one hub task plus two pump tasks per
/// connection.
pub struct RelayServer {
    handle: HubHandle,
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayServer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<HubCommand>(HUB_QUEUE_DEPTH);
        tokio::spawn(hub_task(rx));

        Self {
            handle: HubHandle { tx },
        }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling relay listening on {}", addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            let hub = self.handle.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, hub).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}
