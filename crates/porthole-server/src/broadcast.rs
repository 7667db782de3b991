use porthole_types::ServerMessage;
use tokio::sync::broadcast;

/// Fan-out of outbound deltas to every connected view. Best-effort: a client
/// that falls behind or disconnects misses messages and resynchronizes over
/// REST on reconnect.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<ServerMessage>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Queue a delta for every subscriber. Having no subscribers is fine.
    pub fn send(&self, message: ServerMessage) {
        let _ = self.tx.send(message);
    }
}
