use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("connection closed")]
    Closed,
}

/// Frames travelling to one client's write pump.
#[derive(Debug)]
pub enum Outbound {
    Frame(String),
    Close,
}

/// A seat's outbound channel. Real connections wrap the upgraded socket's
/// write pump; the virtual implementation feeds the AI driver instead.
/// Frames are UTF-8 JSON text either way.
pub trait Conn: Send + Sync {
    fn send(&self, frame: String) -> Result<(), ConnError>;
    fn close(&self);
    fn is_virtual(&self) -> bool {
        false
    }
}

/// Write half of a live WebSocket. Sends never block the room: they enqueue
/// onto the pump task, and a dead pump surfaces as a send error which marks
/// the seat offline.
pub struct RealConn {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl RealConn {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

impl Conn for RealConn {
    fn send(&self, frame: String) -> Result<(), ConnError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| ConnError::Closed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}
