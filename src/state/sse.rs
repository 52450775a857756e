use tokio::sync::{Mutex, broadcast};

use crate::dto::sse::ServerEvent;

const PUBLIC_CAPACITY: usize = 64;
const ADMIN_CAPACITY: usize = 64;

/// Process-wide SSE hubs: the public scoreboard stream and the single maintenance console.
pub struct SseState {
    public: SseHub,
    admin: SseHub,
    /// Token of the connected console, `None` while no console is attached.
    admin_token: Mutex<Option<String>>,
}

impl SseState {
    pub fn new() -> Self {
        Self {
            public: SseHub::new(PUBLIC_CAPACITY),
            admin: SseHub::new(ADMIN_CAPACITY),
            admin_token: Mutex::new(None),
        }
    }

    pub fn public(&self) -> &SseHub {
        &self.public
    }

    pub fn admin(&self) -> &SseHub {
        &self.admin
    }

    pub fn admin_token(&self) -> &Mutex<Option<String>> {
        &self.admin_token
    }
}

/// Fan-out of [`ServerEvent`]s to every subscriber of one stream.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Events sent while nobody listens are dropped.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
