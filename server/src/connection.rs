//! The non-owning handle a Room/Participant holds onto a live connection's
//! outbound side: Rooms own Participants, Participants hold a non-owning
//! handle to their Connection, Connections hold a non-owning handle to their
//! Participant. This is that non-owning handle — cloneable, cheap, and safe
//! to keep around after the connection itself has closed (sends just start
//! failing).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message};
use serde_json::Value;
use tokio::sync::mpsc;

/// Monotonically assigned per accepted connection: a stable, monotonic
/// socket-id.
pub fn next_socket_id() -> u64 {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed) as u64
}

struct Shared {
    sender: mpsc::UnboundedSender<Message>,
    queue_bytes: AtomicUsize,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct ConnectionHandle {
    pub socket_id: u64,
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn new(socket_id: u64) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            socket_id,
            shared: Arc::new(Shared {
                sender,
                queue_bytes: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        };
        (handle, receiver)
    }

    pub fn queue_bytes(&self) -> usize {
        self.shared.queue_bytes.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::Relaxed)
    }

    /// Enqueues a JSON value for delivery; the writer task decrements the
    /// byte counter once it has actually sent the frame. Returns `false` if
    /// the connection has already gone away (caller treats this the same as
    /// "target not found").
    pub fn send_value(&self, value: &Value) -> bool {
        let text = value.to_string();
        let len = text.len();
        self.shared.queue_bytes.fetch_add(len, Ordering::Relaxed);
        if self.shared.sender.send(Message::Text(text.into())).is_err() {
            self.shared.queue_bytes.fetch_sub(len, Ordering::Relaxed);
            self.mark_closed();
            return false;
        }
        true
    }

    pub fn release_bytes(&self, n: usize) {
        self.shared.queue_bytes.fetch_sub(n.min(self.queue_bytes()), Ordering::Relaxed);
    }

    pub fn close(&self, code: u16, reason: &'static str) {
        let _ = self.shared.sender.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })));
        self.mark_closed();
    }

    pub fn mark_closed(&self) {
        self.shared.closed.store(true, Ordering::Relaxed);
    }
}

/// Every accepted connection, independent of room membership — pre-join
/// traffic and spectators of the admin surface (`ws_connections_active`)
/// both need this, and graceful shutdown must reach sockets that never
/// joined a room at all, which the Room Registry has no record of.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: Mutex<HashMap<u64, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn register(&self, socket_id: u64, handle: ConnectionHandle) {
        self.handles.lock().expect("connection registry lock poisoned").insert(socket_id, handle);
    }

    pub fn unregister(&self, socket_id: u64) {
        self.handles.lock().expect("connection registry lock poisoned").remove(&socket_id);
    }

    pub fn all(&self) -> Vec<ConnectionHandle> {
        self.handles
            .lock()
            .expect("connection registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.handles.lock().expect("connection registry lock poisoned").len()
    }
}
