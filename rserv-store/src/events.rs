//! Write invalidation signal.
//!
//! The store publishes one event per committed write. Subscribers (the
//! async query result cache) treat any event as an invalidation; the
//! conservative policy of evicting everything on any write is correct at
//! prototyping scale.

use tokio::sync::broadcast;

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// A new document was written
    Create,
    /// An existing document was replaced or patched
    Update,
    /// A document was deleted (possibly as part of a cascade)
    Delete,
}

/// One committed write.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    /// Entity the write touched
    pub entity: String,
    /// Kind of write
    pub kind: WriteKind,
}

/// Create the broadcast channel used for write events.
pub fn channel() -> broadcast::Sender<WriteEvent> {
    broadcast::channel(64).0
}
