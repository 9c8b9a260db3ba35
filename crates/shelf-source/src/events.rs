use std::fmt;

use shelf_types::ObjectId;
use tokio::sync::broadcast;
use tracing::trace;

/// Change notification emitted after a successful mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    /// An item was added to or removed from the container. Carries the
    /// root id.
    ContainerChanged(ObjectId),
    /// An item's attributes were replaced. Carries the item id.
    MetadataChanged(ObjectId),
}

impl SourceEvent {
    pub fn object_id(&self) -> &ObjectId {
        match self {
            Self::ContainerChanged(id) | Self::MetadataChanged(id) => id,
        }
    }
}

impl fmt::Display for SourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerChanged(id) => write!(f, "container-changed({id})"),
            Self::MetadataChanged(id) => write!(f, "metadata-changed({id})"),
        }
    }
}

/// A broadcast receiver for source events.
pub type EventStream = broadcast::Receiver<SourceEvent>;

/// Fan-out of source events to any number of subscribers.
pub(crate) struct EventBus {
    sender: broadcast::Sender<SourceEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        self.sender.subscribe()
    }

    /// Emitting with no subscribers is not an error.
    pub(crate) fn emit(&self, event: SourceEvent) {
        trace!(%event, receivers = self.sender.receiver_count(), "event emitted");
        let _ = self.sender.send(event);
    }
}
