//! Queue transport contract and the in-memory transport used for tests/dev.

pub mod delivery;
pub mod in_memory;
pub mod transport;

pub use delivery::Delivery;
pub use in_memory::{InMemoryTransport, InMemoryTransportError, PublishedMessage};
pub use transport::Transport;
