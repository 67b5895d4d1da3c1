//! TCP gossip node: listener, outbound dialer, message framing, and the
//! sync/cancellation flags the mining loop reads (spec §4.6, §5).

pub mod error;
pub mod message;
pub mod node;

pub use error::ProtocolError;
pub use message::Message;
pub use node::Node;
