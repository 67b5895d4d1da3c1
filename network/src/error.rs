//! Protocol-level faults (spec §7 regime 3): downgraded from the source's
//! "fatal, process exit" to "log and ignore" for ongoing gossip, except
//! bootstrap, where a failed attempt against one peer is retried against
//! the next configured peer and exhausting the list is fatal to startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot from peer: {0}")]
    MalformedSnapshot(String),

    #[error("no configured peer produced a usable snapshot during bootstrap")]
    BootstrapFailed,
}
