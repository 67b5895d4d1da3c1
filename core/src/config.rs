//! Runtime configuration for a chain node.
//!
//! The [`Config`] struct centralises tunable parameters: the retarget
//! window, the network name, and the listen/peer topology (spec §6's CLI
//! flags). It is constructed via the [`ConfigBuilder`] fluent builder,
//! enabling callers to customise only the fields they care about while
//! keeping sensible defaults.
//!
//! All fields are `pub` so read-only access is ergonomic, however mutation
//! should occur through the builder to preserve validation invariants.
//!
//! ```
//! use chain_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.listen_port, 10000);
//! ```

use crate::chain::ChainParams;
use crate::pow::Difficulty;
use serde::{Deserialize, Serialize};

/// Runtime configuration shared across the crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Starting PoW difficulty (spec §4.6: fresh genesis starts at 1).
    pub difficulty: Difficulty,

    /// Target seconds between blocks.
    pub expected_block_time_secs: u64,

    /// Retarget window, in blocks.
    pub recalculate_every_x_blocks: u64,

    /// Human-readable name identifying the network (e.g. "main", "test").
    pub network: String,

    /// Local TCP listen port (`--port`).
    pub listen_port: u16,

    /// Outbound peer ports on localhost (`--peers`).
    pub peers: Vec<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::ONE,
            expected_block_time_secs: 10,
            recalculate_every_x_blocks: 10,
            network: "main".into(),
            listen_port: 10000,
            peers: Vec::new(),
        }
    }
}

impl Config {
    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            difficulty: self.difficulty,
            expected_block_time: self.expected_block_time_secs,
            recalculate_every_x_blocks: self.recalculate_every_x_blocks,
        }
    }
}

/// Fluent builder for [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn difficulty(mut self, diff: Difficulty) -> Self {
        self.inner.difficulty = diff;
        self
    }

    pub fn expected_block_time_secs(mut self, secs: u64) -> Self {
        self.inner.expected_block_time_secs = secs;
        self
    }

    pub fn recalculate_every_x_blocks(mut self, n: u64) -> Self {
        self.inner.recalculate_every_x_blocks = n;
        self
    }

    pub fn network<S: Into<String>>(mut self, name: S) -> Self {
        self.inner.network = name.into();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.inner.listen_port = port;
        self
    }

    pub fn peers(mut self, peers: Vec<u16>) -> Self {
        self.inner.peers = peers;
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .difficulty(Difficulty { num: 2, den: 1 })
            .expected_block_time_secs(5)
            .recalculate_every_x_blocks(20)
            .network("test")
            .listen_port(20000)
            .peers(vec![20001, 20002])
            .finish();
        assert_eq!(cfg.difficulty, Difficulty { num: 2, den: 1 });
        assert_eq!(cfg.expected_block_time_secs, 5);
        assert_eq!(cfg.recalculate_every_x_blocks, 20);
        assert_eq!(cfg.network, "test");
        assert_eq!(cfg.listen_port, 20000);
        assert_eq!(cfg.peers, vec![20001, 20002]);
    }
}
