//! Peer node (spec §4.6, §5): a TCP endpoint gossiping `state`/`new_block`/
//! `new_tx` messages and coordinating with the mining loop.
//!
//! Chain state lives behind a single `Mutex` with short critical sections
//! (spec §9 option (b)); `synced` and `block_found_by_peer` are atomic
//! latches network threads raise and the miner observes without blocking.

use crate::error::ProtocolError;
use crate::message::Message;
use chain_core::chain::Chain;
use chain_core::snapshot::Snapshot;
use chain_core::{Block, Transaction};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

type LineSender = mpsc::UnboundedSender<String>;
type LineStream = Framed<TcpStream, LinesCodec>;

/// How long to wait for a dialed peer's opening `{state}` message before
/// giving up on it and trying the next configured peer (spec §7).
const BOOTSTRAP_PEER_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Node {
    pub chain: Arc<Mutex<Chain>>,
    pub synced: Arc<AtomicBool>,
    pub block_found_by_peer: Arc<AtomicBool>,
    listen_port: u16,
    peer_senders: Mutex<Vec<LineSender>>,
}

impl Node {
    /// `synced_initially` is `true` for a standalone fresh-genesis chain and
    /// `false` for a chain that must bootstrap from a peer's snapshot (spec
    /// §4.6).
    pub fn new(chain: Chain, listen_port: u16, synced_initially: bool) -> Arc<Self> {
        Arc::new(Node {
            chain: Arc::new(Mutex::new(chain)),
            synced: Arc::new(AtomicBool::new(synced_initially)),
            block_found_by_peer: Arc::new(AtomicBool::new(false)),
            listen_port,
            peer_senders: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the accept loop, then either dials every configured peer as a
    /// plain gossip link (already synced — a fresh standalone genesis) or
    /// bootstraps from them in order (spec §7: "treat snapshot parse errors
    /// as a failed bootstrap, retry another peer"), trying each configured
    /// peer until one supplies a usable snapshot. Returns
    /// `Err(ProtocolError::BootstrapFailed)` only once every configured peer
    /// has been tried and none worked.
    pub async fn run(self: &Arc<Self>, peer_ports: Vec<u16>) -> Result<(), ProtocolError> {
        let listener = TcpListener::bind(("127.0.0.1", self.listen_port)).await?;
        let accept_node = Arc::clone(self);
        tokio::spawn(async move {
            accept_node.accept_loop(listener).await;
        });

        if peer_ports.is_empty() {
            return Ok(());
        }

        if self.synced.load(Ordering::SeqCst) {
            for port in peer_ports {
                let dial_node = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = dial_node.dial_peer(port).await {
                        log::warn!("failed to connect to peer on port {port}: {e}");
                    }
                });
            }
            return Ok(());
        }

        self.bootstrap(&peer_ports).await
    }

    /// Tries each configured peer in order until one answers with a usable
    /// `{state}` snapshot; every other configured peer is then dialed as an
    /// ordinary ongoing gossip link. Spec §7's "retry another peer" in
    /// concrete form: a connection failure, a timeout, or a malformed/
    /// unexpected opening message is logged and this node moves on to the
    /// next configured peer rather than treating it as fatal.
    async fn bootstrap(self: &Arc<Self>, peer_ports: &[u16]) -> Result<(), ProtocolError> {
        log::info!("Waiting to sync.");
        let mut synced_from = None;
        for &port in peer_ports {
            match self.bootstrap_from(port).await {
                Ok(()) => {
                    synced_from = Some(port);
                    break;
                }
                Err(e) => log::warn!("bootstrap from peer on port {port} failed: {e}; trying next configured peer"),
            }
        }

        let synced_from = match synced_from {
            Some(port) => port,
            None => return Err(ProtocolError::BootstrapFailed),
        };

        for port in peer_ports.iter().copied().filter(|&p| p != synced_from) {
            let dial_node = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = dial_node.dial_peer(port).await {
                    log::warn!("failed to connect to peer on port {port}: {e}");
                }
            });
        }
        Ok(())
    }

    /// Connects to `port` and waits up to [`BOOTSTRAP_PEER_TIMEOUT`] for its
    /// opening line to be a `{state}` message. On success, loads the
    /// snapshot, marks this node synced, and keeps the connection open as an
    /// ordinary gossip link. Anything else — connect failure, timeout,
    /// malformed JSON, or a message that isn't `{state}` — is reported back
    /// to the caller so it can move on to the next configured peer.
    async fn bootstrap_from(self: &Arc<Self>, port: u16) -> Result<(), ProtocolError> {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let mut framed = Framed::new(stream, LinesCodec::new());

        let line = tokio::time::timeout(BOOTSTRAP_PEER_TIMEOUT, framed.next())
            .await
            .map_err(|_| ProtocolError::BootstrapFailed)?
            .ok_or(ProtocolError::BootstrapFailed)?
            .map_err(ProtocolError::Io)?;

        let snapshot = match serde_json::from_str::<Message>(&line) {
            Ok(Message::State { state }) => state,
            Ok(_) => return Err(ProtocolError::BootstrapFailed),
            Err(e) => return Err(ProtocolError::MalformedSnapshot(e.to_string())),
        };

        *self.chain.lock().unwrap() = snapshot.load();
        self.synced.store(true, Ordering::SeqCst);
        log::info!("synced from peer on port {port}");

        let node = Arc::clone(self);
        tokio::spawn(async move { node.pump(framed).await });
        Ok(())
    }

    pub fn broadcast_new_block(&self, block: Block) {
        self.send_to_all(&Message::NewBlock { new_block: block });
    }

    pub fn broadcast_new_tx(&self, tx: Transaction) {
        self.send_to_all(&Message::NewTx { new_tx: tx });
    }

    fn send_to_all(&self, message: &Message) {
        let line = match serde_json::to_string(message) {
            Ok(l) => l,
            Err(e) => {
                log::warn!("failed to encode outbound message: {e}");
                return;
            }
        };
        let mut senders = self.peer_senders.lock().unwrap();
        senders.retain(|tx| tx.send(line.clone()).is_ok());
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    log::info!("inbound connection from {addr}");
                    let node = Arc::clone(&self);
                    tokio::spawn(async move { node.handle_connection(stream, true).await });
                }
                Err(e) => log::warn!("accept failed: {e}"),
            }
        }
    }

    async fn dial_peer(self: &Arc<Self>, port: u16) -> Result<(), ProtocolError> {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let node = Arc::clone(self);
        tokio::spawn(async move { node.handle_connection(stream, false).await });
        Ok(())
    }

    /// Runs one peer connection: on `is_inbound`, immediately sends the
    /// local snapshot (spec §4.6's `{state}` message), then hands off to
    /// [`Node::pump`] for the lifetime of the socket.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, is_inbound: bool) {
        let mut framed = Framed::new(stream, LinesCodec::new());

        if is_inbound {
            let snapshot = Snapshot::save(&self.chain.lock().unwrap());
            let msg = Message::State { state: snapshot };
            match serde_json::to_string(&msg) {
                Ok(line) => {
                    if let Err(e) = framed.send(line).await {
                        log::warn!("failed to send snapshot: {e}");
                        return;
                    }
                }
                Err(e) => log::warn!("failed to encode snapshot: {e}"),
            }
        }

        self.pump(framed).await;
    }

    /// Registers this connection's outbound sender and services it for the
    /// lifetime of the socket: forwards queued broadcasts out, dispatches
    /// inbound lines to [`Node::handle_line`]. Shared by inbound
    /// connections, ordinary outbound dials, and a connection that has just
    /// finished bootstrapping from its peer's opening snapshot.
    async fn pump(self: Arc<Self>, mut framed: LineStream) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.peer_senders.lock().unwrap().push(tx);

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(line) => {
                            if let Err(e) = framed.send(line).await {
                                log::warn!("peer write failed: {e}");
                                break;
                            }
                        }
                        None => break,
                    }
                }
                inbound = framed.next() => {
                    match inbound {
                        Some(Ok(line)) => self.handle_line(&line),
                        Some(Err(e)) => {
                            log::warn!("peer read failed: {e}");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Unrecognized messages are logged and ignored during normal gossip
    /// (spec §7 regime 3, downgraded from the source's process exit).
    fn handle_line(&self, line: &str) {
        match serde_json::from_str::<Message>(line) {
            Ok(Message::State { state }) => self.handle_state(state),
            Ok(Message::NewBlock { new_block }) => self.handle_new_block(new_block),
            Ok(Message::NewTx { new_tx }) => self.handle_new_tx(new_tx),
            Err(e) => log::warn!("ignoring unrecognized peer message: {e}"),
        }
    }

    fn handle_state(&self, snapshot: Snapshot) {
        if self.synced.load(Ordering::SeqCst) {
            return;
        }
        let mut chain = self.chain.lock().unwrap();
        *chain = snapshot.load();
        drop(chain);
        self.synced.store(true, Ordering::SeqCst);
        log::info!("synced from peer snapshot");
    }

    fn handle_new_block(&self, block: Block) {
        self.chain.lock().unwrap().new_blocks.push(block);
        self.block_found_by_peer.store(true, Ordering::SeqCst);
    }

    fn handle_new_tx(&self, tx: Transaction) {
        self.chain.lock().unwrap().pending_txs.push(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::chain::ChainParams;

    fn fresh_chain() -> Chain {
        Chain::new_standalone(ChainParams::default()).unwrap()
    }

    #[test]
    fn unrecognized_message_does_not_panic_or_mutate_chain() {
        let node = Node::new(fresh_chain(), 0, true);
        let before = node.chain.lock().unwrap().pending_txs.len();
        node.handle_line("{\"totally_unknown\": 1}");
        assert_eq!(node.chain.lock().unwrap().pending_txs.len(), before);
    }

    #[test]
    fn state_message_is_ignored_once_already_synced() {
        let node = Node::new(fresh_chain(), 0, true);
        let snapshot = Snapshot::save(&node.chain.lock().unwrap());
        let tip_before = node.chain.lock().unwrap().tip().number;
        node.handle_state(snapshot);
        assert_eq!(node.chain.lock().unwrap().tip().number, tip_before);
    }

    #[tokio::test]
    async fn two_node_gossip_convergence() {
        let node_a = Node::new(fresh_chain(), 18_900, true);
        node_a.run(Vec::new()).await.unwrap();

        let node_b = Node::new(fresh_chain(), 18_901, false);
        tokio::time::timeout(std::time::Duration::from_secs(2), node_b.run(vec![18_900]))
            .await
            .expect("node B should bootstrap from node A before the timeout")
            .unwrap();
        assert!(node_b.synced.load(Ordering::SeqCst));

        let cancel = AtomicBool::new(false);
        let mined_number = {
            let mut chain = node_a.chain.lock().unwrap();
            chain.mine_next(&cancel).unwrap();
            chain.tip().clone()
        };
        node_a.broadcast_new_block(mined_number.clone());

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        {
            let mut chain = node_b.chain.lock().unwrap();
            chain.append_new_blocks();
            assert_eq!(chain.tip().hash(), mined_number.hash());
        }
    }

    #[tokio::test]
    async fn bootstrap_retries_past_unreachable_peers_then_succeeds() {
        let node_a = Node::new(fresh_chain(), 18_910, true);
        node_a.run(Vec::new()).await.unwrap();

        // Nothing listens on ports 1 or 2, so both dials refuse immediately;
        // bootstrap must move on to the third, reachable peer.
        let node_b = Node::new(fresh_chain(), 18_911, false);
        node_b.run(vec![1, 2, 18_910]).await.unwrap();
        assert!(node_b.synced.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bootstrap_fails_once_every_configured_peer_is_unreachable() {
        let node = Node::new(fresh_chain(), 18_912, false);
        let result = node.run(vec![1, 2]).await;
        assert!(matches!(result, Err(ProtocolError::BootstrapFailed)));
        assert!(!node.synced.load(Ordering::SeqCst));
    }
}
