//! `chain-node`: the CLI entry point (spec §6).
//!
//! `run` hosts a node (miner and/or networked peer, or a passive watcher);
//! `send` and `read-balance` are auxiliary CLIs that connect as a peer
//! over TCP, sync, and either broadcast a transfer or print balances.

use chain_core::chain::{Chain, ChainParams};
use chain_core::config::ConfigBuilder;
use chain_core::transaction::TxData;
use chain_network::Node;
use chain_wallet::Wallet;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chain-node", about = "Minimal proof-of-work account-model blockchain node", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a node: miner, passive watcher, and/or networked gossip peer.
    Run(RunArgs),
    /// Construct, sign, and broadcast a transfer between two seeded accounts.
    Send(SendArgs),
    /// Connect as a passive peer and print the seeded accounts' balances.
    ReadBalance(ReadBalanceArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Run the mining loop (otherwise: print the tip height every 4s).
    #[arg(long)]
    mine: bool,
    /// Enable the TCP peer node (otherwise: run standalone).
    #[arg(long)]
    networked: bool,
    /// Local TCP listen port.
    #[arg(long, default_value_t = 10000)]
    port: u16,
    /// Comma-separated outbound peer ports on localhost.
    #[arg(long, value_delimiter = ',')]
    peers: Vec<u16>,
}

#[derive(Args)]
struct SendArgs {
    /// Seeded account index to send from.
    #[arg(long)]
    from: usize,
    /// Seeded account index to send to.
    #[arg(long)]
    to: usize,
    /// Amount to transfer.
    #[arg(long)]
    val: u64,
    /// Local TCP listen port for this throwaway peer connection.
    #[arg(long, default_value_t = 10005)]
    port: u16,
    /// Comma-separated peer ports to connect to and sync from.
    #[arg(long, value_delimiter = ',', default_value = "10000")]
    peers: Vec<u16>,
}

#[derive(Args)]
struct ReadBalanceArgs {
    /// Local TCP listen port for this throwaway peer connection.
    #[arg(long, default_value_t = 10006)]
    port: u16,
    /// Comma-separated peer ports to connect to and sync from.
    #[arg(long, value_delimiter = ',', default_value = "10000")]
    peers: Vec<u16>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the async runtime");
    match cli.command {
        Command::Run(args) => runtime.block_on(run(args)),
        Command::Send(args) => runtime.block_on(send(args)),
        Command::ReadBalance(args) => runtime.block_on(read_balance(args)),
    }
}

/// `run` subcommand (spec §6, §4.6, §5).
async fn run(args: RunArgs) -> ExitCode {
    let config = ConfigBuilder::new().listen_port(args.port).peers(args.peers.clone()).finish();

    if args.networked {
        let synced_initially = config.peers.is_empty();
        let chain = match Chain::new_standalone(config.chain_params()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to build genesis chain: {e}");
                return ExitCode::FAILURE;
            }
        };
        let node = Node::new(chain, config.listen_port, synced_initially);
        if let Err(e) = node.run(config.peers.clone()).await {
            eprintln!("failed to bootstrap from any configured peer: {e}");
            return ExitCode::FAILURE;
        }
        if !synced_initially {
            log::info!("Blockchain synced.");
        }

        if args.mine {
            let mining_chain = Arc::clone(&node.chain);
            let cancel = Arc::clone(&node.block_found_by_peer);
            let broadcast_node = Arc::clone(&node);
            std::thread::spawn(move || mining_loop(mining_chain, cancel, Some(broadcast_node)));
            std::future::pending::<()>().await;
        } else {
            passive_watch(Arc::clone(&node.chain)).await;
        }
    } else {
        let chain = match Chain::new_standalone(config.chain_params()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to build genesis chain: {e}");
                return ExitCode::FAILURE;
            }
        };
        let chain = Arc::new(Mutex::new(chain));

        if args.mine {
            let cancel = Arc::new(AtomicBool::new(false));
            let mining_chain = Arc::clone(&chain);
            std::thread::spawn(move || mining_loop(mining_chain, cancel, None));
            std::future::pending::<()>().await;
        } else {
            passive_watch(chain).await;
        }
    }

    ExitCode::SUCCESS
}

/// The assemble-mine-append loop (spec §2, §4.3, §5): composes a candidate
/// over the current tip and pending transactions, searches for a nonce
/// outside the chain lock so a peer's block can preempt it, then commits.
///
/// Runs on a dedicated OS thread since the hash search is a tight,
/// uninterruptible CPU loop (spec §5) — it must not block the async
/// runtime driving the network node.
fn mining_loop(chain: Arc<Mutex<Chain>>, cancel: Arc<AtomicBool>, node: Option<Arc<Node>>) {
    loop {
        cancel.store(false, Ordering::SeqCst);
        let (candidate, difficulty) = {
            let mut guard = chain.lock().unwrap();
            guard.append_new_blocks();
            (guard.compose_candidate(), guard.difficulty)
        };

        match candidate.mine(&difficulty, &cancel) {
            Some(mined) => {
                let mut guard = chain.lock().unwrap();
                match guard.apply_block(mined.clone()) {
                    Ok(()) => {
                        log::info!("mined block {}", mined.number);
                        drop(guard);
                        if let Some(node) = &node {
                            node.broadcast_new_block(mined);
                        }
                    }
                    Err(e) => log::warn!("mined block rejected: {e}"),
                }
            }
            None => {
                log::debug!("mining preempted by a peer's block");
            }
        }
    }
}

/// The passive watcher (spec §6): prints the current tip height every 4
/// seconds when `--mine` is not set.
async fn passive_watch(chain: Arc<Mutex<Chain>>) -> ! {
    loop {
        {
            let mut guard = chain.lock().unwrap();
            guard.append_new_blocks();
            println!("tip height: {}", guard.tip().number);
        }
        tokio::time::sleep(Duration::from_secs(4)).await;
    }
}

/// `send` subcommand (spec §6, grounded in `original_source/send.py`):
/// connects as a peer, syncs, signs a transfer from the synced account
/// table's current nonce, and broadcasts it.
async fn send(args: SendArgs) -> ExitCode {
    let placeholder = match Chain::new_standalone(ChainParams::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to build placeholder chain: {e}");
            return ExitCode::FAILURE;
        }
    };
    let node = Node::new(placeholder, args.port, false);
    if let Err(e) = node.run(args.peers.clone()).await {
        eprintln!("failed to bootstrap from any configured peer: {e}");
        return ExitCode::FAILURE;
    }
    log::info!("Blockchain synced.");

    let wallet = match Wallet::from_seed() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("failed to derive wallet keys: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (from_addr, to_addr, nonce) = {
        let chain = node.chain.lock().unwrap();
        let from_account = match chain.accounts.get(args.from) {
            Some(a) => a.clone(),
            None => {
                eprintln!("no such account index {}", args.from);
                return ExitCode::FAILURE;
            }
        };
        let to_account = match chain.accounts.get(args.to) {
            Some(a) => a.clone(),
            None => {
                eprintln!("no such account index {}", args.to);
                return ExitCode::FAILURE;
            }
        };
        (from_account.address, to_account.address, from_account.nonce)
    };

    let tx = match wallet.build_transaction(args.from, to_addr, args.val, nonce, 1, TxData::Transfer {}) {
        Ok(tx) => tx,
        Err(e) => {
            eprintln!("failed to sign transaction: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Sent tx: {from_addr} -> {to_addr} amount {} (nonce {nonce})", args.val);
    node.broadcast_new_tx(tx);

    tokio::time::sleep(Duration::from_secs(3)).await;
    ExitCode::SUCCESS
}

/// `read-balance` subcommand (spec §6, grounded in
/// `original_source/read_balance.py`): connects as a peer, syncs, and
/// prints the first two seeded accounts' balances.
async fn read_balance(args: ReadBalanceArgs) -> ExitCode {
    let placeholder = match Chain::new_standalone(ChainParams::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to build placeholder chain: {e}");
            return ExitCode::FAILURE;
        }
    };
    let node = Node::new(placeholder, args.port, false);
    if let Err(e) = node.run(args.peers.clone()).await {
        eprintln!("failed to bootstrap from any configured peer: {e}");
        return ExitCode::FAILURE;
    }
    log::info!("Blockchain synced.");

    {
        let chain = node.chain.lock().unwrap();
        for account in chain.accounts.iter().take(2) {
            println!("Balance of {}: {}", account.short_address(), account.balance);
        }
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    ExitCode::SUCCESS
}
