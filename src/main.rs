//! vrfchain node entrypoint (§6): configuration, start-up, and the
//! per-round consensus driver loop tying crypto, storage, mempool,
//! transport, gossip, and peer management together.

use clap::Parser;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tracing::{error, info, warn};

use vrfchain::config::{LoggingConfig, NodeConfig};
use vrfchain::consensus::engine::{ConsensusEngine, RoundInbound, RoundOutbound, RoundOutcome};
use vrfchain::error::NodeError;
use vrfchain::gossip::{Gossip, RelayDecision};
use vrfchain::identity::NodeIdentity;
use vrfchain::mempool::Mempool;
use vrfchain::model::block::Block;
use vrfchain::model::super_node::SuperNodeSet;
use vrfchain::peer_manager::{PeerManager, PeerManagerConfig};
use vrfchain::shutdown::ShutdownManager;
use vrfchain::storage::block_store::BlockStorage;
use vrfchain::storage::kv::KvStore;
use vrfchain::storage::state_store::{AccountStateView, StateStorage};
use vrfchain::transport::connection::PeerConnection;
use vrfchain::transport::dedup::DedupCache;
use vrfchain::transport::message::{from_round_outbound, to_round_inbound, Envelope, Payload};
use vrfchain::transport::client;
use vrfchain::transport::server::Server;
use vrfchain::transport::wire::WireOptions;

#[derive(Parser, Debug)]
#[command(name = "vrfchain-node")]
#[command(about = "VRF hybrid-consensus node daemon", long_about = None)]
struct Cli {
    /// Path to the node's TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override `listen_port` from the config file.
    #[arg(long)]
    listen_port: Option<u16>,

    /// Override `data_dir` from the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run at `debug` log level regardless of configured level.
    #[arg(short, long)]
    verbose: bool,

    /// Write out default configuration to `--config` and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), NodeError> {
    let cli = Cli::parse();

    if cli.generate_config {
        NodeConfig::default().save_to_file(&cli.config)?;
        println!("generated default configuration at {}", cli.config.display());
        return Ok(());
    }

    let mut config = NodeConfig::load_or_create(&cli.config)?;
    if let Some(port) = cli.listen_port {
        config.listen_port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    config.validate()?;

    setup_logging(&config.logging, cli.verbose);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = config.listen_port,
        data_dir = %config.data_dir.display(),
        "starting vrfchain node"
    );

    std::fs::create_dir_all(&config.data_dir)?;

    let identity = Arc::new(NodeIdentity::load_or_generate(&config.node_key_path)?);
    info!(public_key = %hex::encode(identity.public_key_bytes()), "node identity ready");

    let super_nodes = SuperNodeSet::load_from_file(&config.super_node_set_path)?;
    if super_nodes.len() != config.super_node_count {
        warn!(
            configured = config.super_node_count,
            loaded = super_nodes.len(),
            "super node set size does not match configured super_node_count"
        );
    }
    if !super_nodes.contains(&identity.public_key_bytes()) {
        info!("local key is not a member of the super-node set; running observer-only (sync, no proposals/signatures)");
    }

    let kv = KvStore::open(&config.data_dir.join("db"))?;
    let blocks = Arc::new(BlockStorage::new(kv.clone()));
    let state = Arc::new(StateStorage::new(kv));

    let mempool = Arc::new(Mempool::new(10_000, 1));

    let self_address = format!("0.0.0.0:{}", config.listen_port);
    let peer_manager = Arc::new(PeerManager::new(PeerManagerConfig {
        self_address,
        min_peers: config.min_peers,
        max_peers: config.max_connections,
        max_retry_attempts: 5,
        retry_interval_ms: 5_000,
        peer_expiration_ms: 10 * 60 * 1000,
    }));
    peer_manager.seed(&config.bootnodes).await;

    let gossip = Arc::new(Gossip::new(Arc::new(DedupCache::new())));
    let registry: Arc<DashMap<String, mpsc::Sender<Envelope>>> = Arc::new(DashMap::new());

    let wire_opts = WireOptions {
        compression_level: if config.enable_compression { Some(6) } else { None },
        // Session encryption (§4.6) is negotiated per-connection via an
        // ECDH handshake prior to the framed loop; plaintext framing here
        // covers the unencrypted and pre-handshake cases alike.
        cipher: None,
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<(String, Envelope)>(1024);

    spawn_accept_loop(
        config.listen_port,
        registry.clone(),
        peer_manager.clone(),
        wire_opts.clone(),
        inbound_tx.clone(),
    )
    .await?;

    tokio::spawn(dial_loop(
        peer_manager.clone(),
        registry.clone(),
        wire_opts.clone(),
        inbound_tx.clone(),
    ));

    tokio::spawn({
        let peer_manager = peer_manager.clone();
        async move {
            peer_manager.run_maintenance_loop(Duration::from_secs(30)).await;
        }
    });

    // Round-scoped VRF collection window (§4.6/§4.8): the inbound router
    // below forwards consensus-relevant messages to whichever round is
    // currently collecting, and to no one when no round is in flight.
    let current_round_inbound: Arc<Mutex<Option<mpsc::UnboundedSender<RoundInbound>>>> =
        Arc::new(Mutex::new(None));

    tokio::spawn(inbound_router(
        inbound_rx,
        current_round_inbound.clone(),
        mempool.clone(),
        state.clone(),
        gossip.clone(),
        registry.clone(),
        config.message_ttl_ms,
    ));

    let shutdown = ShutdownManager::new();
    let shutdown_token = shutdown.token();
    tokio::spawn({
        let shutdown_token = shutdown_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown_token.cancel();
            }
        }
    });

    let accounts = Arc::new(AccountStateView::new(state.clone()));
    let engine = Arc::new(ConsensusEngine::new(
        identity.clone(),
        super_nodes,
        mempool,
        accounts,
        256,
    ));

    run_round_driver(
        engine,
        blocks,
        state,
        identity,
        gossip,
        registry,
        current_round_inbound,
        config.difficulty_target(),
        shutdown_token,
    )
    .await;

    info!("vrfchain node shut down cleanly");
    Ok(())
}

/// Bind the listener and spawn the accept loop (§4.6/§4.7): every
/// accepted connection is registered with `registry` so the round
/// driver and gossip layer can address it by peer address.
async fn spawn_accept_loop(
    listen_port: u16,
    registry: Arc<DashMap<String, mpsc::Sender<Envelope>>>,
    peer_manager: Arc<PeerManager>,
    wire_opts: WireOptions,
    inbound_tx: mpsc::Sender<(String, Envelope)>,
) -> Result<(), NodeError> {
    let server = Server::bind(&format!("0.0.0.0:{listen_port}")).await?;
    tokio::spawn(async move {
        let registry = registry.clone();
        let peer_manager = peer_manager.clone();
        let result = server
            .run(wire_opts, inbound_tx, move |addr, sender| {
                registry.insert(addr.clone(), sender);
                let peer_manager = peer_manager.clone();
                tokio::spawn(async move { peer_manager.mark_connected(&addr).await });
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "accept loop terminated");
        }
    });
    Ok(())
}

/// Background dial loop (§4.7): every tick, ask the peer manager for
/// candidates worth dialing and attempt to connect until `min_peers` is
/// satisfied (bounded by `max_peers`).
async fn dial_loop(
    peer_manager: Arc<PeerManager>,
    registry: Arc<DashMap<String, mpsc::Sender<Envelope>>>,
    wire_opts: WireOptions,
    inbound_tx: mpsc::Sender<(String, Envelope)>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        if peer_manager.at_capacity().await {
            continue;
        }
        for addr in peer_manager.dial_candidates().await {
            if registry.contains_key(&addr) {
                continue;
            }
            match client::dial(&addr).await {
                Ok((reader, writer)) => {
                    peer_manager.mark_connected(&addr).await;
                    let (outbound_tx, outbound_rx) = mpsc::channel(128);
                    registry.insert(addr.clone(), outbound_tx);

                    let inbound_tx = inbound_tx.clone();
                    let wire_opts = wire_opts.clone();
                    let peer_manager = peer_manager.clone();
                    let registry = registry.clone();
                    let addr_for_task = addr.clone();
                    tokio::spawn(async move {
                        let _ = PeerConnection::run(
                            addr_for_task.clone(),
                            reader,
                            writer,
                            wire_opts,
                            inbound_tx,
                            outbound_rx,
                        )
                        .await;
                        registry.remove(&addr_for_task);
                        peer_manager.mark_disconnected(&addr_for_task).await;
                    });
                }
                Err(e) => {
                    tracing::debug!(peer = %addr, error = %e, "dial failed");
                    peer_manager.mark_failed(&addr).await;
                }
            }
        }
    }
}

/// Consume every inbound envelope from every connection: verify, dedup,
/// relay onward via gossip (§4.8), and route consensus-relevant payloads
/// to the round currently collecting (§4.9) or mempool-admit transactions.
async fn inbound_router(
    mut inbound_rx: mpsc::Receiver<(String, Envelope)>,
    current_round_inbound: Arc<Mutex<Option<mpsc::UnboundedSender<RoundInbound>>>>,
    mempool: Arc<Mempool>,
    state: Arc<StateStorage>,
    gossip: Arc<Gossip>,
    registry: Arc<DashMap<String, mpsc::Sender<Envelope>>>,
    message_ttl_ms: u64,
) {
    while let Some((from, envelope)) = inbound_rx.recv().await {
        if !envelope.verify() {
            continue;
        }
        if now_ms().saturating_sub(envelope.timestamp_ms) >= message_ttl_ms {
            continue;
        }

        relay(&gossip, &registry, &envelope, &from).await;

        match &envelope.payload {
            Payload::Transaction(tx) => {
                let sender_state = state.get(&tx.sender).await.unwrap_or_default();
                if let Err(e) = mempool.admit(tx.clone(), &sender_state) {
                    tracing::debug!(error = %e, "mempool rejected transaction");
                }
            }
            _ => {
                if let Some(msg) = to_round_inbound(&envelope) {
                    let slot = current_round_inbound.lock().await;
                    if let Some(sender) = slot.as_ref() {
                        let _ = sender.send(msg);
                    }
                }
            }
        }
    }
}

/// Relay a gossip-eligible message to a fresh fan-out sample, skipping
/// the peer it arrived from (§4.8).
async fn relay(
    gossip: &Gossip,
    registry: &DashMap<String, mpsc::Sender<Envelope>>,
    envelope: &Envelope,
    from: &str,
) {
    let candidates: Vec<String> = registry
        .iter()
        .map(|e| e.key().clone())
        .filter(|addr| addr != from)
        .collect();
    if let RelayDecision::Forward { peers, .. } =
        gossip.process(envelope.dedup_key(), 0, &candidates)
    {
        for peer in peers {
            if let Some(sender) = registry.get(&peer) {
                let _ = sender.send(envelope.clone()).await;
            }
        }
    }
}

/// Sign `payload` as a fresh envelope and gossip-originate it to a
/// fan-out sample of every currently connected peer (§4.8).
async fn broadcast(
    identity: &NodeIdentity,
    gossip: &Gossip,
    registry: &DashMap<String, mpsc::Sender<Envelope>>,
    payload: Payload,
) {
    let sender = identity.public_key_bytes();
    let timestamp_ms = now_ms();
    let nonce = rand::random::<u64>();
    let bytes = Envelope::signing_bytes(&sender, timestamp_ms, nonce, &payload);
    let signature = identity.sign(&bytes);
    let envelope = Envelope {
        sender,
        timestamp_ms,
        nonce,
        payload,
        signature,
    };

    let peers: Vec<String> = registry.iter().map(|e| e.key().clone()).collect();
    if let RelayDecision::Forward { peers, .. } = gossip.originate(envelope.dedup_key(), &peers) {
        for peer in peers {
            if let Some(s) = registry.get(&peer) {
                let _ = s.send(envelope.clone()).await;
            }
        }
    }
}

/// The outer round loop (§4.9): strictly sequential rounds, each driven
/// to FINAL or FAILED before the next begins, persisting finalized
/// blocks idempotently (§4.10 step 7).
#[allow(clippy::too_many_arguments)]
async fn run_round_driver(
    engine: Arc<ConsensusEngine>,
    blocks: Arc<BlockStorage>,
    state: Arc<StateStorage>,
    identity: Arc<NodeIdentity>,
    gossip: Arc<Gossip>,
    registry: Arc<DashMap<String, mpsc::Sender<Envelope>>>,
    current_round_inbound: Arc<Mutex<Option<mpsc::UnboundedSender<RoundInbound>>>>,
    difficulty_target: Vec<u8>,
    shutdown_token: tokio_util::sync::CancellationToken,
) {
    let mut round: u32 = 0;

    while !shutdown_token.is_cancelled() {
        let tip_height = blocks.latest_height().await.unwrap_or(None);
        let prev_hash = blocks.latest_hash().await.unwrap_or(None).unwrap_or([0u8; 32]);
        let height = tip_height.map(|h| h + 1).unwrap_or(1);

        let (round_inbound_tx, round_inbound_rx) = mpsc::unbounded_channel();
        *current_round_inbound.lock().await = Some(round_inbound_tx);

        let (round_outbound_tx, mut round_outbound_rx) = mpsc::unbounded_channel();
        let relay_task = {
            let identity = identity.clone();
            let gossip = gossip.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                while let Some(out) = round_outbound_rx.recv().await {
                    let payload = from_round_outbound(out);
                    broadcast(&identity, &gossip, &registry, payload).await;
                }
            })
        };

        let outcome = tokio::select! {
            outcome = engine.run_round(
                height,
                round,
                prev_hash,
                difficulty_target.clone(),
                round_inbound_rx,
                round_outbound_tx,
            ) => outcome,
            _ = shutdown_token.cancelled() => RoundOutcome::Failed { reason: "shutting down" },
        };

        *current_round_inbound.lock().await = None;
        relay_task.abort();

        match outcome {
            RoundOutcome::Finalized(block) => {
                let finalized_height = block.height;
                match persist_finalized(&blocks, &state, block).await {
                    Ok(()) => info!(height = finalized_height, round, "block finalized"),
                    Err(e) => {
                        error!(error = %e, "persistent storage fault finalizing block; halting consensus");
                        shutdown_token.cancel();
                    }
                }
                round = round.wrapping_add(1);
            }
            RoundOutcome::Skipped { reason } => {
                warn!(round, reason, "round skipped; retrying at the same height");
                round = round.wrapping_add(1);
            }
            RoundOutcome::Failed { reason } => {
                warn!(round, reason, "round failed; retrying at the same height");
                round = round.wrapping_add(1);
            }
        }
    }
}

/// §4.10 step 7: retry the storage write idempotently; a block is not
/// final until the write succeeds. A handful of quick retries absorb
/// transient faults; persistent failure is surfaced as fatal.
async fn persist_finalized(
    blocks: &BlockStorage,
    state: &StateStorage,
    block: Block,
) -> Result<(), NodeError> {
    let mut attempt = 0u32;
    loop {
        match blocks.store_block(&block).await {
            Ok(()) => break,
            Err(e) if attempt < 5 => {
                attempt += 1;
                warn!(error = %e, attempt, "retrying block store after failure");
                tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    state.apply_block(&block).await.map_err(NodeError::from)
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Structured logging (§2 ambient stack): env-filter-driven level,
/// `pretty`/`json` console format, optional rotated file output under
/// `data_dir/logs` via `tracing-appender`.
fn setup_logging(config: &LoggingConfig, verbose: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, Registry};

    let level = if verbose { "debug".to_string() } else { config.level.clone() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.output != "file" {
        let layer = if config.format == "json" {
            fmt::layer().json().with_target(false).boxed()
        } else {
            fmt::layer().with_target(false).compact().boxed()
        };
        layers.push(layer);
    }

    if config.output == "file" || config.output == "both" {
        let log_path = PathBuf::from(&config.file_path);
        let dir = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let _ = std::fs::create_dir_all(dir);
        let file_name = log_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("vrfchain-node.log");
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Leaked deliberately: the guard must outlive the subscriber, and
        // the node has no earlier point to drop it before process exit.
        std::mem::forget(guard);
        layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
    }

    tracing_subscriber::registry().with(filter).with(layers).init();
}
