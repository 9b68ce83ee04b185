//! `warp` — command-line operator surface for the wraith-warp transfer
//! engine.
//!
//! The engine never opens a socket itself (see `wraith_transport::Channel`);
//! this binary ships only the in-memory `LoopbackChannel`, so `send`/`host`
//! run a local end-to-end demonstration of the pipeline rather than talking
//! to a remote peer. A real deployment supplies its own `Channel`/`Signaling`
//! implementation and drives the same `wraith_core::engine` types directly.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use config::Config;
use progress::TransferProgress;
use rand_core::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use wraith_core::engine::{Coordinator, ReceiverEngine, SenderEngine};
use wraith_core::manifest::{FileEntry, Manifest};
use wraith_crypto::aead::FrameCrypto;
use wraith_crypto::kdf::derive_session_keys;
use wraith_crypto::x25519::PrivateKey;
use wraith_files::sink::FilesystemSink;
use wraith_files::source::{self, SourceFile};
use wraith_transport::LoopbackChannel;

#[derive(Parser)]
#[command(name = "warp")]
#[command(author, version, about = "Peer-to-peer bulk file transfer", long_about = None)]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one or more paths, demonstrating the full pipeline over an
    /// in-process loopback channel.
    Send {
        /// Files to send.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Directory the loopback receiver writes into.
        #[arg(short, long, default_value = "./warp-received")]
        out: PathBuf,

        /// Stream files as one concatenated archive instead of individually.
        #[arg(long)]
        archive: bool,

        /// Encrypt frames using a freshly-generated ephemeral session.
        #[arg(long)]
        encrypt: bool,
    },

    /// Explain how to attach a real transport; the engine takes any
    /// `Channel` implementation, this binary just doesn't ship one.
    Receive {
        /// Directory received files would be written to.
        #[arg(short, long, default_value = "./warp-received")]
        out: PathBuf,
    },

    /// Run the fan-out coordinator against `peers` in-process loopback
    /// receivers, demonstrating batched broadcast.
    Host {
        /// Files to host.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Number of simulated receivers to attach (<= `max_direct_peers`).
        #[arg(short, long, default_value_t = 2)]
        peers: usize,

        /// Base directory; each peer writes under `out/peer-<n>/`.
        #[arg(short, long, default_value = "./warp-hosted")]
        out: PathBuf,
    },

    /// Generate an X25519 identity for the handshake.
    Keygen {
        /// Where to write the raw 32-byte private key.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the tunables currently in effect.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    match cli.command {
        Commands::Send {
            paths,
            out,
            archive,
            encrypt,
        } => send(paths, out, archive, encrypt, &config).await?,
        Commands::Receive { out } => receive_explainer(&out),
        Commands::Host { paths, peers, out } => host(paths, peers, out, &config).await?,
        Commands::Keygen { output } => keygen(output, &config)?,
        Commands::Status => status(&config),
    }

    Ok(())
}

fn build_manifest(paths: &[PathBuf], archive_mode: bool) -> anyhow::Result<Manifest> {
    let mut files = Vec::with_capacity(paths.len());
    for (id, path) in paths.iter().enumerate() {
        if !path.exists() {
            anyhow::bail!("path not found: {}", path.display());
        }
        let meta = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        files.push(FileEntry {
            id: u16::try_from(id)
                .map_err(|_| anyhow::anyhow!("too many files for one transfer"))?,
            name: name.clone(),
            path: name,
            size: meta.len(),
            mime: None,
            mtime: None,
        });
    }
    // A lone file is named after itself; multiple paths are treated as one
    // folder-shaped bundle and named after the first path's parent
    // directory (falling back to "bundle" at the filesystem root).
    let root_name = match files.as_slice() {
        [single] => single.name.clone(),
        _ => paths
            .first()
            .and_then(|p| p.parent())
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("bundle")
            .to_string(),
    };
    let transfer_id = format!("warp_{:08x}", rand_core::OsRng.next_u32());
    Ok(Manifest::new(transfer_id, root_name, files, archive_mode))
}

fn source_files(manifest: &Manifest, paths: &[PathBuf]) -> Vec<SourceFile> {
    manifest
        .files
        .iter()
        .zip(paths)
        .map(|(entry, path)| SourceFile {
            file_index: entry.id,
            path: path.clone(),
        })
        .collect()
}

async fn send(
    paths: Vec<PathBuf>,
    out: PathBuf,
    archive: bool,
    encrypt: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let manifest = build_manifest(&paths, archive)?;
    let total_size = manifest.total_size();
    tracing::info!(transfer_id = %manifest.transfer_id, files = manifest.files.len(), "built manifest");

    let (sender_crypto, receiver_crypto): (Option<FrameCrypto>, Option<FrameCrypto>) = if encrypt {
        let shared = [0x5Au8; 32]; // demo session key, not a real handshake result
        (
            Some(FrameCrypto::new(&derive_session_keys(&shared, true))),
            Some(FrameCrypto::new(&derive_session_keys(&shared, false))),
        )
    } else {
        (None, None)
    };

    let archive_compress = archive && config.transfer.archive_compress;
    let sink = Arc::new(FilesystemSink::new(&manifest, &out, archive_compress).await?);
    let (send_channel, recv_channel) = LoopbackChannel::pair();

    let receiver = ReceiverEngine::new(Arc::new(recv_channel), receiver_crypto, sink, total_size);
    let receiver_task = tokio::spawn(receiver.run(None, |_control| {}));

    let files = source_files(&manifest, &paths);
    let (chunk_tx, chunk_rx) = tokio::sync::mpsc::channel(32);
    let chunk_size = config.transfer.chunk_max;
    let producer = if archive {
        tokio::spawn(source::run_archive_stream(
            files,
            chunk_size,
            config.transfer.archive_compress,
            chunk_tx,
        ))
    } else {
        tokio::spawn(source::run_single_stream(files, chunk_size, chunk_tx))
    };

    let progress = TransferProgress::new(total_size, &manifest.transfer_id);
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(8);
    let progress_task = tokio::spawn(async move {
        while let Some(report) = progress_rx.recv().await {
            progress.apply(&report);
        }
        progress.finish();
    });

    let sender = SenderEngine::new(
        Arc::new(send_channel),
        sender_crypto,
        config.network.transport_high_water,
        total_size,
    );
    sender.run(chunk_rx, Some(progress_tx)).await?;

    producer.await??;
    receiver_task.await??;
    let _ = progress_task.await;

    println!("transferred {total_size} bytes to {}", out.display());
    Ok(())
}

fn receive_explainer(out: &std::path::Path) {
    println!("warp's engine is transport-agnostic: it accepts any wraith_transport::Channel.");
    println!("This build only ships the in-memory LoopbackChannel, so there is no standalone");
    println!("network listener to attach to. Embed wraith_core::engine::ReceiverEngine with");
    println!("your own Channel/Signaling implementation to receive over a real transport.");
    println!("(would have written into: {})", out.display());
}

async fn host(
    paths: Vec<PathBuf>,
    peers: usize,
    out: PathBuf,
    config: &Config,
) -> anyhow::Result<()> {
    if peers == 0 || peers > config.network.max_direct_peers {
        anyhow::bail!(
            "peers must be between 1 and {}",
            config.network.max_direct_peers
        );
    }

    let manifest = build_manifest(&paths, false)?;
    let total_size = manifest.total_size();
    let mut coordinator = Coordinator::new(manifest.clone());

    let mut receiver_tasks = Vec::new();
    let mut peer_ids = Vec::new();
    for n in 0..peers {
        let (host_side, peer_side) = LoopbackChannel::pair();
        let id = coordinator.attach_peer(Arc::new(host_side))?;
        peer_ids.push(id);

        let peer_out = out.join(format!("peer-{n}"));
        let sink = Arc::new(FilesystemSink::new(&manifest, &peer_out, false).await?);
        let receiver = ReceiverEngine::new(Arc::new(peer_side), None, sink, total_size);
        receiver_tasks.push(tokio::spawn(receiver.run(None, |_control| {})));
    }

    for id in &peer_ids {
        coordinator.mark_ready(*id);
    }
    coordinator.start_batch(peer_ids.clone());

    let files = source_files(&manifest, &paths);
    let (chunk_tx, chunk_rx) = tokio::sync::mpsc::channel(32);
    let chunk_size = config.transfer.chunk_max;
    let producer = tokio::spawn(source::run_single_stream(files, chunk_size, chunk_tx));

    let dropped = coordinator
        .run_batch(chunk_rx, None, config.network.transport_high_water)
        .await?;
    for id in dropped {
        tracing::warn!(?id, "peer dropped mid-batch");
    }
    producer.await??;

    for task in receiver_tasks {
        task.await??;
    }

    println!(
        "hosted {total_size} bytes to {peers} peer(s) under {}",
        out.display()
    );
    Ok(())
}

fn keygen(output: Option<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let private = PrivateKey::generate(&mut rand_core::OsRng);
    let public = private.public_key();
    println!("public key: {}", hex::encode(public.to_bytes()));

    let path = output.unwrap_or_else(|| config.identity.keypair_path.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, private.to_bytes())?;
    println!("private key written to: {}", path.display());
    println!("keep this file secret; it is not further encrypted at rest.");
    Ok(())
}

fn status(config: &Config) {
    println!("warp {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("identity:");
    println!("  keypair_path: {}", config.identity.keypair_path.display());
    println!();
    println!("transfer:");
    println!(
        "  chunk size: {}..={} bytes",
        config.transfer.chunk_min, config.transfer.chunk_max
    );
    println!(
        "  prefetch watermarks: low {} / high {} bytes",
        config.transfer.prefetch_low_water, config.transfer.prefetch_high_water
    );
    println!();
    println!("network:");
    println!("  max_direct_peers: {}", config.network.max_direct_peers);
    println!(
        "  connect_timeout: {}s",
        config.network.connect_timeout_secs
    );
    println!(
        "  batch_readiness_window: {}s",
        config.network.batch_readiness_window_secs
    );
    println!(
        "  transport_high_water: {} bytes",
        config.network.transport_high_water
    );
}
