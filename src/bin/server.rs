//! CinderKV Server Binary
//!
//! Opens an engine and serves it over TCP.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use cinderkv::network::Server;
use cinderkv::{Config, Engine, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// CinderKV Server
#[derive(Parser, Debug)]
#[command(name = "cinderkv-server")]
#[command(about = "Log-structured key-value store served over TCP")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./cinderkv_data")]
    data_dir: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7379")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Buffered records before a flush
    #[arg(long, default_value = "1000")]
    memtable_threshold: usize,

    /// Segment size in KB before rotation
    #[arg(long, default_value = "4096")]
    segment_kb: u64,

    /// Sealed segments tolerated before a merge
    #[arg(long, default_value = "4")]
    merge_threshold: usize,

    /// When to fsync segment appends
    #[arg(long, value_enum, default_value = "every-flush")]
    sync: SyncArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SyncArg {
    EveryFlush,
    OnRotate,
}

impl From<SyncArg> for SyncStrategy {
    fn from(arg: SyncArg) -> Self {
        match arg {
            SyncArg::EveryFlush => SyncStrategy::EveryFlush,
            SyncArg::OnRotate => SyncStrategy::OnRotate,
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cinderkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("CinderKV Server v{}", cinderkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .memtable_threshold(args.memtable_threshold)
        .segment_size_limit(args.segment_kb * 1024)
        .merge_threshold(args.merge_threshold)
        .sync_strategy(args.sync.into())
        .build();

    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, Arc::clone(&engine)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
