//! Kivio server binary.
//!
//! Opens (or recovers) the store under the data directory and serves the
//! key-value protocol until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kivio::{RemoteServerConfig, RemoteStoreServer, ShardedStore, StoreConfig};

#[derive(Parser, Debug)]
#[command(name = "kivio-server")]
#[command(about = "Durable sharded key-value store server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(long, default_value = "0.0.0.0:50051")]
    addr: SocketAddr,

    /// Data directory for the snapshot and WAL
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Seconds between timer-driven snapshots (0 disables the timer)
    #[arg(long, default_value_t = 300)]
    snapshot_interval_secs: u64,

    /// Maximum concurrent client connections
    #[arg(long, default_value_t = 1024)]
    max_connections: usize,
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kivio=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let config = StoreConfig::new(&args.data_dir)
        .with_snapshot_interval(Duration::from_secs(args.snapshot_interval_secs));

    let store = match ShardedStore::open(config) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(%err, "failed to open store");
            std::process::exit(1);
        }
    };

    let server = match RemoteStoreServer::new(
        store.clone(),
        RemoteServerConfig {
            bind_address: args.addr,
            max_connections: args.max_connections,
        },
    ) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(%err, "invalid server configuration");
            std::process::exit(1);
        }
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = server.run_until_shutdown(shutdown).await {
        tracing::error!(%err, "server failed");
        std::process::exit(1);
    }

    store.close();
    tracing::info!("server stopped");
}
