use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing::{error, info};

use recursor::cache::SocketCache;
use recursor::upstream::UpstreamTransport;
use recursor::{config, metrics, server, ServerState};

/// A recursive DNS resolver.
#[derive(Parser)]
#[command(name = "recursor")]
struct Cli {
    /// Run the DNS server
    #[arg(short = 'r')]
    run: bool,

    /// Port to run the server on
    #[arg(short = 'p', value_name = "PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Number of workers handling requests
    #[arg(short = 't', value_name = "THREADS", default_value_t = config::DEFAULT_WORKERS)]
    threads: usize,

    /// Print version info
    #[arg(short = 'v')]
    version: bool,

    /// Path to the root server list
    #[arg(long, value_name = "FILE", default_value = config::ROOT_SERVERS_FILE)]
    root_servers: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    if cli.version {
        println!("recursor version: {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if !cli.run {
        Cli::command().print_help()?;
        return Ok(());
    }

    let roots = config::load_root_servers(&cli.root_servers)?;
    info!(
        "Loaded {} root servers from {}",
        roots.len(),
        cli.root_servers.display()
    );

    let cache = Arc::new(SocketCache::new(roots.clone()));
    let transport = UpstreamTransport::new(cache.clone());
    transport.warm_cache().await?;
    info!("Socket cache warmed with {} root connections", cache.len().await);

    let metrics = Arc::new(metrics::Metrics::new());
    let state = Arc::new(ServerState {
        roots,
        transport,
        metrics: metrics.clone(),
    });

    tokio::spawn(async move {
        if let Err(e) = metrics::run_metrics_server(config::METRICS_PORT, metrics).await {
            error!("Metrics server failed: {e:#}");
        }
    });

    server::run_udp_server(cli.port, cli.threads, state).await
}
