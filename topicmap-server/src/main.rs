use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use topicmap_core::config::StoreBackend;
use topicmap_core::TopicMapConfig;
use tracing_subscriber::{fmt, EnvFilter};

use topicmap_server::router::AppState;
use topicmap_server::server;
use topicmap_server::subsystems::embedder;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "topicmap.toml")]
    config: String,

    /// Check that the graph store is reachable and readable, then exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match TopicMapConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over [service] log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let store = match embedder::open_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open {:?} graph store: {}", config.store.backend, e);
            std::process::exit(1);
        }
    };

    if args.health {
        if config.store.backend == StoreBackend::Postgres {
            if let Some(database) = &config.database {
                match topicmap_core::db::create_pool(database).await {
                    Ok(pool) => match topicmap_core::db::health_check(&pool).await {
                        Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                        Err(e) => {
                            println!("❌ PostgreSQL query failed: {}", e);
                            std::process::exit(1);
                        }
                    },
                    Err(e) => {
                        println!("❌ PostgreSQL connection failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        }

        match store.load().await {
            Ok(snapshot) => println!(
                "✅ {} graph store readable: {} nodes, {} links, version {}",
                store.name(),
                snapshot.graph.nodes.len(),
                snapshot.graph.links.len(),
                snapshot.version
            ),
            Err(e) => {
                println!("❌ {} graph store unreadable: {}", store.name(), e);
                std::process::exit(1);
            }
        }

        println!("✅ topicmap health check passed");
        store.close().await;
        return Ok(());
    }

    let mut state = AppState::new(config.clone(), store.clone());
    if let Some(ingestor) = embedder::create_ingestor(&config, state.mutator.clone()) {
        state = state.with_ingestor(ingestor);
    }
    let state = Arc::new(state);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // HTTP REST API alongside the IPC socket, if enabled
    if config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = topicmap_server::http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    let result = server::run_unix_server(&socket_path, state, tx.subscribe()).await;

    store.close().await;
    result
}
