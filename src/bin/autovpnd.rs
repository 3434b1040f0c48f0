//! AutoVPN server binary.

use autovpn::adapters::AdapterRegistry;
use autovpn::config::AutovpnConfig;
use autovpn::logging::init_logging;
use autovpn::resolve::DohResolver;
use autovpn::server::{autoupdater, net, ServerCore};
use autovpn::store::SledPlaybookStore;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "autovpnd", about = "Playbook-driven DNS and route orchestration server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Playbook database path, overrides the config file
    #[arg(short, long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match AutovpnConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    if let Err(e) = init_logging(Some(&config.logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("AutoVPN server starting");

    let store = match SledPlaybookStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open playbook db {}: {}", config.db_path, e);
            eprintln!("Failed to open playbook db {}: {}", config.db_path, e);
            process::exit(1);
        }
    };
    let resolver = match DohResolver::new() {
        Ok(resolver) => Box::new(resolver),
        Err(e) => {
            error!("Failed to build resolver: {}", e);
            eprintln!("Failed to build resolver: {}", e);
            process::exit(1);
        }
    };

    let core = Arc::new(ServerCore::new(
        store,
        AdapterRegistry::with_builtins(),
        resolver,
    ));
    core.update_updater_table();

    tokio::spawn(autoupdater::run_loop(
        core.clone(),
        Duration::from_secs(config.autoupdate_tick_secs),
    ));

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.listen_addr, e);
            eprintln!("Failed to bind {}: {}", config.listen_addr, e);
            process::exit(1);
        }
    };
    info!("Listening on {}", config.listen_addr);

    tokio::select! {
        result = net::serve(core, listener) => {
            if let Err(e) = result {
                error!("Server loop failed: {:#}", e);
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
