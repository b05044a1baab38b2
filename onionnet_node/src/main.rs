#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

mod node_config;
mod tools;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Error};
use futures::{Future, FutureExt, TryFutureExt};
use onionnet::core::destination::{destination_run, Destination};
use onionnet::core::directory::{cds_run, DirectoryClient, Registry, Server};
use onionnet::core::relay::keys::{keys_file_path, load_or_gen_keys};
use onionnet::core::relay::*;
use onionnet::core::stats::Stats;
use onionnet::crypto::fingerprint;
use tokio::net::TcpListener;
use tokio::runtime;
#[cfg(unix)]
use syslog::Facility;

use crate::node_config::*;

/// Run a future with the runtime specified by config.
fn run<F>(future: F, threads: Threads)
    where F: Future<Output = Result<(), Error>> + 'static
{
    if threads == Threads::N(1) {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to create runtime");
        runtime.block_on(future).expect("Execution was terminated with error");
    } else {
        let mut builder = runtime::Builder::new_multi_thread();
        match threads {
            Threads::N(n) => { builder.worker_threads(n as usize); },
            Threads::Auto => { }, // builder will detect number of cores automatically
        }
        let runtime = builder
            .enable_all()
            .build()
            .expect("Failed to create runtime");
        runtime.block_on(future).expect("Execution was terminated with error");
    };
}

fn log_stats(name: &str, stats: &Stats) {
    info!(
        "{} stats: {} frames ({} bytes) received, {} frames ({} bytes) sent",
        name,
        stats.counters.incoming(),
        stats.counters.incoming_bytes(),
        stats.counters.outgoing(),
        stats.counters.outgoing_bytes(),
    );
}

async fn run_cds(config: NodeConfig) -> Result<(), Error> {
    let registry = match config.relay_ttl {
        Some(ttl) => Registry::with_ttl(ttl),
        None => Registry::new(),
    };
    let stats = Stats::new();
    let mut server = Server::new(registry);
    server.set_io_timeout(config.io_timeout);
    server.set_stats(stats.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Running directory server on {}", config.listen_addr);

    let res = cds_run(&server, listener, config.connections_limit).await.map_err(Error::from);
    log_stats("Directory", &stats);
    res
}

async fn run_relay(config: NodeConfig) -> Result<(), Error> {
    let cds_addr = config.cds_addr.ok_or_else(|| anyhow!("'cds-address' is not set"))?;

    let keys_file = match config.keys_file {
        Some(ref keys_file) => PathBuf::from(keys_file),
        None => {
            let id = config.relay_id.clone().unwrap_or_else(|| config.listen_addr.port().to_string());
            keys_file_path(Path::new("."), &id)
        },
    };
    let keys = load_or_gen_keys(&keys_file)?;
    info!("Relay public key: {}", hex::encode(keys.pk.as_bytes()).to_uppercase());
    info!("Relay fingerprint: {}", fingerprint(&keys.pk));

    let stats = Stats::new();
    let mut relay = Relay::new(keys);
    relay.set_destination(config.destination);
    relay.set_io_timeout(config.io_timeout);
    relay.set_stats(stats.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    let public_addr = config.public_addr.unwrap_or(config.listen_addr);
    let record = relay.record(public_addr, config.relay_id.clone());

    let mut directory = DirectoryClient::new(cds_addr);
    directory.set_timeout(config.io_timeout);
    register_relay(&directory, &record, config.registration_attempts, DEFAULT_REGISTRATION_DELAY).await?;

    if config.destination.is_none() {
        warn!("No default destination, exit layers must name one");
    }
    info!("Running relay {} on {}", record.display_id(), config.listen_addr);

    let relay_future = relay_run(&relay, listener, config.connections_limit).map_err(Error::from);
    let res = match config.heartbeat {
        None => relay_future.await,
        Some(interval) => futures::select! {
            res = relay_future.fuse() => res,
            _ = heartbeat(directory, record, interval).fuse() => Ok(()),
        },
    };
    log_stats("Relay", &stats);
    res
}

async fn run_destination(config: NodeConfig) -> Result<(), Error> {
    let stats = Stats::new();
    let mut destination = Destination::new();
    destination.set_io_timeout(config.io_timeout);
    destination.set_stats(stats.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Running destination server on {}", config.listen_addr);

    let res = destination_run(&destination, listener, config.connections_limit).await.map_err(Error::from);
    log_stats("Destination", &stats);
    res
}

fn main() {
    let config = cli_parse();

    match config.log_type {
        LogType::Stderr => {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", "info");
            env_logger::Builder::from_env(env)
                .init();
        },
        LogType::Stdout => {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", "info");
            env_logger::Builder::from_env(env)
                .target(env_logger::fmt::Target::Stdout)
                .init();
        },
        #[cfg(unix)]
        LogType::Syslog => {
            syslog::init(Facility::LOG_USER, log::LevelFilter::Info, Some("onionnet-node"))
                .expect("Failed to initialize syslog backend.");
        },
        LogType::None => { },
    }

    for key in config.unused.keys() {
        warn!("Unused configuration key: {:?}", key);
    }

    let threads = config.threads;
    let future = async move {
        match config.role {
            Role::Cds => run_cds(config).await,
            Role::Relay => run_relay(config).await,
            Role::Destination => run_destination(config).await,
        }
    };

    run(future, threads);
}
