use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use depot_storage::{Depot, Durability};

mod api;

#[derive(Parser, Debug)]
#[command(version, about = "Expiring file depot server")]
struct ServerConfig {
    #[arg(long, default_value = "data", help = "Directory holding blob bytes")]
    data_dir: PathBuf,

    #[arg(long, default_value = "meta", help = "Directory holding the metadata store")]
    meta_dir: PathBuf,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value = "50010")]
    port: u16,

    #[arg(
        long,
        default_value = "fdatasync",
        help = "Durability level (buffer, fsync, fdatasync)"
    )]
    durability: Durability,

    #[arg(
        long,
        default_value = "2h",
        value_parser = humantime::parse_duration,
        help = "Period between automatic expiry sweeps"
    )]
    reap_interval: std::time::Duration,

    #[arg(
        long,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,
}

fn setup_tracing(log_level: &str) {
    // Try to use RUST_LOG env var first, fall back to CLI flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", log_level);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = ServerConfig::parse();
    setup_tracing(&config.log_level);
    run(config)
}

fn canonicalize_or_create(dir: PathBuf) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| {
        std::fs::create_dir_all(&dir).ok();
        dir.canonicalize()
            .unwrap_or_else(|_| std::env::current_dir().map(|cwd| cwd.join(&dir)).unwrap_or(dir))
    })
}

#[tokio::main]
async fn run(mut config: ServerConfig) -> Result<()> {
    // Canonicalize paths to avoid repeated getcwd() syscalls in async
    // operations when relative paths are configured
    config.data_dir = canonicalize_or_create(config.data_dir);
    config.meta_dir = canonicalize_or_create(config.meta_dir);
    info!("using data_dir: {}", config.data_dir.display());
    info!("using meta_dir: {}", config.meta_dir.display());

    let depot = Arc::new(Depot::open(
        &config.data_dir,
        &config.meta_dir,
        config.durability,
    )?);
    info!(files = depot.file_count(), "metadata store loaded");

    // Background expiry sweep
    let reaper = {
        let depot = depot.clone();
        let period = config.reap_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match depot.reap().await {
                    Ok(report) if report.count() > 0 => {
                        info!(reclaimed = report.count(), "scheduled expiry sweep finished")
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "scheduled expiry sweep failed"),
                }
            }
        })
    };
    info!(period = %humantime::format_duration(config.reap_interval), "started expiry sweep task");

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    let service = api::ApiService::new(depot, local_addr.to_string());

    let http_server = ConnBuilder::new(TokioExecutor::new());
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    info!("server is running at http://{local_addr}");

    loop {
        tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok((socket, _)) => {
                        let service = service.clone();
                        let handler = hyper::service::service_fn(move |req| {
                            let service = service.clone();
                            async move { service.handle_request(req).await }
                        });
                        let conn = http_server.serve_connection(TokioIo::new(socket), handler);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            let _ = conn.await;
                        });
                        continue;
                    }
                    Err(err) => {
                        tracing::error!("error accepting connection: {err}");
                        continue;
                    }
                }
            }
            _ = ctrl_c.as_mut() => {
                break;
            }
        };
    }

    reaper.abort();

    tokio::select! {
        () = graceful.shutdown() => {
             tracing::debug!("Gracefully shutdown!");
        },
        () = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
             tracing::debug!("Waited 10 seconds for graceful shutdown, aborting...");
        }
    }

    info!("server is stopped");
    Ok(())
}
