//! Emote platform API server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use clap::Parser;
use seventv_api::{AppState, Infrastructure, health, router};
use seventv_common::{Config, LocalStorage, ObjectStore};
use seventv_core::{Events, probe::CommandProbe};
use seventv_queue::{
    PurgeAssetsContext, PurgeAssetsJob, QueuedAssetCleanup, RedisEventPublisher,
    RedisMessageQueue, RedisStore, purge_assets_worker, spawn_result_listeners,
};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired queue deliveries are put back.
const REAPER_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "seventv", version, about = "Emote platform API server")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "SEVENTV_CONFIG")]
    config: Option<PathBuf>,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Resolves once the shutdown flag flips.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("seventv={},tower_http=info", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(feature = "s3")]
fn s3_store(config: &Config) -> Option<Arc<dyn ObjectStore>> {
    if config.s3.endpoint.is_empty() {
        return None;
    }
    info!(endpoint = %config.s3.endpoint, "using S3 object storage");
    Some(Arc::new(seventv_common::S3Storage::new(
        &config.s3.endpoint,
        &config.s3.region,
        &config.s3.access_token,
        &config.s3.secret_key,
    )))
}

#[cfg(not(feature = "s3"))]
fn s3_store(_config: &Config) -> Option<Arc<dyn ObjectStore>> {
    None
}

fn object_store(config: &Config) -> Arc<dyn ObjectStore> {
    s3_store(config).unwrap_or_else(|| {
        info!(root = %config.s3.local_root, "using local object storage");
        Arc::new(LocalStorage::new(PathBuf::from(&config.s3.local_root)))
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    info!("Starting seventv API server...");

    // Database
    let db = seventv_db::init(&config).await?;
    info!("Connected to database");
    seventv_db::migrate(&db).await?;
    info!("Migrations completed");
    let db = Arc::new(db);

    // Redis: shared store, message queue and event fan-out
    let fred_client = seventv_queue::connect(&config.redis.url).await?;
    let store = Arc::new(RedisStore::new(fred_client.clone()));
    let mq = RedisMessageQueue::new(
        fred_client.clone(),
        Duration::from_secs(config.message_queue.visibility_timeout_secs),
    );
    let (publisher, publisher_handle) = RedisEventPublisher::spawn(fred_client);
    let events = Events::new(Arc::new(publisher));

    // Job queue
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let jobs = apalis_redis::RedisStorage::<PurgeAssetsJob>::new(redis_conn);
    info!("Connected to Redis job queue");

    let storage = object_store(&config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper = mq.spawn_reaper(
        vec![
            config.message_queue.image_processor_results.clone(),
            config.message_queue.image_processor_user_pictures_results.clone(),
        ],
        REAPER_INTERVAL,
        shutdown_rx.clone(),
    );
    let mq = Arc::new(mq);

    let infra = Infrastructure {
        db,
        store,
        mq: mq.clone(),
        events,
        storage: Arc::clone(&storage),
        probe: Arc::new(CommandProbe::new()),
        cleanup: Arc::new(QueuedAssetCleanup::new(jobs.clone())),
    };

    let rest_addr = SocketAddr::new(config.http.addr.parse()?, config.http.rest_port);
    let health_addr = SocketAddr::new(config.http.addr.parse()?, config.http.health_port);
    let state = AppState::new(config, infra.clone())?;

    let mut listeners = if state.config.message_queue.enabled {
        spawn_result_listeners(state.ingest_service.clone(), mq, shutdown_rx.clone())
    } else {
        warn!("message queue disabled, image processor results are not consumed");
        Vec::new()
    };

    // Asset cleanup worker
    let worker_shutdown = shutdown_rx.clone();
    let worker = tokio::spawn(async move {
        let monitor = Monitor::new().register({
            WorkerBuilder::new("purge-assets")
                .data(PurgeAssetsContext::new(storage))
                .backend(jobs)
                .build_fn(purge_assets_worker)
        });

        if let Err(e) = monitor
            .run_with_signal(async move {
                shutdown_requested(worker_shutdown).await;
                Ok(())
            })
            .await
        {
            tracing::error!(error = %e, "Asset cleanup worker failed");
        }
    });

    let app = router(state);
    let health_app = health::router(infra);

    info!("REST API listening on {}", rest_addr);
    info!("Health check listening on {}", health_addr);
    let rest_listener = TcpListener::bind(rest_addr).await?;
    let health_listener = TcpListener::bind(health_addr).await?;

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let rest = axum::serve(
        rest_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()));
    let health = axum::serve(health_listener, health_app)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()));

    let (rest, health) = tokio::join!(rest, health);
    rest?;
    health?;

    listeners.push(reaper);
    listeners.push(worker);
    for handle in listeners {
        if let Err(e) = handle.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    // The publisher flushes once the last sender is gone.
    match tokio::time::timeout(Duration::from_secs(5), publisher_handle).await {
        Ok(Err(e)) => warn!(error = %e, "event publisher ended abnormally"),
        Err(_) => warn!("event publisher did not flush in time"),
        Ok(Ok(())) => {}
    }

    info!("Server shutdown complete");
    Ok(())
}
