mod api;
mod config;
mod db;
mod error;
mod gitserver;
mod http;
mod indexer;
mod jobs;
mod mirror;
mod mirrorserver;
mod multisync;
mod storage;
mod types;

#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::Config;
use gitserver::GiteaClient;
use indexer::RepoFileIndexer;
use jobs::Jobs;
use mirror::MirrorComponent;
use multisync::{HttpSyncPeer, MultiSyncComponent};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hub_replication=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    std::fs::create_dir_all(&config.storage_path).expect("Failed to create storage directory");
    let db = db::init_database(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);
    tracing::info!("Database initialized at {}", config.database_url);

    let storage = config.storage.build().await;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client");

    let git = Arc::new(GiteaClient::new(
        http.clone(),
        config.git_server.url.clone(),
        config.git_server.token.clone(),
    ));
    let backend = mirrorserver::from_config(http.clone(), &config.mirror);

    let mirrors = Arc::new(MirrorComponent::new(
        db.clone(),
        git.clone(),
        backend,
        storage,
        config.mirror.clone(),
    ));
    let multi_sync = Arc::new(MultiSyncComponent::new(db.clone(), config.multi_sync.clone()));
    let indexer = Arc::new(RepoFileIndexer::new(db.clone(), git));
    let peer = Arc::new(HttpSyncPeer::new(
        http,
        config.multi_sync.endpoint.clone(),
        config.multi_sync.token.clone(),
    ));

    // Background jobs
    let jobs = Arc::new(Jobs::new(
        mirrors.clone(),
        multi_sync.clone(),
        indexer.clone(),
        peer,
        config.index_concurrency,
    ));
    let cancel = CancellationToken::new();
    let sync_interval = config.multi_sync.enabled.then_some(config.multi_sync.interval);
    jobs.spawn(config.mirror.check_interval, sync_interval, cancel.clone());

    let state = Arc::new(AppState {
        mirrors,
        multi_sync,
        indexer,
    });

    let app = api::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("Hub replication service starting on http://{}", config.listen_addr);
    if config.multi_sync.enabled {
        tracing::info!("Pulling from sync peer {}", config.multi_sync.endpoint);
    }

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
            cancel.cancel();
        })
        .await
        .expect("Server error");
}
