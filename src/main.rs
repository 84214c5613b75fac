use mimalloc::MiMalloc;
use quote_nexus::api::{Remote, build_client};
use quote_nexus::db::LocalStorage;
use quote_nexus::service::{CounterHandle, CounterOps, QuoteDeck, QuoteService, counter_actor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &quote_nexus::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        listen_addr = %cfg.listen_addr,
        listen_port = cfg.listen_port,
        remote_configured = cfg.remote_configured(),
        quotes_table = %cfg.quotes_table,
        stats_table = %cfg.stats_table
    );

    let client = build_client(cfg)?;
    let remote = Remote::from_config(cfg, client)?;
    if remote.is_none() {
        warn!("SUPABASE_URL or SUPABASE_ANON_KEY is empty; running with the local counter only");
    }

    let local = LocalStorage::connect(&cfg.database_url).await?;
    let ops = CounterOps::new(local, remote.clone());
    if let Err(e) = ops.ensure_counter_row().await {
        warn!(error = %e, "failed to initialize remote counter row");
    }

    let quotes = QuoteService::new(remote.as_ref().map(|r| r.store.clone()));
    let deck = QuoteDeck::default();
    deck.reload(&quotes).await;

    let counter = counter_actor::spawn(ops).await?;

    // Build axum router and serve
    let state = quote_nexus::router::NexusState::new(
        counter.clone(),
        quotes,
        deck,
        Arc::from(cfg.admin_key.trim()),
        cfg.insecure_cookie,
        cfg.login_per_minute,
    );
    let app = quote_nexus::router::nexus_router(state);

    let addr = SocketAddr::from((cfg.listen_addr, cfg.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(counter))
    .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. Stopping the counter ends open motivation streams.
async fn shutdown_signal(counter: CounterHandle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
    counter.stop();
}
