use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tessera_core::command_engine::CommandEngine;
use tessera_core::render::RenderSettings;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera_server::admission::AdmissionListener;
use tessera_server::background::session_reaper;
use tessera_server::blob::BlobChannel;
use tessera_server::config::ServerConfig;
use tessera_server::discovery::{Broadcaster, ServerIdentity};
use tessera_server::router::build_app_router;
use tessera_server::service::RenderService;
use tessera_server::state::AppState;

/// How often idle transfer sessions are looked for.
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_server=info,tessera_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid server configuration");
            std::process::exit(1);
        }
    };

    let identity = Arc::new(ServerIdentity::resolve(
        config.advertised_addr,
        config.port,
        &config.static_map,
    ));
    tracing::info!(
        uri = %identity.uri(),
        render_path = %config.render_path.display(),
        secure_nets = config.secure_nets.entries().len(),
        "Loaded server configuration"
    );

    let shutdown = CancellationToken::new();

    let engine = CommandEngine::new(
        config.render_command.clone(),
        RenderSettings {
            width: config.render_width,
            height: config.render_height,
            ..RenderSettings::default()
        },
    );
    let blob = BlobChannel::new(
        config.scratch_dir.clone(),
        config.buffer_size,
        config.session_idle_timeout,
    );
    let service = RenderService::new(
        Box::new(engine),
        blob,
        config.render_path.clone(),
        shutdown.clone(),
    );
    let state = AppState::new(service, shutdown.clone());

    // Fire and forget: the broadcaster only observes the shutdown token.
    Broadcaster::new(
        Arc::clone(&identity),
        config.broadcast_addr.clone(),
        config.client_port,
        config.broadcast_interval,
    )
    .spawn(shutdown.clone());

    let reaper_handle = tokio::spawn(session_reaper::run(
        Arc::clone(&state.service),
        REAPER_INTERVAL,
        shutdown.clone(),
    ));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };
    let listener = AdmissionListener::new(
        listener,
        identity.address(),
        Arc::new(config.secure_nets.clone()),
    );
    tracing::info!(%addr, "Render server listening");

    let app = build_app_router(state.clone(), config.max_chunk_bytes);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    tracing::info!("Server stopped accepting connections, cleaning up");

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    state.service.lock().await.blob_mut().force_close();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
