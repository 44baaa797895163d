use std::process::ExitCode;
use std::sync::Arc;

use tessera_core::command_engine::CommandEngine;
use tessera_core::render::RenderSettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera_client::config::ClientConfig;
use tessera_client::discovery;
use tessera_client::endpoint::{LocalEndpoint, RemoteEndpoint, SceneSpec};
use tessera_client::pool::{PoolStatus, WorkerPool};
use tessera_client::rpc::RenderClient;
use tessera_client::stats::{self, StatsSummary};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_client=info,tessera_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid client configuration");
            return ExitCode::FAILURE;
        }
    };
    let jobs = match config.jobs() {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "Cannot build job list");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        scene_file = %config.scene_file.display(),
        scene = %config.scene_name,
        mode = ?config.mode,
        jobs = jobs.len(),
        "Loaded client configuration"
    );

    let servers = collect_servers(&config).await;

    let http = match reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            tracing::error!(error = %e, "Cannot build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let spec = Arc::new(SceneSpec {
        scene_file: config.scene_file.clone(),
        scene_name: config.scene_name.clone(),
        image_format: config.image_format,
        output_dir: config.output_dir.clone(),
        chunk_size: config.buffer_size,
    });

    let (sink, mut records) = stats::channel();
    let mut pool = WorkerPool::new(jobs);

    for client in responsive_servers(&http, servers).await {
        pool.spawn_worker(Box::new(RemoteEndpoint::new(client, Arc::clone(&spec))), sink.clone());
    }
    if config.local_worker {
        let engine = CommandEngine::new(config.render_command.clone(), RenderSettings::default());
        pool.spawn_worker(
            Box::new(LocalEndpoint::new("localhost", Box::new(engine), Arc::clone(&spec))),
            sink.clone(),
        );
    }
    drop(sink);

    if pool.workers().is_empty() {
        tracing::error!("No render endpoints available");
        return ExitCode::FAILURE;
    }

    let status = tokio::select! {
        status = pool.wait(config.poll_interval) => status,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping workers");
            pool.request_stop();
            pool.wait(config.poll_interval).await
        }
    };

    for health in pool.endpoint_health() {
        tracing::info!(
            endpoint = %health.endpoint,
            failed = health.failed,
            "Endpoint health"
        );
    }
    let counts = pool.counts();
    pool.shutdown().await;

    StatsSummary::from_records(&records.drain()).log();

    match status {
        PoolStatus::Completed => {
            tracing::info!(acknowledged = counts.acknowledged, "All jobs rendered");
            ExitCode::SUCCESS
        }
        _ => {
            tracing::error!(
                pending = counts.pending(),
                "Render stalled: no live worker left for the remaining jobs"
            );
            ExitCode::FAILURE
        }
    }
}

/// Statically configured servers plus any that announce themselves during
/// the discovery window, without duplicates.
async fn collect_servers(config: &ClientConfig) -> Vec<String> {
    let mut servers = config.servers.clone();

    if !config.discovery_window.is_zero() {
        match discovery::discover(config.client_port, config.discovery_window).await {
            Ok(found) => {
                for uri in found {
                    if !servers.contains(&uri) {
                        servers.push(uri);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(port = config.client_port, error = %e, "Discovery unavailable");
            }
        }
    }

    servers
}

/// Ping every server concurrently and keep the ones that answer.
async fn responsive_servers(http: &reqwest::Client, servers: Vec<String>) -> Vec<RenderClient> {
    let clients: Vec<RenderClient> = servers
        .into_iter()
        .map(|uri| RenderClient::with_client(http.clone(), uri))
        .collect();

    let replies = futures::future::join_all(clients.iter().map(RenderClient::ping)).await;

    clients
        .into_iter()
        .zip(replies)
        .filter_map(|(client, reply)| match reply {
            Ok(_) => {
                tracing::info!(server = %client.base_url(), "Render server is alive");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(server = %client.base_url(), error = %e, "Skipping unresponsive server");
                None
            }
        })
        .collect()
}
