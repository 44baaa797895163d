//! Client workers against real render servers.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{spawn_server, LabelEngine};
use assert_matches::assert_matches;
use tessera_client::endpoint::{RemoteEndpoint, RenderEndpoint, SceneSpec};
use tessera_client::pool::{PoolStatus, WorkerPool};
use tessera_client::rpc::RenderClient;
use tessera_client::stats::{self, StatsSummary};
use tessera_core::error::CoreError;
use tessera_core::protocol::RenderFrameRequest;
use tessera_core::types::{ImageFormat, Job};

fn scene_spec(dir: &Path) -> Arc<SceneSpec> {
    let scene_file = dir.join("scene.blend");
    std::fs::write(&scene_file, vec![42u8; 100]).unwrap();
    Arc::new(SceneSpec {
        scene_file,
        scene_name: "Scene".to_string(),
        image_format: ImageFormat::Png,
        output_dir: dir.join("out"),
        chunk_size: 7,
    })
}

async fn wait(pool: &WorkerPool) -> PoolStatus {
    tokio::time::timeout(Duration::from_secs(10), pool.wait(Duration::from_millis(10)))
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: a single remote worker renders and downloads every frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_worker_renders_all_frames() {
    let server = spawn_server(LabelEngine::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let spec = scene_spec(dir.path());

    let mut pool = WorkerPool::new((1..=3).map(Job::frame));
    let (sink, mut records) = stats::channel();
    pool.spawn_worker(
        Box::new(RemoteEndpoint::new(RenderClient::new(&server.url), Arc::clone(&spec))),
        sink,
    );

    assert_eq!(wait(&pool).await, PoolStatus::Completed);

    for frame in 1..=3 {
        let path = spec.output_dir.join(format!("frame_{frame:04}.png"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.ends_with("64x64"), "{body}");
    }
    let summary = StatsSummary::from_records(&records.drain());
    assert_eq!(summary.succeeded(), 3);
    assert_eq!(summary.failed(), 0);
}

// ---------------------------------------------------------------------------
// Test: still tiles come back at tile resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_worker_renders_tiles() {
    let server = spawn_server(LabelEngine::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let spec = scene_spec(dir.path());

    let mut pool = WorkerPool::new((0..4).map(|i| Job::part(i, 2)));
    let (sink, _records) = stats::channel();
    pool.spawn_worker(
        Box::new(RemoteEndpoint::new(RenderClient::new(&server.url), Arc::clone(&spec))),
        sink,
    );

    assert_eq!(wait(&pool).await, PoolStatus::Completed);

    for index in 0..4 {
        let path = spec.output_dir.join(format!("part_{index:03}_0001.png"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.ends_with("32x32"), "{body}");
    }
}

// ---------------------------------------------------------------------------
// Test: a failing server's job is picked up by the healthy one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_moves_to_healthy_server() {
    let broken = spawn_server(LabelEngine::new().failing_on(1..=4)).await;
    let healthy = spawn_server(LabelEngine::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let spec = scene_spec(dir.path());

    let mut pool = WorkerPool::new((1..=4).map(Job::frame));
    let (sink, mut records) = stats::channel();
    pool.spawn_worker(
        Box::new(RemoteEndpoint::new(RenderClient::new(&broken.url), Arc::clone(&spec))),
        sink.clone(),
    );
    pool.spawn_worker(
        Box::new(RemoteEndpoint::new(RenderClient::new(&healthy.url), Arc::clone(&spec))),
        sink,
    );

    assert_eq!(wait(&pool).await, PoolStatus::Completed);

    let records = records.drain();
    let summary = StatsSummary::from_records(&records);
    assert_eq!(summary.endpoints[&healthy.url].succeeded, 4);
    assert!(summary.endpoints.get(&broken.url).map_or(0, |e| e.failed) <= 1);

    let health = pool.endpoint_health();
    assert!(health.iter().all(|h| !h.alive));
    for frame in 1..=4 {
        assert!(spec.output_dir.join(format!("frame_{frame:04}.png")).exists());
    }
}

// ---------------------------------------------------------------------------
// Test: an unreachable server stalls the pool when it is the only worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_only_server_stalls() {
    let server = spawn_server(LabelEngine::new()).await;
    let url = server.url.clone();
    drop(server);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let dir = tempfile::tempdir().unwrap();
    let spec = scene_spec(dir.path());
    let mut pool = WorkerPool::new([Job::frame(1), Job::frame(2)]);
    let (sink, mut records) = stats::channel();
    pool.spawn_worker(Box::new(RemoteEndpoint::new(RenderClient::new(url), spec)), sink);

    assert_eq!(wait(&pool).await, PoolStatus::Stalled);
    assert_eq!(pool.queue().snapshot(), vec![Job::frame(2), Job::frame(1)]);
    let records = records.drain();
    assert_eq!(records.len(), 1);
    assert!(records[0].failed);
}

// ---------------------------------------------------------------------------
// Test: a render interleaved by another caller is not downloaded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interleaved_render_is_not_taken_as_own_result() {
    let server = spawn_server(LabelEngine::new().with_delay(Duration::from_millis(300))).await;
    let dir = tempfile::tempdir().unwrap();
    let spec = scene_spec(dir.path());

    let mut endpoint = RemoteEndpoint::new(RenderClient::new(&server.url), Arc::clone(&spec));
    endpoint.render(&Job::frame(0)).await.unwrap();

    let first = tokio::spawn(async move { endpoint.render(&Job::frame(1)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Queued on the service lock behind frame 1, ahead of its get_result.
    let other = RenderClient::new(&server.url);
    other
        .render_frame(&RenderFrameRequest {
            scene: "Scene".to_string(),
            frame: 2,
            image_format: ImageFormat::Png,
        })
        .await
        .unwrap();

    let result = first.await.unwrap();
    assert_matches!(result, Err(CoreError::Transport(_)));
    assert!(!spec.output_dir.join("frame_0001.png").exists());
    assert!(!spec.output_dir.join("frame_0002.png").exists());
}
