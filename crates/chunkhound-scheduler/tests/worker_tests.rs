//! Worker integration tests: the single worker serializes all DB access
//! and keeps searches responsive around indexing work.

use chunkhound_config::ApplicationConfig;
use chunkhound_indexing::{IndexOptions, IndexingCoordinator};
use chunkhound_scheduler::{SchedulerHandle, TaskQueue, Worker};
use chunkhound_storage::{ChunkStore, CheckpointPolicy, RegexSearchRequest};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Rig {
    _dir: TempDir,
    root: std::path::PathBuf,
    handle: SchedulerHandle,
    shutdown: CancellationToken,
    worker: tokio::task::JoinHandle<chunkhound_scheduler::SchedulerResult<()>>,
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn rig() -> Rig {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("repo");
    std::fs::create_dir_all(&root).unwrap();

    let store = ChunkStore::open(&dir.path().join(".cx.db"), CheckpointPolicy::default()).unwrap();
    let config = ApplicationConfig::default();
    let coordinator = IndexingCoordinator::new(None, &config);

    let queue = Arc::new(TaskQueue::new());
    let shutdown = CancellationToken::new();
    let worker = Worker::new(store, coordinator, None, Arc::clone(&queue), shutdown.clone());
    let worker = tokio::spawn(worker.run());

    Rig {
        _dir: dir,
        root,
        handle: SchedulerHandle::new(queue),
        shutdown,
        worker,
    }
}

fn regex(pattern: &str) -> RegexSearchRequest {
    RegexSearchRequest {
        pattern: pattern.to_string(),
        path_filter: None,
        limit: 10,
        offset: 0,
        max_response_bytes: None,
    }
}

#[tokio::test]
async fn index_then_search_through_the_queue() {
    let r = rig();
    write(&r.root, "lib.py", "def through_queue():\n    return 42\n");

    let options = IndexOptions {
        no_embeddings: true,
        ..IndexOptions::default()
    };
    let summary = r
        .handle
        .index_directory(r.root.clone(), options)
        .await
        .unwrap();
    assert_eq!(summary.added, 1);

    let page = r.handle.search_regex(regex("through_queue")).await.unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].symbol, "through_queue");

    r.shutdown.cancel();
    r.worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn searches_stay_responsive_during_indexing() {
    let r = rig();
    // A directory large enough that indexing takes real time
    for i in 0..120 {
        write(
            &r.root,
            &format!("mod_{i}.py"),
            &format!("def fn_{i}():\n    # body {i}\n    return {i}\n"),
        );
    }

    // Kick off indexing without awaiting it
    let token = r.handle.submit_background_scan(
        r.root.clone(),
        IndexOptions {
            no_embeddings: true,
            ..IndexOptions::default()
        },
        None,
    );
    assert!(!token.is_cancelled());

    // Interleave searches; each must return within the SLA even while the
    // scan occupies the worker between dequeues
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            r.handle.search_regex(regex("fn_")),
        )
        .await;
        assert!(result.is_ok(), "search did not return within 2s");
        result.unwrap().unwrap();
    }

    r.shutdown.cancel();
    r.worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn stats_include_queue_state() {
    let r = rig();
    write(&r.root, "s.py", "def s():\n    pass\n");
    r.handle
        .index_directory(
            r.root.clone(),
            IndexOptions {
                no_embeddings: true,
                ..IndexOptions::default()
            },
        )
        .await
        .unwrap();

    let stats = r.handle.get_stats().await.unwrap();
    assert_eq!(stats.files, 1);
    assert!(stats.chunks >= 1);
    assert_eq!(stats.background_scan_state, "idle");

    r.shutdown.cancel();
    r.worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn health_reports_checkpoint_age() {
    let r = rig();
    let health = r.handle.health_check().await.unwrap();
    assert_eq!(health.status, "ok");
    assert!(health.db_connected);
    assert!(health.worker_running);
    assert!(health.last_checkpoint_age_secs < 120.0);

    r.shutdown.cancel();
    r.worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_drops_pending_tasks_and_reports_worker_gone() {
    let r = rig();

    r.shutdown.cancel();
    r.worker.await.unwrap().unwrap();

    // The queue is closed; a post-shutdown search observes WorkerGone
    let result = r.handle.search_regex(regex("anything")).await;
    assert!(matches!(
        result,
        Err(chunkhound_scheduler::SchedulerError::WorkerGone)
    ));
}

#[tokio::test]
async fn semantic_search_without_embeddings_is_a_clean_error() {
    let r = rig();
    let result = r
        .handle
        .search_semantic(chunkhound_scheduler::SemanticQuery {
            query: "sum a list".to_string(),
            provider: None,
            model: None,
            path_filter: None,
            limit: 5,
            offset: 0,
            threshold: None,
            max_response_bytes: None,
        })
        .await;

    assert!(matches!(
        result,
        Err(chunkhound_scheduler::SchedulerError::Embedding(_))
    ));

    r.shutdown.cancel();
    r.worker.await.unwrap().unwrap();
}
