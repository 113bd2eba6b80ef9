//! Resume, cancellation and daemon-restart tests.
//!
//! These run against a file-backed SQLite database so that a "restart"
//! (dropping every handle and reopening the pool) exercises the same
//! durability path a real daemon restart does.

use std::sync::Arc;
use std::time::Duration;

use rowcast_core::application::export::create;
use rowcast_core::application::{EngineConfig, ExportEngine, ExportOutcome, ExportRecovery};
use rowcast_core::domain::{csv, ExportFilters, ExportJob, ExportStatus};
use rowcast_core::error::AppError;
use rowcast_core::port::clock::SystemClock;
use rowcast_core::port::id_provider::UuidProvider;
use rowcast_core::port::progress_sink::mocks::MemorySink;
use rowcast_core::port::{ChannelSink, ExportJobStore, SinkEvent};
use rowcast_infra_fs::CsvFileSink;
use rowcast_infra_sqlite::{
    create_pool, run_migrations, SqliteExportJobStore, SqliteProductSource,
};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn open_stores(
    db_path: &str,
) -> (SqlitePool, Arc<SqliteExportJobStore>, Arc<SqliteProductSource>) {
    let pool = create_pool(db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteExportJobStore::new(pool.clone(), Arc::new(SystemClock)));
    let source = Arc::new(SqliteProductSource::new(pool.clone()));
    (pool, store, source)
}

async fn seed_products(pool: &SqlitePool, count: i64) {
    for id in 1..=count {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, category, status, price_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("Product {}", id))
        .bind(format!("SKU-{:06}", id))
        .bind("tools")
        .bind("active")
        .bind(100 + id)
        .bind(id * 1000)
        .execute(pool)
        .await
        .unwrap();
    }
}

fn test_engine(
    store: &Arc<SqliteExportJobStore>,
    source: &Arc<SqliteProductSource>,
    chunk_size: u32,
    pacing_delay: Duration,
) -> ExportEngine {
    ExportEngine::new(
        store.clone(),
        source.clone(),
        EngineConfig {
            chunk_size,
            pacing_delay,
        },
    )
}

/// A sink dying mid-stream leaves the job resumable; after a restart the
/// recovery sweep marks it FAILED and a fresh run completes the export
/// from the persisted checkpoint.
#[tokio::test]
async fn test_sink_loss_then_restart_then_resume_completes() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rowcast.db");
    let db_path = db_path.to_str().unwrap();

    // Phase 1: first daemon lifetime, consumer dies on the second chunk
    let job_id = {
        let (pool, store, source) = open_stores(db_path).await;
        seed_products(&pool, 250).await;

        let job = create::execute(
            store.as_ref(),
            source.as_ref(),
            &UuidProvider,
            &SystemClock,
            create::CreateExportRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(job.total_rows, 250);

        // Header is data call 1, chunk one is call 2; chunk two fails
        let sink = Arc::new(MemorySink::failing_from_data(3));
        let engine = test_engine(&store, &source, 100, Duration::ZERO);
        let err = engine.start(job.clone(), sink).join().await.unwrap_err();
        assert!(matches!(err, AppError::Sink(_)));

        let interrupted = store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(interrupted.status, ExportStatus::Processing);
        assert_eq!(interrupted.cursor, 100, "first checkpoint survived");
        assert_eq!(interrupted.rows_exported, 100);

        println!("✅ Phase 1: sink loss left the job PROCESSING at cursor 100");
        job.id.clone()
    };

    // Phase 2: restart, sweep orphans, resume to completion
    {
        let (_pool, store, source) = open_stores(db_path).await;

        let recovery = ExportRecovery::new(store.clone());
        let recovered = recovery.recover_interrupted().await.unwrap();
        assert_eq!(recovered, 1);

        let swept = store.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(swept.status, ExportStatus::Failed);
        assert_eq!(swept.cursor, 100, "sweep never touches the checkpoint");

        let out = dir.path().join("products.csv");
        let sink = Arc::new(CsvFileSink::create(&out).await.unwrap());
        let engine = test_engine(&store, &source, 100, Duration::ZERO);
        let outcome = engine.start(swept, sink).join().await.unwrap();
        assert_eq!(
            outcome,
            ExportOutcome::Completed { rows_exported: 250 }
        );

        // The resumed run produces a fresh file: header plus the rows the
        // first run never delivered.
        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 151, "header + remaining 150 rows");
        assert_eq!(format!("{}\n", lines[0]), csv::header());
        assert!(lines[1].starts_with("101,"), "scan resumed after the cursor");
        assert!(lines[150].starts_with("250,"));

        let finished = store.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(finished.status, ExportStatus::Done);
        assert_eq!(finished.cursor, 250);
        assert_eq!(finished.rows_exported, 250);

        println!("✅ Phase 2: swept to FAILED, resumed, export complete");
    }
}

/// Cooperative cancel parks the job on a chunk boundary; a later run picks
/// up from there and only streams the remaining rows.
#[tokio::test]
async fn test_cancel_then_resume_streams_only_remaining_rows() {
    let (pool, store, source) = open_stores("sqlite::memory:").await;
    seed_products(&pool, 250).await;

    let job = create::execute(
        store.as_ref(),
        source.as_ref(),
        &UuidProvider,
        &SystemClock,
        create::CreateExportRequest::default(),
    )
    .await
    .unwrap();
    let job_id = job.id.clone();

    // Long pacing parks the loop after the first chunk until cancel lands
    let engine = test_engine(&store, &source, 100, Duration::from_secs(60));
    let (channel_sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(channel_sink);
    let handle = engine.start(job, sink.clone());

    assert_eq!(
        rx.recv().await.unwrap(),
        SinkEvent::Data(csv::header().as_bytes().to_vec())
    );
    assert!(matches!(rx.recv().await.unwrap(), SinkEvent::Data(_)));
    assert_eq!(
        rx.recv().await.unwrap(),
        SinkEvent::Progress {
            rows_exported: 100,
            total_rows: 250
        }
    );

    handle.cancel();
    let outcome = handle.join().await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Cancelled { rows_exported: 100 }
    );
    drop(sink);
    assert_eq!(rx.recv().await, None, "no terminal event after cancel");

    let parked = store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(parked.status, ExportStatus::Processing);
    assert_eq!(parked.cursor, 100);
    println!("✅ Cancelled on the chunk boundary, job still resumable");

    // Resume with a fresh consumer and no pacing
    let fast = test_engine(&store, &source, 100, Duration::ZERO);
    let (channel_sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(channel_sink);
    let resumed = store.find_by_id(&job_id).await.unwrap().unwrap();
    let outcome = fast.start(resumed, sink.clone()).join().await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Completed { rows_exported: 250 }
    );
    drop(sink);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let payloads: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::Data(bytes) => Some(String::from_utf8(bytes.clone()).unwrap()),
            _ => None,
        })
        .collect();
    assert_eq!(payloads.len(), 3, "header + two remaining chunks");
    assert_eq!(payloads[0], csv::header());
    assert!(payloads[1].starts_with("101,"));
    assert_eq!(
        events.last(),
        Some(&SinkEvent::Done { rows_exported: 250 })
    );

    let finished = store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(finished.status, ExportStatus::Done);
    assert_eq!(finished.rows_exported, 250);
    println!("✅ Resume streamed header + rows 101..=250 and finished");
}

/// A dataset ending exactly on a chunk boundary needs the extra empty fetch
/// to prove exhaustion, and still lands on DONE.
#[tokio::test]
async fn test_exact_chunk_boundary_completes() {
    let (pool, store, source) = open_stores("sqlite::memory:").await;
    seed_products(&pool, 200).await;

    let job = create::execute(
        store.as_ref(),
        source.as_ref(),
        &UuidProvider,
        &SystemClock,
        create::CreateExportRequest::default(),
    )
    .await
    .unwrap();

    let sink = Arc::new(MemorySink::new());
    let engine = test_engine(&store, &source, 100, Duration::ZERO);
    let outcome = engine.start(job.clone(), sink.clone()).join().await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Completed { rows_exported: 200 }
    );

    assert_eq!(sink.data_payloads().len(), 3, "header + two full chunks");
    assert_eq!(sink.progress_events(), vec![(100, 200), (200, 200)]);

    let finished = store.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, ExportStatus::Done);
    assert_eq!(finished.cursor, 200);
    println!("✅ Exact-boundary dataset completed after the empty fetch");
}

/// Orphaned PROCESSING rows from a hard kill are swept to FAILED on the next
/// startup; PENDING jobs are untouched.
#[tokio::test]
async fn test_recovery_sweep_after_hard_kill() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rowcast.db");
    let db_path = db_path.to_str().unwrap();

    // Phase 1: a run checkpoints one chunk, then the process dies
    let (orphan_id, pending_id) = {
        let (_pool, store, _source) = open_stores(db_path).await;

        let orphan = ExportJob::new_test(ExportFilters::default(), 120);
        store.insert(&orphan).await.unwrap();
        store
            .set_status(&orphan.id, ExportStatus::Processing)
            .await
            .unwrap();
        store
            .advance(&orphan.id, 50, 50, ExportStatus::Processing)
            .await
            .unwrap();

        let pending = ExportJob::new_test(ExportFilters::default(), 10);
        store.insert(&pending).await.unwrap();

        (orphan.id.clone(), pending.id.clone())
    };

    // Phase 2: restart sweeps the orphan, nothing else
    {
        let (_pool, store, _source) = open_stores(db_path).await;

        let recovery = ExportRecovery::new(store.clone());
        assert_eq!(recovery.recover_interrupted().await.unwrap(), 1);

        let swept = store.find_by_id(&orphan_id).await.unwrap().unwrap();
        assert_eq!(swept.status, ExportStatus::Failed);
        assert_eq!(swept.cursor, 50, "resume point preserved");
        assert_eq!(swept.rows_exported, 50);

        let untouched = store.find_by_id(&pending_id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ExportStatus::Pending);
    }
    println!("✅ Recovery sweep marked the orphan FAILED at its checkpoint");
}
