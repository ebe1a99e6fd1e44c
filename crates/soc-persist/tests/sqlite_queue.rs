use serde_json::json;
use soc_persist::SqliteQueueBackend;
use soc_queue::QueueBackend;
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::test]
async fn sqlite_queue_dequeues_a_job_enqueued_to_run_now() -> Result<(), Box<dyn std::error::Error>> {
    let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await?;

    sqlx::query(
        r#"
        CREATE TABLE jobs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            run_at DATETIME NOT NULL,
            locked_at DATETIME,
            locked_by TEXT,
            retries INTEGER DEFAULT 0,
            last_error TEXT,
            result TEXT,
            priority INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(&pool)
    .await?;

    let backend = SqliteQueueBackend::new(pool);
    let tenant_id = "test-tenant";
    let payload = json!({"test": "data"});

    let job_id = backend.enqueue(tenant_id, "test_job", payload, None).await?;

    let job = backend.dequeue().await?;
    assert!(job.is_some(), "job should have been dequeued immediately");
    let job = job.unwrap();
    assert_eq!(job.id, job_id);

    Ok(())
}
