//! # soc-queue
//!
//! Async background worker queue for case-enrichment jobs (SIEM queries,
//! similarity search, report generation, approval-expiry sweeps).
//!
//! Features:
//! - Generic `Job` trait
//! - Pluggable backend (in-memory, SQLite)
//! - Worker pool with concurrency control
//! - Retry with exponential backoff

pub mod backend;
pub mod job;
pub mod memory;
pub mod worker;

pub use backend::QueueBackend;
pub use job::{Job, JobId, JobResult, JobStatus};
pub use memory::MemoryQueue;
pub use worker::{WorkerConfig, WorkerPool};
