//! Asynchronous usage-counter write-back
//!
//! Resolutions enqueue the alias they served; a single worker task applies the
//! increments against the durable store in enqueue order. Failures are logged
//! and dropped, never retried.

use crate::metrics::MetricsSink;
use crate::store::DurableStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug)]
enum WriteBackJob {
    Increment(String),
    /// Stops the worker; jobs queued behind it are dropped
    Shutdown,
}

/// Counts of jobs seen by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteBackStats {
    pub enqueued: u64,
    pub applied: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the usage write-back worker
pub struct UsageWriteBack {
    tx: mpsc::UnboundedSender<WriteBackJob>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl UsageWriteBack {
    /// Spawn the worker on the current tokio runtime
    pub fn start(store: Arc<dyn DurableStore>, metrics: Arc<dyn MetricsSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(rx, store, metrics, counters.clone()));

        Self {
            tx,
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Queue a usage increment for `alias`. Never blocks.
    pub fn enqueue(&self, alias: &str) {
        match self.tx.send(WriteBackJob::Increment(alias.to_string())) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                debug!(alias = %alias, "Write-back worker stopped, dropping usage increment");
            }
        }
    }

    /// Stop the worker after it has applied every job queued so far.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        // Fails only if the worker already exited, which the join below reports
        let _ = self.tx.send(WriteBackJob::Shutdown);

        if let Err(e) = worker.await {
            error!(error = %e, "Write-back worker terminated abnormally");
        }
    }

    pub fn stats(&self) -> WriteBackStats {
        WriteBackStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<WriteBackJob>,
    store: Arc<dyn DurableStore>,
    metrics: Arc<dyn MetricsSink>,
    counters: Arc<Counters>,
) {
    info!("Usage write-back worker started");

    while let Some(job) = rx.recv().await {
        match job {
            WriteBackJob::Shutdown => break,
            WriteBackJob::Increment(alias) => match store.increment_usage(&alias, 1).await {
                Ok(()) => {
                    counters.applied.fetch_add(1, Ordering::Relaxed);
                    metrics.usage_applied();
                    debug!(alias = %alias, "Applied usage increment");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    metrics.usage_failed();
                    error!(alias = %alias, error = %e, "Failed to update usage count");
                }
            },
        }
    }

    rx.close();
    let mut dropped = 0u64;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    info!(dropped, "Usage write-back worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::metrics::CacheMetrics;
    use crate::store::MemoryStore;
    use crate::types::{CreateOutcome, ResolvedTarget};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::Semaphore;

    /// Records every increment in the order the worker applied it
    #[derive(Default)]
    struct RecordingStore {
        applied: Mutex<Vec<String>>,
        /// Aliases whose increments fail
        failing: Vec<String>,
        /// When set, each increment waits for a permit
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl DurableStore for RecordingStore {
        async fn lookup(&self, _alias: &str) -> Result<Option<ResolvedTarget>, StoreError> {
            Ok(None)
        }

        async fn create(
            &self,
            _alias: &str,
            _target: &str,
            _expires_at: Option<DateTime<Utc>>,
        ) -> Result<CreateOutcome, StoreError> {
            Ok(CreateOutcome::Created(Utc::now()))
        }

        async fn delete(&self, _alias: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn increment_usage(&self, alias: &str, _count: i64) -> Result<(), StoreError> {
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?
                    .forget();
            }
            if self.failing.iter().any(|a| a == alias) {
                return Err(StoreError::Unavailable("database is locked".to_string()));
            }
            self.applied.lock().push(alias.to_string());
            Ok(())
        }

        async fn count(&self) -> Result<i64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_increments_reach_store() {
        let store = Arc::new(MemoryStore::new());
        store.create("x", "http://example.com", None).await.unwrap();
        let metrics = Arc::new(CacheMetrics::new());

        let pipeline = UsageWriteBack::start(store.clone(), metrics.clone());
        pipeline.enqueue("x");
        pipeline.enqueue("x");
        pipeline.enqueue("x");
        pipeline.shutdown().await;

        // Rows start at 1
        assert_eq!(store.usage("x").await, Some(4));
        assert_eq!(
            pipeline.stats(),
            WriteBackStats {
                enqueued: 3,
                applied: 3,
                failed: 0
            }
        );
        assert_eq!(metrics.snapshot().usage_applied, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_producer_order_is_preserved() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = Arc::new(UsageWriteBack::start(
            store.clone(),
            Arc::new(CacheMetrics::new()),
        ));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        pipeline.enqueue(&format!("p{}-{:03}", p, i));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        pipeline.enqueue("x");
        pipeline.enqueue("x");
        pipeline.enqueue("x");
        pipeline.shutdown().await;

        let applied = store.applied.lock().clone();
        assert_eq!(applied.len(), 203);
        assert_eq!(applied.iter().filter(|a| *a == "x").count(), 3);

        for p in 0..4 {
            let prefix = format!("p{}-", p);
            let seen: Vec<_> = applied.iter().filter(|a| a.starts_with(&prefix)).collect();
            let mut sorted = seen.clone();
            sorted.sort();
            assert_eq!(seen, sorted, "producer {} applied out of order", p);
            assert_eq!(seen.len(), 50);
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_jobs() {
        let store = Arc::new(RecordingStore {
            failing: vec!["bad".to_string()],
            ..Default::default()
        });
        let metrics = Arc::new(CacheMetrics::new());
        let pipeline = UsageWriteBack::start(store.clone(), metrics.clone());

        pipeline.enqueue("good");
        pipeline.enqueue("bad");
        pipeline.enqueue("good");
        pipeline.shutdown().await;

        assert_eq!(*store.applied.lock(), vec!["good", "good"]);
        let stats = pipeline.stats();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(metrics.snapshot().usage_failed, 1);
    }

    #[tokio::test]
    async fn test_enqueue_does_not_wait_for_store() {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(RecordingStore {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let pipeline = UsageWriteBack::start(store.clone(), Arc::new(CacheMetrics::new()));

        for i in 0..100 {
            pipeline.enqueue(&format!("a{}", i));
        }
        assert_eq!(pipeline.stats().enqueued, 100);
        assert!(store.applied.lock().is_empty());

        gate.add_permits(100);
        pipeline.shutdown().await;
        assert_eq!(store.applied.lock().len(), 100);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = UsageWriteBack::start(store.clone(), Arc::new(CacheMetrics::new()));

        pipeline.enqueue("before");
        pipeline.shutdown().await;
        pipeline.enqueue("after");
        pipeline.shutdown().await;

        assert_eq!(*store.applied.lock(), vec!["before"]);
        assert_eq!(pipeline.stats().enqueued, 1);
    }
}
