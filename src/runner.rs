//! The workload execution engine.
//!
//! [`run`] partitions the configured operation count across a pool of
//! concurrent workers, drives every worker through its share of operations,
//! and aggregates the per-operation results into a [`RunReport`].
//!
//! Workers deliver results over an mpsc channel to a single aggregating
//! consumer, so the report accumulator has exactly one owner and no locks.
//! Individual operation failures are captured into their result and never
//! abort the run; only invalid configuration or a worker that fails to join
//! is fatal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{BoxedStore, StorageError};
use crate::config::{Operation, RunConfig};
use crate::payload::build_payload;
use crate::report::RunReport;

/// Derives the object key for an operation index.
///
/// This is a pure function of the key prefix and the index, and it is the
/// contract that makes key namespaces consistent across runs: a download run
/// with the same `--prefix` and `-n` as an earlier upload run targets
/// exactly the keys that run created.
pub fn object_key(prefix: &str, index: u64) -> String {
    format!("{prefix}/{index:08}")
}

/// The unit of dispatch: one operation index and its derived object key.
#[derive(Debug)]
pub struct WorkItem {
    /// Which of the N operations this is.
    pub index: u64,
    /// The object key the operation targets.
    pub key: String,
}

/// The outcome of a single operation.
#[derive(Debug)]
pub enum Outcome {
    /// The request/response cycle completed successfully.
    Success,
    /// The operation failed with the given cause label.
    Failure(String),
}

/// The result of a single executed operation.
#[derive(Debug)]
pub struct OperationResult {
    /// Which of the N operations this was.
    pub index: u64,
    /// Success or failure with a cause.
    pub outcome: Outcome,
    /// Wall-clock duration of the (final) attempt.
    pub elapsed: Duration,
    /// Bytes that went over the wire: the payload for an upload, the drained
    /// body for a download. Zero for failed operations.
    pub bytes: u64,
}

/// Executes one logical operation against the storage client.
struct OperationExecutor {
    store: BoxedStore,
    operation: Operation,
    /// Shared wire payload for uploads; empty for downloads.
    payload: Bytes,
    gzip: bool,
    retries: u32,
}

impl OperationExecutor {
    /// Runs one operation, converting any storage error into a failed
    /// result. With a retry budget, failed attempts are repeated; the
    /// recorded latency is the final attempt's.
    async fn execute(&self, item: WorkItem) -> OperationResult {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let outcome = self.attempt(&item.key).await;
            let elapsed = start.elapsed();

            match outcome {
                Ok(bytes) => {
                    return OperationResult {
                        index: item.index,
                        outcome: Outcome::Success,
                        elapsed,
                        bytes,
                    };
                }
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    tracing::debug!(index = item.index, %err, attempt, "retrying operation");
                }
                Err(err) => {
                    tracing::debug!(index = item.index, %err, "operation failed");
                    return OperationResult {
                        index: item.index,
                        outcome: Outcome::Failure(err.cause()),
                        elapsed,
                        bytes: 0,
                    };
                }
            }
        }
    }

    async fn attempt(&self, key: &str) -> Result<u64, StorageError> {
        match self.operation {
            Operation::Upload => {
                let encoding = self.gzip.then_some("gzip");
                let bytes = self.payload.len() as u64;
                self.store.put(key, self.payload.clone(), encoding).await?;
                Ok(bytes)
            }
            Operation::Download => {
                let body = self.store.get(key).await?;
                Ok(body.len() as u64)
            }
        }
    }
}

/// The operation indices assigned to one worker.
///
/// Round-robin: worker `i` handles `i, i + T, i + 2T, …`. Every index in
/// `[0, number)` is assigned to exactly one worker, regardless of
/// divisibility, and workers beyond the operation count get no indices.
fn worker_indices(worker: u64, number: u64, threads: u64) -> impl Iterator<Item = u64> {
    (worker..number).step_by(threads as usize)
}

/// Runs the configured workload to completion and returns the aggregate.
///
/// Validates the configuration, builds the shared payload, then spawns one
/// task per worker and blocks until all of them have finished their share.
/// If the configured timeout elapses first, in-flight operations finish but
/// no new ones start, and the partial aggregate is returned.
pub async fn run(config: RunConfig, store: BoxedStore) -> Result<RunReport> {
    let cancel = CancellationToken::new();

    let timer = config.timeout.map(|timeout| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::info!(?timeout, "run timeout reached, stopping workers");
            cancel.cancel();
        })
    });

    let report = run_until_cancelled(config, store, cancel).await;

    if let Some(timer) = timer {
        timer.abort();
    }

    report
}

async fn run_until_cancelled(
    config: RunConfig,
    store: BoxedStore,
    cancel: CancellationToken,
) -> Result<RunReport> {
    config.validate()?;

    let payload = match config.operation {
        Operation::Upload => build_payload(config.size, config.gzip)?,
        Operation::Download => Bytes::new(),
    };

    let executor = Arc::new(OperationExecutor {
        store,
        operation: config.operation,
        payload,
        gzip: config.gzip,
        retries: config.retries,
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<OperationResult>();

    // The single consumer owning the report; workers only hold senders.
    let aggregator = tokio::spawn(async move {
        let mut report = RunReport::default();
        while let Some(result) = rx.recv().await {
            report.record(&result);
        }
        report
    });

    let start = Instant::now();

    let workers: Vec<_> = (0..config.threads)
        .map(|worker| {
            let executor = Arc::clone(&executor);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let prefix = config.prefix.clone();
            let number = config.number;
            let threads = config.threads;

            tokio::spawn(async move {
                for index in worker_indices(worker, number, threads) {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let item = WorkItem {
                        index,
                        key: object_key(&prefix, index),
                    };
                    // Completion gates the next operation; each worker is
                    // internally sequential.
                    let result = executor.execute(item).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
    drop(tx);

    for handle in futures::future::join_all(workers).await {
        handle.context("worker task failed")?;
    }
    let total_elapsed = start.elapsed();

    let mut report = aggregator.await.context("result aggregation failed")?;
    report.finalize(total_elapsed);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::client::ObjectStore;
    use crate::config::ConfigError;

    use super::*;

    /// Records every call and fails operations on the configured keys.
    #[derive(Debug, Default)]
    struct MockStore {
        puts: Mutex<Vec<(String, usize, Option<String>)>>,
        gets: Mutex<Vec<String>>,
        fail_keys: HashSet<String>,
    }

    impl MockStore {
        fn failing_on(keys: impl IntoIterator<Item = String>) -> Self {
            Self {
                fail_keys: keys.into_iter().collect(),
                ..Default::default()
            }
        }

        fn fail(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_keys.contains(key) {
                return Err(StorageError::Service {
                    code: "InternalError".to_owned(),
                    message: "injected failure".to_owned(),
                });
            }
            Ok(())
        }

        fn put_indices(&self) -> Vec<u64> {
            self.puts
                .lock()
                .unwrap()
                .iter()
                .map(|(key, _, _)| key.rsplit('/').next().unwrap().parse().unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn put(
            &self,
            key: &str,
            payload: Bytes,
            content_encoding: Option<&str>,
        ) -> Result<(), StorageError> {
            self.fail(key)?;
            self.puts.lock().unwrap().push((
                key.to_owned(),
                payload.len(),
                content_encoding.map(str::to_owned),
            ));
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
            self.fail(key)?;
            self.gets.lock().unwrap().push(key.to_owned());
            Ok(Bytes::from_static(b"contents"))
        }
    }

    fn upload_config(number: u64, threads: u64) -> RunConfig {
        RunConfig {
            operation: Operation::Upload,
            number,
            threads,
            size: 1024,
            gzip: false,
            bucket: "test-bucket".into(),
            prefix: "s3pt".into(),
            retries: 0,
            timeout: None,
        }
    }

    #[test]
    fn round_robin_partitioning_covers_every_index_once() {
        let shares: Vec<Vec<u64>> = (0..3).map(|w| worker_indices(w, 10, 3).collect()).collect();
        assert_eq!(shares[0], vec![0, 3, 6, 9]);
        assert_eq!(shares[1], vec![1, 4, 7]);
        assert_eq!(shares[2], vec![2, 5, 8]);

        for number in [1u64, 2, 7, 10, 31] {
            for threads in [1u64, 2, 3, 10, 40] {
                let mut all: Vec<u64> = (0..threads)
                    .flat_map(|w| worker_indices(w, number, threads))
                    .collect();
                all.sort_unstable();
                assert_eq!(all, (0..number).collect::<Vec<_>>());
            }
        }
    }

    #[tokio::test]
    async fn dispatches_exactly_n_uploads() {
        let store = Arc::new(MockStore::default());
        let report = run(upload_config(10, 3), store.clone()).await.unwrap();

        assert_eq!(report.successes(), 10);
        assert_eq!(report.failures(), 0);

        let mut indices = store.put_indices();
        indices.sort_unstable();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());

        for (_, size, encoding) in store.puts.lock().unwrap().iter() {
            assert_eq!(*size, 1024);
            assert_eq!(*encoding, None);
        }
    }

    #[tokio::test]
    async fn single_worker_executes_in_index_order() {
        let store = Arc::new(MockStore::default());
        run(upload_config(5, 1), store.clone()).await.unwrap();

        assert_eq!(store.put_indices(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn more_workers_than_operations() {
        let store = Arc::new(MockStore::default());
        let report = run(upload_config(5, 10), store.clone()).await.unwrap();

        assert_eq!(report.total(), 5);
        let mut indices = store.put_indices();
        indices.sort_unstable();
        assert_eq!(indices, (0..5).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn spare_workers_download_one_op_each() {
        let store = Arc::new(MockStore::failing_on([object_key("s3pt", 2)]));
        let mut config = upload_config(5, 10);
        config.operation = Operation::Download;
        let report = run(config, store.clone()).await.unwrap();

        assert_eq!(report.successes(), 4);
        assert_eq!(report.failures(), 5 - report.successes());
        assert_eq!(store.gets.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn uneven_division_still_covers_all_indices() {
        let store = Arc::new(MockStore::default());
        let report = run(upload_config(7, 3), store.clone()).await.unwrap();

        assert_eq!(report.successes() + report.failures(), 7);
        let mut indices = store.put_indices();
        indices.sort_unstable();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn injected_failure_does_not_abort_the_run() {
        let store = Arc::new(MockStore::failing_on([object_key("s3pt", 3)]));
        let report = run(upload_config(10, 3), store.clone()).await.unwrap();

        assert_eq!(report.successes(), 9);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.failure_causes().get("InternalError"), Some(&1));

        let mut indices = store.put_indices();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 4, 5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn retries_recover_nothing_without_budget_but_count_once() {
        let store = Arc::new(MockStore::failing_on([object_key("s3pt", 0)]));
        let mut config = upload_config(1, 1);
        config.retries = 2;
        let report = run(config, store.clone()).await.unwrap();

        // The mock fails deterministically, so all attempts fail and the
        // operation is still counted exactly once.
        assert_eq!(report.failures(), 1);
        assert_eq!(report.total(), 1);
    }

    #[tokio::test]
    async fn gzip_uploads_carry_the_content_encoding() {
        let store = Arc::new(MockStore::default());
        let mut config = upload_config(2, 1);
        config.gzip = true;
        run(config, store.clone()).await.unwrap();

        for (_, size, encoding) in store.puts.lock().unwrap().iter() {
            assert_eq!(encoding.as_deref(), Some("gzip"));
            // Compressed random filler; only the logical size is 1024.
            assert!(*size > 0);
        }
    }

    #[tokio::test]
    async fn downloads_target_the_keys_uploads_created() {
        let store = Arc::new(MockStore::default());
        run(upload_config(3, 2), store.clone()).await.unwrap();

        let mut config = upload_config(3, 2);
        config.operation = Operation::Download;
        let report = run(config, store.clone()).await.unwrap();
        assert_eq!(report.successes(), 3);

        let uploaded: HashSet<String> = store
            .puts
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _, _)| key.clone())
            .collect();
        let downloaded: HashSet<String> = store.gets.lock().unwrap().iter().cloned().collect();
        assert_eq!(uploaded, downloaded);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_operation() {
        let store = Arc::new(MockStore::default());

        let err = run(upload_config(0, 3), store.clone()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidOperationCount)
        ));

        let err = run(upload_config(10, 0), store.clone()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidWorkerCount)
        ));

        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch_and_reports_partial_results() {
        let store = Arc::new(MockStore::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_until_cancelled(upload_config(100, 4), store.clone(), cancel)
            .await
            .unwrap();

        assert_eq!(report.total(), 0);
        assert!(store.puts.lock().unwrap().is_empty());
    }
}
