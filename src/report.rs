//! Aggregation and printing of run results.

use std::collections::BTreeMap;
use std::time::Duration;

use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::runner::{OperationResult, Outcome};

/// The aggregate outcome of a run.
///
/// Accumulated incrementally by the scheduler's single aggregating consumer
/// as results arrive, finalized once all workers have completed, and
/// immutable thereafter.
// Manual impl because `DDSketch` does not implement `Debug`.
impl std::fmt::Debug for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunReport")
            .field("successes", &self.successes)
            .field("failures", &self.failures)
            .field("failure_causes", &self.failure_causes)
            .field("latency_count", &self.latency.count())
            .field("bytes_transferred", &self.bytes_transferred)
            .field("total_elapsed", &self.total_elapsed)
            .finish()
    }
}

#[derive(Default)]
pub struct RunReport {
    successes: u64,
    failures: u64,
    failure_causes: BTreeMap<String, u64>,
    latency: DDSketch,
    bytes_transferred: u64,
    total_elapsed: Duration,
}

impl RunReport {
    /// Folds one operation result into the aggregate.
    pub(crate) fn record(&mut self, result: &OperationResult) {
        match &result.outcome {
            Outcome::Success => {
                self.successes += 1;
                self.latency.add(result.elapsed.as_secs_f64());
                self.bytes_transferred += result.bytes;
            }
            Outcome::Failure(cause) => {
                self.failures += 1;
                *self.failure_causes.entry(cause.clone()).or_default() += 1;
            }
        }
    }

    pub(crate) fn finalize(&mut self, total_elapsed: Duration) {
        self.total_elapsed = total_elapsed;
    }

    /// Number of operations that completed successfully.
    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Number of operations that failed.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Failure counts grouped by their cause label.
    pub fn failure_causes(&self) -> &BTreeMap<String, u64> {
        &self.failure_causes
    }

    /// Total number of operations attempted.
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Bytes transferred by successful operations.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Wall-clock time for the whole run.
    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    /// Prints the aggregate to stdout.
    pub fn print(&self) {
        print!(
            "{} ({} ops",
            "## RESULTS".bold(),
            self.total().bold().blue()
        );
        if self.failures > 0 {
            print!(", {}", format!("{} FAILURES", self.failures).bold().red());
        }
        println!(")");

        let seconds = self.total_elapsed.as_secs_f64();
        if seconds > 0.0 {
            print!("  {:.2} operations/s", (self.total() as f64 / seconds).bold());
            if self.bytes_transferred > 0 {
                let throughput = (self.bytes_transferred as f64 / seconds) as u64;
                print!(", {}/s", ByteSize::b(throughput).bold());
            }
            println!();
        }

        if self.latency.count() > 0 {
            let ops = self.latency.count();
            let avg = Duration::from_secs_f64(self.latency.sum().unwrap() / ops as f64);
            let p50 = Duration::from_secs_f64(self.latency.quantile(0.5).unwrap().unwrap());
            let p90 = Duration::from_secs_f64(self.latency.quantile(0.9).unwrap().unwrap());
            let p99 = Duration::from_secs_f64(self.latency.quantile(0.99).unwrap().unwrap());
            println!(
                "  latency avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
                avg.bold()
            );
        }

        for (cause, count) in &self.failure_causes {
            println!("  {} {cause}: {count}", "failure".red());
        }

        println!("  total time: {:.2?}", self.total_elapsed.bold());
    }
}
