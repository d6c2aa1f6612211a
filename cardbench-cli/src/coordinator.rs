//! Parallel Benchmark Coordinator
//!
//! Spreads a pre-generated query set over worker threads and merges their
//! statistics back into the driver's own estimators.
//!
//! Every worker builds its own table, oracle and estimators through a
//! [`WorkerFactory`], so no state is shared between workers. The driver and
//! workers talk only through channels:
//!
//! ```text
//! driver ── Run { index, query } ──► worker i mod k
//!        ── CollectStats ─────────► every worker
//!        ◄─ Ready / Stats / Failure ─
//! ```
//!
//! Failure policy is fail-fast without retry: a worker that cannot build its
//! estimators, fails or panics on a query, or stays silent for longer than the
//! worker timeout aborts the whole batch.

use crate::runner::{EstimatorFactory, EstimatorRunner, RunError};
use cardbench_core::{EstimatorStats, Query};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a parallel batch
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {worker} failed: {message}")]
    WorkerFailed { worker: usize, message: String },

    #[error("Timeout waiting for {waiting_for} after {timeout:?}")]
    Timeout {
        waiting_for: &'static str,
        timeout: Duration,
    },

    #[error("All workers disconnected while waiting for {0}")]
    Disconnected(&'static str),

    #[error("Worker protocol error: expected {expected}, got {got}")]
    Protocol { expected: &'static str, got: String },

    #[error("Worker {worker} reports estimators {got:?}, driver has {expected:?}")]
    EstimatorMismatch {
        worker: usize,
        expected: Vec<String>,
        got: Vec<String>,
    },
}

/// Builds one participant's private table, oracle and estimators
pub trait WorkerFactory: Send + Sync + 'static {
    /// Build a fresh runner
    fn build(&self) -> anyhow::Result<EstimatorRunner>;
}

impl WorkerFactory for EstimatorFactory {
    fn build(&self) -> anyhow::Result<EstimatorRunner> {
        self.build_runner()
    }
}

impl<F> WorkerFactory for F
where
    F: Fn() -> anyhow::Result<EstimatorRunner> + Send + Sync + 'static,
{
    fn build(&self) -> anyhow::Result<EstimatorRunner> {
        self()
    }
}

/// Driver-to-worker messages
#[derive(Debug)]
enum WorkerCommand {
    Run {
        index: usize,
        query: Query,
        oracle_card: Option<u64>,
    },
    CollectStats,
    Shutdown,
}

/// Worker-to-driver messages
#[derive(Debug)]
enum WorkerReply {
    Ready {
        worker: usize,
    },
    Stats {
        worker: usize,
        stats: Vec<(String, EstimatorStats)>,
    },
    Failure {
        worker: usize,
        message: String,
    },
}

impl WorkerReply {
    fn kind(&self) -> &'static str {
        match self {
            WorkerReply::Ready { .. } => "Ready",
            WorkerReply::Stats { .. } => "Stats",
            WorkerReply::Failure { .. } => "Failure",
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn worker_main<F: WorkerFactory>(
    worker: usize,
    factory: Arc<F>,
    commands: Receiver<WorkerCommand>,
    replies: Sender<WorkerReply>,
) {
    let fail = |message: String| {
        let _ = replies.send(WorkerReply::Failure { worker, message });
    };

    let mut runner = match catch_unwind(AssertUnwindSafe(|| factory.build())) {
        Ok(Ok(runner)) => runner,
        Ok(Err(e)) => return fail(format!("{:#}", e)),
        Err(panic) => return fail(panic_message(panic)),
    };
    debug!("Worker {} ready with {:?}", worker, runner.estimator_names());
    if replies.send(WorkerReply::Ready { worker }).is_err() {
        return;
    }

    // Ends when the driver drops its sender.
    for command in commands {
        match command {
            WorkerCommand::Run {
                index,
                query,
                oracle_card,
            } => match catch_unwind(AssertUnwindSafe(|| runner.query(&query, oracle_card))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return fail(format!("query {}: {}", index, e)),
                Err(panic) => return fail(format!("query {}: {}", index, panic_message(panic))),
            },
            WorkerCommand::CollectStats => {
                let stats = runner.stats_snapshot();
                if replies.send(WorkerReply::Stats { worker, stats }).is_err() {
                    return;
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }
    debug!("Worker {} exiting", worker);
}

/// Handles to running workers; dropping the pool releases every worker.
struct WorkerPool {
    senders: Vec<Sender<WorkerCommand>>,
    handles: Vec<JoinHandle<()>>,
    replies: Receiver<WorkerReply>,
    timeout: Duration,
}

impl WorkerPool {
    fn spawn<F: WorkerFactory>(
        factory: &Arc<F>,
        count: usize,
        timeout: Duration,
    ) -> Result<Self, CoordinatorError> {
        let (reply_tx, replies) = mpsc::channel();
        let mut pool = Self {
            senders: Vec::with_capacity(count),
            handles: Vec::with_capacity(count),
            replies,
            timeout,
        };
        for worker in 0..count {
            let (command_tx, command_rx) = mpsc::channel();
            let factory = Arc::clone(factory);
            let reply_tx = reply_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("cardbench-worker-{}", worker))
                .spawn(move || worker_main(worker, factory, command_rx, reply_tx))
                .map_err(|source| CoordinatorError::Spawn { worker, source })?;
            pool.senders.push(command_tx);
            pool.handles.push(handle);
        }
        Ok(pool)
    }

    fn recv(&self, waiting_for: &'static str) -> Result<WorkerReply, CoordinatorError> {
        match self.replies.recv_timeout(self.timeout) {
            Ok(WorkerReply::Failure { worker, message }) => {
                Err(CoordinatorError::WorkerFailed { worker, message })
            }
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(CoordinatorError::Timeout {
                waiting_for,
                timeout: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CoordinatorError::Disconnected(waiting_for))
            }
        }
    }

    fn wait_ready(&self) -> Result<(), CoordinatorError> {
        for _ in 0..self.senders.len() {
            match self.recv("worker startup")? {
                WorkerReply::Ready { worker } => debug!("Worker {} is ready", worker),
                other => {
                    return Err(CoordinatorError::Protocol {
                        expected: "Ready",
                        got: other.kind().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn send(&self, worker: usize, command: WorkerCommand) -> Result<(), CoordinatorError> {
        if self.senders[worker].send(command).is_ok() {
            return Ok(());
        }
        // The worker is gone; it normally left a failure behind.
        match self.replies.try_recv() {
            Ok(WorkerReply::Failure { worker, message }) => {
                Err(CoordinatorError::WorkerFailed { worker, message })
            }
            _ => Err(CoordinatorError::WorkerFailed {
                worker,
                message: "worker exited unexpectedly".to_string(),
            }),
        }
    }

    fn collect_stats(&self) -> Result<Vec<Vec<(String, EstimatorStats)>>, CoordinatorError> {
        for worker in 0..self.senders.len() {
            self.send(worker, WorkerCommand::CollectStats)?;
        }
        let mut collected: Vec<Option<Vec<(String, EstimatorStats)>>> =
            (0..self.senders.len()).map(|_| None).collect();
        for _ in 0..self.senders.len() {
            match self.recv("worker statistics")? {
                WorkerReply::Stats { worker, stats } => collected[worker] = Some(stats),
                other => {
                    return Err(CoordinatorError::Protocol {
                        expected: "Stats",
                        got: other.kind().to_string(),
                    });
                }
            }
        }
        collected
            .into_iter()
            .enumerate()
            .map(|(worker, stats)| {
                stats.ok_or(CoordinatorError::WorkerFailed {
                    worker,
                    message: "no statistics reported".to_string(),
                })
            })
            .collect()
    }

}

impl Drop for WorkerPool {
    /// Asks every worker to stop, then joins those that exit within the
    /// worker timeout. A worker still busy after that is detached.
    fn drop(&mut self) {
        for sender in &self.senders {
            let _ = sender.send(WorkerCommand::Shutdown);
        }
        self.senders.clear();
        let deadline = Instant::now() + self.timeout;
        for (worker, handle) in self.handles.drain(..).enumerate() {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if !handle.is_finished() {
                warn!("Worker {} did not stop within {:?}, detaching", worker, self.timeout);
                continue;
            }
            if handle.join().is_err() {
                warn!("Worker {} panicked during shutdown", worker);
            }
        }
    }
}

/// Fans a query set out over `parallelism` workers
#[derive(Debug, Clone, Copy)]
pub struct Coordinator {
    parallelism: usize,
    timeout: Duration,
}

impl Coordinator {
    /// Create a coordinator. `timeout` bounds every single wait for a worker reply.
    pub fn new(parallelism: usize, timeout: Duration) -> Self {
        Self {
            parallelism: parallelism.max(1),
            timeout,
        }
    }

    /// Number of workers spawned per batch
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run `queries` on the workers and merge their statistics into `driver`.
    ///
    /// Query `i` goes to worker `i % parallelism`, with `oracle_cards[i]` as its
    /// true cardinality when given. Statistics are appended worker by worker in
    /// worker-index order, each in dispatch order.
    pub fn run_n_parallel<F: WorkerFactory>(
        &self,
        driver: &mut EstimatorRunner,
        factory: Arc<F>,
        queries: &[Query],
        oracle_cards: Option<&[u64]>,
    ) -> Result<(), CoordinatorError> {
        let start = Instant::now();
        info!(
            "Spawning {} workers for {} queries",
            self.parallelism,
            queries.len()
        );
        let pool = WorkerPool::spawn(&factory, self.parallelism, self.timeout)?;
        pool.wait_ready()?;

        for (index, query) in queries.iter().enumerate() {
            let oracle_card = oracle_cards.and_then(|cards| cards.get(index).copied());
            pool.send(
                index % self.parallelism,
                WorkerCommand::Run {
                    index,
                    query: query.clone(),
                    oracle_card,
                },
            )?;
        }

        let per_worker = pool.collect_stats()?;
        drop(pool);

        for (worker, stats) in per_worker.into_iter().enumerate() {
            driver.merge_stats(stats).map_err(|e| match e {
                RunError::EstimatorMismatch { expected, got } => {
                    CoordinatorError::EstimatorMismatch {
                        worker,
                        expected,
                        got,
                    }
                }
                other => CoordinatorError::WorkerFailed {
                    worker,
                    message: other.to_string(),
                },
            })?;
        }

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Merged {} workers: {} queries in {:.2}s ({:.1} queries/sec)",
            self.parallelism,
            queries.len(),
            elapsed,
            queries.len() as f64 / elapsed.max(f64::EPSILON)
        );
        Ok(())
    }
}
