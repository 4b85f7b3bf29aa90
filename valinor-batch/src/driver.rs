//! # Batch driver
//!
//! Fans a [`TileOperation`] out over a fixed pool of OS threads.
//! Workers race to drain a shared [`TileQueue`], each with its own storage handle,
//! so there is no ordering between tiles.

use crate::operation::{Accumulate, TileOperation};
use crate::{TileErrorKind, TileOperationError, TileQueue};
use serde::Serialize;
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use valinor_graphtile::GraphId;

/// The number of worker threads in a batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkerCount(NonZeroUsize);

impl WorkerCount {
    /// Returns `None` for zero.
    pub const fn new(count: usize) -> Option<Self> {
        match NonZeroUsize::new(count) {
            Some(count) => Some(Self(count)),
            None => None,
        }
    }

    /// Uses `requested` if it is set and nonzero, falling back to the hardware default.
    pub fn or_default(requested: Option<usize>) -> Self {
        requested.and_then(Self::new).unwrap_or_default()
    }

    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for WorkerCount {
    /// One worker per available hardware thread.
    fn default() -> Self {
        Self(thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }
}

impl From<NonZeroUsize> for WorkerCount {
    fn from(value: NonZeroUsize) -> Self {
        Self(value)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// Not started yet.
    Idle,
    /// Workers are active.
    Running,
    /// Every worker has been joined.
    Done,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("This batch has already been run")]
    AlreadyStarted,
    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: String, message: String },
    #[error("Unable to spawn a worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A tile that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileFailure {
    pub graph_id: GraphId,
    pub kind: TileErrorKind,
    pub message: String,
}

/// The outcome of a batch run.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// The sum of the outputs of every successfully processed tile.
    pub output: T,
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed tiles, in no particular order.
    pub failures: Vec<TileFailure>,
    pub elapsed: Duration,
}

impl<T> BatchReport<T> {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// What a single worker did.
struct WorkerTally<T> {
    output: T,
    attempted: usize,
    succeeded: usize,
    failures: Vec<TileFailure>,
}

impl<T: Default> Default for WorkerTally<T> {
    fn default() -> Self {
        Self {
            output: T::default(),
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }
}

/// Runs one operation over a queue of tiles.
///
/// A driver runs exactly once.
#[derive(Debug)]
pub struct BatchDriver {
    workers: WorkerCount,
    state: DriverState,
}

impl BatchDriver {
    pub fn new(workers: WorkerCount) -> Self {
        Self {
            workers,
            state: DriverState::Idle,
        }
    }

    pub fn workers(&self) -> WorkerCount {
        self.workers
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Processes every tile in the queue, returning once all workers have exited.
    ///
    /// Each worker calls `make_provider` once, and uses the result for every tile it processes.
    /// Per-tile failures are logged and collected in the report; they never stop the batch.
    /// A panic while processing a tile counts as a failure of that tile.
    ///
    /// # Errors
    ///
    /// - [`BatchError::AlreadyStarted`] if this driver was run before.
    /// - [`BatchError::Spawn`] if a thread could not be started.
    ///   Any workers which did start still drain the queue first.
    /// - [`BatchError::WorkerPanicked`] if a worker panicked outside of a tile,
    ///   for example in `make_provider`. The other workers finish normally,
    ///   but the results of the panicked one are lost.
    pub fn run<P, O, F>(
        &mut self,
        queue: TileQueue,
        make_provider: F,
        operation: &O,
    ) -> Result<BatchReport<O::Output>, BatchError>
    where
        O: TileOperation<P>,
        F: Fn() -> P + Sync,
    {
        if self.state != DriverState::Idle {
            return Err(BatchError::AlreadyStarted);
        }
        self.state = DriverState::Running;

        info!(
            operation = operation.name(),
            tiles = queue.len(),
            workers = self.workers.get(),
            "Starting batch"
        );
        let start = Instant::now();

        let queue = &queue;
        let make_provider = &make_provider;
        let (tallies, spawn_error) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers.get());
            let mut spawn_error = None;
            for worker_index in 0..self.workers.get() {
                let spawned = thread::Builder::new()
                    .name(format!("tile-worker-{worker_index}"))
                    .spawn_scoped(scope, move || {
                        let provider = make_provider();
                        drain_queue(queue, &provider, operation)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!(worker_index, "Unable to spawn worker: {e}");
                        spawn_error = Some(e);
                        break;
                    }
                }
            }

            let tallies: Vec<_> = handles
                .into_iter()
                .map(|handle| {
                    let worker = handle.thread().name().unwrap_or("tile-worker").to_string();
                    handle.join().map_err(|payload| BatchError::WorkerPanicked {
                        worker,
                        message: panic_message(payload.as_ref()),
                    })
                })
                .collect();
            (tallies, spawn_error)
        });
        self.state = DriverState::Done;

        if let Some(e) = spawn_error {
            return Err(BatchError::Spawn(e));
        }

        let mut report = BatchReport {
            output: O::Output::default(),
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        };
        for tally in tallies {
            let tally = tally?;
            report.output.absorb(tally.output);
            report.attempted += tally.attempted;
            report.succeeded += tally.succeeded;
            report.failures.extend(tally.failures);
        }
        report.elapsed = start.elapsed();

        info!(
            operation = operation.name(),
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            elapsed = ?report.elapsed,
            "Batch finished"
        );
        Ok(report)
    }
}

fn drain_queue<P, O: TileOperation<P>>(
    queue: &TileQueue,
    provider: &P,
    operation: &O,
) -> WorkerTally<O::Output> {
    let mut tally = WorkerTally::<O::Output>::default();
    while let Some(graph_id) = queue.pop() {
        tally.attempted += 1;
        let result = panic::catch_unwind(AssertUnwindSafe(|| operation.process(provider, graph_id)))
            .unwrap_or_else(|payload| {
                Err(TileOperationError::Panicked(panic_message(payload.as_ref())))
            });
        match result {
            Ok(output) => {
                tally.output.absorb(output);
                tally.succeeded += 1;
            }
            Err(e) => {
                let kind = e.kind();
                warn!(tile = %graph_id, kind = ?kind, operation = operation.name(), "{e}");
                tally.failures.push(TileFailure {
                    graph_id,
                    kind,
                    message: e.to_string(),
                });
            }
        }
    }
    tally
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
