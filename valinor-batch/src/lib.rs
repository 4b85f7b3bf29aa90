//! # Tile batches
//!
//! Runs an operation over every tile in a set, in parallel.
//!
//! A [`BatchDriver`] owns a fixed pool of worker threads which drain a shared [`TileQueue`].
//! Each worker builds its own storage handle, so nothing but the queue is shared.
//! A failing tile is logged and reported, and never stops the rest of the batch.
//!
//! The operations in [`ops`] cover predicted traffic removal, statistics and attribute export.

mod config;
mod driver;
mod error;
pub mod operation;
pub mod ops;
mod queue;

pub use config::{BatchConfig, ConfigError};
pub use driver::{BatchDriver, BatchError, BatchReport, DriverState, TileFailure, WorkerCount};
pub use error::{TileErrorKind, TileOperationError};
pub use operation::{Accumulate, TileOperation};
pub use queue::TileQueue;
