//! Fixed-size worker pool fed by per-worker pending-connection queues.
//!
//! - [`queue`] - [`queue::PendingQueue`], the FIFO of accepted connections
//!   owned by one worker.
//! - [`worker`] - The long-lived task draining one queue.
//! - [`manager`] - [`manager::WorkerPool`], which spawns the workers, places
//!   connections in the shortest queue and joins everything on shutdown.

pub mod manager;
pub mod queue;
pub mod worker;
