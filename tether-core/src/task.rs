//! Task spawning seam for single-threaded runtimes.
//!
//! The engine executes inbound calls on spawned tasks so that a stubbed
//! method may itself await calls back to the caller without blocking frame
//! processing. The trait is object-safe (boxed futures) so the socket can
//! hold it without a type parameter.

use std::future::Future;
use std::pin::Pin;

/// Spawns engine-internal tasks onto the current-thread executor.
pub trait TaskProvider {
    /// Spawn a named task that runs on the current thread.
    fn spawn_task(&self, name: &'static str, future: Pin<Box<dyn Future<Output = ()>>>);
}

/// Production provider backed by `tokio::task::spawn_local`.
///
/// Requires a `tokio::task::LocalSet` context, preserving the engine's
/// single-threaded execution guarantees.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task(&self, name: &'static str, future: Pin<Box<dyn Future<Output = ()>>>) {
        tracing::trace!(task = name, "spawning local task");
        tokio::task::spawn_local(future);
    }
}
