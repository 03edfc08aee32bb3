//! Task-queue abstraction used by the default collaborators.

use std::sync::Arc;

/// A unit of work handed to a [`Scheduler`].
pub type SchedulerTask = Box<dyn FnOnce() + Send>;

/// Accepts a task and runs it asynchronously, off the calling thread.
///
/// The engine core does not depend on any internals beyond that
/// contract; the default web request and filesystem implementations use
/// it to keep blocking I/O away from the script thread. Tasks may
/// block, so a tokio-backed scheduler should use a blocking pool.
#[derive(Clone)]
pub struct Scheduler {
    spawn_fn: Arc<dyn Fn(SchedulerTask) + Send + Sync>,
}

impl Scheduler {
    pub fn new(spawn_fn: impl Fn(SchedulerTask) + Send + Sync + 'static) -> Self {
        Self {
            spawn_fn: Arc::new(spawn_fn),
        }
    }

    pub fn spawn(&self, task: SchedulerTask) {
        (self.spawn_fn)(task);
    }
}

impl Default for Scheduler {
    /// Runs each task on its own detached thread.
    fn default() -> Self {
        Self::new(|task| {
            std::thread::spawn(task);
        })
    }
}
