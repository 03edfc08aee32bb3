//! Filesystem collaborator, used only by script-exposed file operations.

use crate::scheduler::Scheduler;

/// Completion for [`FileSystem::read`].
pub type ReadCallback = Box<dyn FnOnce(Result<Vec<u8>, String>) + Send>;

/// Completion for [`FileSystem::write`].
pub type WriteCallback = Box<dyn FnOnce(Result<(), String>) + Send>;

/// Asynchronous read/write of whole files.
///
/// Each completion is invoked exactly once, on an arbitrary thread.
/// Errors are delivered to script space as an `error` callback field.
pub trait FileSystem: Send + Sync {
    fn read(&self, path: &str, done: ReadCallback);
    fn write(&self, path: &str, data: Vec<u8>, done: WriteCallback);
}

impl<T: FileSystem + ?Sized> FileSystem for std::sync::Arc<T> {
    fn read(&self, path: &str, done: ReadCallback) {
        (**self).read(path, done)
    }

    fn write(&self, path: &str, data: Vec<u8>, done: WriteCallback) {
        (**self).write(path, data, done)
    }
}

/// Default filesystem: `std::fs` executed on the scheduler.
pub struct DefaultFileSystem {
    scheduler: Scheduler,
}

impl DefaultFileSystem {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

impl FileSystem for DefaultFileSystem {
    fn read(&self, path: &str, done: ReadCallback) {
        let path = path.to_string();
        self.scheduler.spawn(Box::new(move || {
            done(std::fs::read(&path).map_err(|e| format!("Failed to read {}: {}", path, e)));
        }));
    }

    fn write(&self, path: &str, data: Vec<u8>, done: WriteCallback) {
        let path = path.to_string();
        self.scheduler.spawn(Box::new(move || {
            done(
                std::fs::write(&path, data)
                    .map_err(|e| format!("Failed to write {}: {}", path, e)),
            );
        }));
    }
}
