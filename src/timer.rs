//! Timer collaborator.

use std::time::Duration;

/// Completion handed to [`Timer::schedule`].
pub type TimerTask = Box<dyn FnOnce() + Send>;

/// Schedules a one-shot delayed task.
///
/// Implementations must run `task` asynchronously (never on the calling
/// stack) and at most once per `schedule` call. There is no cancel
/// path: once the engine is gone the task's completion message simply
/// has nowhere to go.
pub trait Timer: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask);
}

impl<T: Timer + ?Sized> Timer for std::sync::Arc<T> {
    fn schedule(&self, delay: Duration, task: TimerTask) {
        (**self).schedule(delay, task)
    }
}

/// Default timer.
///
/// Uses the ambient tokio runtime when one is present; otherwise falls
/// back to a detached sleeper thread per timer.
#[derive(Debug, Default)]
pub struct DefaultTimer;

impl Timer for DefaultTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    task();
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    task();
                });
            }
        }
    }
}
