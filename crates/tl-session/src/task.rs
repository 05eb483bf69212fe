use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic task with at most one live instance
///
/// Starting again aborts the previous loop first; dropping the handle stops it.
#[derive(Debug, Default)]
pub struct ScheduledTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` now and then every `period` until it breaks or the task stops
    pub fn start<F>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let mut slot = self.handle.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tick().is_break() {
                    break;
                }
            }
        }));
    }

    /// Abort the running loop; returns whether one was running
    pub fn stop(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_loop() {
        let task = ScheduledTask::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        task.start(Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);

        let counter = second.clone();
        task.start(Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert!(task.is_running());

        assert!(task.stop());
        assert!(!task.stop());
        assert!(!task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_loop() {
        let task = ScheduledTask::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        task.start(Duration::from_secs(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!task.is_running());
    }
}
