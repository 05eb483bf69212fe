use std::ops::ControlFlow;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::status::ConnectionSnapshot;
use crate::task::ScheduledTask;

/// What the status publisher polls every tick
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync + 'static {
    /// Current connection state as the UI should show it
    fn snapshot(&self) -> ConnectionSnapshot;

    /// Background work for the tick (refresh trigger, liveness probe)
    async fn on_tick(&self);
}

/// Periodically recomputes the connection snapshot and triggers refresh checks
#[derive(Debug)]
pub struct StatusPublisher {
    interval: Duration,
    task: ScheduledTask,
    sender: watch::Sender<ConnectionSnapshot>,
}

impl StatusPublisher {
    pub fn new(interval: Duration) -> Self {
        let (sender, _) = watch::channel(ConnectionSnapshot::default());
        Self {
            interval,
            task: ScheduledTask::new(),
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> ConnectionSnapshot {
        self.sender.borrow().clone()
    }

    /// Push a snapshot to subscribers; unchanged values do not wake them
    pub fn publish(&self, snapshot: ConnectionSnapshot) {
        publish_to(&self.sender, snapshot);
    }

    /// Start the loop, replacing any running one
    ///
    /// Each tick publishes first, then runs [`StatusSource::on_tick`] as its own
    /// task so a slow tick never delays the next. The loop ends by itself once
    /// the source is dropped.
    pub fn start(&self, source: Weak<dyn StatusSource>) {
        let sender = self.sender.clone();
        self.task.start(self.interval, move || {
            let Some(live) = source.upgrade() else {
                debug!("Status source dropped; stopping publisher");
                return ControlFlow::Break(());
            };

            publish_to(&sender, live.snapshot());
            tokio::spawn(async move { live.on_tick().await });
            ControlFlow::Continue(())
        });
    }

    pub fn stop(&self) -> bool {
        self.task.stop()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

fn publish_to(sender: &watch::Sender<ConnectionSnapshot>, snapshot: ConnectionSnapshot) {
    sender.send_if_modified(|current| {
        if *current == snapshot {
            return false;
        }
        *current = snapshot;
        true
    });
}
