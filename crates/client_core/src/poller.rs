//! Cancellable repeating task.

use std::{future::Future, ops::ControlFlow, sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

use crate::clock::Clock;

/// Handle to a task that runs `tick`, waits `interval` on the clock, and
/// repeats until stopped.
///
/// The first tick runs immediately. Stopping (or dropping the handle) also
/// cancels a tick that is still in flight.
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn spawn<F, Fut>(clock: Arc<dyn Clock>, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (stop, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                let flow = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    flow = tick() => flow,
                };
                if flow.is_break() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = clock.sleep(interval) => {}
                }
            }
        });

        Self { stop, task }
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
