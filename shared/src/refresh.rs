//! Periodic refresh while the history screen is visible.
//!
//! The driver only emits [`Event::RefreshTick`]. Coalescing with a fetch
//! already in flight happens in the core, so a slow network never stacks
//! requests.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::event::Event;
use crate::runtime::EventSender;
use crate::MIN_REFRESH_INTERVAL;

pub struct RefreshDriver;

impl RefreshDriver {
    /// Starts ticking on the current tokio runtime. The first tick fires one
    /// full `period` after start; the mount fetch covers time zero.
    #[must_use]
    pub fn start(events: EventSender, period: Duration) -> RefreshHandle {
        let period = period.max(MIN_REFRESH_INTERVAL);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(period_secs = period.as_secs_f64(), "refresh driver started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        trace!("refresh tick");
                        if !events.send(Event::RefreshTick) {
                            break;
                        }
                    }
                }
            }
            debug!("refresh driver stopped");
        });

        RefreshHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Owns the ticking task. Dropping the handle stops it.
#[derive(Debug)]
pub struct RefreshHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Ticks already queued are discarded by the core once history is closed.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.stop.is_some() && !self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
