//! Worker loop around [`BatchCycle`].

use crate::channel::Channel;
use crate::cycle::{BatchCycle, CycleStatus};
use crate::delivery::DeliveryClient;
use crate::error::SinkResult;
use crate::shutdown::PauseOutcome;
use tracing::{debug, error, info, warn};

/// Runs cycles back to back until shutdown, pausing when told to back off.
pub struct SinkWorker<C, D> {
    name: String,
    cycle: BatchCycle<C, D>,
    consecutive_backoffs: u32,
}

impl<C, D> SinkWorker<C, D>
where
    C: Channel,
    D: DeliveryClient,
{
    pub fn new(name: impl Into<String>, cycle: BatchCycle<C, D>) -> Self {
        Self {
            name: name.into(),
            cycle,
            consecutive_backoffs: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cycle(&self) -> &BatchCycle<C, D> {
        &self.cycle
    }

    /// Run until shutdown is requested.
    ///
    /// A cycle that is already running always finishes its commit or
    /// rollback; no new cycle starts once shutdown is requested. Returns the
    /// first fatal error when `stop_on_fatal` is set.
    pub async fn run(&mut self) -> SinkResult<()> {
        let counters = self.cycle.counters().clone();
        let shutdown = self.cycle.shutdown().clone();

        counters.start();
        info!(
            worker = %self.name,
            batch_size = self.cycle.options().batch_size,
            flush_interval_ms = self.cycle.options().flush_interval_ms,
            unique_event = self.cycle.options().unique_event,
            "Starting sink worker"
        );

        let result = loop {
            if shutdown.is_triggered() {
                break Ok(());
            }

            let pause = match self.cycle.process().await {
                Ok(CycleStatus::Ready) => {
                    self.consecutive_backoffs = 0;
                    continue;
                }
                Ok(CycleStatus::Backoff) => {
                    self.consecutive_backoffs = self.consecutive_backoffs.saturating_add(1);
                    let delay = self.cycle.options().backoff.delay(self.consecutive_backoffs);
                    debug!(
                        worker = %self.name,
                        consecutive = self.consecutive_backoffs,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off"
                    );
                    delay
                }
                Err(e) => {
                    error!(worker = %self.name, error = %e, "Batch cycle failed");
                    if self.cycle.options().stop_on_fatal {
                        break Err(e);
                    }
                    self.consecutive_backoffs = 0;
                    self.cycle.options().backoff.max_delay()
                }
            };

            if shutdown.pause(pause).await == PauseOutcome::Interrupted {
                debug!(worker = %self.name, "Backoff cut short by shutdown");
            }
        };

        counters.stop();
        let snapshot = counters.snapshot();
        match &result {
            Ok(()) => info!(
                worker = %self.name,
                batch_empty = snapshot.batch_empty,
                batch_underflow = snapshot.batch_underflow,
                batch_complete = snapshot.batch_complete,
                drain_attempt = snapshot.drain_attempt,
                drain_success = snapshot.drain_success,
                "Sink worker stopped"
            ),
            Err(e) => warn!(
                worker = %self.name,
                error = %e,
                drain_attempt = snapshot.drain_attempt,
                drain_success = snapshot.drain_success,
                "Sink worker stopped on fatal error"
            ),
        }
        result
    }
}
