//! One batch cycle: withdraw, format, accumulate, deliver, resolve.
//!
//! ```text
//! Idle -> Withdrawing -> Accumulating -> Flushing -> Committing  -> Idle
//!                                                \-> RollingBack -> Idle
//! ```
//!
//! The transaction is closed on every exit path, including panics, which are
//! resumed unchanged once the withdrawal has been rolled back.

use crate::accumulator::BatchAccumulator;
use crate::channel::{Channel, Transaction};
use crate::counters::SinkCounters;
use crate::delivery::DeliveryClient;
use crate::error::{FailureClass, SinkError, SinkResult};
use crate::formatter::{Formatted, RecordFormatter};
use crate::options::SinkOptions;
use crate::shutdown::{PauseOutcome, ShutdownSignal};
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the caller should do before the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// Run the next cycle right away.
    Ready,
    /// Pause before the next cycle: the channel was empty or a transient
    /// failure was rolled back.
    Backoff,
}

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Withdrawing,
    Accumulating,
    Flushing,
    Committing,
    RollingBack,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Withdrawing => "withdrawing",
            CyclePhase::Accumulating => "accumulating",
            CyclePhase::Flushing => "flushing",
            CyclePhase::Committing => "committing",
            CyclePhase::RollingBack => "rolling_back",
        };
        f.write_str(name)
    }
}

/// Successful resolution of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drained {
    /// Nothing was withdrawn.
    Empty,
    /// Records were withdrawn and committed.
    Committed {
        withdrawn: usize,
        lines: usize,
        bytes: usize,
    },
}

/// Drives batch cycles between one channel and one delivery client.
pub struct BatchCycle<C, D> {
    channel: C,
    delivery: D,
    options: SinkOptions,
    formatter: RecordFormatter,
    counters: Arc<SinkCounters>,
    shutdown: ShutdownSignal,
    phase: CyclePhase,
}

impl<C, D> BatchCycle<C, D>
where
    C: Channel,
    D: DeliveryClient,
{
    /// Create a cycle driver. Fails if the options are invalid.
    pub fn new(
        channel: C,
        delivery: D,
        options: SinkOptions,
        counters: Arc<SinkCounters>,
        shutdown: ShutdownSignal,
    ) -> SinkResult<Self> {
        options.validate()?;
        let formatter = RecordFormatter::from_options(&options);
        Ok(Self {
            channel,
            delivery,
            options,
            formatter,
            counters,
            shutdown,
            phase: CyclePhase::Idle,
        })
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn options(&self) -> &SinkOptions {
        &self.options
    }

    pub fn counters(&self) -> &Arc<SinkCounters> {
        &self.counters
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Run one cycle.
    ///
    /// Returns `Ready` after a committed delivery, `Backoff` after an empty
    /// withdrawal or a rolled back transient failure, and `Err` for fatal
    /// failures (always after rollback and cleanup).
    pub async fn process(&mut self) -> SinkResult<CycleStatus> {
        self.phase = CyclePhase::Idle;

        let mut tx = match self.channel.begin().await {
            Ok(tx) => tx,
            Err(e) if e.class() == FailureClass::Transient => {
                warn!(error = %e, "Could not open transaction, backing off");
                return Ok(CycleStatus::Backoff);
            }
            Err(e) => return Err(e.into()),
        };

        let mut batch = BatchAccumulator::new(self.options.batch_size);

        let drained = AssertUnwindSafe(self.drain(&mut tx, &mut batch))
            .catch_unwind()
            .await;

        let result = match drained {
            Ok(Ok(drained)) => self.finish_success(drained, &mut batch).await,
            Ok(Err(err)) => self.finish_failure(err, &mut tx, &mut batch).await,
            Err(panic) => {
                self.phase = CyclePhase::RollingBack;
                error!(phase = %self.phase, "Panic during batch cycle, rolling back");
                if let Err(e) = tx.rollback().await {
                    error!(error = %e, "Rollback after panic failed");
                }
                batch.reset();
                if let Err(e) = tx.close().await {
                    error!(error = %e, "Closing transaction after panic failed");
                }
                self.phase = CyclePhase::Idle;
                std::panic::resume_unwind(panic);
            }
        };

        let result = match tx.close().await {
            Ok(()) => result,
            Err(close_err) => match result {
                Ok(_) => Err(close_err.into()),
                Err(e) => {
                    warn!(error = %close_err, "Closing transaction failed after cycle error");
                    Err(e)
                }
            },
        };

        self.phase = CyclePhase::Idle;
        result
    }

    /// Withdraw, accumulate, deliver and commit. Any error leaves the
    /// transaction unresolved for the caller to roll back.
    async fn drain(
        &mut self,
        tx: &mut C::Transaction,
        batch: &mut BatchAccumulator,
    ) -> SinkResult<Drained> {
        let batch_size = self.options.batch_size;
        let mut withdrawn = 0usize;

        self.phase = CyclePhase::Withdrawing;
        while withdrawn < batch_size {
            let Some(record) = tx.take().await? else {
                break;
            };
            withdrawn += 1;

            self.phase = CyclePhase::Accumulating;
            match self.formatter.format(record.body())? {
                Formatted::Line(line) => batch.append(&line)?,
                Formatted::Skip => debug!("Skipping record with empty content"),
            }
            self.phase = CyclePhase::Withdrawing;
        }

        if withdrawn == 0 {
            self.counters.increment_batch_empty();
            self.phase = CyclePhase::Committing;
            tx.commit().await?;
            return Ok(Drained::Empty);
        }

        if withdrawn < batch_size {
            self.counters.increment_batch_underflow();
        } else {
            self.counters.increment_batch_complete();
        }
        self.counters.add_to_drain_attempt(withdrawn as u64);

        let lines = batch.current_size();
        let bytes = batch.payload_len();
        if batch.is_empty() {
            debug!(withdrawn, "Every withdrawn record was empty, nothing to deliver");
        } else {
            self.phase = CyclePhase::Flushing;
            let payload = batch.render()?;
            self.delivery.deliver(payload).await?;
        }

        self.phase = CyclePhase::Committing;
        tx.commit().await?;
        self.counters.add_to_drain_success(withdrawn as u64);

        Ok(Drained::Committed {
            withdrawn,
            lines,
            bytes,
        })
    }

    async fn finish_success(
        &mut self,
        drained: Drained,
        batch: &mut BatchAccumulator,
    ) -> SinkResult<CycleStatus> {
        batch.reset();
        match drained {
            Drained::Empty => {
                debug!("Channel empty, backing off");
                Ok(CycleStatus::Backoff)
            }
            Drained::Committed {
                withdrawn,
                lines,
                bytes,
            } => {
                info!(withdrawn, lines, bytes, "Batch delivered and committed");
                let interval = self.options.flush_interval();
                if self.shutdown.pause(interval).await == PauseOutcome::Interrupted {
                    debug!("Flush interval cut short by shutdown");
                }
                Ok(CycleStatus::Ready)
            }
        }
    }

    async fn finish_failure(
        &mut self,
        err: SinkError,
        tx: &mut C::Transaction,
        batch: &mut BatchAccumulator,
    ) -> SinkResult<CycleStatus> {
        let failed_in = self.phase;
        self.phase = CyclePhase::RollingBack;

        let err = match tx.rollback().await {
            Ok(()) => err,
            Err(rollback_err) => SinkError::Rollback {
                source: rollback_err,
                original: Box::new(err),
            },
        };
        batch.reset();

        if err.is_transient() {
            warn!(
                phase = %failed_in,
                error = %err,
                "Transient failure, transaction rolled back"
            );
            return Ok(CycleStatus::Backoff);
        }

        error!(
            phase = %failed_in,
            error = %err,
            "Failed to send events, transaction rolled back"
        );

        match self.shutdown.pause(self.options.flush_interval()).await {
            PauseOutcome::Elapsed => Err(err),
            PauseOutcome::Interrupted => Err(SinkError::Cleanup {
                source: Box::new(SinkError::Interrupted),
                original: Box::new(err),
            }),
        }
    }
}
