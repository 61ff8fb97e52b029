//! Feeds input lines into a [`MemoryChannel`].
//!
//! Each line becomes one record holding the raw bytes, so undecodable input
//! reaches the formatter and fails there as a decode error. A full channel
//! blocks the reader until workers make room. Once input ends and every
//! record has been committed, shutdown is triggered so the workers stop.
//! A read error also triggers shutdown.

use crate::error::{ForwarderError, ForwarderResult};
use batch_sink::{ChannelError, MemoryChannel, PauseOutcome, Record, ShutdownSignal};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info};

/// Retry interval while the channel is full.
const FULL_RETRY: Duration = Duration::from_millis(10);

/// Poll interval while waiting for workers to drain the channel.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Read `reader` to the end, putting every line into `channel`.
///
/// Returns the number of lines queued. Stops early, without error, if
/// shutdown is requested while waiting for room.
pub async fn feed_lines<R>(
    reader: R,
    channel: MemoryChannel,
    shutdown: ShutdownSignal,
) -> ForwarderResult<u64>
where
    R: AsyncBufRead + Unpin,
{
    let result = queue_lines(reader, &channel, &shutdown).await;
    if let Err(e) = &result {
        error!(error = %e, "Stdin source failed, stopping workers");
        shutdown.trigger();
    }
    result
}

async fn queue_lines<R>(
    reader: R,
    channel: &MemoryChannel,
    shutdown: &ShutdownSignal,
) -> ForwarderResult<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    let mut queued = 0u64;

    while let Some(mut line) = lines.next_segment().await? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let record = Record::new(line);
        loop {
            match channel.put(record.clone()) {
                Ok(()) => break,
                Err(ChannelError::Exhausted(_)) => {
                    if shutdown.pause(FULL_RETRY).await == PauseOutcome::Interrupted {
                        info!(queued, "Shutdown while waiting for channel space");
                        return Ok(queued);
                    }
                }
                Err(e) => return Err(ForwarderError::Sink(e.into())),
            }
        }
        queued += 1;
    }

    debug!(queued, "Input exhausted, waiting for workers to drain");
    while !channel.is_drained() {
        if shutdown.pause(DRAIN_POLL).await == PauseOutcome::Interrupted {
            return Ok(queued);
        }
    }

    info!(queued, "All input forwarded");
    shutdown.trigger();
    Ok(queued)
}
