//! Wires sources, workers and the delivery client together.

use crate::config::{ForwarderConfig, Source};
use crate::error::{ForwarderError, ForwarderResult};
use crate::stdin_source;
use batch_sink::{
    BatchCycle, Channel, CounterSnapshot, DeliveryClient, MemoryChannel, ShutdownSignal,
    SinkCounters, SinkOptions, SinkWorker,
};
use redis_channel::RedisChannel;
use std::sync::Arc;
use stream_load::StreamLoadClient;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Name under which counters are reported.
pub const COUNTERS_NAME: &str = "batch-forwarder";

/// Run the forwarder until shutdown, returning the final counters.
pub async fn run(
    config: ForwarderConfig,
    source: Source,
    shutdown: ShutdownSignal,
) -> ForwarderResult<CounterSnapshot> {
    config.validate(source)?;

    let delivery = Arc::new(StreamLoadClient::new(config.stream_load.clone())?);
    let counters = Arc::new(SinkCounters::new(COUNTERS_NAME));

    match source {
        Source::Redis => {
            let Some(redis) = config.redis.as_ref() else {
                return Err(ForwarderError::Config("redis section missing".to_string()));
            };
            let mut channels = Vec::with_capacity(config.workers);
            for i in 0..config.workers {
                let channel = RedisChannel::connect(redis.for_worker(i)).await?;
                match channel.pending_count().await {
                    Ok(pending) if pending > 0 => {
                        info!(worker = i, pending, "Entries pending from an earlier run")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(worker = i, error = %e, "Could not count pending entries"),
                }
                channels.push(channel);
            }
            run_workers(channels, delivery, &config.sink, counters.clone(), shutdown).await?;
        }
        Source::Stdin => {
            let channel = MemoryChannel::new(config.stdin_capacity, config.sink.batch_size);
            let feeder = tokio::spawn(stdin_source::feed_lines(
                BufReader::new(tokio::io::stdin()),
                channel.clone(),
                shutdown.clone(),
            ));

            let channels = vec![channel; config.workers];
            let workers =
                run_workers(channels, delivery, &config.sink, counters.clone(), shutdown.clone())
                    .await;

            // Workers can stop before input ends; release the feeder.
            shutdown.trigger();
            if feeder.is_finished() {
                let fed = feeder.await.map_err(|e| ForwarderError::Worker {
                    name: "stdin".to_string(),
                    message: e.to_string(),
                })?;
                workers?;
                info!(lines = fed?, "Stdin source finished");
            } else {
                // Still blocked reading stdin.
                feeder.abort();
                workers?;
                info!("Stdin source stopped before end of input");
            }
        }
    }

    Ok(counters.snapshot())
}

/// Run one worker per channel until all have stopped.
///
/// A worker that stops on a fatal error triggers shutdown for the others.
/// Returns the first error.
pub async fn run_workers<C, D>(
    channels: Vec<C>,
    delivery: D,
    options: &SinkOptions,
    counters: Arc<SinkCounters>,
    shutdown: ShutdownSignal,
) -> ForwarderResult<()>
where
    C: Channel + 'static,
    D: DeliveryClient + Clone + 'static,
{
    let mut handles: Vec<(String, JoinHandle<batch_sink::SinkResult<()>>)> = Vec::new();

    for (i, channel) in channels.into_iter().enumerate() {
        let name = format!("worker-{}", i);
        let cycle = BatchCycle::new(
            channel,
            delivery.clone(),
            options.clone(),
            counters.clone(),
            shutdown.clone(),
        )?;
        let mut worker = SinkWorker::new(name.clone(), cycle);
        let stop_all = shutdown.clone();

        let handle = tokio::spawn(async move {
            let result = worker.run().await;
            if result.is_err() {
                stop_all.trigger();
            }
            result
        });
        handles.push((name, handle));
    }

    info!(workers = handles.len(), "Sink workers started");

    let mut first_error = None;
    for (name, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => ForwarderError::Sink(e),
            Err(join_err) => {
                shutdown.trigger();
                ForwarderError::Worker {
                    name: name.clone(),
                    message: join_err.to_string(),
                }
            }
        };
        error!(worker = %name, error = %outcome, "Worker stopped with error");
        first_error.get_or_insert(outcome);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
