//! Redis Streams channel.
//!
//! Handles XREADGROUP and XACK operations against one stream on behalf of
//! one consumer. Taken entries stay in the consumer's pending entries list
//! (PEL) until the transaction commits; a rollback re-reads the PEL from the
//! start so nothing taken is lost.
//!
//! At connect, entries left idle in other consumers' lists (a crashed
//! process that used a different consumer name) are claimed into this
//! consumer's list with XAUTOCLAIM, so the first replay picks them up.

use crate::config::RedisChannelConfig;
use crate::error::{RedisChannelError, RedisChannelResult};
use async_trait::async_trait;
use batch_sink::{Channel, ChannelResult, Record, Transaction, TransactionState};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read position that replays this consumer's pending entries from the start.
const REPLAY_FROM_START: &str = "0";

/// Read position for entries never delivered to any consumer.
const NEW_ENTRIES: &str = ">";

/// XAUTOCLAIM cursor that starts a scan and signals its end.
const CLAIM_SCAN_START: &str = "0-0";

/// Entries claimed per XAUTOCLAIM call.
const CLAIM_BATCH: usize = 100;

/// Upper bound on XAUTOCLAIM calls per connect.
const MAX_CLAIM_ROUNDS: usize = 1000;

/// An entry read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// The Redis entry ID (e.g., "1234567890-0").
    pub id: String,
    /// Payload field contents; empty when the field is missing or the entry was deleted.
    pub body: Vec<u8>,
}

struct Shared {
    conn: Option<MultiplexedConnection>,
    /// Next transaction must drain the PEL before reading new entries.
    replay: bool,
}

/// Redis Streams consumer-group channel.
///
/// One channel serves one consumer; give each worker its own channel with
/// its own consumer name (see [`RedisChannelConfig::for_worker`]).
pub struct RedisChannel {
    client: Client,
    config: Arc<RedisChannelConfig>,
    shared: Arc<Mutex<Shared>>,
}

impl RedisChannel {
    /// Connect to Redis and make sure the consumer group exists.
    ///
    /// Replay is armed so entries left pending by a previous run are read
    /// before new ones.
    pub async fn connect(config: RedisChannelConfig) -> RedisChannelResult<Self> {
        config.validate()?;
        let client = Client::open(config.redis_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        ensure_consumer_group(&mut conn.clone(), &config).await?;
        recover_idle_entries(&mut conn.clone(), &config).await?;

        info!(
            stream = %config.stream_key,
            group = %config.consumer_group,
            consumer = %config.consumer_name,
            "Connected Redis channel"
        );

        Ok(Self {
            client,
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(Shared {
                conn: Some(conn),
                replay: true,
            })),
        })
    }

    pub fn config(&self) -> &RedisChannelConfig {
        &self.config
    }

    /// Reconnect to Redis and re-arm replay.
    pub async fn reconnect(&self) -> RedisChannelResult<MultiplexedConnection> {
        info!("Reconnecting to Redis...");
        let conn = self.client.get_multiplexed_async_connection().await?;
        ensure_consumer_group(&mut conn.clone(), &self.config).await?;
        recover_idle_entries(&mut conn.clone(), &self.config).await?;

        let mut shared = self.shared.lock();
        shared.conn = Some(conn.clone());
        shared.replay = true;
        Ok(conn)
    }

    /// Number of entries pending for the whole consumer group.
    pub async fn pending_count(&self) -> RedisChannelResult<i64> {
        let mut conn = self.connection().await?;

        // XPENDING key group
        let result: Value = redis::cmd("XPENDING")
            .arg(&self.config.stream_key)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        // Response is [count, min_id, max_id, [[consumer, count], ...]]
        if let Value::Array(arr) = result {
            if let Some(Value::Int(count)) = arr.first() {
                return Ok(*count);
            }
        }
        Ok(0)
    }

    async fn connection(&self) -> RedisChannelResult<MultiplexedConnection> {
        let existing = self.shared.lock().conn.clone();
        match existing {
            Some(conn) => Ok(conn),
            None => self.reconnect().await,
        }
    }
}

#[async_trait]
impl Channel for RedisChannel {
    type Transaction = RedisTransaction;

    async fn begin(&self) -> ChannelResult<RedisTransaction> {
        let conn = self.connection().await?;
        let cursor = self
            .shared
            .lock()
            .replay
            .then(|| REPLAY_FROM_START.to_string());

        Ok(RedisTransaction {
            conn,
            config: self.config.clone(),
            shared: self.shared.clone(),
            state: TransactionState::Open,
            cursor,
            taken: Vec::new(),
            reads: 0,
        })
    }
}

/// Transaction over a [`RedisChannel`].
pub struct RedisTransaction {
    conn: MultiplexedConnection,
    config: Arc<RedisChannelConfig>,
    shared: Arc<Mutex<Shared>>,
    state: TransactionState,
    /// Last pending id read while replaying; `None` once reading new entries.
    cursor: Option<String>,
    taken: Vec<String>,
    reads: usize,
}

impl RedisTransaction {
    /// Ids taken so far, in order.
    pub fn taken_ids(&self) -> &[String] {
        &self.taken
    }

    fn arm_replay(&self) {
        self.shared.lock().replay = true;
    }

    /// Drop the shared connection after a connection failure so the next
    /// transaction reconnects.
    fn note_failure(&self, err: &RedisChannelError) {
        if err.is_connection_error() {
            let mut shared = self.shared.lock();
            shared.conn = None;
            shared.replay = true;
        }
    }

    async fn read_one(&mut self, position: &str, block: bool) -> RedisChannelResult<ReadOutcome> {
        // XREADGROUP GROUP group consumer COUNT 1 [BLOCK ms] STREAMS key id
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1);
        if block {
            cmd.arg("BLOCK").arg(self.config.block_timeout_ms);
        }
        cmd.arg("STREAMS").arg(&self.config.stream_key).arg(position);

        let result: RedisResult<Value> = cmd.query_async(&mut self.conn).await;
        let value = result.map_err(RedisChannelError::from)?;
        parse_xreadgroup_response(value, &self.config.payload_field)
    }
}

#[async_trait]
impl Transaction for RedisTransaction {
    async fn take(&mut self) -> ChannelResult<Option<Record>> {
        self.state.ensure_open("take from")?;

        if let Some(cursor) = self.cursor.clone() {
            let outcome = match self.read_one(&cursor, false).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.note_failure(&e);
                    return Err(e.into());
                }
            };
            match outcome {
                ReadOutcome::Entry(entry) => {
                    debug!(id = %entry.id, "Replaying pending entry");
                    self.cursor = Some(entry.id.clone());
                    self.taken.push(entry.id);
                    self.reads += 1;
                    return Ok(Some(Record::new(entry.body)));
                }
                ReadOutcome::Empty => {
                    debug!("Pending entries replayed, reading new entries");
                    self.cursor = None;
                    self.shared.lock().replay = false;
                }
            }
        }

        let block = self.reads == 0;
        self.reads += 1;
        let outcome = match self.read_one(NEW_ENTRIES, block).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.note_failure(&e);
                return Err(e.into());
            }
        };
        match outcome {
            ReadOutcome::Entry(entry) => {
                debug!(id = %entry.id, payload_len = entry.body.len(), "Read entry from stream");
                self.taken.push(entry.id);
                Ok(Some(Record::new(entry.body)))
            }
            ReadOutcome::Empty => Ok(None),
        }
    }

    async fn commit(&mut self) -> ChannelResult<()> {
        self.state.ensure_open("commit")?;

        if !self.taken.is_empty() {
            let acked: RedisResult<i64> = self
                .conn
                .xack(
                    &self.config.stream_key,
                    &self.config.consumer_group,
                    self.taken.as_slice(),
                )
                .await;
            let acked = match acked {
                Ok(n) => n,
                Err(e) => {
                    let err = RedisChannelError::from(e);
                    self.note_failure(&err);
                    return Err(err.into());
                }
            };

            if acked as usize != self.taken.len() {
                warn!(
                    stream = %self.config.stream_key,
                    taken = self.taken.len(),
                    acked,
                    "XACK acknowledged fewer entries than taken"
                );
            } else {
                debug!(stream = %self.config.stream_key, acked, "Acknowledged entries");
            }
            self.taken.clear();
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> ChannelResult<()> {
        self.state.ensure_open("roll back")?;
        if !self.taken.is_empty() {
            debug!(
                entries = self.taken.len(),
                "Leaving entries pending for replay"
            );
            self.arm_replay();
            self.taken.clear();
        }
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        if self.state == TransactionState::Open && !self.taken.is_empty() {
            warn!(
                entries = self.taken.len(),
                "Closing unresolved transaction, entries stay pending"
            );
            self.arm_replay();
            self.taken.clear();
        }
        self.state = TransactionState::Closed;
        Ok(())
    }
}

impl Drop for RedisTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open && !self.taken.is_empty() {
            self.arm_replay();
        }
    }
}

/// Ensure the consumer group exists, creating it (and the stream) if necessary.
async fn ensure_consumer_group(
    conn: &mut MultiplexedConnection,
    config: &RedisChannelConfig,
) -> RedisChannelResult<()> {
    // XGROUP CREATE key groupname id MKSTREAM
    let result: RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(&config.stream_key)
        .arg(&config.consumer_group)
        .arg(&config.group_start_id)
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => {
            info!(
                stream = %config.stream_key,
                group = %config.consumer_group,
                start = %config.group_start_id,
                "Created consumer group"
            );
            Ok(())
        }
        // BUSYGROUP: the group already exists
        Err(e) if e.code() == Some("BUSYGROUP") || e.to_string().contains("BUSYGROUP") => {
            debug!(
                stream = %config.stream_key,
                group = %config.consumer_group,
                "Consumer group already exists"
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Claim entries idle past `claim_idle_ms` into this consumer's pending list.
///
/// Only connection failures are errors; a server without XAUTOCLAIM (before
/// Redis 6.2) is logged and skipped.
async fn recover_idle_entries(
    conn: &mut MultiplexedConnection,
    config: &RedisChannelConfig,
) -> RedisChannelResult<()> {
    let Some(min_idle_ms) = config.claim_idle_ms else {
        return Ok(());
    };

    match claim_idle_entries(conn, config, min_idle_ms).await {
        Ok(0) => Ok(()),
        Ok(claimed) => {
            info!(
                stream = %config.stream_key,
                consumer = %config.consumer_name,
                claimed,
                min_idle_ms,
                "Claimed idle pending entries"
            );
            Ok(())
        }
        Err(e) if e.is_connection_error() => Err(e),
        Err(e) => {
            warn!(error = %e, "Could not claim idle pending entries");
            Ok(())
        }
    }
}

async fn claim_idle_entries(
    conn: &mut MultiplexedConnection,
    config: &RedisChannelConfig,
    min_idle_ms: u64,
) -> RedisChannelResult<usize> {
    let mut cursor = CLAIM_SCAN_START.to_string();
    let mut claimed = 0;

    for _ in 0..MAX_CLAIM_ROUNDS {
        // XAUTOCLAIM key group consumer min-idle start COUNT n JUSTID
        let value: Value = redis::cmd("XAUTOCLAIM")
            .arg(&config.stream_key)
            .arg(&config.consumer_group)
            .arg(&config.consumer_name)
            .arg(min_idle_ms)
            .arg(&cursor)
            .arg("COUNT")
            .arg(CLAIM_BATCH)
            .arg("JUSTID")
            .query_async(conn)
            .await?;

        let page = parse_xautoclaim_response(value)?;
        claimed += page.claimed.len();
        if page.next == CLAIM_SCAN_START {
            return Ok(claimed);
        }
        cursor = page.next;
    }

    warn!(claimed, "Stopped claiming idle entries after {} rounds", MAX_CLAIM_ROUNDS);
    Ok(claimed)
}

/// One page of an XAUTOCLAIM scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPage {
    /// Cursor for the next call; `0-0` once the scan is complete.
    pub next: String,
    /// Ids now owned by the claiming consumer.
    pub claimed: Vec<String>,
    /// Ids that were pending but no longer exist in the stream (Redis 7+).
    pub deleted: Vec<String>,
}

/// Parse an XAUTOCLAIM reply.
///
/// Reply shape: `[next_cursor, [id, ...], [deleted_id, ...]]`; the third
/// element is absent before Redis 7. Without JUSTID the claimed list holds
/// `[id, fields]` entries, of which only the id is kept.
pub fn parse_xautoclaim_response(value: Value) -> RedisChannelResult<ClaimPage> {
    let mut parts = match value {
        Value::Array(parts) => parts.into_iter(),
        other => {
            return Err(RedisChannelError::Protocol(format!(
                "Unexpected XAUTOCLAIM response type: {:?}",
                other
            )))
        }
    };

    let next = parts
        .next()
        .as_ref()
        .and_then(value_to_string)
        .ok_or_else(|| {
            RedisChannelError::Protocol("XAUTOCLAIM reply missing cursor".to_string())
        })?;
    let claimed = match parts.next() {
        Some(list) => id_list(list)?,
        None => {
            return Err(RedisChannelError::Protocol(
                "XAUTOCLAIM reply missing claimed entries".to_string(),
            ))
        }
    };
    let deleted = match parts.next() {
        Some(list) => id_list(list)?,
        None => Vec::new(),
    };

    Ok(ClaimPage {
        next,
        claimed,
        deleted,
    })
}

fn id_list(value: Value) -> RedisChannelResult<Vec<String>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Nil => return Ok(Vec::new()),
        other => {
            return Err(RedisChannelError::Protocol(format!(
                "Expected array of ids, got {:?}",
                other
            )))
        }
    };

    items
        .iter()
        .map(|item| {
            let id = match item {
                Value::Array(entry) => entry.first().and_then(value_to_string),
                other => value_to_string(other),
            };
            id.ok_or_else(|| {
                RedisChannelError::Protocol(format!("Expected string id, got {:?}", item))
            })
        })
        .collect()
}

/// Result of one single-entry XREADGROUP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Entry(StreamEntry),
    Empty,
}

/// Parse an XREADGROUP reply holding at most one entry.
///
/// Reply shape: `[[stream_key, [[id, [field, value, ...]], ...]]]`. A nil
/// reply or an empty entry list is [`ReadOutcome::Empty`]. Pending entries
/// deleted from the stream come back as `[id, nil]` and yield an empty body.
pub fn parse_xreadgroup_response(
    value: Value,
    payload_field: &str,
) -> RedisChannelResult<ReadOutcome> {
    let streams = match value {
        Value::Nil => return Ok(ReadOutcome::Empty),
        Value::Array(streams) => streams,
        Value::Map(pairs) => pairs
            .into_iter()
            .map(|(key, entries)| Value::Array(vec![key, entries]))
            .collect(),
        other => {
            return Err(RedisChannelError::Protocol(format!(
                "Unexpected XREADGROUP response type: {:?}",
                other
            )))
        }
    };

    let Some(stream) = streams.into_iter().next() else {
        return Ok(ReadOutcome::Empty);
    };
    let Value::Array(stream) = stream else {
        return Err(RedisChannelError::Protocol(
            "Expected array for stream entry".to_string(),
        ));
    };
    let Some(entries) = stream.into_iter().nth(1) else {
        return Err(RedisChannelError::Protocol(
            "Stream entry too short".to_string(),
        ));
    };
    let entries = match entries {
        Value::Array(entries) => entries,
        Value::Nil => return Ok(ReadOutcome::Empty),
        _ => {
            return Err(RedisChannelError::Protocol(
                "Expected array for messages".to_string(),
            ))
        }
    };

    let Some(entry) = entries.into_iter().next() else {
        return Ok(ReadOutcome::Empty);
    };
    let Value::Array(mut entry) = entry else {
        return Err(RedisChannelError::Protocol(
            "Expected array for message".to_string(),
        ));
    };
    if entry.len() < 2 {
        return Err(RedisChannelError::Protocol(
            "Message entry too short".to_string(),
        ));
    }
    let fields = entry.swap_remove(1);

    let id = value_to_string(&entry[0]).ok_or_else(|| {
        RedisChannelError::Protocol(format!(
            "Expected string for message ID, got {:?}",
            entry[0]
        ))
    })?;

    let body = match fields {
        Value::Nil => Vec::new(),
        Value::Array(fields) => find_field(&fields, payload_field).unwrap_or_default(),
        _ => {
            return Err(RedisChannelError::Protocol(
                "Expected array for fields".to_string(),
            ))
        }
    };

    Ok(ReadOutcome::Entry(StreamEntry { id, body }))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn find_field(fields: &[Value], name: &str) -> Option<Vec<u8>> {
    fields.chunks_exact(2).find_map(|pair| {
        if value_to_string(&pair[0]).as_deref() != Some(name) {
            return None;
        }
        match &pair[1] {
            Value::BulkString(s) => Some(s.clone()),
            Value::SimpleString(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    })
}
