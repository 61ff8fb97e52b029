//! Configuration for the Redis Streams channel.

use crate::error::{RedisChannelError, RedisChannelResult};
use serde::{Deserialize, Serialize};

/// Redis Streams channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisChannelConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Stream to consume
    #[serde(default)]
    pub stream_key: String,

    /// Consumer group name
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Consumer name, suffixed per worker. Keep it stable across restarts so
    /// a restarted process replays its own pending entries; give concurrent
    /// processes distinct names.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Entry field holding the record body
    #[serde(default = "default_payload_field")]
    pub payload_field: String,

    /// XREADGROUP block timeout for the first take of a transaction
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,

    /// Id the consumer group starts from when it is created
    #[serde(default = "default_group_start_id")]
    pub group_start_id: String,

    /// Pending entries idle this long in any consumer's list are claimed at
    /// connect. `None` disables claiming.
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: Option<u64>,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_consumer_group() -> String {
    "batch-forwarder".to_string()
}

fn default_consumer_name() -> String {
    "batch-forwarder".to_string()
}

fn default_payload_field() -> String {
    "body".to_string()
}

fn default_block_timeout_ms() -> u64 {
    1000
}

fn default_group_start_id() -> String {
    "0".to_string()
}

fn default_claim_idle_ms() -> Option<u64> {
    Some(60_000)
}

impl RedisChannelConfig {
    /// Config for `stream_key` with defaults for everything else.
    pub fn new(stream_key: impl Into<String>) -> Self {
        Self {
            redis_url: default_redis_url(),
            stream_key: stream_key.into(),
            consumer_group: default_consumer_group(),
            consumer_name: default_consumer_name(),
            payload_field: default_payload_field(),
            block_timeout_ms: default_block_timeout_ms(),
            group_start_id: default_group_start_id(),
            claim_idle_ms: default_claim_idle_ms(),
        }
    }

    /// Copy of this config with `suffix` appended to the consumer name.
    ///
    /// Each worker needs its own consumer so pending entries replay per worker.
    pub fn for_worker(&self, suffix: impl std::fmt::Display) -> Self {
        let mut config = self.clone();
        config.consumer_name = format!("{}-{}", self.consumer_name, suffix);
        config
    }

    pub fn validate(&self) -> RedisChannelResult<()> {
        let mut missing = Vec::new();
        if self.redis_url.trim().is_empty() {
            missing.push("redis_url");
        }
        if self.stream_key.trim().is_empty() {
            missing.push("stream_key");
        }
        if self.consumer_group.trim().is_empty() {
            missing.push("consumer_group");
        }
        if self.consumer_name.trim().is_empty() {
            missing.push("consumer_name");
        }
        if self.payload_field.is_empty() {
            missing.push("payload_field");
        }
        if !missing.is_empty() {
            return Err(RedisChannelError::Config(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        if self.claim_idle_ms == Some(0) {
            // Zero would steal entries other live workers are delivering.
            return Err(RedisChannelError::Config(
                "claim_idle_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
