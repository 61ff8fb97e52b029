//! Redis Streams channel for the batch sink.
//!
//! Implements the transactional channel contract on top of a consumer group:
//!
//! - `take` reads one entry with XREADGROUP; the entry stays pending until commit
//! - `commit` acknowledges every taken entry with a single XACK
//! - `rollback` leaves the entries pending and makes the next transaction
//!   replay the pending list from the start before reading new entries
//! - connecting claims entries left idle by other consumers (XAUTOCLAIM),
//!   so a restart under a new consumer name still recovers them
//!
//! Connection failures are transient; unexpected replies are fatal.

pub mod channel;
pub mod config;
pub mod error;

pub use channel::{
    parse_xautoclaim_response, parse_xreadgroup_response, ClaimPage, ReadOutcome, RedisChannel,
    RedisTransaction, StreamEntry,
};
pub use config::RedisChannelConfig;
pub use error::{RedisChannelError, RedisChannelResult};
