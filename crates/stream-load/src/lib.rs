//! HTTP stream load delivery for the batch sink.
//!
//! [`StreamLoadClient`] implements [`batch_sink::DeliveryClient`]: every
//! batch becomes one stream load request under a unique label, sent to one
//! of several frontend nodes.

pub mod client;
pub mod config;
pub mod error;

pub use client::{LoadResponse, StreamLoadClient};
pub use config::{LoadFormat, StreamLoadConfig};
pub use error::{StreamLoadError, StreamLoadResult};
