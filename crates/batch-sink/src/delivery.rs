//! Downstream delivery contract.

use crate::error::DeliveryResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Delivers one fully assembled batch payload.
///
/// Implementations must not retry internally: the cycle relies on the
/// channel transaction for retries, and needs the failure cause unchanged
/// to classify it.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, payload: &str) -> DeliveryResult<()>;
}

#[async_trait]
impl<D: DeliveryClient + ?Sized> DeliveryClient for Arc<D> {
    async fn deliver(&self, payload: &str) -> DeliveryResult<()> {
        (**self).deliver(payload).await
    }
}

#[async_trait]
impl<D: DeliveryClient + ?Sized> DeliveryClient for Box<D> {
    async fn deliver(&self, payload: &str) -> DeliveryResult<()> {
        (**self).deliver(payload).await
    }
}
