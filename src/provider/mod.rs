use async_trait::async_trait;

use crate::{
    error::TransportError,
    types::{QueryParams, RawPayload},
};

pub use self::{event::Event, http::HTTP};

mod event;
mod http;
#[cfg(test)]
pub(crate) mod testing;

/// One round trip to the analytics API. Implementations never retry;
/// retry and fallback policy belongs to the cache coordinator.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<RawPayload, TransportError>;
}
