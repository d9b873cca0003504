pub mod forecast_api;
pub mod govt_feed;
pub mod vendor_api;

use anyhow::Result;
use async_trait::async_trait;

use crate::data::types::{PriceObservation, PriceQuery};

/// Supplies the bearer credential attached to outbound platform requests.
/// Queried per request, so rotated tokens are picked up without rebuilding
/// clients. The government feed never uses it.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed credential, typically loaded from the environment at startup.
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// One independently failing price fetcher. Implementations normalize a
/// provider-specific payload into `PriceObservation`s; errors propagate to
/// the aggregator, which absorbs them so a partial outage degrades coverage
/// instead of failing the whole query.
#[async_trait]
pub trait PriceSourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, query: &PriceQuery) -> Result<Vec<PriceObservation>>;
}
