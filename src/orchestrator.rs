// Fan-out over every configured source adapter.
//
// Each adapter runs in its own task against a shared transport. One slow or
// broken source never blocks or poisons the others; every source ends up in
// the aggregated result, either with a listing or with a placeholder.

use crate::adapters::{AirbnbAdapter, AirbnbConfig, BookingAdapter, BookingConfig, SourceAdapter};
use crate::error::FetchError;
use crate::fetcher::{Fetcher, FetcherConfig, HttpFetcher};
use crate::listing::{AggregatedResult, Listing, SourceResult};
use crate::request::SearchRequest;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Everything needed to build the default set of adapters. Loadable from JSON;
/// missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub fetcher: FetcherConfig,
    pub airbnb: AirbnbConfig,
    pub booking: BookingConfig,
}

#[derive(Default)]
pub struct Orchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Airbnb and Booking over one shared HTTP client.
    pub fn from_config(config: AggregatorConfig) -> Result<Self, FetchError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetcher)?);
        Ok(Self::with_fetcher(fetcher, config.airbnb, config.booking))
    }

    pub fn with_fetcher(
        fetcher: Arc<dyn Fetcher>,
        airbnb: AirbnbConfig,
        booking: BookingConfig,
    ) -> Self {
        Self::new()
            .with_adapter(AirbnbAdapter::new(Arc::clone(&fetcher), airbnb))
            .with_adapter(BookingAdapter::new(fetcher, booking))
    }

    pub fn with_adapter<A: SourceAdapter>(mut self, adapter: A) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|adapter| adapter.source_name().to_string())
            .collect()
    }

    /// Runs every adapter concurrently and waits for all of them. Adapters are
    /// independent: no shared mutable state, results keyed by source name.
    pub async fn aggregate(&self, request: &SearchRequest) -> AggregatedResult {
        let started = Instant::now();
        info!(
            destination = %request.destination,
            sources = self.adapters.len(),
            "starting aggregated search"
        );

        let tasks = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let request = request.clone();
            let source = adapter.source_name().to_string();
            let handle = tokio::spawn(async move { adapter.search(&request).await });
            async move { (source, handle.await) }
        });

        let mut aggregated = AggregatedResult::new();
        for (source, outcome) in join_all(tasks).await {
            let result = match outcome {
                Ok(result) => result,
                Err(join_error) => {
                    error!(source = %source, error = %join_error, "source task aborted");
                    SourceResult::cheapest(Listing::failure(&source, &join_error))
                }
            };
            aggregated.insert(source, result);
        }

        info!(
            sources = aggregated.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregated search finished"
        );
        aggregated
    }
}
