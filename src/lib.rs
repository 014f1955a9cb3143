// Main library file for the stay aggregator

// Core data model and pure helpers
pub mod listing;
pub mod price;
pub mod request;
pub mod tree;

// Document access and extraction
pub mod document;
pub mod pipeline;

// Transport, sources and fan-out
pub mod adapters;
pub mod error;
pub mod fetcher;
pub mod orchestrator;

// Re-export key types for convenience
pub use adapters::{AirbnbAdapter, AirbnbConfig, BookingAdapter, BookingConfig, Harvest, SourceAdapter};
pub use error::{AdapterError, ExtractionError, FetchError};
pub use fetcher::{Fetcher, FetcherConfig, HttpFetcher, RetryConfig, StaticFetcher};
pub use listing::{AggregatedResult, Listing, SourceResult};
pub use orchestrator::{AggregatorConfig, Orchestrator};
pub use pipeline::{Extraction, ExtractionPipeline, Strategy};
pub use price::{parse_price, PricingPolicy};
pub use request::{DateRange, Occupancy, PropertyType, SearchRequest};
