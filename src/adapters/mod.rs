// Source adapters: one per travel site.
//
// An adapter owns the site's document shape knowledge. The trait splits the
// work in a fallible `collect` step and an infallible `search` boundary that
// turns every outcome, including a panic, into a `SourceResult`.

pub mod airbnb;
pub mod booking;

use crate::document::Document;
use crate::error::{AdapterError, FetchError};
use crate::fetcher::Fetcher;
use crate::listing::{select_cheapest, Listing, SourceResult};
use crate::request::SearchRequest;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

pub use airbnb::{AirbnbAdapter, AirbnbConfig};
pub use booking::{BookingAdapter, BookingConfig};

/// Everything an adapter gathered for one search: normalized listings from
/// all pages, plus the raw pages for the detail-link pass.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub listings: Vec<Listing>,
    pub pages: Vec<String>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync + 'static {
    fn source_name(&self) -> &str;

    /// Fetches and extracts every listing for `request`, prices already
    /// adjusted.
    async fn collect(&self, request: &SearchRequest) -> Result<Harvest, AdapterError>;

    /// Detail link for the chosen listing. The default looks for an anchor in
    /// the fetched pages whose href contains the listing id.
    fn detail_url(&self, listing: &Listing, pages: &[String]) -> Option<String> {
        pages
            .iter()
            .find_map(|page| Document::parse(page).link_containing(&listing.id))
    }

    /// Never fails: errors and panics become a diagnostic placeholder, an empty
    /// harvest becomes the "no listings found" placeholder.
    async fn search(&self, request: &SearchRequest) -> SourceResult {
        let source = self.source_name().to_string();
        let outcome = AssertUnwindSafe(self.cheapest(request)).catch_unwind().await;

        let listing = match outcome {
            Ok(Ok(Some(listing))) => {
                info!(source = %source, price = listing.numeric_price, "cheapest listing selected");
                listing
            }
            Ok(Ok(None)) => {
                info!(source = %source, "no usable listings");
                Listing::no_listings(&source)
            }
            Ok(Err(err)) => {
                error!(source = %source, error = %err, "source search failed");
                Listing::failure(&source, &err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(source = %source, error = %message, "source adapter panicked");
                Listing::failure(&source, message)
            }
        };

        SourceResult::cheapest(listing)
    }

    async fn cheapest(&self, request: &SearchRequest) -> Result<Option<Listing>, AdapterError> {
        let Harvest { listings, pages } = self.collect(request).await?;

        Ok(select_cheapest(listings).map(|cheapest| {
            match self.detail_url(&cheapest, &pages) {
                Some(url) => cheapest.with_detail_url(url),
                None => cheapest,
            }
        }))
    }
}

/// Fetches all `urls` concurrently. A failed page is logged and skipped; the
/// call only fails when no page could be fetched at all.
pub async fn fetch_pages(
    fetcher: &dyn Fetcher,
    source: &str,
    urls: &[String],
    headers: &[(String, String)],
) -> Result<Vec<String>, FetchError> {
    let results = join_all(urls.iter().map(|url| fetcher.fetch(url, headers))).await;

    let mut pages = Vec::with_capacity(urls.len());
    let mut last_error = None;
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(document) => pages.push(document.body),
            Err(err) => {
                warn!(source, url = %url, error = %err, "page unavailable, continuing without it");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) if pages.is_empty() => Err(err),
        _ => Ok(pages),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "adapter panicked".to_string())
}
