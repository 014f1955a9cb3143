use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CHEAPEST: &str = "cheapest";
pub const NO_LISTINGS_FOUND: &str = "No listings found";

const PLACEHOLDER_PRICE: &str = "0";
const PLACEHOLDER_RATING: &str = "0.0";

/// One normalized lodging offer produced by a source adapter.
///
/// `numeric_price` is always set. `f64::INFINITY` marks a price that could not
/// be recovered; such a listing is never chosen as the cheapest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Listing {
    #[serde(rename = "Listing ID")]
    pub id: String,
    #[serde(rename = "Listing Type")]
    pub listing_type: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Average Rating")]
    pub rating_text: String,
    #[serde(rename = "Total Price")]
    pub display_price: String,
    #[serde(rename = "Price")]
    pub numeric_price: f64,
    #[serde(rename = "Picture")]
    pub image_url: String,
    #[serde(rename = "Website")]
    pub source_name: String,
    #[serde(rename = "Listing URL")]
    pub detail_url: Option<String>,
}

impl Listing {
    /// Sentinel listing used when a source has nothing genuine to report.
    pub fn placeholder(source_name: &str, label: &str) -> Self {
        Self {
            id: String::new(),
            listing_type: None,
            name: label.to_string(),
            title: label.to_string(),
            rating_text: PLACEHOLDER_RATING.to_string(),
            display_price: PLACEHOLDER_PRICE.to_string(),
            numeric_price: 0.0,
            image_url: String::new(),
            source_name: source_name.to_string(),
            detail_url: None,
        }
    }

    pub fn no_listings(source_name: &str) -> Self {
        Self::placeholder(source_name, NO_LISTINGS_FOUND)
    }

    pub fn failure(source_name: &str, diagnostic: impl std::fmt::Display) -> Self {
        Self::placeholder(source_name, &format!("Error: {}", diagnostic))
    }

    pub fn with_detail_url(mut self, detail_url: String) -> Self {
        self.detail_url = Some(detail_url);
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_empty()
            && self.numeric_price == 0.0
            && self.display_price == PLACEHOLDER_PRICE
            && self.detail_url.is_none()
    }

    pub fn has_usable_price(&self) -> bool {
        self.numeric_price.is_finite()
    }
}

// Picks the listing with the lowest usable price. Ties keep the first one seen.
pub fn select_cheapest<I>(listings: I) -> Option<Listing>
where
    I: IntoIterator<Item = Listing>,
{
    listings
        .into_iter()
        .filter(Listing::has_usable_price)
        .fold(None, |best: Option<Listing>, candidate| match best {
            Some(current) if current.numeric_price <= candidate.numeric_price => Some(current),
            _ => Some(candidate),
        })
}

/// Per-source result, keyed by label (currently only `cheapest`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SourceResult {
    entries: BTreeMap<String, Listing>,
}

impl SourceResult {
    pub fn cheapest(listing: Listing) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(CHEAPEST.to_string(), listing);
        Self { entries }
    }

    pub fn get(&self, label: &str) -> Option<&Listing> {
        self.entries.get(label)
    }

    pub fn cheapest_listing(&self) -> Option<&Listing> {
        self.get(CHEAPEST)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Results of one search, keyed by source name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AggregatedResult {
    sources: BTreeMap<String, SourceResult>,
}

impl AggregatedResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_name: impl Into<String>, result: SourceResult) {
        self.sources.insert(source_name.into(), result);
    }

    pub fn get(&self, source_name: &str) -> Option<&SourceResult> {
        self.sources.get(source_name)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    // Cross-source reduction over genuine listings only.
    pub fn global_cheapest(&self) -> Option<&Listing> {
        self.sources
            .values()
            .filter_map(SourceResult::cheapest_listing)
            .filter(|listing| !listing.is_placeholder() && listing.has_usable_price())
            .fold(None, |best: Option<&Listing>, candidate| match best {
                Some(current) if current.numeric_price <= candidate.numeric_price => Some(current),
                _ => Some(candidate),
            })
    }
}
