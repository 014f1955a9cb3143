// Airbnb adapter
//
// Search pages embed their results in a deferred-state JSON block under
// `niobeMinimalClientData`, a list of `[cache_key, payload]` pairs. Two pages
// are requested per search: the first results page and a cursor page that
// starts at a later offset.

use super::{fetch_pages, Harvest, SourceAdapter};
use crate::document::{first_attr, first_text, parse_json_block, Document};
use crate::error::{AdapterError, ExtractionError};
use crate::fetcher::Fetcher;
use crate::listing::Listing;
use crate::pipeline::{ExtractionPipeline, Strategy};
use crate::price::{currency_symbol, format_price, parse_price, PricingPolicy};
use crate::request::{PropertyType, SearchRequest};
use crate::tree::{find_nested, get_path, text_at};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub const SOURCE_NAME: &str = "airbnb";

const STATE_SCRIPT_ID: &str = "data-deferred-state-0";
const CLIENT_DATA_KEY: &str = "niobeMinimalClientData";
const SEARCH_RESULTS_PATH: [&str; 5] = ["data", "presentation", "staysSearch", "results", "searchResults"];
const STAY_RESULT_TYPENAME: &str = "StaySearchResult";
const POOL_AMENITY_ID: &str = "7";

const CARD_SELECTOR: &str = r#"[data-testid="card-container"]"#;
const CARD_TITLE_SELECTOR: &str = r#"[data-testid="listing-card-title"]"#;
const CARD_PRICE_SELECTOR: &str = r#"._1jo4hgw, [data-testid="price-availability-row"] span"#;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AirbnbConfig {
    pub base_url: String,
    // Opaque token for the second results page; `None` disables it
    pub cursor_token: Option<String>,
    pub pricing: PricingPolicy,
}

impl Default for AirbnbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.airbnb.es".to_string(),
            cursor_token: Some(
                "eyJzZWN0aW9uX29mZnNldCI6MCwiaXRlbXNfb2Zmc2V0IjoxOCwidmVyc2lvbiI6MX0=".to_string(),
            ),
            pricing: PricingPolicy::default(),
        }
    }
}

pub fn property_type_id(property_type: &PropertyType) -> Option<&'static str> {
    match property_type {
        PropertyType::House => Some("1"),
        PropertyType::Guesthouse => Some("2"),
        PropertyType::Apartment => Some("3"),
        PropertyType::Hotel => Some("4"),
        PropertyType::Other(_) => None,
    }
}

pub struct AirbnbAdapter {
    fetcher: Arc<dyn Fetcher>,
    config: Arc<AirbnbConfig>,
    pipeline: ExtractionPipeline,
}

impl AirbnbAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: AirbnbConfig) -> Self {
        let config = Arc::new(config);
        let pipeline = build_pipeline(&config);
        Self {
            fetcher,
            config,
            pipeline,
        }
    }

    pub fn config(&self) -> &AirbnbConfig {
        &self.config
    }

    pub fn search_url(&self, request: &SearchRequest) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                AdapterError::InvalidRequest(format!("not a base url: {}", self.config.base_url))
            })?
            .pop_if_empty()
            .extend(["s", request.destination.trim(), "homes"]);

        let mut filter_order = Vec::new();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("refinement_paths[]", "/homes")
                .append_pair("flexible_trip_lengths[]", "one_week")
                .append_pair("price_filter_input_type", "0")
                .append_pair("channel", "EXPLORE")
                .append_pair("source", "structured_search_input_header")
                .append_pair("search_type", "filter_change")
                .append_pair("search_mode", "regular_search")
                .append_pair("date_picker_type", "calendar")
                .append_pair("checkin", &request.dates.check_in.to_string())
                .append_pair("checkout", &request.dates.check_out.to_string())
                .append_pair("adults", &request.occupancy.adults.to_string());

            if request.occupancy.children > 0 {
                query.append_pair("children", &request.occupancy.children.to_string());
            }
            if request.occupancy.pets > 0 {
                query.append_pair("pets", &request.occupancy.pets.to_string());
            }

            let mut type_ids: Vec<&str> = Vec::new();
            for type_id in request.property_types.iter().filter_map(property_type_id) {
                if !type_ids.contains(&type_id) {
                    type_ids.push(type_id);
                }
            }
            for type_id in type_ids {
                query.append_pair("l2_property_type_ids[]", type_id);
                filter_order.push(format!("l2_property_type_ids:{}", type_id));
            }

            if request.bedrooms > 0 {
                query.append_pair("min_bedrooms", &request.bedrooms.to_string());
                filter_order.push(format!("min_bedrooms:{}", request.bedrooms));
            }
            if request.pool {
                query.append_pair("amenities[]", POOL_AMENITY_ID);
                filter_order.push(format!("amenities:{}", POOL_AMENITY_ID));
            }
            if request.bathrooms > 0 {
                query.append_pair("min_bathrooms", &request.bathrooms.to_string());
                filter_order.push(format!("min_bathrooms:{}", request.bathrooms));
            }
            for entry in &filter_order {
                query.append_pair("selected_filter_order[]", entry);
            }
        }

        Ok(url)
    }

    // The cursor is passed in explicitly; no page state is kept between calls.
    pub fn page_urls(&self, request: &SearchRequest) -> Result<Vec<String>, AdapterError> {
        let first_page = self.search_url(request)?;
        let mut urls = vec![first_page.to_string()];
        if let Some(cursor) = &self.config.cursor_token {
            urls.push(with_cursor(&first_page, cursor).to_string());
        }
        Ok(urls)
    }

    pub fn extract(&self, body: &str) -> Vec<Listing> {
        self.pipeline.extract(body).listings
    }
}

fn with_cursor(page: &Url, cursor: &str) -> Url {
    let mut url = page.clone();
    url.query_pairs_mut().append_pair("cursor", cursor);
    url
}

#[async_trait]
impl SourceAdapter for AirbnbAdapter {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn collect(&self, request: &SearchRequest) -> Result<Harvest, AdapterError> {
        let urls = self.page_urls(request)?;
        let pages = fetch_pages(self.fetcher.as_ref(), SOURCE_NAME, &urls, &[]).await?;

        let listings: Vec<Listing> = pages.iter().flat_map(|page| self.extract(page)).collect();
        debug!(
            source = SOURCE_NAME,
            pages = pages.len(),
            listings = listings.len(),
            "collected listings"
        );

        Ok(Harvest { listings, pages })
    }

    // Room pages are addressed by id, no second pass over the document needed.
    fn detail_url(&self, listing: &Listing, _pages: &[String]) -> Option<String> {
        if listing.id.is_empty() {
            return None;
        }
        Some(format!(
            "{}/rooms/{}",
            self.config.base_url.trim_end_matches('/'),
            listing.id
        ))
    }
}

fn build_pipeline(config: &Arc<AirbnbConfig>) -> ExtractionPipeline {
    let primary = Arc::clone(config);
    let secondary = Arc::clone(config);
    let dom = Arc::clone(config);

    ExtractionPipeline::new(SOURCE_NAME)
        .with_strategy(Strategy::new("deferred_state", move |doc: &Document| {
            let state = doc.script_json_by_id(STATE_SCRIPT_ID)?;
            client_data_listings(&state, &primary.pricing)
        }))
        .with_strategy(Strategy::new("client_data_scan", move |doc: &Document| {
            scan_client_data_scripts(doc, &secondary.pricing)
        }))
        .with_strategy(Strategy::new("card_markup", move |doc: &Document| {
            card_listings(doc, &dom)
        }))
}

fn scan_client_data_scripts(
    doc: &Document,
    pricing: &PricingPolicy,
) -> Result<Vec<Listing>, ExtractionError> {
    let mut last_error = None;
    for script in doc.scripts_containing(CLIENT_DATA_KEY)? {
        let parsed = parse_json_block(&script).and_then(|data| client_data_listings(&data, pricing));
        match parsed {
            Ok(listings) if !listings.is_empty() => return Ok(listings),
            Ok(_) => {}
            Err(err) => last_error = Some(err),
        }
    }

    match last_error {
        Some(err) => Err(err),
        None => Ok(Vec::new()),
    }
}

fn client_data_listings(
    data: &Value,
    pricing: &PricingPolicy,
) -> Result<Vec<Listing>, ExtractionError> {
    let entries = find_nested(data, &[CLIENT_DATA_KEY])
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractionError::MissingField(CLIENT_DATA_KEY.to_string()))?;

    let mut listings = Vec::new();
    for payload in entries
        .iter()
        .filter_map(Value::as_array)
        .filter_map(|entry| entry.get(1))
    {
        let results = get_path(payload, &SEARCH_RESULTS_PATH)
            .or_else(|| find_nested(payload, &SEARCH_RESULTS_PATH[2..]))
            .and_then(Value::as_array);

        for result in results.into_iter().flatten() {
            if result.get("__typename").and_then(Value::as_str) != Some(STAY_RESULT_TYPENAME) {
                continue;
            }
            match stay_listing(result, pricing) {
                Some(listing) => listings.push(listing),
                None => warn!(source = SOURCE_NAME, "listing or stay price missing in search result"),
            }
        }
    }

    Ok(listings)
}

// `secondaryLine` carries the stay total; `primaryLine` is a nightly rate and
// is not comparable with it.
fn stay_listing(result: &Value, pricing: &PricingPolicy) -> Option<Listing> {
    let listing = result.get("listing").filter(|listing| listing.is_object())?;
    let price_text = find_nested(result, &["secondaryLine", "price"]).and_then(Value::as_str)?;

    let (display_price, numeric_price) = priced(price_text, pricing);
    let image_url = result
        .get("contextualPictures")
        .and_then(Value::as_array)
        .and_then(|pictures| pictures.first())
        .and_then(|picture| text_at(picture, &["picture"]))
        .unwrap_or_default();

    Some(Listing {
        id: text_at(listing, &["id"]).unwrap_or_default(),
        listing_type: text_at(listing, &["listingObjType"]),
        name: text_at(listing, &["name"]).unwrap_or_default(),
        title: text_at(listing, &["title"]).unwrap_or_default(),
        rating_text: text_at(result, &["avgRatingLocalized"]).unwrap_or_else(|| "0.0".to_string()),
        display_price,
        numeric_price,
        image_url,
        source_name: SOURCE_NAME.to_string(),
        detail_url: None,
    })
}

fn card_listings(doc: &Document, config: &AirbnbConfig) -> Result<Vec<Listing>, ExtractionError> {
    let listings = doc
        .select(CARD_SELECTOR)?
        .iter()
        .map(|card| {
            let name = first_text(card, CARD_TITLE_SELECTOR);
            let price_text = first_text(card, CARD_PRICE_SELECTOR);
            let (display_price, numeric_price) = priced(&price_text, &config.pricing);
            let href = first_attr(card, "a", "href");

            Listing {
                id: card.value().attr("data-id").unwrap_or_default().to_string(),
                listing_type: None,
                title: name.clone(),
                name,
                rating_text: "0.0".to_string(),
                display_price,
                numeric_price,
                image_url: first_attr(card, "img", "src"),
                source_name: SOURCE_NAME.to_string(),
                detail_url: absolute_link(&config.base_url, &href),
            }
        })
        .collect();

    Ok(listings)
}

fn priced(price_text: &str, pricing: &PricingPolicy) -> (String, f64) {
    let numeric_price = pricing.apply(parse_price(Some(price_text)));
    let display_price = if numeric_price.is_finite() {
        format_price(currency_symbol(price_text), numeric_price)
    } else if price_text.is_empty() {
        "N/A".to_string()
    } else {
        price_text.to_string()
    };
    (display_price, numeric_price)
}

fn absolute_link(base_url: &str, href: &str) -> Option<String> {
    if href.is_empty() {
        None
    } else if href.starts_with("http") {
        Some(href.to_string())
    } else {
        Url::parse(base_url)
            .and_then(|base| base.join(href))
            .map(|url| url.to_string())
            .ok()
    }
}
