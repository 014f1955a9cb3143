// Booking adapter
//
// Result pages carry an Apollo cache dump in a `data-capla-store-data` script.
// Property cards live in the first object holding a `results` array; the card
// link is only present in the markup, so the detail URL comes from a second
// pass over the same page.

use super::{fetch_pages, Harvest, SourceAdapter};
use crate::document::{first_attr, first_text, parse_json_block, Document};
use crate::error::{AdapterError, ExtractionError};
use crate::fetcher::Fetcher;
use crate::listing::Listing;
use crate::pipeline::{ExtractionPipeline, Strategy};
use crate::price::{
    currency_symbol, extract_tax_amount, format_price, parse_price, PricingPolicy,
};
use crate::request::{PropertyType, SearchRequest};
use crate::tree::{find_first_matching, get_path, text_at};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::debug;
use url::Url;

pub const SOURCE_NAME: &str = "booking";

const APOLLO_ATTRIBUTE: &str = "data-capla-store-data";
const APOLLO_VALUE: &str = "apollo";
const PROPERTY_MARKER: &str = "basicPropertyData";
const POOL_FACILITY: &str = "hotelfacility=433";

const CARD_SELECTOR: &str = r#"[data-testid="property-card"]"#;
const CARD_TITLE_SELECTOR: &str = r#"[data-testid="title"]"#;
const CARD_PRICE_SELECTOR: &str = r#"[data-testid="price-and-discounted-price"]"#;
const CARD_SCORE_SELECTOR: &str = r#"[data-testid="review-score"] > div:first-child"#;
const CARD_IMAGE_SELECTOR: &str = r#"img[data-testid="image"]"#;
const CARD_LINK_SELECTOR: &str = r#"a[data-testid="title-link"]"#;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BookingConfig {
    pub base_url: String,
    pub affiliate_id: String,
    // Prefix for relative photo URLs
    pub image_host: String,
    pub currency: String,
    pub language: String,
    pub pricing: PricingPolicy,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.booking.com/searchresults.html".to_string(),
            affiliate_id: "817353".to_string(),
            image_host: "https://cf.bstatic.com".to_string(),
            currency: "EUR".to_string(),
            language: "en-us".to_string(),
            pricing: PricingPolicy::default(),
        }
    }
}

pub fn property_type_filter(property_type: &PropertyType) -> Option<&'static str> {
    match property_type {
        PropertyType::Apartment => Some("ht_id=201"),
        PropertyType::Guesthouse => Some("ht_id=216"),
        PropertyType::Hotel => Some("ht_id=204"),
        PropertyType::House => Some("privacy_type=3"),
        PropertyType::Other(_) => None,
    }
}

pub struct BookingAdapter {
    fetcher: Arc<dyn Fetcher>,
    config: Arc<BookingConfig>,
    pipeline: ExtractionPipeline,
}

impl BookingAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: BookingConfig) -> Self {
        let config = Arc::new(config);
        let pipeline = build_pipeline(&config);
        Self {
            fetcher,
            config,
            pipeline,
        }
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    pub fn search_url(&self, request: &SearchRequest) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.config.base_url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("aid", &self.config.affiliate_id)
                .append_pair("ss", request.destination.trim())
                .append_pair("lang", &self.config.language)
                .append_pair("checkin", &request.dates.check_in.to_string())
                .append_pair("checkout", &request.dates.check_out.to_string())
                .append_pair("group_adults", &request.occupancy.adults.to_string())
                .append_pair("no_rooms", "1")
                .append_pair("group_children", &request.occupancy.children.to_string());

            for age in &request.occupancy.child_ages {
                query.append_pair("age", &age.to_string());
            }

            let filters = nflt_filters(request);
            if !filters.is_empty() {
                query.append_pair("nflt", &filters.join(";"));
            }

            query
                .append_pair("selected_currency", &self.config.currency)
                .append_pair("ucfs", "1")
                .append_pair("arphpl", "1");
        }
        Ok(url)
    }

    pub fn extract(&self, body: &str) -> Vec<Listing> {
        self.pipeline.extract(body).listings
    }
}

fn nflt_filters(request: &SearchRequest) -> Vec<String> {
    let mut filters = Vec::new();
    if request.pool {
        filters.push(POOL_FACILITY.to_string());
    }
    if request.bedrooms > 0 {
        filters.push(format!("entire_place_bedroom_count={}", request.bedrooms));
    }
    if request.bathrooms > 0 {
        filters.push(format!("min_bathrooms={}", request.bathrooms));
    }
    for filter in request.property_types.iter().filter_map(property_type_filter) {
        if !filters.iter().any(|existing| existing == filter) {
            filters.push(filter.to_string());
        }
    }
    filters
}

#[async_trait]
impl SourceAdapter for BookingAdapter {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn collect(&self, request: &SearchRequest) -> Result<Harvest, AdapterError> {
        let urls = vec![self.search_url(request)?.to_string()];
        let pages = fetch_pages(self.fetcher.as_ref(), SOURCE_NAME, &urls, &[]).await?;

        let listings: Vec<Listing> = pages.iter().flat_map(|page| self.extract(page)).collect();
        debug!(source = SOURCE_NAME, listings = listings.len(), "collected listings");

        Ok(Harvest { listings, pages })
    }
}

fn build_pipeline(config: &Arc<BookingConfig>) -> ExtractionPipeline {
    let primary = Arc::clone(config);
    let secondary = Arc::clone(config);
    let dom = Arc::clone(config);

    ExtractionPipeline::new(SOURCE_NAME)
        .with_strategy(Strategy::new("apollo_store", move |doc: &Document| {
            let store = doc.script_json_by_attribute(APOLLO_ATTRIBUTE, APOLLO_VALUE)?;
            result_listings(&store, &primary)
        }))
        .with_strategy(Strategy::new("property_data_scan", move |doc: &Document| {
            let mut last_error = None;
            for script in doc.scripts_containing(PROPERTY_MARKER)? {
                match parse_json_block(&script).and_then(|data| result_listings(&data, &secondary)) {
                    Ok(listings) if !listings.is_empty() => return Ok(listings),
                    Ok(_) => {}
                    Err(err) => last_error = Some(err),
                }
            }
            last_error.map_or(Ok(Vec::new()), Err)
        }))
        .with_strategy(Strategy::new("property_cards", move |doc: &Document| {
            card_listings(doc, &dom)
        }))
}

fn result_listings(data: &Value, config: &BookingConfig) -> Result<Vec<Listing>, ExtractionError> {
    let holder = find_first_matching(data, &|node: &Map<String, Value>| {
        node.get("results").map_or(false, Value::is_array)
    })
    .ok_or_else(|| ExtractionError::MissingField("results".to_string()))?;

    Ok(holder
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|result| property_listing(result, config))
        .collect())
}

fn property_listing(result: &Value, config: &BookingConfig) -> Option<Listing> {
    let property = result.get(PROPERTY_MARKER)?;
    let price_info = get_path(result, &["priceDisplayInfoIrene", "displayPrice", "amountPerStay"]);
    let amount_text = price_info.and_then(|info| text_at(info, &["amount"])).unwrap_or_default();

    let base_amount = price_info
        .and_then(|info| info.get("amountUnformatted"))
        .and_then(|amount| match amount {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => Some(parse_price(Some(text.as_str()))),
            _ => None,
        })
        .unwrap_or_else(|| parse_price(Some(amount_text.as_str())));
    let numeric_price = config.pricing.apply(base_amount + tax_amount(result));

    let display_price = if numeric_price.is_finite() {
        format_price(currency_symbol(&amount_text), numeric_price)
    } else {
        amount_text
    };
    let name = text_at(result, &["displayName", "text"]).unwrap_or_default();

    Some(Listing {
        id: text_at(property, &["id"]).unwrap_or_default(),
        listing_type: None,
        title: name.clone(),
        name,
        rating_text: rating_text(
            text_at(property, &["reviews", "totalScore"]).as_deref(),
            text_at(property, &["reviews", "reviewsCount"]).as_deref(),
        ),
        display_price,
        numeric_price,
        image_url: text_at(property, &["photos", "main", "highResUrl", "relativeUrl"])
            .map(|relative| image_url(&config.image_host, &relative))
            .unwrap_or_default(),
        source_name: SOURCE_NAME.to_string(),
        detail_url: None,
    })
}

// Taxes are only quoted in a free-text note under the first `chargesInfo`.
fn tax_amount(result: &Value) -> f64 {
    let charges = find_first_matching(result, &|node: &Map<String, Value>| {
        node.contains_key("chargesInfo")
    })
    .and_then(|node| node.get("chargesInfo"));

    extract_tax_amount(
        charges
            .and_then(|charges| charges.get("translation"))
            .and_then(Value::as_str),
    )
}

pub fn rating_text(score: Option<&str>, review_count: Option<&str>) -> String {
    format!(
        "{} ({})",
        score.map_or_else(|| "0,0".to_string(), |score| score.replace('.', ",")),
        review_count.unwrap_or("0")
    )
}

/// Absolute photo URL with the size segment (`max500`, `max1024x768`, ...)
/// rewritten to `max800`.
pub fn image_url(host: &str, relative: &str) -> String {
    static SIZE_SEGMENT: OnceLock<Option<Regex>> = OnceLock::new();
    let resized = SIZE_SEGMENT
        .get_or_init(|| Regex::new(r"max[^/]+").ok())
        .as_ref()
        .map(|size| size.replace_all(relative, "max800").into_owned())
        .unwrap_or_else(|| relative.to_string());
    format!("{}{}", host.trim_end_matches('/'), resized)
}

fn card_listings(doc: &Document, config: &BookingConfig) -> Result<Vec<Listing>, ExtractionError> {
    let listings = doc
        .select(CARD_SELECTOR)?
        .iter()
        .map(|card| {
            let name = first_text(card, CARD_TITLE_SELECTOR);
            let price_text = first_text(card, CARD_PRICE_SELECTOR);
            let numeric_price = config.pricing.apply(parse_price(Some(price_text.as_str())));
            let display_price = if numeric_price.is_finite() {
                format_price(currency_symbol(&price_text), numeric_price)
            } else {
                price_text
            };
            let score = first_text(card, CARD_SCORE_SELECTOR);
            let href = first_attr(card, CARD_LINK_SELECTOR, "href");

            Listing {
                id: card.value().attr("data-hotelid").unwrap_or_default().to_string(),
                listing_type: None,
                title: name.clone(),
                name,
                rating_text: rating_text((!score.is_empty()).then_some(score.as_str()), None),
                display_price,
                numeric_price,
                image_url: first_attr(card, CARD_IMAGE_SELECTOR, "src"),
                source_name: SOURCE_NAME.to_string(),
                detail_url: (!href.is_empty()).then_some(href),
            }
        })
        .collect();

    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::request;
    use crate::error::FetchError;
    use crate::fetcher::StaticFetcher;
    use crate::listing::NO_LISTINGS_FOUND;
    use serde_json::json;
    use test_case::test_case;

    fn result(id: &str, amount: f64, tax_note: Option<&str>) -> Value {
        let mut result = json!({
            "basicPropertyData": {
                "id": id.parse::<u64>().unwrap(),
                "reviews": {"totalScore": 8.5, "reviewsCount": 100},
                "photos": {"main": {"highResUrl": {
                    "relativeUrl": "/xdata/images/hotel/max500/12345.jpg?k=abc"
                }}}
            },
            "displayName": {"text": format!("Hotel {}", id)},
            "priceDisplayInfoIrene": {"displayPrice": {"amountPerStay": {
                "amount": format!("€ {}", amount),
                "amountUnformatted": amount
            }}}
        });
        if let Some(note) = tax_note {
            result["priceDisplayInfoIrene"]["chargesInfo"] = json!({"translation": note});
        }
        result
    }

    fn apollo_page(results: Vec<Value>, links: &str) -> String {
        let store = json!({
            "ROOT_QUERY": {"searchQueries": {"search({\"input\":{}})": {
                "__typename": "SearchQueryOutput",
                "results": results,
                "pagination": {"nbResultsTotal": 2}
            }}}
        });
        format!(
            r#"<html><head><script type="application/json" data-capla-store-data="apollo">{}</script></head><body>{}</body></html>"#,
            store, links
        )
    }

    fn adapter(fetcher: StaticFetcher) -> BookingAdapter {
        BookingAdapter::new(Arc::new(fetcher), BookingConfig::default())
    }

    #[test]
    fn test_search_url_parameters() {
        let adapter = adapter(StaticFetcher::new());
        let mut req = request();
        req.occupancy.children = 2;
        req.occupancy.child_ages = vec![4, 9];
        req.property_types = vec![
            PropertyType::Apartment,
            PropertyType::House,
            PropertyType::Other("boat".to_string()),
        ];
        req.bedrooms = 2;
        req.bathrooms = 1;
        req.pool = true;

        let url = adapter.search_url(&req).unwrap();
        assert_eq!(url.path(), "/searchresults.html");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let value = |key: &str| -> Vec<String> {
            pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
        };
        assert_eq!(pairs[0], ("aid".to_string(), "817353".to_string()));
        assert_eq!(value("ss"), vec!["Valencia"]);
        assert_eq!(value("checkin"), vec!["2025-04-20"]);
        assert_eq!(value("group_adults"), vec!["2"]);
        assert_eq!(value("group_children"), vec!["2"]);
        assert_eq!(value("no_rooms"), vec!["1"]);
        assert_eq!(value("age"), vec!["4", "9"]);
        assert_eq!(
            value("nflt"),
            vec!["hotelfacility=433;entire_place_bedroom_count=2;min_bathrooms=1;ht_id=201;privacy_type=3"]
        );
        assert_eq!(value("selected_currency"), vec!["EUR"]);
    }

    #[test]
    fn test_search_url_without_filters() {
        let adapter = adapter(StaticFetcher::new());
        let url = adapter.search_url(&request()).unwrap();
        assert!(url.query_pairs().all(|(key, _)| key != "nflt" && key != "age"));
    }

    #[test_case(Some("8.5"), Some("100"), "8,5 (100)"; "score and count")]
    #[test_case(None, Some("3"), "0,0 (3)"; "missing score")]
    #[test_case(Some("9"), None, "9 (0)"; "missing count")]
    fn test_rating_text(score: Option<&str>, count: Option<&str>, expected: &str) {
        assert_eq!(rating_text(score, count), expected);
    }

    #[test]
    fn test_image_url_is_resized() {
        assert_eq!(
            image_url("https://cf.bstatic.com", "/xdata/images/hotel/max1024x768/1.jpg?k=a"),
            "https://cf.bstatic.com/xdata/images/hotel/max800/1.jpg?k=a"
        );
        assert_eq!(image_url("https://cf.bstatic.com/", "/a.jpg"), "https://cf.bstatic.com/a.jpg");
    }

    #[test]
    fn test_apollo_store_extraction() {
        let adapter = adapter(StaticFetcher::new());
        let page = apollo_page(
            vec![
                result("111", 100.0, Some("+€15 taxes and charges")),
                result("222", 120.0, None),
                json!({"__typename": "Advertisement"}),
            ],
            "",
        );

        let extraction = adapter.pipeline.extract(&page);
        assert_eq!(extraction.strategy, Some("apollo_store"));
        assert_eq!(extraction.listings.len(), 2);

        let first = &extraction.listings[0];
        assert_eq!(first.id, "111");
        assert_eq!(first.name, "Hotel 111");
        assert_eq!(first.numeric_price, 97.75);
        assert_eq!(first.display_price, "€97.75");
        assert_eq!(first.rating_text, "8,5 (100)");
        assert_eq!(
            first.image_url,
            "https://cf.bstatic.com/xdata/images/hotel/max800/12345.jpg?k=abc"
        );
        assert_eq!(extraction.listings[1].numeric_price, 102.0);
    }

    #[test]
    fn test_missing_amount_falls_back_to_display_text() {
        let adapter = adapter(StaticFetcher::new());
        let mut priced_by_text = result("333", 0.0, None);
        priced_by_text["priceDisplayInfoIrene"]["displayPrice"]["amountPerStay"] =
            json!({"amount": "€ 1.200"});
        let mut unpriced = result("444", 0.0, None);
        unpriced["priceDisplayInfoIrene"] = json!({});

        let listings = adapter.extract(&apollo_page(vec![priced_by_text, unpriced], ""));
        assert_eq!(listings[0].numeric_price, 1020.0);
        assert_eq!(listings[1].numeric_price, f64::INFINITY);
        assert_eq!(listings[1].display_price, "");
    }

    #[test]
    fn test_property_data_scan_fallback() {
        let adapter = adapter(StaticFetcher::new());
        let data = json!({"props": {"results": [result("555", 200.0, None)]}});
        let page = format!(
            r#"<html><head>
                <script data-capla-store-data="apollo">{{"ROOT_QUERY": {{}}}}</script>
                <script>window.basicPropertyData = null;</script>
                <script type="application/json">{}</script>
            </head></html>"#,
            data
        );

        let extraction = adapter.pipeline.extract(&page);
        assert_eq!(extraction.strategy, Some("property_data_scan"));
        assert_eq!(extraction.listings[0].id, "555");
        assert_eq!(extraction.listings[0].numeric_price, 170.0);
    }

    #[test]
    fn test_property_card_fallback() {
        let adapter = adapter(StaticFetcher::new());
        let page = r#"<html><body>
            <div data-testid="property-card" data-hotelid="987">
              <img data-testid="image" src="https://cf.bstatic.com/img/987.jpg">
              <a data-testid="title-link" href="https://www.booking.com/hotel/es/casa-987.html">
                <div data-testid="title">Casa Azul</div>
              </a>
              <div data-testid="review-score"><div>8.9</div><div>Fabulous</div></div>
              <span data-testid="price-and-discounted-price">€ 1.050</span>
            </div>
        </body></html>"#;

        let extraction = adapter.pipeline.extract(page);
        assert_eq!(extraction.strategy, Some("property_cards"));

        let card = &extraction.listings[0];
        assert_eq!(card.id, "987");
        assert_eq!(card.name, "Casa Azul");
        assert_eq!(card.rating_text, "8,9 (0)");
        assert_eq!(card.numeric_price, 892.5);
        assert_eq!(card.display_price, "€892.50");
        assert_eq!(
            card.detail_url.as_deref(),
            Some("https://www.booking.com/hotel/es/casa-987.html")
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let adapter = adapter(StaticFetcher::new());
        let page = apollo_page(vec![result("1", 99.0, Some("€ 7 tax")), result("2", 98.0, None)], "");
        assert_eq!(adapter.extract(&page), adapter.extract(&page));
    }

    #[tokio::test]
    async fn test_search_attaches_detail_link() {
        let url_builder = adapter(StaticFetcher::new());
        let url = url_builder.search_url(&request()).unwrap().to_string();
        let links = r#"
            <a href="/hotel/es/other.html?hotel_id=111">Hotel 111</a>
            <a href="/hotel/es/cheap.html?hotel_id=222">Hotel 222</a>
        "#;
        let fetcher = StaticFetcher::new().with_document(
            url,
            apollo_page(vec![result("111", 150.0, None), result("222", 95.5, None)], links),
        );
        let adapter = adapter(fetcher);

        let result = adapter.search(&request()).await;
        let cheapest = result.cheapest_listing().unwrap();
        assert_eq!(cheapest.id, "222");
        assert_eq!(cheapest.numeric_price, 81.18);
        assert_eq!(cheapest.display_price, "€81.18");
        assert_eq!(
            cheapest.detail_url.as_deref(),
            Some("/hotel/es/cheap.html?hotel_id=222")
        );
    }

    #[tokio::test]
    async fn test_search_transport_failure_becomes_placeholder() {
        let adapter = adapter(StaticFetcher::failing(FetchError::Timeout(10_000)));

        let result = adapter.search(&request()).await;
        let cheapest = result.cheapest_listing().unwrap();
        assert_eq!(cheapest.name, "Error: Request timeout after 10000ms");
        assert_eq!(cheapest.numeric_price, 0.0);
        assert_eq!(cheapest.source_name, SOURCE_NAME);
    }

    #[tokio::test]
    async fn test_search_without_results() {
        let adapter = adapter(StaticFetcher::new().with_fallback_document(apollo_page(Vec::new(), "")));

        let result = adapter.search(&request()).await;
        assert_eq!(result.cheapest_listing().unwrap().name, NO_LISTINGS_FOUND);
    }
}
