// Markup query layer: embedded JSON blocks and CSS selection over one
// parsed HTML page.
//
// `scraper::Html` is not `Send`, so a `Document` is created and dropped inside
// synchronous extraction code and never held across an await point.

use crate::error::ExtractionError;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// JSON payload of `<script id="{id}">`.
    pub fn script_json_by_id(&self, id: &str) -> Result<Value, ExtractionError> {
        let css = format!(r#"script[id="{}"]"#, id);
        self.first_script_json(&css)
    }

    /// JSON payload of the first `<script {attribute}="{value}">`.
    pub fn script_json_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Value, ExtractionError> {
        let css = format!(r#"script[{}="{}"]"#, attribute, value);
        self.first_script_json(&css)
    }

    /// Raw text of every script block whose content mentions `marker`.
    pub fn scripts_containing(&self, marker: &str) -> Result<Vec<String>, ExtractionError> {
        let scripts = selector("script")?;
        Ok(self
            .html
            .select(&scripts)
            .map(|script| script.text().collect::<String>())
            .filter(|text| text.contains(marker))
            .collect())
    }

    pub fn select(&self, css: &str) -> Result<Vec<ElementRef<'_>>, ExtractionError> {
        let parsed = selector(css)?;
        Ok(self.html.select(&parsed).collect())
    }

    /// `href` of the first anchor whose link contains `needle`.
    pub fn link_containing(&self, needle: &str) -> Option<String> {
        if needle.is_empty() {
            return None;
        }
        let anchors = selector("a[href]").ok()?;
        self.html
            .select(&anchors)
            .filter_map(|anchor| anchor.value().attr("href"))
            .find(|href| href.contains(needle))
            .map(str::to_string)
    }

    fn first_script_json(&self, css: &str) -> Result<Value, ExtractionError> {
        let parsed = selector(css)?;
        let script = self
            .html
            .select(&parsed)
            .next()
            .ok_or_else(|| ExtractionError::MissingBlock(css.to_string()))?;
        parse_json_block(&script.text().collect::<String>())
    }
}

/// Parses a script body as JSON. Bodies that are not an object or array
/// (inline JavaScript, empty tags) are rejected up front.
pub fn parse_json_block(raw: &str) -> Result<Value, ExtractionError> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Err(ExtractionError::InvalidJson(
            "script body is not a JSON object or array".to_string(),
        ));
    }
    serde_json::from_str(trimmed).map_err(|e| ExtractionError::InvalidJson(e.to_string()))
}

pub fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::InvalidSelector(format!("{}: {}", css, e)))
}

// Element helpers for DOM fallbacks. Missing nodes read as empty strings.
pub fn first_text(element: &ElementRef<'_>, css: &str) -> String {
    selector(css)
        .ok()
        .and_then(|parsed| element.select(&parsed).next())
        .map(|node| node.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

pub fn first_attr(element: &ElementRef<'_>, css: &str, attribute: &str) -> String {
    selector(css)
        .ok()
        .and_then(|parsed| element.select(&parsed).next())
        .and_then(|node| node.value().attr(attribute))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
          <script id="state" type="application/json">{"a": {"b": 1}}</script>
          <script data-store="apollo" type="application/json">
            [1, 2, 3]
          </script>
          <script>window.__boot = {"marker": true};</script>
          <script type="application/json">{"marker": "json"}</script>
          <script id="broken" type="application/json">{"unterminated": </script>
        </head><body>
          <div class="card" data-id="42"><h3> Casa Azul </h3><img src="/img/1.jpg"></div>
          <a href="/rooms/999">other</a>
          <a href="https://example.com/hotel/es/casa.html?hotel_id=42">casa</a>
        </body></html>
    "#;

    #[test]
    fn test_script_json_by_id() {
        let doc = Document::parse(PAGE);
        let data = doc.script_json_by_id("state").unwrap();
        assert_eq!(data["a"]["b"], 1);
    }

    #[test]
    fn test_script_json_by_attribute() {
        let doc = Document::parse(PAGE);
        let data = doc.script_json_by_attribute("data-store", "apollo").unwrap();
        assert_eq!(data.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_missing_and_broken_blocks() {
        let doc = Document::parse(PAGE);
        assert!(matches!(
            doc.script_json_by_id("absent"),
            Err(ExtractionError::MissingBlock(_))
        ));
        assert!(matches!(
            doc.script_json_by_id("broken"),
            Err(ExtractionError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_scripts_containing_marker() {
        let doc = Document::parse(PAGE);
        let scripts = doc.scripts_containing("marker").unwrap();
        assert_eq!(scripts.len(), 2);
        assert!(parse_json_block(&scripts[0]).is_err());
        assert!(parse_json_block(&scripts[1]).is_ok());
    }

    #[test]
    fn test_select_and_element_helpers() {
        let doc = Document::parse(PAGE);
        let cards = doc.select("div.card").unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].value().attr("data-id"), Some("42"));
        assert_eq!(first_text(&cards[0], "h3"), "Casa Azul");
        assert_eq!(first_attr(&cards[0], "img", "src"), "/img/1.jpg");
        assert_eq!(first_text(&cards[0], ".missing"), "");
        assert!(doc.select("div[").is_err());
    }

    #[test]
    fn test_link_containing() {
        let doc = Document::parse(PAGE);
        assert_eq!(
            doc.link_containing("hotel_id=42").as_deref(),
            Some("https://example.com/hotel/es/casa.html?hotel_id=42")
        );
        assert_eq!(doc.link_containing("nope"), None);
        assert_eq!(doc.link_containing(""), None);
    }
}
