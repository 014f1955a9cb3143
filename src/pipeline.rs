// Extraction waterfall: ordered strategies over one fetched document, first
// non-empty result wins.

use crate::document::Document;
use crate::error::ExtractionError;
use crate::listing::Listing;
use tracing::{debug, warn};

pub type StrategyFn =
    Box<dyn Fn(&Document) -> Result<Vec<Listing>, ExtractionError> + Send + Sync>;

pub struct Strategy {
    name: &'static str,
    run: StrategyFn,
}

impl Strategy {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn(&Document) -> Result<Vec<Listing>, ExtractionError> + Send + Sync + 'static,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

// What one strategy did with the document.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub outcome: Result<usize, ExtractionError>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub listings: Vec<Listing>,
    // Strategy that produced `listings`, if any did
    pub strategy: Option<&'static str>,
    pub attempts: Vec<StrategyAttempt>,
}

pub struct ExtractionPipeline {
    source_name: String,
    strategies: Vec<Strategy>,
}

impl ExtractionPipeline {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(Strategy::name).collect()
    }

    pub fn extract(&self, body: &str) -> Extraction {
        self.extract_document(&Document::parse(body))
    }

    /// Runs strategies in order. A failing strategy counts as zero listings;
    /// the failure is logged and the next strategy gets its turn.
    pub fn extract_document(&self, document: &Document) -> Extraction {
        let mut extraction = Extraction::default();

        for strategy in &self.strategies {
            match (strategy.run)(document) {
                Ok(listings) if !listings.is_empty() => {
                    debug!(
                        source = %self.source_name,
                        strategy = strategy.name,
                        count = listings.len(),
                        "extraction strategy succeeded"
                    );
                    extraction.attempts.push(StrategyAttempt {
                        strategy: strategy.name,
                        outcome: Ok(listings.len()),
                    });
                    extraction.listings = listings;
                    extraction.strategy = Some(strategy.name);
                    return extraction;
                }
                Ok(_) => {
                    debug!(
                        source = %self.source_name,
                        strategy = strategy.name,
                        "extraction strategy found no listings"
                    );
                    extraction.attempts.push(StrategyAttempt {
                        strategy: strategy.name,
                        outcome: Ok(0),
                    });
                }
                Err(err) => {
                    warn!(
                        source = %self.source_name,
                        strategy = strategy.name,
                        error = %err,
                        "extraction strategy failed"
                    );
                    extraction.attempts.push(StrategyAttempt {
                        strategy: strategy.name,
                        outcome: Err(err),
                    });
                }
            }
        }

        extraction
    }
}
