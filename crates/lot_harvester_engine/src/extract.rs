use std::time::Duration;

use harvest_logging::harvest_debug;
use lot_harvester_core::FieldValues;

use crate::{ClientError, Locator, RenderingClient};

pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(FieldValues),
    NotFound,
}

/// Finds the details table with an ordered list of locators.
///
/// The first locator that yields an element with visible text wins; lower
/// ranked locators are not consulted after that, even if the winner holds
/// no label/value rows. Lookup errors and timeouts only disqualify the
/// locator that hit them.
#[derive(Debug, Clone)]
pub struct Extractor {
    strategies: Vec<Locator>,
    strategy_timeout: Duration,
}

impl Extractor {
    pub fn new(strategies: Vec<Locator>, strategy_timeout: Duration) -> Self {
        Self {
            strategies,
            strategy_timeout,
        }
    }

    /// Locators for the work-permit details table: by container id, by CSS
    /// path, then any table mentioning a passport number.
    pub fn permit_details() -> Self {
        Self::new(
            vec![
                Locator::Id("PassportMainshowTable".to_string()),
                Locator::Css("#PassportMainshowTable table".to_string()),
                Locator::ContainsText {
                    css: "table".to_string(),
                    text: "PassportNo".to_string(),
                },
            ],
            DEFAULT_STRATEGY_TIMEOUT,
        )
    }

    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    pub async fn extract(&self, client: &mut dyn RenderingClient) -> Extraction {
        for locator in &self.strategies {
            let attempt = tokio::time::timeout(self.strategy_timeout, lookup(client, locator));
            match attempt.await {
                Ok(Ok(Some(rows))) => {
                    let pairs = label_value_pairs(rows);
                    harvest_debug!("{} matched with {} label rows", locator, pairs.len());
                    return if pairs.is_empty() {
                        Extraction::NotFound
                    } else {
                        Extraction::Found(pairs)
                    };
                }
                Ok(Ok(None)) => harvest_debug!("{} matched nothing", locator),
                Ok(Err(err)) => harvest_debug!("{} failed: {}", locator, err),
                Err(_) => harvest_debug!(
                    "{} timed out after {:?}",
                    locator,
                    self.strategy_timeout
                ),
            }
        }
        Extraction::NotFound
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::permit_details()
    }
}

async fn lookup(
    client: &mut dyn RenderingClient,
    locator: &Locator,
) -> Result<Option<Vec<Vec<String>>>, ClientError> {
    let Some(node) = client.locate(locator).await? else {
        return Ok(None);
    };
    if client.read_text(node).await?.trim().is_empty() {
        return Ok(None);
    }
    client.read_rows(node).await.map(Some)
}

fn label_value_pairs(rows: Vec<Vec<String>>) -> FieldValues {
    rows.into_iter()
        .filter(|cells| cells.len() >= 2)
        .filter_map(|mut cells| {
            let value = cells.swap_remove(1);
            let label = cells.swap_remove(0);
            let label = label.trim();
            if label.is_empty() {
                None
            } else {
                Some((label.to_string(), value.trim().to_string()))
            }
        })
        .collect()
}
