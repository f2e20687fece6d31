use std::time::Duration;

use harvest_logging::{harvest_debug, harvest_warn};
use lot_harvester_core::{AttemptOutcome, FieldSchema, Identifier, Record};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clock::Sleeper;
use crate::extract::{Extraction, Extractor};
use crate::{ClientError, ClientErrorKind, RenderingClient};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

/// How an identifier reaches the target form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationMode {
    /// `GET {endpoint}?{param}={token}`.
    Query { param: String },
    /// Load the endpoint, type the token into `field_id` and submit.
    Form {
        field_id: String,
        trigger_id: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TargetSite {
    pub endpoint: Url,
    pub mode: NavigationMode,
    pub id_width: usize,
}

impl TargetSite {
    pub fn query_url(&self, param: &str, id: Identifier) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(param, &id.token(self.id_width));
        url
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Delays never shrink: a factor below 1 or not finite falls back to a
    /// fixed delay.
    pub fn new(max_attempts: u32, retry_delay: Duration, backoff_factor: f64) -> Self {
        let backoff_factor = if backoff_factor.is_finite() && backoff_factor >= 1.0 {
            backoff_factor
        } else {
            1.0
        };
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            backoff_factor,
        }
    }

    /// Pause after the `failed_attempt`-th attempt (1-based) failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.retry_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5), 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Upper bound on waiting for the document after each navigation.
    pub ready_timeout: Duration,
    /// Pause after the result page is ready, before extraction.
    pub settle_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(20),
            settle_delay: Duration::ZERO,
        }
    }
}

/// Runs the navigate, extract and retry cycle for one identifier.
pub struct UnitFetcher {
    site: TargetSite,
    extractor: Extractor,
    schema: FieldSchema,
    settings: FetchSettings,
}

impl UnitFetcher {
    pub fn new(
        site: TargetSite,
        extractor: Extractor,
        schema: FieldSchema,
        settings: FetchSettings,
    ) -> Self {
        Self {
            site,
            extractor,
            schema,
            settings,
        }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Never fails: every fault is folded into the returned outcome.
    pub async fn fetch(
        &self,
        client: &mut dyn RenderingClient,
        sleeper: &dyn Sleeper,
        id: Identifier,
        policy: &RetryPolicy,
    ) -> AttemptOutcome {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(client, sleeper, id).await {
                Ok(Extraction::Found(pairs)) => {
                    let record = Record::from_pairs(id, &self.schema, pairs);
                    if record.values.iter().all(String::is_empty) {
                        harvest_debug!("{} matched no known field", id);
                        return AttemptOutcome::NotFound(id);
                    }
                    return AttemptOutcome::Success(record);
                }
                Ok(Extraction::NotFound) => return AttemptOutcome::NotFound(id),
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        harvest_warn!("{} gave up after {} attempts: {}", id, attempt, err);
                        return AttemptOutcome::Transient(id, err.to_string());
                    }
                    let delay = policy.delay_after(attempt);
                    harvest_debug!(
                        "{} attempt {}/{} failed ({}); retrying in {:?}",
                        id,
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return AttemptOutcome::Fatal(id, err.to_string()),
            }
        }
    }

    async fn attempt(
        &self,
        client: &mut dyn RenderingClient,
        sleeper: &dyn Sleeper,
        id: Identifier,
    ) -> Result<Extraction, ClientError> {
        match &self.site.mode {
            NavigationMode::Query { param } => {
                let url = self.site.query_url(param, id);
                client.navigate(url.as_str()).await?;
            }
            NavigationMode::Form {
                field_id,
                trigger_id,
            } => {
                client.navigate(self.site.endpoint.as_str()).await?;
                self.wait_ready(client).await?;
                client
                    .submit(field_id, &id.token(self.site.id_width), trigger_id.as_deref())
                    .await?;
            }
        }
        self.wait_ready(client).await?;
        if !self.settings.settle_delay.is_zero() {
            sleeper.sleep(self.settings.settle_delay).await;
        }
        Ok(self.extractor.extract(client).await)
    }

    async fn wait_ready(&self, client: &mut dyn RenderingClient) -> Result<(), ClientError> {
        let timeout = self.settings.ready_timeout;
        match tokio::time::timeout(timeout, client.wait_ready()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::new(
                ClientErrorKind::Timeout,
                format!("document not ready after {timeout:?}"),
            )),
        }
    }
}
