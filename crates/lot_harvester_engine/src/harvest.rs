use std::collections::VecDeque;
use std::time::Duration;

use harvest_logging::{harvest_debug, harvest_info, harvest_warn, set_current_lot};
use lot_harvester_core::{
    update, AttemptOutcome, Effect, HarvestState, IdRange, Msg, RangeError, RunSummary,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::Checkpointer;
use crate::client::{ClientFactory, RenderingClient};
use crate::clock::Sleeper;
use crate::fetch::{RetryPolicy, UnitFetcher};
use crate::ClientError;

/// Parameters of one run over `[start, end]`.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub start: u64,
    pub end: u64,
    pub batch_size: usize,
    pub inter_request_delay: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("could not start the rendering client: {0}")]
    ClientInit(ClientError),
}

/// Executes the core state machine's effects one at a time.
pub struct HarvestLoop {
    factory: Box<dyn ClientFactory>,
    fetcher: UnitFetcher,
    checkpointer: Checkpointer,
    sleeper: Box<dyn Sleeper>,
    cancel: CancellationToken,
}

impl HarvestLoop {
    pub fn new(
        factory: Box<dyn ClientFactory>,
        fetcher: UnitFetcher,
        checkpointer: Checkpointer,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            factory,
            fetcher,
            checkpointer,
            sleeper,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling `cancel` stops the run after the identifier in flight;
    /// collected records are still flushed.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Only an invalid range or a client that cannot be opened fails the
    /// run; every per-identifier fault ends up in the summary.
    pub async fn run(&self, request: &HarvestRequest) -> Result<RunSummary, HarvestError> {
        let range = IdRange::new(request.start, request.end)?;
        let mut client = self
            .factory
            .open()
            .await
            .map_err(HarvestError::ClientInit)?;
        harvest_info!(
            "harvesting {} ({} identifiers, batches of {})",
            range,
            range.len(),
            request.batch_size.max(1)
        );

        let summary = self.drive(range, client.as_mut(), request).await;

        if let Err(err) = client.close().await {
            harvest_warn!("closing the rendering client failed: {}", err);
        }
        set_current_lot(0);
        harvest_info!(
            "run finished: {} attempted, {} succeeded, {} not found, {} failed, {} checkpoints{}",
            summary.attempted,
            summary.succeeded,
            summary.not_found,
            summary.failed(),
            summary.checkpoints,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }

    async fn drive(
        &self,
        range: IdRange,
        client: &mut dyn RenderingClient,
        request: &HarvestRequest,
    ) -> RunSummary {
        let state = HarvestState::new(range, request.batch_size, self.fetcher.schema().clone());
        let mut cancel_sent = false;
        let mut queue = VecDeque::new();
        let mut state = self.dispatch(state, Msg::Start, &mut cancel_sent, &mut queue);

        while let Some(effect) = queue.pop_front() {
            let msg = match effect {
                Effect::FetchUnit(id) => {
                    set_current_lot(id.value());
                    let outcome = self
                        .fetcher
                        .fetch(client, self.sleeper.as_ref(), id, &request.retry)
                        .await;
                    log_outcome(&outcome);
                    Msg::UnitFinished(outcome)
                }
                Effect::Throttle => {
                    self.throttle(request.inter_request_delay).await;
                    Msg::ThrottleElapsed
                }
                Effect::Checkpoint { index, batch } => {
                    Msg::CheckpointFinished(self.checkpointer.flush(index, batch).await)
                }
                Effect::Finished(summary) => return summary,
            };
            state = self.dispatch(state, msg, &mut cancel_sent, &mut queue);
        }

        harvest_warn!("effect queue ran dry before the run finished");
        state.summary().clone()
    }

    /// Feeds `msg` to the state machine, preceded by a one-time cancel
    /// request once the token has fired.
    fn dispatch(
        &self,
        mut state: HarvestState,
        msg: Msg,
        cancel_sent: &mut bool,
        queue: &mut VecDeque<Effect>,
    ) -> HarvestState {
        if !*cancel_sent && self.cancel.is_cancelled() {
            *cancel_sent = true;
            harvest_info!("cancellation requested; draining collected records");
            let (next, effects) = update(state, Msg::CancelRequested);
            state = next;
            queue.extend(effects);
        }
        let (next, effects) = update(state, msg);
        queue.extend(effects);
        next
    }

    async fn throttle(&self, delay: Duration) {
        if self.cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.sleeper.sleep(delay) => {}
            _ = self.cancel.cancelled() => harvest_debug!("throttle interrupted by cancellation"),
        }
    }
}

fn log_outcome(outcome: &AttemptOutcome) {
    match outcome {
        AttemptOutcome::Success(record) => {
            let filled = record.values.iter().filter(|v| !v.is_empty()).count();
            harvest_info!("{}: scraped {} fields", record.identifier, filled);
        }
        AttemptOutcome::NotFound(id) => harvest_info!("{}: no details found", id),
        AttemptOutcome::Transient(id, cause) => harvest_warn!("{}: gave up: {}", id, cause),
        AttemptOutcome::Fatal(id, cause) => harvest_warn!("{}: unexpected error: {}", id, cause),
    }
}
