use crate::{Batch, Effect, FieldSchema, IdRange, Identifier, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Fetching(Identifier),
    Throttling,
    /// A full batch is being flushed; more identifiers follow.
    Checkpointing,
    /// The final partial batch is being flushed.
    Draining,
    Done,
}

/// State of one harvest run. Owns the accumulating batch exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestState {
    range: IdRange,
    batch_size: usize,
    schema: FieldSchema,
    phase: Phase,
    next: Option<Identifier>,
    batch: Batch,
    checkpoints_issued: u64,
    cancel_requested: bool,
    summary: RunSummary,
}

impl HarvestState {
    /// A zero batch size is treated as 1.
    pub fn new(range: IdRange, batch_size: usize, schema: FieldSchema) -> Self {
        Self {
            range,
            batch_size: batch_size.max(1),
            schema,
            phase: Phase::Idle,
            next: Some(range.start()),
            batch: Batch::new(),
            checkpoints_issued: 0,
            cancel_requested: false,
            summary: RunSummary::default(),
        }
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn pending_records(&self) -> usize {
        self.batch.len()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn summary_mut(&mut self) -> &mut RunSummary {
        &mut self.summary
    }

    pub(crate) fn batch_mut(&mut self) -> &mut Batch {
        &mut self.batch
    }

    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
        self.summary.cancelled = true;
    }

    pub(crate) fn set_next(&mut self, next: Option<Identifier>) {
        self.next = next;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn batch_full(&self) -> bool {
        self.batch.len() >= self.batch_size
    }

    /// Fetch the next identifier, or drain once the range is exhausted or a
    /// cancel was requested.
    pub(crate) fn fetch_next_or_drain(&mut self) -> Vec<Effect> {
        match self.next {
            Some(id) if !self.cancel_requested => {
                self.phase = Phase::Fetching(id);
                vec![Effect::FetchUnit(id)]
            }
            _ => self.drain(),
        }
    }

    pub(crate) fn checkpoint(&mut self, final_flush: bool) -> Vec<Effect> {
        let batch = std::mem::take(&mut self.batch);
        let index = self.checkpoints_issued;
        self.checkpoints_issued += 1;
        self.phase = if final_flush {
            Phase::Draining
        } else {
            Phase::Checkpointing
        };
        vec![Effect::Checkpoint { index, batch }]
    }

    pub(crate) fn drain(&mut self) -> Vec<Effect> {
        if self.batch.is_empty() {
            self.finish()
        } else {
            self.checkpoint(true)
        }
    }

    pub(crate) fn finish(&mut self) -> Vec<Effect> {
        self.phase = Phase::Done;
        vec![Effect::Finished(self.summary.clone())]
    }
}
