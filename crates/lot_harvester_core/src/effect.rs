use crate::{Batch, Identifier, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchUnit(Identifier),
    Throttle,
    /// Flush `batch`; `index` counts checkpoints issued in this run from 0.
    Checkpoint { index: u64, batch: Batch },
    Finished(RunSummary),
}
