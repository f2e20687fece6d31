use crate::{AttemptOutcome, CheckpointReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Begin harvesting the configured range.
    Start,
    /// The fetcher finished the identifier it was asked for.
    UnitFinished(AttemptOutcome),
    /// The mandatory inter-request pause is over.
    ThrottleElapsed,
    /// The checkpointer finished flushing the batch it was handed.
    CheckpointFinished(CheckpointReport),
    /// Stop issuing fetches; drain what has been collected.
    CancelRequested,
}
