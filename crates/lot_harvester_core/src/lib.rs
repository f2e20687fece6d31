//! Lot harvester core: data model and the pure harvest state machine.
mod effect;
mod identifier;
mod msg;
mod record;
mod state;
mod summary;
mod update;

pub use effect::Effect;
pub use identifier::{IdRange, Identifier, RangeError, DEFAULT_ID_WIDTH};
pub use msg::Msg;
pub use record::{
    AttemptOutcome, Batch, FieldSchema, FieldValues, Record, RecordStatus, IDENTIFIER_COLUMN,
    OUTCOME_COLUMN,
};
pub use state::{HarvestState, Phase};
pub use summary::{CheckpointReport, PendingUpload, RunSummary, UploadStatus};
pub use update::update;
