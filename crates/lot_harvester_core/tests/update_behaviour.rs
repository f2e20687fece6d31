use std::path::PathBuf;

use lot_harvester_core::{
    update, AttemptOutcome, Batch, CheckpointReport, Effect, FieldSchema, HarvestState, IdRange,
    Identifier, Msg, Phase, Record, RecordStatus, RunSummary, UploadStatus,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    harvest_logging::initialize_for_tests();
}

fn schema() -> FieldSchema {
    FieldSchema::new(["Name", "Country"])
}

fn new_state(start: u64, end: u64, batch_size: usize) -> HarvestState {
    HarvestState::new(IdRange::new(start, end).unwrap(), batch_size, schema())
}

fn success(id: u64) -> AttemptOutcome {
    AttemptOutcome::Success(Record::from_pairs(
        Identifier::new(id),
        &schema(),
        vec![("Name".to_string(), format!("worker-{id}"))],
    ))
}

fn written(batch: &Batch, upload: UploadStatus) -> CheckpointReport {
    let first = batch.first_identifier().unwrap();
    CheckpointReport::Written {
        artifact: PathBuf::from(format!("out/lots-{first}.csv")),
        records: batch.len(),
        upload,
    }
}

/// Drives the state machine the way the engine does, answering every effect
/// with `outcome_for` and a successful local write. Returns the flushed
/// batches and the final summary.
fn drive(
    mut state: HarvestState,
    mut outcome_for: impl FnMut(Identifier) -> AttemptOutcome,
) -> (Vec<Batch>, RunSummary) {
    let mut flushed = Vec::new();
    let (next, mut queue) = update(state, Msg::Start);
    state = next;
    loop {
        let effect = queue.remove(0);
        let msg = match effect {
            Effect::FetchUnit(id) => Msg::UnitFinished(outcome_for(id)),
            Effect::Throttle => Msg::ThrottleElapsed,
            Effect::Checkpoint { batch, .. } => {
                let report = written(&batch, UploadStatus::Skipped);
                flushed.push(batch);
                Msg::CheckpointFinished(report)
            }
            Effect::Finished(summary) => {
                assert!(state.is_done());
                return (flushed, summary);
            }
        };
        let (next, effects) = update(state, msg);
        state = next;
        queue.extend(effects);
    }
}

fn ids(batch: &Batch) -> Vec<u64> {
    batch.records().iter().map(|r| r.identifier.value()).collect()
}

#[test]
fn batches_follow_batch_size_and_drain_the_remainder() {
    init_logging();
    let (batches, summary) = drive(new_state(100, 104, 2), |id| success(id.value()));

    let grouped: Vec<Vec<u64>> = batches.iter().map(ids).collect();
    assert_eq!(grouped, vec![vec![100, 101], vec![102, 103], vec![104]]);
    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.checkpoints, 3);
    assert_eq!(summary.checkpointed_records, 5);
}

#[test]
fn every_identifier_yields_one_row_in_order_whatever_the_outcome() {
    let (batches, summary) = drive(new_state(10, 19, 3), |id| match id.value() % 4 {
        0 => success(id.value()),
        1 => AttemptOutcome::NotFound(id),
        2 => AttemptOutcome::Transient(id, "timeout".into()),
        _ => AttemptOutcome::Fatal(id, "boom".into()),
    });

    let all: Vec<u64> = batches.iter().flat_map(ids).collect();
    assert_eq!(all, (10..=19).collect::<Vec<_>>());
    assert_eq!(summary.attempted, 10);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.not_found, 2);
    assert_eq!(summary.transient, 3);
    assert_eq!(summary.fatal, 3);
    assert_eq!(summary.failed(), 6);
}

#[test]
fn run_completes_when_every_identifier_fails() {
    let (batches, summary) = drive(new_state(1, 4, 5), |id| {
        AttemptOutcome::Fatal(id, "unexpected".into())
    });

    assert_eq!(batches.len(), 1);
    assert!(batches[0]
        .records()
        .iter()
        .all(|r| r.status == RecordStatus::Fatal && r.values.iter().all(String::is_empty)));
    assert_eq!(summary.fatal, 4);
    assert_eq!(summary.checkpointed_records, 4);
}

#[test]
fn exact_multiple_of_batch_size_has_no_empty_drain() {
    let (batches, summary) = drive(new_state(1, 4, 2), |id| success(id.value()));
    assert_eq!(batches.len(), 2);
    assert_eq!(summary.checkpoints, 2);
}

#[test]
fn throttle_follows_every_identifier() {
    let (state, effects) = update(new_state(7, 8, 10), Msg::Start);
    assert_eq!(effects, vec![Effect::FetchUnit(Identifier::new(7))]);

    let (state, effects) = update(
        state,
        Msg::UnitFinished(AttemptOutcome::NotFound(Identifier::new(7))),
    );
    assert_eq!(effects, vec![Effect::Throttle]);
    assert_eq!(state.phase(), Phase::Throttling);

    let (state, effects) = update(state, Msg::ThrottleElapsed);
    assert_eq!(effects, vec![Effect::FetchUnit(Identifier::new(8))]);

    let (_state, effects) = update(
        state,
        Msg::UnitFinished(AttemptOutcome::Transient(Identifier::new(8), "stale".into())),
    );
    assert_eq!(effects, vec![Effect::Throttle]);
}

#[test]
fn mismatched_and_late_messages_are_ignored() {
    let (state, _) = update(new_state(1, 3, 2), Msg::Start);

    let (state, effects) = update(state, Msg::UnitFinished(success(2)));
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Fetching(Identifier::new(1)));

    let (state, effects) = update(state, Msg::ThrottleElapsed);
    assert!(effects.is_empty());

    let (state, effects) = update(state, Msg::Start);
    assert!(effects.is_empty());
    assert_eq!(state.summary().attempted, 0);
}

#[test]
fn failed_local_write_keeps_records_for_the_next_checkpoint() {
    let (state, _) = update(new_state(1, 5, 2), Msg::Start);
    let (state, _) = update(state, Msg::UnitFinished(success(1)));
    let (state, _) = update(state, Msg::ThrottleElapsed);
    let (state, _) = update(state, Msg::UnitFinished(success(2)));
    let (state, effects) = update(state, Msg::ThrottleElapsed);

    let batch = match effects.as_slice() {
        [Effect::Checkpoint { index: 0, batch }] => batch.clone(),
        other => panic!("expected checkpoint, got {other:?}"),
    };
    let (state, effects) = update(
        state,
        Msg::CheckpointFinished(CheckpointReport::LocalFailed {
            batch,
            error: "disk full".into(),
        }),
    );
    assert_eq!(effects, vec![Effect::FetchUnit(Identifier::new(3))]);
    assert_eq!(state.pending_records(), 2);

    let (state, _) = update(state, Msg::UnitFinished(success(3)));
    let (_state, effects) = update(state, Msg::ThrottleElapsed);
    match effects.as_slice() {
        [Effect::Checkpoint { index: 1, batch }] => assert_eq!(ids(batch), vec![1, 2, 3]),
        other => panic!("expected retried checkpoint, got {other:?}"),
    }
}

#[test]
fn failed_drain_is_reported_as_unflushed() {
    let (state, _) = update(new_state(1, 1, 5), Msg::Start);
    let (state, _) = update(state, Msg::UnitFinished(success(1)));
    let (state, effects) = update(state, Msg::ThrottleElapsed);
    let batch = match effects.as_slice() {
        [Effect::Checkpoint { batch, .. }] => batch.clone(),
        other => panic!("expected drain checkpoint, got {other:?}"),
    };
    assert_eq!(state.phase(), Phase::Draining);

    let (state, effects) = update(
        state,
        Msg::CheckpointFinished(CheckpointReport::LocalFailed {
            batch,
            error: "read-only file system".into(),
        }),
    );
    match effects.as_slice() {
        [Effect::Finished(summary)] => {
            assert_eq!(summary.unflushed, 1);
            assert_eq!(summary.checkpoints, 0);
        }
        other => panic!("expected finish, got {other:?}"),
    }
    assert!(state.is_done());
}

#[test]
fn upload_failures_are_tracked_and_superseded_by_later_success() {
    let (state, _) = update(new_state(1, 2, 1), Msg::Start);
    let (state, _) = update(state, Msg::UnitFinished(success(1)));
    let (state, _) = update(state, Msg::ThrottleElapsed);
    let (state, _) = update(
        state,
        Msg::CheckpointFinished(CheckpointReport::Written {
            artifact: PathBuf::from("out/lots.csv"),
            records: 1,
            upload: UploadStatus::Failed {
                key: "harvest/lots.csv".into(),
                error: "503".into(),
            },
        }),
    );
    assert_eq!(state.summary().upload_failures, 1);
    assert_eq!(state.summary().pending_uploads.len(), 1);

    let (state, _) = update(state, Msg::UnitFinished(success(2)));
    let (state, _) = update(state, Msg::ThrottleElapsed);
    let (_state, effects) = update(
        state,
        Msg::CheckpointFinished(CheckpointReport::Written {
            artifact: PathBuf::from("out/lots.csv"),
            records: 1,
            upload: UploadStatus::Uploaded {
                key: "harvest/lots.csv".into(),
            },
        }),
    );
    match effects.as_slice() {
        [Effect::Finished(summary)] => {
            assert_eq!(summary.upload_failures, 1);
            assert!(summary.pending_uploads.is_empty());
            assert_eq!(summary.artifacts, vec![PathBuf::from("out/lots.csv")]);
        }
        other => panic!("expected finish, got {other:?}"),
    }
}

#[test]
fn cancel_drains_collected_records_and_stops_fetching() {
    let (state, _) = update(new_state(1, 100, 10), Msg::Start);
    let (state, _) = update(state, Msg::UnitFinished(success(1)));
    let (state, effects) = update(state, Msg::CancelRequested);
    assert!(effects.is_empty());

    let (state, effects) = update(state, Msg::ThrottleElapsed);
    let batch = match effects.as_slice() {
        [Effect::Checkpoint { batch, .. }] => batch.clone(),
        other => panic!("expected drain, got {other:?}"),
    };
    assert_eq!(ids(&batch), vec![1]);

    let (_state, effects) = update(
        state,
        Msg::CheckpointFinished(written(&batch, UploadStatus::Skipped)),
    );
    match effects.as_slice() {
        [Effect::Finished(summary)] => {
            assert!(summary.cancelled);
            assert_eq!(summary.attempted, 1);
        }
        other => panic!("expected finish, got {other:?}"),
    }
}

#[test]
fn cancel_before_start_finishes_immediately() {
    let (state, effects) = update(new_state(1, 3, 2), Msg::CancelRequested);
    assert!(matches!(effects.as_slice(), [Effect::Finished(s)] if s.cancelled && s.attempted == 0));
    assert!(state.is_done());
}
