use crate::{CheckpointReport, Effect, HarvestState, Msg, Phase};

/// Pure update function: applies a message to the run state and returns the
/// effects the engine has to carry out next.
///
/// Messages that do not fit the current phase are ignored, so a duplicated
/// or late message can never skip or repeat an identifier.
pub fn update(mut state: HarvestState, msg: Msg) -> (HarvestState, Vec<Effect>) {
    let effects = match msg {
        Msg::Start => match state.phase() {
            Phase::Idle => state.fetch_next_or_drain(),
            _ => Vec::new(),
        },
        Msg::UnitFinished(outcome) => match state.phase() {
            Phase::Fetching(expected) if expected == outcome.identifier() => {
                state.summary_mut().count_outcome(&outcome);
                let record = outcome.into_record(state.schema());
                state.batch_mut().push(record);
                let next = state.range().next_after(expected);
                state.set_next(next);
                state.set_phase(Phase::Throttling);
                vec![Effect::Throttle]
            }
            _ => Vec::new(),
        },
        Msg::ThrottleElapsed => match state.phase() {
            Phase::Throttling if state.batch_full() => state.checkpoint(false),
            Phase::Throttling => state.fetch_next_or_drain(),
            _ => Vec::new(),
        },
        Msg::CheckpointFinished(report) => match state.phase() {
            Phase::Checkpointing => {
                apply_report(&mut state, report, false);
                // Even when a failed write handed a full batch back, the
                // next flush waits for the following identifier.
                state.fetch_next_or_drain()
            }
            Phase::Draining => {
                apply_report(&mut state, report, true);
                state.finish()
            }
            _ => Vec::new(),
        },
        Msg::CancelRequested => {
            state.request_cancel();
            match state.phase() {
                Phase::Idle => state.finish(),
                _ => Vec::new(),
            }
        }
    };

    (state, effects)
}

fn apply_report(state: &mut HarvestState, report: CheckpointReport, final_flush: bool) {
    match report {
        CheckpointReport::Written {
            artifact,
            records,
            upload,
        } => state.summary_mut().record_written(artifact, records, upload),
        CheckpointReport::LocalFailed { batch, .. } if final_flush => {
            state.summary_mut().unflushed += batch.len() as u64;
        }
        CheckpointReport::LocalFailed { batch, .. } => {
            state.batch_mut().restore_front(batch);
        }
    }
}
