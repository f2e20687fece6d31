use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use lot_harvester_core::{PendingUpload, RunSummary};
use lot_harvester_engine::{
    ensure_output_dir, write_run_report, CheckpointSettings, Checkpointer, DirectorySink,
    Extractor, HarvestLoop, HarvestRequest, HttpClientFactory, HttpPutSink, RemoteSink,
    RequestEcho, RunReport, TokioSleeper, UnitFetcher,
};
use tokio_util::sync::CancellationToken;

use crate::config::{HarvestConfig, Sink};
use crate::ledger::{digest_file, LedgerError, UploadLedger};

/// Harvests the configured range, then records failed uploads and the run
/// report next to the artifacts.
pub async fn run(config: &HarvestConfig) -> Result<RunSummary> {
    config.validate()?;
    ensure_output_dir(&config.output_dir)
        .with_context(|| format!("preparing output directory {:?}", config.output_dir))?;

    let started = Local::now();
    let run_label = started.format("%Y%m%dT%H%M%S").to_string();
    let request = config.request();

    let fetcher = UnitFetcher::new(
        config.target_site()?,
        Extractor::permit_details().with_strategy_timeout(config.strategy_timeout()),
        config.schema(),
        config.fetch_settings(),
    );
    let checkpointer = Checkpointer::new(
        CheckpointSettings {
            output_dir: config.output_dir.clone(),
            policy: config.artifact_policy(),
            run_label: run_label.clone(),
            key_prefix: config.key_prefix.clone(),
            id_width: config.id_width,
        },
        config.schema(),
        build_sink(config)?,
    );
    let cancel = CancellationToken::new();
    let harvest = HarvestLoop::new(
        Box::new(HttpClientFactory::new(config.client_settings())),
        fetcher,
        checkpointer,
        Box::new(TokioSleeper),
    )
    .with_cancellation(cancel.clone());

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            harvest_warn!("interrupt received, stopping after the current lot");
            cancel.cancel();
        }
    });
    let outcome = harvest.run(&request).await;
    interrupt.abort();
    let summary = outcome.context("harvest run failed")?;

    finish_run(config, run_label, started, &request, summary)
}

/// Writes the run report and records failed uploads in the ledger. The
/// report is written even when the ledger cannot be updated.
fn finish_run(
    config: &HarvestConfig,
    run_label: String,
    started: DateTime<Local>,
    request: &HarvestRequest,
    summary: RunSummary,
) -> Result<RunSummary> {
    let ledger_outcome = if summary.pending_uploads.is_empty() {
        Ok(())
    } else {
        record_pending_uploads(&config.output_dir, &summary.pending_uploads)
    };
    if let Err(err) = &ledger_outcome {
        harvest_error!("could not update the upload ledger: {}", err);
    }

    let report = RunReport {
        run_label,
        started_at: started.to_rfc3339(),
        finished_at: Local::now().to_rfc3339(),
        request: RequestEcho::from(request),
        summary,
    };
    let path = write_run_report(&config.output_dir, &report)
        .context("writing the run report")?;
    harvest_info!("run report written to {:?}", path);

    ledger_outcome.context("recording failed uploads")?;
    if report.summary.unflushed > 0 {
        bail!(
            "{} record(s) could not be written to {:?}",
            report.summary.unflushed,
            config.output_dir
        );
    }
    Ok(report.summary)
}

fn record_pending_uploads(output_dir: &Path, pending: &[PendingUpload]) -> Result<(), LedgerError> {
    let mut ledger = UploadLedger::load(output_dir)?;
    let recorded = ledger.record_failures(pending);
    let path = ledger.save(output_dir)?;
    harvest_warn!(
        "{} upload(s) failed; recorded in {:?} for `lot-harvester reupload`",
        recorded,
        path
    );
    Ok(())
}

/// Retries every upload in the ledger and keeps only the ones that still
/// fail.
pub async fn reupload(config: &HarvestConfig) -> Result<()> {
    let mut ledger = UploadLedger::load(&config.output_dir)?;
    if ledger.is_empty() {
        harvest_info!("no pending uploads in {:?}", config.output_dir);
        return Ok(());
    }
    let Some(sink) = build_sink(config)? else {
        bail!(
            "{} upload(s) pending but no sink configured; pass --sink-url or --sink-dir",
            ledger.entries.len()
        );
    };

    let mut remaining = Vec::new();
    for entry in std::mem::take(&mut ledger.entries) {
        match digest_file(&entry.path) {
            Ok((sha256, _)) if sha256 != entry.sha256 => harvest_warn!(
                "{:?} changed since its upload failed; sending the current content",
                entry.path
            ),
            Ok(_) => {}
            Err(err) => {
                harvest_error!("{}", err);
                remaining.push(entry);
                continue;
            }
        }
        match sink.put(&entry.path, &entry.key).await {
            Ok(()) => harvest_info!("uploaded {:?} to {}", entry.path, entry.key),
            Err(err) => {
                harvest_error!("upload of {:?} to {} failed: {}", entry.path, entry.key, err);
                remaining.push(entry);
            }
        }
    }

    let still_failing = remaining.len();
    ledger.entries = remaining;
    ledger.save(&config.output_dir)?;
    if still_failing > 0 {
        bail!("{} upload(s) still failing", still_failing);
    }
    harvest_info!("all pending uploads delivered via {}", sink.describe());
    Ok(())
}

fn build_sink(config: &HarvestConfig) -> Result<Option<Box<dyn RemoteSink>>> {
    let sink: Box<dyn RemoteSink> = match &config.sink {
        Sink::None => return Ok(None),
        Sink::Http { .. } => {
            let Some(url) = config.sink_url()? else {
                return Ok(None);
            };
            Box::new(HttpPutSink::new(
                url,
                config.sink_token.clone(),
                config.request_timeout(),
            )?)
        }
        Sink::Directory { path } => Box::new(DirectorySink::new(path.clone())),
    };
    harvest_info!("remote sink: {}", sink.describe());
    Ok(Some(sink))
}
