//! Lot harvester engine: page client, extraction, checkpointing and the
//! effect-executing harvest loop.
mod checkpoint;
mod client;
mod clock;
mod document;
mod extract;
mod fetch;
mod filename;
mod harvest;
mod persist;
mod report;
mod sink;
mod types;

pub use checkpoint::{ArtifactPolicy, CheckpointSettings, Checkpointer};
pub use client::{
    ClientFactory, ClientSettings, HttpClientFactory, HttpRenderingClient, RenderingClient,
};
pub use clock::{Sleeper, TokioSleeper};
pub use document::{
    decode_html, fragment_rows, fragment_text, DecodedHtml, Document, FormMethod, FormSubmission,
};
pub use extract::{Extraction, Extractor, DEFAULT_STRATEGY_TIMEOUT};
pub use fetch::{FetchSettings, NavigationMode, RetryPolicy, TargetSite, UnitFetcher};
pub use filename::{artifact_filename, sanitize_component};
pub use harvest::{HarvestError, HarvestLoop, HarvestRequest};
pub use persist::{append_rows, ensure_output_dir, render_csv, AtomicFileWriter, PersistError};
pub use report::{write_run_report, RequestEcho, RunReport};
pub use sink::{validate_key, DirectorySink, HttpPutSink, RemoteSink, SinkError};
pub use types::{ClientError, ClientErrorKind, Locator, NodeHandle};
