#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lot_harvester_core::FieldSchema;
use lot_harvester_engine::{
    fragment_rows, fragment_text, ClientError, ClientErrorKind, ClientFactory, Document,
    Extractor, FetchSettings, Locator, NavigationMode, NodeHandle, RemoteSink, RenderingClient,
    SinkError, Sleeper, TargetSite, UnitFetcher,
};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const ENDPOINT: &str = "https://fake.test/search";
pub const LOT_PARAM: &str = "lot";
pub const LOT_FIELD: &str = "lytA_ctl23_Stickertext";
pub const SEARCH_BUTTON: &str = "lytA_ctl23_passportSearch";

pub const EMPTY_PAGE: &str = "<html><body><p>No record found</p></body></html>";

pub const FORM_PAGE: &str = r#"<html><body>
  <form method="post" action="/search">
    <input type="hidden" name="__VIEWSTATE" value="state" />
    <input type="text" id="lytA_ctl23_Stickertext" name="lytA$ctl23$Stickertext" />
    <input type="submit" id="lytA_ctl23_passportSearch" name="lytA$ctl23$passportSearch" value="Search" />
  </form>
</body></html>"#;

pub fn details_page(id: u64) -> String {
    format!(
        r#"<html><body><div id="PassportMainshowTable"><table>
  <tr><td>Name</td><td>worker-{id}</td></tr>
  <tr><td>PassportNo</td><td>P{id}</td></tr>
  <tr><td>Country</td><td>Qatar</td></tr>
</table></div></body></html>"#
    )
}

/// One scripted answer to a navigation or submission for an identifier.
#[derive(Debug, Clone)]
pub enum Step {
    Page(String),
    Fail(ClientErrorKind),
}

#[derive(Default)]
struct SiteState {
    steps: HashMap<u64, VecDeque<Step>>,
    pages: HashMap<u64, String>,
    calls: Vec<String>,
    stall_on: Vec<Locator>,
    open_fails: bool,
}

/// Shared script behind every client a [`FakeFactory`] opens.
#[derive(Clone, Default)]
pub struct FakeSite {
    inner: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer served for `id` once scripted steps are used up.
    pub fn page(&self, id: u64, html: impl Into<String>) -> &Self {
        self.inner.lock().unwrap().pages.insert(id, html.into());
        self
    }

    pub fn details_for(&self, ids: impl IntoIterator<Item = u64>) -> &Self {
        for id in ids {
            self.page(id, details_page(id));
        }
        self
    }

    /// Answers consumed one per request for `id` before falling back to
    /// [`FakeSite::page`].
    pub fn steps(&self, id: u64, steps: Vec<Step>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .steps
            .entry(id)
            .or_default()
            .extend(steps);
        self
    }

    pub fn always_fail(&self, id: u64, kind: ClientErrorKind) -> &Self {
        self.steps(id, vec![Step::Fail(kind); 64])
    }

    pub fn stall_on(&self, locator: Locator) -> &Self {
        self.inner.lock().unwrap().stall_on.push(locator);
        self
    }

    pub fn fail_open(&self) -> &Self {
        self.inner.lock().unwrap().open_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn log(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn answer(&self, id: u64) -> Step {
        let mut state = self.inner.lock().unwrap();
        if let Some(step) = state.steps.get_mut(&id).and_then(VecDeque::pop_front) {
            return step;
        }
        Step::Page(
            state
                .pages
                .get(&id)
                .cloned()
                .unwrap_or_else(|| EMPTY_PAGE.to_string()),
        )
    }

    fn stalls(&self, locator: &Locator) -> bool {
        self.inner.lock().unwrap().stall_on.contains(locator)
    }

    pub fn client(&self) -> ScriptedClient {
        ScriptedClient {
            site: self.clone(),
            current: None,
            generation: 0,
            nodes: Vec::new(),
        }
    }
}

/// In-memory [`RenderingClient`] answering from a [`FakeSite`] script and
/// querying pages with the engine's own document model.
pub struct ScriptedClient {
    site: FakeSite,
    current: Option<Document>,
    generation: u64,
    nodes: Vec<String>,
}

impl ScriptedClient {
    /// Client already showing `html`.
    pub fn showing(html: &str) -> Self {
        let mut client = FakeSite::new().client();
        client.load(Url::parse(ENDPOINT).unwrap(), html.to_string());
        client
    }

    fn load(&mut self, url: Url, html: String) {
        self.generation += 1;
        self.nodes.clear();
        self.current = Some(Document::new(url, html));
    }

    fn respond(&mut self, url: Url, id: u64) -> Result<(), ClientError> {
        match self.site.answer(id) {
            Step::Page(html) => {
                self.load(url, html);
                Ok(())
            }
            Step::Fail(kind) => {
                // A failed navigation leaves nothing usable behind.
                self.generation += 1;
                self.nodes.clear();
                self.current = None;
                Err(ClientError::new(kind, format!("scripted failure for {id}")))
            }
        }
    }

    fn node(&self, node: NodeHandle) -> Result<&str, ClientError> {
        if node.generation() != self.generation {
            return Err(ClientError::new(ClientErrorKind::StaleReference, "stale"));
        }
        self.nodes
            .get(node.index())
            .map(String::as_str)
            .ok_or_else(|| ClientError::new(ClientErrorKind::StaleReference, "unknown node"))
    }
}

#[async_trait::async_trait]
impl RenderingClient for ScriptedClient {
    async fn navigate(&mut self, url: &str) -> Result<(), ClientError> {
        self.site.log(format!("navigate {url}"));
        let parsed = Url::parse(url)
            .map_err(|e| ClientError::new(ClientErrorKind::InvalidUrl, e.to_string()))?;
        let lot = parsed
            .query_pairs()
            .find(|(k, _)| k == LOT_PARAM)
            .and_then(|(_, v)| v.parse::<u64>().ok());
        match lot {
            Some(id) => self.respond(parsed, id),
            None => {
                self.load(parsed, FORM_PAGE.to_string());
                Ok(())
            }
        }
    }

    async fn wait_ready(&mut self) -> Result<(), ClientError> {
        self.site.log("wait_ready".to_string());
        match self.current {
            Some(_) => Ok(()),
            None => Err(ClientError::new(ClientErrorKind::NoDocument, "nothing loaded")),
        }
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<NodeHandle>, ClientError> {
        if self.site.stalls(locator) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let doc = self
            .current
            .as_ref()
            .ok_or_else(|| ClientError::new(ClientErrorKind::NoDocument, "nothing loaded"))?;
        let found = doc.locate(locator)?;
        Ok(found.map(|outer| {
            self.nodes.push(outer);
            NodeHandle::new(self.generation, self.nodes.len() - 1)
        }))
    }

    async fn read_text(&self, node: NodeHandle) -> Result<String, ClientError> {
        self.node(node).map(fragment_text)
    }

    async fn read_rows(&self, node: NodeHandle) -> Result<Vec<Vec<String>>, ClientError> {
        self.node(node).map(fragment_rows)
    }

    async fn submit(
        &mut self,
        field_id: &str,
        value: &str,
        trigger_id: Option<&str>,
    ) -> Result<(), ClientError> {
        self.site.log(format!(
            "submit {field_id}={value} via {}",
            trigger_id.unwrap_or("-")
        ));
        let doc = self
            .current
            .as_ref()
            .ok_or_else(|| ClientError::new(ClientErrorKind::NoDocument, "nothing loaded"))?;
        let form = doc.form_submission(field_id, value, trigger_id)?;
        let id = value
            .parse::<u64>()
            .map_err(|e| ClientError::new(ClientErrorKind::Network, e.to_string()))?;
        self.respond(form.action, id)
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.site.log("close".to_string());
        self.current = None;
        Ok(())
    }
}

pub struct FakeFactory {
    site: FakeSite,
}

impl FakeFactory {
    pub fn new(site: &FakeSite) -> Self {
        Self { site: site.clone() }
    }
}

#[async_trait::async_trait]
impl ClientFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn RenderingClient>, ClientError> {
        self.site.log("open".to_string());
        if self.site.inner.lock().unwrap().open_fails {
            return Err(ClientError::new(ClientErrorKind::Network, "no browser available"));
        }
        Ok(Box::new(self.site.client()))
    }
}

/// Records requested pauses without waiting.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels `token` during the `call`-th sleep (1-based).
    pub fn cancelling_on(call: usize, token: CancellationToken) -> Self {
        Self {
            sleeps: Arc::default(),
            cancel_on_call: Some((call, token)),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let calls = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some((call, token)) = &self.cancel_on_call {
            if *call == calls {
                token.cancel();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub local: PathBuf,
    pub key: String,
    pub content: String,
}

/// Remote sink that keeps what it was given, or fails every put.
#[derive(Clone, Default)]
pub struct RecordingSink {
    puts: Arc<Mutex<Vec<Put>>>,
    failing: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn puts(&self) -> Vec<Put> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteSink for RecordingSink {
    async fn put(&self, local: &Path, key: &str) -> Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::Transport("scripted outage".to_string()));
        }
        let content = std::fs::read_to_string(local).map_err(|source| SinkError::ReadArtifact {
            path: local.to_path_buf(),
            source,
        })?;
        self.puts.lock().unwrap().push(Put {
            local: local.to_path_buf(),
            key: key.to_string(),
            content,
        });
        Ok(())
    }

    fn describe(&self) -> String {
        "recording sink".to_string()
    }
}

pub fn query_site() -> TargetSite {
    TargetSite {
        endpoint: Url::parse(ENDPOINT).unwrap(),
        mode: NavigationMode::Query {
            param: LOT_PARAM.to_string(),
        },
        id_width: 9,
    }
}

pub fn form_site() -> TargetSite {
    TargetSite {
        endpoint: Url::parse(ENDPOINT).unwrap(),
        mode: NavigationMode::Form {
            field_id: LOT_FIELD.to_string(),
            trigger_id: Some(SEARCH_BUTTON.to_string()),
        },
        id_width: 9,
    }
}

pub fn fetcher(site: TargetSite) -> UnitFetcher {
    UnitFetcher::new(
        site,
        Extractor::permit_details(),
        FieldSchema::permit_details(),
        FetchSettings::default(),
    )
}

/// Parsed CSV: header plus data rows.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}
