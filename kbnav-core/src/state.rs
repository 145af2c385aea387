// Session-scoped UI state and the named operations that mutate it

use crate::autosave::{AutoSaver, PersistFn};
use crate::config::Config;
use crate::error::DiagramError;
use crate::graph::{ClickAction, GraphModel};
use crate::links::{LinkRef, LinkResolver, ResolvedAction, extract_links};
use crate::render::math::escape_html;
use crate::render::{DiagramOutcome, MountedDocument, RenderPhase, RenderPipeline, RequestId};
use crate::tree::FileTree;
use futures::future::BoxFuture;
use kbnav_client::{ApiClient, ClientError, FileContent, FileRecord, GraphNode, SearchHit, WikiLink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Hands an external URL to the platform (browser, etc).
pub type OpenFn = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Inline, non-fatal message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Asynchronous results delivered back to the state container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    Diagram(DiagramOutcome),
    Saved {
        path: String,
        result: Result<(), String>,
    },
}

impl From<DiagramOutcome> for StateEvent {
    fn from(outcome: DiagramOutcome) -> Self {
        StateEvent::Diagram(outcome)
    }
}

/// The document currently occupying the display slot.
#[derive(Debug, Clone)]
pub struct CurrentDocument {
    path: String,
    content: String,
    links: Vec<WikiLink>,
    request: RequestId,
    display: MountedDocument,
}

impl CurrentDocument {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Editable source buffer.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Wikilinks reported by the server for this document.
    pub fn wikilinks(&self) -> &[WikiLink] {
        &self.links
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn display(&self) -> &MountedDocument {
        &self.display
    }

    pub fn html(&self) -> String {
        self.display.html()
    }

    pub fn text(&self) -> String {
        self.display.text()
    }

    pub fn phase(&self) -> RenderPhase {
        self.display.phase()
    }

    /// Anchors in the displayed HTML, in document order.
    pub fn anchors(&self) -> Vec<LinkRef> {
        extract_links(&self.display.html())
    }
}

/// A started document request. Fetching borrows nothing from the state, so
/// other operations may run while it is in flight.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    id: RequestId,
    path: String,
    client: ApiClient,
}

impl DocumentRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn fetch(self) -> FetchedDocument {
        let result = self.client.read_file(&self.path).await;
        FetchedDocument {
            id: self.id,
            path: self.path,
            result,
        }
    }
}

#[derive(Debug)]
pub struct FetchedDocument {
    id: RequestId,
    path: String,
    result: Result<FileContent, ClientError>,
}

impl FetchedDocument {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Result of selecting a path in the file tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSelection {
    /// Directory expanded (true) or collapsed (false).
    Toggled(bool),
    Opened,
    /// Unknown path or a file without the document extension.
    Ignored,
}

/// UI state for one authenticated session.
///
/// Created once per process and reset on logout. All mutation goes through
/// the named operations below; transport failures push a notice and leave
/// the tree, graph and open document as they were.
pub struct AppState {
    client: Option<ApiClient>,
    pipeline: RenderPipeline,
    resolver: LinkResolver,
    debounce: Duration,
    opener: Option<OpenFn>,

    files: Vec<FileRecord>,
    tree: FileTree,
    graph: GraphModel,
    graph_stale: bool,
    selected_node: Option<GraphNode>,

    document: Option<CurrentDocument>,
    next_request: u64,
    in_flight: Option<RequestId>,

    show_graph: bool,
    show_preview: bool,
    sidebar_collapsed: bool,
    notices: Vec<Notice>,

    events_tx: mpsc::UnboundedSender<StateEvent>,
    events_rx: mpsc::UnboundedReceiver<StateEvent>,
    autosaver: Option<AutoSaver>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(RenderPipeline::default(), LinkResolver::default(), crate::autosave::DEFAULT_DEBOUNCE)
    }
}

impl AppState {
    pub fn new(pipeline: RenderPipeline, resolver: LinkResolver, debounce: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            client: None,
            pipeline,
            resolver,
            debounce,
            opener: None,
            files: Vec::new(),
            tree: FileTree::default(),
            graph: GraphModel::default(),
            graph_stale: false,
            selected_node: None,
            document: None,
            next_request: 0,
            in_flight: None,
            show_graph: false,
            show_preview: true,
            sidebar_collapsed: false,
            notices: Vec::new(),
            events_tx,
            events_rx,
            autosaver: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, DiagramError> {
        Ok(Self::new(
            config.render_pipeline()?,
            config.link_resolver(),
            config.autosave_debounce(),
        ))
    }

    pub fn with_opener(mut self, opener: OpenFn) -> Self {
        self.opener = Some(opener);
        self
    }

    // ===== Session =====

    /// Start a session. The credentials are checked by listing files; on
    /// success the tree and graph are loaded.
    pub async fn login(&mut self, client: ApiClient) -> Result<(), ClientError> {
        let records = match client.list_files().await {
            Ok(records) => records,
            Err(e) => {
                self.push_error(format!("Login failed: {}", e));
                return Err(e);
            }
        };

        info!("Logged in to {} as {}", client.base_url(), client.username());
        self.autosaver = Some(AutoSaver::new(
            self.debounce,
            save_callback(client.clone(), self.events_tx.clone()),
        ));
        self.client = Some(client);
        self.replace_files(records);

        // A graph failure is already reported as a notice; the session stands.
        let _ = self.load_graph().await;
        Ok(())
    }

    /// Drop the session and return every field to its initial value.
    pub fn logout(&mut self) {
        if let Some(mut saver) = self.autosaver.take() {
            saver.cancel();
        }
        // A fresh channel makes every outstanding outcome undeliverable.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;

        self.client = None;
        self.files.clear();
        self.tree = FileTree::default();
        self.graph = GraphModel::default();
        self.graph_stale = false;
        self.selected_node = None;
        self.document = None;
        self.in_flight = None;
        self.show_graph = false;
        self.show_preview = true;
        self.sidebar_collapsed = false;
        self.notices.clear();
        info!("Logged out");
    }

    pub fn is_logged_in(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&ApiClient> {
        self.client.as_ref()
    }

    // ===== Accessors =====

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    pub fn is_graph_stale(&self) -> bool {
        self.graph_stale
    }

    pub fn selected_node(&self) -> Option<&GraphNode> {
        self.selected_node.as_ref()
    }

    pub fn document(&self) -> Option<&CurrentDocument> {
        self.document.as_ref()
    }

    pub fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    /// Phase of the display slot: `Fetching` while a request is outstanding.
    pub fn phase(&self) -> Option<RenderPhase> {
        if self.in_flight.is_some() {
            return Some(RenderPhase::Fetching);
        }
        self.document.as_ref().map(CurrentDocument::phase)
    }

    pub fn show_graph(&self) -> bool {
        self.show_graph
    }

    pub fn show_preview(&self) -> bool {
        self.show_preview
    }

    pub fn sidebar_collapsed(&self) -> bool {
        self.sidebar_collapsed
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn clear_notices(&mut self) {
        self.notices.clear();
    }

    pub fn autosave_pending(&self) -> bool {
        self.autosaver.as_ref().is_some_and(AutoSaver::is_pending)
    }

    // ===== Listing and graph =====

    pub async fn load_files(&mut self) -> Result<(), ClientError> {
        let client = self.session()?;
        match client.list_files().await {
            Ok(records) => {
                self.replace_files(records);
                Ok(())
            }
            Err(e) => Err(self.transport_failure("Failed to load files", e)),
        }
    }

    fn replace_files(&mut self, records: Vec<FileRecord>) {
        let expanded = self.tree.expanded_paths();
        let mut tree = FileTree::from_records(&records);
        tree.restore_expanded(&expanded);
        debug!("File tree rebuilt: {} records, {} nodes", records.len(), tree.len());
        self.tree = tree;
        self.files = records;
    }

    pub async fn load_graph(&mut self) -> Result<(), ClientError> {
        let client = self.session()?;
        match client.get_graph().await {
            Ok(payload) => {
                let graph = GraphModel::from_payload(payload);
                debug!(
                    "Graph loaded: {} nodes, {} edges, {} dangling",
                    graph.node_count(),
                    graph.edge_count(),
                    graph.dangling_edges().len()
                );
                self.graph = graph;
                self.graph_stale = false;
                Ok(())
            }
            Err(e) => Err(self.transport_failure("Failed to load graph", e)),
        }
    }

    /// Refresh the graph if a background save changed it.
    pub async fn reload_graph_if_stale(&mut self) -> bool {
        if !self.graph_stale || self.client.is_none() {
            return false;
        }
        self.load_graph().await.is_ok()
    }

    // ===== Documents =====

    /// Open `path` in the display slot. Returns false when a newer request
    /// superseded this one before it completed.
    pub async fn load_file(&mut self, path: &str) -> Result<bool, ClientError> {
        let request = self.begin_load(path)?;
        let fetched = request.fetch().await;
        self.complete_load(fetched)
    }

    /// Claim the display slot for a new request. Any older request still in
    /// flight, and any diagram work of the displayed document, becomes stale.
    pub fn begin_load(&mut self, path: &str) -> Result<DocumentRequest, ClientError> {
        let client = self.session()?;
        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.in_flight = Some(id);
        debug!("Request {} for {}: {}", id, path, RenderPhase::Fetching);
        Ok(DocumentRequest {
            id,
            path: path.to_string(),
            client,
        })
    }

    /// Install a fetched document, run stage 1, mount, then dispatch stage 2.
    pub fn complete_load(&mut self, fetched: FetchedDocument) -> Result<bool, ClientError> {
        if self.in_flight != Some(fetched.id) {
            debug!("Dropping superseded response {} for {}", fetched.id, fetched.path);
            return Ok(false);
        }
        self.in_flight = None;

        let file = match fetched.result {
            Ok(file) => file,
            Err(e) => {
                return Err(self.transport_failure(&format!("Failed to open {}", fetched.path), e));
            }
        };

        debug!("Request {}: {}", fetched.id, RenderPhase::Substituting);
        let (mounted, jobs) = match &file.html {
            Some(html) => {
                let (mounted, jobs) = self.pipeline.process(html).mount();
                (mounted, Some(jobs))
            }
            None => (
                MountedDocument::plain(format!("<pre>{}</pre>", escape_html(&file.content))),
                None,
            ),
        };

        let pending = mounted.pending_count();
        info!("Opened {} ({} diagram(s))", fetched.path, pending);
        self.document = Some(CurrentDocument {
            path: fetched.path,
            content: file.content,
            links: file.links,
            request: fetched.id,
            display: mounted,
        });
        debug!("Request {}: {}", fetched.id, RenderPhase::Mounted);

        if let Some(jobs) = jobs.filter(|j| !j.is_empty()) {
            debug!("Request {}: {} ({})", fetched.id, RenderPhase::DiagramsPending, jobs.len());
            jobs.dispatch(self.pipeline.diagrams(), fetched.id, self.events_tx.clone());
        }
        Ok(true)
    }

    /// Directories toggle; files open only with the document extension.
    pub async fn select_tree_path(&mut self, path: &str) -> Result<TreeSelection, ClientError> {
        match self.tree.find(path).map(|n| n.is_dir) {
            Some(true) => {
                let expanded = self.tree.toggle_expanded(path).unwrap_or(false);
                Ok(TreeSelection::Toggled(expanded))
            }
            Some(false) if self.resolver.is_document(path) => {
                self.load_file(path).await?;
                Ok(TreeSelection::Opened)
            }
            _ => {
                debug!("Tree selection ignored: {}", path);
                Ok(TreeSelection::Ignored)
            }
        }
    }

    /// Select a graph node; file nodes also close the graph and open the
    /// document. The selection stands even if opening fails.
    pub async fn click_graph_node(&mut self, id: &str) -> Result<Option<ClickAction>, ClientError> {
        let Some(action) = self.graph.resolve_click(id) else {
            debug!("Click on unknown graph node {}", id);
            return Ok(None);
        };

        self.selected_node = Some(action.select.clone());
        if let Some(path) = &action.navigate {
            self.show_graph = false;
            self.load_file(path).await?;
        }
        Ok(Some(action))
    }

    /// Resolve `href` and carry out the resulting action.
    pub async fn follow_link(&mut self, href: &str) -> Result<ResolvedAction, ClientError> {
        let action = self.resolver.resolve(href);
        match &action {
            ResolvedAction::Navigate { path } => {
                let path = path.clone();
                self.load_file(&path).await?;
            }
            ResolvedAction::External { url } => match self.opener.clone() {
                Some(open) => {
                    if let Err(e) = open(url) {
                        warn!("Could not open {}: {}", url, e);
                        self.push_error(format!("Could not open {}: {}", url, e));
                    }
                }
                None => debug!("No external opener for {}", url),
            },
            ResolvedAction::Unsupported { reason } => {
                debug!("Link {:?} not followed: {}", href, reason);
            }
        }
        Ok(action)
    }

    // ===== Editing =====

    /// Replace the edit buffer and restart the auto-save timer.
    /// Returns false when no document is open.
    pub fn set_content(&mut self, text: impl Into<String>) -> bool {
        let Some(document) = self.document.as_mut() else {
            return false;
        };
        document.content = text.into();
        if let Some(saver) = self.autosaver.as_mut() {
            saver.schedule(document.path.clone(), document.content.clone());
        }
        true
    }

    /// Write the current buffer now, cancelling any pending auto-save.
    pub async fn save_current(&mut self) -> Result<(), ClientError> {
        let Some(document) = self.document.as_ref() else {
            return Ok(());
        };
        let (path, content) = (document.path.clone(), document.content.clone());
        if let Some(saver) = self.autosaver.as_mut() {
            saver.cancel();
        }
        self.save_file(&path, &content).await
    }

    /// Write a file, then refresh the graph (and the listing if it is new).
    pub async fn save_file(&mut self, path: &str, content: &str) -> Result<(), ClientError> {
        let client = self.session()?;
        if let Err(e) = client.write_file(path, content).await {
            return Err(self.transport_failure(&format!("Failed to save {}", path), e));
        }
        info!("Saved {}", path);

        if let Some(document) = self.document.as_mut().filter(|d| d.path == path) {
            document.content = content.to_string();
        }
        if !self.files.iter().any(|f| f.path == path) {
            let _ = self.load_files().await;
        }
        let _ = self.load_graph().await;
        Ok(())
    }

    /// Delete a file, refresh listing and graph, and clear the display slot
    /// if it held the deleted document.
    pub async fn delete_file(&mut self, path: &str) -> Result<(), ClientError> {
        let client = self.session()?;
        if let Err(e) = client.delete_file(path).await {
            return Err(self.transport_failure(&format!("Failed to delete {}", path), e));
        }
        info!("Deleted {}", path);

        if self.document.as_ref().is_some_and(|d| d.path == path) {
            // Pending edits would recreate the file.
            if let Some(saver) = self.autosaver.as_mut() {
                saver.cancel();
            }
            self.document = None;
        }
        let _ = self.load_files().await;
        let _ = self.load_graph().await;
        Ok(())
    }

    // ===== Queries =====

    pub async fn backlinks(&mut self, path: &str) -> Result<Vec<String>, ClientError> {
        let client = self.session()?;
        match client.get_backlinks(path).await {
            Ok(backlinks) => Ok(backlinks.backlinks),
            Err(e) => Err(self.transport_failure(&format!("Failed to load backlinks for {}", path), e)),
        }
    }

    pub async fn search(&mut self, query: &str) -> Result<Vec<SearchHit>, ClientError> {
        let client = self.session()?;
        match client.search(query).await {
            Ok(hits) => Ok(hits),
            Err(e) => Err(self.transport_failure("Search failed", e)),
        }
    }

    // ===== Toggles =====

    pub fn toggle_graph(&mut self) -> bool {
        self.show_graph = !self.show_graph;
        self.show_graph
    }

    pub fn toggle_preview(&mut self) -> bool {
        self.show_preview = !self.show_preview;
        self.show_preview
    }

    pub fn toggle_sidebar(&mut self) -> bool {
        self.sidebar_collapsed = !self.sidebar_collapsed;
        self.sidebar_collapsed
    }

    // ===== Asynchronous outcomes =====

    /// Apply a diagram outcome if it belongs to the displayed document.
    /// Stale outcomes are dropped without a notice.
    pub fn apply_outcome(&mut self, outcome: DiagramOutcome) -> bool {
        match self.document.as_mut() {
            Some(document) if document.request == outcome.request => {
                if let Err(e) = &outcome.result {
                    debug!("Diagram {} failed: {}", outcome.id, e);
                }
                let applied = document.display.apply(outcome.slot, outcome.result);
                if applied && document.display.is_settled() {
                    debug!("Request {}: {}", outcome.request, RenderPhase::Settled);
                }
                applied
            }
            _ => {
                debug!("Dropping stale diagram outcome {} from {}", outcome.id, outcome.request);
                false
            }
        }
    }

    pub fn apply_event(&mut self, event: StateEvent) -> bool {
        match event {
            StateEvent::Diagram(outcome) => self.apply_outcome(outcome),
            StateEvent::Saved { path, result } => {
                match result {
                    Ok(()) => {
                        info!("Auto-saved {}", path);
                        self.graph_stale = true;
                        self.push_notice(NoticeKind::Info, format!("Saved {}", path));
                    }
                    Err(e) => {
                        warn!("Auto-save of {} failed: {}", path, e);
                        self.push_error(format!("Failed to save {}: {}", path, e));
                    }
                }
                true
            }
        }
    }

    /// Apply every outcome that has already arrived. Never waits.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait until the displayed document has every diagram resolved.
    pub async fn settle(&mut self) {
        while self.document.as_ref().is_some_and(|d| !d.display.is_settled()) {
            match self.events_rx.recv().await {
                Some(event) => {
                    self.apply_event(event);
                }
                None => break,
            }
        }
    }

    // ===== Helpers =====

    fn session(&mut self) -> Result<ApiClient, ClientError> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => {
                self.push_error("Not logged in".to_string());
                Err(ClientError::NoSession)
            }
        }
    }

    fn transport_failure(&mut self, context: &str, error: ClientError) -> ClientError {
        warn!("{}: {}", context, error);
        self.push_error(format!("{}: {}", context, error));
        error
    }

    fn push_error(&mut self, message: String) {
        self.push_notice(NoticeKind::Error, message);
    }

    fn push_notice(&mut self, kind: NoticeKind, message: String) {
        self.notices.push(Notice { kind, message });
    }
}

fn save_callback(client: ApiClient, events: mpsc::UnboundedSender<StateEvent>) -> PersistFn {
    Arc::new(move |path: String, content: String| -> BoxFuture<'static, ()> {
        let client = client.clone();
        let events = events.clone();
        Box::pin(async move {
            let result = client
                .write_file(&path, &content)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string());
            if events.send(StateEvent::Saved { path, result }).is_err() {
                debug!("Save finished after the session ended");
            }
        })
    })
}
