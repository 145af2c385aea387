//! Two-stage post-processing of server-rendered HTML.
//!
//! Stage 1 substitutes math synchronously and produces a [`DisplayDocument`].
//! Mounting it yields the displayable [`MountedDocument`] together with the
//! [`PendingJobs`] for stage 2, so diagram work cannot be dispatched before
//! the substituted output is on screen.

pub mod diagram;
pub mod math;

use crate::error::DiagramError;
use diagram::{
    DiagramRenderer, SourceRenderer, diagram_error_fragment, diagram_id, locate_blocks,
    next_generation,
};
use math::{MathMlRenderer, MathRenderer, MathSummary, escape_html, substitute_math};
use scraper::{ElementRef, Html, Node};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identity of one document request. Outcomes carrying an older identity are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Fetching,
    Substituting,
    Mounted,
    DiagramsPending,
    Settled,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RenderPhase::Fetching => "fetching",
            RenderPhase::Substituting => "substituting",
            RenderPhase::Mounted => "mounted",
            RenderPhase::DiagramsPending => "diagrams pending",
            RenderPhase::Settled => "settled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramState {
    Pending,
    Rendered(String),
    Failed(DiagramError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSlot {
    pub id: String,
    pub open_tag: String,
    pub source: String,
    pub state: DiagramState,
}

impl DiagramSlot {
    fn html(&self) -> String {
        let inner = match &self.state {
            DiagramState::Pending => escape_html(&self.source),
            DiagramState::Rendered(markup) => markup.clone(),
            DiagramState::Failed(error) => diagram_error_fragment(error),
        };
        format!("{}{}</code>", self.open_tag, inner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Html(String),
    Diagram(DiagramSlot),
}

/// Output of stage 1: math substituted, diagram blocks located but not dispatched.
#[derive(Debug, Clone)]
pub struct DisplayDocument {
    segments: Vec<Segment>,
    math: MathSummary,
    generation: u64,
}

impl DisplayDocument {
    pub fn math(&self) -> MathSummary {
        self.math
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn diagram_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Diagram(_)))
            .count()
    }

    pub fn html(&self) -> String {
        render_segments(&self.segments)
    }

    /// Commit the document for display and hand back the diagram jobs.
    pub fn mount(self) -> (MountedDocument, PendingJobs) {
        let jobs: Vec<DiagramJob> = self
            .segments
            .iter()
            .enumerate()
            .filter_map(|(slot, segment)| match segment {
                Segment::Diagram(d) => Some(DiagramJob {
                    slot,
                    id: d.id.clone(),
                    source: d.source.clone(),
                }),
                Segment::Html(_) => None,
            })
            .collect();

        let mounted = MountedDocument {
            pending: jobs.len(),
            segments: self.segments,
            math: self.math,
            generation: self.generation,
        };
        (mounted, PendingJobs { jobs })
    }
}

/// The displayed form of a document; diagram slots fill in as outcomes arrive.
#[derive(Debug, Clone)]
pub struct MountedDocument {
    segments: Vec<Segment>,
    math: MathSummary,
    generation: u64,
    pending: usize,
}

impl MountedDocument {
    /// A document with no processing at all, e.g. a plain-text file.
    pub fn plain(html: String) -> Self {
        Self {
            segments: vec![Segment::Html(html)],
            math: MathSummary::default(),
            generation: 0,
            pending: 0,
        }
    }

    pub fn html(&self) -> String {
        render_segments(&self.segments)
    }

    pub fn math(&self) -> MathSummary {
        self.math
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_count(&self) -> usize {
        self.pending
    }

    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }

    pub fn phase(&self) -> RenderPhase {
        if self.is_settled() {
            RenderPhase::Settled
        } else {
            RenderPhase::DiagramsPending
        }
    }

    pub fn diagrams(&self) -> impl Iterator<Item = &DiagramSlot> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Diagram(d) => Some(d),
            Segment::Html(_) => None,
        })
    }

    /// Write one diagram outcome into its own slot. Returns false if the slot
    /// is unknown or already resolved.
    pub fn apply(&mut self, slot: usize, result: Result<String, DiagramError>) -> bool {
        let Some(Segment::Diagram(diagram)) = self.segments.get_mut(slot) else {
            return false;
        };
        if diagram.state != DiagramState::Pending {
            return false;
        }
        diagram.state = match result {
            Ok(markup) => DiagramState::Rendered(markup),
            Err(error) => DiagramState::Failed(error),
        };
        self.pending -= 1;
        true
    }

    /// Visible text, one line per block, blank runs collapsed.
    pub fn text(&self) -> String {
        html_to_text(&self.html())
    }
}

fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Html(html) => out.push_str(html),
            Segment::Diagram(d) => out.push_str(&d.html()),
        }
    }
    out
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "blockquote",
    "table", "tr", "hr", "section", "article", "header", "footer",
];

/// Plain-text rendering: block elements start new lines, list items get a bullet.
pub fn html_to_text(html: &str) -> String {
    fn walk(element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = el.name();
                    if name == "br" {
                        out.push('\n');
                        continue;
                    }
                    let block = BLOCK_ELEMENTS.contains(&name);
                    if block {
                        out.push('\n');
                    }
                    if name == "li" {
                        out.push_str("- ");
                    }
                    walk(child_ref, out);
                    if block {
                        out.push('\n');
                    }
                }
                _ => {}
            }
        }
    }

    let fragment = Html::parse_fragment(html);
    let mut raw = String::new();
    walk(fragment.root_element(), &mut raw);

    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines().map(str::trim_end) {
        if line.trim().is_empty() && lines.last().is_none_or(|l| l.trim().is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramJob {
    pub slot: usize,
    pub id: String,
    pub source: String,
}

/// Result of one diagram job, tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramOutcome {
    pub request: RequestId,
    pub slot: usize,
    pub id: String,
    pub result: Result<String, DiagramError>,
}

/// Stage 2 work, only obtainable by mounting a [`DisplayDocument`].
#[derive(Debug, Default)]
pub struct PendingJobs {
    jobs: Vec<DiagramJob>,
}

impl PendingJobs {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[DiagramJob] {
        &self.jobs
    }

    /// Spawn every job as its own task. Jobs share nothing; each reports
    /// through `events` whenever it finishes, in any order.
    pub fn dispatch<E>(
        self,
        renderer: Arc<dyn DiagramRenderer>,
        request: RequestId,
        events: mpsc::UnboundedSender<E>,
    ) -> Vec<JoinHandle<()>>
    where
        E: From<DiagramOutcome> + Send + 'static,
    {
        self.jobs
            .into_iter()
            .map(|job| {
                let future = renderer.render(job.id.clone(), job.source);
                let events = events.clone();
                tokio::spawn(async move {
                    let result = future.await;
                    let outcome = DiagramOutcome {
                        request,
                        slot: job.slot,
                        id: job.id,
                        result,
                    };
                    if events.send(E::from(outcome)).is_err() {
                        debug!("Diagram outcome for request {} had no receiver", request);
                    }
                })
            })
            .collect()
    }
}

/// Stage 1 with the renderers it needs for both stages.
#[derive(Clone)]
pub struct RenderPipeline {
    math: Arc<dyn MathRenderer>,
    diagrams: Arc<dyn DiagramRenderer>,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new(Arc::new(MathMlRenderer), Arc::new(SourceRenderer))
    }
}

impl fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPipeline").finish_non_exhaustive()
    }
}

impl RenderPipeline {
    pub fn new(math: Arc<dyn MathRenderer>, diagrams: Arc<dyn DiagramRenderer>) -> Self {
        Self { math, diagrams }
    }

    pub fn diagrams(&self) -> Arc<dyn DiagramRenderer> {
        Arc::clone(&self.diagrams)
    }

    /// Stage 1: substitute math over the raw HTML, then split out diagram blocks.
    pub fn process(&self, raw_html: &str) -> DisplayDocument {
        let (html, math) = substitute_math(raw_html, self.math.as_ref());
        let generation = next_generation();

        let mut segments = Vec::new();
        let mut cursor = 0;
        for (ordinal, block) in locate_blocks(&html).into_iter().enumerate() {
            if block.start > cursor {
                segments.push(Segment::Html(html[cursor..block.start].to_string()));
            }
            segments.push(Segment::Diagram(DiagramSlot {
                id: diagram_id(ordinal, generation),
                open_tag: block.open_tag,
                source: block.source,
                state: DiagramState::Pending,
            }));
            cursor = block.end;
        }
        if cursor < html.len() {
            segments.push(Segment::Html(html[cursor..].to_string()));
        }

        debug!(
            "Processed document: {} math rendered, {} failed, {} diagram(s)",
            math.rendered,
            math.failed,
            segments.iter().filter(|s| matches!(s, Segment::Diagram(_))).count()
        );

        DisplayDocument {
            segments,
            math,
            generation,
        }
    }
}
