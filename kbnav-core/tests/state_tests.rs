// Tests for the session state container against a mock backend

use futures::future::BoxFuture;
use kbnav_client::{ApiClient, ClientError, Credentials};
use kbnav_core::error::DiagramError;
use kbnav_core::links::{LinkResolver, ResolvedAction};
use kbnav_core::render::diagram::DiagramRenderer;
use kbnav_core::render::math::MathMlRenderer;
use kbnav_core::render::{RenderPhase, RenderPipeline};
use kbnav_core::state::{AppState, NoticeKind, TreeSelection};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

/// Each render waits for one permit, so tests decide when diagrams finish.
struct GatedDiagrams {
    gate: Arc<Semaphore>,
}

impl DiagramRenderer for GatedDiagrams {
    fn render(&self, _id: String, source: String) -> BoxFuture<'static, Result<String, DiagramError>> {
        let gate = Arc::clone(&self.gate);
        Box::pin(async move {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
            Ok(format!("<svg>{}</svg>", source))
        })
    }
}

const FILES: &str = r#"[
    {"path":"a.md","name":"a.md","isDir":false},
    {"path":"b.md","name":"b.md","isDir":false},
    {"path":"docs","name":"docs","isDir":true},
    {"path":"docs/x.md","name":"x.md","isDir":false},
    {"path":"docs/data.csv","name":"data.csv","isDir":false}
]"#;

const GRAPH: &str = r#"{
    "nodes":[
        {"id":"a.md","type":"file","title":"a","path":"a.md"},
        {"id":"docs/","type":"directory","title":"docs","path":"docs/"},
        {"id":"gone.md","type":"file","title":"gone","path":"gone.md"}
    ],
    "edges":[
        {"source":"a.md","target":"docs/"},
        {"source":"a.md","target":"missing.md"}
    ]
}"#;

fn doc(path: &str, html: &str) -> String {
    serde_json::json!({
        "path": path,
        "content": format!("# {}", path),
        "html": html,
        "links": null,
    })
    .to_string()
}

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FILES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GRAPH))
        .mount(&server)
        .await;
    server
}

async fn serve_doc(server: &MockServer, file: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/files/{}", file)))
        .respond_with(ResponseTemplate::new(200).set_body_string(doc(file, html)))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), Credentials::new("admin", "changeme")).unwrap()
}

fn gated_state(debounce: Duration) -> (AppState, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = RenderPipeline::new(
        Arc::new(MathMlRenderer),
        Arc::new(GatedDiagrams {
            gate: Arc::clone(&gate),
        }),
    );
    (AppState::new(pipeline, LinkResolver::default(), debounce), gate)
}

async fn logged_in(server: &MockServer) -> AppState {
    let mut state = AppState::default();
    state.login(client(server)).await.unwrap();
    state
}

const MERMAID_A: &str = "<h1>A</h1><pre><code class=\"language-mermaid\">graph A</code></pre>";
const MERMAID_B: &str = "<h1>B</h1><pre><code class=\"language-mermaid\">graph B</code></pre>";

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_login_loads_tree_and_graph() {
    let server = backend().await;
    let state = logged_in(&server).await;

    assert!(state.is_logged_in());
    assert_eq!(state.files().len(), 5);
    assert_eq!(state.tree().roots.len(), 3);
    assert_eq!(state.graph().node_count(), 3);
    assert!(state.notices().is_empty());
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut state = AppState::default();
    let err = state.login(client(&server)).await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert!(!state.is_logged_in());
    assert_eq!(state.notices()[0].kind, NoticeKind::Error);
}

#[tokio::test]
async fn test_logout_resets_everything() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    let mut state = logged_in(&server).await;
    state.load_file("a.md").await.unwrap();
    state.toggle_graph();

    state.logout();

    assert!(!state.is_logged_in());
    assert!(state.document().is_none());
    assert!(state.files().is_empty());
    assert!(state.tree().is_empty());
    assert_eq!(state.graph().node_count(), 0);
    assert!(!state.show_graph());
}

// ============================================================================
// Graph
// ============================================================================

#[tokio::test]
async fn test_dangling_edge_is_tolerated() {
    let server = backend().await;
    let state = logged_in(&server).await;

    assert_eq!(state.graph().edge_count(), 1);
    assert_eq!(state.graph().dangling_edges().len(), 1);
    assert_eq!(state.graph().dangling_edges()[0].target, "missing.md");
    assert!(state.notices().is_empty());
}

#[tokio::test]
async fn test_click_directory_selects_only() {
    let server = backend().await;
    let mut state = logged_in(&server).await;
    state.toggle_graph();

    let action = state.click_graph_node("docs/").await.unwrap().unwrap();

    assert_eq!(action.navigate, None);
    assert_eq!(state.selected_node().unwrap().id, "docs/");
    assert!(state.show_graph());
    assert!(state.document().is_none());
}

#[tokio::test]
async fn test_click_file_selection_survives_failed_navigation() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    Mock::given(method("GET"))
        .and(path("/api/files/gone.md"))
        .respond_with(ResponseTemplate::new(404).set_body_string("file not found"))
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;
    state.load_file("a.md").await.unwrap();
    state.toggle_graph();

    let result = state.click_graph_node("gone.md").await;

    assert!(result.is_err());
    assert_eq!(state.selected_node().unwrap().id, "gone.md");
    assert!(!state.show_graph());
    // The previous document stays on display.
    assert_eq!(state.document().unwrap().path(), "a.md");
    assert_eq!(state.notices().len(), 1);
}

#[tokio::test]
async fn test_click_unknown_node_is_ignored() {
    let server = backend().await;
    let mut state = logged_in(&server).await;

    assert!(state.click_graph_node("nope").await.unwrap().is_none());
    assert!(state.selected_node().is_none());
}

// ============================================================================
// Documents and staleness
// ============================================================================

#[tokio::test]
async fn test_late_outcome_never_touches_newer_document() {
    let server = backend().await;
    serve_doc(&server, "a.md", MERMAID_A).await;
    serve_doc(&server, "b.md", MERMAID_B).await;
    let (mut state, gate) = gated_state(Duration::from_secs(1));
    state.login(client(&server)).await.unwrap();

    state.load_file("a.md").await.unwrap();
    assert_eq!(state.phase(), Some(RenderPhase::DiagramsPending));
    state.load_file("b.md").await.unwrap();

    // Release only A's job; it queued first.
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.pump(), 0);

    let document = state.document().unwrap();
    assert_eq!(document.path(), "b.md");
    assert_eq!(document.display().pending_count(), 1);
    assert!(!document.html().contains("<svg>"));

    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), state.settle())
        .await
        .unwrap();

    let html = state.document().unwrap().html();
    assert!(html.contains("<svg>graph B</svg>"));
    assert!(!html.contains("graph A"));
    assert_eq!(state.phase(), Some(RenderPhase::Settled));
}

#[tokio::test]
async fn test_opened_document_counts_its_diagrams() {
    let server = backend().await;
    let html = format!("{}{}", MERMAID_A, "<pre><code class=\"language-mermaid\">graph C</code></pre>");
    serve_doc(&server, "a.md", &html).await;
    let (mut state, gate) = gated_state(Duration::from_secs(1));
    state.login(client(&server)).await.unwrap();

    state.load_file("a.md").await.unwrap();

    let document = state.document().unwrap();
    assert_eq!(document.path(), "a.md");
    assert_eq!(document.content(), "# a.md");
    assert_eq!(document.display().pending_count(), 2);

    gate.add_permits(2);
    tokio::time::timeout(Duration::from_secs(5), state.settle())
        .await
        .unwrap();
    assert_eq!(state.document().unwrap().display().pending_count(), 0);
}

#[tokio::test]
async fn test_superseded_response_is_dropped() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    serve_doc(&server, "b.md", "<p>B</p>").await;
    let mut state = logged_in(&server).await;

    let first = state.begin_load("a.md").unwrap();
    let second = state.begin_load("b.md").unwrap();
    let second = second.fetch().await;
    let first = first.fetch().await;

    assert!(state.complete_load(second).unwrap());
    assert!(!state.complete_load(first).unwrap());
    assert_eq!(state.document().unwrap().path(), "b.md");
}

#[tokio::test]
async fn test_failed_load_keeps_previous_document() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    Mock::given(method("GET"))
        .and(path("/api/files/b.md"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;
    state.load_file("a.md").await.unwrap();

    assert!(state.load_file("b.md").await.is_err());

    assert_eq!(state.document().unwrap().path(), "a.md");
    assert_eq!(state.phase(), Some(RenderPhase::Settled));
    assert_eq!(state.notices().len(), 1);
}

#[tokio::test]
async fn test_plain_file_is_escaped() {
    let server = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/files/docs/data.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"path":"docs/data.csv","content":"a<b,c"}"#),
        )
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;

    state.load_file("docs/data.csv").await.unwrap();

    assert_eq!(state.document().unwrap().html(), "<pre>a&lt;b,c</pre>");
}

// ============================================================================
// Tree selection and links
// ============================================================================

#[tokio::test]
async fn test_tree_selection_rules() {
    let server = backend().await;
    serve_doc(&server, "docs/x.md", "<p>X</p>").await;
    let mut state = logged_in(&server).await;

    assert_eq!(
        state.select_tree_path("docs").await.unwrap(),
        TreeSelection::Toggled(true)
    );
    assert_eq!(
        state.select_tree_path("docs/data.csv").await.unwrap(),
        TreeSelection::Ignored
    );
    assert_eq!(
        state.select_tree_path("docs/x.md").await.unwrap(),
        TreeSelection::Opened
    );
    assert_eq!(state.document().unwrap().path(), "docs/x.md");
}

#[tokio::test]
async fn test_expanded_directories_survive_reload() {
    let server = backend().await;
    let mut state = logged_in(&server).await;
    state.select_tree_path("docs").await.unwrap();

    state.load_files().await.unwrap();

    assert!(state.tree().find("docs").unwrap().expanded);
}

#[tokio::test]
async fn test_follow_link_navigates_and_opens_external() {
    let server = backend().await;
    serve_doc(&server, "docs/x.md", "<p>X</p>").await;
    let opened = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&opened);
    let mut state = AppState::default().with_opener(Arc::new(move |url: &str| -> std::io::Result<()> {
        sink.lock().unwrap().push(url.to_string());
        Ok(())
    }));
    state.login(client(&server)).await.unwrap();

    let action = state.follow_link("/docs/x").await.unwrap();
    assert_eq!(
        action,
        ResolvedAction::Navigate {
            path: "docs/x.md".to_string()
        }
    );
    assert_eq!(state.document().unwrap().path(), "docs/x.md");

    state.follow_link("https://example.com").await.unwrap();
    assert_eq!(*opened.lock().unwrap(), vec!["https://example.com".to_string()]);
    // External links never replace the document.
    assert_eq!(state.document().unwrap().path(), "docs/x.md");

    assert!(matches!(
        state.follow_link("#top").await.unwrap(),
        ResolvedAction::Unsupported { .. }
    ));
}

// ============================================================================
// Editing, saving and deleting
// ============================================================================

#[tokio::test]
async fn test_autosave_writes_last_edit_and_marks_graph_stale() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    Mock::given(method("PUT"))
        .and(path("/api/files/a.md"))
        .and(body_json(serde_json::json!({"content": "third"})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let (mut state, _) = gated_state(Duration::from_millis(50));
    state.login(client(&server)).await.unwrap();
    state.load_file("a.md").await.unwrap();

    assert!(state.set_content("first"));
    assert!(state.set_content("second"));
    assert!(state.set_content("third"));
    assert!(state.autosave_pending());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(state.pump(), 1);
    assert!(state.is_graph_stale());
    assert_eq!(state.notices()[0].kind, NoticeKind::Info);
    assert!(state.reload_graph_if_stale().await);
    assert!(!state.is_graph_stale());
}

#[tokio::test]
async fn test_autosave_skips_cleared_buffer() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    Mock::given(method("PUT"))
        .and(path("/api/files/a.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(0)
        .mount(&server)
        .await;
    let (mut state, _) = gated_state(Duration::from_millis(50));
    state.login(client(&server)).await.unwrap();
    state.load_file("a.md").await.unwrap();

    assert!(state.set_content("draft"));
    assert!(state.set_content(""));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(state.pump(), 0);
    assert!(!state.autosave_pending());
    assert!(!state.is_graph_stale());
    assert_eq!(state.document().unwrap().content(), "");
}

#[tokio::test]
async fn test_save_reloads_graph() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FILES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GRAPH))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/files/a.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;

    state.save_file("a.md", "updated").await.unwrap();
}

#[tokio::test]
async fn test_delete_clears_current_document() {
    let server = backend().await;
    serve_doc(&server, "a.md", "<p>A</p>").await;
    Mock::given(method("DELETE"))
        .and(path("/api/files/a.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;
    state.load_file("a.md").await.unwrap();
    state.set_content("unsaved");

    state.delete_file("a.md").await.unwrap();

    assert!(state.document().is_none());
    assert!(!state.autosave_pending());
}

#[tokio::test]
async fn test_failed_reload_leaves_tree_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FILES))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GRAPH))
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;
    let before = state.tree().clone();

    assert!(state.load_files().await.is_err());

    assert_eq!(*state.tree(), before);
    assert_eq!(state.files().len(), 5);
    assert_eq!(state.notices().len(), 1);
}

#[tokio::test]
async fn test_backlinks_and_search() {
    let server = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/backlinks/docs/x.md"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"path":"docs/x.md","backlinks":["a.md"]}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;
    let mut state = logged_in(&server).await;

    assert_eq!(state.backlinks("docs/x.md").await.unwrap(), vec!["a.md"]);
    assert!(state.search("nothing").await.unwrap().is_empty());
}
