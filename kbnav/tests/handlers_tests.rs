use kbnav::handlers::*;
use kbnav_client::{FileRecord, GraphPayload, SearchHit};
use kbnav_core::config::Config;
use kbnav_core::graph::GraphModel;
use kbnav_core::links::{LinkRef, LinkResolver};
use kbnav_core::tree::FileTree;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const FILES: &str = r#"[
    {"path":"index.md","name":"index.md","isDir":false},
    {"path":"notes","name":"notes","isDir":true},
    {"path":"notes/idea.md","name":"idea.md","isDir":false}
]"#;

const GRAPH: &str = r#"{
    "nodes":[
        {"id":"index.md","type":"file","title":"index","path":"index.md"},
        {"id":"notes/idea.md","type":"file","title":"idea","path":"notes/idea.md"}
    ],
    "edges":[{"source":"index.md","target":"notes/idea.md"}]
}"#;

const INDEX: &str = r##"{
    "path":"index.md",
    "content":"# Index",
    "html":"<h1>Index</h1><p>See <a href=\"/notes/idea\">the idea</a> or <a href=\"https://example.com\">elsewhere</a>.</p><pre><code class=\"language-mermaid\">graph TD; A--&gt;B</code></pre>",
    "links":null
}"##;

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
    Mock::given(method("GET"))
        .and(path("/api/files/index.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> Config {
    Config {
        server_url: server.uri(),
        password: "changeme".to_string(),
        ..Config::default()
    }
}

// ============================================================================
// Formatting
// ============================================================================

#[test]
fn test_format_tree_shows_every_level() {
    let tree = FileTree::from_records(&[
        FileRecord::file("notes/idea.md"),
        FileRecord::file("index.md"),
    ]);

    assert_eq!(format_tree(&tree), vec!["index.md", "notes/", "  idea.md"]);
}

#[test]
fn test_format_graph_lists_outgoing_references() {
    let payload: GraphPayload = serde_json::from_str(GRAPH).unwrap();
    let graph = GraphModel::from_payload(payload);

    assert_eq!(
        format_graph(&graph),
        vec!["[file] index.md -> notes/idea.md", "[file] notes/idea.md"]
    );
}

#[test]
fn test_format_links_numbers_and_classifies() {
    let links = vec![
        LinkRef {
            href: "/notes/idea".to_string(),
            text: "idea".to_string(),
        },
        LinkRef {
            href: "#top".to_string(),
            text: String::new(),
        },
    ];

    let lines = format_links(&links, &LinkResolver::default());
    assert_eq!(lines[0], "[1] idea (/notes/idea) → navigate notes/idea.md");
    assert_eq!(lines[1], "[2] #top → unsupported (anchor)");
}

#[test]
fn test_format_hits_falls_back_to_path() {
    let hits = vec![SearchHit {
        path: "notes/idea.md".to_string(),
        title: String::new(),
        snippet: String::new(),
    }];

    assert_eq!(format_hits(&hits), vec!["notes/idea.md (notes/idea.md)"]);
}

// ============================================================================
// Content and config
// ============================================================================

#[test]
fn test_read_content_inline() {
    let content = read_content(Some(&"hello".to_string()), None).unwrap();
    assert_eq!(content, "hello");
}

#[test]
fn test_read_content_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    write!(temp_file, "# From disk")?;

    let path = PathBuf::from(temp_file.path());
    assert_eq!(read_content(None, Some(&path))?, "# From disk");
    Ok(())
}

#[test]
fn test_read_content_missing_file() {
    let path = PathBuf::from("/definitely/not/here.md");
    assert!(read_content(None, Some(&path)).is_err());
    assert!(read_content(None, None).is_err());
}

#[test]
fn test_init_config_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kbnav").join("config.json");

    init_config(&path, false).unwrap();
    assert!(path.exists());
    assert!(init_config(&path, false).is_err());
    assert!(init_config(&path, true).is_ok());
}

// ============================================================================
// Against a server
// ============================================================================

#[tokio::test]
async fn test_connect_loads_tree_and_graph() {
    let server = backend().await;
    let state = connect(&config_for(&server)).await.unwrap();

    assert!(state.is_logged_in());
    assert_eq!(format_tree(state.tree()).len(), 3);
    assert_eq!(state.graph().edge_count(), 1);
}

#[tokio::test]
async fn test_connect_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(connect(&config_for(&server)).await.is_err());
}

#[tokio::test]
async fn test_open_document_settles_diagrams() {
    let server = backend().await;
    let mut state = connect(&config_for(&server)).await.unwrap();

    open_document(&mut state, "index.md").await.unwrap();

    let document = state.document().unwrap();
    assert!(document.display().is_settled());

    let html = render_document(document, state.resolver(), true);
    assert!(html.contains("diagram-source"));
    assert!(html.contains("graph TD; A--&gt;B"));

    let text = render_document(document, state.resolver(), false);
    assert!(text.contains("Index"));
    assert!(text.contains("Links:"));
    assert!(text.contains("[1] the idea (/notes/idea) → navigate notes/idea.md"));
    assert!(text.contains("[2] elsewhere (https://example.com) → external https://example.com"));
}

#[tokio::test]
async fn test_open_document_missing() {
    let server = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/files/nope.md"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    let mut state = connect(&config_for(&server)).await.unwrap();

    assert!(open_document(&mut state, "nope.md").await.is_err());
    assert!(state.document().is_none());
}
