use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use kbnav_client::SearchHit;
use kbnav_core::config::{Config, Overrides};
use kbnav_core::graph::GraphModel;
use kbnav_core::links::{LinkRef, LinkResolver, ResolvedAction};
use kbnav_core::state::{AppState, CurrentDocument};
use kbnav_core::tree::{FileTree, TreeNode};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// ===== Setup =====

pub fn config_path(args: &ArgMatches) -> PathBuf {
    let raw = args
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(kbnav_core::config::DEFAULT_CONFIG_PATH);
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Load the config file and layer flags and environment on top.
pub fn load_config(args: &ArgMatches) -> Result<Config> {
    let path = config_path(args);
    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_overrides(Overrides {
        server_url: args.get_one::<String>("server").cloned(),
        username: args.get_one::<String>("user").cloned(),
        password: args.get_one::<String>("password").cloned(),
    });
    Ok(config)
}

/// Build the state container and log in with the configured credentials.
pub async fn connect(config: &Config) -> Result<AppState> {
    let client = config.client()?;
    let mut state = AppState::from_config(config)?;
    state
        .login(client)
        .await
        .with_context(|| format!("Could not reach {}", config.server_url))?;
    Ok(state)
}

fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.into());
    spinner
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

// ===== Formatting =====

/// Every node of the tree, fully expanded, one indented line each.
pub fn format_tree(tree: &FileTree) -> Vec<String> {
    fn walk(nodes: &[TreeNode], depth: usize, out: &mut Vec<String>) {
        for node in nodes {
            let name = if node.is_dir {
                format!("{}/", node.name)
            } else {
                node.name.clone()
            };
            out.push(format!("{}{}", "  ".repeat(depth), name));
            walk(&node.children, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(&tree.roots, 0, &mut out);
    out
}

/// Nodes sorted by id with their outgoing references.
pub fn format_graph(graph: &GraphModel) -> Vec<String> {
    let mut nodes: Vec<_> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    nodes
        .into_iter()
        .map(|node| {
            let targets: Vec<&str> = graph.outgoing(&node.id).iter().map(|n| n.id.as_str()).collect();
            if targets.is_empty() {
                format!("[{}] {}", node.kind.as_str(), node.id)
            } else {
                format!("[{}] {} -> {}", node.kind.as_str(), node.id, targets.join(", "))
            }
        })
        .collect()
}

pub fn describe_action(action: &ResolvedAction) -> String {
    match action {
        ResolvedAction::External { url } => format!("external {}", url),
        ResolvedAction::Navigate { path } => format!("navigate {}", path),
        ResolvedAction::Unsupported { reason } => format!("unsupported ({})", reason),
    }
}

/// Numbered link list, each entry with where following it would lead.
pub fn format_links(links: &[LinkRef], resolver: &LinkResolver) -> Vec<String> {
    links
        .iter()
        .enumerate()
        .map(|(i, link)| {
            let action = describe_action(&resolver.resolve(&link.href));
            if link.text.is_empty() {
                format!("[{}] {} → {}", i + 1, link.href, action)
            } else {
                format!("[{}] {} ({}) → {}", i + 1, link.text, link.href, action)
            }
        })
        .collect()
}

pub fn format_hits(hits: &[SearchHit]) -> Vec<String> {
    hits.iter()
        .map(|hit| {
            let title = if hit.title.is_empty() { &hit.path } else { &hit.title };
            if hit.snippet.is_empty() {
                format!("{} ({})", title, hit.path)
            } else {
                format!("{} ({})\n    {}", title, hit.path, hit.snippet.trim())
            }
        })
        .collect()
}

/// Content for `write`: inline text, or the contents of a local file.
pub fn read_content(content: Option<&String>, file: Option<&PathBuf>) -> Result<String> {
    match (content, file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => bail!("Either --content or --file must be provided"),
    }
}

/// Display output for an opened document.
pub fn render_document(document: &CurrentDocument, resolver: &LinkResolver, html: bool) -> String {
    if html {
        return document.html();
    }
    let mut out = document.text();
    let links = format_links(&document.anchors(), resolver);
    if !links.is_empty() {
        out.push_str("\n\nLinks:\n");
        out.push_str(&links.join("\n"));
    }
    out
}

// ===== Handlers =====

pub fn handle_init(args: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let path = match sub.get_one::<String>("PATH") {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
        None => config_path(args),
    };
    let force = sub.get_flag("force");

    print_divider();
    println!("{}", "  KBNAV INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    init_config(&path, force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display().to_string().bright_white()
    );
    println!("{} Edit server_url, username and password to connect", "ℹ".blue());
    Ok(())
}

pub fn init_config(path: &Path, force: bool) -> Result<Config> {
    if force && path.exists() {
        println!("{} Overwriting existing config (force mode)", "→".yellow().bold());
    }
    Ok(Config::init(path, force)?)
}

pub fn handle_tree(state: &AppState) -> Result<()> {
    if state.tree().is_empty() {
        println!("{}", "No files".dimmed());
        return Ok(());
    }
    for line in format_tree(state.tree()) {
        println!("{}", line);
    }
    Ok(())
}

pub fn handle_graph(state: &AppState) -> Result<()> {
    let graph = state.graph();
    println!(
        "{} {} nodes, {} edges",
        "Graph:".bright_blue().bold(),
        graph.node_count(),
        graph.edge_count()
    );
    for line in format_graph(graph) {
        println!("  {}", line);
    }
    for edge in graph.dangling_edges() {
        println!(
            "  {} {} -> {} (endpoint missing)",
            "⚠".yellow(),
            edge.source,
            edge.target
        );
    }
    Ok(())
}

/// Fetch and render `path`, waiting for every diagram to resolve.
pub async fn open_document(state: &mut AppState, path: &str) -> Result<()> {
    let progress = spinner(format!("Rendering {}", path));
    let loaded = state.load_file(path).await;
    if loaded.is_ok() {
        progress.set_message(format!("Waiting for diagrams in {}", path));
        state.settle().await;
    }
    progress.finish_and_clear();
    loaded.with_context(|| format!("Failed to open {}", path))?;
    Ok(())
}

pub async fn handle_open(state: &mut AppState, sub: &ArgMatches) -> Result<()> {
    let path = sub
        .get_one::<String>("PATH")
        .context("missing document path")?;
    let html = sub.get_flag("html");

    open_document(state, path).await?;
    let document = state
        .document()
        .with_context(|| format!("{} could not be displayed", path))?;
    debug!("Opened {} ({})", document.path(), document.phase());

    if !html {
        print_divider();
        println!("{}", document.path().bright_white().bold());
        print_divider();
    }
    println!("{}", render_document(document, state.resolver(), html));
    Ok(())
}

pub fn handle_resolve(config: &Config, sub: &ArgMatches) -> Result<()> {
    let href = sub.get_one::<String>("HREF").context("missing href")?;
    println!("{}", describe_action(&config.link_resolver().resolve(href)));
    Ok(())
}

pub async fn handle_backlinks(state: &mut AppState, sub: &ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("PATH").context("missing document path")?;
    let backlinks = state.backlinks(path).await?;
    if backlinks.is_empty() {
        println!("{}", format!("Nothing links to {}", path).dimmed());
    }
    for source in backlinks {
        println!("{} {}", "←".blue(), source);
    }
    Ok(())
}

pub async fn handle_search(state: &mut AppState, sub: &ArgMatches) -> Result<()> {
    let query = sub.get_one::<String>("QUERY").context("missing query")?;
    let hits = state.search(query).await?;
    println!("{} {} result(s)", "Search:".bright_blue().bold(), hits.len());
    for line in format_hits(&hits) {
        println!("  {}", line);
    }
    Ok(())
}

pub async fn handle_write(state: &mut AppState, sub: &ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("PATH").context("missing document path")?;
    let content = read_content(
        sub.get_one::<String>("content"),
        sub.get_one::<PathBuf>("file"),
    )?;
    state.save_file(path, &content).await?;
    println!("{} Saved {}", "✓".green().bold(), path);
    Ok(())
}

pub async fn handle_delete(state: &mut AppState, sub: &ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("PATH").context("missing document path")?;
    state.delete_file(path).await?;
    println!("{} Deleted {}", "✓".green().bold(), path);
    Ok(())
}

pub async fn handle_ui(config: &Config) -> Result<()> {
    let state = connect(config).await?;
    kbnav_tui::run(state).await
}
