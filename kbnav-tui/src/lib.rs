mod panes;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use kbnav_core::links::ResolvedAction;
use kbnav_core::state::{AppState, NoticeKind, TreeSelection};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const HISTORY_FILE: &str = ".kbnav_history";
const HISTORY_LIMIT: usize = 100;
const OUTPUT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExitMode {
    Normal,    // exit, quit - ask about saving
    ForceQuit, // :q! - don't save, don't ask
    WriteQuit, // :wq!, ZZ - save and quit, don't ask
}

pub struct App {
    state: AppState,
    input: String,
    history: Vec<String>,
    output: Vec<String>,
    cursor_position: usize,
    should_quit: bool,
    doc_scroll: usize,
    history_index: Option<usize>,
    temp_input: String,
    awaiting_save_confirmation: bool,
    notices_seen: usize,
    // Rendered document lines, rebuilt when `dirty` is set.
    doc_lines: Vec<String>,
    dirty: bool,
}

impl App {
    pub fn new(state: AppState) -> Self {
        let mut app = Self {
            state,
            input: String::new(),
            history: Vec::new(),
            output: Vec::new(),
            cursor_position: 0,
            should_quit: false,
            doc_scroll: 0,
            history_index: None,
            temp_input: String::new(),
            awaiting_save_confirmation: false,
            notices_seen: 0,
            doc_lines: Vec::new(),
            dirty: true,
        };

        match app.state.client() {
            Some(client) => {
                let line = format!("  Connected to {} as {}", client.base_url(), client.username());
                app.add_output(line);
            }
            None => app.add_output("  Not connected."),
        }
        app.add_output(format!(
            "  {} files, {} graph nodes. Type 'help' for commands, 'exit' to quit.",
            app.state.files().len(),
            app.state.graph().node_count()
        ));
        app.add_output("");
        app
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn add_output(&mut self, message: impl Into<String>) {
        self.output.push(message.into());
        if self.output.len() > OUTPUT_LIMIT {
            self.output.drain(0..self.output.len() - OUTPUT_LIMIT);
        }
    }

    pub fn navigate_history_backward(&mut self) {
        if self.history.is_empty() {
            return;
        }

        if self.history_index.is_none() {
            self.temp_input = self.input.clone();
        }

        let idx = match self.history_index {
            None => self.history.len() - 1,
            Some(0) => 0,
            Some(idx) => idx - 1,
        };
        self.history_index = Some(idx);
        self.input = self.history[idx].clone();
        self.cursor_position = self.input.len();
    }

    pub fn navigate_history_forward(&mut self) {
        let Some(idx) = self.history_index else {
            return;
        };

        if idx + 1 >= self.history.len() {
            // Reached the end, restore temp input
            self.input = std::mem::take(&mut self.temp_input);
            self.cursor_position = self.input.len();
            self.history_index = None;
            return;
        }

        self.history_index = Some(idx + 1);
        self.input = self.history[idx + 1].clone();
        self.cursor_position = self.input.len();
    }

    fn history_file_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(HISTORY_FILE)
    }

    pub fn load_history(&mut self) {
        if let Ok(content) = fs::read_to_string(Self::history_file_path()) {
            let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
            if lines.len() > HISTORY_LIMIT {
                lines.drain(0..lines.len() - HISTORY_LIMIT);
            }
            self.history = lines;
        }
    }

    pub fn save_history(&self) -> Result<()> {
        fs::write(Self::history_file_path(), self.history.join("\n"))?;
        Ok(())
    }

    fn request_exit(&mut self, mode: ExitMode) {
        match mode {
            ExitMode::Normal => {
                if !self.history.is_empty() {
                    self.awaiting_save_confirmation = true;
                    self.add_output("");
                    self.add_output(format!("Save command history to ~/{}? [y/N]:", HISTORY_FILE));
                } else {
                    self.should_quit = true;
                }
            }
            ExitMode::ForceQuit => {
                self.should_quit = true;
            }
            ExitMode::WriteQuit => {
                self.write_history();
                self.should_quit = true;
            }
        }
    }

    fn write_history(&mut self) {
        if self.history.is_empty() {
            return;
        }
        match self.save_history() {
            Ok(()) => self.add_output(format!("History saved to ~/{}", HISTORY_FILE)),
            Err(e) => self.add_output(format!("Error saving history: {}", e)),
        }
    }

    fn handle_save_confirmation(&mut self, response: &str) {
        self.awaiting_save_confirmation = false;

        let response = response.trim().to_lowercase();
        if response == "y" || response == "yes" {
            self.write_history();
        } else {
            self.add_output("History not saved.");
        }
        self.should_quit = true;
    }

    /// Apply background outcomes. Called once per frame.
    pub async fn tick(&mut self) {
        if self.state.pump() > 0 {
            self.dirty = true;
        }
        if self.state.reload_graph_if_stale().await {
            self.dirty = true;
        }
        self.echo_notices();
    }

    fn echo_notices(&mut self) {
        let notices = self.state.notices();
        if notices.len() < self.notices_seen {
            self.notices_seen = 0;
        }
        let fresh: Vec<String> = notices[self.notices_seen..]
            .iter()
            .map(|n| {
                let level = match n.kind {
                    NoticeKind::Info => "INFO ",
                    NoticeKind::Error => "ERROR",
                };
                format!("{} [{}] {}", chrono::Local::now().format("%H:%M:%S"), level, n.message)
            })
            .collect();
        self.notices_seen = notices.len();
        for line in fresh {
            self.add_output(line);
        }
    }

    pub async fn handle_input(&mut self, input: String) {
        if input.is_empty() {
            return;
        }

        if self.awaiting_save_confirmation {
            self.handle_save_confirmation(&input);
            return;
        }

        self.history.push(input.clone());
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.history_index = None;
        self.temp_input.clear();

        self.add_output(format!("> {}", input));

        let trimmed = input.trim();
        let (command, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };

        // Failures are reported through notices, echoed after the command.
        match command {
            "exit" | "quit" => self.request_exit(ExitMode::Normal),
            ":q!" => self.request_exit(ExitMode::ForceQuit),
            ":wq!" | "ZZ" => self.request_exit(ExitMode::WriteQuit),
            "help" => self.print_help(),
            "clear" => self.output.clear(),
            "files" => self.print_files(),
            "tree" => self.print_tree(),
            "expand" => self.expand(rest).await,
            "open" => self.open(rest).await,
            "links" => self.print_links(),
            "follow" => self.follow(rest).await,
            "graph" => {
                let on = self.state.toggle_graph();
                self.add_output(format!("Graph view {}", if on { "on" } else { "off" }));
            }
            "click" => self.click(rest).await,
            "backlinks" => self.backlinks(rest).await,
            "search" => self.search(rest).await,
            "append" => self.append(rest),
            "save" => {
                if self.state.document().is_none() {
                    self.add_output("No document open");
                } else if self.state.save_current().await.is_ok() {
                    self.add_output("Saved");
                }
            }
            "delete" => {
                if rest.is_empty() {
                    self.add_output("Error: delete requires a path");
                } else if self.state.delete_file(rest).await.is_ok() {
                    self.add_output(format!("Deleted {}", rest));
                }
            }
            "toggle" => self.toggle(rest),
            "notices" => self.print_notices(rest),
            _ => {
                self.add_output(format!("Unknown command: {}", command));
                self.add_output("Type 'help' for available commands");
            }
        }

        self.dirty = true;
        self.echo_notices();
    }

    fn print_help(&mut self) {
        for line in [
            "Available commands:",
            "  files                       - List every file",
            "  tree                        - Show the expanded file tree",
            "  expand <dir|file>           - Toggle a directory, or open a document",
            "  open <path>                 - Open a document",
            "  links                       - Number the links in the open document",
            "  follow <n|href>             - Follow a numbered link or a raw href",
            "  graph                       - Toggle the graph view",
            "  click <node-id>             - Select a graph node (files open)",
            "  backlinks [path]            - Documents linking to path (default: open one)",
            "  search <query>              - Full-text search",
            "  append <text>               - Append a line to the open document (auto-saved)",
            "  save                        - Save the open document now",
            "  delete <path>               - Delete a file",
            "  toggle graph|preview|sidebar",
            "  notices [clear]             - Show or clear notices",
            "  clear                       - Clear the output",
            "  exit, quit                  - Exit",
        ] {
            self.add_output(line);
        }
    }

    fn print_files(&mut self) {
        let lines: Vec<String> = self
            .state
            .files()
            .iter()
            .map(|f| format!("  {}{}", f.path, if f.is_dir { "/" } else { "" }))
            .collect();
        self.add_output(format!("{} entries", lines.len()));
        for line in lines {
            self.add_output(line);
        }
    }

    fn print_tree(&mut self) {
        let lines = panes::tree_lines(self.state.tree());
        if lines.is_empty() {
            self.add_output("(empty)");
        }
        for line in lines {
            self.add_output(line);
        }
    }

    async fn expand(&mut self, path: &str) {
        if path.is_empty() {
            self.add_output("Error: expand requires a path");
            return;
        }
        match self.state.select_tree_path(path).await {
            Ok(TreeSelection::Toggled(true)) => self.add_output(format!("Expanded {}", path)),
            Ok(TreeSelection::Toggled(false)) => self.add_output(format!("Collapsed {}", path)),
            Ok(TreeSelection::Opened) => self.opened(),
            Ok(TreeSelection::Ignored) => self.add_output(format!("Not a document or directory: {}", path)),
            Err(_) => {}
        }
    }

    async fn open(&mut self, path: &str) {
        if path.is_empty() {
            self.add_output("Error: open requires a path");
            return;
        }
        if let Ok(true) = self.state.load_file(path).await {
            self.opened();
        }
    }

    fn opened(&mut self) {
        self.doc_scroll = 0;
        if let Some(doc) = self.state.document() {
            let line = format!(
                "Opened {} ({} diagram(s) pending)",
                doc.path(),
                doc.display().pending_count()
            );
            self.add_output(line);
        }
    }

    fn print_links(&mut self) {
        let Some(doc) = self.state.document() else {
            self.add_output("No document open");
            return;
        };
        let anchors = doc.anchors();
        let wikilinks: Vec<String> = doc
            .wikilinks()
            .iter()
            .map(|l| format!("  [[{}]]{}", l.target, if l.alias.is_empty() { String::new() } else { format!(" ({})", l.alias) }))
            .collect();

        if anchors.is_empty() {
            self.add_output("No links");
        }
        for (i, link) in anchors.iter().enumerate() {
            self.add_output(format!("  {:>3}. {} -> {}", i + 1, link.text, link.href));
        }
        if !wikilinks.is_empty() {
            self.add_output("Wikilinks:");
            for line in wikilinks {
                self.add_output(line);
            }
        }
    }

    async fn follow(&mut self, target: &str) {
        if target.is_empty() {
            self.add_output("Error: follow requires a link number or href");
            return;
        }
        let href = match target.parse::<usize>() {
            Ok(n) => {
                let anchors = self.state.document().map(|d| d.anchors()).unwrap_or_default();
                match n.checked_sub(1).and_then(|i| anchors.get(i)) {
                    Some(link) => link.href.clone(),
                    None => {
                        self.add_output(format!("No link numbered {}", n));
                        return;
                    }
                }
            }
            Err(_) => target.to_string(),
        };

        match self.state.follow_link(&href).await {
            Ok(ResolvedAction::Navigate { .. }) => self.opened(),
            Ok(ResolvedAction::External { url }) => self.add_output(format!("Opened {} externally", url)),
            Ok(ResolvedAction::Unsupported { reason }) => {
                self.add_output(format!("Link not followed ({}): {}", reason, href))
            }
            Err(_) => {}
        }
    }

    async fn click(&mut self, id: &str) {
        match self.state.click_graph_node(id).await {
            Ok(Some(action)) => {
                self.add_output(format!("Selected {} ({})", action.select.id, action.select.kind.as_str()));
                if action.navigate.is_some() {
                    self.opened();
                }
            }
            Ok(None) => self.add_output(format!("No graph node {}", id)),
            Err(_) => {}
        }
    }

    async fn backlinks(&mut self, path: &str) {
        let path = if path.is_empty() {
            match self.state.document() {
                Some(doc) => doc.path().to_string(),
                None => {
                    self.add_output("Error: backlinks requires a path when no document is open");
                    return;
                }
            }
        } else {
            path.to_string()
        };

        let local: Vec<String> = self
            .state
            .graph()
            .incoming(&path)
            .iter()
            .map(|n| n.id.clone())
            .collect();
        if let Ok(backlinks) = self.state.backlinks(&path).await {
            self.add_output(format!("{} backlink(s) to {}", backlinks.len(), path));
            for link in backlinks {
                self.add_output(format!("  {}", link));
            }
        }
        if !local.is_empty() {
            self.add_output(format!("Graph: {}", local.join(", ")));
        }
    }

    async fn search(&mut self, query: &str) {
        if query.is_empty() {
            self.add_output("Error: search requires a query");
            return;
        }
        if let Ok(hits) = self.state.search(query).await {
            self.add_output(format!("{} result(s)", hits.len()));
            for hit in hits {
                self.add_output(format!("  {} - {}", hit.path, hit.snippet.trim()));
            }
        }
    }

    fn append(&mut self, text: &str) {
        let Some(doc) = self.state.document() else {
            self.add_output("No document open");
            return;
        };
        let mut content = doc.content().to_string();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(text);
        self.state.set_content(content);
        self.add_output("Edited; auto-save pending");
    }

    fn toggle(&mut self, what: &str) {
        let (name, on) = match what {
            "graph" => ("graph", self.state.toggle_graph()),
            "preview" => ("preview", self.state.toggle_preview()),
            "sidebar" => ("sidebar", !self.state.toggle_sidebar()),
            _ => {
                self.add_output("Usage: toggle graph|preview|sidebar");
                return;
            }
        };
        self.add_output(format!("{} {}", name, if on { "on" } else { "off" }));
    }

    fn print_notices(&mut self, arg: &str) {
        if arg == "clear" {
            self.state.clear_notices();
            self.notices_seen = 0;
            self.add_output("Notices cleared");
            return;
        }
        let lines: Vec<String> = self
            .state
            .notices()
            .iter()
            .map(|n| format!("  {:?}: {}", n.kind, n.message))
            .collect();
        if lines.is_empty() {
            self.add_output("No notices");
        }
        for line in lines {
            self.add_output(line);
        }
    }

    fn refresh_document(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.doc_lines = match self.state.document() {
            Some(doc) if self.state.show_preview() => doc.text().lines().map(str::to_string).collect(),
            Some(doc) => doc.content().lines().map(str::to_string).collect(),
            None => Vec::new(),
        };
        self.doc_scroll = self.doc_scroll.min(self.doc_lines.len().saturating_sub(1));
    }
}

/// Run the interactive browser until the user exits.
pub async fn run(state: AppState) -> Result<()> {
    let state = state.with_opener(Arc::new(|url: &str| open::that(url)));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(state);
    app.load_history();

    let result = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

async fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.tick().await;
        app.refresh_document();
        terminal.draw(|f| panes::ui(f, app))?;

        // Poll so late diagram renders show up without a keypress.
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char(c) => {
                    app.input.insert(app.cursor_position, c);
                    app.cursor_position += c.len_utf8();
                    app.history_index = None;
                    app.temp_input.clear();
                }
                KeyCode::Backspace => {
                    if let Some((idx, _)) = app.input[..app.cursor_position].char_indices().next_back() {
                        app.input.remove(idx);
                        app.cursor_position = idx;
                        app.history_index = None;
                        app.temp_input.clear();
                    }
                }
                KeyCode::Enter => {
                    let input = std::mem::take(&mut app.input);
                    app.cursor_position = 0;
                    app.handle_input(input).await;
                }
                KeyCode::Up => app.navigate_history_backward(),
                KeyCode::Down => app.navigate_history_forward(),
                KeyCode::Left => {
                    if let Some((idx, _)) = app.input[..app.cursor_position].char_indices().next_back() {
                        app.cursor_position = idx;
                    }
                }
                KeyCode::Right => {
                    if let Some(c) = app.input[app.cursor_position..].chars().next() {
                        app.cursor_position += c.len_utf8();
                    }
                }
                KeyCode::Home => app.cursor_position = 0,
                KeyCode::End => app.cursor_position = app.input.len(),
                KeyCode::Esc => app.should_quit = true,
                KeyCode::PageUp => app.doc_scroll = app.doc_scroll.saturating_sub(10),
                KeyCode::PageDown => {
                    app.doc_scroll = (app.doc_scroll + 10).min(app.doc_lines.len().saturating_sub(1));
                }
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
