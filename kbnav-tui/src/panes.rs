// Frame layout: file tree, document or graph, REPL output, input and status

use crate::App;
use kbnav_core::graph::{GraphModel, NodeShape, NodeStyle};
use kbnav_core::render::RenderPhase;
use kbnav_core::tree::FileTree;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

const SIDEBAR_WIDTH: u16 = 32;
const OUTPUT_HEIGHT: u16 = 8;

/// Indented rows for the expanded part of the tree.
pub(crate) fn tree_lines(tree: &FileTree) -> Vec<String> {
    tree.visible_rows()
        .iter()
        .map(|row| {
            let marker = match (row.node.is_dir, row.node.expanded) {
                (true, true) => "▾ ",
                (true, false) => "▸ ",
                (false, _) => "  ",
            };
            format!("{}{}{}", "  ".repeat(row.depth), marker, row.node.name)
        })
        .collect()
}

fn hex_color(hex: &str) -> Color {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| hex.get(i..i + 2).and_then(|c| u8::from_str_radix(c, 16).ok());
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
        _ => Color::White,
    }
}

pub(crate) fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Panes
            Constraint::Length(1), // Horizontal rule
            Constraint::Length(1), // Input area
            Constraint::Length(1), // Horizontal rule
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    render_panes(f, app, chunks[0]);

    let rule = "─".repeat(chunks[1].width as usize);
    f.render_widget(
        Paragraph::new(rule.clone()).style(Style::default().fg(Color::DarkGray)),
        chunks[1],
    );

    let prompt = if app.awaiting_save_confirmation { "? " } else { "kb> " };
    let input = Paragraph::new(format!("{}{}", prompt, app.input)).style(Style::default().fg(Color::Yellow));
    f.render_widget(input, chunks[2]);

    let cursor_col = app.input[..app.cursor_position].chars().count();
    f.set_cursor_position((chunks[2].x + (prompt.chars().count() + cursor_col) as u16, chunks[2].y));

    f.render_widget(
        Paragraph::new(rule).style(Style::default().fg(Color::DarkGray)),
        chunks[3],
    );

    render_status(f, app, chunks[4]);
}

fn render_panes(f: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let content_area = if state.sidebar_collapsed() {
        area
    } else {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(10)])
            .split(area);
        render_tree(f, app, columns[0]);
        columns[1]
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(OUTPUT_HEIGHT)])
        .split(content_area);

    if state.show_graph() {
        render_graph(f, state.graph(), state.selected_node().map(|n| n.id.as_str()), rows[0]);
    } else {
        render_document(f, app, rows[0]);
    }
    render_output(f, app, rows[1]);
}

fn render_tree(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Files ({}) ", app.state().files().len()))
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let current = app.state().document().map(|d| d.path().to_string());
    let items: Vec<ListItem> = app
        .state()
        .tree()
        .visible_rows()
        .iter()
        .zip(tree_lines(app.state().tree()))
        .take(inner.height as usize)
        .map(|(row, text)| {
            let style = if current.as_deref() == Some(row.node.path.as_str()) {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if row.node.is_dir {
                Style::default().fg(Color::Blue)
            } else {
                Style::default()
            };
            ListItem::new(text).style(style)
        })
        .collect();

    f.render_widget(List::new(items), inner);
}

fn render_document(f: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let title = match state.document() {
        Some(doc) => format!(
            " {} [{}] ",
            doc.path(),
            if state.show_preview() { "preview" } else { "source" }
        ),
        None => " No document ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if state.document().is_none() {
        let hint = Paragraph::new("Open a document with 'open <path>' or 'expand <dir>'")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        f.render_widget(hint, inner);
        return;
    }

    let lines: Vec<Line> = app
        .doc_lines
        .iter()
        .skip(app.doc_scroll)
        .take(inner.height as usize)
        .map(|l| Line::from(l.clone()))
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_graph(f: &mut Frame, graph: &GraphModel, selected: Option<&str>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(
            " Graph ({} nodes, {} edges) ",
            graph.node_count(),
            graph.edge_count()
        ))
        .border_style(Style::default().fg(Color::Magenta));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut nodes: Vec<_> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let items: Vec<ListItem> = nodes
        .iter()
        .take(inner.height as usize)
        .map(|node| {
            let style = NodeStyle::for_kind(node.kind);
            let glyph = match style.shape {
                NodeShape::Square => "■",
                NodeShape::Circle => "●",
            };
            let targets: Vec<&str> = graph.outgoing(&node.id).iter().map(|n| n.id.as_str()).collect();
            let mut spans = vec![
                Span::styled(format!("{} ", glyph), Style::default().fg(hex_color(style.color))),
                Span::raw(node.id.clone()),
            ];
            if !targets.is_empty() {
                spans.push(Span::styled(
                    format!(" -> {}", targets.join(", ")),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            let item = ListItem::new(Line::from(spans));
            if selected == Some(node.id.as_str()) {
                item.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                item
            }
        })
        .collect();

    f.render_widget(List::new(items), inner);
}

fn render_output(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let height = inner.height as usize;
    let output = app.output();
    let lines: Vec<Line> = output
        .iter()
        .skip(output.len().saturating_sub(height))
        .map(|line| {
            let style = if line.contains("[ERROR]") {
                Style::default().fg(Color::Red)
            } else if line.starts_with("> ") {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            Line::styled(line.clone(), style)
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let phase = match state.phase() {
        Some(RenderPhase::DiagramsPending) => {
            let pending = state.document().map_or(0, |d| d.display().pending_count());
            format!("{} diagram(s) rendering", pending)
        }
        Some(phase) => phase.to_string(),
        None => "idle".to_string(),
    };
    let save = if state.autosave_pending() { " | unsaved" } else { "" };

    let status = Paragraph::new(Line::from(vec![
        Span::styled(phase, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(save),
        Span::raw(" | "),
        Span::styled("ESC", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" or "),
        Span::styled("exit", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" to quit | "),
        Span::styled("help", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" for commands | "),
        Span::styled("PgUp/PgDn", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" scroll"),
    ]))
    .style(Style::default().fg(Color::DarkGray));

    f.render_widget(status, area);
}
