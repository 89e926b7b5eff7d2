use crate::index::types::EntityKind;
use crate::server::ConnectionState;
use crate::tui::app::{App, Mode};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Tabs
            Constraint::Length(3), // Query input
            Constraint::Min(10),   // Results / Details
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);
    draw_query_input(f, app, chunks[1]);
    draw_main_area(f, app, chunks[2]);
    draw_status_bar(f, app, chunks[3]);

    if app.mode == Mode::Help {
        draw_help(f, f.area());
    }
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let selected = match app.tab {
        EntityKind::Item => 0,
        EntityKind::Map => 1,
    };
    let tabs = Tabs::new(vec![EntityKind::Item.label(), EntityKind::Map.label()])
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_query_input(f: &mut Frame, app: &App, area: Rect) {
    let input = Paragraph::new(app.query.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Search (Tab: items/maps, Enter: relay, F1: help, Esc: quit) "),
        );

    f.render_widget(input, area);

    if app.mode == Mode::Search {
        f.set_cursor_position(query_cursor(area, app.query.chars().count()));
    }
}

/// Cursor after `len` characters of input, kept within `area`
fn query_cursor(area: Rect, len: usize) -> (u16, u16) {
    let offset = u16::try_from(len)
        .unwrap_or(u16::MAX)
        .min(area.width.saturating_sub(2));
    (
        area.x.saturating_add(offset).saturating_add(1),
        area.y.saturating_add(1),
    )
}

fn draw_main_area(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    draw_results_list(f, app, chunks[0]);
    draw_details(f, app, chunks[1]);
}

fn draw_results_list(f: &mut Frame, app: &App, area: Rect) {
    let Some(catalog) = app.catalog() else {
        let message = if app.is_loading() {
            "Loading..."
        } else {
            "Catalog unavailable"
        };
        let placeholder = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title(" Results "));
        f.render_widget(placeholder, area);
        return;
    };

    let id_style = Style::default().fg(Color::Blue);
    let missing_style = Style::default().fg(Color::Red);

    let items: Vec<ListItem> = app
        .results
        .iter()
        .filter_map(|&position| catalog.get(position))
        .map(|entity| {
            let mut spans = vec![
                Span::styled(format!("{} ", entity.id), id_style),
                Span::raw(entity.name.clone()),
            ];
            if entity.missing_data {
                spans.push(Span::styled(" *", missing_style));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ({}) ", app.tab.label(), app.results.len())),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.results.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_details(f: &mut Frame, app: &App, area: Rect) {
    let key_style = Style::default().fg(Color::DarkGray);

    let content = match app.get_selected_entity() {
        Some(entity) => {
            let mut lines: Vec<Line> = entity
                .detail_lines()
                .into_iter()
                .map(|line| match line.split_once('=') {
                    Some((key, value)) => Line::from(vec![
                        Span::styled(format!("{}=", key), key_style),
                        Span::raw(value.to_string()),
                    ]),
                    None => Line::from(Span::styled(
                        line,
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
                })
                .collect();
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                entity.relay_command(&app.options.map_instance),
                Style::default().fg(Color::Green),
            )));
            Text::from(lines)
        }
        None => Text::raw("Nothing selected"),
    };

    let details = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL).title(" Details "))
        .wrap(Wrap { trim: false });

    f.render_widget(details, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let (label, color) = match app.connection_state() {
        ConnectionState::Connected => ("connected", Color::Green),
        ConnectionState::Connecting => ("connecting", Color::Yellow),
        ConnectionState::Disconnected => ("disconnected", Color::Red),
    };
    let session = app.options.session_id.as_deref().unwrap_or("-");

    let line = Line::from(vec![
        Span::styled(format!("[{}] ", label), Style::default().fg(color)),
        Span::styled(format!("session {} ", session), Style::default().fg(Color::DarkGray)),
        Span::styled(app.status_message.as_str(), Style::default().fg(Color::Cyan)),
    ]);

    f.render_widget(Paragraph::new(line), area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let lines = [
        "Enter        relay selected entity",
        "Tab          switch items / maps",
        "Up/Down      move selection",
        "PgUp/PgDn    move by page",
        "Ctrl+W       delete word",
        "F2           connect to relay",
        "F3           disconnect",
        "Esc          clear query / quit",
        "",
        "Query tokens match by prefix; key=value tokens",
        "such as class=, feature=, slot= and id= filter",
        "on attributes.",
    ];

    let width = 52.min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    let help = Paragraph::new(lines.iter().map(|l| Line::raw(*l)).collect::<Vec<_>>())
        .block(Block::default().borders(Borders::ALL).title(" Help "));

    f.render_widget(Clear, popup);
    f.render_widget(help, popup);
}
