use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use poimap_core::{GeocodeResolver, MapSession, RenderSurface, hex_to_rgb, locate};
use poimap_source::{CoordinateStore, Geocoder, RecordSource};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use std::io;
use std::time::Duration;

pub mod explorer;

pub use explorer::{Explorer, InputMode, LegendRow, Request};

/// Interactive legend explorer over a loaded session.
///
/// `R` reloads from `source`; `@` resolves a free-text address with the
/// resolver's geocoder.
pub async fn run<S, R, G, W>(
    session: MapSession<S>,
    source: &R,
    resolver: &GeocodeResolver<G, W>,
) -> Result<()>
where
    S: RenderSurface,
    R: RecordSource,
    G: Geocoder,
    W: CoordinateStore,
{
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut explorer = Explorer::new(session);
    explorer.set_status(format!(
        "{} markers from {}",
        explorer.session().index().len(),
        source.describe()
    ));

    let result = run_explorer(&mut terminal, &mut explorer, source, resolver).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_explorer<B, S, R, G, W>(
    terminal: &mut Terminal<B>,
    explorer: &mut Explorer<S>,
    source: &R,
    resolver: &GeocodeResolver<G, W>,
) -> Result<()>
where
    B: ratatui::backend::Backend,
    S: RenderSurface,
    R: RecordSource,
    G: Geocoder,
    W: CoordinateStore,
{
    loop {
        terminal.draw(|f| ui(f, explorer))?;

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            match explorer.handle_key(key.code) {
                Some(Request::Reload) => {
                    terminal.draw(|f| ui(f, explorer))?;
                    match explorer.session_mut().load(source, resolver).await {
                        Ok(report) => explorer.loaded(&report),
                        Err(e) => explorer.notify(format!("Reload failed: {}", e)),
                    }
                }
                Some(Request::Locate(query)) => {
                    terminal.draw(|f| ui(f, explorer))?;
                    let result = locate(resolver.geocoder(), &query).await;
                    explorer.located(&query, result);
                }
                None => {}
            }
        }

        if explorer.should_quit() {
            break;
        }
    }

    Ok(())
}

fn swatch_color(hex: &str) -> Color {
    match hex_to_rgb(hex) {
        Some((r, g, b)) => Color::Rgb(r, g, b),
        None => Color::Gray,
    }
}

fn ui<S: RenderSurface>(f: &mut Frame, explorer: &Explorer<S>) {
    let vertical_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // Legend + details
            Constraint::Length(1), // Status / input
            Constraint::Length(1), // Hints
        ])
        .split(f.area());

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(vertical_chunks[0]);

    render_legend(f, explorer, main_chunks[0]);
    render_details(f, explorer, main_chunks[1]);
    render_status(f, explorer, vertical_chunks[1]);
    render_hints(f, vertical_chunks[2]);

    if let Some(notice) = explorer.notice() {
        render_notice(f, notice, f.area());
    }
}

fn render_legend<S: RenderSurface>(f: &mut Frame, explorer: &Explorer<S>, area: Rect) {
    let session = explorer.session();
    let legend = session.legend();
    let title = format!(
        " Legend by {} ({} markers, {} visible) ",
        legend.mode.as_str(),
        session.index().len(),
        session.index().visible_count()
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if explorer.rows().is_empty() {
        let empty = Paragraph::new("No markers loaded")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, inner);
        return;
    }

    let height = inner.height as usize;
    let scroll_offset = explorer.selected().saturating_sub(height.saturating_sub(1));

    let items: Vec<ListItem> = explorer
        .rows()
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(height)
        .map(|(idx, row)| {
            let line = match *row {
                LegendRow::Match(idx) => {
                    let label = explorer
                        .matches()
                        .get(idx)
                        .and_then(|id| session.index().get(*id))
                        .map(|entry| entry.record.org_name.clone())
                        .unwrap_or_default();
                    Line::from(vec![
                        Span::styled("  › ", Style::default().fg(Color::Yellow)),
                        Span::styled(label, Style::default().fg(Color::Yellow)),
                    ])
                }
                LegendRow::Section(section) => {
                    let s = &legend.sections()[section];
                    let checkbox = if s.checked { "[x]" } else { "[ ]" };
                    Line::from(vec![
                        Span::raw(format!("{} ", checkbox)),
                        Span::styled("■ ", Style::default().fg(swatch_color(&s.color))),
                        Span::styled(s.key.clone(), Style::default().add_modifier(Modifier::BOLD)),
                        Span::styled(
                            format!(" ({})", s.members.len()),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ])
                }
                LegendRow::Member { section, member } => {
                    let m = &legend.sections()[section].members[member];
                    let visible = session.index().get(m.marker).is_some_and(|e| e.visible);
                    let style = if visible {
                        Style::default()
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    Line::from(Span::styled(format!("      {}", m.label), style))
                }
            };

            let mut item = ListItem::new(line);
            if idx == explorer.selected() {
                item = item.style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
            }
            item
        })
        .collect();

    f.render_widget(List::new(items), inner);
}

fn render_details<S: RenderSurface>(f: &mut Frame, explorer: &Explorer<S>, area: Rect) {
    let tag_label = explorer.selected_tag().unwrap_or("all tags");
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Marker  [tag: {}] ", tag_label))
        .border_style(Style::default().fg(Color::Magenta));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let text: Vec<Line> = match explorer.focused_popup() {
        Some(popup) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    popup.title.clone(),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
            ];
            for (label, value) in popup.rows() {
                lines.push(Line::from(vec![
                    Span::styled(format!("{}: ", label), Style::default().fg(Color::DarkGray)),
                    Span::raw(value.to_string()),
                ]));
            }
            if let Some(ref image) = popup.image_url {
                lines.push(Line::from(vec![
                    Span::styled("Image: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(image.clone()),
                ]));
            }
            lines
        }
        None => vec![Line::from(Span::styled(
            "Select a legend entry and press Enter",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
}

fn render_status<S: RenderSurface>(f: &mut Frame, explorer: &Explorer<S>, area: Rect) {
    let (prompt, text, color) = match explorer.mode() {
        InputMode::Search => ("search> ", explorer.input(), Color::Yellow),
        InputMode::Locate => ("address> ", explorer.input(), Color::Yellow),
        InputMode::Browse => ("", explorer.status(), Color::Gray),
    };
    let status = Paragraph::new(format!("{}{}", prompt, text)).style(Style::default().fg(color));
    f.render_widget(status, area);

    if explorer.mode() != InputMode::Browse {
        f.set_cursor_position((
            area.x + (prompt.len() + explorer.input().chars().count()) as u16,
            area.y,
        ));
    }
}

fn render_notice(f: &mut Frame, notice: &str, area: Rect) {
    let width = area.width.saturating_sub(4).min(60);
    let height = 5.min(area.height);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Notice (any key to dismiss) ")
        .border_style(Style::default().fg(Color::Red));
    let text = Paragraph::new(notice.to_string())
        .block(block)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, popup);
    f.render_widget(text, popup);
}

fn render_hints(f: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Black).bg(Color::Gray);
    let hints = Line::from(vec![
        Span::styled(" q ", key),
        Span::raw(" Quit  "),
        Span::styled(" Space ", key),
        Span::raw(" Toggle  "),
        Span::styled(" Enter ", key),
        Span::raw(" Focus  "),
        Span::styled(" r ", key),
        Span::raw(" Reset  "),
        Span::styled(" t/T ", key),
        Span::raw(" Tag  "),
        Span::styled(" / ", key),
        Span::raw(" Search  "),
        Span::styled(" @ ", key),
        Span::raw(" Address  "),
        Span::styled(" R ", key),
        Span::raw(" Reload"),
    ]);
    f.render_widget(
        Paragraph::new(hints).style(Style::default().bg(Color::Black).fg(Color::Gray)),
        area,
    );
}
