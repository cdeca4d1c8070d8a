use image::{imageops, RgbImage};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use cimwatch_core::logger::{COLOR_BLUE, COLOR_GRAY, COLOR_GREEN, FIELD_SEP};
use cimwatch_core::types::{LoopState, StatusKind};
use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let source_rows = app.sources.len() as u16 + 5 + u16::from(app.window_note.is_some());
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Max(source_rows),
            Constraint::Min(4),
        ])
        .split(chunks[0]);

    draw_banner(f, app, left[0]);
    draw_stats(f, app, left[1]);
    draw_sources(f, app, left[2]);
    draw_preview(f, app, left[3]);

    if app.log_visible && chunks.len() > 1 {
        draw_log(f, app, chunks[1]);
    }

    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

fn draw_banner(f: &mut Frame, app: &App, area: Rect) {
    let (label, bg) = match app.state() {
        LoopState::Running => ("RUNNING (Press S to stop)", Color::Green),
        LoopState::Stopping => ("STOPPING...", Color::Yellow),
        LoopState::Idle => ("IDLE (Press S to start)", Color::Red),
    };
    let width = area.width as usize;
    let pad_total = width.saturating_sub(label.len());
    let pad_left = pad_total / 2;
    let centered = format!("{}{}{}", " ".repeat(pad_left), label, " ".repeat(pad_total - pad_left));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered,
        Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, area);
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.snapshot.stats;
    let elapsed = if app.state() == LoopState::Idle { 0 } else { s.elapsed().as_secs() };
    let dim = Style::default().fg(Color::DarkGray);
    let val = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
    let line = Line::from(vec![
        Span::styled(" frames ", dim),
        Span::styled(s.frames_processed.to_string(), val),
        Span::styled("  decodes ", dim),
        Span::styled(format!("{}/{}", s.dispatches_succeeded, s.dispatches_attempted), val),
        Span::styled("  files ", dim),
        Span::styled(s.artifacts_found.to_string(), val),
        Span::styled("  fps ", dim),
        Span::styled(format!("{:.1}", s.fps()), val),
        Span::styled("  ", dim),
        Span::styled(format!("{:02}:{:02}", elapsed / 60, elapsed % 60), val),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_sources(f: &mut Frame, app: &App, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let mut lines = vec![
        Line::from(vec![
            Span::styled(" j", key),
            Span::raw("/"),
            Span::styled("k", key),
            Span::raw(" select, "),
            Span::styled("s", key),
            Span::raw(" start/stop, "),
            Span::styled("r", key),
            Span::raw(" rescan, "),
            Span::styled("o", key),
            Span::raw(" output dir:"),
        ]),
        Line::from(""),
    ];

    for (i, entry) in app.sources.iter().enumerate() {
        let is_selected = i == app.selected;
        let prefix = if is_selected { "> " } else { "  " };
        let style = if is_selected {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        lines.push(Line::from(vec![Span::raw(prefix), Span::styled(entry.label.as_str(), style)]));
    }
    if let Some(note) = &app.window_note {
        lines.push(Line::from(Span::styled(format!("  {}", note), Style::default().fg(Color::DarkGray))));
    }

    lines.push(Line::from(vec![
        Span::styled("  output ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.output_dir().display().to_string(), Style::default().fg(Color::Cyan)),
    ]));
    if let Some(status) = &app.last_status {
        let color = match status.kind {
            StatusKind::Decoded => Color::Green,
            StatusKind::DecodeFailed => Color::Yellow,
            StatusKind::Error => Color::Red,
            StatusKind::Info => Color::White,
        };
        lines.push(Line::from(Span::styled(format!("  {}", status), Style::default().fg(color))));
    }

    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, area);
}

fn draw_preview(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Preview ")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines = match &app.preview {
        Some(img) => preview_lines(img, inner.width as u32, inner.height as u32),
        None => vec![Line::from(Span::styled(" no frame yet", Style::default().fg(Color::DarkGray)))],
    };
    f.render_widget(Paragraph::new(lines), inner);
}

/// Fit `img` into `cols` x `rows` cells, two pixel rows per cell using `▀`.
pub fn preview_lines(img: &RgbImage, cols: u32, rows: u32) -> Vec<Line<'static>> {
    let (w, h) = img.dimensions();
    if cols == 0 || rows == 0 || w == 0 || h == 0 {
        return Vec::new();
    }
    let scale = (cols as f64 / w as f64).min((rows * 2) as f64 / h as f64);
    let tw = ((w as f64 * scale) as u32).clamp(1, cols);
    let th = ((h as f64 * scale) as u32).clamp(1, rows * 2);
    let fitted = imageops::resize(img, tw, th, imageops::FilterType::Nearest);

    let rgb = |x: u32, y: u32| {
        let p = fitted.get_pixel(x, y).0;
        Color::Rgb(p[0], p[1], p[2])
    };
    (0..th.div_ceil(2))
        .map(|row| {
            let top = row * 2;
            let spans: Vec<Span<'static>> = (0..tw)
                .map(|x| {
                    let mut style = Style::default().fg(rgb(x, top));
                    if top + 1 < th {
                        style = style.bg(rgb(x, top + 1));
                    }
                    Span::styled("▀", style)
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total = app.log_messages.len();
    let max_scroll = total.saturating_sub(visible_height);
    let scroll = app.log_scroll.min(max_scroll);
    let start = total.saturating_sub(visible_height + scroll);
    let end = total.saturating_sub(scroll);
    let log_lines: Vec<Line> = app.log_messages[start..end]
        .iter()
        .map(|m| parse_log_line(m))
        .collect();

    let log_panel = Paragraph::new(log_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Log ")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(log_panel, area);
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line for TUI rendering.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, FIELD_SEP).collect();
    if parts.len() < 5 {
        return Line::from(raw);
    }
    let (level, prefix, timestamp, message) = (parts[0], parts[1], parts[3], parts[4]);

    let color = match parts[2].parse::<u8>().unwrap_or(0) {
        COLOR_GRAY => Color::DarkGray,
        COLOR_BLUE => Color::LightBlue,
        COLOR_GREEN => Color::Green,
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));
    Line::from(spans)
}
