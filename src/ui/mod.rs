mod theme;

use crate::app::{AppModel, Focus, FrameInput, Phase};
use crate::domain::format_eta;
use ratatui::layout::Position;
use ratatui::prelude::*;
use ratatui::widgets::*;
use unicode_width::UnicodeWidthStr;

const PLACEHOLDER_ROW: &str = "-- Select a file --";
const START_LABEL: &str = "Start frame: ";
const END_LABEL: &str = "End frame:   ";

struct Areas {
    header: Rect,
    files: Rect,
    controls: Rect,
    current: Rect,
    crash: Rect,
    log: Rect,
    status: Rect,
}

fn split_areas(area: Rect) -> Areas {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);

    Areas {
        header: rows[0],
        files: top[0],
        controls: top[1],
        current: middle[0],
        crash: middle[1],
        log: rows[3],
        status: rows[4],
    }
}

/// Keeps the log scroll offset inside what the log panel can show.
pub fn clamp_scroll_state(model: &mut AppModel, area: Rect) {
    let log_area = split_areas(area).log;
    let visible = log_area.height.saturating_sub(2) as usize;
    let max_back = model.log_lines.saturating_sub(visible);
    model.log_scroll_back = model.log_scroll_back.min(max_back);
}

pub fn render(frame: &mut Frame, model: &AppModel) {
    let area = frame.area();
    if area.width == 0 || area.height == 0 {
        return;
    }

    let areas = split_areas(area);
    render_header(frame, areas.header, model);
    render_files(frame, areas.files, model);
    render_controls(frame, areas.controls, model);
    render_current(frame, areas.current, model);
    render_crash(frame, areas.crash, model);
    render_log(frame, areas.log, model);
    render_status_bar(frame, areas.status, model);

    if model.help_open {
        render_help_overlay(frame, area);
    }
}

fn panel(title: &str, focused: bool) -> Block<'_> {
    let border = if focused { theme::ACCENT } else { theme::BORDER };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .padding(Padding::horizontal(1))
        .title(Span::styled(
            title,
            Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
        ))
}

fn render_header(frame: &mut Frame, area: Rect, model: &AppModel) {
    let base = Style::default().fg(theme::FG).bg(theme::BAR_BG);
    let (state_label, state_style) = match model.phase {
        Phase::Idle => ("idle", Style::default().fg(theme::MUTED).bg(theme::BAR_BG)),
        Phase::Starting => ("starting", Style::default().fg(theme::ACCENT).bg(theme::BAR_BG)),
        Phase::Running => (
            "running",
            Style::default()
                .fg(theme::SUCCESS)
                .bg(theme::BAR_BG)
                .add_modifier(Modifier::BOLD),
        ),
    };

    let title = " Render Manager ";
    let server = format!("  {}  ", model.server_label);
    let state = format!("● {state_label} ");
    let used = UnicodeWidthStr::width(title)
        + UnicodeWidthStr::width(server.as_str())
        + UnicodeWidthStr::width(state.as_str());
    let remaining = (area.width as usize).saturating_sub(used);

    let spans = vec![
        Span::styled(
            title,
            Style::default()
                .fg(theme::ACCENT)
                .bg(theme::BAR_BG)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(server, Style::default().fg(theme::DIM).bg(theme::BAR_BG)),
        Span::styled(" ".repeat(remaining), base),
        Span::styled(state, state_style),
    ];
    frame.render_widget(Paragraph::new(Line::from(spans)).style(base), area);
}

fn render_files(frame: &mut Frame, area: Rect, model: &AppModel) {
    let mut items = Vec::with_capacity(model.file_rows());
    items.push(ListItem::new(Span::styled(
        PLACEHOLDER_ROW,
        Style::default().fg(theme::DIM),
    )));
    items.extend(
        model
            .blend_files
            .iter()
            .map(|file| ListItem::new(Span::styled(file.as_str(), Style::default().fg(theme::FG)))),
    );

    let title = format!("Scene file ({})", model.blend_files.len());
    let list = List::new(items)
        .block(panel(&title, model.focus == Focus::Files))
        .highlight_style(
            Style::default()
                .fg(theme::ACCENT)
                .bg(theme::ACCENT_BG)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(model.file_row));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_controls(frame: &mut Frame, area: Rect, model: &AppModel) {
    let focused = matches!(model.focus, Focus::StartFrame | Focus::EndFrame);
    let block = panel("Frame range", focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let start_focused = model.focus == Focus::StartFrame;
    let end_focused = model.focus == Focus::EndFrame;
    let start_style = if model.can_start() {
        Style::default()
            .fg(theme::SUCCESS)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme::DIM)
    };
    let stop_style = if model.can_stop() {
        Style::default().fg(theme::ERROR).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme::DIM)
    };

    let lines = vec![
        frame_input_line(START_LABEL, &model.start_frame, start_focused),
        frame_input_line(END_LABEL, &model.end_frame, end_focused),
        Line::from(""),
        Line::from(vec![
            Span::styled("[F5 Start Render]", start_style),
            Span::raw("  "),
            Span::styled("[F6 Stop Render]", stop_style),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines), inner);

    let cursor_target = if start_focused {
        Some((0u16, START_LABEL, &model.start_frame))
    } else if end_focused {
        Some((1u16, END_LABEL, &model.end_frame))
    } else {
        None
    };
    if let Some((row, label, input)) = cursor_target {
        if row < inner.height {
            let offset = UnicodeWidthStr::width(label) + 1 + input.cursor_col.min(input.text.len());
            let x = inner.x.saturating_add(offset as u16);
            if x < inner.x.saturating_add(inner.width) {
                frame.set_cursor_position(Position::new(x, inner.y + row));
            }
        }
    }
}

fn frame_input_line<'a>(label: &'a str, input: &'a FrameInput, focused: bool) -> Line<'a> {
    let value_style = if focused {
        Style::default().fg(theme::FG).bg(theme::ACCENT_BG)
    } else {
        Style::default().fg(theme::FG)
    };
    let mut spans = vec![
        Span::styled(label, Style::default().fg(theme::MUTED)),
        Span::styled("[", Style::default().fg(theme::DIM)),
        Span::styled(input.text.as_str(), value_style),
        Span::styled("]", Style::default().fg(theme::DIM)),
    ];
    if input.value().is_none() {
        spans.push(Span::styled("  backend default", Style::default().fg(theme::DIM)));
    }
    Line::from(spans)
}

fn render_current(frame: &mut Frame, area: Rect, model: &AppModel) {
    let block = panel("Current frame", false);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height == 0 {
        return;
    }

    let (frame_text, time_text) = match &model.current_frame {
        Some(event) => (event.frame.to_string(), event.time.clone()),
        None => ("-".to_string(), "-".to_string()),
    };
    let label = Style::default().fg(theme::MUTED);
    let value = Style::default().fg(theme::FG);
    let lines = vec![
        Line::from(vec![Span::styled("Frame: ", label), Span::styled(frame_text, value)]),
        Line::from(vec![Span::styled("Time:  ", label), Span::styled(time_text, value)]),
        Line::from(vec![
            Span::styled("Estimated time left: ", label),
            Span::styled(
                format_eta(model.progress.estimated_time_left),
                Style::default().fg(theme::ACCENT),
            ),
        ]),
    ];

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);
    frame.render_widget(Paragraph::new(lines), chunks[0]);

    if let Some(ratio) = progress_ratio(model) {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(theme::SUCCESS).bg(theme::BAR_BG))
            .ratio(ratio)
            .label(format!("{:.0}%", ratio * 100.0));
        frame.render_widget(gauge, chunks[1]);
    }
}

/// Share of the configured range already rendered, when it can be known.
fn progress_ratio(model: &AppModel) -> Option<f64> {
    let current = model.current_frame.as_ref()?.frame;
    let start = model.start_frame.value()?;
    let end = model.end_frame.value()?;
    if end <= start {
        return None;
    }
    let done = (current - start) as f64 / (end - start) as f64;
    Some(done.clamp(0.0, 1.0))
}

fn render_crash(frame: &mut Frame, area: Rect, model: &AppModel) {
    let mut lines = vec![Line::from(vec![
        Span::styled("Crash count: ", Style::default().fg(theme::MUTED)),
        Span::styled(
            model.crash.crash_count.to_string(),
            if model.crash.has_crashed() {
                Style::default().fg(theme::ERROR).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme::FG)
            },
        ),
    ])];

    if model.crash.crash_reasons.is_empty() {
        lines.push(Line::from(Span::styled(
            "Not crashed yet",
            Style::default().fg(theme::DIM),
        )));
    } else {
        for reason in &model.crash.crash_reasons {
            let first_line = reason.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
            lines.push(Line::from(vec![
                Span::styled("- ", Style::default().fg(theme::ERROR)),
                Span::styled(first_line.trim(), Style::default().fg(theme::FG)),
            ]));
        }
    }

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(panel("Crash information", false));
    frame.render_widget(paragraph, area);
}

fn render_log(frame: &mut Frame, area: Rect, model: &AppModel) {
    let visible = area.height.saturating_sub(2) as usize;
    let back = model
        .log_scroll_back
        .min(model.log_lines.saturating_sub(visible));

    // Walk from the tail so only the visible window is touched.
    let mut lines = model
        .log_text()
        .lines()
        .rev()
        .skip(back)
        .take(visible)
        .map(|line| {
            let style = if line == crate::app::STOPPED_MARKER {
                Style::default().fg(theme::ACCENT)
            } else {
                Style::default().fg(theme::FG)
            };
            Line::from(Span::styled(line, style))
        })
        .collect::<Vec<_>>();
    lines.reverse();

    let title = if back > 0 {
        format!("Log ({back} lines back, End to follow)")
    } else {
        "Log".to_string()
    };
    frame.render_widget(
        Paragraph::new(lines).block(panel(&title, model.focus == Focus::Log)),
        area,
    );
}

fn render_status_bar(frame: &mut Frame, area: Rect, model: &AppModel) {
    let base = Style::default().fg(theme::MUTED).bg(theme::BAR_BG);
    let text = match &model.notice {
        Some(notice) => Span::styled(
            format!(" {notice}"),
            Style::default().fg(theme::FG).bg(theme::BAR_BG),
        ),
        None => Span::styled(
            " Tab=focus  F5=start  F6=stop  Ctrl+R=refresh  PgUp/PgDn=log  F1/?=help  Ctrl+Q=quit",
            base,
        ),
    };
    frame.render_widget(Paragraph::new(Line::from(text)).style(base), area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(64, 70, area);
    frame.render_widget(Clear, popup);

    let text = vec![
        Line::from("Render"),
        Line::from("  - F5 or Ctrl+S: start render (disabled while running)"),
        Line::from("  - F6 or Ctrl+X: stop render"),
        Line::from("  - Ctrl+R: reload scene files and crash info"),
        Line::from(""),
        Line::from("Editing"),
        Line::from("  - Tab / Shift+Tab: move focus"),
        Line::from("  - Scene file: Up/Down/Home/End select"),
        Line::from("  - Frames: type digits, Up/Down adjust by one"),
        Line::from("  - Empty frame field: backend default applies"),
        Line::from(""),
        Line::from("Log"),
        Line::from("  - PgUp/PgDn: scroll"),
        Line::from("  - Focused log: Up/Down scroll, Home top, End follow"),
        Line::from(""),
        Line::from("Global"),
        Line::from("  - Ctrl+Q or Ctrl+C: quit (the render keeps running)"),
        Line::from("  - F1 or ?: toggle this help"),
    ];

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1))
            .title("Help (F1 or ? to close)"),
    );
    frame.render_widget(paragraph, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
