use super::keys::{InputMode, KEYBINDINGS, UiState};
use monitor::{
    ChartModel, Controller, LineKind, Liveness, NoticeLevel, ProcessRecord, SelectedProcess,
    SessionState,
};
use ratatui::{
    layout::{Constraint, Flex, Layout, Rect},
    prelude::*,
    symbols,
    widgets::{
        Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table,
    },
};

const COLOR_BORDER: Color = Color::DarkGray;
const COLOR_ACTIVE_BORDER: Color = Color::Cyan;
const COLOR_ROW_SELECTED: Color = Color::Rgb(40, 40, 60);
const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Magenta,
    Color::Green,
    Color::Blue,
    Color::LightRed,
    Color::LightYellow,
];
const X_LABELS: usize = 5;

/// Draw the whole screen.
pub fn render(frame: &mut Frame, ui: &mut UiState, controller: &Controller, now: f64) {
    let [main, status] =
        Layout::vertical([Constraint::Min(10), Constraint::Length(1)]).areas(frame.area());
    let [left, right] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(main);

    let selected = controller.selected_summary();
    let summary_height = (selected.len() as u16 + 3).clamp(4, 12);
    let [controls, summary, stats, chart] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Length(summary_height),
        Constraint::Length(8),
        Constraint::Min(8),
    ])
    .areas(right);

    render_process_table(frame, left, ui, controller);
    render_controls(frame, controls, ui, controller, now);
    render_selected(frame, summary, &selected, controller.total_mb());
    render_stats(frame, stats, controller, now);
    render_chart(frame, chart, controller.chart().as_ref());
    render_status_bar(frame, status, controller);

    if ui.show_help {
        render_help(frame, frame.area());
    }
}

fn titled(title: String, active: bool) -> Block<'static> {
    let color = if active { COLOR_ACTIVE_BORDER } else { COLOR_BORDER };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
}

fn render_process_table(frame: &mut Frame, area: Rect, ui: &mut UiState, controller: &Controller) {
    let visible: Vec<&ProcessRecord> = controller.visible();
    let filter = match (ui.mode, controller.filter_keyword()) {
        (InputMode::Filter, keyword) => format!(" filter: {keyword}_ "),
        (_, "") => String::new(),
        (_, keyword) => format!(" filter: {keyword} "),
    };
    let title = format!(
        " Processes ({}/{}) [{}]{filter}",
        visible.len(),
        controller.registry().len(),
        controller.metric().as_str()
    );
    let block = titled(title, ui.mode == InputMode::Filter);

    let header_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        Cell::from("PID").style(header_style),
        Cell::from("Name").style(header_style),
        Cell::from("MB").style(header_style),
        Cell::from("Sel").style(header_style),
    ]);

    let rows: Vec<Row> = visible
        .iter()
        .map(|record| {
            let selected = controller.is_selected(record.pid);
            let style = match record.liveness {
                Liveness::Terminated => Style::default().fg(Color::DarkGray),
                Liveness::Running if selected => Style::default().fg(Color::Green),
                Liveness::Running => Style::default(),
            };
            Row::new(vec![
                Cell::from(record.pid.to_string()),
                Cell::from(record.name.clone()),
                Cell::from(format!("{:.2}", record.memory_mb)),
                Cell::from(if selected { "√" } else { "" }),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(8),
        Constraint::Min(12),
        Constraint::Length(11),
        Constraint::Length(3),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().bg(COLOR_ROW_SELECTED));

    ui.clamp(visible.len());
    frame.render_stateful_widget(table, area, &mut ui.table);
}

fn render_controls(frame: &mut Frame, area: Rect, ui: &UiState, controller: &Controller, now: f64) {
    let editing = ui.mode == InputMode::Name;
    let name = if editing {
        format!("{}_", ui.name)
    } else if ui.name.is_empty() {
        "(press n)".to_string()
    } else {
        ui.name.clone()
    };
    let session = controller.session();
    let state = match (session.state(), session.start_time()) {
        (SessionState::Recording, Some(start)) => Span::styled(
            format!("REC {:.1} s", (now - start).max(0.0)),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        (SessionState::Stopped, _) => Span::styled("stopped", Style::default().fg(Color::Yellow)),
        _ => Span::styled("idle", Style::default().fg(Color::DarkGray)),
    };
    let sampling = if controller.sampler().is_enabled() {
        Span::styled("monitoring", Style::default().fg(Color::Green))
    } else {
        Span::styled("not monitoring", Style::default().fg(Color::DarkGray))
    };

    let lines = vec![
        Line::from(vec![
            Span::raw("metric: "),
            Span::styled(controller.metric().to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            sampling,
        ]),
        Line::from(vec![
            Span::raw("operation: "),
            Span::styled(name, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            state,
        ]),
    ];
    let paragraph = Paragraph::new(lines).block(titled(" Recording ".to_string(), editing));
    frame.render_widget(paragraph, area);
}

fn render_selected(frame: &mut Frame, area: Rect, selected: &[SelectedProcess], total: f64) {
    let title = format!(" Selected ({}) total {total:.2} MB ", selected.len());
    let rows: Vec<Row> = selected
        .iter()
        .map(|entry| {
            let (status, style) = match entry.liveness {
                Liveness::Running => ("running", Style::default().fg(Color::Green)),
                Liveness::Terminated => ("ended", Style::default().fg(Color::Red)),
            };
            let memory = entry
                .memory_mb
                .map(|mb| format!("{mb:.2}"))
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(entry.pid.to_string()),
                Cell::from(entry.name.clone()),
                Cell::from(memory),
                Cell::from(status).style(style),
            ])
        })
        .collect();
    let widths = [
        Constraint::Length(8),
        Constraint::Min(10),
        Constraint::Length(11),
        Constraint::Length(8),
    ];
    let table = Table::new(rows, widths).block(titled(title, false));
    frame.render_widget(table, area);
}

fn render_stats(frame: &mut Frame, area: Rect, controller: &Controller, now: f64) {
    let session = controller.session();
    let lines: Vec<Line> = match (session.state(), session.stats()) {
        (SessionState::Stopped, Some(stats)) => vec![
            Line::from(format!("start total: {:.2} MB", stats.start_total_mb)),
            Line::from(format!("end total: {:.2} MB", stats.end_total_mb)),
            Line::from(vec![
                Span::raw("change: "),
                change_span(stats.change_mb),
            ]),
            Line::from(vec![
                Span::raw("max change: "),
                change_span(stats.max_change_mb),
            ]),
            Line::from(format!("duration: {:.2} s", stats.duration_secs)),
            Line::from(match controller.last_export() {
                Some(path) => format!("exported: {}", path.display()),
                None => "not exported (press e)".to_string(),
            }),
        ],
        (SessionState::Recording, _) => {
            let elapsed = session.start_time().map_or(0.0, |start| (now - start).max(0.0));
            vec![
                Line::from(format!("recording \"{}\"", session.name())),
                Line::from(format!("elapsed: {elapsed:.2} s")),
                Line::from(format!("samples: {}", controller.sampler().series().sample_count())),
                Line::from("press Enter to stop"),
            ]
        }
        _ => vec![Line::from("no recording yet").style(Style::default().fg(Color::DarkGray))],
    };
    let paragraph = Paragraph::new(lines).block(titled(" Statistics ".to_string(), false));
    frame.render_widget(paragraph, area);
}

fn change_span(mb: f64) -> Span<'static> {
    let color = if mb > 0.0 {
        Color::Red
    } else if mb < 0.0 {
        Color::Green
    } else {
        Color::White
    };
    Span::styled(format!("{mb:+.2} MB"), Style::default().fg(color))
}

fn render_chart(frame: &mut Frame, area: Rect, model: Option<&ChartModel>) {
    let Some(model) = model else {
        let empty = Paragraph::new("no samples yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(titled(" Memory ".to_string(), false));
        frame.render_widget(empty, area);
        return;
    };

    let datasets: Vec<Dataset> = model
        .lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let style = match line.kind {
                LineKind::Process(_) => Style::default().fg(PALETTE[idx % PALETTE.len()]),
                LineKind::Total => Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                LineKind::Delta => Style::default().fg(Color::Yellow),
            };
            Dataset::default()
                .name(line.label.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(style)
                .data(&line.points)
        })
        .collect();

    let (y_lo, y_hi) = model.y_bounds;
    let x_hi = model.duration_secs.max(1.0);
    let chart = Chart::new(datasets)
        .block(titled(format!(" Memory: {} ", model.title), false))
        .x_axis(
            Axis::default()
                .title("s")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_hi])
                .labels(model.x_labels(X_LABELS)),
        )
        .y_axis(
            Axis::default()
                .title("MB")
                .style(Style::default().fg(Color::Gray))
                .bounds([y_lo, y_hi])
                .labels([
                    format!("{y_lo:.0}"),
                    format!("{:.0}", (y_lo + y_hi) / 2.0),
                    format!("{y_hi:.0}"),
                ]),
        );
    frame.render_widget(chart, area);
}

fn render_status_bar(frame: &mut Frame, area: Rect, controller: &Controller) {
    let left = format!("memtrack [{}]", controller.metric().as_str());
    let (center, center_style) = match controller.latest_notice() {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => Color::Gray,
                NoticeLevel::Warn => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            (notice.message.as_str(), Style::default().fg(color))
        }
        None => ("", Style::default()),
    };
    let right = "? (help)";

    let total_width = area.width as usize;
    let available = total_width
        .saturating_sub(left.chars().count() + center.chars().count() + right.len());
    let left_padding = available / 2;
    let right_padding = available.saturating_sub(left_padding);

    let line = Line::from(vec![
        Span::styled(left, Style::default().fg(Color::DarkGray)),
        Span::raw(" ".repeat(left_padding)),
        Span::styled(center, center_style),
        Span::raw(" ".repeat(right_padding)),
        Span::styled(right, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let height = KEYBINDINGS.len() as u16 + 2;
    let [popup] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Length(52)])
        .flex(Flex::Center)
        .areas(popup);

    let key_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let lines: Vec<Line> = KEYBINDINGS
        .iter()
        .map(|kb| {
            Line::from(vec![
                Span::styled(format!("{:<14}", kb.key), key_style),
                Span::raw(kb.description),
            ])
        })
        .collect();
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(titled(" Keys ".to_string(), true)),
        popup,
    );
}
