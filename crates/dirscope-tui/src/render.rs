/// Frame drawing.
///
/// Pure presentation: reads the [`Dashboard`] and paints one frame. The only
/// state it touches is the list's scroll offset, through
/// [`Dashboard::listing`].
///
/// ```text
/// ┌ header: root, current directory, running totals ───────────┐
/// ├ CPU sparkline ──────┬ memory sparkline ─┬ disk sparkline ──┤
/// ├ size list ─────────────────────────────────────────────────┤
/// └ footer: notice / last error, key hints ────────────────────┘
/// ```
use crate::state::{Dashboard, Phase, RowIndicator, RowView};
use crate::theme::Theme;

use dirscope_core::metrics::Reading;
use dirscope_core::model::size::{format_count, format_rate, format_size};
use dirscope_core::model::EntryKind;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Sparkline, Wrap},
    Frame,
};

/// Width of the proportional size bar in each row.
const BAR_WIDTH: usize = 12;

pub fn draw(f: &mut Frame, dashboard: &mut Dashboard, theme: &Theme) {
    if dashboard.phase() == Phase::Error {
        let area = f.area();
        draw_error(f, area, dashboard, theme);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(5),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(f.area());

    draw_header(f, chunks[0], dashboard, theme);
    draw_metrics(f, chunks[1], dashboard, theme);
    draw_list(f, chunks[2], dashboard, theme);
    draw_footer(f, chunks[3], dashboard, theme);

    if dashboard.phase() == Phase::ConfirmingDelete {
        draw_confirm(f, dashboard, theme);
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, dashboard: &Dashboard, theme: &Theme) {
    let status = dashboard.status();
    let mut title = vec![
        Span::styled("dirscope ", theme.title()),
        Span::styled(
            dashboard.root().display().to_string(),
            Style::default().fg(theme.text_secondary),
        ),
    ];
    if dashboard.config().dry_run {
        title.push(Span::styled(
            "  [dry run]",
            Style::default().fg(theme.warning),
        ));
    }

    let here = dashboard
        .current_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let mut location = vec![Span::styled(here, Style::default().fg(theme.text_primary))];
    if let Some((size, partial)) = dashboard.current_size() {
        location.push(Span::raw("  "));
        location.push(Span::styled(
            format_size(size),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ));
        if partial {
            location.push(Span::styled(" (partial)", theme.muted()));
        }
    }

    let progress = match (dashboard.phase(), status.duration) {
        (Phase::Scanning, _) => format!(
            "scanning… {} files, {} dirs, {}  {}",
            format_count(status.files),
            format_count(status.dirs),
            format_size(dashboard.total_size()),
            status.current_path
        ),
        (_, Some(duration)) => format!(
            "{} {} files, {} dirs, {} in {:.1}s, {} errors",
            if status.cancelled { "cancelled:" } else { "scanned" },
            format_count(status.files),
            format_count(status.dirs),
            format_size(dashboard.total_size()),
            duration.as_secs_f64(),
            format_count(status.errors)
        ),
        _ => String::new(),
    };

    let header = Paragraph::new(vec![
        Line::from(title),
        Line::from(location),
        Line::from(Span::styled(progress, theme.muted())),
    ])
    .style(Style::default().bg(theme.header_bg))
    .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, area);
}

// ── Metrics strip ──────────────────────────────────────────────────────────

fn draw_metrics(f: &mut Frame, area: Rect, dashboard: &Dashboard, theme: &Theme) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    let history = dashboard.history();
    let latest = history.latest();

    let cpu = latest.map(|s| s.cpu_percent).unwrap_or(Reading::Unavailable);
    let cpu_title = reading_title("CPU", cpu, |v| format!("{v:.1}%"));
    let memory = latest.map(|s| s.memory).unwrap_or(Reading::Unavailable);
    let memory_title = reading_title("Mem", memory, |m| {
        format!("{} / {}", format_size(m.used_bytes), format_size(m.total_bytes))
    });
    let disk = latest.map(|s| s.disk_io).unwrap_or(Reading::Unavailable);
    let disk_title = reading_title("Disk", disk, |d| {
        format!(
            "r {} w {}",
            format_rate(d.read_bytes_per_sec),
            format_rate(d.write_bytes_per_sec)
        )
    });

    let cpu_series = history.cpu_series();
    let memory_series = history.memory_series();
    let disk_series = history.disk_series();

    let sparkline = |title: String, stale: bool| {
        let fg = if stale { theme.text_muted } else { theme.accent };
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(fg))
    };

    f.render_widget(
        sparkline(cpu_title, !matches!(cpu, Reading::Live(_)))
            .data(tail(&cpu_series, cols[0]))
            .max(100),
        cols[0],
    );
    f.render_widget(
        sparkline(memory_title, !matches!(memory, Reading::Live(_)))
            .data(tail(&memory_series, cols[1]))
            .max(100),
        cols[1],
    );
    f.render_widget(
        sparkline(disk_title, !matches!(disk, Reading::Live(_))).data(tail(&disk_series, cols[2])),
        cols[2],
    );
}

fn reading_title<T: Copy>(name: &str, reading: Reading<T>, fmt: impl Fn(T) -> String) -> String {
    match reading {
        Reading::Live(v) => format!(" {name} {} ", fmt(v)),
        Reading::Stale(v) => format!(" {name} {} (stale) ", fmt(v)),
        Reading::Unavailable => format!(" {name} n/a "),
    }
}

/// The newest samples that fit inside a bordered block of `area`.
fn tail(series: &[u64], area: Rect) -> &[u64] {
    let width = area.width.saturating_sub(2) as usize;
    &series[series.len().saturating_sub(width)..]
}

// ── Size list ──────────────────────────────────────────────────────────────

fn draw_list(f: &mut Frame, area: Rect, dashboard: &mut Dashboard, theme: &Theme) {
    let height = area.height.saturating_sub(2) as usize;
    let listing = dashboard.listing(height);

    let title = if listing.total == 0 {
        " empty ".to_string()
    } else {
        format!(
            " {}–{} of {} ",
            listing.offset + 1,
            listing.offset + listing.rows.len(),
            format_count(listing.total as u64)
        )
    };

    let items: Vec<ListItem> = listing
        .rows
        .iter()
        .map(|row| ListItem::new(row_line(row, theme)))
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(theme.highlight())
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(listing.selected);
    f.render_stateful_widget(list, area, &mut state);
}

fn row_line(row: &RowView, theme: &Theme) -> Line<'static> {
    let filled = ((row.percent / 100.0).clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize;
    let (name, name_color) = match row.kind {
        EntryKind::Directory => (format!("{}/", row.name), theme.folder),
        EntryKind::Symlink => (format!("{}@", row.name), theme.text_secondary),
        EntryKind::Inaccessible => (row.name.clone(), theme.error),
        EntryKind::File | EntryKind::Special => (row.name.clone(), theme.file),
    };

    let mut spans = vec![
        Span::styled("█".repeat(filled), Style::default().fg(theme.bar_color(row.percent))),
        Span::styled(
            "░".repeat(BAR_WIDTH - filled),
            Style::default().fg(theme.bar_track),
        ),
        Span::styled(
            format!(" {:>10}", format_size(row.size)),
            Style::default().fg(theme.text_primary),
        ),
        Span::styled(format!(" {:>5.1}% ", row.percent), theme.muted()),
        Span::styled(name, Style::default().fg(name_color)),
    ];

    if let Some(label) = row.indicator.label() {
        let color = match row.indicator {
            RowIndicator::Error(_) => theme.error,
            RowIndicator::Scanning | RowIndicator::Partial | RowIndicator::Cancelled => {
                theme.warning
            }
            _ => theme.text_muted,
        };
        spans.push(Span::styled(format!("  [{label}]"), Style::default().fg(color)));
    }
    if let Some(note) = &row.annotation {
        let color = if note.is_error() {
            theme.error
        } else {
            theme.success
        };
        spans.push(Span::styled(
            format!("  {}", note.label()),
            Style::default().fg(color).add_modifier(Modifier::ITALIC),
        ));
    }
    Line::from(spans)
}

// ── Footer ─────────────────────────────────────────────────────────────────

fn draw_footer(f: &mut Frame, area: Rect, dashboard: &Dashboard, theme: &Theme) {
    let message = match (dashboard.notice(), dashboard.recent_errors().last()) {
        (Some(notice), _) => Span::styled(notice.to_string(), Style::default().fg(theme.success)),
        (None, Some((path, message))) => Span::styled(
            format!("{path}: {message}"),
            Style::default().fg(theme.error),
        ),
        (None, None) => Span::raw(""),
    };

    let keys = match dashboard.phase() {
        Phase::Scanning => "↑↓ move  ⏎ open  ⌫ back  d delete  esc cancel scan  q quit",
        Phase::ConfirmingDelete => "y confirm  n cancel",
        _ => "↑↓ move  g/G top/bottom  ⏎ open  ⌫ back  d delete  R rescan  q quit",
    };

    let footer = Paragraph::new(vec![
        Line::from(message),
        Line::from(Span::styled(keys, theme.muted())),
    ]);
    f.render_widget(footer, area);
}

// ── Overlays ───────────────────────────────────────────────────────────────

fn draw_confirm(f: &mut Frame, dashboard: &Dashboard, theme: &Theme) {
    let Some(pending) = dashboard.pending_delete() else {
        return;
    };
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);

    let request = &pending.request;
    let size = if request.size_is_partial {
        format!("at least {}", format_size(request.expected_size))
    } else {
        format_size(request.expected_size)
    };
    let mut lines = vec![
        Line::from(Span::styled(
            request.path.display().to_string(),
            Style::default()
                .fg(theme.text_primary)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("Frees {size}")),
        Line::from(""),
    ];
    if pending.awaiting {
        lines.push(Line::from(Span::styled("Deleting…", theme.muted())));
    } else if dashboard.config().dry_run {
        lines.push(Line::from(Span::styled(
            "Dry run: nothing will be removed. y to continue, n to cancel",
            Style::default().fg(theme.warning),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            "y to delete, n to cancel",
            Style::default().fg(theme.warning),
        )));
    }

    let popup = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Delete {}? ", pending.name))
            .border_style(Style::default().fg(theme.error)),
    );
    f.render_widget(popup, area);
}

fn draw_error(f: &mut Frame, area: Rect, dashboard: &Dashboard, theme: &Theme) {
    let message = dashboard.error_message().unwrap_or("unknown error");
    let text = vec![
        Line::from(Span::styled(
            format!("Cannot scan {}", dashboard.root().display()),
            Style::default()
                .fg(theme.error)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled("r retry  q quit", theme.muted())),
    ];
    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" dirscope "));
    f.render_widget(paragraph, centered_rect(70, 40, area));
}

/// A rectangle of the given percentage size centred in `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
