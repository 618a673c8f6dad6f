//! Status bar rendering.

use std::fmt::Write;

use chrono::{DateTime, Local};
use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::{App, Focus};

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, app: &App, timestamp_format: &str) {
    let help_text = help_text(app);

    let (dot_color, status_text) = if app.is_connected {
        (theme::SUCCESS, format!("Synced with {}", app.connection_info))
    } else if app.connection_info.is_empty() {
        (theme::OFFLINE, "Offline".to_string())
    } else {
        (theme::ERROR, format!("Disconnected from {}", app.connection_info))
    };

    let last_sync = app.last_snapshot.map_or_else(
        || "never".to_string(),
        |t| format_timestamp(&t, timestamp_format),
    );

    let status_line = Line::from(vec![
        Span::styled(concat!("Kanban v", env!("CARGO_PKG_VERSION")), theme::bold()),
        Span::raw(" | "),
        Span::styled("●", theme::normal().fg(dot_color)),
        Span::raw(format!(" {status_text} | last sync {last_sync}")),
        Span::raw(" | "),
        Span::styled(help_text, theme::dimmed()),
    ]);

    let paragraph = Paragraph::new(status_line).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}

/// Formats the last-snapshot time, falling back to `HH:MM:SS` when the
/// format string has specifiers chrono cannot render.
fn format_timestamp(time: &DateTime<Local>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", time.format(format)).is_err() {
        return time.format(FALLBACK_FORMAT).to_string();
    }
    out
}

const FALLBACK_FORMAT: &str = "%H:%M:%S";

fn help_text(app: &App) -> &'static str {
    if app.board.editing().is_some() {
        return "Enter: save | Esc: cancel";
    }
    if app.carrying.is_some() {
        return "←→/hl: choose column | Space/Enter: drop | Esc: cancel";
    }
    match app.focus {
        Focus::Input => "Enter: add | Tab: columns | Esc: quit",
        Focus::Column(_) => {
            "↑↓/jk: select | Space: pick up | e: edit | d: delete | Tab: switch | Esc: quit"
        }
    }
}
