//! Terminal UI rendering.

pub mod columns;
pub mod input;
pub mod status_bar;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
};

use crate::app::App;

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, app: &App, timestamp_format: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    input::render(frame, chunks[0], app);
    columns::render(frame, chunks[1], app);
    status_bar::render(frame, chunks[2], app, timestamp_format);
}

#[cfg(test)]
mod tests {
    use kanban_proto::task::{Task, TaskId, TaskStatus};
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;
    use crate::sync::SyncEvent;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(90, 12)).unwrap();
        terminal.draw(|frame| draw(frame, app, "%H:%M")).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(usize::from(buffer.area.width))
            .map(|row| row.iter().map(ratatui::buffer::Cell::symbol).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn draws_columns_and_tasks() {
        let mut app = App::new();
        app.apply_event(SyncEvent::Snapshot(vec![
            Task {
                id: TaskId::new("a"),
                title: "Buy milk".to_string(),
                status: TaskStatus::InProgress,
            },
        ]));
        let text = screen(&app);
        assert!(text.contains("Add task"));
        assert!(text.contains("To Do"));
        assert!(text.contains("In Progress"));
        assert!(text.contains("Done"));
        assert!(text.contains("Buy milk"));
    }

    #[test]
    fn offline_status_without_connection_info() {
        let app = App::new();
        assert!(screen(&app).contains("Offline"));
    }

    #[test]
    fn unknown_timestamp_specifier_still_draws() {
        let mut app = App::new();
        app.apply_event(SyncEvent::Snapshot(Vec::new()));
        let mut terminal = Terminal::new(TestBackend::new(90, 12)).unwrap();
        terminal.draw(|frame| draw(frame, &app, "%Q")).unwrap();
    }
}
