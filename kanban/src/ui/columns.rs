//! The three task columns.

use kanban_proto::task::{Task, TaskStatus};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};

use super::theme;
use crate::app::{App, Focus};

/// Render the columns side by side, left to right in status order.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    let columns = app.board.columns();
    for (status, tasks) in columns.iter() {
        render_column(frame, chunks[status.index()], app, status, tasks);
    }
}

fn render_column(frame: &mut Frame, area: Rect, app: &App, status: TaskStatus, tasks: &[&Task]) {
    let is_focused = app.focus == Focus::Column(status);
    let editing = app.board.editing();

    let items: Vec<ListItem> = tasks
        .iter()
        .enumerate()
        .map(|(row, task)| {
            let is_selected = is_focused && row == app.selected_index(status);
            let is_carried = app.carrying.as_ref() == Some(&task.id);

            let line = match editing {
                Some(edit) if edit.id == task.id => Line::from(vec![
                    Span::styled("✎ ", theme::highlighted()),
                    Span::styled(edit.draft.as_str(), theme::normal()),
                    Span::styled("█", theme::normal()),
                ]),
                _ => {
                    let style = if is_carried {
                        theme::carrying()
                    } else if is_selected {
                        theme::selected()
                    } else {
                        theme::normal()
                    };
                    let marker = if is_carried { "⇅ " } else { "  " };
                    Line::from(vec![
                        Span::styled(marker, style),
                        Span::styled(task.title.as_str(), style),
                    ])
                }
            };
            ListItem::new(line)
        })
        .collect();

    let title = Line::from(vec![
        Span::styled(status.label(), theme::panel_title(theme::column_color(status))),
        Span::styled(format!(" ({})", tasks.len()), theme::dimmed()),
    ]);
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(theme::border(is_focused));

    frame.render_widget(List::new(items).block(block), area);
}
