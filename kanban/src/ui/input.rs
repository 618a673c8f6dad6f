//! "Add task" input box.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::theme;
use crate::app::{App, Focus};

/// Render the input box with a block cursor when focused.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == Focus::Input;

    let input_line = if app.input.is_empty() && !is_focused {
        Line::from(Span::styled("Add a task...", theme::dimmed()))
    } else if is_focused {
        let (before, after) = split_at_char(&app.input, app.cursor_position);
        Line::from(vec![
            Span::styled(before, theme::normal()),
            Span::styled("█", theme::normal()),
            Span::styled(after, theme::normal()),
        ])
    } else {
        Line::from(Span::styled(app.input.as_str(), theme::normal()))
    };

    let block = Block::default()
        .title("Add task")
        .borders(Borders::ALL)
        .border_style(theme::border(is_focused));

    frame.render_widget(Paragraph::new(input_line).block(block), area);
}

fn split_at_char(s: &str, index: usize) -> (&str, &str) {
    let at = s.char_indices().nth(index).map_or(s.len(), |(i, _)| i);
    s.split_at(at)
}
