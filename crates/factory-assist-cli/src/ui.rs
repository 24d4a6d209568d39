//! UI rendering with ratatui.
//!
//! Thread list on the left, conversation and input on the right, with a
//! header and status bar around them.

use factory_assist_core::Role;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use ratatui::Frame;

use crate::app::{App, InputMode, VoiceState};
use crate::markdown::render_markdown;

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 2;

const PROMPT: &str = "> ";

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(5),    // Threads and chat
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(main_layout[1]);

    render_threads_panel(frame, app, content_layout[0]);
    render_chat_column(frame, app, content_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    if let InputMode::Alert(message) = &app.input_mode {
        render_alert_dialog(frame, message, area);
    }
}

/// Shorten `s` to `max_len` characters by cutting out its middle.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = app.mode.label();
    let max_url_width = (area.width as usize / 2).saturating_sub(2);
    let display_url = truncate_middle(app.backend_url(), max_url_width);

    let used = Span::raw(title).width() + display_url.chars().count();
    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat((area.width as usize).saturating_sub(used))),
        Span::raw(display_url),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_threads_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Threads ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let active = app.active_thread();
    let items: Vec<ListItem> = app
        .threads()
        .iter()
        .map(|thread| {
            let style = if thread.id == active {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(Span::styled(thread.display_title(app.title_display_chars), style))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.threads().iter().position(|t| t.id == active));

    frame.render_stateful_widget(list, area, &mut state);
}

/// Render the right column containing chat and input as one unit.
fn render_chat_column(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" {} ", app.mode.label()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Messages
            Constraint::Length(1), // Separator
            Constraint::Length(1), // Input
        ])
        .split(inner_area);

    let chat_area_full = inner_layout[0];
    let chat_area = Rect::new(
        chat_area_full.x + CHAT_PADDING,
        chat_area_full.y,
        chat_area_full.width.saturating_sub(CHAT_PADDING * 2 + 1), // +1 for scrollbar
        chat_area_full.height,
    );

    if app.messages().is_empty() {
        let hint = Paragraph::new(app.mode.empty_hint())
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(hint, chat_area);
    } else {
        let text = Text::from(chat_lines(app, chat_area.width as usize));
        render_scrolled(frame, app, text, chat_area, chat_area_full);
    }

    render_input_line(frame, app, inner_layout[1], inner_layout[2]);
}

/// Lines of the active conversation, oldest first.
fn chat_lines(app: &App, content_width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for msg in app.messages() {
        let label_style = match msg.role {
            Role::User => Style::default().fg(Color::Cyan),
            Role::Assistant => Style::default().fg(Color::Green),
        };
        lines.push(Line::from(Span::styled(
            format!("[{}]", msg.role.label()),
            label_style.add_modifier(Modifier::BOLD),
        )));

        let content = app.displayed_content(msg);
        if msg.is_user() {
            lines.extend(
                content
                    .lines()
                    .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(Color::White)))),
            );
        } else if content.is_empty() && app.is_in_progress(msg) {
            lines.push(Line::from(vec![
                Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
                Span::styled(" thinking...", Style::default().fg(Color::DarkGray)),
            ]));
        } else {
            lines.extend(render_markdown(content, content_width));
        }
        lines.push(Line::from(""));
    }

    lines
}

/// Render `text` bottom-anchored, offset by the app's scroll position.
fn render_scrolled(frame: &mut Frame, app: &App, text: Text<'_>, area: Rect, scrollbar_area: Rect) {
    let visible_lines = area.height as usize;
    let total_wrapped_lines = calculate_wrapped_line_count(&text, area.width as usize);

    // chat_scroll counts lines up from the bottom; the paragraph skips from the top.
    let max_scroll = total_wrapped_lines.saturating_sub(visible_lines);
    let effective_scroll = app.chat_scroll.min(max_scroll);
    let scroll_offset = max_scroll.saturating_sub(effective_scroll);

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(scroll_offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, area);

    if total_wrapped_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total_wrapped_lines)
            .position(scroll_offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }
}

fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect) {
    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    let input_line = Line::from(vec![
        Span::styled(PROMPT, Style::default().fg(Color::Cyan)),
        Span::styled(app.input.as_str(), Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(input_line), input_area);

    if app.input_mode == InputMode::Normal {
        let before_cursor: String = app.input.chars().take(app.cursor_position).collect();
        let offset = PROMPT.len() + Span::raw(before_cursor).width();
        frame.set_cursor_position((
            input_area.x + u16::try_from(offset).unwrap_or(input_area.width),
            input_area.y,
        ));
    }
}

fn key_help(keys: &[(&'static str, &'static str)]) -> Vec<Span<'static>> {
    let mut spans = vec![Span::raw(" ")];
    for (key, action) in keys {
        spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(format!(":{action} ")));
    }
    spans
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let indicator = match app.voice() {
        VoiceState::Recording(_) => {
            Span::styled(" ● REC ", Style::default().fg(Color::White).bg(Color::Red))
        }
        VoiceState::Processing => Span::styled(
            format!(" {} STT ", app.spinner_char()),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ),
        VoiceState::Idle if app.is_streaming() => Span::styled(
            format!(" {} ", app.spinner_char()),
            Style::default().fg(Color::Black).bg(Color::Green),
        ),
        VoiceState::Idle => Span::styled(" CHAT ", Style::default().fg(Color::Black).bg(Color::Blue)),
    };

    let mut spans = vec![indicator];
    if let Some(error) = &app.error_message {
        spans.push(Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()));
        spans.push(Span::styled(error.as_str(), Style::default().fg(Color::Red)));
    } else if let Some(status) = &app.status_message {
        spans.push(Span::styled(format!(" {status}"), Style::default().fg(Color::Green)));
    } else if app.is_streaming() {
        spans.extend(key_help(&[("Esc", "stop"), ("Enter", "send new")]));
    } else {
        spans.extend(key_help(&[
            ("Enter", "send"),
            ("Ctrl+R", "voice"),
            ("Ctrl+N", "new thread"),
            ("Ctrl+↑/↓", "switch"),
            ("Ctrl+C", "quit"),
        ]));
    }

    let status_bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

fn render_alert_dialog(frame: &mut Frame, message: &str, area: Rect) {
    let dialog_area = centered_rect(50, 25, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Notice ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(vec![
            Span::styled("[Enter/Esc]", Style::default().fg(Color::Yellow).bold()),
            Span::raw(" Dismiss"),
        ]),
    ]);

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, inner);
}

/// Calculate the number of visual lines after text wrapping.
fn calculate_wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }

    text.lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum()
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::*;
    use crate::config::AppConfig;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn wrapped_line_count() {
        let text = Text::from(vec![Line::from("a".repeat(25)), Line::from(""), Line::from("b")]);
        assert_eq!(calculate_wrapped_line_count(&text, 10), 5);
        assert_eq!(calculate_wrapped_line_count(&text, 0), 3);
    }

    #[test]
    fn truncate_middle_counts_characters() {
        assert_eq!(truncate_middle("http://localhost:8000", 30), "http://localhost:8000");
        assert_eq!(truncate_middle("abcdefghijkl", 9), "abc...jkl");
        assert_eq!(truncate_middle("工厂助手后端地址", 4), "工厂助手");
    }

    #[test]
    fn empty_thread_shows_hint() {
        let app = App::new(&AppConfig::default());
        let screen = screen(&app);
        assert!(screen.contains("Training Assistant"));
        assert!(screen.contains("http://localhost:8000"));
        assert!(screen.contains("New training"));
        assert!(screen.contains("Ask about equipment"));
    }

    #[tokio::test]
    async fn sent_message_and_pending_answer_are_shown() {
        let mut app = App::new(&AppConfig::default());
        app.send("hello").unwrap();
        let screen = screen(&app);
        assert!(screen.contains("[You]"));
        assert!(screen.contains("hello"));
        assert!(screen.contains("[Assistant]"));
        assert!(screen.contains("thinking..."));
    }

    #[test]
    fn alert_is_drawn_over_the_chat() {
        let mut app = App::new(&AppConfig::default());
        app.alert("Cannot access the microphone");
        let screen = screen(&app);
        assert!(screen.contains("Notice"));
        assert!(screen.contains("Cannot access the microphone"));
    }
}
