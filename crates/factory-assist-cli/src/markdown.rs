//! Markdown to ratatui text conversion.
//!
//! Answers arrive as Markdown and are re-rendered on every reveal step, so
//! the input is often cut off mid-construct (an open code fence, half a
//! table). The renderer copes with that by treating whatever is open at the
//! end of the text as closed.
//!
//! Links and embedded images keep their URL visible, since a terminal cannot
//! follow or display them.

use std::sync::OnceLock;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const THEME: &str = "base16-ocean.dark";

/// Convert markdown text to styled ratatui Lines.
///
/// Code lines wider than `available_width` are cut with an ellipsis instead
/// of wrapping into the gutter.
pub fn render_markdown(text: &str, available_width: usize) -> Vec<Line<'static>> {
    MarkdownRenderer::new(available_width).render(text)
}

/// Syntax highlighter using syntect. Loaded once per process.
struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl SyntaxHighlighter {
    fn shared() -> &'static Self {
        static HIGHLIGHTER: OnceLock<SyntaxHighlighter> = OnceLock::new();
        HIGHLIGHTER.get_or_init(|| {
            let mut themes = ThemeSet::load_defaults().themes;
            Self {
                syntax_set: SyntaxSet::load_defaults_newlines(),
                theme: themes.remove(THEME).unwrap_or_default(),
            }
        })
    }

    /// Highlight code and return styled spans for each line.
    fn highlight(&self, code: &str, lang: &str) -> Vec<Vec<Span<'static>>> {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());
        let mut highlighter = HighlightLines::new(syntax, &self.theme);

        LinesWithEndings::from(code)
            .map(|line| match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => ranges
                    .into_iter()
                    .filter_map(|(style, text)| {
                        let text = text.trim_end_matches(['\n', '\r']);
                        (!text.is_empty()).then(|| Span::styled(text.to_string(), to_style(style)))
                    })
                    .collect(),
                Err(_) => vec![Span::styled(
                    line.trim_end_matches(['\n', '\r']).to_string(),
                    Style::default().fg(Color::Yellow),
                )],
            })
            .collect()
    }
}

fn to_style(style: syntect::highlighting::Style) -> Style {
    let fg = style.foreground;
    let mut out = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
    for (font, modifier) in [
        (FontStyle::BOLD, Modifier::BOLD),
        (FontStyle::ITALIC, Modifier::ITALIC),
        (FontStyle::UNDERLINE, Modifier::UNDERLINED),
    ] {
        if style.font_style.contains(font) {
            out = out.add_modifier(modifier);
        }
    }
    out
}

/// Markdown renderer state.
struct MarkdownRenderer {
    lines: Vec<Line<'static>>,
    current_spans: Vec<Span<'static>>,
    style_stack: Vec<Style>,
    code_block: Option<(String, String)>,
    /// One entry per open list: the next number for ordered lists.
    lists: Vec<Option<u64>>,
    /// Destinations of open links, shown after the link text.
    link_urls: Vec<String>,
    /// Destination of the open image; its alt text is collected in between.
    image_url: Option<String>,
    table_cell: usize,
    available_width: usize,
}

impl MarkdownRenderer {
    fn new(available_width: usize) -> Self {
        Self {
            lines: Vec::new(),
            current_spans: Vec::new(),
            style_stack: vec![Style::default()],
            code_block: None,
            lists: Vec::new(),
            link_urls: Vec::new(),
            image_url: None,
            table_cell: 0,
            available_width,
        }
    }

    fn current_style(&self) -> Style {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, style: Style) {
        let new_style = self.current_style().patch(style);
        self.style_stack.push(new_style);
    }

    fn pop_style(&mut self) {
        if self.style_stack.len() > 1 {
            self.style_stack.pop();
        }
    }

    fn flush_line(&mut self) {
        if !self.current_spans.is_empty() {
            let spans = std::mem::take(&mut self.current_spans);
            self.lines.push(Line::from(spans));
        }
    }

    fn add_blank_line(&mut self) {
        self.flush_line();
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::from(""));
        }
    }

    fn add_text(&mut self, text: &str) {
        if let Some((_, content)) = self.code_block.as_mut() {
            content.push_str(text);
            return;
        }

        let style = self.current_style();
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.flush_line();
            }
            if !part.is_empty() {
                self.current_spans.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn render_code_block(&mut self, lang: &str, content: &str) {
        self.flush_line();

        let gutter_style = Style::default().fg(Color::DarkGray);
        let rule_width = self.available_width.saturating_sub(2).min(44);

        let mut header = vec![Span::styled("┌", gutter_style)];
        if lang.is_empty() {
            header.push(Span::styled("─".repeat(rule_width), gutter_style));
        } else {
            header.push(Span::styled("─ ", gutter_style));
            header.push(Span::styled(
                lang.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
            header.push(Span::styled(" ", gutter_style));
            header.push(Span::styled(
                "─".repeat(rule_width.saturating_sub(lang.chars().count() + 3)),
                gutter_style,
            ));
        }
        self.lines.push(Line::from(header));

        let max_code_width = self.available_width.saturating_sub(4);
        for highlighted in SyntaxHighlighter::shared().highlight(content, lang) {
            let mut spans = vec![Span::styled("│ ", gutter_style)];
            spans.extend(clip_spans(highlighted, max_code_width));
            self.lines.push(Line::from(spans));
        }

        self.lines.push(Line::from(vec![
            Span::styled("└", gutter_style),
            Span::styled("─".repeat(rule_width), gutter_style),
        ]));
        self.lines.push(Line::from(""));
    }

    fn render(mut self, text: &str) -> Vec<Line<'static>> {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;

        for event in Parser::new_ext(text, options) {
            match event {
                Event::Start(tag) => self.handle_start_tag(tag),
                Event::End(tag) => self.handle_end_tag(tag),
                Event::Text(text) => self.add_text(&text),
                Event::Code(code) => {
                    self.current_spans.push(Span::styled(
                        code.to_string(),
                        Style::default().fg(Color::Yellow).bg(Color::Rgb(40, 40, 40)),
                    ));
                }
                // Terminal output keeps the author's line breaks.
                Event::SoftBreak | Event::HardBreak => self.flush_line(),
                Event::Rule => {
                    self.flush_line();
                    self.lines.push(Line::from(Span::styled(
                        "─".repeat(self.available_width.min(60)),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                _ => {}
            }
        }

        // An unterminated fence is still shown.
        if let Some((lang, content)) = self.code_block.take() {
            self.render_code_block(&lang, &content);
        }
        self.flush_line();

        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }

    fn handle_start_tag(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.add_blank_line();
                let prefix = match level {
                    HeadingLevel::H1 => "# ",
                    HeadingLevel::H2 => "## ",
                    HeadingLevel::H3 => "### ",
                    _ => "#### ",
                };
                self.current_spans.push(Span::styled(
                    prefix.to_string(),
                    Style::default().fg(Color::Magenta),
                ));
                self.push_style(Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD));
            }
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.current_spans
                    .push(Span::styled("│ ".to_string(), Style::default().fg(Color::Blue)));
                self.push_style(Style::default().fg(Color::Blue));
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.split_whitespace().next().unwrap_or("").to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code_block = Some((lang, String::new()));
            }
            Tag::List(first) => {
                self.flush_line();
                self.lists.push(first);
            }
            Tag::Item => {
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{indent}{n}. ");
                        *n += 1;
                        bullet
                    }
                    _ => format!("{indent}• "),
                };
                self.current_spans
                    .push(Span::styled(bullet, Style::default().fg(Color::Cyan)));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT));
            }
            Tag::Link { dest_url, .. } => {
                self.link_urls.push(dest_url.to_string());
                self.push_style(Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
            }
            Tag::Image { dest_url, .. } => {
                self.current_spans
                    .push(Span::styled("🖼 ", Style::default().fg(Color::Magenta)));
                self.image_url = Some(dest_url.to_string());
                self.push_style(Style::default().fg(Color::Magenta));
            }
            Tag::TableRow | Tag::TableHead => {
                self.flush_line();
                self.table_cell = 0;
            }
            Tag::TableCell => {
                if self.table_cell > 0 {
                    self.current_spans
                        .push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
                }
                self.table_cell += 1;
            }
            _ => {}
        }
    }

    fn handle_end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush_line();
            }
            TagEnd::Paragraph => {
                // Tight list items end their paragraph without spacing.
                if self.lists.is_empty() {
                    self.add_blank_line();
                } else {
                    self.flush_line();
                }
            }
            TagEnd::BlockQuote(_) => {
                self.pop_style();
                self.flush_line();
            }
            TagEnd::CodeBlock => {
                if let Some((lang, content)) = self.code_block.take() {
                    self.render_code_block(&lang, &content);
                }
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.add_blank_line();
                }
            }
            TagEnd::Item | TagEnd::TableRow => self.flush_line(),
            TagEnd::TableHead => {
                self.flush_line();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(self.available_width.min(40)),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            TagEnd::Table => self.add_blank_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.link_urls.pop() {
                    self.push_url(url);
                }
            }
            TagEnd::Image => {
                self.pop_style();
                if let Some(url) = self.image_url.take() {
                    self.push_url(url);
                }
            }
            _ => {}
        }
    }

    /// Show a destination after its text, unless the text already is the URL.
    fn push_url(&mut self, url: String) {
        if url.is_empty() || self.current_spans.last().is_some_and(|s| s.content == url) {
            return;
        }
        self.current_spans
            .push(Span::styled(format!(" <{url}>"), Style::default().fg(Color::DarkGray)));
    }
}

/// Cut a highlighted line to `max_width` display columns, marking the cut.
fn clip_spans(spans: Vec<Span<'static>>, max_width: usize) -> Vec<Span<'static>> {
    let total: usize = spans.iter().map(Span::width).sum();
    if total <= max_width {
        return spans;
    }

    let mut remaining = max_width.saturating_sub(1);
    let mut out = Vec::new();
    for span in spans {
        if remaining == 0 {
            break;
        }
        let width = span.width();
        if width <= remaining {
            remaining -= width;
            out.push(span);
        } else {
            let mut taken = String::new();
            let mut used = 0;
            for c in span.content.chars() {
                let w = Span::raw(c.to_string()).width();
                if used + w > remaining {
                    break;
                }
                used += w;
                taken.push(c);
            }
            out.push(Span::styled(taken, span.style));
            remaining = 0;
        }
    }
    out.push(Span::styled("…", Style::default().fg(Color::DarkGray)));
    out
}
