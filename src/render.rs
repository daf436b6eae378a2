//! Markdown to ANSI rendering for the final reply.
//!
//! Live fragments are printed raw while a turn streams; once the turn ends
//! the whole reply is parsed into mdast and re-rendered with the selected
//! [`DisplayStyle`]. Fenced code goes through syntect.

use std::fmt;

use markdown::{mdast, to_mdast, ParseOptions};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};
use unicode_width::UnicodeWidthStr;

pub const DEFAULT_WRAP_WIDTH: usize = 120;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "1";
const ITALIC: &str = "3";
const UNDERLINE: &str = "4";
const STRIKETHROUGH: &str = "9";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Loads syntect's syntax and theme sets so the first highlighted reply does
/// not pay for it.
pub fn prewarm_highlighting() {
    Lazy::force(&SYNTAX_SET);
    Lazy::force(&THEME_SET);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayStyle {
    Dark,
    Light,
    Notty,
    #[default]
    Dracula,
    TokyoNight,
}

impl DisplayStyle {
    pub const ALL: [DisplayStyle; 5] = [
        DisplayStyle::Dark,
        DisplayStyle::Light,
        DisplayStyle::Notty,
        DisplayStyle::Dracula,
        DisplayStyle::TokyoNight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
            Self::Notty => "notty",
            Self::Dracula => "dracula",
            Self::TokyoNight => "tokyo-night",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(name))
    }

    /// Position in [`DisplayStyle::ALL`], used by `/style <n>`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    fn theme(self) -> MarkdownTheme {
        match self {
            Self::Dark => MarkdownTheme {
                heading: "38;5;39",
                link: "38;5;30",
                code: "38;5;203",
                quote: "38;5;250",
                bullet: "38;5;244",
                border: "38;5;240",
                syntax_theme: Some("base16-ocean.dark"),
            },
            Self::Light => MarkdownTheme {
                heading: "38;5;27",
                link: "38;5;36",
                code: "38;5;160",
                quote: "38;5;238",
                bullet: "38;5;242",
                border: "38;5;248",
                syntax_theme: Some("InspiredGitHub"),
            },
            Self::Notty => MarkdownTheme {
                heading: "",
                link: "",
                code: "",
                quote: "",
                bullet: "",
                border: "",
                syntax_theme: None,
            },
            Self::Dracula => MarkdownTheme {
                heading: "38;2;189;147;249",
                link: "38;2;139;233;253",
                code: "38;2;80;250;123",
                quote: "38;2;241;250;140",
                bullet: "38;2;255;121;198",
                border: "38;2;98;114;164",
                syntax_theme: Some("base16-eighties.dark"),
            },
            Self::TokyoNight => MarkdownTheme {
                heading: "38;2;122;162;247",
                link: "38;2;125;207;255",
                code: "38;2;158;206;106",
                quote: "38;2;169;177;214",
                bullet: "38;2;187;154;247",
                border: "38;2;86;95;137",
                syntax_theme: Some("base16-mocha.dark"),
            },
        }
    }
}

impl fmt::Display for DisplayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SGR parameter strings per element. Empty means unstyled.
struct MarkdownTheme {
    heading: &'static str,
    link: &'static str,
    code: &'static str,
    quote: &'static str,
    bullet: &'static str,
    border: &'static str,
    syntax_theme: Option<&'static str>,
}

pub struct MarkdownRenderer {
    style: DisplayStyle,
    theme: MarkdownTheme,
    width: usize,
}

impl MarkdownRenderer {
    pub fn new(style: DisplayStyle) -> Self {
        Self {
            style,
            theme: style.theme(),
            width: DEFAULT_WRAP_WIDTH,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn style(&self) -> DisplayStyle {
        self.style
    }

    pub fn render(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let normalized = text.replace('\t', "   ");
        let root = match to_mdast(&normalized, &ParseOptions::gfm()) {
            Ok(node) => node,
            Err(_) => return normalized,
        };
        let nodes = match root {
            mdast::Node::Root(root) => root.children,
            other => vec![other],
        };

        let mut lines = Vec::new();
        for (idx, node) in nodes.iter().enumerate() {
            lines.extend(self.render_block(node));
            if idx + 1 < nodes.len() {
                lines.push(String::new());
            }
        }
        lines.join("\n")
    }

    fn paint(&self, sgr: &str, text: &str) -> String {
        if sgr.is_empty() || self.style == DisplayStyle::Notty || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{sgr}m{text}{RESET}")
    }

    /// Renders inline children. `outer` is re-emitted after every nested
    /// reset so enclosing styles survive.
    fn render_inline(&self, nodes: &[mdast::Node], outer: &str) -> String {
        let mut out = String::new();
        for node in nodes {
            let styled = match node {
                mdast::Node::Text(text) => {
                    out.push_str(&text.value);
                    continue;
                }
                mdast::Node::Strong(strong) => {
                    self.paint(BOLD, &self.render_inline(&strong.children, BOLD))
                }
                mdast::Node::Emphasis(emphasis) => {
                    self.paint(ITALIC, &self.render_inline(&emphasis.children, ITALIC))
                }
                mdast::Node::Delete(delete) => self.paint(
                    STRIKETHROUGH,
                    &self.render_inline(&delete.children, STRIKETHROUGH),
                ),
                mdast::Node::InlineCode(code) => self.paint(self.theme.code, &code.value),
                mdast::Node::Link(link) => {
                    let label = plain_text(&link.children);
                    let styled = self.paint(self.theme.link, &self.paint(UNDERLINE, &label));
                    let href = link.url.strip_prefix("mailto:").unwrap_or(&link.url);
                    if label == link.url || label == href {
                        styled
                    } else {
                        format!("{styled} ({})", link.url)
                    }
                }
                mdast::Node::Break(_) => "\n".to_string(),
                mdast::Node::Html(html) => html.value.clone(),
                mdast::Node::Image(image) => {
                    if image.alt.is_empty() {
                        image.url.clone()
                    } else {
                        image.alt.clone()
                    }
                }
                mdast::Node::InlineMath(math) => math.value.clone(),
                mdast::Node::Paragraph(paragraph) => self.render_inline(&paragraph.children, outer),
                _ => continue,
            };
            out.push_str(&styled);
            if !outer.is_empty() && self.style != DisplayStyle::Notty {
                out.push_str(&format!("\x1b[{outer}m"));
            }
        }
        out
    }

    fn render_block(&self, node: &mdast::Node) -> Vec<String> {
        match node {
            mdast::Node::Heading(heading) => {
                let text = self.render_inline(&heading.children, "");
                let prefix = "#".repeat(usize::from(heading.depth));
                let styled = self.paint(BOLD, &self.paint(self.theme.heading, &format!("{prefix} {text}")));
                vec![styled]
            }
            mdast::Node::Paragraph(paragraph) => {
                let text = self.render_inline(&paragraph.children, "");
                text.split('\n')
                    .flat_map(|line| wrap_plain(line, self.width))
                    .collect()
            }
            mdast::Node::Code(code) => self.render_code(&code.value, code.lang.as_deref()),
            mdast::Node::List(list) => self.render_list(list, 0),
            mdast::Node::Blockquote(quote) => {
                let border = self.paint(self.theme.border, "│ ");
                quote
                    .children
                    .iter()
                    .flat_map(|child| self.render_block(child))
                    .map(|line| format!("{border}{}", self.paint(self.theme.quote, &line)))
                    .collect()
            }
            mdast::Node::ThematicBreak(_) => {
                vec![self.paint(self.theme.border, &"─".repeat(self.width.min(80)))]
            }
            mdast::Node::Table(table) => self.render_table(table),
            mdast::Node::Html(html) => vec![html.value.trim().to_string()],
            other => {
                let text = self.render_inline(std::slice::from_ref(other), "");
                if text.is_empty() {
                    Vec::new()
                } else {
                    text.split('\n').map(str::to_string).collect()
                }
            }
        }
    }

    fn render_code(&self, code: &str, lang: Option<&str>) -> Vec<String> {
        let mut lines = vec![self.paint(self.theme.border, &format!("```{}", lang.unwrap_or_default()))];
        let highlighted = self
            .theme
            .syntax_theme
            .and_then(|theme| highlight_code(code, lang, theme));
        match highlighted {
            Some(highlighted) => lines.extend(highlighted.into_iter().map(|line| format!("  {line}"))),
            None => lines.extend(code.split('\n').map(|line| format!("  {}", self.paint(self.theme.code, line)))),
        }
        lines.push(self.paint(self.theme.border, "```"));
        lines
    }

    fn render_list(&self, list: &mdast::List, depth: usize) -> Vec<String> {
        let indent = "  ".repeat(depth);
        let start = list.start.unwrap_or(1);
        let mut lines = Vec::new();

        for (idx, node) in list.children.iter().enumerate() {
            let mdast::Node::ListItem(item) = node else {
                continue;
            };
            let bullet = match (list.ordered, item.checked) {
                (_, Some(true)) => "[x] ".to_string(),
                (_, Some(false)) => "[ ] ".to_string(),
                (true, None) => format!("{}. ", start as usize + idx),
                (false, None) => "- ".to_string(),
            };
            let bullet = self.paint(self.theme.bullet, &bullet);

            let mut first = true;
            for child in &item.children {
                if let mdast::Node::List(nested) = child {
                    lines.extend(self.render_list(nested, depth + 1));
                    continue;
                }
                for line in self.render_block(child) {
                    if first {
                        lines.push(format!("{indent}{bullet}{line}"));
                        first = false;
                    } else {
                        lines.push(format!("{indent}  {line}"));
                    }
                }
            }
            if first {
                lines.push(format!("{indent}{bullet}"));
            }
        }

        lines
    }

    fn render_table(&self, table: &mdast::Table) -> Vec<String> {
        let rows: Vec<Vec<String>> = table
            .children
            .iter()
            .filter_map(|node| match node {
                mdast::Node::TableRow(row) => Some(
                    row.children
                        .iter()
                        .map(|cell| match cell {
                            mdast::Node::TableCell(cell) => plain_text(&cell.children),
                            other => plain_text(std::slice::from_ref(other)),
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect();

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return Vec::new();
        }
        let mut widths = vec![0usize; columns];
        for row in &rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(UnicodeWidthStr::width(cell.as_str()));
            }
        }

        let border = |left: &str, mid: &str, right: &str| {
            let cells: Vec<String> = widths.iter().map(|width| "─".repeat(*width)).collect();
            self.paint(self.theme.border, &format!("{left}─{}─{right}", cells.join(format!("─{mid}─").as_str())))
        };

        let mut lines = vec![border("┌", "┬", "┐")];
        for (row_idx, row) in rows.iter().enumerate() {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(idx, width)| {
                    let text = row.get(idx).map(String::as_str).unwrap_or_default();
                    let padded = format!(
                        "{text}{}",
                        " ".repeat(width.saturating_sub(UnicodeWidthStr::width(text)))
                    );
                    if row_idx == 0 {
                        self.paint(BOLD, &padded)
                    } else {
                        padded
                    }
                })
                .collect();
            lines.push(format!("│ {} │", cells.join(" │ ")));
            if row_idx == 0 {
                lines.push(border("├", "┼", "┤"));
            }
        }
        lines.push(border("└", "┴", "┘"));
        lines
    }
}

/// Formats the echoed user prompt under a history counter line.
pub fn format_user_text(text: &str, history_len: usize, style: DisplayStyle) -> String {
    if style == DisplayStyle::Notty {
        return format!("History items: {history_len}\n{text}\n");
    }
    format!("\x1b[36mHistory items: {history_len}\n\x1b[44;37m{text}\n{RESET}")
}

fn highlight_code(code: &str, lang: Option<&str>, theme_name: &str) -> Option<Vec<String>> {
    let theme = THEME_SET.themes.get(theme_name)?;
    let syntax = lang
        .and_then(|lang| SYNTAX_SET.find_syntax_by_token(lang))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        let ranges = highlighter.highlight_line(line, &SYNTAX_SET).ok()?;
        let escaped = as_24_bit_terminal_escaped(&ranges, false);
        lines.push(format!("{}{RESET}", escaped.trim_end_matches(['\n', '\r'])));
    }
    Some(lines)
}

fn plain_text(nodes: &[mdast::Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            mdast::Node::Text(text) => out.push_str(&text.value),
            mdast::Node::InlineCode(code) => out.push_str(&code.value),
            mdast::Node::Strong(strong) => out.push_str(&plain_text(&strong.children)),
            mdast::Node::Emphasis(emphasis) => out.push_str(&plain_text(&emphasis.children)),
            mdast::Node::Delete(delete) => out.push_str(&plain_text(&delete.children)),
            mdast::Node::Link(link) => out.push_str(&plain_text(&link.children)),
            mdast::Node::Paragraph(paragraph) => out.push_str(&plain_text(&paragraph.children)),
            mdast::Node::Image(image) => out.push_str(&image.alt),
            mdast::Node::Html(html) => out.push_str(&html.value),
            _ => {}
        }
    }
    out
}

/// Greedy word wrap for lines without escape sequences. Styled lines are
/// returned unchanged.
fn wrap_plain(line: &str, width: usize) -> Vec<String> {
    if line.contains('\x1b') || UnicodeWidthStr::width(line) <= width {
        return vec![line.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split(' ') {
        let current_width = UnicodeWidthStr::width(current.as_str());
        let word_width = UnicodeWidthStr::width(word);
        if !current.is_empty() && current_width + 1 + word_width > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    lines.push(current);
    lines
}
