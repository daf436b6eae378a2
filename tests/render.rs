use ai_chat::repl::{resolve_history_name, resolve_style};
use ai_chat::{format_user_text, DisplayStyle, MarkdownRenderer};

fn strip_ansi(input: &str) -> String {
    let mut out = String::new();
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}

#[test]
fn notty_renders_without_escape_sequences() {
    let rendered = MarkdownRenderer::new(DisplayStyle::Notty)
        .render("# Title\n\nSome **bold** and `code`.\n\n- one\n- two\n");

    assert!(!rendered.contains('\x1b'));
    assert_eq!(
        rendered,
        "# Title\n\nSome bold and code.\n\n- one\n- two"
    );
}

#[test]
fn styled_output_keeps_the_text() {
    let rendered = MarkdownRenderer::new(DisplayStyle::Dracula)
        .render("## Heading\n\nA *quiet* [link](https://example.com).\n");

    assert!(rendered.contains('\x1b'));
    assert_eq!(
        strip_ansi(&rendered),
        "## Heading\n\nA quiet link (https://example.com)."
    );
}

#[test]
fn fenced_code_is_highlighted_and_fenced() {
    let rendered = MarkdownRenderer::new(DisplayStyle::Dark)
        .render("```rust\nfn main() {}\n```\n");
    let plain = strip_ansi(&rendered);

    assert!(rendered.contains("\x1b[38;2;"));
    assert_eq!(plain, "```rust\n  fn main() {}\n```");
}

#[test]
fn ordered_and_task_lists_get_markers() {
    let rendered = MarkdownRenderer::new(DisplayStyle::Notty)
        .render("1. first\n2. second\n\n- [x] done\n- [ ] open\n");

    assert_eq!(rendered, "1. first\n2. second\n\n[x] done\n[ ] open");
}

#[test]
fn tables_are_boxed() {
    let rendered = MarkdownRenderer::new(DisplayStyle::Notty)
        .render("| a | bb |\n| --- | --- |\n| 1 | 2 |\n");

    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "┌───┬────┐");
    assert_eq!(lines[1], "│ a │ bb │");
    assert_eq!(lines[3], "│ 1 │ 2  │");
    assert_eq!(lines[4], "└───┴────┘");
}

#[test]
fn blank_reply_renders_empty() {
    assert_eq!(MarkdownRenderer::new(DisplayStyle::Light).render("  \n"), "");
}

#[test]
fn user_text_shows_history_count() {
    assert_eq!(
        format_user_text("hello", 4, DisplayStyle::Notty),
        "History items: 4\nhello\n"
    );
    let styled = format_user_text("hello", 0, DisplayStyle::Dark);
    assert!(styled.contains("History items: 0"));
    assert!(styled.ends_with("\x1b[0m"));
}

#[test]
fn styles_resolve_by_name_or_index() {
    assert_eq!(resolve_style("tokyo-night"), Some(DisplayStyle::TokyoNight));
    assert_eq!(resolve_style("DRACULA"), Some(DisplayStyle::Dracula));
    assert_eq!(resolve_style("2"), Some(DisplayStyle::Notty));
    assert_eq!(resolve_style("9"), None);
    assert_eq!(resolve_style("sepia"), None);
}

#[test]
fn history_names_resolve_by_index() {
    let names = vec!["a.json".to_string(), "b.json".to_string()];
    assert_eq!(resolve_history_name("1", &names), "b.json");
    assert_eq!(resolve_history_name("7", &names), "7");
    assert_eq!(resolve_history_name(" c.json ", &names), "c.json");
}
