use chrono::{DateTime, FixedOffset, SubsecRound};
use lazy_regex::regex;
use scraper::{ElementRef, Node};
use sqlx::SqlitePool;

pub(crate) async fn is_table_exists(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?
            .is_some(),
    )
}

pub(crate) fn get_now() -> DateTime<FixedOffset> {
    let now = chrono::offset::Local::now().trunc_subsecs(3);
    now.with_timezone(now.offset())
}

/// Collapses every whitespace run (non-breaking spaces included) into one space.
pub(crate) fn normalize_whitespace(s: &str) -> String {
    regex!(r"[\s\u{a0}]+").replace_all(s, " ").trim().to_string()
}

/// Text content of an element with whitespace normalized.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn is_hidden_tag(name: &str) -> bool {
    matches!(
        name,
        "script" | "style" | "noscript" | "template" | "head" | "svg" | "iframe"
    )
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "br"
            | "dd"
            | "div"
            | "dl"
            | "dt"
            | "figcaption"
            | "footer"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "section"
            | "table"
            | "tr"
            | "ul"
    )
}

/// Approximates `innerText`: block elements start new lines, hidden elements are skipped.
pub(crate) fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_visible_text(root, &mut out);
    out.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_visible_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if is_hidden_tag(name) {
                    continue;
                }
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = is_block_tag(name);
                if block {
                    out.push('\n');
                }
                if matches!(name, "td" | "th") {
                    out.push(' ');
                }
                push_visible_text(child, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// `"Dante Moore"` → `"dante-moore"`
pub(crate) fn slugify(s: &str) -> String {
    regex!(r"[^a-z0-9]+")
        .replace_all(&s.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}
