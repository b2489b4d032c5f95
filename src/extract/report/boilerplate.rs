//! Boundary between scouting narrative and the page chrome around it.
//!
//! Three checks, each usable on its own: a text deny-list, the markers after
//! which the report is over, and the elements whose content is never narrative.

use crate::utils;
use scraper::ElementRef;

/// Lower-cased fragments that never occur in narrative text.
pub const DENY_FRAGMENTS: &[&str] = &[
    "share this",
    "share on",
    "advertisement",
    "click here",
    "subscribe",
    "sign up for",
    "cookie",
    "all rights reserved",
    "follow us",
    "read more",
    "loading...",
    "skip to content",
    "back to top",
    "©",
];

/// Whole-block texts that are widget labels rather than prose.
const DENY_EXACT: &[&str] = &[
    "home", "menu", "search", "share", "tweet", "print", "email", "close", "next", "previous",
];

/// Upper-cased prefixes of the blocks that follow a report.
pub const TERMINAL_MARKERS: &[&str] = &["NEXT:", "HOW OTHER SCOUTS", "HOW OTHER", "RELATED PROSPECTS"];

const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "aside", "button", "form",
    "iframe", "svg",
];

const EXCLUDED_HINTS: &[&str] = &[
    "share", "social", "advert", "ad-", "ads", "promo", "newsletter", "sponsor", "related",
];

/// Blocks longer than this are prose even when they mention a deny fragment.
const MAX_CHROME_WORDS: usize = 12;

/// Short blocks that carry a deny fragment as whole words, or are a widget label.
pub fn is_boilerplate(text: &str) -> bool {
    let lower = utils::normalize_whitespace(text).to_lowercase();
    if lower.split(' ').count() > MAX_CHROME_WORDS {
        return false;
    }
    DENY_FRAGMENTS.iter().any(|f| contains_words(&lower, f))
        || DENY_EXACT.contains(&lower.trim_end_matches(|c: char| !c.is_alphanumeric()))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '\''
}

/// `phrase` occurs in `text` with no word character directly on either side.
fn contains_words(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + phrase.len()..].chars().next();
        !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
    })
}

pub fn is_terminal(text: &str) -> bool {
    let upper = utils::normalize_whitespace(text).to_uppercase();
    TERMINAL_MARKERS.iter().any(|m| upper.starts_with(m))
}

/// True when `el` or any ancestor up to (not including) `scope` is page chrome.
pub fn is_excluded(el: ElementRef<'_>, scope: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .take_while(|e| e.id() != scope.id())
        .any(|e| {
            let element = e.value();
            if EXCLUDED_TAGS.contains(&element.name()) {
                return true;
            }
            let hints = format!(
                "{} {}",
                element.attr("class").unwrap_or_default(),
                element.attr("id").unwrap_or_default()
            )
            .to_lowercase();
            hints
                .split(|c: char| c.is_whitespace())
                .any(|token| EXCLUDED_HINTS.iter().any(|h| token.starts_with(h)))
        })
}
