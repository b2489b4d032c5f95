use super::Extraction;
use crate::prospect::FieldWarning;
use crate::{utils, FetchedPage, FieldExtractor};
use lazy_regex::{regex, Regex};
use lazy_static::lazy_static;
use scraper::Selector;
use std::collections::BTreeMap;

const FIELD: &str = "profile";

pub const POSITIONS: &[&str] = &[
    "QB", "RB", "WR", "TE", "OL", "DL", "EDGE", "LB", "DB", "CB", "S", "PK", "P",
];

/// Labelled facts looked up in the page text when the markup has no detail list.
const TEXT_DETAILS: &[(&str, &str)] = &[
    ("height", r"(?i)\bHEIGHT:?\s*(\d-\d{1,2}(?:\s*\(\d+%\*?\))?)"),
    ("weight", r"(?i)\bWEIGHT:?\s*(\d{3}(?:\s*\(\d+%\*?\))?)"),
    ("college", r"(?m)^COLLEGE:?\s*([A-Za-z .&'-]+?)\s*$"),
    ("class", r"(?i)\bCLASS:?\s*(Freshman|Sophomore|Junior|Senior|RS\s*\w+)"),
    ("hometown", r"(?m)^HOME\s*TOWN:?\s*([A-Za-z ,.'-]+?)\s*$"),
    ("jersey", r"JERSEY:\s*#(\d+)"),
    ("age", r"AGE:\s*([\d.]+)"),
    ("dob", r"DOB:\s*(\d+/\d+/\d+)"),
    ("forty", r"FORTY TIME:\s*([\d.]+)"),
    ("draft_year", r"DRAFT YEAR:\s*(\d{4})"),
    ("college_games", r"COLLEGE GAMES:\s*(\d+)"),
    ("college_snaps", r"COLLEGE SNAPS:\s*(\d+)"),
    ("play_style", r"(?m)PLAY STYLE:\s*([A-Z ]+?)\s*$"),
    ("overall_rank", r"OVERALL RANK:\s*#(\d+)"),
    ("position_rank", r"(\d+)\s*POSITION\s+RANK"),
    ("draft_projection", r"(?m)DRAFT PROJECTION:\s*(.+?)\s*$"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref NAME: Selector = Selector::parse("h1.player-name, .player-name").expect(E);
    static ref HEADING: Selector = Selector::parse("h1").expect(E);
    static ref OG_TITLE: Selector = Selector::parse(r#"meta[property="og:title"]"#).expect(E);
    static ref POSITION: Selector = Selector::parse(".player-position").expect(E);
    static ref DETAIL: Selector = Selector::parse(".player-details li").expect(E);
    static ref DETAIL_LABEL: Selector = Selector::parse(".label, .detail-label").expect(E);
    static ref DETAIL_VALUE: Selector = Selector::parse(".value, .detail-value").expect(E);
    static ref TEXT_DETAIL_PATTERNS: Vec<(&'static str, Regex)> = TEXT_DETAILS
        .iter()
        .map(|(key, pattern)| (*key, Regex::new(pattern).expect("Invalid regex")))
        .collect();
}

/// Who the page is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub position: Option<String>,
    pub details: BTreeMap<String, String>,
}

/// Name, position and basic details. The name always resolves, falling back
/// to the profile URL slug.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfileExtractor;

impl FieldExtractor for ProfileExtractor {
    type Value = Profile;

    fn field(&self) -> &'static str {
        FIELD
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<Profile> {
        let mut warnings = vec![];
        let slug = page
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();

        // a bare <h1> may be site chrome, so it only beats an unusable slug
        let name = name_from_markup(page)
            .or_else(|| name_from_title(page))
            .or_else(|| name_from_slug(&slug))
            .or_else(|| first_text(page, &HEADING))
            .unwrap_or_else(|| {
                warnings.push(FieldWarning::missing("name"));
                slug.clone()
            });

        let position = page
            .document
            .select(&POSITION)
            .next()
            .map(utils::element_text)
            .and_then(|text| position_code(&text))
            .or_else(|| {
                regex!(r"POSITION:?\s*\n?\s*([A-Z]{1,4})\b")
                    .captures_iter(&page.text)
                    .find_map(|caps| position_code(&caps[1]))
            })
            .or_else(|| slug.split('-').find_map(position_code));
        if position.is_none() {
            warnings.push(FieldWarning::missing("position"));
        }

        let mut details = details_from_dom(page);
        if details.is_empty() {
            details = details_from_text(&page.text);
        }

        Extraction::new(
            Some(Profile {
                name,
                position,
                details,
            }),
            warnings,
        )
    }
}

fn first_text(page: &FetchedPage, selector: &Selector) -> Option<String> {
    page.document
        .select(selector)
        .next()
        .map(utils::element_text)
        .filter(|s| !s.is_empty())
}

fn name_from_markup(page: &FetchedPage) -> Option<String> {
    first_text(page, &NAME)
}

fn name_from_title(page: &FetchedPage) -> Option<String> {
    // "Dante Moore QB UCLA | NFL Draft Profile & Scouting Report"
    let title = page
        .document
        .select(&OG_TITLE)
        .next()
        .and_then(|el| el.value().attr("content"))?;
    let head = title.split('|').next().unwrap_or_default();
    let words: Vec<&str> = head
        .split_whitespace()
        .take_while(|word| position_code(word).is_none())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// `Dante-Moore-QB-UCLA` → `Dante Moore`
pub fn name_from_slug(slug: &str) -> Option<String> {
    let words: Vec<String> = slug
        .split(|c: char| c == '-' || c == '_')
        .filter(|w| !w.is_empty() && position_code(w).is_none())
        .take(2)
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn position_code(text: &str) -> Option<String> {
    let code = text.trim().to_uppercase();
    POSITIONS.contains(&code.as_str()).then_some(code)
}

fn details_from_dom(page: &FetchedPage) -> BTreeMap<String, String> {
    page.document
        .select(&DETAIL)
        .filter_map(|item| {
            let label = item.select(&DETAIL_LABEL).next().map(utils::element_text)?;
            let value = item.select(&DETAIL_VALUE).next().map(utils::element_text)?;
            let key = utils::slugify(&label).replace('-', "_");
            (!key.is_empty() && !value.is_empty()).then_some((key, value))
        })
        .collect()
}

fn details_from_text(text: &str) -> BTreeMap<String, String> {
    TEXT_DETAIL_PATTERNS
        .iter()
        .filter_map(|(key, pattern)| {
            let caps = pattern.captures(text)?;
            let value = utils::normalize_whitespace(caps.get(1)?.as_str());
            (!value.is_empty()).then(|| (key.to_string(), value))
        })
        .collect()
}
