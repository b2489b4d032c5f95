pub mod boilerplate;

use super::Extraction;
use crate::prospect::{FieldWarning, ReportSection, ScoutingReport};
use crate::{utils, FetchedPage, FieldExtractor};
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::{ElementRef, Selector};
use tracing::debug;

const FIELD: &str = "scouting_report";

/// Section every block before the first recognized header lands in.
const PREAMBLE: &str = "overview";

const E: &str = "Invalid selector";
lazy_static! {
    static ref CONTAINERS: [Selector; 3] = [
        Selector::parse(r#"[data-section="scouting-report"]"#).expect(E),
        Selector::parse("#scouting-report").expect(E),
        Selector::parse(".scouting-report").expect(E),
    ];
    static ref BLOCKS: Selector = Selector::parse("h1, h2, h3, h4, h5, h6, p, li").expect(E);
    static ref NESTED_P: Selector = Selector::parse("p").expect(E);
}

/// Canonical name of a report header, `None` when the text is not one.
///
/// `SCOUTING REPORT: STRENGTHS`, `Strengths` and `Pros:` all map to `strengths`.
pub fn section_name(header: &str) -> Option<&'static str> {
    let stripped = regex!(r"(?i)^\s*(scouting report|draft profile)\s*:\s*").replace(header, "");
    let name = stripped
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_lowercase();
    match name.as_str() {
        "bio" | "biography" | "background" => Some("bio"),
        "strengths" | "strength" | "pros" => Some("strengths"),
        "weaknesses" | "weakness" | "cons" => Some("weaknesses"),
        "summary" | "overview" | "bottom line" | "overall" => Some("summary"),
        _ => None,
    }
}

fn has_header_prefix(text: &str) -> bool {
    regex!(r"(?i)^\s*(scouting report|draft profile)\s*:").is_match(text)
}

fn is_title(text: &str) -> bool {
    regex!(r"(?i)^\s*(scouting report|draft profile)\s*:?\s*$").is_match(text)
}

/// Narrative text, segmented by recognized headers.
///
/// Reads the report container when the page has one, otherwise looks for
/// `SCOUTING REPORT: <SECTION>` header lines in the page text. Anything the
/// [`boilerplate`] checks reject never reaches the report.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoutingReportParser;

impl FieldExtractor for ScoutingReportParser {
    type Value = ScoutingReport;

    fn field(&self) -> &'static str {
        FIELD
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<ScoutingReport> {
        let container = CONTAINERS
            .iter()
            .find_map(|selector| page.document.select(selector).next());

        let report = match container {
            Some(container) => Some(from_container(container)),
            None => from_text(&page.text),
        };

        match report {
            Some(report) if report.is_empty() => Extraction::new(
                Some(report),
                vec![FieldWarning::partial(FIELD, "report is present but empty")],
            ),
            Some(report) => Extraction::found(report),
            None => Extraction::missing(FIELD),
        }
    }
}

/// Accumulates blocks into sections in document order.
#[derive(Default)]
struct Sections {
    sections: Vec<ReportSection>,
    saw_header: bool,
}

impl Sections {
    fn start(&mut self, name: &str) {
        self.saw_header = true;
        self.sections.push(ReportSection {
            name: name.to_string(),
            paragraphs: vec![],
        });
    }

    fn push(&mut self, paragraph: String) {
        if self.sections.is_empty() {
            self.sections.push(ReportSection {
                name: PREAMBLE.to_string(),
                paragraphs: vec![],
            });
        }
        if let Some(current) = self.sections.last_mut() {
            current.paragraphs.push(paragraph);
        }
    }

    fn finish(self) -> ScoutingReport {
        if self.saw_header {
            ScoutingReport::Sectioned(self.sections)
        } else {
            let text = self
                .sections
                .into_iter()
                .flat_map(|s| s.paragraphs)
                .collect::<Vec<_>>()
                .join("\n\n");
            ScoutingReport::Unsegmented(text)
        }
    }
}

fn from_container(container: ElementRef<'_>) -> ScoutingReport {
    let mut sections = Sections::default();

    for block in container.select(&BLOCKS) {
        let tag = block.value().name();
        // list items holding paragraphs are read through those paragraphs
        if tag == "li" && block.select(&NESTED_P).next().is_some() {
            continue;
        }
        if boilerplate::is_excluded(block, container) {
            continue;
        }

        let text = utils::element_text(block);
        if text.is_empty() {
            continue;
        }
        if boilerplate::is_terminal(&text) {
            debug!("Scouting report ends at {:?}", text);
            break;
        }
        if boilerplate::is_boilerplate(&text) {
            debug!("Dropping boilerplate {:?}", text);
            continue;
        }

        let is_heading = tag.len() == 2 && tag.starts_with('h');
        if is_heading || has_header_prefix(&text) {
            if let Some(name) = section_name(&text) {
                sections.start(name);
                continue;
            }
            if is_heading && is_title(&text) {
                continue;
            }
        }
        sections.push(text);
    }

    sections.finish()
}

fn from_text(text: &str) -> Option<ScoutingReport> {
    let header = regex!(r"(?im)^\s*(?:scouting report|draft profile)\s*:\s*([a-z][a-z /]*?)\s*$");
    let headers: Vec<_> = header.captures_iter(text).collect();
    if headers.is_empty() {
        return None;
    }

    let mut sections = Sections::default();
    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = section_name(label.as_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| label.as_str().to_lowercase());
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        sections.start(&name);
        let mut body = vec![];
        let mut ended = false;
        for line in text[whole.end()..end].lines().map(str::trim) {
            if line.is_empty() || boilerplate::is_boilerplate(line) {
                continue;
            }
            if boilerplate::is_terminal(line) {
                ended = true;
                break;
            }
            body.push(line);
        }

        let body = body.join(" ");
        let paragraphs = if matches!(name.as_str(), "strengths" | "weaknesses") {
            split_points(&body)
        } else if body.is_empty() {
            vec![]
        } else {
            vec![body]
        };
        for paragraph in paragraphs {
            sections.push(paragraph);
        }
        if ended {
            break;
        }
    }

    Some(sections.finish())
}

/// Splits prose into points at sentence ends followed by a capital letter.
pub fn split_points(text: &str) -> Vec<String> {
    let text = text.trim();
    let mut points = vec![];
    let mut start = 0;
    for m in regex!(r"\.\s+").find_iter(text) {
        let next_is_capital = text[m.end()..]
            .chars()
            .next()
            .map_or(false, char::is_uppercase);
        if next_is_capital {
            points.push(&text[start..m.start()]);
            start = m.end();
        }
    }
    points.push(&text[start..]);

    points
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p.ends_with('.') {
                p.to_string()
            } else {
                format!("{}.", p)
            }
        })
        .collect()
}
