//! Field extractors. Each one is a pure function of a [`FetchedPage`] and never fails:
//! absent data comes back as `None` plus [`FieldWarning`]s.

mod outlook;
mod profile;
mod ratings;
mod report;
mod skills;
mod stats;

pub use outlook::{ComparisonsExtractor, ConsensusExtractor, RecruitingGradesExtractor};
pub use profile::{Profile, ProfileExtractor};
pub use ratings::RatingExtractor;
pub use report::{boilerplate, ScoutingReportParser};
pub use skills::SkillsParser;
pub use stats::StatsParser;

use crate::prospect::FieldWarning;
use crate::utils;
use scraper::{ElementRef, Html, Selector};

#[cfg(test)]
use crate::FetchedPage;

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub value: Option<T>,
    pub warnings: Vec<FieldWarning>,
}

impl<T> Extraction<T> {
    pub fn found(value: T) -> Self {
        Extraction {
            value: Some(value),
            warnings: vec![],
        }
    }

    /// Absent value with exactly one `missing` warning.
    pub fn missing(field: &str) -> Self {
        Extraction {
            value: None,
            warnings: vec![FieldWarning::missing(field)],
        }
    }

    pub fn new(value: Option<T>, warnings: Vec<FieldWarning>) -> Self {
        Extraction { value, warnings }
    }

    pub fn into_parts(self) -> (Option<T>, Vec<FieldWarning>) {
        (self.value, self.warnings)
    }

    /// Attaches `detail` to every warning.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.warnings = self
            .warnings
            .into_iter()
            .map(|w| w.with_detail(detail.clone()))
            .collect();
        self
    }
}

/// One label/value pair read from the page, with its declared bounds if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelledValue {
    pub label: String,
    pub value: String,
    pub min: Option<String>,
    pub max: Option<String>,
}

/// The markup shapes a label/value section is known to come in.
pub(crate) enum PairLayout {
    /// `container` holding `item`s, each with a `label` and a `value` child.
    Items {
        container: &'static Selector,
        item: &'static Selector,
        label: &'static Selector,
        value: &'static Selector,
    },
    /// Two-column table, label in the first cell and value in the last.
    TableRows { table: &'static Selector },
    /// `<dl>` with alternating `<dt>`/`<dd>`.
    Definitions { list: &'static Selector },
}

const E: &str = "Invalid selector";
lazy_static::lazy_static! {
    static ref TR: Selector = Selector::parse("tr").expect(E);
    static ref CELL: Selector = Selector::parse("th, td").expect(E);
}

/// Reads pairs from the first layout that yields any.
///
/// A container that matched but held nothing readable does not stop the search,
/// so a wrapper around a table still reaches the table. `None` means no
/// container matched at all; `Some(vec![])` means a section was found but no
/// layout could read pairs from it.
pub(crate) fn labelled_pairs(doc: &Html, layouts: &[PairLayout]) -> Option<Vec<LabelledValue>> {
    let mut saw_container = false;
    for layout in layouts {
        match read_layout(doc, layout) {
            Some(pairs) if !pairs.is_empty() => return Some(pairs),
            Some(_) => saw_container = true,
            None => {}
        }
    }
    saw_container.then(Vec::new)
}

fn read_layout(doc: &Html, layout: &PairLayout) -> Option<Vec<LabelledValue>> {
    match layout {
        PairLayout::Items {
            container,
            item,
            label,
            value,
        } => {
            let container = doc.select(container).next()?;
            let pairs = container
                .select(item)
                .filter_map(|item| {
                    let label_el = item.select(label).next()?;
                    let value_el = item.select(value).next()?;
                    Some(LabelledValue {
                        label: utils::element_text(label_el),
                        value: utils::element_text(value_el),
                        min: bound(&[value_el, item], "data-min"),
                        max: bound(&[value_el, item], "data-max"),
                    })
                })
                .collect();
            Some(pairs)
        }
        PairLayout::TableRows { table } => {
            let table = doc.select(table).next()?;
            let pairs = table
                .select(&TR)
                .filter(|row| !in_thead(*row))
                .filter_map(|row| {
                    let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
                    if cells.len() < 2 {
                        return None;
                    }
                    let value_el = cells[cells.len() - 1];
                    Some(LabelledValue {
                        label: utils::element_text(cells[0]),
                        value: utils::element_text(value_el),
                        min: bound(&[value_el, row], "data-min"),
                        max: bound(&[value_el, row], "data-max"),
                    })
                })
                .collect();
            Some(pairs)
        }
        PairLayout::Definitions { list } => {
            let list = doc.select(list).next()?;
            let mut pairs = vec![];
            let mut pending: Option<String> = None;
            for child in list.children().filter_map(ElementRef::wrap) {
                match child.value().name() {
                    "dt" => pending = Some(utils::element_text(child)),
                    "dd" => {
                        if let Some(label) = pending.take() {
                            pairs.push(LabelledValue {
                                label,
                                value: utils::element_text(child),
                                min: bound(&[child], "data-min"),
                                max: bound(&[child], "data-max"),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Some(pairs)
        }
    }
}

fn bound(candidates: &[ElementRef<'_>], attr: &str) -> Option<String> {
    candidates
        .iter()
        .find_map(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
}

pub(crate) fn in_thead(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "thead")
}

#[cfg(test)]
pub(crate) fn page(html: &str) -> FetchedPage {
    let url = url::Url::parse("https://www.nfldraftbuzz.com/Player/Dante-Moore-QB-UCLA")
        .expect("Invalid url");
    FetchedPage::from_html(url, html)
}
