use super::{labelled_pairs, Extraction, LabelledValue, PairLayout};
use crate::prospect::{FieldWarning, Rating, RatingSet};
use crate::{FetchedPage, FieldExtractor};
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::Selector;
use tracing::debug;

const FIELD: &str = "ratings";

const E: &str = "Invalid selector";
lazy_static! {
    static ref SECTION: Selector =
        Selector::parse(r#"[data-section="ratings"], .player-ratings-section"#).expect(E);
    static ref ITEM: Selector = Selector::parse(".rating").expect(E);
    static ref LABEL: Selector = Selector::parse(".rating-label").expect(E);
    static ref VALUE: Selector = Selector::parse(".rating-value").expect(E);
    static ref TABLE: Selector = Selector::parse("table.ratings-table").expect(E);
    static ref DL: Selector = Selector::parse("dl.player-ratings").expect(E);
    static ref LAYOUTS: [PairLayout; 3] = [
        PairLayout::Items {
            container: &SECTION,
            item: &ITEM,
            label: &LABEL,
            value: &VALUE,
        },
        PairLayout::TableRows { table: &TABLE },
        PairLayout::Definitions { list: &DL },
    ];
}

/// Category scores, each kept on the scale the page declares for it.
///
/// The scale comes from `data-min`/`data-max` when present, otherwise from the
/// value itself (`84.6/100`, `92%`); bare numbers default to 0..=100.
#[derive(Debug, Default, Clone, Copy)]
pub struct RatingExtractor;

impl FieldExtractor for RatingExtractor {
    type Value = RatingSet;

    fn field(&self) -> &'static str {
        FIELD
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<RatingSet> {
        match labelled_pairs(&page.document, LAYOUTS.as_slice()) {
            Some(pairs) => from_pairs(pairs),
            None => from_text(&page.text),
        }
    }
}

fn from_pairs(pairs: Vec<LabelledValue>) -> Extraction<RatingSet> {
    if pairs.is_empty() {
        return Extraction::new(
            None,
            vec![FieldWarning::malformed(FIELD, "ratings section has no entries")],
        );
    }

    let mut ratings = RatingSet::new();
    let mut warnings = vec![];
    for pair in pairs {
        if pair.label.is_empty() {
            warnings.push(FieldWarning::malformed(
                FIELD,
                format!("unlabelled value {:?}", pair.value),
            ));
            continue;
        }
        if ratings.contains_key(&pair.label) {
            warnings.push(FieldWarning::malformed(
                FIELD,
                format!("duplicate category {:?}", pair.label),
            ));
            continue;
        }
        match parse_rating(&pair) {
            Ok(rating) => {
                ratings.insert(pair.label, rating);
            }
            Err(detail) => {
                debug!("Dropping rating {:?}: {}", pair.label, detail);
                warnings.push(FieldWarning::malformed(
                    FIELD,
                    format!("{}: {}", pair.label, detail),
                ));
            }
        }
    }

    let value = if ratings.is_empty() {
        None
    } else {
        Some(ratings)
    };
    Extraction::new(value, warnings)
}

fn parse_rating(pair: &LabelledValue) -> Result<Rating, String> {
    let Some(caps) = regex!(r"^(-?\d+(?:\.\d+)?)\s*(?:(%)|/\s*(\d+(?:\.\d+)?))?$")
        .captures(&pair.value)
    else {
        return Err(format!("{:?} is not numeric", pair.value));
    };
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| format!("{:?} is not numeric", pair.value))?;

    let min = match &pair.min {
        Some(min) => parse_bound(min)?,
        None => 0.0,
    };
    let max = match (&pair.max, caps.get(3)) {
        (Some(max), _) => parse_bound(max)?,
        (None, Some(max)) => parse_bound(max.as_str())?,
        (None, None) => 100.0,
    };

    if min >= max {
        return Err(format!("empty range {}..={}", min, max));
    }
    if value < min || value > max {
        return Err(format!("{} outside {}..={}", value, min, max));
    }

    Ok(Rating {
        value,
        min,
        max,
        raw: pair.value.clone(),
    })
}

fn parse_bound(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("invalid bound {:?}", s))
}

/// Patterns used when the page carries no ratings markup at all.
fn from_text(text: &str) -> Extraction<RatingSet> {
    let mut ratings = RatingSet::new();

    if let Some(caps) =
        regex!(r"(?i)(\d+(?:\.\d+)?)\s*/\s*(\d+)\s*PLAYER\s+RATING").captures(text)
    {
        let pair = LabelledValue {
            label: "Player Rating".to_string(),
            value: format!("{}/{}", &caps[1], &caps[2]),
            min: None,
            max: None,
        };
        if let Ok(rating) = parse_rating(&pair) {
            ratings.insert(pair.label, rating);
        }
    }

    for caps in regex!(r"(?m)^([A-Z][A-Z ]*?)\s+RATING:\s*(\d+(?:\.\d+)?)\s*%").captures_iter(text) {
        let label = format!("{} Rating", title_case(&caps[1]));
        let pair = LabelledValue {
            label,
            value: format!("{}%", &caps[2]),
            min: None,
            max: None,
        };
        if ratings.contains_key(&pair.label) {
            continue;
        }
        if let Ok(rating) = parse_rating(&pair) {
            ratings.insert(pair.label, rating);
        }
    }

    if ratings.is_empty() {
        Extraction::missing(FIELD)
    } else {
        debug!("Recovered {} rating(s) from page text", ratings.len());
        Extraction::found(ratings)
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
