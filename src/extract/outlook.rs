//! How other evaluators see the prospect: recruiting service grades, player
//! comparisons and the consensus ranks of other scouts.
//!
//! These blocks only exist on some profiles and only as plain text, so an
//! absent block is not warned about. Values that are there but unreadable are.

use super::Extraction;
use crate::prospect::{Comparison, ConsensusRanking, FieldWarning, RecruitingGrades};
use crate::{FetchedPage, FieldExtractor};
use lazy_regex::{regex, Regex};
use lazy_static::lazy_static;
use tracing::debug;

/// Service key and the pattern capturing its grade as printed.
const SERVICES: &[(&str, &str)] = &[
    ("espn", r"(?i)ESPN\s+RATING:\s*([\d/]+)"),
    ("247", r"(?i)\b247\s+RATING:\s*([\d/]+)"),
    ("rivals", r"(?i)RIVALS\s+RATING:\s*([\d.]+\s*\([^)]+\))"),
];

lazy_static! {
    static ref SERVICE_PATTERNS: Vec<(&'static str, Regex)> = SERVICES
        .iter()
        .map(|(key, pattern)| (*key, Regex::new(pattern).expect("Invalid regex")))
        .collect();
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecruitingGradesExtractor;

impl FieldExtractor for RecruitingGradesExtractor {
    type Value = RecruitingGrades;

    fn field(&self) -> &'static str {
        "recruiting_grades"
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<RecruitingGrades> {
        let grades: RecruitingGrades = SERVICE_PATTERNS
            .iter()
            .filter_map(|(key, pattern)| {
                let caps = pattern.captures(&page.text)?;
                let grade = caps.get(1)?.as_str().trim().to_string();
                Some((key.to_string(), grade))
            })
            .collect();
        if grades.is_empty() {
            Extraction::new(None, vec![])
        } else {
            Extraction::found(grades)
        }
    }
}

/// `Bryce YOUNG - ALABAMA 87%` style lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComparisonsExtractor;

impl FieldExtractor for ComparisonsExtractor {
    type Value = Vec<Comparison>;

    fn field(&self) -> &'static str {
        "comparisons"
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<Vec<Comparison>> {
        let mut comparisons = vec![];
        let mut warnings = vec![];
        let pattern = regex!(r"([A-Z][a-z]+)\s+([A-Z][A-Z'-]+)\s*-\s*([A-Z][A-Z .&']*?)\s*\n?\s*(\d+)%");
        for caps in pattern.captures_iter(&page.text) {
            let name = format!("{} {}", &caps[1], &caps[2]);
            match caps[4].parse::<u8>().ok().filter(|s| *s <= 100) {
                Some(similarity) => comparisons.push(Comparison {
                    name,
                    school: caps[3].trim().to_string(),
                    similarity,
                }),
                None => warnings.push(FieldWarning::malformed(
                    self.field(),
                    format!("{}: similarity {}% out of range", name, &caps[4]),
                )),
            }
        }

        if comparisons.is_empty() {
            Extraction::new(None, warnings)
        } else {
            debug!("Found {} comparison(s)", comparisons.len());
            Extraction::new(Some(comparisons), warnings)
        }
    }
}

/// The all-scouts average overall and position ranks.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsensusExtractor;

impl FieldExtractor for ConsensusExtractor {
    type Value = ConsensusRanking;

    fn field(&self) -> &'static str {
        "consensus"
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<ConsensusRanking> {
        let consensus = ConsensusRanking {
            average_overall_rank: rank(
                regex!(r"(?i)ALL SCOUTS AVERAGE\s*OVERALL RANK\s*\n?\s*([\d.]+)"),
                &page.text,
            ),
            average_position_rank: rank(
                regex!(r"(?i)ALL SCOUTS AVERAGE\s*POSITION RANK\s*\n?\s*([\d.]+)"),
                &page.text,
            ),
        };

        if consensus.average_overall_rank.is_none() && consensus.average_position_rank.is_none() {
            Extraction::new(None, vec![])
        } else {
            Extraction::found(consensus)
        }
    }
}

fn rank(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|caps| caps[1].trim_end_matches('.').parse().ok())
}
