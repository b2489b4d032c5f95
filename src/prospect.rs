use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One scraped profile. Built once by the aggregator and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub identifier: String,
    pub name: String,
    pub url: String,
    pub position: Option<String>,
    pub details: BTreeMap<String, String>,
    pub ratings: Option<RatingSet>,
    pub stats: Option<Vec<StatLine>>,
    pub skills: Option<SkillSet>,
    pub scouting_report: Option<ScoutingReport>,
    #[serde(default)]
    pub recruiting_grades: Option<RecruitingGrades>,
    #[serde(default)]
    pub comparisons: Option<Vec<Comparison>>,
    #[serde(default)]
    pub consensus: Option<ConsensusRanking>,
    pub image: Option<ImageRef>,
    pub extraction_warnings: Vec<FieldWarning>,
    pub fetched_at: DateTime<Utc>,
}

impl Prospect {
    pub fn warnings_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldWarning> {
        self.extraction_warnings
            .iter()
            .filter(move |w| w.field == field)
    }
}

pub type RatingSet = BTreeMap<String, Rating>;

/// A score kept on the scale the page declared for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Text exactly as it appeared on the page, e.g. `84.6/100`.
    pub raw: String,
}

/// Column label to cell value, in the column order of the page.
pub type StatValues = IndexMap<String, StatValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub category: Option<String>,
    pub season: Option<String>,
    pub values: StatValues,
}

impl StatLine {
    pub fn is_partial(&self) -> bool {
        self.values.values().any(|v| *v == StatValue::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Number(f64),
    Text(String),
    /// Placeholder for a cell the table did not provide.
    Missing,
}

impl StatValue {
    pub fn parse(cell: &str) -> StatValue {
        let cell = cell.trim();
        if matches!(cell, "" | "-" | "--" | "–" | "—" | "N/A" | "n/a") {
            return StatValue::Missing;
        }
        match cell.replace(',', "").parse::<f64>() {
            Ok(n) if n.is_finite() => StatValue::Number(n),
            _ => StatValue::Text(cell.to_string()),
        }
    }
}

/// Skill label to rating, values kept verbatim (`"88%"`, `"Elite"`).
pub type SkillSet = BTreeMap<String, String>;

/// Recruiting service (`espn`, `247`, `rivals`) to its grade as printed.
pub type RecruitingGrades = BTreeMap<String, String>;

/// An NFL or college player the prospect is likened to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub name: String,
    pub school: String,
    /// Percent, 0..=100.
    pub similarity: u8,
}

/// Average ranks across every scout the site aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRanking {
    pub average_overall_rank: Option<f64>,
    pub average_position_rank: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", content = "content", rename_all = "snake_case")]
pub enum ScoutingReport {
    Sectioned(Vec<ReportSection>),
    Unsegmented(String),
}

impl ScoutingReport {
    pub fn section(&self, name: &str) -> Option<&ReportSection> {
        match self {
            ScoutingReport::Sectioned(sections) => sections.iter().find(|s| s.name == name),
            ScoutingReport::Unsegmented(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ScoutingReport::Sectioned(sections) => {
                sections.iter().all(|s| s.paragraphs.is_empty())
            }
            ScoutingReport::Unsegmented(text) => text.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub name: String,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Missing,
    Malformed,
    Partial,
}

/// Non-fatal extraction problem attached to the prospect it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub kind: WarningKind,
    pub field: String,
    pub detail: Option<String>,
}

impl FieldWarning {
    pub fn missing(field: &str) -> Self {
        FieldWarning {
            kind: WarningKind::Missing,
            field: field.to_string(),
            detail: None,
        }
    }

    pub fn malformed(field: &str, detail: impl Into<String>) -> Self {
        FieldWarning {
            kind: WarningKind::Malformed,
            field: field.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn partial(field: &str, detail: impl Into<String>) -> Self {
        FieldWarning {
            kind: WarningKind::Partial,
            field: field.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            WarningKind::Missing => "missing",
            WarningKind::Malformed => "malformed",
            WarningKind::Partial => "partial",
        };
        write!(f, "{} {}", kind, self.field)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stat_cells_parse_into_numbers_text_or_placeholders() {
        assert_eq!(StatValue::parse("3,412"), StatValue::Number(3412.0));
        assert_eq!(StatValue::parse(" 64.5 "), StatValue::Number(64.5));
        assert_eq!(StatValue::parse("UCLA"), StatValue::Text("UCLA".to_string()));
        assert_eq!(StatValue::parse("—"), StatValue::Missing);
        assert_eq!(StatValue::parse(""), StatValue::Missing);
    }

    #[test]
    fn empty_report_is_still_a_report() {
        let report = ScoutingReport::Sectioned(vec![ReportSection {
            name: "strengths".to_string(),
            paragraphs: vec![],
        }]);
        assert!(report.is_empty());
        assert!(report.section("strengths").is_some());
        assert!(report.section("weaknesses").is_none());
    }

    #[test]
    fn prospect_serializes_to_nested_mappings_and_back() {
        let mut values = StatValues::new();
        values.insert("YDS".to_string(), StatValue::Number(3412.0));
        values.insert("INT".to_string(), StatValue::Missing);
        values.insert("TEAM".to_string(), StatValue::Text("UCLA".to_string()));

        let mut ratings = RatingSet::new();
        ratings.insert(
            "Player Rating".to_string(),
            Rating {
                value: 84.6,
                min: 0.0,
                max: 100.0,
                raw: "84.6/100".to_string(),
            },
        );

        let prospect = Prospect {
            identifier: "/Player/Dante-Moore-QB-UCLA".to_string(),
            name: "Dante Moore".to_string(),
            url: "https://www.nfldraftbuzz.com/Player/Dante-Moore-QB-UCLA".to_string(),
            position: Some("QB".to_string()),
            details: BTreeMap::new(),
            ratings: Some(ratings),
            stats: Some(vec![StatLine {
                category: Some("Passing".to_string()),
                season: Some("2024".to_string()),
                values,
            }]),
            skills: None,
            scouting_report: Some(ScoutingReport::Unsegmented(String::new())),
            recruiting_grades: None,
            comparisons: Some(vec![Comparison {
                name: "Bryce YOUNG".to_string(),
                school: "ALABAMA".to_string(),
                similarity: 87,
            }]),
            consensus: None,
            image: None,
            extraction_warnings: vec![FieldWarning::missing("skills")],
            fetched_at: Utc::now(),
        };

        let json = serde_json::to_value(&prospect).expect("serialize");
        assert!(json["ratings"]["Player Rating"].is_object());
        assert!(json["stats"][0]["values"]["INT"].is_null());
        assert!(json["skills"].is_null());

        let back: Prospect = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, prospect);
    }
}
