use super::{labelled_pairs, Extraction, PairLayout};
use crate::prospect::{FieldWarning, SkillSet};
use crate::{FetchedPage, FieldExtractor};
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::Selector;

const FIELD: &str = "skills";

/// Percentile labels the profile pages print as `RELEASE SPEED: 88%`.
const TEXT_SKILLS: &[(&str, &str)] = &[
    ("Release Speed", "RELEASE SPEED"),
    ("Short Passing", "SHORT PASSING"),
    ("Medium Passing", "MEDIUM PASSING"),
    ("Long Passing", "LONG PASSING"),
    ("Rush/Scramble", "RUSH/SCRAMBLE"),
];

const E: &str = "Invalid selector";
lazy_static! {
    static ref SECTION: Selector =
        Selector::parse(r#"[data-section="skills"], .player-skills"#).expect(E);
    static ref ITEM: Selector = Selector::parse(".skill").expect(E);
    static ref LABEL: Selector = Selector::parse(".skill-label, .skill-name").expect(E);
    static ref VALUE: Selector = Selector::parse(".skill-value, .skill-grade").expect(E);
    static ref TABLE: Selector = Selector::parse("table.skills-table").expect(E);
    static ref DL: Selector = Selector::parse("dl.skills").expect(E);
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

/// Skill grades, kept verbatim (`"88%"`, `"Elite"`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SkillsParser;

impl FieldExtractor for SkillsParser {
    type Value = SkillSet;

    fn field(&self) -> &'static str {
        FIELD
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<SkillSet> {
        let Some(pairs) = labelled_pairs(&page.document, LAYOUTS.as_slice()) else {
            return from_text(&page.text);
        };

        let mut skills = SkillSet::new();
        let mut warnings = vec![];
        for pair in pairs {
            if pair.label.is_empty() || pair.value.is_empty() {
                warnings.push(FieldWarning::malformed(
                    FIELD,
                    format!("incomplete entry {:?}: {:?}", pair.label, pair.value),
                ));
                continue;
            }
            if skills.contains_key(&pair.label) {
                warnings.push(FieldWarning::malformed(
                    FIELD,
                    format!("duplicate skill {:?}", pair.label),
                ));
                continue;
            }
            skills.insert(pair.label, pair.value);
        }

        if skills.is_empty() {
            warnings.push(FieldWarning::malformed(FIELD, "skills section has no entries"));
            return Extraction::new(None, warnings);
        }
        Extraction::new(Some(skills), warnings)
    }
}

fn from_text(text: &str) -> Extraction<SkillSet> {
    let pattern = regex!(r"(?m)^([A-Z][A-Z/ ]+):\s*(\d+(?:\.\d+)?%)");
    let skills: SkillSet = pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let (label, _) = TEXT_SKILLS
                .iter()
                .find(|(_, marker)| caps[1].trim() == *marker)?;
            Some((label.to_string(), caps[2].to_string()))
        })
        .collect();

    if skills.is_empty() {
        Extraction::missing(FIELD)
    } else {
        Extraction::found(skills)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::page;
    use pretty_assertions::assert_eq;

    #[test]
    fn qualitative_and_numeric_values_are_kept_as_given() {
        let page = page(
            r#"<ul class="player-skills">
                <li class="skill"><span class="skill-name">Pocket Presence</span><span class="skill-grade">Elite</span></li>
                <li class="skill"><span class="skill-name">Short Passing</span><span class="skill-grade">88%</span></li>
                <li class="skill"><span class="skill-name">Mobility</span><span class="skill-grade">7.5</span></li>
            </ul>"#,
        );

        let extraction = SkillsParser.extract(&page);
        let skills = extraction.value.expect("skills");
        assert!(extraction.warnings.is_empty());
        assert_eq!(skills["Pocket Presence"], "Elite");
        assert_eq!(skills["Short Passing"], "88%");
        assert_eq!(skills["Mobility"], "7.5");
    }

    #[test]
    fn blank_and_duplicate_entries_are_malformed() {
        let page = page(
            r#"<dl class="skills">
                <dt>Accuracy</dt><dd>Above Average</dd>
                <dt>Accuracy</dt><dd>Average</dd>
                <dt>Vision</dt><dd></dd>
            </dl>"#,
        );

        let extraction = SkillsParser.extract(&page);
        assert_eq!(extraction.value.expect("skills")["Accuracy"], "Above Average");
        assert_eq!(extraction.warnings.len(), 2);
    }

    #[test]
    fn percentile_lines_are_read_from_text() {
        let page = page("<div>RELEASE SPEED: 91%</div><div>LONG PASSING: 64%</div><div>SPEED: 12%</div>");
        let skills = SkillsParser.extract(&page).value.expect("skills");
        assert_eq!(skills.len(), 2);
        assert_eq!(skills["Release Speed"], "91%");
        assert_eq!(skills["Long Passing"], "64%");
    }

    #[test]
    fn no_skills_anywhere_is_missing() {
        let extraction = SkillsParser.extract(&page("<p>Nothing</p>"));
        assert_eq!(extraction.warnings, vec![FieldWarning::missing("skills")]);
    }
}
