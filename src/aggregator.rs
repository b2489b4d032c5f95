//! Drives fetch → extract → assemble over a list of identifiers.

use crate::config::ScraperConfig;
use crate::extract::{
    ComparisonsExtractor, ConsensusExtractor, Profile, ProfileExtractor, RatingExtractor,
    RecruitingGradesExtractor, ScoutingReportParser, SkillsParser, StatsParser,
};
use crate::image::{self, ImageResolver};
use crate::prospect::{
    Comparison, ConsensusRanking, FieldWarning, Prospect, RatingSet, RecruitingGrades,
    ScoutingReport, SkillSet, StatLine,
};
use crate::session::SessionManager;
use crate::{
    BrowserBackend, BrowserError, Extraction, ExtractionError, FailureKind, FetchError, FetchedPage,
    FieldExtractor, ImageSource, PageFetcher,
};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

/// Outcome of one run. Every input identifier ends up in exactly one of the
/// three collections, each kept in input order.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub prospects: Vec<Prospect>,
    pub errors: Vec<ExtractionError>,
    /// Identifiers never started because the run was cancelled.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn was_cancelled(&self) -> bool {
        !self.skipped.is_empty()
    }

    fn push(&mut self, outcome: Result<Prospect, ExtractionError>, index: usize, total: usize) {
        match outcome {
            Ok(prospect) => {
                info!(
                    "Assembled {} ({}/{}, {} warning(s))",
                    prospect.name,
                    index + 1,
                    total,
                    prospect.extraction_warnings.len()
                );
                self.prospects.push(prospect);
            }
            Err(e) => {
                warn!("Failed {} ({}/{}): {}", e.identifier, index + 1, total, e.kind);
                self.errors.push(e);
            }
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Assembled : {}", self.prospects.len())?;
        writeln!(f, "Failed    : {}", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "> {}", error)?;
        }
        write!(f, "Skipped   : {}", self.skipped.len())
    }
}

/// Everything read from one page before the portrait download.
struct Fields {
    profile: Profile,
    ratings: Option<RatingSet>,
    stats: Option<Vec<StatLine>>,
    skills: Option<SkillSet>,
    scouting_report: Option<ScoutingReport>,
    recruiting_grades: Option<RecruitingGrades>,
    comparisons: Option<Vec<Comparison>>,
    consensus: Option<ConsensusRanking>,
    image_candidate: Option<Url>,
    warnings: Vec<FieldWarning>,
}

pub struct ProspectAggregator<S: ImageSource> {
    config: ScraperConfig,
    profile: ProfileExtractor,
    ratings: RatingExtractor,
    stats: StatsParser,
    skills: SkillsParser,
    report: ScoutingReportParser,
    recruiting: RecruitingGradesExtractor,
    comparisons: ComparisonsExtractor,
    consensus: ConsensusExtractor,
    images: Option<ImageResolver<S>>,
}

impl<S: ImageSource> ProspectAggregator<S> {
    pub fn new(config: ScraperConfig, images: Option<ImageResolver<S>>) -> Self {
        ProspectAggregator {
            config,
            profile: ProfileExtractor,
            ratings: RatingExtractor,
            stats: StatsParser,
            skills: SkillsParser,
            report: ScoutingReportParser,
            recruiting: RecruitingGradesExtractor,
            comparisons: ComparisonsExtractor,
            consensus: ConsensusExtractor,
            images,
        }
    }

    /// Absolute URLs are taken as they are, paths are joined onto the base URL
    /// and bare slugs are treated as player pages.
    pub fn resolve_target(&self, identifier: &str) -> Result<Url, FailureKind> {
        let invalid = |reason: String| FailureKind::InvalidTarget { reason };
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(invalid("empty identifier".to_string()));
        }

        let url = match Url::parse(identifier) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(&self.config.base_url)
                    .map_err(|e| invalid(format!("invalid base url: {}", e)))?;
                let path = if identifier.contains('/') {
                    identifier.to_string()
                } else {
                    format!("/Player/{}", identifier)
                };
                base.join(&path).map_err(|e| invalid(e.to_string()))?
            }
            Err(e) => return Err(invalid(e.to_string())),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        Ok(url)
    }

    /// Processes `identifiers` in order over a single browser session.
    ///
    /// Every identifier ends up in the report. Per-identifier failures land in
    /// [`RunReport::errors`], and so does every identifier when the browser
    /// cannot be launched at all. Cancellation is checked between identifiers,
    /// never during a fetch.
    pub async fn process<B: BrowserBackend>(
        &self,
        backend: B,
        identifiers: &[String],
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport::default();
        if identifiers.is_empty() {
            return report;
        }
        if cancel.is_cancelled() {
            report.skipped = identifiers.to_vec();
            return report;
        }

        let mut session = match SessionManager::open(backend, self.config.session.clone()).await {
            Ok(session) => session,
            Err(cause) => {
                warn!("Browser could not be launched: {}", cause);
                report.errors = identifiers
                    .iter()
                    .map(|identifier| self.unavailable(identifier, &cause))
                    .collect();
                return report;
            }
        };

        for (index, identifier) in identifiers.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Cancelled, skipping {} remaining identifier(s)",
                    identifiers.len() - index
                );
                report.skipped.extend(identifiers[index..].iter().cloned());
                break;
            }

            let span = info_span!("prospect", id = %identifier);
            let outcome = self
                .process_one(&mut session, identifier)
                .instrument(span)
                .await;
            report.push(outcome, index, identifiers.len());
        }

        if let Err(e) = session.close().await {
            warn!("Browser did not shut down cleanly: {}", e);
        }
        report
    }

    /// Assembles prospects from pages saved to disk, without a browser.
    ///
    /// The file stem is the identifier and decides the page URL the same way
    /// an identifier does in [`ProspectAggregator::process`].
    pub async fn process_saved(&self, paths: &[PathBuf], cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::default();
        for (index, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped.extend(paths[index..].iter().map(|p| file_stem(p)));
                break;
            }
            let identifier = file_stem(path);

            let span = info_span!("saved", id = %identifier);
            let outcome = self
                .process_file(path, &identifier)
                .instrument(span)
                .await;
            report.push(outcome, index, paths.len());
        }
        report
    }

    async fn process_file(&self, path: &Path, identifier: &str) -> Result<Prospect, ExtractionError> {
        let url = self
            .resolve_target(identifier)
            .map_err(|kind| failed(identifier, None, kind))?;
        let html = tokio::fs::read_to_string(path).await.map_err(|e| {
            failed(
                identifier,
                Some(&url),
                FailureKind::Unreadable {
                    reason: format!("{}: {}", path.display(), e),
                },
            )
        })?;
        self.assemble(identifier, FetchedPage::from_html(url, &html))
            .await
    }

    fn unavailable(&self, identifier: &str, cause: &BrowserError) -> ExtractionError {
        match self.resolve_target(identifier) {
            Ok(url) => failed(
                identifier,
                Some(&url),
                FailureKind::SessionUnavailable {
                    cause: cause.clone(),
                },
            ),
            Err(kind) => failed(identifier, None, kind),
        }
    }

    async fn process_one<B: BrowserBackend>(
        &self,
        session: &mut SessionManager<B>,
        identifier: &str,
    ) -> Result<Prospect, ExtractionError> {
        let url = self
            .resolve_target(identifier)
            .map_err(|kind| failed(identifier, None, kind))?;

        let page = match PageFetcher::new(session).fetch(&url).await {
            Ok(page) => page,
            Err(FetchError::Navigation(e)) => {
                return Err(failed(
                    identifier,
                    Some(&url),
                    FailureKind::NavigationFailed(e),
                ))
            }
        };
        self.assemble(identifier, page).await
    }

    /// Extracts every field from `page` and downloads its portrait.
    pub async fn assemble(
        &self,
        identifier: &str,
        page: FetchedPage,
    ) -> Result<Prospect, ExtractionError> {
        let fields = self
            .extract_fields(&page)
            .map_err(|kind| failed(identifier, Some(&page.url), kind))?;
        let image_key = image_key(&page.url, identifier);
        let page_url = page.url.to_string();
        // the parsed DOM is not needed past this point
        drop(page);

        let Fields {
            profile,
            ratings,
            stats,
            skills,
            scouting_report,
            recruiting_grades,
            comparisons,
            consensus,
            image_candidate,
            mut warnings,
        } = fields;

        let image = match &self.images {
            Some(resolver) => {
                let (image, image_warnings) = resolver
                    .download(image_candidate, &image_key)
                    .await
                    .into_parts();
                warnings.extend(image_warnings);
                image
            }
            None => None,
        };

        for warning in &warnings {
            debug!("{}", warning);
        }

        Ok(Prospect {
            identifier: identifier.to_string(),
            name: profile.name,
            url: page_url,
            position: profile.position,
            details: profile.details,
            ratings,
            stats,
            skills,
            scouting_report,
            recruiting_grades,
            comparisons,
            consensus,
            image,
            extraction_warnings: warnings,
            fetched_at: Utc::now(),
        })
    }

    /// Runs every extractor over the same document.
    fn extract_fields(&self, page: &FetchedPage) -> Result<Fields, FailureKind> {
        let mut warnings = vec![];
        let profile = collect(self.profile.extract(page), &mut warnings);
        let ratings = collect(self.ratings.extract(page), &mut warnings);
        let stats = collect(self.stats.extract(page), &mut warnings);
        let skills = collect(self.skills.extract(page), &mut warnings);
        let scouting_report = collect(self.report.extract(page), &mut warnings);
        let recruiting_grades = collect(self.recruiting.extract(page), &mut warnings);
        let comparisons = collect(self.comparisons.extract(page), &mut warnings);
        let consensus = collect(self.consensus.extract(page), &mut warnings);

        let nothing_found =
            ratings.is_none() && stats.is_none() && skills.is_none() && scouting_report.is_none();
        let (Some(profile), false) = (profile, nothing_found) else {
            return Err(FailureKind::NoContent);
        };

        Ok(Fields {
            profile,
            ratings,
            stats,
            skills,
            scouting_report,
            recruiting_grades,
            comparisons,
            consensus,
            image_candidate: image::candidate(&page.document, &page.url),
            warnings,
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn failed(identifier: &str, url: Option<&Url>, kind: FailureKind) -> ExtractionError {
    ExtractionError {
        identifier: identifier.to_string(),
        url: url.map(ToString::to_string),
        kind,
    }
}

/// Portrait file key: the profile slug from the URL, else the identifier.
/// Two prospects sharing a display name still get different files.
fn image_key(url: &Url, identifier: &str) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(ToString::to_string)
        .unwrap_or_else(|| identifier.trim().to_string())
}

fn collect<T>(extraction: Extraction<T>, warnings: &mut Vec<FieldWarning>) -> Option<T> {
    let (value, field_warnings) = extraction.into_parts();
    warnings.extend(field_warnings);
    value
}
