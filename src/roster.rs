//! Position listing pages → profile links, grouped by position.
//!
//! The output has the same shape `--input` accepts: a JSON object of
//! position to profile paths.

use crate::session::SessionManager;
use crate::{BrowserBackend, CrawlerError, FetchError, FetchedPage, PageFetcher, SessionConfig};
use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use scraper::Selector;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Positions the site publishes rankings for.
pub const LISTED_POSITIONS: &[&str] = &["QB", "RB", "WR", "TE", "OL", "DL", "EDGE", "LB", "DB"];

/// Listing pages followed per position, first page included.
const MAX_PAGES: usize = 50;

const E: &str = "Invalid selector";
lazy_static! {
    static ref RANK_ROW: Selector = Selector::parse("#positionRankTable tbody tr[data-href]").expect(E);
    static ref PLAYER_LINK: Selector = Selector::parse(r#"a[href*="/Player/"]"#).expect(E);
    static ref PAGE_LINK: Selector =
        Selector::parse("ul.pagination li.page-item a.page-link[href]").expect(E);
}

/// Profile paths on one listing page, in ranking order.
///
/// Reads the `data-href` of ranking table rows, or player links when the
/// table is not there.
pub fn profile_links(page: &FetchedPage) -> Vec<String> {
    let mut links: IndexSet<String> = page
        .document
        .select(&RANK_ROW)
        .filter_map(|row| row.value().attr("data-href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect();
    if links.is_empty() {
        links = page
            .document
            .select(&PLAYER_LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .collect();
    }
    links.into_iter().collect()
}

/// Other listing pages linked from the pagination bar, resolved against the page.
pub fn pagination_links(page: &FetchedPage) -> Vec<Url> {
    let links: IndexSet<Url> = page
        .document
        .select(&PAGE_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty() && !href.starts_with('#'))
        .filter_map(|href| page.url.join(href.trim()).ok())
        .filter(|url| *url != page.url)
        .collect();
    links.into_iter().collect()
}

pub struct RosterDiscovery {
    base_url: Url,
    year: u16,
}

impl RosterDiscovery {
    pub fn new(base_url: &str, year: u16) -> Result<Self, CrawlerError> {
        Ok(RosterDiscovery {
            base_url: Url::parse(base_url)?,
            year,
        })
    }

    /// `{base}/positions/{position}/1/{year}`
    pub fn listing_url(&self, position: &str) -> Result<Url, CrawlerError> {
        Ok(self
            .base_url
            .join(&format!("/positions/{}/1/{}", position, self.year))?)
    }

    /// Walks the listing of every position over one browser session.
    ///
    /// A position whose listing cannot be loaded is left out with a warning,
    /// and a failed follow-up page only costs the links on it. Only a browser
    /// that cannot be launched fails the whole discovery.
    pub async fn discover<B: BrowserBackend>(
        &self,
        backend: B,
        config: SessionConfig,
        positions: &[String],
        cancel: &CancellationToken,
    ) -> Result<IndexMap<String, Vec<String>>, CrawlerError> {
        let mut found = IndexMap::new();
        if positions.is_empty() || cancel.is_cancelled() {
            return Ok(found);
        }

        let mut session = SessionManager::open(backend, config).await?;
        for position in positions {
            if cancel.is_cancelled() {
                info!("Cancelled, stopping discovery before {}", position);
                break;
            }
            let start = self.listing_url(position)?;
            match self.walk(&mut session, start, cancel).await {
                Ok(links) => {
                    info!("Found {} {} prospect(s)", links.len(), position);
                    found.insert(position.clone(), links);
                }
                Err(FetchError::Navigation(e)) => {
                    warn!("Skipping position {}: {}", position, e);
                }
            }
        }

        if let Err(e) = session.close().await {
            warn!("Browser did not shut down cleanly: {}", e);
        }
        Ok(found)
    }

    async fn walk<B: BrowserBackend>(
        &self,
        session: &mut SessionManager<B>,
        start: Url,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, FetchError> {
        let mut links: IndexSet<String> = IndexSet::new();
        let mut queue: IndexSet<Url> = IndexSet::new();
        queue.insert(start.clone());

        let first = PageFetcher::new(session).fetch(&start).await?;
        links.extend(profile_links(&first));
        queue.extend(pagination_links(&first));
        drop(first);

        let mut next = 1;
        while let Some(url) = queue.get_index(next).cloned() {
            if next >= MAX_PAGES || cancel.is_cancelled() {
                break;
            }
            next += 1;
            match PageFetcher::new(session).fetch(&url).await {
                Ok(page) => {
                    links.extend(profile_links(&page));
                    queue.extend(pagination_links(&page));
                }
                Err(FetchError::Navigation(e)) => warn!("Skipping listing page: {}", e),
            }
        }
        Ok(links.into_iter().collect())
    }
}
