use crate::session::SessionManager;
use crate::{utils, BrowserBackend, FetchError, RenderedPage};
use scraper::Html;
use tracing::debug;
use url::Url;

/// A loaded profile page, both as a queryable DOM and as plain visible text.
///
/// Extractors read the DOM first and fall back to matching patterns in `text`
/// when the markup does not carry the structure they expect.
#[derive(Debug)]
pub struct FetchedPage {
    pub url: Url,
    pub document: Html,
    pub text: String,
}

impl FetchedPage {
    /// Builds a page from markup alone, deriving the text from the DOM.
    pub fn from_html(url: Url, html: &str) -> Self {
        let document = Html::parse_document(html);
        let text = utils::visible_text(document.root_element());
        FetchedPage {
            url,
            document,
            text,
        }
    }

    fn from_rendered(requested: &Url, page: RenderedPage) -> Self {
        let url = Url::parse(&page.url).unwrap_or_else(|_| requested.clone());
        let mut fetched = FetchedPage::from_html(url, &page.html);
        let rendered_text = page
            .text
            .lines()
            .map(utils::normalize_whitespace)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !rendered_text.is_empty() {
            fetched.text = rendered_text;
        }
        fetched
    }
}

pub struct PageFetcher<'s, B: BrowserBackend> {
    session: &'s mut SessionManager<B>,
}

impl<'s, B: BrowserBackend> PageFetcher<'s, B> {
    pub fn new(session: &'s mut SessionManager<B>) -> Self {
        PageFetcher { session }
    }

    /// Never retries on its own, the session already did.
    pub async fn fetch(&mut self, url: &Url) -> Result<FetchedPage, FetchError> {
        let rendered = self.session.navigate(url.as_str()).await?;
        let page = FetchedPage::from_rendered(url, rendered);
        debug!(
            "Fetched {} ({} chars of text)",
            page.url,
            page.text.chars().count()
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rendered(html: &str, text: &str) -> RenderedPage {
        RenderedPage {
            url: "https://www.nfldraftbuzz.com/Player/Dante-Moore-QB-UCLA".to_string(),
            html: html.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn rendered_text_is_preferred_over_derived_text() {
        let requested = Url::parse("https://www.nfldraftbuzz.com/x").unwrap();
        let page = FetchedPage::from_rendered(
            &requested,
            rendered("<p>from dom</p>", "  from   browser \n\n second line "),
        );
        assert_eq!(page.text, "from browser\nsecond line");
        assert_eq!(page.url.path(), "/Player/Dante-Moore-QB-UCLA");
    }

    #[test]
    fn text_is_derived_from_dom_when_browser_gave_none() {
        let requested = Url::parse("https://www.nfldraftbuzz.com/x").unwrap();
        let page = FetchedPage::from_rendered(&requested, rendered("<p>from dom</p>", " "));
        assert_eq!(page.text, "from dom");
    }
}
