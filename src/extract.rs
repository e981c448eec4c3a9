//! Listing and detail page extraction.
//!
//! A listing page links each episode with an `a.nahled` anchor whose href
//! follows the show's canonical path pattern. Inside the anchor:
//!
//! | Markup | Meaning |
//! |--------|---------|
//! | `.nazev` | title |
//! | `.perex` | short summary (optional) |
//! | `.datum` | date label, see [`DateNormalizer`] |
//! | `.stitek` | taxonomy label naming the sub-series (optional) |
//!
//! The episode's own page carries the long description in `p.popis`; the
//! leading `span` there is a date label, the rest is the text.

use std::sync::LazyLock;

use chrono::DateTime;
use chrono_tz::Tz;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{trace, warn};
use url::Url;

use crate::config::ShowConfig;
use crate::date::DateNormalizer;
use crate::entry::{Category, Entry, sanitize_slug};
use crate::error::{ConfigError, ExtractError};

static ITEM_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a.nahled[href]"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".nazev"));
static SUMMARY: LazyLock<Selector> = LazyLock::new(|| selector(".perex"));
static DATE_LABEL: LazyLock<Selector> = LazyLock::new(|| selector(".datum"));
static TAXONOMY_LABEL: LazyLock<Selector> = LazyLock::new(|| selector(".stitek"));
static DETAIL_TEXT: LazyLock<Selector> = LazyLock::new(|| selector("p.popis"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// A parsed listing page. Entries are derived from it lazily and only once
/// per fetch; a fresh fetch is needed to derive them again.
pub struct ListingPage {
    document: Html,
}

/// Turns listing markup into candidate entries
#[derive(Debug, Clone)]
pub struct EntryExtractor {
    link_pattern: Regex,
    base_url: Url,
    dates: DateNormalizer,
}

impl EntryExtractor {
    pub fn new(link_pattern: Regex, base_url: Url, dates: DateNormalizer) -> Self {
        Self {
            link_pattern,
            base_url,
            dates,
        }
    }

    pub fn from_config(config: &ShowConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.link_regex()?,
            config.site_base_url.clone(),
            config.date_normalizer(),
        ))
    }

    pub fn dates(&self) -> &DateNormalizer {
        &self.dates
    }

    pub fn parse_listing(&self, markup: &str) -> ListingPage {
        ListingPage {
            document: Html::parse_document(markup),
        }
    }

    /// Candidate entries of a listing page, in page order.
    ///
    /// Links outside the show's path pattern are skipped silently; items
    /// with a missing or unparseable date are dropped with a warning.
    pub fn entries<'a>(
        &'a self,
        page: &'a ListingPage,
        now: DateTime<Tz>,
    ) -> impl Iterator<Item = Entry> + 'a {
        page.document
            .select(&ITEM_LINK)
            .filter_map(move |element| match self.extract_item(element, now) {
                Ok(entry) => Some(entry),
                Err(ExtractError::LinkMismatch { href }) => {
                    trace!(%href, "Ignoring link outside the show");
                    None
                }
                Err(e) => {
                    warn!(error = %e, stage = "extract", "Dropping listing item");
                    None
                }
            })
    }

    fn extract_item(
        &self,
        element: ElementRef<'_>,
        now: DateTime<Tz>,
    ) -> Result<Entry, ExtractError> {
        let href = element.value().attr("href").unwrap_or_default();
        let (identity, slug, path) = self.resolve_link(href)?;

        let date_label = first_text(element, &DATE_LABEL).ok_or_else(|| {
            ExtractError::MissingField {
                link: identity.clone(),
                field: "date",
            }
        })?;

        let published_at = self
            .dates
            .normalize_at(&date_label, now)
            .map_err(|source| ExtractError::InvalidDate {
                link: identity.clone(),
                source,
            })?;

        // An explicit label beats anything read from the link
        let category = first_text(element, &TAXONOMY_LABEL)
            .and_then(|label| Category::from_label(&label))
            .or_else(|| Category::from_path(&path))
            .unwrap_or_default();

        Ok(Entry {
            identity,
            slug,
            title: first_text(element, &TITLE),
            summary: first_text(element, &SUMMARY),
            detail: None,
            category,
            published_at,
        })
    }

    /// Resolve an href to (canonical link, slug, path)
    fn resolve_link(&self, href: &str) -> Result<(String, String, String), ExtractError> {
        let url = self
            .base_url
            .join(href.trim())
            .map_err(|source| ExtractError::InvalidUrl {
                href: href.to_string(),
                source,
            })?;

        let mismatch = || ExtractError::LinkMismatch {
            href: href.to_string(),
        };

        if url.host_str() != self.base_url.host_str() {
            return Err(mismatch());
        }

        let path = url.path().to_string();
        let raw_slug = self
            .link_pattern
            .captures(&path)
            .and_then(|captures| captures.name("slug"))
            .map(|slug| slug.as_str().to_string())
            .ok_or_else(mismatch)?;

        let slug = sanitize_slug(&raw_slug);
        if slug.is_empty() {
            return Err(mismatch());
        }

        let mut canonical = url;
        canonical.set_query(None);
        canonical.set_fragment(None);

        Ok((canonical.to_string(), slug, path))
    }

    /// Extract the long description from an episode's own page
    pub fn parse_detail(&self, markup: &str) -> Option<String> {
        let document = Html::parse_document(markup);

        document.select(&DETAIL_TEXT).next().and_then(|paragraph| {
            // Text directly inside the paragraph; the nested span is the date
            let text: String = paragraph
                .children()
                .filter_map(|node| node.value().as_text())
                .map(|text| &**text)
                .collect();
            let cleaned = text.trim().trim_matches('|').trim();
            Some(collapse_whitespace(cleaned)).filter(|s| !s.is_empty())
        })
    }
}

/// Whitespace-normalized text of the first match below `element`
fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|found| collapse_whitespace(&found.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use chrono_tz::Europe::Prague;

    fn extractor() -> EntryExtractor {
        EntryExtractor::from_config(&ShowConfig::default()).unwrap()
    }

    fn now() -> DateTime<Tz> {
        Prague.with_ymd_and_hms(2020, 6, 10, 12, 0, 0).unwrap()
    }

    fn item(href: &str, title: &str, date: &str) -> String {
        format!(
            concat!(
                r#"<a class="nahled" href="{}"><span class="nazev">{}</span>"#,
                r#"<span class="datum">{}</span></a>"#,
            ),
            href, title, date
        )
    }

    fn page(items: &[String]) -> String {
        format!("<html><body><div class=\"list\">{}</div></body></html>", items.join("\n"))
    }

    fn extract(markup: &str) -> Vec<Entry> {
        let extractor = extractor();
        let page = extractor.parse_listing(markup);
        extractor.entries(&page, now()).collect()
    }

    #[test]
    fn extracts_matching_links() {
        let entries = extract(&page(&[
            item("/dvtv/rozhovor-s-hostem/r~abc123/", "Rozhovor s hostem", "5.6.2020"),
            item("/dvtv/druhy-dil/r~def456/", "Druhý díl", "dnes"),
        ]));

        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(
            first.identity,
            "http://video.aktualne.cz/dvtv/rozhovor-s-hostem/r~abc123/"
        );
        assert_eq!(first.slug, "rozhovor-s-hostem");
        assert_eq!(first.title.as_deref(), Some("Rozhovor s hostem"));
        assert_eq!(first.category, Category::Main);
        assert_eq!(first.published_at.day(), 5);
        assert!(first.detail.is_none());

        assert_eq!(entries[1].published_at, now());
    }

    #[test]
    fn ignores_links_outside_the_show() {
        let entries = extract(&page(&[
            item("/sport/zapas/r~1/", "Zápas", "5.6.2020"),
            item("http://other.example.com/dvtv/x/r~2/", "Cizí", "5.6.2020"),
            item("/dvtv/", "Rozcestník", "5.6.2020"),
            item("/dvtv/platny/r~3/", "Platný", "5.6.2020"),
        ]));

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "platny");
    }

    #[test]
    fn drops_items_with_bad_or_missing_dates() {
        let missing = concat!(
            r#"<a class="nahled" href="/dvtv/bez-data/r~9/">"#,
            r#"<span class="nazev">Bez data</span></a>"#,
        );
        let entries = extract(&page(&[
            item("/dvtv/spatne/r~1/", "Špatně", "včera"),
            missing.to_string(),
            item("/dvtv/dobre/r~2/", "Dobře", "1.6."),
        ]));

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "dobre");
        assert_eq!(entries[0].published_at.year(), 2020);
    }

    #[test]
    fn category_from_path_marker() {
        let entries = extract(&page(&[item("/dvtv/forum/nazor/r~1/", "Názor", "5.6.2020")]));
        assert_eq!(entries[0].category, Category::Forum);
        assert_eq!(entries[0].slug, "forum-nazor");
    }

    #[test]
    fn slug_starting_with_marker_word_is_main_show() {
        let markup = page(&[
            r#"<a class="nahled" href="/dvtv/forum-2000-rozhovor-s-hostem/r~abc/">
                <span class="stitek">DVTV</span>
                <span class="nazev">Forum 2000</span>
                <span class="datum">5.6.2020</span>
            </a>"#
                .to_string(),
            item("/dvtv/apel-na-vladu/r~def/", "Apel na vládu", "5.6.2020"),
        ]);

        let entries = extract(&markup);
        assert_eq!(entries[0].category, Category::Main);
        assert_eq!(entries[1].category, Category::Main);
    }

    #[test]
    fn taxonomy_label_wins_over_path_marker() {
        let markup = page(&[r#"<a class="nahled" href="/dvtv/forum/pozvanka/r~1/">
                <span class="stitek">DVTV Apel</span>
                <span class="nazev">Pozvánka</span>
                <span class="datum">5.6.2020</span>
            </a>"#
            .to_string()]);

        assert_eq!(extract(&markup)[0].category, Category::Apel);
    }

    #[test]
    fn category_from_taxonomy_label() {
        let markup = page(&[r#"<a class="nahled" href="/dvtv/pomoc/r~1/">
                <span class="stitek">DVTV Apel</span>
                <span class="nazev">Pomoc</span>
                <span class="perex">Krátce   o pomoci</span>
                <span class="datum">5.6.2020</span>
            </a>"#
            .to_string()]);

        let entries = extract(&markup);
        assert_eq!(entries[0].category, Category::Apel);
        assert_eq!(entries[0].summary.as_deref(), Some("Krátce o pomoci"));
    }

    #[test]
    fn canonical_link_drops_query_and_fragment() {
        let entries = extract(&page(&[item("/dvtv/x/r~1/?utm=feed#video", "X", "5.6.2020")]));
        assert_eq!(entries[0].identity, "http://video.aktualne.cz/dvtv/x/r~1/");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extract("<html><body></body></html>").is_empty());
    }

    #[test]
    fn parse_detail_reads_description() {
        let markup = r#"<html><body>
            <p class="popis"><span>5. 6. 2020</span> | Dlouhý   popis
            rozhovoru. </p>
        </body></html>"#;

        let detail = extractor().parse_detail(markup);
        assert_eq!(detail.as_deref(), Some("Dlouhý popis rozhovoru."));
    }

    #[test]
    fn parse_detail_tolerates_missing_markup() {
        assert_eq!(extractor().parse_detail("<html><body><p>nic</p></body></html>"), None);
        assert_eq!(
            extractor().parse_detail(r#"<p class="popis"><span>1. 1.</span> | </p>"#),
            None
        );
    }
}
