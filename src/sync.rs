// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{OFFSET_PLACEHOLDER, ShowConfig};
use crate::entry::{Category, Entry};
use crate::error::{ConfigError, SyncError};
use crate::extract::EntryExtractor;
use crate::http::{HttpClient, fetch_document};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Options for listing discovery
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Listing URL template with an `{offset}` placeholder
    pub listing_url: String,
    /// Offset stride between pages
    pub page_size: usize,
    /// Maximum number of pages fetched in one discovery
    pub max_pages: usize,
    pub excluded_categories: Vec<Category>,
    pub banned_title_prefixes: Vec<String>,
    pub banned_title_substrings: Vec<String>,
}

impl SyncOptions {
    pub fn from_config(config: &ShowConfig) -> Self {
        Self {
            listing_url: config.listing_url.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages,
            excluded_categories: config.excluded_categories.clone(),
            banned_title_prefixes: config.banned_title_prefixes.clone(),
            banned_title_substrings: config.banned_title_substrings.clone(),
        }
    }

    /// Listing URL for the page starting at `offset`
    pub fn listing_url_for(&self, offset: usize) -> String {
        self.listing_url.replace(OFFSET_PLACEHOLDER, &offset.to_string())
    }

    /// Whether configuration filters the entry out regardless of its date
    pub fn is_excluded(&self, entry: &Entry) -> bool {
        if self.excluded_categories.contains(&entry.category) {
            return true;
        }

        let title = entry.title.as_deref().unwrap_or_default();
        self.banned_title_prefixes
            .iter()
            .any(|prefix| title.starts_with(prefix.as_str()))
            || self
                .banned_title_substrings
                .iter()
                .any(|needle| title.contains(needle.as_str()))
    }
}

/// Discovers entries newer than a catalog's horizon by paging through the
/// show's reverse-chronological listing
#[derive(Debug, Clone)]
pub struct SyncEngine {
    extractor: EntryExtractor,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(extractor: EntryExtractor, options: SyncOptions) -> Self {
        Self { extractor, options }
    }

    pub fn from_config(config: &ShowConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            EntryExtractor::from_config(config)?,
            SyncOptions::from_config(config),
        ))
    }

    pub fn extractor(&self) -> &EntryExtractor {
        &self.extractor
    }

    /// Find the entries not yet in `catalog`, oldest first.
    ///
    /// Pages are fetched from offset 0 in `page_size` steps until a page
    /// yields no candidates or every candidate on it predates the horizon.
    /// A page straddling the horizon is kept whole; its stale entries are
    /// dropped individually afterwards.
    pub async fn discover_new<C: HttpClient + ?Sized>(
        &self,
        client: &C,
        catalog: &Catalog,
        reporter: &SharedProgressReporter,
    ) -> Result<Vec<Entry>, SyncError> {
        let horizon = catalog.horizon();
        let now = self.extractor.dates().now();
        let mut candidates = Vec::new();
        let mut pages = 0;

        info!(
            horizon = %horizon.format("%Y-%m-%d %H:%M:%S"),
            "Looking for entries newer than horizon"
        );

        for page in 0..self.options.max_pages {
            let offset = page * self.options.page_size;
            let url = self.options.listing_url_for(offset);

            reporter.report(ProgressEvent::FetchingListing {
                page,
                url: url.clone(),
            });
            info!(page, offset, %url, "Fetching listing page");

            let markup = fetch_document(client, &url)
                .await
                .map_err(|source| SyncError::ListingFetch { offset, source })?;
            pages += 1;

            let page_entries = self.extract_page(&markup, now);
            let stale = page_entries
                .iter()
                .all(|entry| entry.published_at < horizon);

            reporter.report(ProgressEvent::ListingParsed {
                page,
                candidates: page_entries.len(),
                stale,
            });

            if page_entries.is_empty() {
                info!(page, "Listing page has no entries, stopping");
                break;
            }

            candidates.extend(page_entries);

            if stale {
                info!(page, "Listing page predates horizon, stopping");
                break;
            }

            if page + 1 == self.options.max_pages {
                warn!(max_pages = self.options.max_pages, "Stopping at page limit");
            }
        }

        let new_entries = self.select_new(candidates, catalog, horizon);

        reporter.report(ProgressEvent::DiscoveryCompleted {
            pages,
            new_entries: new_entries.len(),
        });
        info!(pages, new_entries = new_entries.len(), "Discovery finished");

        Ok(new_entries)
    }

    fn extract_page(&self, markup: &str, now: DateTime<Tz>) -> Vec<Entry> {
        let page = self.extractor.parse_listing(markup);
        self.extractor.entries(&page, now).collect()
    }

    /// Filter, deduplicate and order raw candidates.
    ///
    /// Drops excluded entries, entries already cataloged and entries older
    /// than `horizon`. Of several candidates sharing an identity the first
    /// seen wins. The result is sorted by publication time, oldest first.
    pub fn select_new(
        &self,
        candidates: Vec<Entry>,
        catalog: &Catalog,
        horizon: DateTime<Tz>,
    ) -> Vec<Entry> {
        let mut seen = HashSet::new();

        let mut selected: Vec<Entry> = candidates
            .into_iter()
            .filter(|entry| {
                let excluded = self.options.is_excluded(entry);
                if excluded {
                    debug!(
                        identity = %entry.identity,
                        stage = "filter",
                        "Excluded by configuration"
                    );
                }
                !excluded
            })
            .filter(|entry| !catalog.contains(&entry.identity))
            .filter(|entry| entry.published_at >= horizon)
            .filter(|entry| seen.insert(entry.identity.clone()))
            .collect();

        selected.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::CatalogOptions;
    use crate::error::FetchError;
    use crate::http::HttpResponse;
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Europe::Prague;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves listing pages keyed by offset and records every request
    struct MockListing {
        pages: HashMap<usize, String>,
        requests: Mutex<Vec<String>>,
    }

    impl MockListing {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .enumerate()
                    .map(|(i, page)| (i * 10, page))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for MockListing {
        async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.requests.lock().unwrap().push(url.to_string());

            let offset: usize = url
                .rsplit("offset=")
                .next()
                .and_then(|o| o.parse().ok())
                .unwrap_or(usize::MAX);

            let (status, body) = match self.pages.get(&offset) {
                Some(page) => (200, page.clone()),
                None => (200, "<html><body></body></html>".to_string()),
            };

            Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            })
        }
    }

    struct FailingListing;

    #[async_trait]
    impl HttpClient for FailingListing {
        async fn get(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            Ok(HttpResponse {
                status: 503,
                body: Bytes::new(),
            })
        }
    }

    fn catalog_options() -> CatalogOptions {
        CatalogOptions {
            timezone: Prague,
            start_date: Prague.with_ymd_and_hms(2017, 5, 29, 0, 0, 0).unwrap(),
            lookback: Duration::days(14),
        }
    }

    fn engine() -> SyncEngine {
        let config = ShowConfig {
            listing_url: "http://video.aktualne.cz/dvtv/?offset={offset}".to_string(),
            page_size: 10,
            max_pages: 50,
            ..Default::default()
        };
        SyncEngine::from_config(&config).unwrap()
    }

    /// Listing item dated `day.month.year`
    fn item(slug: &str, title: &str, day: u32, month: u32, year: i32) -> String {
        let id = slug.replace('/', "-");
        format!(
            concat!(
                r#"<a class="nahled" href="/dvtv/{}/r~{}/">"#,
                r#"<span class="nazev">{}</span><span class="datum">{}.{}.{}</span></a>"#,
            ),
            slug, id, title, day, month, year
        )
    }

    fn page(items: Vec<String>) -> String {
        format!("<html><body>{}</body></html>", items.join("\n"))
    }

    fn catalog_entry(slug: &str, y: i32, m: u32, d: u32) -> Entry {
        Entry {
            identity: format!("http://video.aktualne.cz/dvtv/{slug}/r~{slug}/"),
            slug: slug.to_string(),
            title: Some(slug.to_string()),
            summary: None,
            detail: None,
            category: Category::Main,
            published_at: Prague.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn empty_listing_is_empty_result() {
        let client = MockListing::new(vec![]);
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let found = engine()
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        assert!(found.is_empty());
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn new_page_then_stale_page_yields_first_page_ascending() {
        // Page 0: five entries after the start date, newest first
        let fresh: Vec<String> = (0..5)
            .map(|i| item(&format!("new-{i}"), "Rozhovor", 10 - i, 6, 2020))
            .collect();
        // Page 1: five entries before the start date
        let stale: Vec<String> = (0..5)
            .map(|i| item(&format!("old-{i}"), "Rozhovor", 20 - i, 4, 2017))
            .collect();

        let client = MockListing::new(vec![page(fresh), page(stale)]);
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let found = engine()
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        let slugs: Vec<&str> = found.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new-4", "new-3", "new-2", "new-1", "new-0"]);
        assert!(found.windows(2).all(|w| w[0].published_at <= w[1].published_at));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn stops_at_first_fully_stale_page() {
        // Pages 0 and 1 are fresh; pages 2..6 are stale
        let mut pages = Vec::new();
        for p in 0..2 {
            pages.push(page(vec![item(&format!("fresh-{p}"), "A", 20 - p, 6, 2020)]));
        }
        for p in 2..6 {
            pages.push(page(vec![item(&format!("stale-{p}"), "A", 1, 1, 2016)]));
        }

        let client = MockListing::new(pages);
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let found = engine()
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn mixed_page_is_processed_and_pagination_continues() {
        let mut catalog = Catalog::new("/tmp/none.json", catalog_options());
        catalog.insert(catalog_entry("known", 2020, 6, 15));
        // Horizon is 2020-06-01

        let mixed = page(vec![
            item("newer", "A", 10, 6, 2020),
            item("known", "A", 15, 6, 2020),
            item("older", "A", 20, 5, 2020),
        ]);
        let more = page(vec![item("also-newer", "A", 2, 6, 2020)]);
        let stale = page(vec![item("ancient", "A", 1, 1, 2019)]);

        let client = MockListing::new(vec![mixed, more, stale]);

        let found = engine()
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        let slugs: Vec<&str> = found.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["also-newer", "newer"]);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn excluded_entries_never_returned() {
        let listing = page(vec![
            item("forum/nazor", "Názor", 10, 6, 2020),
            item("prefixed", "DVTV Forum: Debata", 10, 6, 2020),
            item("sub", "Drtinová Veselovský TV: speciál", 10, 6, 2020),
            item("ok", "Rozhovor", 10, 6, 2020),
        ]);

        let client = MockListing::new(vec![listing]);
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let found = engine()
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        let slugs: Vec<&str> = found.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["ok"]);
    }

    #[tokio::test]
    async fn duplicates_across_pages_are_returned_once() {
        let first = page(vec![item("dup", "First sighting", 10, 6, 2020)]);
        let second = page(vec![
            item("dup", "Second sighting", 10, 6, 2020),
            item("other", "Other", 9, 6, 2020),
        ]);

        let client = MockListing::new(vec![first, second]);
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let found = engine()
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        let dup = found.iter().find(|e| e.slug == "dup").unwrap();
        assert_eq!(dup.title.as_deref(), Some("First sighting"));
    }

    #[tokio::test]
    async fn respects_page_limit() {
        let pages: Vec<String> = (0..10)
            .map(|p| page(vec![item(&format!("e{p}"), "A", 20, 6, 2020)]))
            .collect();
        let client = MockListing::new(pages);
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let config = ShowConfig {
            max_pages: 3,
            ..Default::default()
        };
        let engine = SyncEngine::from_config(&config).unwrap();

        let found = engine
            .discover_new(&client, &catalog, &NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(found.len(), 3);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let catalog = Catalog::new("/tmp/none.json", catalog_options());

        let result = engine()
            .discover_new(&FailingListing, &catalog, &NoopReporter::shared())
            .await;

        match result {
            Err(SyncError::ListingFetch {
                offset: 0,
                source: FetchError::HttpStatus { status: 503, .. },
            }) => {}
            other => panic!("Expected listing fetch error, got {other:?}"),
        }
    }

    #[test]
    fn listing_url_substitutes_offset() {
        let options = SyncOptions::from_config(&ShowConfig::default());
        assert_eq!(
            options.listing_url_for(20),
            "http://video.aktualne.cz/dvtv/?offset=20"
        );
    }

    #[test]
    fn select_new_drops_stale_and_known_entries() {
        let mut catalog = Catalog::new("/tmp/none.json", catalog_options());
        catalog.insert(catalog_entry("known", 2020, 6, 15));
        let horizon = catalog.horizon();

        let candidates = vec![
            catalog_entry("known", 2020, 6, 15),
            catalog_entry("stale", 2020, 5, 31),
            catalog_entry("edge", 2020, 6, 1),
            catalog_entry("fresh", 2020, 6, 20),
        ];

        let selected = engine().select_new(candidates, &catalog, horizon);
        let slugs: Vec<&str> = selected.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["edge", "fresh"]);
    }
}
