use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::CatalogOptions;
use crate::date::DateNormalizer;
use crate::entry::Category;
use crate::error::ConfigError;

/// Placeholder in `listing_url` replaced by the page offset
pub const OFFSET_PLACEHOLDER: &str = "{offset}";

/// Prefix of environment variables overriding the configuration
pub const ENV_PREFIX: &str = "SHOWPULL_";

/// Everything needed to mirror one show into one podcast feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Short name of the show, used in logs
    pub name: String,
    /// Listing page URL with an `{offset}` placeholder
    pub listing_url: String,
    /// Base for resolving relative links found in the listing
    pub site_base_url: Url,
    /// Canonical episode path pattern; must have a `slug` capture group
    pub link_pattern: String,
    /// Offset stride between listing pages
    pub page_size: usize,
    /// Hard cap on listing pages fetched in one run
    pub max_pages: usize,
    /// The catalog is never considered complete before this date
    pub start_date: NaiveDate,
    /// Days the horizon trails the newest catalog entry
    pub horizon_days: u32,
    /// Civil timezone of the show's dates
    pub timezone: Tz,
    /// Words standing for the current day in date labels
    pub today_markers: Vec<String>,
    pub excluded_categories: Vec<Category>,
    /// Titles starting with any of these are skipped
    pub banned_title_prefixes: Vec<String>,
    /// Titles containing any of these are skipped
    pub banned_title_substrings: Vec<String>,
    /// Fetch each new entry's page for its long description
    pub enrich_details: bool,
    /// Root of the published media tree
    pub dest_dir: PathBuf,
    /// Public URL under which `dest_dir` is served
    pub public_base_url: Url,
    /// Catalog filename inside `dest_dir`
    pub catalog_file: String,
    /// Feed filename inside `dest_dir`
    pub feed_file: String,
    /// Image copied to `dest_dir/cover.jpg` when missing
    pub cover_image: Option<PathBuf>,
    pub tools: ToolsConfig,
    pub feed: FeedConfig,
}

/// External programs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub downloader: PathBuf,
    /// Arguments before the source URL
    pub downloader_args: Vec<String>,
    pub transcoder: PathBuf,
    pub prober: PathBuf,
}

/// Channel-level feed metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub title: String,
    pub description: String,
    pub author_name: String,
    pub author_email: String,
    pub language: String,
    pub link: String,
    pub itunes_category: String,
    pub itunes_subcategory: Option<String>,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            name: "dvtv".to_string(),
            listing_url: "http://video.aktualne.cz/dvtv/?offset={offset}".to_string(),
            site_base_url: Url::parse("http://video.aktualne.cz/").expect("valid base URL"),
            link_pattern: r"^/dvtv/(?P<slug>.+?)/r~[^/]+/?$".to_string(),
            page_size: 10,
            max_pages: 500,
            start_date: NaiveDate::from_ymd_opt(2017, 5, 29).expect("valid start date"),
            horizon_days: 14,
            timezone: chrono_tz::Europe::Prague,
            today_markers: vec!["dnes".to_string(), "today".to_string()],
            excluded_categories: vec![Category::Forum],
            banned_title_prefixes: vec!["DVTV Forum:".to_string()],
            banned_title_substrings: vec!["Drtinová Veselovský TV".to_string()],
            enrich_details: true,
            dest_dir: PathBuf::from("/srv/www/htdocs/podcasts"),
            public_base_url: Url::parse("http://localhost:8000/podcasts/")
                .expect("valid public URL"),
            catalog_file: "dvtv-db.json".to_string(),
            feed_file: "dvtv.rss".to_string(),
            cover_image: None,
            tools: ToolsConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            downloader: PathBuf::from("yt-dlp"),
            downloader_args: vec!["--quiet".to_string(), "--no-progress".to_string()],
            transcoder: PathBuf::from("ffmpeg"),
            prober: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            title: "DVTV".to_string(),
            description: "DVTV".to_string(),
            author_name: "DVTV".to_string(),
            author_email: "podcast@localhost".to_string(),
            language: "cs-CZ".to_string(),
            link: "http://video.aktualne.cz/dvtv/".to_string(),
            itunes_category: "Technology".to_string(),
            itunes_subcategory: Some("Podcasting".to_string()),
        }
    }
}

impl ShowConfig {
    pub fn catalog_path(&self) -> PathBuf {
        self.dest_dir.join(&self.catalog_file)
    }

    pub fn feed_path(&self) -> PathBuf {
        self.dest_dir.join(&self.feed_file)
    }

    /// Start date at midnight in the show's timezone
    pub fn start_datetime(&self) -> DateTime<Tz> {
        let midnight = self.start_date.and_time(NaiveTime::MIN);
        self.timezone
            .from_local_datetime(&midnight)
            .earliest()
            .unwrap_or_else(|| self.timezone.from_utc_datetime(&midnight))
    }

    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            timezone: self.timezone,
            start_date: self.start_datetime(),
            lookback: Duration::days(i64::from(self.horizon_days)),
        }
    }

    pub fn date_normalizer(&self) -> DateNormalizer {
        DateNormalizer::new(self.timezone, self.today_markers.clone())
    }

    /// Compile `link_pattern`
    pub fn link_regex(&self) -> Result<Regex, ConfigError> {
        let regex = Regex::new(&self.link_pattern).map_err(|e| {
            ConfigError::Invalid(format!("link_pattern is not a valid regex: {e}"))
        })?;

        if !regex.capture_names().flatten().any(|name| name == "slug") {
            return Err(ConfigError::Invalid(
                "link_pattern needs a named `slug` capture group".to_string(),
            ));
        }

        Ok(regex)
    }

    /// Check the configuration and normalize URL bases
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size cannot be 0".to_string()));
        }

        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages cannot be 0".to_string()));
        }

        if !self.listing_url.contains(OFFSET_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "listing_url must contain {OFFSET_PLACEHOLDER}"
            )));
        }

        self.link_regex()?;

        // Joining against a base without a trailing slash drops its last segment
        for base in [&mut self.public_base_url, &mut self.site_base_url] {
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
        }

        Ok(self)
    }
}

/// Load configuration: built-in defaults, then the optional TOML file, then
/// `SHOWPULL_` environment variables (`__` separates nested keys)
pub fn load_config(path: Option<&Path>) -> Result<ShowConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ShowConfig::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: ShowConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()
}

/// Load configuration from a TOML string over the defaults (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<ShowConfig, ConfigError> {
    let config: ShowConfig = Figment::from(Serialized::defaults(ShowConfig::default()))
        .merge(Toml::string(toml_str))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()
}
