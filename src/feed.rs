// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rss::extension::itunes::{
    self, ITunesCategoryBuilder, ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder,
    ITunesOwnerBuilder,
};
use rss::{Channel, ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item, ItemBuilder};
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::Catalog;
use crate::config::{FeedConfig, ShowConfig};
use crate::entry::Entry;
use crate::error::FeedError;
use crate::media::{AUDIO_EXTENSION, DurationProbe, FfprobeDuration};

/// Name of the channel image inside the media root
pub const COVER_FILENAME: &str = "cover.jpg";

const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Renders a catalog into a podcast feed
pub struct FeedPublisher {
    metadata: FeedConfig,
    dest_dir: PathBuf,
    public_base_url: Url,
    probe: Box<dyn DurationProbe>,
}

impl FeedPublisher {
    pub fn new(
        metadata: FeedConfig,
        dest_dir: impl Into<PathBuf>,
        public_base_url: Url,
        probe: Box<dyn DurationProbe>,
    ) -> Self {
        Self {
            metadata,
            dest_dir: dest_dir.into(),
            public_base_url,
            probe,
        }
    }

    pub fn from_config(config: &ShowConfig) -> Self {
        Self::new(
            config.feed.clone(),
            &config.dest_dir,
            config.public_base_url.clone(),
            Box::new(FfprobeDuration::new(&config.tools.prober)),
        )
    }

    /// Public URL of a file below the media root
    pub fn public_url(&self, path: &Path) -> Result<Url, FeedError> {
        let relative = path
            .strip_prefix(&self.dest_dir)
            .map_err(|_| FeedError::PublicUrl {
                path: path.to_path_buf(),
                reason: format!("not below {}", self.dest_dir.display()),
            })?;

        let segments: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();

        self.public_base_url
            .join(&segments.join("/"))
            .map_err(|e| FeedError::PublicUrl {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Build the feed from every catalog entry, oldest first.
    ///
    /// Entries whose audio is missing on disk are left out. The catalog
    /// is not modified.
    pub async fn render(&self, catalog: &Catalog) -> Result<Channel, FeedError> {
        let mut items = Vec::with_capacity(catalog.len());
        for entry in catalog.entries_by_date() {
            if let Some(item) = self.render_item(entry).await? {
                items.push(item);
            }
        }

        debug!(items = items.len(), "Rendered feed items");
        self.channel(items)
    }

    async fn render_item(&self, entry: &Entry) -> Result<Option<Item>, FeedError> {
        let audio = entry.media_path(&self.dest_dir, AUDIO_EXTENSION);
        let length = match tokio::fs::metadata(&audio).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) | Err(_) => {
                warn!(
                    identity = %entry.identity,
                    path = %audio.display(),
                    stage = "feed",
                    "Audio missing, leaving entry out of the feed"
                );
                return Ok(None);
            }
        };

        let url = self.public_url(&audio)?.to_string();

        let duration = match self.probe.duration(&audio).await {
            Ok(duration) => Some((duration.as_secs_f64().round() as u64).to_string()),
            Err(e) => {
                warn!(
                    identity = %entry.identity,
                    error = %e,
                    stage = "feed",
                    "Could not read audio duration"
                );
                None
            }
        };

        let guid = GuidBuilder::default()
            .value(entry.identity.clone())
            .permalink(false)
            .build();

        let enclosure = EnclosureBuilder::default()
            .url(url.clone())
            .length(length.to_string())
            .mime_type(AUDIO_MIME_TYPE.to_string())
            .build();

        let mut itunes_item = ITunesItemExtensionBuilder::default();
        if let Some(duration) = duration {
            itunes_item.duration(duration);
        }
        if let Some(summary) = entry.summary.clone() {
            itunes_item.subtitle(summary);
        }

        let mut item = ItemBuilder::default();
        item.title(entry.feed_title())
            .link(url)
            .guid(guid)
            .enclosure(enclosure)
            .pub_date(entry.published_at.to_rfc2822())
            .itunes_ext(itunes_item.build());
        if let Some(detail) = entry.detail.clone() {
            item.description(detail);
        }

        Ok(Some(item.build()))
    }

    fn channel(&self, items: Vec<Item>) -> Result<Channel, FeedError> {
        let meta = &self.metadata;
        let cover = self
            .public_base_url
            .join(COVER_FILENAME)
            .map_err(|e| FeedError::PublicUrl {
                path: self.dest_dir.join(COVER_FILENAME),
                reason: e.to_string(),
            })?
            .to_string();

        let mut category = ITunesCategoryBuilder::default();
        category.text(meta.itunes_category.clone());
        if let Some(sub) = &meta.itunes_subcategory {
            category.subcategory(Box::new(
                ITunesCategoryBuilder::default().text(sub.clone()).build(),
            ));
        }

        let owner = ITunesOwnerBuilder::default()
            .name(meta.author_name.clone())
            .email(meta.author_email.clone())
            .build();

        let itunes_channel = ITunesChannelExtensionBuilder::default()
            .author(meta.author_name.clone())
            .owner(owner)
            .categories(vec![category.build()])
            .image(cover.clone())
            .summary(meta.description.clone())
            .build();

        let image = ImageBuilder::default()
            .url(cover)
            .title(meta.title.clone())
            .link(meta.link.clone())
            .build();

        let namespaces = BTreeMap::from([("itunes".to_string(), itunes::NAMESPACE.to_string())]);

        Ok(ChannelBuilder::default()
            .namespaces(namespaces)
            .title(meta.title.clone())
            .link(meta.link.clone())
            .description(meta.description.clone())
            .language(meta.language.clone())
            .managing_editor(format!("{} ({})", meta.author_email, meta.author_name))
            .generator(format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
            .image(image)
            .itunes_ext(itunes_channel)
            .items(items)
            .build())
    }
}

/// Write a rendered feed, replacing the previous file in one step
pub fn write_feed(channel: &Channel, path: &Path) -> Result<(), FeedError> {
    let xml = channel.pretty_write_to(Vec::new(), b' ', 2)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FeedError::WriteFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    std::fs::write(&partial, xml).map_err(|e| FeedError::WriteFailed {
        path: partial.clone(),
        source: e,
    })?;
    std::fs::rename(&partial, path).map_err(|e| FeedError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    info!(path = %path.display(), items = channel.items().len(), "Wrote feed");
    Ok(())
}
