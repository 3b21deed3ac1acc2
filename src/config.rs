//! Source configuration loading and validation.
//!
//! Sources live in a YAML file, one entry per publisher. Each entry is a
//! tagged variant (`kind: markup | feed | reader`) so that missing or
//! misnamed fields fail at load time instead of surfacing as a silent empty
//! extraction later. Selector strings are compile-checked on load for the
//! same reason.
//!
//! ```yaml
//! - name: financesnews
//!   kind: markup
//!   list_url: https://www.financesnews.press.ma/marches
//!   base_url: https://www.financesnews.press.ma
//!   selectors:
//!     container: "div.article-card"
//!     headline: "h3 a"
//!     description: "p.excerpt"
//!     image: "img::attr(data-src), img"
//!     date: "span.date"
//!   date_format:
//!     style: month_name
//!     months: { janvier: 1, février: 2, mars: 3 }
//!   allowed_image_domains: [financesnews.press.ma]
//! ```

use crate::dates::DateFormat;
use crate::error::{Error, Result};
use scraper::Selector;
use serde::Deserialize;
use tracing::{info, instrument, warn};

/// A configured publisher source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique identifier, used in logs and as `Article::source_name`.
    pub name: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// The extraction strategy a source uses, with its strategy-specific fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Selector-driven extraction from an HTML listing page.
    Markup(MarkupSource),
    /// WP-JSON structured feed of post records.
    Feed(FeedSource),
    /// Last-resort strategy: a text-rendering proxy's Markdown output,
    /// classified line by line. Inherently fragile; kept isolated.
    Reader(ReaderSource),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkupSource {
    pub list_url: String,
    /// Base for resolving relative article and image links.
    pub base_url: String,
    pub selectors: MarkupSelectors,
    pub date_format: Option<DateFormat>,
    /// Host suffixes image URLs may point at. Empty means no images are
    /// ever attached for this source.
    #[serde(default)]
    pub allowed_image_domains: Vec<String>,
    /// Attributes probed, in order, on a selected image element. Lazy-loaded
    /// images usually hide the real URL in `data-src` while `src` holds a
    /// placeholder.
    #[serde(default = "default_image_attributes")]
    pub image_attribute_priority: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub api_url: String,
    #[serde(default)]
    pub allowed_image_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderSource {
    pub list_url: String,
    /// Prefix of the text-rendering proxy, e.g. `https://r.jina.ai/`.
    pub proxy_prefix: String,
    #[serde(default)]
    pub allowed_image_domains: Vec<String>,
}

/// CSS selectors for the markup strategy. `container` and `headline` are
/// required; everything else degrades to an absent field when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkupSelectors {
    pub container: String,
    pub headline: String,
    /// Attribute on the headline element carrying the article link.
    #[serde(default = "default_link_attr")]
    pub link_attr: String,
    pub description: Option<String>,
    /// Comma-separated image specs, tried in order. Each is a CSS selector,
    /// optionally with `::attr(name)` to name the attribute to read.
    pub image: Option<String>,
    pub date: Option<String>,
}

fn default_link_attr() -> String {
    "href".to_string()
}

fn default_image_attributes() -> Vec<String> {
    vec!["src".to_string()]
}

impl SourceKind {
    /// The allowlist for this source's image URLs, whatever the strategy.
    pub fn allowed_image_domains(&self) -> &[String] {
        match self {
            SourceKind::Markup(s) => &s.allowed_image_domains,
            SourceKind::Feed(s) => &s.allowed_image_domains,
            SourceKind::Reader(s) => &s.allowed_image_domains,
        }
    }
}

/// Load and validate the source list.
///
/// Sources whose selectors do not compile are dropped with a logged error
/// (one bad source must not sink the run), but an empty final list is a
/// fatal configuration error.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub fn load_sources(path: &str) -> Result<Vec<SourceConfig>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read sources file {path}: {e}")))?;
    let parsed: Vec<SourceConfig> = serde_yaml::from_str(&raw)
        .map_err(|e| Error::Config(format!("cannot parse sources file {path}: {e}")))?;

    let sources: Vec<SourceConfig> = parsed
        .into_iter()
        .filter(|source| match validate(source) {
            Ok(()) => true,
            Err(reason) => {
                warn!(source = %source.name, %reason, "Dropping invalid source");
                false
            }
        })
        .collect();

    if sources.is_empty() {
        return Err(Error::Config(format!("no usable sources in {path}")));
    }
    info!(count = sources.len(), "Loaded source configuration");
    Ok(sources)
}

fn validate(source: &SourceConfig) -> std::result::Result<(), String> {
    if source.name.trim().is_empty() {
        return Err("source has an empty name".to_string());
    }
    match &source.kind {
        SourceKind::Markup(markup) => {
            check_selector("container", &markup.selectors.container)?;
            check_selector("headline", &markup.selectors.headline)?;
            for (field, value) in [
                ("description", &markup.selectors.description),
                ("date", &markup.selectors.date),
            ] {
                if let Some(sel) = value {
                    check_selector(field, sel)?;
                }
            }
            if let Some(image) = &markup.selectors.image {
                for spec in image.split(',') {
                    let css = spec.split("::attr(").next().unwrap_or(spec).trim();
                    check_selector("image", css)?;
                }
            }
            Ok(())
        }
        SourceKind::Feed(feed) => {
            if feed.api_url.trim().is_empty() {
                return Err("feed source missing api_url".to_string());
            }
            Ok(())
        }
        SourceKind::Reader(reader) => {
            if reader.proxy_prefix.trim().is_empty() {
                return Err("reader source missing proxy_prefix".to_string());
            }
            if reader.list_url.trim().is_empty() {
                return Err("reader source missing list_url".to_string());
            }
            Ok(())
        }
    }
}

fn check_selector(field: &str, raw: &str) -> std::result::Result<(), String> {
    Selector::parse(raw)
        .map(|_| ())
        .map_err(|e| format!("invalid {field} selector {raw:?}: {e}"))
}
