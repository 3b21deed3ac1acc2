//! Structured-feed extraction from a WP-JSON post array.
//!
//! Feed records carry a GMT publish timestamp, rendered rich-text title and
//! excerpt fields, a canonical link, and optionally embedded featured-media
//! metadata. Records outside the run's date window are skipped here (the
//! feed returns weeks of history; there is no point normalizing it all).
//!
//! Excerpts are frequently boilerplate rather than a real summary — generic
//! market-recap labels, or a bare "TICKER Pts" snippet from an embedded
//! quote table. Those are cleared rather than delivered: a generic recap
//! caption is worse than no caption.

use crate::dates::DateWindow;
use crate::models::Article;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
/// Uppercase ticker codes followed by "Pts", e.g. "MASI Pts" or "BCP Pts".
static TICKER_PTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-ZÉÈÎÂÀÇ][A-Z0-9ÉÈÎÂÀÇ\s]{2,20}\s+Pts$").unwrap());

/// Generic recap labels the feed reuses as excerpts.
const BOILERPLATE: &[&str] = &[
    "marché de change",
    "la séance du jour",
    "la bourse",
    "masi pts",
];

#[derive(Debug, Deserialize)]
struct FeedPost {
    date_gmt: String,
    link: String,
    title: Rendered,
    #[serde(default)]
    excerpt: Option<Rendered>,
    #[serde(default, rename = "_embedded")]
    embedded: Option<Embedded>,
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default, rename = "wp:featuredmedia")]
    featured_media: Vec<FeaturedMedia>,
}

#[derive(Debug, Deserialize)]
struct FeaturedMedia {
    #[serde(default)]
    source_url: Option<String>,
}

/// Extract articles published inside `window` from a WP-JSON body.
#[instrument(level = "info", skip(body, window), fields(source = %source_name))]
pub fn extract(body: &str, source_name: &str, window: &DateWindow) -> Vec<Article> {
    let posts: Vec<FeedPost> = match serde_json::from_str(body) {
        Ok(posts) => posts,
        Err(e) => {
            warn!(error = %e, "Feed body is not a post array");
            return Vec::new();
        }
    };

    let articles: Vec<Article> = posts
        .into_iter()
        .filter_map(|post| convert(post, source_name, window))
        .collect();
    debug!(count = articles.len(), "Extracted articles from feed");
    articles
}

fn convert(post: FeedPost, source_name: &str, window: &DateWindow) -> Option<Article> {
    // "2026-02-12T07:30:00" (sometimes with a trailing Z): the date part is
    // always the first ten characters.
    let published: chrono::NaiveDate = post.date_gmt.get(..10)?.parse().ok()?;
    if !window.contains(published) {
        return None;
    }

    let headline = plain_text(&post.title.rendered);
    if headline.is_empty() {
        return None;
    }
    let canonical_link = Url::parse(post.link.trim()).ok()?.to_string();

    let mut description = post
        .excerpt
        .as_ref()
        .map(|e| plain_text(&e.rendered))
        .unwrap_or_default();
    if is_boilerplate(&description, window) {
        description.clear();
    }

    let image_url = post
        .embedded
        .and_then(|e| e.featured_media.into_iter().next())
        .and_then(|m| m.source_url)
        .filter(|u| !u.trim().is_empty());

    Some(Article {
        source_name: source_name.to_string(),
        headline,
        description,
        canonical_link,
        image_url,
        published: Some(published),
    })
}

/// Strip markup tags, decode HTML entities, collapse whitespace.
fn plain_text(rendered: &str) -> String {
    let stripped = TAG_RE.replace_all(rendered, "");
    let decoded = html_escape::decode_html_entities(stripped.as_ref());
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_boilerplate(description: &str, window: &DateWindow) -> bool {
    if description.is_empty() {
        return false;
    }
    if TICKER_PTS_RE.is_match(description) {
        return true;
    }
    let lowered = description.to_lowercase();
    let day_label = format!("journée du {}", window.reference.format("%d-%m-%Y"));
    BOILERPLATE.contains(&lowered.as_str()) || lowered == day_label
}
