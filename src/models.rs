//! Canonical data model for scraped articles.
//!
//! Every extraction strategy, whatever the shape of its input (HTML listing,
//! WP-JSON feed, reader-proxy Markdown), produces the same [`Article`] record.
//! Articles are created fresh each run and never mutated afterwards; the
//! absolute `canonical_link` is the article's identity for deduplication.

use chrono::NaiveDate;
use serde::Serialize;

/// A normalized news article, as produced by an extraction strategy.
///
/// # Invariants
///
/// * `canonical_link` is non-empty and absolute — records without a
///   resolvable absolute link are dropped by the extractors, never emitted.
/// * `headline` is non-empty plain text.
/// * `description` may be empty (text-only sources, or boilerplate that was
///   deliberately cleared); `image_url` and `published` may be absent.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    /// Name of the configured source this article came from.
    pub source_name: String,
    /// Plain-text headline.
    pub headline: String,
    /// Plain-text description; empty when the source provides none.
    pub description: String,
    /// Absolute URL of the article. Identity for dedup purposes.
    pub canonical_link: String,
    /// Absolute URL of a candidate image, before SSRF/probe validation.
    pub image_url: Option<String>,
    /// Publication date, when the source exposes one we could parse.
    /// `None` means unknown, which the date filter lets through.
    pub published: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_serializes_optional_fields() {
        let article = Article {
            source_name: "financesnews".to_string(),
            headline: "Budget 2026".to_string(),
            description: String::new(),
            canonical_link: "https://site.tld/a/123".to_string(),
            image_url: None,
            published: None,
        };

        let json = serde_json::to_string(&article).unwrap();
        assert!(json.contains("https://site.tld/a/123"));
        assert!(json.contains("\"image_url\":null"));
    }
}
