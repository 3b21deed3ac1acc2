//! Last-resort extraction from a text-rendering proxy's Markdown output.
//!
//! Some listing pages defeat both selectors and the feed API; for those, the
//! listing is rendered through a Markdown proxy (e.g. `r.jina.ai`) and
//! classified line by line:
//!
//! ```text
//! Le 12/02/2026 à 09h30          <- date header
//! [Budget 2026](https://...)     <- headline + link
//! Le gouvernement présente...    <- first surviving line = description
//! ```
//!
//! Separator rules (`===`), Markdown images (`![`), further links, and a set
//! of known section labels are skipped while hunting for the description.
//! These heuristics are inherently fragile, which is why this strategy is
//! isolated here and never mixed into the primary markup path.

use crate::models::Article;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Le\s+(\d{1,2})/(\d{1,2})/(\d{4})\s+à\s+\d").unwrap());
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(.+?)\]\((https?://[^\s)]+)\)").unwrap());
static IGNORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:La|Le|Les|Marché|Bourse|Séance|Toute)\b").unwrap());
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^=+$").unwrap());
static INLINE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());

/// Extract articles from the proxy's Markdown rendering of a listing page.
#[instrument(level = "info", skip(markdown), fields(source = %source_name))]
pub fn extract(markdown: &str, source_name: &str) -> Vec<Article> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut articles = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some(header) = HEADER_RE.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let Some(next) = lines.get(i + 1) else {
            break;
        };
        let Some(link_caps) = LINK_RE.captures(next) else {
            i += 2;
            continue;
        };

        let published = NaiveDate::from_ymd_opt(
            header[3].parse().unwrap_or_default(),
            header[2].parse().unwrap_or_default(),
            header[1].parse().unwrap_or_default(),
        );
        let headline = link_caps[1].trim().to_string();
        let canonical_link = link_caps[2].to_string();
        let description = find_description(&lines, i + 2);

        if !headline.is_empty() {
            articles.push(Article {
                source_name: source_name.to_string(),
                headline,
                description,
                canonical_link,
                // The listing render carries no usable image; the orchestrator
                // probes the article page itself for one.
                image_url: None,
                published,
            });
        }
        i += 2;
    }

    debug!(count = articles.len(), "Extracted articles from reader render");
    articles
}

/// First line after a headline that is not chrome, flattened to plain text.
fn find_description(lines: &[&str], from: usize) -> String {
    for line in lines.iter().skip(from) {
        let text = line.trim();
        if text.is_empty()
            || IGNORE_RE.is_match(text)
            || text.starts_with("![")
            || LINK_RE.is_match(text)
            || SEPARATOR_RE.is_match(text)
        {
            continue;
        }
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let flattened = INLINE_LINK_RE.replace_all(&collapsed, "$1");
        return flattened.trim_matches([' ', '…']).to_string();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDER: &str = "\
Toute l'actualité du LeBoursier
===============

Le 12/02/2026 à 09h30
[Budget 2026: les grandes lignes](https://site.tld/a/123)

![Image 1](https://site.tld/img/une.jpg)
La Bourse
Un projet de loi de finances [présenté](https://site.tld/tag/plf) au parlement …

Le 12/02/2026 à 08h00
[Séance d'ouverture](https://site.tld/a/456)
=========
Marché de change
";

    #[test]
    fn test_classifies_header_link_description() {
        let articles = extract(RENDER, "medias24_reader");
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.headline, "Budget 2026: les grandes lignes");
        assert_eq!(first.canonical_link, "https://site.tld/a/123");
        assert_eq!(
            first.description,
            "Un projet de loi de finances présenté au parlement"
        );
        assert_eq!(first.published, NaiveDate::from_ymd_opt(2026, 2, 12));
        assert_eq!(first.image_url, None);
    }

    #[test]
    fn test_chrome_lines_skipped() {
        let articles = extract(RENDER, "medias24_reader");
        // Every candidate description line for the second entry is chrome.
        assert_eq!(articles[1].description, "");
    }

    #[test]
    fn test_header_without_link_skipped() {
        let markdown = "Le 12/02/2026 à 10h00\nplain text, not a link\n";
        assert!(extract(markdown, "medias24_reader").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(extract("", "medias24_reader").is_empty());
    }
}
