//! Selector-driven extraction from HTML listing pages.
//!
//! Iterates the configured container elements; each container needs a
//! headline element with a resolvable link to become an article. Description
//! and date are optional sub-elements. Some publishers repeat their lead
//! article in two page slots, so links are de-duplicated within the page —
//! this same-run seen-set is distinct from the cross-run dedup store.

use crate::config::MarkupSource;
use crate::dates;
use crate::images;
use crate::models::Article;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

/// Extract articles from a listing page.
#[instrument(level = "info", skip(html, source), fields(source = %source_name))]
pub fn extract(html: &str, source: &MarkupSource, source_name: &str) -> Vec<Article> {
    let Ok(base) = Url::parse(&source.base_url) else {
        warn!(base_url = %source.base_url, "Unparseable base_url; skipping source");
        return Vec::new();
    };
    // Selectors were compile-checked at config load.
    let Ok(container_sel) = Selector::parse(&source.selectors.container) else {
        return Vec::new();
    };
    let Ok(headline_sel) = Selector::parse(&source.selectors.headline) else {
        return Vec::new();
    };
    let description_sel = source
        .selectors
        .description
        .as_deref()
        .and_then(|s| Selector::parse(s).ok());
    let date_sel = source
        .selectors
        .date
        .as_deref()
        .and_then(|s| Selector::parse(s).ok());

    let document = Html::parse_document(html);
    let articles: Vec<Article> = document
        .select(&container_sel)
        .filter_map(|container| {
            extract_one(
                container,
                source,
                source_name,
                &base,
                &headline_sel,
                description_sel.as_ref(),
                date_sel.as_ref(),
            )
        })
        .unique_by(|article| article.canonical_link.clone())
        .collect();

    debug!(count = articles.len(), "Extracted articles from markup");
    articles
}

fn extract_one(
    container: ElementRef<'_>,
    source: &MarkupSource,
    source_name: &str,
    base: &Url,
    headline_sel: &Selector,
    description_sel: Option<&Selector>,
    date_sel: Option<&Selector>,
) -> Option<Article> {
    // Containers without a headline are navigation chrome, not articles.
    let headline_el = container.select(headline_sel).next()?;
    let headline = element_text(headline_el);
    if headline.is_empty() {
        return None;
    }

    let href = headline_el.value().attr(&source.selectors.link_attr)?;
    let canonical_link = base.join(href.trim()).ok()?.to_string();

    let description = description_sel
        .and_then(|sel| container.select(sel).next())
        .map(element_text)
        .unwrap_or_default();

    let published = match (&source.date_format, date_sel) {
        (Some(format), Some(sel)) => container
            .select(sel)
            .next()
            .map(element_text)
            .and_then(|raw| dates::normalize(&raw, format)),
        _ => None,
    };

    let image_url = source.selectors.image.as_deref().and_then(|spec| {
        images::extract_candidate(container, spec, &source.image_attribute_priority, base)
    });

    Some(Article {
        source_name: source_name.to_string(),
        headline,
        description,
        canonical_link,
        image_url,
        published,
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, SourceKind};
    use chrono::NaiveDate;

    fn financesnews() -> MarkupSource {
        let source: SourceConfig = serde_yaml::from_str(
            r#"
name: financesnews
kind: markup
list_url: https://site.tld/marches
base_url: https://site.tld
selectors:
  container: "div.card"
  headline: "h3 a"
  description: "p.excerpt"
  image: "img"
  date: "span.date"
date_format:
  style: month_name
  months:
    janvier: 1
    février: 2
    mars: 3
allowed_image_domains: [site.tld]
image_attribute_priority: [data-src, src]
"#,
        )
        .unwrap();
        match source.kind {
            SourceKind::Markup(markup) => markup,
            _ => unreachable!(),
        }
    }

    const PAGE: &str = r#"
<html><body>
  <div class="card">
    <h3><a href="/a/123">Budget 2026: les grandes lignes</a></h3>
    <p class="excerpt">Le gouvernement présente...</p>
    <span class="date">12 Février 2026</span>
    <img data-src="/img/budget.jpg" src="/img/blank.gif">
  </div>
  <div class="card">
    <h3><a href="/a/456">Bourse: séance en hausse</a></h3>
  </div>
  <!-- lead article repeated in a second slot -->
  <div class="card">
    <h3><a href="/a/123">Budget 2026: les grandes lignes</a></h3>
  </div>
  <div class="card">
    <p class="excerpt">Container without a headline: skipped silently.</p>
  </div>
</body></html>
"#;

    #[test]
    fn test_extracts_and_resolves() {
        let articles = extract(PAGE, &financesnews(), "financesnews");
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.headline, "Budget 2026: les grandes lignes");
        assert_eq!(first.canonical_link, "https://site.tld/a/123");
        assert_eq!(first.description, "Le gouvernement présente...");
        assert_eq!(first.published, NaiveDate::from_ymd_opt(2026, 2, 12));
        assert_eq!(first.image_url.as_deref(), Some("https://site.tld/img/budget.jpg"));
    }

    #[test]
    fn test_optional_fields_degrade() {
        let articles = extract(PAGE, &financesnews(), "financesnews");
        let second = &articles[1];
        assert_eq!(second.canonical_link, "https://site.tld/a/456");
        assert_eq!(second.description, "");
        assert_eq!(second.published, None);
        assert_eq!(second.image_url, None);
    }

    #[test]
    fn test_within_page_dedup() {
        let articles = extract(PAGE, &financesnews(), "financesnews");
        let links: Vec<&str> = articles.iter().map(|a| a.canonical_link.as_str()).collect();
        assert_eq!(
            links.iter().filter(|l| **l == "https://site.tld/a/123").count(),
            1
        );
    }

    #[test]
    fn test_zero_containers_is_empty_not_error() {
        let articles = extract("<html><body></body></html>", &financesnews(), "financesnews");
        assert!(articles.is_empty());
    }
}
