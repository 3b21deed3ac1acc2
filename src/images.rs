//! Image extraction and validation.
//!
//! Candidate image URLs come out of third-party markup, which makes them
//! attacker-influenceable — and this process dereferences them with its own
//! network stack. Every candidate therefore passes a host allowlist (the
//! SSRF guard) before any probe or delivery, then a lightweight HEAD probe
//! that must answer 2xx with an `image/*` content type. A failed candidate
//! never fails its article; it degrades to a text-only message.
//!
//! # Spec shapes
//!
//! A markup source's `image` selector is a comma-separated list of specs,
//! tried in order (order is caller-configured and significant):
//!
//! - `img.cover` — select the element, probe the configured attribute
//!   priority list (`data-src` before `src` for lazy loaders, etc.)
//! - `img.cover::attr(data-lazy)` — probe exactly that attribute
//! - an attribute named `style` is parsed for `background-image: url(...)`

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

static ATTR_SPEC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<css>.*?)::attr\((?P<attr>[^)]+)\)\s*$").unwrap());
static BACKGROUND_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"background(?:-image)?\s*:\s*url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());

/// Pull a candidate image URL out of a container element.
///
/// Walks the comma-separated specs in order; the first spec yielding a
/// non-empty URL that resolves against `base` wins. Returns an absolute URL
/// that has not yet been validated.
pub fn extract_candidate(
    container: ElementRef<'_>,
    image_spec: &str,
    attribute_priority: &[String],
    base: &Url,
) -> Option<String> {
    for spec in image_spec.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        let (css, attrs): (&str, Vec<&str>) = match ATTR_SPEC_RE.captures(spec) {
            Some(caps) => {
                let css_end = caps.name("css").map(|m| m.end()).unwrap_or(0);
                let attr = caps.name("attr").map(|m| m.as_str()).unwrap_or("src");
                (spec[..css_end].trim(), vec![attr])
            }
            None => (spec, attribute_priority.iter().map(String::as_str).collect()),
        };

        let Ok(selector) = Selector::parse(if css.is_empty() { "img" } else { css }) else {
            continue;
        };
        let Some(element) = container.select(&selector).next() else {
            continue;
        };

        for attr in &attrs {
            let raw = match element.value().attr(attr) {
                Some(value) if !value.trim().is_empty() => value.trim(),
                _ => continue,
            };
            let raw = if attr.eq_ignore_ascii_case("style") {
                match BACKGROUND_URL_RE.captures(raw) {
                    Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
                    None => continue,
                }
            } else {
                raw
            };
            if let Ok(resolved) = base.join(raw) {
                return Some(resolved.to_string());
            }
        }
    }
    None
}

/// SSRF allowlist check: the URL's host must equal an allowed domain or be a
/// proper dot-suffix subdomain of one. `evil-example.com` must not match
/// `example.com`; `img.example.com` does.
pub fn host_allowed(url: &Url, allowed_domains: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    allowed_domains.iter().any(|domain| {
        host.eq_ignore_ascii_case(domain)
            || host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
    })
}

/// Percent-encode the path and query of an image URL.
///
/// Publisher markup routinely carries unescaped spaces and parentheses that
/// the display client rejects. Scheme and authority (host, port, userinfo)
/// are left untouched.
pub fn encode_for_display(url: &Url) -> String {
    let path = encode_keeping(url.path(), &['/', '%']);
    let mut out = format!("{}://{}{}", url.scheme(), url.authority(), path);
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(&encode_keeping(query, &['=', '&', '%', '+']));
    }
    out
}

fn encode_keeping(s: &str, keep: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') || keep.contains(&c) {
            out.push(c);
        } else {
            out.push_str(&urlencoding::encode(&c.to_string()));
        }
    }
    out
}

/// Validate a candidate image URL for delivery.
///
/// Applies the allowlist guard, percent-encodes the survivor, then issues a
/// HEAD probe requiring a 2xx status and an `image/*` content type. Any
/// failure returns `None` — the article still goes out, text-only.
#[instrument(level = "debug", skip(client, allowed_domains))]
pub async fn resolve_validated(
    client: &Client,
    candidate: &str,
    allowed_domains: &[String],
) -> Option<String> {
    let parsed = match Url::parse(candidate) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => parsed,
        _ => {
            debug!(url = %candidate, "Discarding non-HTTP image candidate");
            return None;
        }
    };
    if !host_allowed(&parsed, allowed_domains) {
        warn!(url = %candidate, "Rejected image URL outside the allowed domains");
        return None;
    }

    let encoded = encode_for_display(&parsed);
    match client
        .head(&encoded)
        .timeout(crate::fetch::PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => {
            let status = response.status();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if status.is_success() && content_type.starts_with("image/") {
                Some(encoded)
            } else {
                debug!(url = %encoded, %status, %content_type, "Image probe rejected candidate");
                None
            }
        }
        Err(e) => {
            debug!(url = %encoded, error = %e, "Image probe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_container<'a>(document: &'a Html, css: &str) -> ElementRef<'a> {
        let selector = Selector::parse(css).unwrap();
        document.select(&selector).next().unwrap()
    }

    #[test]
    fn test_candidate_attribute_priority_order() {
        let html = r#"<div class="card">
            <img src="/placeholder.gif" data-src="/real/photo.jpg">
        </div>"#;
        let document = Html::parse_document(html);
        let base = Url::parse("https://site.tld").unwrap();
        let priority = vec!["data-src".to_string(), "src".to_string()];

        let found = extract_candidate(first_container(&document, ".card"), "img", &priority, &base);
        assert_eq!(found.as_deref(), Some("https://site.tld/real/photo.jpg"));

        // Reversed priority picks the placeholder instead: order is significant.
        let reversed = vec!["src".to_string(), "data-src".to_string()];
        let found = extract_candidate(first_container(&document, ".card"), "img", &reversed, &base);
        assert_eq!(found.as_deref(), Some("https://site.tld/placeholder.gif"));
    }

    #[test]
    fn test_candidate_attr_spec() {
        let html = r#"<div class="card"><img class="cover" data-lazy="/a.png" src="/b.png"></div>"#;
        let document = Html::parse_document(html);
        let base = Url::parse("https://site.tld").unwrap();
        let found = extract_candidate(
            first_container(&document, ".card"),
            "img.cover::attr(data-lazy)",
            &["src".to_string()],
            &base,
        );
        assert_eq!(found.as_deref(), Some("https://site.tld/a.png"));
    }

    #[test]
    fn test_candidate_background_image_style() {
        let html = r#"<div class="card">
            <div class="hero" style="background-image: url('/img/hero.jpg'); color: red"></div>
        </div>"#;
        let document = Html::parse_document(html);
        let base = Url::parse("https://site.tld").unwrap();
        let found = extract_candidate(
            first_container(&document, ".card"),
            "div.hero::attr(style)",
            &["src".to_string()],
            &base,
        );
        assert_eq!(found.as_deref(), Some("https://site.tld/img/hero.jpg"));
    }

    #[test]
    fn test_candidate_first_spec_wins() {
        let html = r#"<div class="card">
            <img class="thumb" src="/thumb.jpg">
            <img class="full" src="/full.jpg">
        </div>"#;
        let document = Html::parse_document(html);
        let base = Url::parse("https://site.tld").unwrap();
        let found = extract_candidate(
            first_container(&document, ".card"),
            "img.full, img.thumb",
            &["src".to_string()],
            &base,
        );
        assert_eq!(found.as_deref(), Some("https://site.tld/full.jpg"));
    }

    #[test]
    fn test_host_allowed_suffix_rules() {
        let allowed = vec!["example.com".to_string()];
        let ok = Url::parse("https://example.com/a.jpg").unwrap();
        let sub = Url::parse("https://img.example.com/a.jpg").unwrap();
        let evil_sub = Url::parse("https://evil.example.com.attacker.net/a.jpg").unwrap();
        let evil_dash = Url::parse("https://evil-example.com/a.jpg").unwrap();
        assert!(host_allowed(&ok, &allowed));
        assert!(host_allowed(&sub, &allowed));
        assert!(!host_allowed(&evil_sub, &allowed));
        assert!(!host_allowed(&evil_dash, &allowed));
    }

    #[test]
    fn test_host_allowed_empty_list_rejects() {
        let url = Url::parse("https://anywhere.tld/a.jpg").unwrap();
        assert!(!host_allowed(&url, &[]));
    }

    #[test]
    fn test_encode_for_display() {
        let url = Url::parse("https://site.tld/img/photo (1).jpg?w=800&name=été").unwrap();
        let encoded = encode_for_display(&url);
        assert!(encoded.starts_with("https://site.tld/img/photo"));
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('('));
        assert!(encoded.contains("w=800&"));

        // An explicit port is part of the identity of the resource.
        let url = Url::parse("https://img.site.tld:8443/photo (1).jpg").unwrap();
        assert_eq!(
            encode_for_display(&url),
            "https://img.site.tld:8443/photo%20%281%29.jpg"
        );
    }
}
