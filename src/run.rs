//! Run orchestration: fetch → extract → filter → deliver → persist.
//!
//! The pipeline is single-threaded and fully sequential. Sources are
//! processed in configuration order; within a source, articles run in
//! extraction order. Every network call blocks until it returns or times
//! out, and a fixed pacing delay follows every delivery attempt so the
//! messaging API's implicit rate limits are respected. Delivery order is
//! therefore deterministic for a deterministic input document.
//!
//! One [`RunContext`] owns everything mutable for a run — the HTTP client,
//! the Telegram client, the dedup store, and the failure tracker — so there
//! is no hidden global state and tests can inject temporary stores.
//!
//! Note the one deliberate side channel: every publisher fetch outcome,
//! success or failure, updates the persisted failure counter (and may fire
//! the operator alert) through [`RunContext::fetch_page`].

use crate::config::{SourceConfig, SourceKind};
use crate::dates::DateWindow;
use crate::error::{Error, FetchError, Result};
use crate::fetch::{self, RetryPolicy, FETCH_TIMEOUT};
use crate::images;
use crate::models::Article;
use crate::state::{FailureTracker, SentState};
use crate::telegram::{self, TelegramClient};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Build the URL handed to a text-rendering proxy. The proxy expects the
/// full target URI after its trailing slash, scheme included:
/// `https://r.jina.ai/https://site.tld/page`.
fn reader_proxy_url(proxy_prefix: &str, list_url: &str) -> String {
    format!("{proxy_prefix}{list_url}")
}

/// Everything a run needs, threaded explicitly through the pipeline.
pub struct RunContext {
    pub http: reqwest::Client,
    pub telegram: TelegramClient,
    pub sent: SentState,
    pub failures: FailureTracker,
    pub window: DateWindow,
    pub retry: RetryPolicy,
    /// Pause after every delivery attempt, success or failure.
    pub pacing: Duration,
    /// Log would-be deliveries without calling Telegram or mutating state.
    pub dry_run: bool,
}

/// Per-run counters, reported at the end of the run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub articles_seen: usize,
    pub delivered: usize,
    pub skipped_duplicate: usize,
    pub skipped_date: usize,
    pub delivery_failures: usize,
}

impl RunContext {
    /// Process every configured source, in order.
    ///
    /// Zero configured sources is a configuration error, not a runtime
    /// failure. A source that cannot be fetched is logged and skipped; the
    /// run continues with the next one.
    #[instrument(level = "info", skip_all, fields(reference_date = %self.window.reference))]
    pub async fn run(&mut self, sources: &[SourceConfig]) -> Result<RunSummary> {
        if sources.is_empty() {
            return Err(Error::Config("no sources configured".to_string()));
        }

        let mut summary = RunSummary::default();
        for source in sources {
            info!(source = %source.name, "Processing source");
            match self.process_source(source, &mut summary).await {
                Ok(()) => summary.sources_processed += 1,
                Err(e) => {
                    error!(source = %source.name, error = %e, "Source failed; continuing with the next one");
                    summary.sources_failed += 1;
                }
            }
        }

        // Articles are persisted after each delivery already; this final
        // write covers the scope-date rewrite when nothing was delivered.
        if !self.dry_run {
            self.sent.persist()?;
        }
        info!(
            processed = summary.sources_processed,
            failed = summary.sources_failed,
            seen = summary.articles_seen,
            delivered = summary.delivered,
            duplicates = summary.skipped_duplicate,
            out_of_window = summary.skipped_date,
            "Run complete"
        );
        Ok(summary)
    }

    async fn process_source(
        &mut self,
        source: &SourceConfig,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let articles = match &source.kind {
            SourceKind::Markup(markup) => {
                let html = self.fetch_page(&markup.list_url).await?;
                crate::extract::markup::extract(&html, markup, &source.name)
            }
            SourceKind::Feed(feed) => {
                let body = self.fetch_page(&feed.api_url).await?;
                crate::extract::feed::extract(&body, &source.name, &self.window)
            }
            SourceKind::Reader(reader) => {
                let proxied = reader_proxy_url(&reader.proxy_prefix, &reader.list_url);
                let markdown = self.fetch_page(&proxied).await?;
                crate::extract::reader::extract(&markdown, &source.name)
            }
        };

        if articles.is_empty() {
            // Possible site redesign: worth an operator's eyeball, not an alert.
            warn!(source = %source.name, "Extraction produced zero articles");
            return Ok(());
        }

        for article in &articles {
            summary.articles_seen += 1;
            if self.sent.is_delivered(&article.canonical_link) {
                debug!(link = %article.canonical_link, "Already delivered; skipping");
                summary.skipped_duplicate += 1;
                continue;
            }
            if let Some(published) = article.published {
                if !self.window.contains(published) {
                    debug!(link = %article.canonical_link, %published, "Outside the date window; skipping");
                    summary.skipped_date += 1;
                    continue;
                }
            }
            self.deliver(source, article, summary).await;
        }
        Ok(())
    }

    /// Attempt delivery of one article, marking and persisting on success.
    async fn deliver(&mut self, source: &SourceConfig, article: &Article, summary: &mut RunSummary) {
        let image_url = self.validated_image(source, article).await;
        let message = telegram::format_article(article);

        if self.dry_run {
            info!(
                source = %source.name,
                link = %article.canonical_link,
                image = image_url.as_deref().unwrap_or("none"),
                "Dry run: would deliver"
            );
            return;
        }

        info!(source = %source.name, headline = %article.headline, "Delivering article");
        match self.telegram.send_article(&message, image_url.as_deref()).await {
            Ok(()) => {
                self.sent.mark_delivered(&article.canonical_link);
                // Persist immediately so a crash loses at most the in-flight
                // article, never re-sends a delivered one.
                if let Err(e) = self.sent.persist() {
                    error!(error = %e, "Failed to persist sent state after delivery");
                }
                summary.delivered += 1;
            }
            Err(e) => {
                // Not marked delivered: the article stays eligible next run.
                warn!(link = %article.canonical_link, error = %e, "Delivery abandoned");
                summary.delivery_failures += 1;
            }
        }
        tokio::time::sleep(self.pacing).await;
    }

    /// Resolve and validate the article's image, fetching the article page
    /// for reader sources (their listing render carries no image).
    async fn validated_image(&mut self, source: &SourceConfig, article: &Article) -> Option<String> {
        let candidate = match (&article.image_url, &source.kind) {
            (Some(url), _) => Some(url.clone()),
            (None, SourceKind::Reader(_)) => {
                self.article_page_image(&article.canonical_link).await
            }
            (None, _) => None,
        };
        let candidate = candidate?;
        images::resolve_validated(&self.http, &candidate, source.kind.allowed_image_domains()).await
    }

    /// `og:image` or the first `<img>` of an article page.
    async fn article_page_image(&mut self, url: &str) -> Option<String> {
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(e) => {
                debug!(%url, error = %e, "Could not fetch article page for an image");
                return None;
            }
        };
        let base = url::Url::parse(url).ok()?;
        let document = scraper::Html::parse_document(&html);

        let og = scraper::Selector::parse(r#"meta[property="og:image"]"#).ok()?;
        if let Some(content) = document
            .select(&og)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            return base.join(content.trim()).ok().map(|u| u.to_string());
        }
        let img = scraper::Selector::parse("img[src]").ok()?;
        document
            .select(&img)
            .next()
            .and_then(|el| el.value().attr("src"))
            .and_then(|src| base.join(src.trim()).ok())
            .map(|u| u.to_string())
    }

    /// Fetch a publisher page, feeding the persisted failure tracker.
    ///
    /// This is the pipeline's one hidden side channel: every outcome mutates
    /// the counter file, and crossing the threshold fires the operator alert
    /// right here.
    pub async fn fetch_page(&mut self, url: &str) -> std::result::Result<String, FetchError> {
        match fetch::fetch_text(&self.http, url, FETCH_TIMEOUT, &self.retry).await {
            Ok(body) => {
                if let Err(e) = self.failures.record_success() {
                    error!(error = %e, "Failed to persist failure counter");
                }
                Ok(body)
            }
            Err(e) => {
                match self.failures.record_failure() {
                    Ok(true) => {
                        self.telegram
                            .send_alert(&format!(
                                "⚠️ {} consecutive fetch failures; latest: {}",
                                crate::state::FAILURE_ALERT_THRESHOLD,
                                e
                            ))
                            .await;
                    }
                    Ok(false) => {}
                    Err(persist_err) => {
                        error!(error = %persist_err, "Failed to persist failure counter")
                    }
                }
                Err(e)
            }
        }
    }
}
