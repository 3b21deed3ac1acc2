//! Telegram delivery: MarkdownV2 formatting and the Bot API client.
//!
//! Each article becomes one message with a fixed layout: bolded headline,
//! description, a localized "read the full article" link, and the channel
//! attribution line, separated by blank lines. The photo variant of the Bot
//! API caps captions at 1024 characters while plain messages allow 4096, so
//! the formatter computes both variants independently — truncation only ever
//! shortens the description, never the scaffolding around it.
//!
//! Delivery is photo-first with a text fallback. Send calls are not
//! idempotent, so they do not reuse the fetch module's backoff; the only
//! retried condition is HTTP 429, sleeping exactly the server-specified
//! number of seconds.

use crate::error::Error;
use crate::models::Article;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Characters with reserved meaning in Telegram MarkdownV2.
const SPECIAL: &str = r"_*[]()~`>#+-=|{}.!\";

/// Caption limit for `sendPhoto`.
pub const CAPTION_LIMIT: usize = 1024;
/// Text limit for `sendMessage`.
pub const BODY_LIMIT: usize = 4096;
/// Below this many remaining characters, a truncated description is omitted
/// entirely rather than showing a couple of dangling letters.
const MIN_DESCRIPTION_CHARS: usize = 16;
/// Attempts per send call; only 429 responses are retried.
const SEND_ATTEMPTS: usize = 3;

const READ_MORE_LABEL: &str = "Lire l’article complet";
const ATTRIBUTION: &str = "@MorrocanFinancialNews";

/// Escape every MarkdownV2-special character in `text`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Insert a line break after the first `":"` of a headline. Feed sources
/// publish long compound titles ("MASI: la semaine en bref") that read
/// better split across two lines.
fn break_after_colon(headline: &str) -> String {
    match headline.find(':') {
        Some(pos) => {
            let head = headline[..pos].trim_end();
            let tail = headline[pos + 1..].trim_start();
            if tail.is_empty() {
                head.to_string()
            } else {
                format!("{head}:\n{tail}")
            }
        }
        None => headline.to_string(),
    }
}

/// The two independently budgeted renderings of one article.
#[derive(Debug, Clone)]
pub struct MessageText {
    /// Photo-caption variant, at most [`CAPTION_LIMIT`] characters.
    pub caption: String,
    /// Plain-message variant, at most [`BODY_LIMIT`] characters.
    pub body: String,
}

/// Render an article into both message variants.
pub fn format_article(article: &Article) -> MessageText {
    let headline = format!("*{}*", escape(&break_after_colon(&article.headline)));
    let link_line = format!("[{}]({})", READ_MORE_LABEL, escape(&article.canonical_link));
    let description = escape(article.description.trim());

    MessageText {
        caption: compose(&headline, &description, &link_line, CAPTION_LIMIT),
        body: compose(&headline, &description, &link_line, BODY_LIMIT),
    }
}

/// Assemble the fixed layout, shrinking only the description to fit `limit`.
///
/// An empty description disappears along with its surrounding blank lines.
/// If the scaffolding leaves fewer than [`MIN_DESCRIPTION_CHARS`] characters
/// of room, the description is dropped rather than truncated to a stub.
fn compose(headline: &str, description: &str, link_line: &str, limit: usize) -> String {
    let join = |desc: &str| -> String {
        let mut parts: Vec<&str> = vec![headline];
        if !desc.is_empty() {
            parts.push(desc);
        }
        parts.push(link_line);
        parts.push(ATTRIBUTION);
        parts.join("\n\n")
    };

    let full = join(description);
    if full.chars().count() <= limit {
        return full;
    }

    // Room left for the description once the scaffolding is accounted for,
    // reserving one character for the ellipsis marker.
    let overhead = join("").chars().count() + 2; // "\n\n" separator pair around the description
    let budget = limit.saturating_sub(overhead).saturating_sub(1);
    if budget < MIN_DESCRIPTION_CHARS {
        let bare = join("");
        if bare.chars().count() <= limit {
            return bare;
        }
        // Pathological headline: even the scaffolding alone overflows.
        // Shrink the headline as a last resort so the API never sees an
        // oversized caption; the `*` bold wrapper is re-closed by hand.
        let tail = format!("\n\n{link_line}\n\n{ATTRIBUTION}");
        let head_budget = limit
            .saturating_sub(tail.chars().count())
            .saturating_sub(2); // "…" plus the closing "*"
        let mut head: String = headline.chars().take(head_budget).collect();
        if head.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1 {
            head.pop();
        }
        return format!("{head}…*{tail}");
    }

    let mut truncated: String = description.chars().take(budget).collect();
    // Never cut an escape pair in half: a dangling backslash breaks parsing.
    if truncated.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1 {
        truncated.pop();
    }
    join(&format!("{truncated}…"))
}

/// Thin client over the Telegram Bot API, holding the channel identifiers.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    chat_id: String,
    alert_chat_id: Option<String>,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("chat_id", &self.chat_id)
            .field("alert_chat_id", &self.alert_chat_id)
            .finish()
    }
}

impl TelegramClient {
    pub fn new(
        http: reqwest::Client,
        token: String,
        chat_id: String,
        alert_chat_id: Option<String>,
    ) -> Result<Self, Error> {
        if token.trim().is_empty() {
            return Err(Error::Config("empty Telegram bot token".to_string()));
        }
        if chat_id.trim().is_empty() {
            return Err(Error::Config("empty Telegram chat id".to_string()));
        }
        Ok(Self {
            http,
            token,
            chat_id,
            alert_chat_id,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    /// POST one Bot API call, honoring 429 `retry_after` hints literally.
    async fn call(&self, method: &str, payload: &Value) -> Result<(), Error> {
        for attempt in 1..=SEND_ATTEMPTS {
            let response = self
                .http
                .post(self.endpoint(method))
                .timeout(Duration::from_secs(10))
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::Delivery(format!("{method}: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let body: Value = response.json().await.unwrap_or(Value::Null);
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < SEND_ATTEMPTS {
                let wait = body
                    .pointer("/parameters/retry_after")
                    .and_then(Value::as_u64)
                    .unwrap_or(5);
                warn!(method, attempt, wait_secs = wait, "Rate limited; sleeping");
                sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let reason = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(Error::Delivery(format!("{method}: {status}: {reason}")));
        }
        Err(Error::Delivery(format!("{method}: rate limited on every attempt")))
    }

    /// Deliver one article: photo with caption when an image survived
    /// validation, otherwise (or on photo failure) a plain text message.
    #[instrument(level = "info", skip_all, fields(chat = %self.chat_id))]
    pub async fn send_article(
        &self,
        message: &MessageText,
        image_url: Option<&str>,
    ) -> Result<(), Error> {
        if let Some(photo) = image_url {
            let payload = json!({
                "chat_id": self.chat_id,
                "photo": photo,
                "caption": message.caption,
                "parse_mode": "MarkdownV2",
            });
            match self.call("sendPhoto", &payload).await {
                Ok(()) => {
                    debug!("Sent photo message");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "sendPhoto failed; falling back to text");
                }
            }
        }

        let payload = json!({
            "chat_id": self.chat_id,
            "text": message.body,
            "parse_mode": "MarkdownV2",
            "disable_web_page_preview": true,
        });
        self.call("sendMessage", &payload).await?;
        debug!("Sent text message");
        Ok(())
    }

    /// Best-effort operator alert to the dedicated alert channel. Alert
    /// failures are logged and swallowed, never propagated.
    #[instrument(level = "info", skip_all)]
    pub async fn send_alert(&self, text: &str) {
        let Some(alert_chat) = &self.alert_chat_id else {
            warn!("No alert channel configured; alert dropped");
            return;
        };
        let payload = json!({
            "chat_id": alert_chat,
            "text": text,
            "disable_web_page_preview": true,
        });
        match self.call("sendMessage", &payload).await {
            Ok(()) => info!("Operator alert sent"),
            Err(e) => warn!(error = %e, "Failed to send operator alert"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(description: &str) -> Article {
        Article {
            source_name: "financesnews".to_string(),
            headline: "Budget 2026: les grandes lignes".to_string(),
            description: description.to_string(),
            canonical_link: "https://site.tld/a/123".to_string(),
            image_url: None,
            published: None,
        }
    }

    #[test]
    fn test_escape_specials() {
        assert_eq!(escape("a_b*c[d]"), r"a\_b\*c\[d\]");
        assert_eq!(escape("1.5% (est.)"), r"1\.5% \(est\.\)");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_break_after_colon() {
        assert_eq!(
            break_after_colon("MASI: la semaine en bref"),
            "MASI:\nla semaine en bref"
        );
        assert_eq!(break_after_colon("Sans deux-points"), "Sans deux-points");
    }

    #[test]
    fn test_layout_with_description() {
        let msg = format_article(&sample("Le gouvernement présente son projet"));
        assert!(msg.body.starts_with("*Budget 2026:\nles grandes lignes*"));
        assert!(msg.body.contains("\n\nLe gouvernement présente son projet\n\n"));
        assert!(msg.body.contains(r"[Lire l’article complet](https://site\.tld/a/123)"));
        assert!(msg.body.ends_with(ATTRIBUTION));
    }

    #[test]
    fn test_layout_empty_description_collapses() {
        let msg = format_article(&sample(""));
        // No dangling blank gap where the description would have been.
        assert!(!msg.body.contains("\n\n\n"));
        let blocks: Vec<&str> = msg.body.split("\n\n").collect();
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_caption_truncation_boundary() {
        let long_description = "mot ".repeat(400); // ~1600 chars
        let msg = format_article(&sample(&long_description));

        assert!(msg.caption.chars().count() <= CAPTION_LIMIT);
        // Scaffolding survives truncation intact.
        assert!(msg.caption.starts_with("*Budget 2026:"));
        assert!(msg.caption.contains("Lire l’article complet"));
        assert!(msg.caption.ends_with(ATTRIBUTION));
        // The description block ends with the ellipsis marker.
        assert!(msg.caption.contains('…'));
        // Body budget (4096) fits this input untouched: no marker there.
        assert!(!msg.body.contains('…'));
        assert!(msg.body.contains(long_description.trim()));
    }

    #[test]
    fn test_caption_omits_description_when_no_room() {
        // A headline so long the caption budget leaves no useful room for a
        // description at all.
        let mut article = sample("Une description parfaitement raisonnable");
        article.headline = "x".repeat(940);
        let msg = format_article(&article);
        assert!(msg.caption.chars().count() <= CAPTION_LIMIT);
        assert!(!msg.caption.contains("raisonnable"));
        // The body variant keeps the description.
        assert!(msg.body.contains("raisonnable"));
    }

    #[test]
    fn test_oversized_headline_is_hard_capped() {
        // Even when the headline alone blows the budget, the rendered
        // caption must respect the limit, keep the link and attribution,
        // and leave the bold span closed.
        let mut article = sample("");
        article.headline = "x".repeat(2000);
        let msg = format_article(&article);
        assert!(msg.caption.chars().count() <= CAPTION_LIMIT);
        assert!(msg.caption.contains("…*"));
        assert!(msg.caption.contains("Lire l’article complet"));
        assert!(msg.caption.ends_with(ATTRIBUTION));
        // The body budget (4096) fits this headline untouched.
        assert!(msg.body.contains(&article.headline));
    }

    #[test]
    fn test_truncation_never_splits_an_escape_pair() {
        // Escapes to "a\." repeated: every other character is a backslash.
        let description = "a.".repeat(600);
        let msg = format_article(&sample(&description));
        assert!(msg.caption.chars().count() <= CAPTION_LIMIT);
        assert!(!msg.caption.contains("\\…"));
    }

    #[test]
    fn test_caption_exact_budget_math() {
        // Construct a description that just barely overflows the caption.
        let msg_empty = format_article(&sample(""));
        let overhead = msg_empty.caption.chars().count() + 2;
        let description = "d".repeat(CAPTION_LIMIT - overhead + 10);
        let msg = format_article(&sample(&description));
        assert!(msg.caption.chars().count() <= CAPTION_LIMIT);
        assert!(msg.caption.contains('…'));
    }
}
