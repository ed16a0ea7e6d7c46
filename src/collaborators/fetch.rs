//! HTTP fetcher with a plain-text article extractor.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::error::CollaboratorError;

use super::{ContentFetcher, FetchedContent};

const USER_AGENT: &str = "news-forge/0.1";

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

static NON_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<noscript[^>]*>.*?</noscript>|<!--.*?-->",
    )
    .expect("valid non-content regex")
});

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("valid paragraph regex"));

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").expect("valid body regex"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid tag regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn clean_fragment(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, " ");
    let text = decode_entities(&text);
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Extract `(title, text)` from an HTML page.
///
/// Paragraph text is preferred; pages without `<p>` elements fall back to
/// the whole body with tags stripped.
pub fn extract_article(html: &str) -> (String, String) {
    let title = TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| clean_fragment(m.as_str()))
        .unwrap_or_default();

    let stripped = NON_CONTENT_RE.replace_all(html, " ");

    let paragraphs: Vec<String> = PARAGRAPH_RE
        .captures_iter(&stripped)
        .filter_map(|c| c.get(1))
        .map(|m| clean_fragment(m.as_str()))
        .filter(|p| !p.is_empty())
        .collect();

    let content = if paragraphs.is_empty() {
        let body = BODY_RE
            .captures(&stripped)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&stripped);
        clean_fragment(body)
    } else {
        paragraphs.join("\n\n")
    };

    (title, content)
}

/// Downloads a page over HTTP and extracts its article text.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CollaboratorError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CollaboratorError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, CollaboratorError> {
        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(CollaboratorError::Upstream {
                status: status.as_u16(),
                message: format!("GET {} returned {}: {}", url, status, snippet),
            });
        }

        let html = response.text().await?;
        let (title, content) = extract_article(&html);
        if content.trim().is_empty() {
            return Err(CollaboratorError::NoContent(format!(
                "no article text found at {}",
                url
            )));
        }

        debug!(url = %url, words = content.split_whitespace().count(), "Fetched article");
        Ok(FetchedContent::new(url, title, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_paragraphs_and_title() {
        let html = r#"
            <html><head><title>Markets &amp; Money</title>
            <style>p { color: red; }</style></head>
            <body>
              <nav>Home | World</nav>
              <p class="lead">Stocks <b>rallied</b> today.</p>
              <script>var p = "<p>not this</p>";</script>
              <p>Analysts said the&nbsp;rise was broad.</p>
            </body></html>
        "#;

        let (title, content) = extract_article(html);
        assert_eq!(title, "Markets & Money");
        assert_eq!(
            content,
            "Stocks rallied today.\n\nAnalysts said the rise was broad."
        );
    }

    #[test]
    fn test_extract_falls_back_to_body_text() {
        let html = "<html><body><div>Plain <span>body</span> text</div></body></html>";
        let (title, content) = extract_article(html);
        assert_eq!(title, "");
        assert_eq!(content, "Plain body text");
    }

    #[test]
    fn test_extract_ignores_comments_and_empty_paragraphs() {
        let html = "<p>  </p><!-- <p>hidden</p> --><p>Visible</p>";
        let (_, content) = extract_article(html);
        assert_eq!(content, "Visible");
    }

    #[test]
    fn test_paragraph_regex_skips_similar_tags() {
        let html = "<pre>code</pre><param>x</param><p>Real</p>";
        let (_, content) = extract_article(html);
        assert_eq!(content, "Real");
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
