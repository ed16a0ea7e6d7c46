//! Deterministic local collaborators.
//!
//! Keyword and template heuristics that need no network. They back the
//! pipeline when no remote service is configured and serve as the fallback
//! when a remote analyzer fails.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::CollaboratorError;

use super::{
    ArtifactPublisher, AuthenticityVerifier, ContentAnalyzer, Improvement, PublishArtifact,
    RelevanceFilter, RelevanceVerdict, Script, ScriptImprover, ScriptRequest, ScriptWriter,
    Sentiment, SentimentLabel, Verification,
};

const RELEVANCE_KEYWORDS: [&str; 5] = ["news", "breaking", "update", "report", "announcement"];
const RELEVANCE_KEYWORD_POINTS: f64 = 20.0;
const RELEVANCE_LENGTH_POINTS: f64 = 30.0;
const RELEVANCE_LONG_WORDS: usize = 100;

/// Default relevance cut-off on the 0-100 scale.
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 50.0;

const SOURCE_INDICATORS: [&str; 4] = ["according to", "reported by", "confirmed", "official"];
const AUTHENTICITY_BASE: f64 = 70.0;

/// Characters of raw content used when a script has no summary.
const SCRIPT_EXCERPT_CHARS: usize = 200;

const CATEGORY_KEYWORDS: [(&str, &[&str]); 7] = [
    (
        "politics",
        &["election", "government", "minister", "parliament", "president", "policy"],
    ),
    (
        "business",
        &["market", "markets", "stock", "economy", "company", "finance", "bank", "trade"],
    ),
    (
        "technology",
        &["technology", "software", "ai", "digital", "tech", "internet"],
    ),
    (
        "sports",
        &["match", "tournament", "team", "player", "league", "championship"],
    ),
    (
        "health",
        &["health", "hospital", "disease", "vaccine", "medical", "doctors"],
    ),
    (
        "science",
        &["research", "scientists", "study", "space", "climate"],
    ),
    (
        "world",
        &["international", "global", "nations", "war", "border", "embassy"],
    ),
];

const POSITIVE_WORDS: [&str; 9] = [
    "growth", "success", "win", "improve", "gain", "positive", "celebrate", "record", "rise",
];
const NEGATIVE_WORDS: [&str; 10] = [
    "crisis", "death", "loss", "decline", "attack", "fail", "fall", "war", "disaster",
    "devastating",
];

fn lowercase_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Leading sentences of `text` within `max_words` words. A first sentence
/// longer than the budget is cut at the budget and ends with "...".
pub fn leading_summary(text: &str, max_words: usize) -> String {
    let mut summary: Vec<&str> = Vec::new();
    let mut used = 0;

    for sentence in text
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let words = sentence.split_whitespace().count();
        if used + words > max_words {
            if summary.is_empty() {
                let cut: Vec<&str> = sentence.split_whitespace().take(max_words).collect();
                return format!("{}...", cut.join(" "));
            }
            break;
        }
        used += words;
        summary.push(sentence);
    }

    summary.join(" ")
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Scores relevance by news keywords and article length.
#[derive(Debug, Clone)]
pub struct KeywordRelevanceFilter {
    threshold: f64,
}

impl Default for KeywordRelevanceFilter {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }
}

impl KeywordRelevanceFilter {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn score(&self, content: &str, title: &str) -> f64 {
        let text = format!("{} {}", title, content).to_lowercase();
        let keyword_points = RELEVANCE_KEYWORDS
            .iter()
            .filter(|keyword| text.contains(*keyword))
            .count() as f64
            * RELEVANCE_KEYWORD_POINTS;

        let length_points = if content.split_whitespace().count() > RELEVANCE_LONG_WORDS {
            RELEVANCE_LENGTH_POINTS
        } else {
            0.0
        };

        (keyword_points + length_points).min(100.0)
    }
}

#[async_trait]
impl RelevanceFilter for KeywordRelevanceFilter {
    async fn filter_relevance(
        &self,
        content: &str,
        title: &str,
    ) -> Result<RelevanceVerdict, CollaboratorError> {
        if content.trim().is_empty() {
            return Err(CollaboratorError::NoContent(
                "no content to filter".to_string(),
            ));
        }

        let score = self.score(content, title);
        Ok(RelevanceVerdict {
            is_relevant: score >= self.threshold,
            score,
        })
    }
}

/// Scores authenticity from attribution phrases and article length.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicVerifier;

impl HeuristicVerifier {
    pub fn score(&self, content: &str) -> f64 {
        let lower = content.to_lowercase();
        let indicators = SOURCE_INDICATORS
            .iter()
            .filter(|indicator| lower.contains(*indicator))
            .count() as f64;

        let mut score = AUTHENTICITY_BASE + (indicators * 5.0).min(20.0);
        if content.split_whitespace().count() > 200 {
            score += 10.0;
        }
        score.min(100.0)
    }
}

#[async_trait]
impl AuthenticityVerifier for HeuristicVerifier {
    async fn verify_authenticity(
        &self,
        content: &str,
        _title: &str,
        _url: &str,
    ) -> Result<Verification, CollaboratorError> {
        if content.trim().is_empty() {
            return Err(CollaboratorError::NoContent(
                "no content to verify".to_string(),
            ));
        }
        Ok(Verification::new(self.score(content)))
    }
}

/// Fills the "Breaking News" script template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateScriptWriter;

#[async_trait]
impl ScriptWriter for TemplateScriptWriter {
    async fn generate_script(&self, request: &ScriptRequest) -> Result<Script, CollaboratorError> {
        if request.title.trim().is_empty() && request.content.trim().is_empty() {
            return Err(CollaboratorError::NoContent(
                "no content provided".to_string(),
            ));
        }

        let body = match request.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(summary) => summary.to_string(),
            None => format!("{}...", excerpt(&request.content, SCRIPT_EXCERPT_CHARS)),
        };

        Ok(Script::new(format!(
            "Breaking News: {}\n\n{}\n\nStay tuned for more updates.",
            request.title, body
        )))
    }
}

/// Keyword categories, lexicon sentiment and leading-sentence summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAnalyzer;

impl LocalAnalyzer {
    pub fn categories(&self, content: &str) -> Vec<String> {
        let words = lowercase_words(content);
        let mut hits: Vec<(&str, usize)> = CATEGORY_KEYWORDS
            .iter()
            .map(|(name, keywords)| {
                let count = words
                    .iter()
                    .filter(|w| keywords.contains(&w.as_str()))
                    .count();
                (*name, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        if hits.is_empty() {
            return vec!["general".to_string()];
        }

        // Stable sort keeps declaration order on ties.
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        hits.into_iter()
            .take(3)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn sentiment(&self, content: &str) -> Sentiment {
        let words = lowercase_words(content);
        let positive = words
            .iter()
            .filter(|w| POSITIVE_WORDS.contains(&w.as_str()))
            .count() as f64;
        let negative = words
            .iter()
            .filter(|w| NEGATIVE_WORDS.contains(&w.as_str()))
            .count() as f64;

        let polarity = if positive + negative > 0.0 {
            (positive - negative) / (positive + negative)
        } else {
            0.0
        };

        let label = if polarity > 0.1 {
            SentimentLabel::Positive
        } else if polarity < -0.1 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        Sentiment { label, polarity }
    }
}

#[async_trait]
impl ContentAnalyzer for LocalAnalyzer {
    async fn classify(&self, content: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.categories(content))
    }

    async fn analyze_sentiment(&self, content: &str) -> Result<Sentiment, CollaboratorError> {
        Ok(self.sentiment(content))
    }

    async fn summarize(
        &self,
        content: &str,
        max_length: usize,
    ) -> Result<String, CollaboratorError> {
        Ok(leading_summary(content, max_length))
    }
}

/// Re-summarizes the source so the next script is built from tighter guidance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryImprover;

#[async_trait]
impl ScriptImprover for SummaryImprover {
    async fn improve(
        &self,
        content: &str,
        _script: &Script,
        max_length: usize,
    ) -> Result<Improvement, CollaboratorError> {
        let summary = leading_summary(content, max_length);
        if summary.is_empty() {
            return Err(CollaboratorError::NoContent(
                "nothing to summarize".to_string(),
            ));
        }
        Ok(Improvement { summary })
    }
}

/// Logs each push instead of calling a video service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl ArtifactPublisher for LogPublisher {
    async fn push_artifact(
        &self,
        channel: &str,
        avatar: &str,
        artifact: &PublishArtifact,
    ) -> Result<String, CollaboratorError> {
        let push_id = format!("push-{}", Uuid::new_v4());
        info!(
            channel = %channel,
            avatar = %avatar,
            push_id = %push_id,
            title = %artifact.title,
            "Artifact published"
        );
        Ok(push_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[tokio::test]
    async fn test_relevance_keywords_and_length() {
        let filter = KeywordRelevanceFilter::default();

        let verdict = filter
            .filter_relevance("A short report with an update.", "Breaking news")
            .await
            .unwrap();
        // news, breaking, update, report
        assert!((verdict.score - 80.0).abs() < f64::EPSILON);
        assert!(verdict.is_relevant);

        let verdict = filter
            .filter_relevance("Recipe for lemon cake.", "Dessert")
            .await
            .unwrap();
        assert!((verdict.score - 0.0).abs() < f64::EPSILON);
        assert!(!verdict.is_relevant);

        let long = format!("{} news", words(120));
        let verdict = filter.filter_relevance(&long, "").await.unwrap();
        assert!((verdict.score - 50.0).abs() < f64::EPSILON);
        assert!(verdict.is_relevant);
    }

    #[tokio::test]
    async fn test_relevance_rejects_empty_content() {
        let filter = KeywordRelevanceFilter::default();
        assert!(filter.filter_relevance("  ", "title").await.is_err());
    }

    #[tokio::test]
    async fn test_verifier_scoring() {
        let verifier = HeuristicVerifier;

        let plain = verifier
            .verify_authenticity("Something happened.", "t", "u")
            .await
            .unwrap();
        assert!((plain.authenticity_score - 70.0).abs() < f64::EPSILON);

        let attributed = verifier
            .verify_authenticity(
                &format!(
                    "According to officials, it was confirmed and reported by wires. {}",
                    words(210)
                ),
                "t",
                "u",
            )
            .await
            .unwrap();
        // 70 + 4 * 5 + 10
        assert!((attributed.authenticity_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(attributed.credibility, super::super::Credibility::High);
    }

    #[tokio::test]
    async fn test_script_template() {
        let writer = TemplateScriptWriter;

        let script = writer
            .generate_script(&ScriptRequest {
                title: "Storm hits coast".to_string(),
                content: "x".repeat(500),
                authenticity_score: 80.0,
                summary: None,
            })
            .await
            .unwrap();
        assert!(script.text.starts_with("Breaking News: Storm hits coast\n\n"));
        assert!(script.text.ends_with("Stay tuned for more updates."));
        assert!(script.text.contains(&format!("{}...", "x".repeat(200))));

        let script = writer
            .generate_script(&ScriptRequest {
                title: "Storm hits coast".to_string(),
                content: "ignored".to_string(),
                authenticity_score: 80.0,
                summary: Some("Winds reached 150 km/h.".to_string()),
            })
            .await
            .unwrap();
        assert!(script.text.contains("Winds reached 150 km/h."));
        assert!(!script.text.contains("ignored"));

        let err = writer
            .generate_script(&ScriptRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::NoContent(_)));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("abc", 10), "abc");
    }

    #[test]
    fn test_leading_summary() {
        let text = "First sentence here. Second one follows! Third is a question? Fourth.";
        assert_eq!(leading_summary(text, 3), "First sentence here.");
        assert_eq!(
            leading_summary(text, 6),
            "First sentence here. Second one follows!"
        );
        assert_eq!(leading_summary("one two three four five", 2), "one two...");
        assert_eq!(leading_summary("", 10), "");
    }

    #[test]
    fn test_local_categories() {
        let analyzer = LocalAnalyzer;
        let categories =
            analyzer.categories("The stock market and the economy moved as the bank raised rates. The government responded.");
        assert_eq!(categories[0], "business");
        assert!(categories.contains(&"politics".to_string()));

        assert_eq!(analyzer.categories("Nothing to see."), vec!["general"]);
    }

    #[test]
    fn test_local_sentiment() {
        let analyzer = LocalAnalyzer;
        assert_eq!(
            analyzer.sentiment("Record growth and success.").label,
            SentimentLabel::Positive
        );
        assert_eq!(
            analyzer.sentiment("A devastating disaster and crisis.").label,
            SentimentLabel::Negative
        );
        let neutral = analyzer.sentiment("The committee met on Tuesday.");
        assert_eq!(neutral.label, SentimentLabel::Neutral);
        assert!((neutral.polarity - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_improver_summarizes_content() {
        let improvement = SummaryImprover
            .improve("Alpha beta. Gamma delta.", &Script::default(), 2)
            .await
            .unwrap();
        assert_eq!(improvement.summary, "Alpha beta.");

        assert!(SummaryImprover
            .improve("", &Script::default(), 10)
            .await
            .is_err());
    }
}
