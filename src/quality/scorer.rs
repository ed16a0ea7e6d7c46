//! Sub-score computation for generated scripts.

use serde::{Deserialize, Serialize};

const EMOTIONAL_WORDS: [&str; 5] = [
    "shocking",
    "outrageous",
    "unbelievable",
    "devastating",
    "incredible",
];
const NEUTRAL_WORDS: [&str; 5] = ["according to", "reported", "stated", "confirmed", "announced"];

const ENGAGING_TITLE_WORDS: [&str; 6] = ["breaking", "urgent", "exclusive", "major", "crisis", "update"];
const CALL_TO_ACTION: [&str; 4] = ["stay tuned", "more updates", "follow for more", "breaking news"];
const TIME_INDICATORS: [&str; 5] = ["today", "yesterday", "this morning", "just now", "breaking"];

const ATTRIBUTION: [&str; 4] = ["according to", "source said", "reported by", "official statement"];
const OPINION_WORDS: [&str; 5] = ["i think", "in my opinion", "probably", "maybe", "could be"];
const FACT_WORDS: [&str; 5] = [
    "confirmed",
    "verified",
    "data shows",
    "research indicates",
    "according to",
];

/// The three sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub tone: f64,
    pub engagement: f64,
    pub quality: f64,
}

/// Everything a scorer may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub script: &'a str,
    /// Authenticity on the 0-100 scale.
    pub authenticity_score: f64,
}

/// Computes sub-scores for a script. Must be deterministic.
pub trait Scorer: Send + Sync {
    fn score(&self, input: &ScoringInput<'_>) -> SubScores;
}

fn count_present(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|phrase| text.contains(*phrase)).count()
}

/// Keyword heuristics over content, title and script.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn tone(&self, content: &str, script: &str) -> f64 {
        let content = content.to_lowercase();
        let emotional = count_present(&content, &EMOTIONAL_WORDS);
        let neutral = count_present(&content, &NEUTRAL_WORDS);

        let mut score: f64 = if neutral >= emotional + 2 {
            0.85
        } else if neutral >= emotional {
            0.7
        } else {
            0.4
        };

        if !script.is_empty() {
            let script = script.to_lowercase();
            if count_present(&script, &NEUTRAL_WORDS) >= count_present(&script, &EMOTIONAL_WORDS) {
                score += 0.1;
            } else {
                score -= 0.1;
            }
        }

        score.clamp(0.0, 1.0)
    }

    pub fn engagement(&self, title: &str, content: &str, script: &str) -> f64 {
        let mut score: f64 = 0.5;

        let words = content.split_whitespace().count();
        if words > 300 {
            score += 0.2;
        } else if words > 150 {
            score += 0.1;
        } else if words < 50 {
            score -= 0.2;
        }

        if !title.is_empty() {
            let engaging = count_present(&title.to_lowercase(), &ENGAGING_TITLE_WORDS);
            score += (engaging as f64 * 0.05).min(0.15);
        }

        if !script.is_empty() {
            let script_words = script.split_whitespace().count();
            if script_words > 50 {
                score += 0.15;
            } else if script_words > 20 {
                score += 0.1;
            }

            let cta = count_present(&script.to_lowercase(), &CALL_TO_ACTION);
            score += (cta as f64 * 0.05).min(0.1);
        }

        let fresh = count_present(&content.to_lowercase(), &TIME_INDICATORS);
        score += (fresh as f64 * 0.03).min(0.1);

        score.clamp(0.0, 1.0)
    }

    pub fn quality(&self, content: &str, script: &str, authenticity_score: f64) -> f64 {
        let mut score = 0.5 + (authenticity_score / 100.0) * 0.4;

        let sentences = content.split('.').filter(|s| !s.trim().is_empty()).count();
        if sentences > 8 {
            score += 0.15;
        } else if sentences > 4 {
            score += 0.1;
        }

        let lower = content.to_lowercase();
        score += (count_present(&lower, &ATTRIBUTION) as f64 * 0.05).min(0.15);

        let script_words = script.split_whitespace().count();
        if script_words > 30 {
            score += 0.1;
        } else if script_words > 15 {
            score += 0.05;
        }

        let opinions = count_present(&lower, &OPINION_WORDS);
        let facts = count_present(&lower, &FACT_WORDS);
        if facts > opinions {
            score += 0.1;
        } else if opinions > facts + 2 {
            score -= 0.1;
        }

        score.clamp(0.0, 1.0)
    }
}

impl Scorer for HeuristicScorer {
    fn score(&self, input: &ScoringInput<'_>) -> SubScores {
        SubScores {
            tone: self.tone(input.content, input.script),
            engagement: self.engagement(input.title, input.content, input.script),
            quality: self.quality(input.content, input.script, input.authenticity_score),
        }
    }
}
