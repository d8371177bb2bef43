//! Keyword extraction and excerpt search.
//!
//! All offsets are in characters, not bytes, so excerpts never split a
//! multi-byte character.

use crate::storage::Record;
use serde::Serialize;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "what", "when", "where", "why", "how", "who",
];

/// Characters of context kept on each side of a match.
const CONTEXT_WINDOW: usize = 100;

/// Characters kept before / after a match in a saved record.
const RECORD_LEAD: usize = 50;
const RECORD_TAIL: usize = 100;

/// Keywords at least this long are reported with high confidence.
const HIGH_CONFIDENCE_MIN_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// Whitespace tokens of the lowercased question that are longer than three
/// characters and not stop words, longest first. Equal lengths keep their
/// order of appearance.
pub fn extract(question: &str) -> Vec<String> {
    let lowered = question.to_lowercase();
    let mut keywords: Vec<String> = lowered
        .split_whitespace()
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect();
    keywords.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    keywords
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Char index of the first case-insensitive occurrence of `needle`.
fn find_folded(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().map(fold).collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.iter().zip(&needle).all(|(h, n)| fold(*h) == *n))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextHit {
    pub keyword: String,
    pub excerpt: String,
    pub confidence: Confidence,
}

/// Find the first keyword of `question` in `context` and cut a window
/// around it, trimmed to sentence boundaries on the truncated sides.
pub fn search_context(question: &str, context: &str) -> Option<ContextHit> {
    if context.trim().is_empty() {
        return None;
    }
    let chars: Vec<char> = context.chars().collect();

    extract(question).into_iter().find_map(|keyword| {
        let at = find_folded(&chars, &keyword)?;
        let keyword_len = keyword.chars().count();

        let mut start = at.saturating_sub(CONTEXT_WINDOW);
        let mut end = (at + keyword_len + CONTEXT_WINDOW).min(chars.len());

        // the boundary must not cut into the keyword itself
        if start > 0 {
            if let Some(dot) = chars[start..at].iter().position(|c| *c == '.') {
                if dot > 0 {
                    start += dot + 1;
                }
            }
        }
        if end < chars.len() {
            let keyword_end = at + keyword_len;
            if let Some(dot) = chars[keyword_end..end].iter().rposition(|c| *c == '.') {
                end = keyword_end + dot + 1;
            }
        }

        let excerpt: String = chars[start..end].iter().collect();
        let confidence = if keyword_len >= HIGH_CONFIDENCE_MIN_LEN {
            Confidence::High
        } else {
            Confidence::Medium
        };

        Some(ContextHit {
            keyword,
            excerpt: excerpt.trim().to_string(),
            confidence,
        })
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordHit {
    pub keyword: String,
    pub excerpt: String,
    /// The record's text artifact, or its key when it has none.
    pub filename: String,
    /// `savedAt`, or `"unknown"`.
    pub timestamp: String,
}

/// Scan records in stored order; within each record try keywords longest
/// first. The first hit wins.
pub fn search_records<I>(question: &str, records: I) -> Option<RecordHit>
where
    I: IntoIterator<Item = Record>,
{
    let keywords = extract(question);
    if keywords.is_empty() {
        return None;
    }

    records.into_iter().find_map(|record| {
        let body = record.data.body().filter(|b| !b.is_empty())?;
        let chars: Vec<char> = body.chars().collect();

        keywords.iter().find_map(|keyword| {
            let at = find_folded(&chars, keyword)?;
            let start = at.saturating_sub(RECORD_LEAD);
            let end = (at + keyword.chars().count() + RECORD_TAIL).min(chars.len());
            let excerpt: String = chars[start..end].iter().collect();

            Some(RecordHit {
                keyword: keyword.clone(),
                excerpt: excerpt.trim().to_string(),
                filename: record
                    .data
                    .text_file
                    .clone()
                    .unwrap_or_else(|| record.id.clone()),
                timestamp: record
                    .data
                    .saved_at
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordData;

    fn record(key: &str, text: &str) -> Record {
        Record::new(
            key,
            RecordData {
                text: Some(text.to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_extract_orders_longest_first() {
        assert_eq!(
            extract("What is the weather forecast today"),
            vec!["forecast", "weather", "today"]
        );
        // stable among equal lengths
        assert_eq!(extract("rain snow hail"), vec!["rain", "snow", "hail"]);
        assert!(extract("who is it").is_empty());
    }

    #[test]
    fn test_longest_keyword_and_sentence_trim() {
        let context = "Yesterday was sunny and warm across the whole region, with light winds \
                       from the west all afternoon. The forecast calls for rain tomorrow, so \
                       bring an umbrella. After that the weekend looks dry and pleasant for \
                       everyone planning to be outdoors.";

        let hit = search_context("What is the weather forecast today", context).unwrap();
        assert_eq!(hit.keyword, "forecast");
        assert_eq!(hit.confidence, Confidence::High);
        assert_eq!(
            hit.excerpt,
            "The forecast calls for rain tomorrow, so bring an umbrella."
        );
    }

    #[test]
    fn test_short_context_is_returned_whole() {
        let hit = search_context("any news about rain", "Rain later.").unwrap();
        assert_eq!(hit.keyword, "rain");
        assert_eq!(hit.confidence, Confidence::Medium);
        assert_eq!(hit.excerpt, "Rain later.");

        assert!(search_context("any news about rain", "   ").is_none());
        assert!(search_context("budget", "nothing relevant").is_none());
    }

    #[test]
    fn test_trim_never_cuts_the_keyword() {
        let filler = "x".repeat(120);
        let context = format!("{} budget. and more words {}", filler, filler);
        let hit = search_context("budget", &context).unwrap();
        assert!(hit.excerpt.contains("budget"));
    }

    #[test]
    fn test_records_scanned_in_order() {
        let records = vec![
            record("first.txt", "we discussed the roadmap"),
            record("second.txt", "the roadmap and the budget"),
        ];

        let hit = search_records("what about the budget roadmap", records.clone()).unwrap();
        // first record wins even though the second matches a longer keyword
        assert_eq!(hit.filename, "first.txt");
        assert_eq!(hit.keyword, "roadmap");
        assert_eq!(hit.timestamp, "unknown");

        assert!(search_records("nothing matches here", records).is_none());
    }

    #[test]
    fn test_record_excerpt_window() {
        let text = format!("{}KEYWORD{}", "a".repeat(80), "b".repeat(150));
        let mut hit_record = record("live_1", &text);
        hit_record.data.text_file = Some("live.txt".to_string());
        hit_record.data.saved_at = Some("2025-01-01T00:00:00Z".to_string());

        let hit = search_records("keyword", vec![hit_record]).unwrap();
        assert_eq!(hit.filename, "live.txt");
        assert_eq!(hit.excerpt.chars().count(), 50 + 7 + 100);
        assert!(hit.excerpt.starts_with('a'));
        assert_eq!(hit.timestamp, "2025-01-01T00:00:00Z");
    }
}
