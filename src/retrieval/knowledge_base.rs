//! Static question patterns and canned responses.
//!
//! Categories are checked in declaration order and the first category with
//! a trigger contained in the lowercased question wins. Triggers are plain
//! substrings, so `"hi"` also fires inside longer words.

use chrono::{DateTime, Local};
use rand::seq::IndexedRandom;
use serde::Serialize;

pub struct Category {
    pub name: &'static str,
    pub patterns: &'static [&'static str],
    /// May contain `{time}`, `{time_short}`, `{date}` or `{date_long}`.
    pub responses: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        name: "greetings",
        patterns: &["hello", "hi", "hey", "greetings"],
        responses: &[
            "Hello! I'm your Voice-to-Text assistant.",
            "Hi there! How can I help you today?",
            "Hey! Ready to transcribe some audio?",
        ],
    },
    Category {
        name: "identity",
        patterns: &["who are you", "what are you", "your name", "what is your name"],
        responses: &[
            "I'm your Voice-to-Text assistant, powered by Whisper AI technology.",
            "I'm a speech recognition assistant that can transcribe audio in real-time.",
            "You can call me Whisper AI! I convert speech to text.",
        ],
    },
    Category {
        name: "capabilities",
        patterns: &["what can you do", "how do you work", "features", "capabilities"],
        responses: &[
            "I can transcribe audio files, record live speech, save transcriptions, and answer basic questions.",
            "I work by converting speech to text using AI. You can upload audio files or speak directly.",
            "Features include: audio transcription, live recording, text saving, and Q&A about your transcriptions.",
        ],
    },
    Category {
        name: "time",
        patterns: &["time", "what time", "current time"],
        responses: &["The current time is {time}.", "It's {time_short} now."],
    },
    Category {
        name: "date",
        patterns: &["date", "today", "what day", "current date"],
        responses: &["Today is {date}.", "The date is {date_long}."],
    },
    Category {
        name: "transcription",
        patterns: &["transcribe", "transcription", "convert speech", "speech to text"],
        responses: &[
            "I use AI to convert speech to text. You can upload audio files or record directly.",
            "Transcription works by analyzing audio signals and converting them to written text.",
        ],
    },
    Category {
        name: "help",
        patterns: &["help", "how to", "guide", "instructions"],
        responses: &[
            "Here's how to use me: 1) Upload an audio file, 2) Record live speech, 3) Save transcriptions, 4) Ask questions about your transcriptions.",
            "You can: Upload audio files (MP3, WAV, etc.), Record live speech, Save transcriptions as text files, or Ask me questions about the content.",
        ],
    },
];

/// First category with a trigger contained in `question_lower`.
pub fn match_question(question_lower: &str) -> Option<&'static Category> {
    CATEGORIES
        .iter()
        .find(|category| category.patterns.iter().any(|p| question_lower.contains(p)))
}

impl Category {
    /// A random response, with clock placeholders filled in from `now`.
    pub fn respond(&self, now: DateTime<Local>) -> String {
        let template = self
            .responses
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or_default();
        render(template, now)
    }

    /// The first response, used as the category description.
    pub fn description(&self, now: DateTime<Local>) -> String {
        render(self.responses.first().copied().unwrap_or_default(), now)
    }
}

fn render(template: &str, now: DateTime<Local>) -> String {
    template
        .replace("{time_short}", &now.format("%I:%M %p").to_string())
        .replace("{time}", &now.format("%-I:%M:%S %p").to_string())
        .replace("{date_long}", &now.format("%A, %B %-d, %Y").to_string())
        .replace("{date}", &now.format("%-m/%-d/%Y").to_string())
}

/// Entry of the knowledge-base overview route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: &'static str,
    pub example_patterns: Vec<&'static str>,
    pub description: String,
}

pub fn summary(now: DateTime<Local>) -> Vec<CategorySummary> {
    CATEGORIES
        .iter()
        .map(|category| CategorySummary {
            category: category.name,
            example_patterns: category.patterns.iter().take(3).copied().collect(),
            description: category.description(now),
        })
        .collect()
}

pub const SUPPORTED_QUERIES: &[&str] = &[
    "Greetings and introductions",
    "Questions about capabilities",
    "Time and date queries",
    "Transcription-related questions",
    "Context-based questions from your saved transcriptions",
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_declared_order_wins() {
        let category = match_question("hello, what can you do").unwrap();
        assert_eq!(category.name, "greetings");

        let category = match_question("what can you do").unwrap();
        assert_eq!(category.name, "capabilities");

        assert!(match_question("summarize yesterday's standup").is_none());
    }

    #[test]
    fn test_templates_render() {
        let now = Local.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap();
        let time = CATEGORIES.iter().find(|c| c.name == "time").unwrap();
        let date = CATEGORIES.iter().find(|c| c.name == "date").unwrap();

        assert_eq!(time.description(now), "The current time is 2:05:09 PM.");
        assert_eq!(date.description(now), "Today is 3/7/2025.");

        let answer = date.respond(now);
        assert!(answer == "Today is 3/7/2025." || answer == "The date is Friday, March 7, 2025.");
    }

    #[test]
    fn test_summary_lists_every_category() {
        let now = Local::now();
        let summary = summary(now);
        assert_eq!(summary.len(), CATEGORIES.len());
        assert_eq!(summary[0].category, "greetings");
        assert_eq!(summary[0].example_patterns, vec!["hello", "hi", "hey"]);
        assert_eq!(summary[0].description, "Hello! I'm your Voice-to-Text assistant.");
    }
}
