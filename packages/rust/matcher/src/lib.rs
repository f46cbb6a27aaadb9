//! Deterministic keyword matcher that maps a user message to a stored Q&A entry.
//!
//! Scoring, per entry, against the lower-cased and trimmed message:
//!
//! | Signal | Weight |
//! |---|---|
//! | keyword is a substring of the message | +3 each |
//! | question word longer than 3 chars is a substring of the message | +1 each |
//! | message equals the question | +10, and the entry wins outright |
//!
//! The strictly highest scorer wins (ties keep the earlier entry) and is only
//! returned when it reaches [`MatchPolicy::min_score`], 2 by default, so a
//! single stray question word never produces an answer. The threshold applies
//! to exact matches too.

use faqbot_shared::{MatcherConfig, QaEntry};
use tracing::trace;

/// Weights and threshold used by [`KeywordMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub keyword_weight: u32,
    pub question_word_weight: u32,
    pub exact_match_bonus: u32,
    /// Question words shorter than this (in chars) are ignored.
    pub min_question_word_chars: usize,
    pub min_score: u32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            keyword_weight: 3,
            question_word_weight: 1,
            exact_match_bonus: 10,
            min_question_word_chars: 4,
            min_score: 2,
        }
    }
}

impl From<&MatcherConfig> for MatchPolicy {
    fn from(config: &MatcherConfig) -> Self {
        Self {
            min_score: config.min_score,
            ..Self::default()
        }
    }
}

/// The winning entry for a message.
#[derive(Debug, PartialEq, Eq)]
pub struct KeywordMatch<'a, T> {
    pub entry: &'a T,
    /// Position of `entry` in the slice that was searched.
    pub index: usize,
    pub score: u32,
}

// Manual impls: `T` itself need not be `Clone`/`Copy`.
impl<T> Clone for KeywordMatch<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for KeywordMatch<'_, T> {}

/// Scores messages against Q&A entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher {
    policy: MatchPolicy,
}

impl KeywordMatcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Find the best entry for `message`, or `None` when nothing clears the
    /// threshold. `None` means the caller should fall back to generation or
    /// an apology.
    pub fn best_match<'a, T: AsRef<QaEntry>>(
        &self,
        message: &str,
        entries: &'a [T],
    ) -> Option<KeywordMatch<'a, T>> {
        let message = normalize_message(message);
        if message.is_empty() {
            return None;
        }

        let mut best: Option<KeywordMatch<'a, T>> = None;

        for (index, item) in entries.iter().enumerate() {
            let entry = item.as_ref();
            let score = self.score_normalized(&message, entry);

            if is_exact(&message, entry) && score >= self.policy.min_score {
                trace!(index, score, "exact question match");
                return Some(KeywordMatch {
                    entry: item,
                    index,
                    score,
                });
            }

            let current = best.map_or(0, |b| b.score);
            if score > current {
                best = Some(KeywordMatch {
                    entry: item,
                    index,
                    score,
                });
            }
        }

        best.filter(|b| b.score >= self.policy.min_score)
    }

    /// Score a single entry against a raw (un-normalized) message.
    pub fn score(&self, message: &str, entry: &QaEntry) -> u32 {
        let message = normalize_message(message);
        if message.is_empty() {
            return 0;
        }
        self.score_normalized(&message, entry)
    }

    fn score_normalized(&self, message: &str, entry: &QaEntry) -> u32 {
        let mut score = 0;

        for keyword in &entry.keywords {
            let keyword = keyword.to_lowercase();
            if !keyword.is_empty() && message.contains(&keyword) {
                score += self.policy.keyword_weight;
            }
        }

        let question = entry.question.to_lowercase();
        for word in question.split_whitespace() {
            if word.chars().count() >= self.policy.min_question_word_chars
                && message.contains(word)
            {
                score += self.policy.question_word_weight;
            }
        }

        if is_exact(message, entry) {
            score += self.policy.exact_match_bonus;
        }

        score
    }
}

/// Match with the default policy.
pub fn best_match<'a, T: AsRef<QaEntry>>(
    message: &str,
    entries: &'a [T],
) -> Option<KeywordMatch<'a, T>> {
    KeywordMatcher::default().best_match(message, entries)
}

fn normalize_message(message: &str) -> String {
    message.trim().to_lowercase()
}

fn is_exact(normalized_message: &str, entry: &QaEntry) -> bool {
    normalized_message == entry.question.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, answer: &str, keywords: &[&str]) -> QaEntry {
        QaEntry::new(question, answer, keywords.iter().copied()).expect("valid entry")
    }

    fn hours() -> QaEntry {
        entry(
            "What are your business hours?",
            "9-6 Mon-Fri",
            &["hours", "open"],
        )
    }

    fn faq() -> Vec<QaEntry> {
        vec![
            hours(),
            entry(
                "How can I contact support?",
                "Email support@example.com",
                &["contact", "support", "email", "phone"],
            ),
            entry(
                "Do you ship internationally?",
                "Yes, to 40 countries.",
                &["ship", "shipping", "international", "delivery"],
            ),
        ]
    }

    #[test]
    fn keyword_scenario_matches_hours() {
        let entries = vec![hours()];
        let m = best_match("what time do you open", &entries).expect("match");
        assert_eq!(m.entry.answer, "9-6 Mon-Fri");
        assert!(m.score >= 2);
        assert_eq!(m.index, 0);
    }

    #[test]
    fn unrelated_message_is_no_match() {
        let entries = vec![hours()];
        assert!(best_match("do you sell shoes", &entries).is_none());
    }

    #[test]
    fn empty_message_is_no_match() {
        let entries = faq();
        assert!(best_match("", &entries).is_none());
        assert!(best_match("   \t ", &entries).is_none());
    }

    #[test]
    fn empty_entries_is_no_match() {
        let entries: Vec<QaEntry> = Vec::new();
        assert!(best_match("what are your business hours?", &entries).is_none());
    }

    #[test]
    fn matching_is_case_and_whitespace_insensitive() {
        let entries = faq();
        let m = best_match("  HOW CAN I CONTACT SUPPORT?  ", &entries).expect("match");
        assert_eq!(m.index, 1);
    }

    #[test]
    fn scoring_weights() {
        let matcher = KeywordMatcher::default();
        let e = hours();
        // "open" keyword (+3) only.
        assert_eq!(matcher.score("when do you open", &e), 3);
        // "hours" keyword (+3), question word "hours?" absent, "business" (+1).
        assert_eq!(matcher.score("business hours please", &e), 4);
        // Exact: "hours" (+3) + "what", "your", "business", "hours?" (+4) + bonus (+10).
        assert_eq!(matcher.score("What are your business hours?", &e), 17);
    }

    #[test]
    fn short_question_words_do_not_count() {
        let matcher = KeywordMatcher::default();
        let e = entry("Can you fix it?", "Probably.", &["repair"]);
        // "can", "you", "fix" and "it?" are all too short.
        assert_eq!(matcher.score("can you fix it", &e), 0);
    }

    #[test]
    fn single_question_word_is_below_threshold() {
        let entries = vec![entry(
            "Where is the warehouse located?",
            "Springfield.",
            &["address"],
        )];
        // Only "where" (+1) matches.
        assert!(best_match("where", &entries).is_none());
        // "where" + "located?" do not both appear; "warehouse" + "where" do.
        let m = best_match("where is your warehouse", &entries).expect("match");
        assert_eq!(m.score, 2);
    }

    #[test]
    fn exact_question_wins_over_keyword_heavy_entry() {
        let entries = vec![
            entry(
                "Contact support email phone",
                "Keyword-stuffed",
                &["contact", "support", "email", "phone", "help"],
            ),
            entry("help", "Exact answer", &["assist"]),
        ];
        // The first entry scores 3 ("help" keyword) while the second is an exact match.
        let m = best_match("Help", &entries).expect("match");
        assert_eq!(m.entry.answer, "Exact answer");

        let entries = vec![
            entry(
                "How do I contact support by email or phone?",
                "Stuffed",
                &["contact", "support", "email", "phone", "how do i"],
            ),
            entry("contact support email phone", "Exact", &["x-unrelated"]),
        ];
        let m = best_match("contact support email phone", &entries).expect("match");
        assert_eq!(m.entry.answer, "Exact");
    }

    #[test]
    fn ties_keep_first_inserted_entry() {
        let entries = vec![
            entry("First question here", "first", &["refund"]),
            entry("Second question here", "second", &["refund"]),
        ];
        let m = best_match("refund please", &entries).expect("match");
        assert_eq!(m.entry.answer, "first");
        assert_eq!(m.index, 0);
    }

    #[test]
    fn highest_score_wins() {
        let entries = faq();
        let m = best_match("do you offer international shipping delivery", &entries)
            .expect("match");
        assert_eq!(m.index, 2);
    }

    #[test]
    fn deterministic_across_calls() {
        let entries = faq();
        let messages = [
            "what time do you open",
            "contact",
            "ship",
            "nothing relevant",
            "",
        ];
        for msg in messages {
            let a = best_match(msg, &entries).map(|m| (m.index, m.score));
            let b = best_match(msg, &entries).map(|m| (m.index, m.score));
            assert_eq!(a, b, "message {msg:?}");
        }
    }

    #[test]
    fn configurable_threshold() {
        let entries = vec![entry(
            "Where is the warehouse located?",
            "Springfield.",
            &["address"],
        )];
        let lenient = KeywordMatcher::new(MatchPolicy {
            min_score: 1,
            ..MatchPolicy::default()
        });
        assert!(lenient.best_match("where", &entries).is_some());

        let strict = KeywordMatcher::new(MatchPolicy::from(&MatcherConfig { min_score: 5 }));
        assert!(strict.best_match("where is your warehouse", &entries).is_none());
    }

    #[test]
    fn exact_match_still_needs_threshold() {
        let entries = vec![entry("help", "Exact answer", &["assist"])];
        let strict = KeywordMatcher::new(MatchPolicy {
            min_score: 20,
            ..MatchPolicy::default()
        });
        // "help" is exact (+10) and a long-enough question word (+1): 11 < 20.
        assert_eq!(strict.score("help", &entries[0]), 11);
        assert!(strict.best_match("help", &entries).is_none());

        let default = KeywordMatcher::default();
        assert_eq!(default.best_match("help", &entries).map(|m| m.score), Some(11));
    }

    #[test]
    fn works_over_wrapped_entries() {
        struct Row {
            id: u32,
            entry: QaEntry,
        }
        impl AsRef<QaEntry> for Row {
            fn as_ref(&self) -> &QaEntry {
                &self.entry
            }
        }

        let rows = vec![
            Row {
                id: 7,
                entry: hours(),
            },
            Row {
                id: 9,
                entry: entry("Refund policy?", "30 days", &["refund", "return"]),
            },
        ];
        let m = best_match("can i return this", &rows).expect("match");
        assert_eq!(m.entry.id, 9);
    }
}
