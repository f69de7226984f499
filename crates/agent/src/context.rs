//! Context extraction: a bounded keyword set and known taxonomy codes for
//! the current message.
//!
//! Which text the keywords come from depends on the [`QueryMode`]:
//! - **topic pivot** ("what about engineering instead"): the current
//!   message only, with profile and history ignored
//! - **continuation** ("yes", "sure"): the most recent assistant turn,
//!   backfilled from overlapping profile interests when it yields fewer
//!   than three tokens
//! - **normal**: the current message only
//!
//! Career goals from the profile are resolved to codes separately so the
//! planner can prefer code-based search.
//!
//! Trigger phrases are English only.

use pathwise_core::catalog::ProgramRepository;
use pathwise_core::message::{Message, last_assistant_turn};
use pathwise_core::profile::UserProfile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Framing words that never describe a subject.
const STOPWORDS: &[&str] = &[
    "about", "actually", "after", "all", "also", "and", "any", "are", "can", "could", "career",
    "careers", "course", "courses", "does", "find", "for", "from", "get", "give", "have", "help",
    "how", "instead", "interested", "into", "job", "jobs", "know", "like", "list", "look", "looking",
    "more", "need", "not", "offer", "offered", "options", "please", "program", "programs", "see",
    "show", "some", "switch", "tell", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "want", "what", "where", "which", "who", "why", "will",
    "with", "would", "yes", "you", "your",
];

const PIVOT_PREFIXES: &[&str] = &["what about", "how about", "switch to", "actually", "no"];

const CONFIRMATIONS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "please", "definitely", "absolutely",
    "of course", "yes please", "sure thing", "sounds good", "go ahead", "ok sure", "yes sure",
    "sure please", "ok please", "okay sure",
];

/// Continuation yields below this are backfilled from profile interests.
const MIN_CONTINUATION_TOKENS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    TopicPivot,
    Continuation,
    #[default]
    Normal,
}

/// What the extractor derived for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContext {
    pub keywords: Vec<String>,
    /// Taxonomy codes from the profile's career goals
    pub codes: Vec<String>,
    /// Search keywords attached to those career goals
    pub enhanced_keywords: Vec<String>,
    pub mode: QueryMode,
}

impl ExtractedContext {
    pub fn has_signal(&self) -> bool {
        !self.keywords.is_empty() || !self.codes.is_empty() || !self.enhanced_keywords.is_empty()
    }
}

/// Lowercase alphabetic tokens longer than two characters, stopwords
/// removed, deduplicated in first-seen order and capped at `max`.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in text.split(|c: char| !c.is_alphabetic()) {
        if out.len() >= max {
            break;
        }
        let token = token.to_lowercase();
        if token.chars().count() <= 2 || STOPWORDS.contains(&token.as_str()) || out.contains(&token) {
            continue;
        }
        out.push(token);
    }
    out
}

/// Lowercased words joined by single spaces, punctuation dropped.
fn normalize_phrase(text: &str) -> String {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a message as a pivot, a pure confirmation, or neither.
pub fn classify_mode(query: &str) -> QueryMode {
    let phrase = normalize_phrase(query);
    if CONFIRMATIONS.contains(&phrase.as_str()) {
        return QueryMode::Continuation;
    }
    let starts_with_pivot = PIVOT_PREFIXES
        .iter()
        .any(|p| phrase == *p || phrase.starts_with(&format!("{p} ")));
    if starts_with_pivot || phrase.split(' ').any(|w| w == "instead") {
        return QueryMode::TopicPivot;
    }
    QueryMode::Normal
}

fn push_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

pub struct ContextExtractor {
    repository: Arc<dyn ProgramRepository>,
    max_keywords: usize,
    history_window: usize,
}

impl ContextExtractor {
    pub fn new(repository: Arc<dyn ProgramRepository>) -> Self {
        Self {
            repository,
            max_keywords: 5,
            history_window: 6,
        }
    }

    pub fn with_max_keywords(mut self, max: usize) -> Self {
        self.max_keywords = max;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub async fn extract(&self, query: &str, history: &[Message], profile: &UserProfile) -> ExtractedContext {
        let mode = classify_mode(query);
        let keywords = match mode {
            QueryMode::TopicPivot | QueryMode::Normal => extract_keywords(query, self.max_keywords),
            QueryMode::Continuation => self.continuation_keywords(query, history, profile),
        };

        let mut context = ExtractedContext {
            keywords,
            mode,
            ..ExtractedContext::default()
        };
        if mode != QueryMode::TopicPivot {
            self.resolve_career_goals(profile, &mut context).await;
        }

        debug!(
            ?mode,
            keywords = ?context.keywords,
            codes = ?context.codes,
            enhanced = ?context.enhanced_keywords,
            "Context extracted"
        );
        context
    }

    fn continuation_keywords(&self, query: &str, history: &[Message], profile: &UserProfile) -> Vec<String> {
        let Some(offer) = last_assistant_turn(history, self.history_window) else {
            debug!("Confirmation without a prior assistant turn, using the message itself");
            return extract_keywords(query, self.max_keywords);
        };

        let mut keywords = extract_keywords(&offer.content, self.max_keywords);
        if keywords.len() < MIN_CONTINUATION_TOKENS {
            let extracted = keywords.clone();
            for interest in &profile.interests {
                let interest = interest.trim().to_lowercase();
                if interest.is_empty() {
                    continue;
                }
                let overlaps = extracted
                    .iter()
                    .any(|t| interest.contains(t.as_str()) || t.contains(interest.as_str()));
                if overlaps {
                    push_unique(&mut keywords, extract_keywords(&interest, self.max_keywords));
                }
            }
            keywords.truncate(self.max_keywords);
        }
        keywords
    }

    async fn resolve_career_goals(&self, profile: &UserProfile, context: &mut ExtractedContext) {
        for goal in &profile.career_goals {
            match self.repository.codes_for_career_goal(goal).await {
                Ok(Some(mapping)) => {
                    push_unique(&mut context.codes, mapping.codes);
                    let enhanced: Vec<String> = mapping
                        .keywords
                        .into_iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect();
                    push_unique(&mut context.enhanced_keywords, enhanced);
                }
                Ok(None) => debug!(goal = %goal, "No taxonomy codes for career goal"),
                Err(e) => warn!(goal = %goal, error = %e, "Career goal lookup failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn extractor() -> ContextExtractor {
        ContextExtractor::new(sample_repository())
    }

    #[test]
    fn keywords_strip_framing_words() {
        assert_eq!(extract_keywords("show me computer science programs", 5), vec!["computer", "science"]);
        assert_eq!(extract_keywords("Nursing, nursing & BIOLOGY!", 5), vec!["nursing", "biology"]);
        assert_eq!(extract_keywords("a b cd", 5), Vec::<String>::new());
    }

    #[test]
    fn keywords_are_capped() {
        let keywords = extract_keywords("alpha bravo charlie delta echo foxtrot golf", 5);
        assert_eq!(keywords.len(), 5);
        assert_eq!(keywords[4], "echo");
    }

    #[test]
    fn mode_classification() {
        assert_eq!(classify_mode("yes"), QueryMode::Continuation);
        assert_eq!(classify_mode("Sure!"), QueryMode::Continuation);
        assert_eq!(classify_mode("ok, sure"), QueryMode::Continuation);
        assert_eq!(classify_mode("what about engineering instead"), QueryMode::TopicPivot);
        assert_eq!(classify_mode("No, welding"), QueryMode::TopicPivot);
        assert_eq!(classify_mode("Switch to marine biology"), QueryMode::TopicPivot);
        assert_eq!(classify_mode("show me nursing instead"), QueryMode::TopicPivot);
        assert_eq!(classify_mode("nobody teaches welding?"), QueryMode::Normal);
        assert_eq!(classify_mode("yes, show me welding programs"), QueryMode::Normal);
    }

    #[tokio::test]
    async fn pivot_ignores_history_and_profile() {
        let history = vec![
            Message::user("show me nursing programs"),
            Message::assistant("Here are nursing programs. Are you interested in nursing careers?"),
        ];
        let profile = UserProfile {
            interests: vec!["nursing".into()],
            career_goals: vec!["nurse".into()],
            ..Default::default()
        };
        let context = extractor()
            .extract("what about engineering instead", &history, &profile)
            .await;
        assert_eq!(context.mode, QueryMode::TopicPivot);
        assert_eq!(context.keywords, vec!["engineering"]);
        assert!(context.codes.is_empty());
        assert!(context.enhanced_keywords.is_empty());
    }

    #[tokio::test]
    async fn continuation_uses_the_offer() {
        let history = vec![
            Message::user("hi"),
            Message::assistant("Are you interested in nursing programs?"),
        ];
        let profile = UserProfile {
            interests: vec!["engineering".into()],
            ..Default::default()
        };
        let context = extractor().extract("yes", &history, &profile).await;
        assert_eq!(context.mode, QueryMode::Continuation);
        assert_eq!(context.keywords, vec!["nursing"]);
    }

    #[tokio::test]
    async fn continuation_backfills_only_overlapping_interests() {
        let history = vec![Message::assistant("Would you like to see biology programs?")];
        let profile = UserProfile {
            interests: vec!["marine biology".into(), "welding".into()],
            ..Default::default()
        };
        let context = extractor().extract("sure", &history, &profile).await;
        assert_eq!(context.keywords, vec!["biology", "marine"]);
    }

    #[tokio::test]
    async fn continuation_without_offer_falls_back_to_message() {
        let context = extractor().extract("yes", &[], &UserProfile::default()).await;
        assert_eq!(context.mode, QueryMode::Continuation);
        assert!(context.keywords.is_empty());
        assert!(!context.has_signal());
    }

    #[tokio::test]
    async fn normal_query_withholds_profile_interests() {
        let profile = UserProfile {
            interests: vec!["engineering".into()],
            ..Default::default()
        };
        let context = extractor().extract("welding programs", &[], &profile).await;
        assert_eq!(context.keywords, vec!["welding"]);
    }

    #[tokio::test]
    async fn career_goals_recorded_separately() {
        let profile = UserProfile {
            career_goals: vec!["Registered Nurse".into(), "astronaut".into()],
            ..Default::default()
        };
        let context = extractor().extract("health programs", &[], &profile).await;
        assert_eq!(context.keywords, vec!["health"]);
        assert!(context.codes.contains(&"51.3801".to_string()));
        assert!(!context.enhanced_keywords.is_empty());
    }

    #[tokio::test]
    async fn failed_goal_lookup_is_swallowed() {
        let profile = UserProfile {
            career_goals: vec!["nurse".into()],
            ..Default::default()
        };
        let context = ContextExtractor::new(failing_repository())
            .extract("nursing", &[], &profile)
            .await;
        assert_eq!(context.keywords, vec!["nursing"]);
        assert!(context.codes.is_empty());
    }
}
