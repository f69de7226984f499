//! Reflection controller: scores an attempt and decides accept or retry.
//!
//! ```text
//!   attempt n ──assess──▶ good enough or n ≥ max ──▶ Accept
//!                    └──▶ otherwise ──propose──▶ Retry { strategy, enhanced query }
//! ```
//!
//! `max` is clamped to `1..=MAX_ATTEMPTS_CEILING`, so no configuration
//! can produce a fourth planning attempt.

use pathwise_config::MAX_ATTEMPTS_CEILING;
use pathwise_core::services::{QualityAssessment, ReflectionRequest, ReflectionService, SearchStrategy};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ReflectionDecision {
    Accept,
    Retry {
        strategy: SearchStrategy,
        /// Replaces the planning query; the user's query is kept for scoring
        enhanced_query: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionOutcome {
    pub assessment: QualityAssessment,
    pub decision: ReflectionDecision,
    pub errors: Vec<String>,
}

pub struct ReflectionController {
    service: Arc<dyn ReflectionService>,
    max_attempts: u32,
}

impl ReflectionController {
    pub fn new(service: Arc<dyn ReflectionService>, max_attempts: u32) -> Self {
        Self {
            service,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CEILING),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn should_accept(&self, assessment: &QualityAssessment, attempt: u32) -> bool {
        assessment.is_good_enough || attempt >= self.max_attempts
    }

    /// Assess `request` and, when it falls short, ask for a new strategy.
    ///
    /// `planning_query` is the query the attempt was planned from; it is
    /// reused when no better one is proposed. `known_codes` steers the
    /// fallback strategy.
    pub async fn reflect(
        &self,
        request: ReflectionRequest<'_>,
        planning_query: &str,
        known_codes: &[String],
    ) -> ReflectionOutcome {
        let mut errors = Vec::new();
        let attempt = request.attempt;

        let mut assessment = match self.service.assess(request).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(attempt, error = %e, "Quality assessment failed, accepting results");
                errors.push(format!("quality assessment failed: {e}"));
                QualityAssessment {
                    quality_score: 0.0,
                    is_good_enough: true,
                    issues: vec!["quality assessment unavailable".into()],
                    suggestions: Vec::new(),
                }
            }
        };
        assessment.quality_score = assessment.quality_score.clamp(0.0, 10.0);

        if self.should_accept(&assessment, attempt) {
            info!(
                attempt,
                score = assessment.quality_score,
                good_enough = assessment.is_good_enough,
                "Accepting results"
            );
            return ReflectionOutcome {
                assessment,
                decision: ReflectionDecision::Accept,
                errors,
            };
        }

        let (strategy, enhanced_query) = match self.service.propose_strategy(request, &assessment).await {
            Ok(proposal) => {
                let enhanced = proposal.enhanced_query.trim();
                let enhanced_query = if enhanced.is_empty() {
                    planning_query.to_string()
                } else {
                    enhanced.to_string()
                };
                (proposal.strategy.normalized(), enhanced_query)
            }
            Err(e) => {
                warn!(attempt, error = %e, "Strategy proposal failed, broadening scope");
                errors.push(format!("strategy proposal failed: {e}"));
                (fallback_strategy(known_codes), planning_query.to_string())
            }
        };

        info!(
            attempt,
            score = assessment.quality_score,
            issues = assessment.issues.len(),
            broaden = strategy.broaden_scope,
            code_search = strategy.use_code_based_search,
            added = strategy.additional_keywords.len(),
            "Retrying with new strategy"
        );
        ReflectionOutcome {
            assessment,
            decision: ReflectionDecision::Retry {
                strategy,
                enhanced_query,
            },
            errors,
        }
    }
}

fn fallback_strategy(known_codes: &[String]) -> SearchStrategy {
    SearchStrategy {
        broaden_scope: true,
        use_code_based_search: !known_codes.is_empty(),
        ..SearchStrategy::default()
    }
}
