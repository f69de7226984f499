//! The per-request pipeline state.
//!
//! Each stage consumes the state and returns a new one. Retrying builds a
//! fresh attempt from the previous state: per-attempt fields are reset,
//! accumulated errors and used tools carry over.

use crate::context::ExtractedContext;
use crate::planner::PlanOutcome;
use pathwise_core::aggregate::AggregatedData;
use pathwise_core::catalog::CollectedData;
use pathwise_core::message::Message;
use pathwise_core::profile::UserProfile;
use pathwise_core::services::{QualityAssessment, SearchStrategy};
use pathwise_core::tool::ToolCall;
use pathwise_tools::ExecutionOutcome;

#[derive(Debug, Clone)]
pub struct QueryState {
    /// The user's query, never rewritten
    pub query: String,
    /// What this attempt plans from (the enhanced query on retries)
    pub planning_query: String,
    pub profile: UserProfile,
    pub history: Vec<Message>,
    pub attempt: u32,
    /// Set on retries only
    pub strategy: Option<SearchStrategy>,
    pub context: ExtractedContext,
    pub plan: Vec<ToolCall>,
    /// The keyword set the plan was built from
    pub keywords: Vec<String>,
    pub collected: CollectedData,
    pub verified: CollectedData,
    pub aggregated: AggregatedData,
    pub assessment: Option<QualityAssessment>,
    pub tools_used: Vec<String>,
    pub errors: Vec<String>,
}

impl QueryState {
    pub fn new(query: impl Into<String>, profile: UserProfile, history: &[Message]) -> Self {
        let query = query.into();
        Self {
            planning_query: query.clone(),
            query,
            profile,
            history: history.to_vec(),
            attempt: 1,
            strategy: None,
            context: ExtractedContext::default(),
            plan: Vec::new(),
            keywords: Vec::new(),
            collected: CollectedData::default(),
            verified: CollectedData::default(),
            aggregated: AggregatedData::default(),
            assessment: None,
            tools_used: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_context(self, context: ExtractedContext) -> Self {
        Self { context, ..self }
    }

    pub fn with_plan(self, outcome: PlanOutcome) -> Self {
        let mut next = Self {
            plan: outcome.calls,
            keywords: outcome.keywords,
            ..self
        };
        next.errors.extend(outcome.errors);
        next
    }

    pub fn with_execution(self, outcome: ExecutionOutcome) -> Self {
        let mut next = Self {
            collected: outcome.data,
            ..self
        };
        next.errors.extend(outcome.errors.iter().map(ToString::to_string));
        for tool in outcome.tools_used {
            if !next.tools_used.contains(&tool) {
                next.tools_used.push(tool);
            }
        }
        next
    }

    pub fn with_verified(self, verified: CollectedData, errors: Vec<String>) -> Self {
        let mut next = Self { verified, ..self };
        next.errors.extend(errors);
        next
    }

    pub fn with_aggregated(self, aggregated: AggregatedData) -> Self {
        Self { aggregated, ..self }
    }

    pub fn with_assessment(self, assessment: QualityAssessment, errors: Vec<String>) -> Self {
        let mut next = Self {
            assessment: Some(assessment),
            ..self
        };
        next.errors.extend(errors);
        next
    }

    /// Start the next attempt from a clean slate.
    pub fn next_attempt(self, strategy: SearchStrategy, enhanced_query: String) -> Self {
        Self {
            query: self.query,
            planning_query: enhanced_query,
            profile: self.profile,
            history: self.history,
            attempt: self.attempt + 1,
            strategy: Some(strategy),
            context: ExtractedContext::default(),
            plan: Vec::new(),
            keywords: Vec::new(),
            collected: CollectedData::default(),
            verified: CollectedData::default(),
            aggregated: AggregatedData::default(),
            assessment: None,
            tools_used: self.tools_used,
            errors: self.errors,
        }
    }

    pub fn quality_score(&self) -> f32 {
        self.assessment.as_ref().map_or(0.0, |a| a.quality_score)
    }
}
