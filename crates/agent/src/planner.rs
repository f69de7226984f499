//! Tool planner: turns keywords, codes and an optional retry strategy into
//! a validated, ordered list of [`ToolCall`]s.
//!
//! The planning-assist service only proposes. Its text is parsed here,
//! each entry validated against the catalog, and the result repaired so
//! that:
//! - a code search comes first whenever codes are known; a retry asking
//!   for code-based search resolves codes from the keywords when none are
//!   known
//! - some call always yields careers
//! - at least two calls run when there is any signal
//!
//! If nothing usable comes back the fixed fallback plan is
//! `[comprehensive_trace(keywords), get_careers(all)]`.

use crate::context::ExtractedContext;
use crate::services::extract_json_array;
use pathwise_core::catalog::ProgramRepository;
use pathwise_core::profile::Tier;
use pathwise_core::services::{PlanningAssistant, PlanningPrompt, SearchStrategy};
use pathwise_core::tool::{CareerScope, ToolCall, ToolOperation};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NAME_KEYS: [&str; 3] = ["tool", "operation", "name"];
const ARGS_KEYS: [&str; 3] = ["args", "arguments", "parameters"];

/// Codes resolved from keywords for a code-based retry.
const MAX_RESOLVED_CODES: usize = 5;

/// What planning produced for one attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    pub calls: Vec<ToolCall>,
    /// Rejected proposals and service failures
    pub errors: Vec<String>,
    /// The keyword set the plan was built from
    pub keywords: Vec<String>,
    /// Taxonomy codes the plan searches by
    pub codes: Vec<String>,
    pub used_fallback: bool,
}

pub struct ToolPlanner {
    assistant: Arc<dyn PlanningAssistant>,
    repository: Option<Arc<dyn ProgramRepository>>,
    broaden_keyword_limit: usize,
}

impl ToolPlanner {
    pub fn new(assistant: Arc<dyn PlanningAssistant>) -> Self {
        Self {
            assistant,
            repository: None,
            broaden_keyword_limit: 3,
        }
    }

    pub fn with_broaden_keyword_limit(mut self, limit: usize) -> Self {
        self.broaden_keyword_limit = limit.max(1);
        self
    }

    /// Where code-based retries look up codes for their keywords.
    pub fn with_repository(mut self, repository: Arc<dyn ProgramRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub async fn plan(
        &self,
        query: &str,
        context: &ExtractedContext,
        tier: Tier,
        attempt: u32,
        strategy: Option<&SearchStrategy>,
    ) -> PlanOutcome {
        let keywords = self.keyword_set(context, strategy);
        let mut outcome = PlanOutcome {
            keywords: keywords.clone(),
            ..PlanOutcome::default()
        };
        let code_search = strategy.is_some_and(|s| s.use_code_based_search);
        let codes = if code_search && context.codes.is_empty() {
            self.resolve_codes(&keywords, &mut outcome.errors).await
        } else {
            context.codes.clone()
        };
        outcome.codes = codes.clone();

        let prompt = PlanningPrompt {
            query: query.to_string(),
            keywords: keywords.clone(),
            codes: codes.clone(),
            enhanced_keywords: context.enhanced_keywords.clone(),
            tier,
            attempt,
            strategy: strategy.cloned(),
            catalog: ToolOperation::ALL
                .into_iter()
                .filter(|op| op.allowed_for(tier))
                .collect(),
        };

        match self.assistant.propose(&prompt).await {
            Ok(text) => match extract_json_array(&text) {
                Some(entries) => {
                    for entry in &entries {
                        match parse_entry(entry, tier) {
                            Ok(call) => push_unique(&mut outcome.calls, call),
                            Err(reason) => {
                                warn!(%reason, entry = %entry, "Dropping invalid planned call");
                                outcome.errors.push(reason);
                            }
                        }
                    }
                }
                None => {
                    warn!("Planning assistant returned no JSON array");
                    outcome.errors.push("planning output contained no call list".into());
                }
            },
            Err(e) => {
                warn!(error = %e, "Planning assistant failed, using fallback plan");
                outcome.errors.push(format!("planning failed: {e}"));
            }
        }

        if outcome.calls.is_empty() {
            outcome.used_fallback = true;
            outcome.calls = fallback_plan(&keywords, &context.enhanced_keywords);
        }

        self.repair(&mut outcome.calls, &keywords, &codes, strategy);

        info!(
            attempt,
            calls = outcome.calls.len(),
            fallback = outcome.used_fallback,
            rejected = outcome.errors.len(),
            "Plan ready"
        );
        debug!(plan = ?outcome.calls, "Planned calls");
        outcome
    }

    /// Context keywords, then strategy additions, then (when asked) the
    /// career-goal keywords. Broadening keeps the shortest entries.
    fn keyword_set(&self, context: &ExtractedContext, strategy: Option<&SearchStrategy>) -> Vec<String> {
        let mut keywords = context.keywords.clone();
        let Some(strategy) = strategy else {
            return keywords;
        };

        for keyword in &strategy.additional_keywords {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        if strategy.expand_keywords {
            for keyword in &context.enhanced_keywords {
                if !keywords.contains(keyword) {
                    keywords.push(keyword.clone());
                }
            }
        }
        if strategy.broaden_scope {
            keywords = most_general(keywords, self.broaden_keyword_limit);
        }
        keywords
    }

    /// Codes of the college programs matching `keywords`, first-seen order.
    async fn resolve_codes(&self, keywords: &[String], errors: &mut Vec<String>) -> Vec<String> {
        let Some(repository) = &self.repository else {
            return Vec::new();
        };
        if keywords.is_empty() {
            return Vec::new();
        }
        match repository.search_college_programs(keywords).await {
            Ok(rows) => {
                let mut codes: Vec<String> = Vec::new();
                for row in rows {
                    if !codes.contains(&row.cip_code) {
                        codes.push(row.cip_code);
                    }
                    if codes.len() == MAX_RESOLVED_CODES {
                        break;
                    }
                }
                debug!(?keywords, ?codes, "Resolved codes for code-based search");
                codes
            }
            Err(e) => {
                warn!(error = %e, "Code resolution failed, planning without codes");
                errors.push(format!("code resolution failed: {e}"));
                Vec::new()
            }
        }
    }

    fn repair(
        &self,
        calls: &mut Vec<ToolCall>,
        keywords: &[String],
        codes: &[String],
        strategy: Option<&SearchStrategy>,
    ) {
        match calls.iter().position(|c| matches!(c, ToolCall::SearchByCipCode(_))) {
            None if !codes.is_empty() => calls.insert(0, ToolCall::SearchByCipCode(codes.to_vec())),
            // A code-based retry runs its code search before anything else
            Some(i) if i > 0 && strategy.is_some_and(|s| s.use_code_based_search) => {
                let call = calls.remove(i);
                calls.insert(0, call);
            }
            _ => {}
        }

        if strategy.is_some_and(|s| s.include_related_fields) {
            let families: Vec<ToolCall> = code_families(codes)
                .into_iter()
                .map(ToolCall::ExpandCipFamily)
                .filter(|call| !calls.contains(call))
                .collect();
            if !families.is_empty() {
                // Ahead of the careers lookup so related codes get careers too
                let all_careers = |c: &ToolCall| matches!(c, ToolCall::GetCareers(CareerScope::All));
                let at = calls.iter().position(all_careers).unwrap_or(calls.len());
                calls.splice(at..at, families);
                if !calls[at..].iter().any(all_careers) {
                    calls.push(ToolCall::GetCareers(CareerScope::All));
                }
            }
        }

        if !calls.iter().any(ToolCall::covers_careers) {
            calls.push(ToolCall::GetCareers(CareerScope::All));
        }

        let has_signal = !keywords.is_empty() || !codes.is_empty();
        if has_signal && calls.len() < 2 {
            if !calls.iter().any(|c| matches!(c, ToolCall::GetCareers(_))) {
                calls.push(ToolCall::GetCareers(CareerScope::All));
            } else if !keywords.is_empty() {
                calls.insert(0, ToolCall::ComprehensiveTrace(keywords.to_vec()));
            } else {
                calls.insert(0, ToolCall::SearchByCipCode(codes.to_vec()));
            }
        }
    }
}

fn parse_entry(entry: &Value, tier: Tier) -> Result<ToolCall, String> {
    let Value::Object(map) = entry else {
        return Err(format!("planned call is not a record: {entry}"));
    };
    let name = NAME_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .ok_or_else(|| format!("planned call has no operation name: {entry}"))?;
    let args = ARGS_KEYS
        .iter()
        .find_map(|k| map.get(*k))
        .cloned()
        .unwrap_or(Value::Null);

    let call = ToolCall::parse(name, &args).map_err(|e| e.to_string())?;
    if !call.operation().allowed_for(tier) {
        return Err(format!("{} is not available for the {tier} tier", call.operation()));
    }
    Ok(call)
}

fn fallback_plan(keywords: &[String], enhanced_keywords: &[String]) -> Vec<ToolCall> {
    let trace_terms = if keywords.is_empty() { enhanced_keywords } else { keywords };
    let mut calls = Vec::with_capacity(2);
    if !trace_terms.is_empty() {
        calls.push(ToolCall::ComprehensiveTrace(trace_terms.to_vec()));
    }
    calls.push(ToolCall::GetCareers(CareerScope::All));
    calls
}

/// The `limit` shortest keywords, in their original order.
fn most_general(keywords: Vec<String>, limit: usize) -> Vec<String> {
    if keywords.len() <= limit {
        return keywords;
    }
    let mut by_length: Vec<usize> = (0..keywords.len()).collect();
    by_length.sort_by_key(|&i| keywords[i].chars().count());
    let mut keep: Vec<usize> = by_length.into_iter().take(limit).collect();
    keep.sort_unstable();
    keep.into_iter().map(|i| keywords[i].clone()).collect()
}

/// Two-digit family prefixes of `codes`, first-seen order.
fn code_families(codes: &[String]) -> Vec<String> {
    let mut families: Vec<String> = Vec::new();
    for code in codes {
        let family = code.split('.').next().unwrap_or(code).to_string();
        if !family.is_empty() && !families.contains(&family) {
            families.push(family);
        }
    }
    families
}

fn push_unique(calls: &mut Vec<ToolCall>, call: ToolCall) {
    if !calls.contains(&call) {
        calls.push(call);
    }
}
