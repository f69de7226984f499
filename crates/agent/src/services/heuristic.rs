//! Offline service implementations.
//!
//! Deterministic rules that need no model, used with `--offline`, when no
//! API key is configured, and as the classifier fallback.

use crate::context::{QueryMode, classify_mode, extract_keywords};
use async_trait::async_trait;
use pathwise_core::aggregate::AggregatedData;
use pathwise_core::error::ServiceError;
use pathwise_core::message::{Message, Role};
use pathwise_core::services::{
    Bucket, Classification, FormatRequest, PlanningAssistant, PlanningPrompt, QualityAssessment,
    QueryClassifier, QueryKind, ReflectionRequest, ReflectionService, ResponseFormatter,
    ResultVerifier, SearchStrategy, StrategyProposal, VerificationRequest,
};
use serde_json::{Value, json};

// ── Classification ────────────────────────────────────────────────────────

const SMALL_TALK: &[&str] = &[
    "hi", "hello", "hey", "hiya", "thanks", "thank you", "thanks a lot", "bye", "goodbye",
    "good morning", "good afternoon", "good evening", "how are you", "who are you",
];

const CAREER_WORDS: &[&str] = &["career", "careers", "job", "jobs", "occupation", "occupations", "work"];
const PATHWAY_WORDS: &[&str] = &["pathway", "pathways", "path", "lead", "leads", "after", "transfer"];

/// Keyword-only classification.
pub fn heuristic_classification(query: &str, history: &[Message]) -> Classification {
    let words: Vec<String> = query
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let phrase = words.join(" ");

    if SMALL_TALK.contains(&phrase.as_str()) {
        return Classification {
            needs_retrieval: false,
            query_kind: QueryKind::SmallTalk,
            reasoning: "greeting or small talk".into(),
        };
    }

    if classify_mode(query) == QueryMode::Continuation {
        let has_offer = history.iter().any(|m| m.role == Role::Assistant);
        return Classification {
            needs_retrieval: has_offer,
            query_kind: if has_offer { QueryKind::ProgramSearch } else { QueryKind::General },
            reasoning: if has_offer {
                "confirmation of an earlier offer".into()
            } else {
                "confirmation with nothing to confirm".into()
            },
        };
    }

    if extract_keywords(query, 5).is_empty() {
        return Classification {
            needs_retrieval: false,
            query_kind: QueryKind::General,
            reasoning: "no subject keywords".into(),
        };
    }

    let has = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));
    let query_kind = if has(PATHWAY_WORDS) {
        QueryKind::PathwayTrace
    } else if has(CAREER_WORDS) {
        QueryKind::CareerExploration
    } else {
        QueryKind::ProgramSearch
    };
    Classification {
        needs_retrieval: true,
        query_kind,
        reasoning: "subject keywords present".into(),
    }
}

pub struct KeywordClassifier;

#[async_trait]
impl QueryClassifier for KeywordClassifier {
    async fn classify(&self, query: &str, history: &[Message]) -> Result<Classification, ServiceError> {
        Ok(heuristic_classification(query, history))
    }
}

// ── Planning ──────────────────────────────────────────────────────────────

/// Proposes code search, a trace and a careers lookup.
pub struct RuleBasedPlanner;

#[async_trait]
impl PlanningAssistant for RuleBasedPlanner {
    async fn propose(&self, prompt: &PlanningPrompt) -> Result<String, ServiceError> {
        let mut calls: Vec<Value> = Vec::new();
        if !prompt.codes.is_empty() {
            calls.push(json!({"tool": "search_by_cip_code", "args": prompt.codes}));
        }
        let terms = if prompt.keywords.is_empty() {
            &prompt.enhanced_keywords
        } else {
            &prompt.keywords
        };
        if !terms.is_empty() {
            calls.push(json!({"tool": "comprehensive_trace", "args": terms}));
        }
        calls.push(json!({"tool": "get_careers", "args": "all"}));
        Ok(Value::Array(calls).to_string())
    }
}

// ── Verification ──────────────────────────────────────────────────────────

/// Keeps program rows whose name contains the primary intent, unless that
/// would leave nothing. Careers pass through.
pub struct LexicalVerifier;

#[async_trait]
impl ResultVerifier for LexicalVerifier {
    async fn verify(&self, request: VerificationRequest<'_>, bucket: Bucket) -> Result<Bucket, ServiceError> {
        let Some(intent) = request.primary_intent.map(str::to_lowercase) else {
            return Ok(bucket);
        };
        let matches = |name: &str| name.to_lowercase().contains(&intent);

        Ok(match bucket {
            Bucket::School(rows) => {
                let kept: Vec<_> = rows.iter().filter(|r| matches(&r.name)).cloned().collect();
                Bucket::School(if kept.is_empty() { rows } else { kept })
            }
            Bucket::College(rows) => {
                let kept: Vec<_> = rows.iter().filter(|r| matches(&r.name)).cloned().collect();
                Bucket::College(if kept.is_empty() { rows } else { kept })
            }
            careers @ Bucket::Careers(_) => careers,
        })
    }
}

// ── Reflection ────────────────────────────────────────────────────────────

/// Scores by result counts: two points per program, two more for careers.
pub struct CountReflector;

#[async_trait]
impl ReflectionService for CountReflector {
    async fn assess(&self, request: ReflectionRequest<'_>) -> Result<QualityAssessment, ServiceError> {
        let programs = request.aggregated.program_count();
        let has_careers = !request.aggregated.careers.is_empty();
        let raw = programs * 2 + if has_careers { 2 } else { 0 };

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        if programs == 0 {
            issues.push("no programs found".to_string());
            suggestions.push("broaden the keyword set".to_string());
        }
        if !has_careers {
            issues.push("no linked careers".to_string());
        }
        Ok(QualityAssessment {
            quality_score: raw.min(10) as f32,
            is_good_enough: programs > 0,
            issues,
            suggestions,
        })
    }

    async fn propose_strategy(
        &self,
        request: ReflectionRequest<'_>,
        _assessment: &QualityAssessment,
    ) -> Result<StrategyProposal, ServiceError> {
        let mut strategy = SearchStrategy {
            expand_keywords: true,
            use_code_based_search: true,
            broaden_scope: request.attempt >= 2,
            include_related_fields: request.attempt >= 2,
            additional_keywords: Vec::new(),
        };
        // Singular stems match more program names ("engineers" → "engineer")
        for keyword in extract_keywords(request.query, 5) {
            if keyword.chars().count() > 4 && keyword.ends_with('s') {
                strategy.add_keyword(&keyword[..keyword.len() - 1]);
            }
        }
        Ok(StrategyProposal {
            strategy,
            enhanced_query: request.query.to_string(),
        })
    }
}

// ── Formatting ────────────────────────────────────────────────────────────

const MAX_LISTED_CAMPUSES: usize = 5;

/// Plain-text rendering of aggregated results.
pub fn render(query: &str, aggregated: &AggregatedData) -> String {
    if aggregated.is_empty() {
        return format!(
            "I couldn't find programs for \"{query}\". I can help you explore education programs \
             and the careers they lead to; try naming a subject, like \"nursing programs\"."
        );
    }

    let mut out = String::new();
    if !aggregated.college_programs.is_empty() {
        out.push_str("College programs:\n");
        for program in &aggregated.college_programs {
            out.push_str(&format!("- {} ({})", program.family_name, program.code));
            if !program.campuses.is_empty() {
                let campuses: Vec<&str> = program
                    .campuses
                    .iter()
                    .take(MAX_LISTED_CAMPUSES)
                    .map(String::as_str)
                    .collect();
                out.push_str(&format!(", offered at {}", campuses.join(", ")));
                if program.campuses.len() > MAX_LISTED_CAMPUSES {
                    out.push_str(&format!(" and {} more", program.campuses.len() - MAX_LISTED_CAMPUSES));
                }
            }
            out.push('\n');
        }
    }
    if !aggregated.school_programs.is_empty() {
        out.push_str("School programs:\n");
        for program in &aggregated.school_programs {
            out.push_str(&format!("- {}", program.name));
            if !program.institutions.is_empty() {
                let schools: Vec<&str> = program.institutions.iter().map(String::as_str).collect();
                out.push_str(&format!(" at {}", schools.join(", ")));
            }
            out.push('\n');
        }
    }
    if !aggregated.careers.is_empty() {
        out.push_str("Related careers:\n");
        for career in &aggregated.careers {
            out.push_str(&format!("- {} ({})\n", career.title, career.soc_code));
        }
    }
    out.trim_end().to_string()
}

pub struct TemplateFormatter;

#[async_trait]
impl ResponseFormatter for TemplateFormatter {
    async fn format(&self, request: FormatRequest<'_>) -> Result<String, ServiceError> {
        Ok(render(request.query, request.aggregated))
    }
}
