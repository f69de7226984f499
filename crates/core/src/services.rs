//! External service traits for classification, planning assistance,
//! verification, reflection and formatting.
//!
//! The engine decides *when* to call these and what to do with their
//! output; how they produce it is up to the implementation (an LLM, a
//! heuristic, a scripted test double). Every call site has a degraded
//! path, so implementations are free to fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::aggregate::AggregatedData;
use crate::catalog::{Career, CollegeProgram, SchoolProgram};
use crate::error::ServiceError;
use crate::message::Message;
use crate::profile::{Tier, UserProfile};
use crate::tool::ToolOperation;

// ── Classification ────────────────────────────────────────────────────────

/// What kind of question the user asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    ProgramSearch,
    CareerExploration,
    PathwayTrace,
    General,
    SmallTalk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub needs_retrieval: bool,
    pub query_kind: QueryKind,
    #[serde(default)]
    pub reasoning: String,
}

#[async_trait]
pub trait QueryClassifier: Send + Sync {
    async fn classify(&self, query: &str, history: &[Message]) -> Result<Classification, ServiceError>;
}

// ── Planning ──────────────────────────────────────────────────────────────

/// How reflection wants the next attempt to search differently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStrategy {
    #[serde(default)]
    pub expand_keywords: bool,
    #[serde(default)]
    pub use_code_based_search: bool,
    #[serde(default)]
    pub broaden_scope: bool,
    #[serde(default)]
    pub include_related_fields: bool,
    /// Ordered, duplicate-free
    #[serde(default)]
    pub additional_keywords: Vec<String>,
}

impl SearchStrategy {
    /// Append a keyword unless it is already present (case-insensitive).
    pub fn add_keyword(&mut self, keyword: &str) {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !self.additional_keywords.contains(&keyword) {
            self.additional_keywords.push(keyword);
        }
    }

    /// Normalize `additional_keywords` into an ordered set.
    pub fn normalized(mut self) -> Self {
        let raw = std::mem::take(&mut self.additional_keywords);
        for keyword in &raw {
            self.add_keyword(keyword);
        }
        self
    }
}

/// Everything the planning-assist service is told about the request.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningPrompt {
    pub query: String,
    pub keywords: Vec<String>,
    pub codes: Vec<String>,
    pub enhanced_keywords: Vec<String>,
    pub tier: Tier,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SearchStrategy>,
    pub catalog: Vec<ToolOperation>,
}

impl PlanningPrompt {
    /// Render as instructions for a text model.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "Choose retrieval operations for an education and career pathway question.\n\
             Respond with a JSON array of objects: [{\"tool\": <name>, \"args\": <args>}].\n\n## Operations\n",
        );
        for op in &self.catalog {
            out.push_str(&format!("- {}: {}\n", op.as_str(), op.description()));
        }
        out.push_str(&format!("\n## Request\nQuery: {}\n", self.query));
        out.push_str(&format!("Keywords: {}\n", self.keywords.join(", ")));
        if !self.codes.is_empty() {
            out.push_str(&format!("Known taxonomy codes (prefer code search): {}\n", self.codes.join(", ")));
        }
        if !self.enhanced_keywords.is_empty() {
            out.push_str(&format!("Career-goal keywords: {}\n", self.enhanced_keywords.join(", ")));
        }
        out.push_str(&format!("Education tier: {}\nAttempt: {}\n", self.tier, self.attempt));
        if let Some(strategy) = &self.strategy {
            out.push_str(&format!(
                "Strategy: broaden_scope={}, use_code_based_search={}, include_related_fields={}, expand_keywords={}\n",
                strategy.broaden_scope,
                strategy.use_code_based_search,
                strategy.include_related_fields,
                strategy.expand_keywords
            ));
        }
        out
    }
}

#[async_trait]
pub trait PlanningAssistant: Send + Sync {
    /// Propose tool calls as structured text. The planner parses and validates it.
    async fn propose(&self, prompt: &PlanningPrompt) -> Result<String, ServiceError>;
}

// ── Verification ──────────────────────────────────────────────────────────

/// A typed result bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum Bucket {
    School(Vec<SchoolProgram>),
    College(Vec<CollegeProgram>),
    Careers(Vec<Career>),
}

impl Bucket {
    pub fn kind(&self) -> &'static str {
        match self {
            Bucket::School(_) => "school",
            Bucket::College(_) => "college",
            Bucket::Careers(_) => "careers",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Bucket::School(rows) => rows.len(),
            Bucket::College(rows) => rows.len(),
            Bucket::Careers(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub query: &'a str,
    pub history: &'a [Message],
    /// The token that best represents what the user is after
    pub primary_intent: Option<&'a str>,
    pub profile: Option<&'a UserProfile>,
}

#[async_trait]
pub trait ResultVerifier: Send + Sync {
    /// Return the bucket filtered to rows relevant to the request.
    async fn verify(&self, request: VerificationRequest<'_>, bucket: Bucket) -> Result<Bucket, ServiceError>;
}

// ── Reflection ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ReflectionRequest<'a> {
    /// The user's original query, never the enhanced one
    pub query: &'a str,
    pub aggregated: &'a AggregatedData,
    pub profile: &'a UserProfile,
    pub history: &'a [Message],
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// 0–10
    pub quality_score: f32,
    pub is_good_enough: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProposal {
    pub strategy: SearchStrategy,
    pub enhanced_query: String,
}

#[async_trait]
pub trait ReflectionService: Send + Sync {
    async fn assess(&self, request: ReflectionRequest<'_>) -> Result<QualityAssessment, ServiceError>;

    async fn propose_strategy(
        &self,
        request: ReflectionRequest<'_>,
        assessment: &QualityAssessment,
    ) -> Result<StrategyProposal, ServiceError>;
}

// ── Formatting ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct FormatRequest<'a> {
    pub query: &'a str,
    pub aggregated: &'a AggregatedData,
    pub history: &'a [Message],
    pub profile: &'a UserProfile,
}

#[async_trait]
pub trait ResponseFormatter: Send + Sync {
    async fn format(&self, request: FormatRequest<'_>) -> Result<String, ServiceError>;
}
