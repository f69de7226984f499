//! LLM-backed implementations of every service trait.
//!
//! Each call is one system + user prompt pair sent to the configured
//! [`Provider`]. Structured answers are pulled out of the reply with
//! [`extract_json`](super::extract_json) and deserialized; anything that
//! does not parse becomes [`ServiceError::MalformedOutput`] and the engine
//! takes its degraded path.

use super::extract_json_object;
use async_trait::async_trait;
use pathwise_core::error::ServiceError;
use pathwise_core::message::{Message, Role, recent_turns};
use pathwise_core::provider::{Provider, ProviderRequest};
use pathwise_core::services::{
    Bucket, Classification, FormatRequest, PlanningAssistant, PlanningPrompt, QualityAssessment,
    QueryClassifier, ReflectionRequest, ReflectionService, ResponseFormatter, ResultVerifier,
    StrategyProposal, VerificationRequest,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Prior turns shown to the model.
const PROMPT_HISTORY_TURNS: usize = 6;

const CLASSIFY_SYSTEM: &str = "You route questions for an education and career pathway assistant. \
Decide whether answering needs a lookup in the program and career datasets. \
Reply with a JSON object: {\"needs_retrieval\": bool, \"query_kind\": one of \
\"program_search\", \"career_exploration\", \"pathway_trace\", \"general\", \"small_talk\", \
\"reasoning\": string}.";

const PLAN_SYSTEM: &str = "You plan dataset lookups for an education and career pathway assistant. \
Only use the listed operations. Reply with the JSON array only.";

const VERIFY_SYSTEM: &str = "You check search results for relevance to a student's question. \
Reply with a JSON object {\"keep\": [indices of relevant rows]}.";

const ASSESS_SYSTEM: &str = "You grade how well retrieved programs and careers answer a student's question. \
Reply with a JSON object: {\"quality_score\": 0-10, \"is_good_enough\": bool, \
\"issues\": [string], \"suggestions\": [string]}.";

const STRATEGY_SYSTEM: &str = "You improve a failed program search. Reply with a JSON object: \
{\"strategy\": {\"expand_keywords\": bool, \"use_code_based_search\": bool, \"broaden_scope\": bool, \
\"include_related_fields\": bool, \"additional_keywords\": [string]}, \"enhanced_query\": string}.";

const FORMAT_SYSTEM: &str = "You are a friendly education and career advisor. Answer the student's \
question using only the programs and careers provided. Mention campuses and schools where given. \
Keep it concise.";

pub struct LlmServices {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
}

impl LlmServices {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    async fn ask(&self, system: &str, user: String, json_mode: bool) -> Result<String, ServiceError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: self.temperature,
            max_tokens: None,
            json_mode,
        };
        let response = self.provider.complete(request).await?;
        debug!(
            provider = self.provider.name(),
            model = %response.model,
            chars = response.message.content.len(),
            "Service completion"
        );
        Ok(response.message.content)
    }

    async fn ask_object<T: DeserializeOwned>(&self, system: &str, user: String) -> Result<T, ServiceError> {
        let text = self.ask(system, user, true).await?;
        let object = extract_json_object(&text)
            .ok_or_else(|| ServiceError::MalformedOutput(format!("no JSON object in: {}", preview(&text))))?;
        serde_json::from_value(Value::Object(object)).map_err(|e| ServiceError::MalformedOutput(e.to_string()))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

fn render_history(history: &[Message]) -> String {
    let turns = recent_turns(history, PROMPT_HISTORY_TURNS);
    if turns.is_empty() {
        return "(none)".into();
    }
    turns
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "student",
                _ => "assistant",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

#[async_trait]
impl QueryClassifier for LlmServices {
    async fn classify(&self, query: &str, history: &[Message]) -> Result<Classification, ServiceError> {
        let user = format!("Conversation so far:\n{}\n\nQuestion: {query}", render_history(history));
        self.ask_object(CLASSIFY_SYSTEM, user).await
    }
}

#[async_trait]
impl PlanningAssistant for LlmServices {
    async fn propose(&self, prompt: &PlanningPrompt) -> Result<String, ServiceError> {
        self.ask(PLAN_SYSTEM, prompt.render(), false).await
    }
}

#[derive(serde::Deserialize)]
struct KeepList {
    #[serde(default)]
    keep: Vec<usize>,
}

/// `rows` restricted to the indices in `keep` (out-of-range ignored).
fn keep_rows<T: Clone>(rows: &[T], keep: &BTreeSet<usize>) -> Vec<T> {
    rows.iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, r)| r.clone())
        .collect()
}

#[async_trait]
impl ResultVerifier for LlmServices {
    async fn verify(&self, request: VerificationRequest<'_>, bucket: Bucket) -> Result<Bucket, ServiceError> {
        let listing: Vec<String> = match &bucket {
            Bucket::School(rows) => rows.iter().map(|r| r.name.clone()).collect(),
            Bucket::College(rows) => rows.iter().map(|r| format!("{} ({})", r.name, r.cip_code)).collect(),
            Bucket::Careers(rows) => rows.iter().map(|r| format!("{} ({})", r.title, r.soc_code)).collect(),
        };
        let mut user = format!(
            "Question: {}\nMain interest: {}\n",
            request.query,
            request.primary_intent.unwrap_or("(unknown)")
        );
        if let Some(profile) = request.profile {
            user.push_str(&format!("Student profile: {}\n", to_json(profile)));
        }
        user.push_str(&format!(
            "Conversation:\n{}\n\n{} rows:\n",
            render_history(request.history),
            bucket.kind()
        ));
        for (i, row) in listing.iter().enumerate() {
            user.push_str(&format!("{i}. {row}\n"));
        }

        let KeepList { keep } = self.ask_object(VERIFY_SYSTEM, user).await?;
        let keep: BTreeSet<usize> = keep.into_iter().collect();
        Ok(match &bucket {
            Bucket::School(rows) => Bucket::School(keep_rows(rows, &keep)),
            Bucket::College(rows) => Bucket::College(keep_rows(rows, &keep)),
            Bucket::Careers(rows) => Bucket::Careers(keep_rows(rows, &keep)),
        })
    }
}

fn reflection_context(request: &ReflectionRequest<'_>) -> String {
    format!(
        "Question: {}\nAttempt: {}\nStudent profile: {}\nConversation:\n{}\n\nResults ({}):\n{}",
        request.query,
        request.attempt,
        to_json(request.profile),
        render_history(request.history),
        request.aggregated.summary(),
        to_json(request.aggregated),
    )
}

#[async_trait]
impl ReflectionService for LlmServices {
    async fn assess(&self, request: ReflectionRequest<'_>) -> Result<QualityAssessment, ServiceError> {
        self.ask_object(ASSESS_SYSTEM, reflection_context(&request)).await
    }

    async fn propose_strategy(
        &self,
        request: ReflectionRequest<'_>,
        assessment: &QualityAssessment,
    ) -> Result<StrategyProposal, ServiceError> {
        let user = format!(
            "{}\n\nAssessment: {}\n",
            reflection_context(&request),
            to_json(assessment)
        );
        self.ask_object(STRATEGY_SYSTEM, user).await
    }
}

#[async_trait]
impl ResponseFormatter for LlmServices {
    async fn format(&self, request: FormatRequest<'_>) -> Result<String, ServiceError> {
        let user = format!(
            "Question: {}\nStudent profile: {}\nConversation:\n{}\n\nData:\n{}",
            request.query,
            to_json(request.profile),
            render_history(request.history),
            to_json(request.aggregated),
        );
        let text = self.ask(FORMAT_SYSTEM, user, false).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::MalformedOutput("empty response".into()));
        }
        Ok(text.to_string())
    }
}
