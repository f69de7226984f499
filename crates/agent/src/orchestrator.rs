//! The orchestrator: one call from a user message to a formatted answer.
//!
//! ```text
//! classify ─┬─ no retrieval ─────────────────────────────────▶ format
//!           └─ attempt 1..=max:
//!                extract → plan → execute → verify → aggregate → reflect
//!                  ▲                                               │
//!                  └──────────── retry (new strategy) ◀────────────┤
//!                                                       accept ────┴─▶ format
//! ```
//!
//! Every stage has a degraded path, so [`Orchestrator::orchestrate`] never
//! fails; non-fatal problems are listed in [`OrchestrationResult::errors`].
//! History-free queries are cached whole, keyed by query and profile.

use crate::aggregator::Aggregator;
use crate::context::ContextExtractor;
use crate::planner::ToolPlanner;
use crate::reflection::{ReflectionController, ReflectionDecision};
use crate::services::heuristic::{self, CountReflector, KeywordClassifier, LexicalVerifier, RuleBasedPlanner, TemplateFormatter};
use crate::services::llm::LlmServices;
use crate::state::QueryState;
use crate::verify::VerifierAdapter;
use pathwise_cache::{CacheClient, CacheKey};
use pathwise_config::{AggregationConfig, AppConfig, OrchestratorConfig, WarmupConfig};
use pathwise_core::aggregate::AggregatedData;
use pathwise_core::catalog::ProgramRepository;
use pathwise_core::message::Message;
use pathwise_core::profile::UserProfile;
use pathwise_core::provider::Provider;
use pathwise_core::services::{
    FormatRequest, PlanningAssistant, QueryClassifier, ReflectionRequest, ReflectionService,
    ResponseFormatter, ResultVerifier,
};
use pathwise_tools::ToolExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TIMEOUT_RESPONSE: &str =
    "Sorry, finding programs for that question took too long. Please try again in a moment.";

/// The external services the pipeline calls.
#[derive(Clone)]
pub struct ServiceSet {
    pub classifier: Arc<dyn QueryClassifier>,
    pub planner: Arc<dyn PlanningAssistant>,
    pub verifier: Arc<dyn ResultVerifier>,
    pub reflection: Arc<dyn ReflectionService>,
    pub formatter: Arc<dyn ResponseFormatter>,
}

impl ServiceSet {
    /// Offline rules for every service.
    pub fn heuristic() -> Self {
        Self {
            classifier: Arc::new(KeywordClassifier),
            planner: Arc::new(RuleBasedPlanner),
            verifier: Arc::new(LexicalVerifier),
            reflection: Arc::new(CountReflector),
            formatter: Arc::new(TemplateFormatter),
        }
    }

    /// Every service backed by one model.
    pub fn llm(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        let services = Arc::new(LlmServices::new(provider, model, temperature));
        Self {
            classifier: services.clone(),
            planner: services.clone(),
            verifier: services.clone(),
            reflection: services.clone(),
            formatter: services,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub response_text: String,
    pub aggregated: AggregatedData,
    pub tools_used: Vec<String>,
    pub quality_score: f32,
    /// Planning attempts made; 0 when no retrieval was needed
    pub attempts: u32,
    pub needs_retrieval: bool,
    /// Served from the cache
    pub cached: bool,
    pub errors: Vec<String>,
}

/// What the whole-pipeline cache stores.
#[derive(Serialize, Deserialize)]
struct CachedOrchestration {
    fingerprint: String,
    result: OrchestrationResult,
}

pub struct OrchestratorBuilder {
    services: ServiceSet,
    repository: Arc<dyn ProgramRepository>,
    cache: Arc<CacheClient>,
    orchestrator: OrchestratorConfig,
    aggregation: AggregationConfig,
    warmup: WarmupConfig,
    pipeline_timeout: Option<Duration>,
}

impl OrchestratorBuilder {
    pub fn with_cache(mut self, cache: Arc<CacheClient>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_orchestrator_config(mut self, config: &OrchestratorConfig) -> Self {
        self.orchestrator = config.clone();
        self
    }

    pub fn with_aggregation_config(mut self, config: &AggregationConfig) -> Self {
        self.aggregation = config.clone();
        self
    }

    pub fn with_warmup_config(mut self, config: &WarmupConfig) -> Self {
        self.warmup = config.clone();
        self
    }

    /// The orchestrator, aggregation and warmup sections of `config`.
    pub fn with_app_config(self, config: &AppConfig) -> Self {
        self.with_orchestrator_config(&config.orchestrator)
            .with_aggregation_config(&config.aggregation)
            .with_warmup_config(&config.warmup)
    }

    /// Override `pipeline_timeout_secs`.
    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Orchestrator {
        let ServiceSet {
            classifier,
            planner,
            verifier,
            reflection,
            formatter,
        } = self.services;
        let config = &self.orchestrator;

        let mut executor = ToolExecutor::new(self.repository.clone());
        if self.cache.is_enabled() {
            executor = executor.with_cache(self.cache.clone());
        }

        Orchestrator {
            classifier,
            formatter,
            extractor: ContextExtractor::new(self.repository.clone())
                .with_max_keywords(config.max_keywords)
                .with_history_window(config.history_window),
            planner: ToolPlanner::new(planner)
                .with_broaden_keyword_limit(config.broaden_keyword_limit)
                .with_repository(self.repository.clone()),
            executor,
            verifier: VerifierAdapter::new(verifier),
            reflection: ReflectionController::new(reflection, config.max_attempts),
            aggregator: Aggregator::new(self.repository.clone(), &self.aggregation),
            pipeline_timeout: self
                .pipeline_timeout
                .unwrap_or(Duration::from_secs(config.pipeline_timeout_secs)),
            repository: self.repository,
            cache: self.cache,
            warmup: self.warmup,
        }
    }
}

pub struct Orchestrator {
    classifier: Arc<dyn QueryClassifier>,
    formatter: Arc<dyn ResponseFormatter>,
    extractor: ContextExtractor,
    planner: ToolPlanner,
    executor: ToolExecutor,
    verifier: VerifierAdapter,
    reflection: ReflectionController,
    pub(crate) aggregator: Aggregator,
    pipeline_timeout: Duration,
    pub(crate) repository: Arc<dyn ProgramRepository>,
    pub(crate) cache: Arc<CacheClient>,
    pub(crate) warmup: WarmupConfig,
}

impl Orchestrator {
    /// Start building an orchestrator. The cache defaults to disabled.
    pub fn builder(services: ServiceSet, repository: Arc<dyn ProgramRepository>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            services,
            repository,
            cache: Arc::new(CacheClient::disabled()),
            orchestrator: OrchestratorConfig::default(),
            aggregation: AggregationConfig::default(),
            warmup: WarmupConfig::default(),
            pipeline_timeout: None,
        }
    }

    pub fn cache(&self) -> &Arc<CacheClient> {
        &self.cache
    }

    pub fn max_attempts(&self) -> u32 {
        self.reflection.max_attempts()
    }

    /// Answer `query` for `profile`, given the prior turns in `history`.
    pub async fn orchestrate(&self, query: &str, profile: &UserProfile, history: &[Message]) -> OrchestrationResult {
        let fingerprint = profile.fingerprint();
        let cache_key = (history.is_empty() && self.cache.is_enabled()).then(|| {
            self.cache.key(
                &CacheKey::new("orchestrate")
                    .with_param("query", query)
                    .with_profile(&fingerprint),
            )
        });

        if let Some(key) = &cache_key {
            if let Some(result) = self.cached_result(query, key, &fingerprint).await {
                return result;
            }
        }

        let result = self.run(query, profile, history).await;

        if let Some(key) = &cache_key {
            if result.needs_retrieval && !result.aggregated.is_empty() {
                let tier = profile.tier();
                let entry = CachedOrchestration {
                    fingerprint,
                    result: result.clone(),
                };
                self.cache
                    .set_for_query(query, key, &entry, None, &["orchestrate", tier.as_str()])
                    .await;
            }
        }
        result
    }

    /// [`orchestrate`](Self::orchestrate) under the configured pipeline
    /// timeout. On expiry the result carries an apology and no data.
    pub async fn orchestrate_with_timeout(
        &self,
        query: &str,
        profile: &UserProfile,
        history: &[Message],
    ) -> OrchestrationResult {
        match tokio::time::timeout(self.pipeline_timeout, self.orchestrate(query, profile, history)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.pipeline_timeout.as_secs_f64(), "Pipeline timed out");
                OrchestrationResult {
                    response_text: TIMEOUT_RESPONSE.into(),
                    aggregated: AggregatedData::default(),
                    tools_used: Vec::new(),
                    quality_score: 0.0,
                    attempts: 0,
                    needs_retrieval: true,
                    cached: false,
                    errors: vec![format!(
                        "pipeline timed out after {:.1}s",
                        self.pipeline_timeout.as_secs_f64()
                    )],
                }
            }
        }
    }

    /// Exact key first, then a near-duplicate query cached for the same profile.
    async fn cached_result(&self, query: &str, key: &str, fingerprint: &str) -> Option<OrchestrationResult> {
        if let Some(entry) = self.cache.get_as::<CachedOrchestration>(key).await {
            if entry.fingerprint == fingerprint {
                info!(query, "Serving cached answer");
                return Some(OrchestrationResult {
                    cached: true,
                    ..entry.result
                });
            }
        }

        let hit = self.cache.find_similar(query).await?;
        let entry: CachedOrchestration = match serde_json::from_value(hit.payload) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key = %hit.key, error = %e, "Similar cache entry is not an answer");
                return None;
            }
        };
        if entry.fingerprint != fingerprint {
            debug!(matched = %hit.query, "Similar query was cached for another profile");
            return None;
        }
        info!(query, matched = %hit.query, similarity = hit.similarity, "Serving answer for a similar query");
        Some(OrchestrationResult {
            cached: true,
            ..entry.result
        })
    }

    async fn run(&self, query: &str, profile: &UserProfile, history: &[Message]) -> OrchestrationResult {
        let mut errors = Vec::new();
        let classification = match self.classifier.classify(query, history).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(error = %e, "Classification failed, using keyword rules");
                errors.push(format!("classification failed: {e}"));
                heuristic::heuristic_classification(query, history)
            }
        };
        debug!(
            needs_retrieval = classification.needs_retrieval,
            kind = ?classification.query_kind,
            reasoning = %classification.reasoning,
            "Query classified"
        );

        if !classification.needs_retrieval {
            let aggregated = AggregatedData::default();
            let response_text = self.format(query, &aggregated, history, profile, &mut errors).await;
            return OrchestrationResult {
                response_text,
                aggregated,
                tools_used: Vec::new(),
                quality_score: 0.0,
                attempts: 0,
                needs_retrieval: false,
                cached: false,
                errors,
            };
        }

        let mut state = QueryState::new(query, profile.clone(), history);
        state.errors = errors;
        let state = self.attempt_loop(state).await;

        let mut errors = state.errors;
        let response_text = self
            .format(&state.query, &state.aggregated, history, profile, &mut errors)
            .await;
        OrchestrationResult {
            response_text,
            quality_score: state.assessment.as_ref().map_or(0.0, |a| a.quality_score),
            aggregated: state.aggregated,
            tools_used: state.tools_used,
            attempts: state.attempt,
            needs_retrieval: true,
            cached: false,
            errors,
        }
    }

    /// Plan, execute, verify, aggregate and reflect until accepted.
    async fn attempt_loop(&self, mut state: QueryState) -> QueryState {
        let tier = state.profile.tier();
        loop {
            info!(attempt = state.attempt, query = %state.planning_query, "Starting attempt");

            let context = self
                .extractor
                .extract(&state.planning_query, &state.history, &state.profile)
                .await;
            state = state.with_context(context);

            let plan = self
                .planner
                .plan(&state.planning_query, &state.context, tier, state.attempt, state.strategy.as_ref())
                .await;
            state = state.with_plan(plan);

            let execution = self.executor.execute(&state.plan, &state.context.codes, tier).await;
            state = state.with_execution(execution);

            let verified = self
                .verifier
                .verify(
                    &state.query,
                    &state.history,
                    &state.keywords,
                    &state.profile,
                    state.collected.clone(),
                )
                .await;
            state = state.with_verified(verified.data, verified.errors);

            let aggregated = self.aggregator.aggregate(&state.verified).await;
            state = state.with_aggregated(aggregated);

            let outcome = self
                .reflection
                .reflect(
                    ReflectionRequest {
                        query: &state.query,
                        aggregated: &state.aggregated,
                        profile: &state.profile,
                        history: &state.history,
                        attempt: state.attempt,
                    },
                    &state.planning_query,
                    &state.context.codes,
                )
                .await;
            state = state.with_assessment(outcome.assessment, outcome.errors);

            match outcome.decision {
                ReflectionDecision::Accept => {
                    info!(
                        attempts = state.attempt,
                        score = state.quality_score(),
                        results = %state.aggregated.summary(),
                        "Attempt accepted"
                    );
                    return state;
                }
                ReflectionDecision::Retry {
                    strategy,
                    enhanced_query,
                } => state = state.next_attempt(strategy, enhanced_query),
            }
        }
    }

    async fn format(
        &self,
        query: &str,
        aggregated: &AggregatedData,
        history: &[Message],
        profile: &UserProfile,
        errors: &mut Vec<String>,
    ) -> String {
        let request = FormatRequest {
            query,
            aggregated,
            history,
            profile,
        };
        match self.formatter.format(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Formatting failed, using the plain template");
                errors.push(format!("formatting failed: {e}"));
                heuristic::render(query, aggregated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use pathwise_cache::CacheSettings;
    use pathwise_core::error::ServiceError;
    use pathwise_core::services::{Classification, QueryKind, SearchStrategy, StrategyProposal};

    fn retrieval() -> Classification {
        Classification {
            needs_retrieval: true,
            query_kind: QueryKind::ProgramSearch,
            reasoning: String::new(),
        }
    }

    fn services() -> ServiceSet {
        ServiceSet {
            classifier: Arc::new(FixedClassifier::new(retrieval())),
            ..ServiceSet::heuristic()
        }
    }

    fn cache() -> Arc<CacheClient> {
        Arc::new(CacheClient::in_memory(CacheSettings::default()))
    }

    #[tokio::test]
    async fn small_talk_skips_retrieval() {
        let orchestrator = Orchestrator::builder(ServiceSet::heuristic(), sample_repository()).build();
        let result = orchestrator.orchestrate("hello", &UserProfile::default(), &[]).await;
        assert!(!result.needs_retrieval);
        assert_eq!(result.attempts, 0);
        assert!(result.tools_used.is_empty());
        assert!(!result.response_text.is_empty());
    }

    #[tokio::test]
    async fn single_good_attempt() {
        let orchestrator = Orchestrator::builder(ServiceSet::heuristic(), sample_repository()).build();
        let result = orchestrator
            .orchestrate("show me welding programs", &UserProfile::default(), &[])
            .await;
        assert!(result.needs_retrieval);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.aggregated.college_programs.len(), 1);
        assert!(result.aggregated.college_programs[0].family_name.starts_with("Welding Technology"));
        assert!(result.tools_used.contains(&"comprehensive_trace".to_string()));
        assert!(result.response_text.contains("Welding Technology"));
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_keywords() {
        let services = ServiceSet {
            classifier: Arc::new(FailingClassifier),
            ..ServiceSet::heuristic()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository()).build();
        let result = orchestrator.orchestrate("nursing programs", &UserProfile::default(), &[]).await;
        assert!(result.needs_retrieval);
        assert!(result.errors.iter().any(|e| e.contains("classification failed")));
        assert!(!result.aggregated.college_programs.is_empty());
    }

    #[tokio::test]
    async fn retries_stop_at_three_attempts() {
        let planner = Arc::new(ScriptedPlanner::new(vec![Ok("[]".into())]));
        let reflector = Arc::new(ScriptedReflector::always(assessment(1.0, false)));
        let services = ServiceSet {
            planner: planner.clone(),
            reflection: reflector.clone(),
            ..services()
        };
        let config = OrchestratorConfig {
            max_attempts: 7,
            ..Default::default()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository())
            .with_orchestrator_config(&config)
            .build();

        let result = orchestrator.orchestrate("astronomy", &UserProfile::default(), &[]).await;
        assert_eq!(result.attempts, 3);
        assert_eq!(planner.calls(), 3);
        assert_eq!(reflector.attempts_seen(), vec![1, 2, 3]);
        assert_eq!(reflector.proposals(), 2);
        assert!((result.quality_score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn enhanced_query_drives_planning_only() {
        let planner = Arc::new(ScriptedPlanner::new(vec![Ok("[]".into())]));
        let reflector = Arc::new(
            ScriptedReflector::sequence(vec![assessment(2.0, false), assessment(7.0, true)]).with_proposal(
                StrategyProposal {
                    strategy: SearchStrategy::default(),
                    enhanced_query: "registered nursing".into(),
                },
            ),
        );
        let services = ServiceSet {
            planner: planner.clone(),
            reflection: reflector.clone(),
            ..services()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository()).build();

        let result = orchestrator.orchestrate("healthcare programs", &UserProfile::default(), &[]).await;
        assert_eq!(result.attempts, 2);

        let prompts = planner.prompts();
        assert_eq!(prompts[0].query, "healthcare programs");
        assert_eq!(prompts[1].query, "registered nursing");
        assert_eq!(prompts[1].keywords, vec!["registered", "nursing"]);
        assert_eq!(reflector.queries_seen(), vec!["healthcare programs", "healthcare programs"]);
        assert!(!result.aggregated.college_programs.is_empty());
    }

    #[tokio::test]
    async fn formatter_failure_uses_template() {
        let services = ServiceSet {
            formatter: Arc::new(FailingFormatter),
            ..services()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository()).build();
        let result = orchestrator.orchestrate("welding", &UserProfile::default(), &[]).await;
        assert!(result.response_text.contains("Welding Technology"));
        assert!(result.errors.iter().any(|e| e.contains("formatting failed")));
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let planner = Arc::new(ScriptedPlanner::new(vec![Ok(
            r#"[{"tool":"comprehensive_trace","args":["nursing"]}]"#.into(),
        )]));
        let services = ServiceSet {
            planner: planner.clone(),
            ..services()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository())
            .with_cache(cache())
            .build();
        let profile = UserProfile::default();

        let first = orchestrator.orchestrate("show me nursing programs", &profile, &[]).await;
        assert!(!first.cached);
        let second = orchestrator.orchestrate("show me nursing programs", &profile, &[]).await;
        assert!(second.cached);
        assert_eq!(second.aggregated, first.aggregated);
        assert_eq!(planner.calls(), 1);

        // {show, me, the, nursing, programs} shares 4 of 5 words
        let similar = orchestrator.orchestrate("show me the nursing programs", &profile, &[]).await;
        assert!(similar.cached);
        assert_eq!(planner.calls(), 1);
    }

    #[tokio::test]
    async fn cache_is_scoped_to_profile_and_skipped_with_history() {
        let planner = Arc::new(ScriptedPlanner::new(vec![Ok("[]".into())]));
        let services = ServiceSet {
            planner: planner.clone(),
            ..services()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository())
            .with_cache(cache())
            .build();

        orchestrator.orchestrate("nursing programs", &UserProfile::default(), &[]).await;
        let other = UserProfile {
            interests: vec!["health".into()],
            ..Default::default()
        };
        let result = orchestrator.orchestrate("nursing programs", &other, &[]).await;
        assert!(!result.cached);
        assert_eq!(planner.calls(), 2);

        let history = vec![Message::user("hi"), Message::assistant("Hello!")];
        let result = orchestrator
            .orchestrate("nursing programs", &UserProfile::default(), &history)
            .await;
        assert!(!result.cached);
        assert_eq!(planner.calls(), 3);
    }

    struct SlowClassifier;

    #[async_trait]
    impl QueryClassifier for SlowClassifier {
        async fn classify(&self, _query: &str, _history: &[Message]) -> Result<Classification, ServiceError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(retrieval())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_degraded_result() {
        let services = ServiceSet {
            classifier: Arc::new(SlowClassifier),
            ..ServiceSet::heuristic()
        };
        let orchestrator = Orchestrator::builder(services, sample_repository())
            .with_pipeline_timeout(Duration::from_secs(5))
            .build();
        let result = orchestrator
            .orchestrate_with_timeout("nursing", &UserProfile::default(), &[])
            .await;
        assert_eq!(result.response_text, TIMEOUT_RESPONSE);
        assert!(result.aggregated.is_empty());
        assert_eq!(result.errors, vec!["pipeline timed out after 5.0s"]);
    }
}
