//! Shared scripted services and repositories for agent tests.

use async_trait::async_trait;
use pathwise_core::catalog::{
    CareerGoalMapping, Career, CipMapping, CollegeProgram, CourseDetail, ProgramRepository,
    SchoolProgram,
};
use pathwise_core::error::{RepositoryError, ServiceError};
use pathwise_core::message::Message;
use pathwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use pathwise_core::services::{
    Bucket, Classification, PlanningAssistant, PlanningPrompt, QualityAssessment, QueryClassifier,
    ReflectionRequest, ReflectionService, ResultVerifier, SearchStrategy, StrategyProposal,
    VerificationRequest,
};
use pathwise_tools::StaticRepository;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// ── Repositories ──────────────────────────────────────────────────────────

pub fn sample_repository() -> Arc<dyn ProgramRepository> {
    Arc::new(StaticRepository::sample().unwrap())
}

pub fn failing_repository() -> Arc<dyn ProgramRepository> {
    Arc::new(FailingRepository)
}

/// Every lookup fails.
pub struct FailingRepository;

fn down(operation: &str) -> RepositoryError {
    RepositoryError::QueryFailed {
        operation: operation.into(),
        reason: "connection reset".into(),
    }
}

#[async_trait]
impl ProgramRepository for FailingRepository {
    fn name(&self) -> &str {
        "failing"
    }
    async fn search_school_programs(&self, _: &[String]) -> Result<Vec<SchoolProgram>, RepositoryError> {
        Err(down("search_school_programs"))
    }
    async fn school_institutions(&self, _: &str) -> Result<Vec<String>, RepositoryError> {
        Err(down("school_institutions"))
    }
    async fn course_detail(&self, _: &str) -> Result<Option<CourseDetail>, RepositoryError> {
        Err(down("course_detail"))
    }
    async fn search_college_programs(&self, _: &[String]) -> Result<Vec<CollegeProgram>, RepositoryError> {
        Err(down("search_college_programs"))
    }
    async fn college_programs_by_code(&self, _: &[String]) -> Result<Vec<CollegeProgram>, RepositoryError> {
        Err(down("college_programs_by_code"))
    }
    async fn expand_code_family(&self, _: &str) -> Result<Vec<CipMapping>, RepositoryError> {
        Err(down("expand_code_family"))
    }
    async fn careers_for_codes(&self, _: &[String]) -> Result<Vec<Career>, RepositoryError> {
        Err(down("careers_for_codes"))
    }
    async fn codes_for_career_goal(&self, _: &str) -> Result<Option<CareerGoalMapping>, RepositoryError> {
        Err(down("codes_for_career_goal"))
    }
    async fn list_school_programs(&self) -> Result<Vec<SchoolProgram>, RepositoryError> {
        Err(down("list_school_programs"))
    }
    async fn list_college_programs(&self) -> Result<Vec<CollegeProgram>, RepositoryError> {
        Err(down("list_college_programs"))
    }
}

// ── Classification ────────────────────────────────────────────────────────

/// Always returns the same classification and counts calls.
pub struct FixedClassifier {
    classification: Classification,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(classification: Classification) -> Self {
        Self {
            classification,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryClassifier for FixedClassifier {
    async fn classify(&self, _query: &str, _history: &[Message]) -> Result<Classification, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.classification.clone())
    }
}

pub struct FailingClassifier;

#[async_trait]
impl QueryClassifier for FailingClassifier {
    async fn classify(&self, _query: &str, _history: &[Message]) -> Result<Classification, ServiceError> {
        Err(ServiceError::Unavailable("classifier offline".into()))
    }
}

// ── Planning ──────────────────────────────────────────────────────────────

/// Replies from a script; the last reply repeats once the script runs out.
pub struct ScriptedPlanner {
    replies: Mutex<Vec<Result<String, ServiceError>>>,
    prompts: Mutex<Vec<PlanningPrompt>>,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<PlanningPrompt> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn prompts(&self) -> Vec<PlanningPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlanningAssistant for ScriptedPlanner {
    async fn propose(&self, prompt: &PlanningPrompt) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let mut replies = self.replies.lock().unwrap();
        match replies.len() {
            0 => Err(ServiceError::Unavailable("script exhausted".into())),
            1 => replies[0].clone(),
            _ => replies.remove(0),
        }
    }
}

// ── Verification ──────────────────────────────────────────────────────────

/// Keeps program rows whose name contains `term`; careers pass through.
pub struct KeepMatchingVerifier {
    term: String,
    calls: AtomicUsize,
}

impl KeepMatchingVerifier {
    pub fn new(term: &str) -> Self {
        Self {
            term: term.to_lowercase(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultVerifier for KeepMatchingVerifier {
    async fn verify(&self, _request: VerificationRequest<'_>, bucket: Bucket) -> Result<Bucket, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let keep = |name: &str| name.to_lowercase().contains(&self.term);
        Ok(match bucket {
            Bucket::School(rows) => Bucket::School(rows.into_iter().filter(|r| keep(&r.name)).collect()),
            Bucket::College(rows) => Bucket::College(rows.into_iter().filter(|r| keep(&r.name)).collect()),
            careers => careers,
        })
    }
}

/// Returns every bucket unchanged.
pub struct PassThroughVerifier;

#[async_trait]
impl ResultVerifier for PassThroughVerifier {
    async fn verify(&self, _request: VerificationRequest<'_>, bucket: Bucket) -> Result<Bucket, ServiceError> {
        Ok(bucket)
    }
}

pub struct FailingVerifier(pub ServiceError);

#[async_trait]
impl ResultVerifier for FailingVerifier {
    async fn verify(&self, _request: VerificationRequest<'_>, _bucket: Bucket) -> Result<Bucket, ServiceError> {
        Err(self.0.clone())
    }
}

/// Answers with an empty bucket of a different kind.
pub struct WrongKindVerifier;

#[async_trait]
impl ResultVerifier for WrongKindVerifier {
    async fn verify(&self, _request: VerificationRequest<'_>, bucket: Bucket) -> Result<Bucket, ServiceError> {
        Ok(match bucket {
            Bucket::School(_) => Bucket::Careers(vec![]),
            _ => Bucket::School(vec![]),
        })
    }
}

// ── Reflection ────────────────────────────────────────────────────────────

/// Assessments from a script (the last repeats), with a fixed proposal.
pub struct ScriptedReflector {
    assessments: Mutex<Vec<QualityAssessment>>,
    proposal: Option<StrategyProposal>,
    assess_calls: AtomicUsize,
    proposal_calls: AtomicUsize,
    attempts_seen: Mutex<Vec<u32>>,
    queries_seen: Mutex<Vec<String>>,
}

impl ScriptedReflector {
    pub fn sequence(assessments: Vec<QualityAssessment>) -> Self {
        Self {
            assessments: Mutex::new(assessments),
            proposal: Some(StrategyProposal {
                strategy: SearchStrategy {
                    broaden_scope: true,
                    ..Default::default()
                },
                enhanced_query: String::new(),
            }),
            assess_calls: AtomicUsize::new(0),
            proposal_calls: AtomicUsize::new(0),
            attempts_seen: Mutex::new(Vec::new()),
            queries_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(assessment: QualityAssessment) -> Self {
        Self::sequence(vec![assessment])
    }

    pub fn with_proposal(mut self, proposal: StrategyProposal) -> Self {
        self.proposal = Some(proposal);
        self
    }

    pub fn with_failing_proposals(mut self) -> Self {
        self.proposal = None;
        self
    }

    pub fn assessments(&self) -> usize {
        self.assess_calls.load(Ordering::SeqCst)
    }

    pub fn proposals(&self) -> usize {
        self.proposal_calls.load(Ordering::SeqCst)
    }

    pub fn attempts_seen(&self) -> Vec<u32> {
        self.attempts_seen.lock().unwrap().clone()
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.queries_seen.lock().unwrap().clone()
    }
}

pub fn assessment(score: f32, good_enough: bool) -> QualityAssessment {
    QualityAssessment {
        quality_score: score,
        is_good_enough: good_enough,
        issues: vec![],
        suggestions: vec![],
    }
}

#[async_trait]
impl ReflectionService for ScriptedReflector {
    async fn assess(&self, request: ReflectionRequest<'_>) -> Result<QualityAssessment, ServiceError> {
        self.assess_calls.fetch_add(1, Ordering::SeqCst);
        self.attempts_seen.lock().unwrap().push(request.attempt);
        self.queries_seen.lock().unwrap().push(request.query.to_string());
        let mut assessments = self.assessments.lock().unwrap();
        match assessments.len() {
            0 => Err(ServiceError::Unavailable("script exhausted".into())),
            1 => Ok(assessments[0].clone()),
            _ => Ok(assessments.remove(0)),
        }
    }

    async fn propose_strategy(
        &self,
        _request: ReflectionRequest<'_>,
        _assessment: &QualityAssessment,
    ) -> Result<StrategyProposal, ServiceError> {
        self.proposal_calls.fetch_add(1, Ordering::SeqCst);
        self.proposal
            .clone()
            .ok_or_else(|| ServiceError::Timeout("reflection".into()))
    }
}

pub struct FailingReflector(pub ServiceError);

#[async_trait]
impl ReflectionService for FailingReflector {
    async fn assess(&self, _request: ReflectionRequest<'_>) -> Result<QualityAssessment, ServiceError> {
        Err(self.0.clone())
    }

    async fn propose_strategy(
        &self,
        _request: ReflectionRequest<'_>,
        _assessment: &QualityAssessment,
    ) -> Result<StrategyProposal, ServiceError> {
        Err(self.0.clone())
    }
}

// ── Formatting ────────────────────────────────────────────────────────────

pub struct FailingFormatter;

#[async_trait]
impl pathwise_core::services::ResponseFormatter for FailingFormatter {
    async fn format(&self, _request: pathwise_core::services::FormatRequest<'_>) -> Result<String, ServiceError> {
        Err(ServiceError::RateLimited { retry_after_secs: 30 })
    }
}

// ── Provider ──────────────────────────────────────────────────────────────

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// fails once the queue is empty.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ServiceError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ServiceError::Unavailable("no more scripted responses".into()));
        }
        Ok(responses.remove(0))
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}
