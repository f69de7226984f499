//! Tool executor: runs a validated plan against the program repository.
//!
//! Calls run strictly in plan order and each merges its fragment into the
//! attempt's [`CollectedData`]. A failing call is recorded and skipped;
//! it never stops the remaining calls.

use futures::future::join_all;
use pathwise_cache::{CacheClient, CacheKey};
use pathwise_core::catalog::{CollectedData, CollegeProgram, ProgramRepository, SchoolProgram};
use pathwise_core::error::{RepositoryError, ToolError};
use pathwise_core::profile::Tier;
use pathwise_core::tool::{CareerScope, ToolCall, ToolOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A single call that failed during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub operation: ToolOperation,
    pub args: Value,
    pub message: String,
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}): {}", self.operation, self.args, self.message)
    }
}

/// What one execution pass produced.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub data: CollectedData,
    pub errors: Vec<ExecutionError>,
    /// Operations that completed, in execution order
    pub tools_used: Vec<String>,
}

/// Cache tag naming the kind of rows an operation returns.
fn data_kind(operation: ToolOperation) -> &'static str {
    match operation {
        ToolOperation::SearchSchoolPrograms => "school",
        ToolOperation::SearchCollegePrograms | ToolOperation::SearchByCipCode => "college",
        ToolOperation::ExpandCipFamily => "taxonomy",
        ToolOperation::GetCareers => "careers",
        ToolOperation::ComprehensiveTrace => "trace",
    }
}

fn failed(operation: ToolOperation, e: RepositoryError) -> ToolError {
    ToolError::ExecutionFailed {
        operation: operation.as_str().to_string(),
        reason: e.to_string(),
    }
}

pub struct ToolExecutor {
    repository: Arc<dyn ProgramRepository>,
    cache: Option<Arc<CacheClient>>,
}

impl ToolExecutor {
    pub fn new(repository: Arc<dyn ProgramRepository>) -> Self {
        Self {
            repository,
            cache: None,
        }
    }

    /// Cache each call's fragment.
    pub fn with_cache(mut self, cache: Arc<CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run `calls` in order for a user of `tier`.
    ///
    /// `context_codes` are taxonomy codes already known from the query
    /// context; `get_careers(all)` resolves against them plus every code
    /// collected by earlier calls.
    pub async fn execute(&self, calls: &[ToolCall], context_codes: &[String], tier: Tier) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::default();

        for call in calls {
            let operation = call.operation();
            if !operation.allowed_for(tier) {
                warn!(tool = %operation, %tier, "Skipping operation outside the user's tier");
                outcome.errors.push(ExecutionError {
                    operation,
                    args: call.args_value(),
                    message: ToolError::NotAllowed {
                        operation: operation.as_str().to_string(),
                        tier: tier.to_string(),
                    }
                    .to_string(),
                });
                continue;
            }

            let career_codes = match call {
                ToolCall::GetCareers(CareerScope::All) => {
                    let mut codes = outcome.data.codes();
                    for code in context_codes {
                        if !codes.contains(code) {
                            codes.push(code.clone());
                        }
                    }
                    codes
                }
                _ => Vec::new(),
            };

            match self.run_cached(call, &career_codes, tier).await {
                Ok(fragment) => {
                    debug!(
                        tool = %operation,
                        school = fragment.school_programs.len(),
                        college = fragment.college_programs.len(),
                        careers = fragment.careers.len(),
                        "Tool call complete"
                    );
                    outcome.data.merge(fragment);
                    outcome.tools_used.push(operation.as_str().to_string());
                }
                Err(e) => {
                    warn!(tool = %operation, args = %call.args_value(), error = %e, "Tool call failed");
                    outcome.errors.push(ExecutionError {
                        operation,
                        args: call.args_value(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            calls = calls.len(),
            succeeded = outcome.tools_used.len(),
            failed = outcome.errors.len(),
            "Plan executed"
        );
        outcome
    }

    async fn run_cached(&self, call: &ToolCall, career_codes: &[String], tier: Tier) -> Result<CollectedData, ToolError> {
        let Some(cache) = &self.cache else {
            return self.run(call, career_codes, tier).await;
        };

        let operation = call.operation();
        let key = cache.key(
            &CacheKey::new(operation.as_str())
                .with_param("args", call.args_value())
                .with_param("resolved_codes", career_codes)
                .with_param("tier", tier.as_str()),
        );
        if let Some(fragment) = cache.get_as::<CollectedData>(&key).await {
            debug!(tool = %operation, "Tool result served from cache");
            return Ok(fragment);
        }

        let fragment = self.run(call, career_codes, tier).await?;
        cache
            .set(&key, &fragment, None, &[operation.as_str(), data_kind(operation)])
            .await;
        Ok(fragment)
    }

    async fn run(&self, call: &ToolCall, career_codes: &[String], tier: Tier) -> Result<CollectedData, ToolError> {
        let operation = call.operation();
        let repo = &self.repository;

        match call {
            ToolCall::SearchSchoolPrograms(keywords) => {
                let programs = repo
                    .search_school_programs(keywords)
                    .await
                    .map_err(|e| failed(operation, e))?;
                Ok(self.with_institutions(programs).await)
            }
            ToolCall::SearchCollegePrograms(keywords) => {
                let rows = repo
                    .search_college_programs(keywords)
                    .await
                    .map_err(|e| failed(operation, e))?;
                Ok(college_fragment(rows))
            }
            ToolCall::SearchByCipCode(codes) => {
                let rows = repo
                    .college_programs_by_code(codes)
                    .await
                    .map_err(|e| failed(operation, e))?;
                Ok(college_fragment(rows))
            }
            ToolCall::ExpandCipFamily(prefix) => {
                let mappings = repo
                    .expand_code_family(prefix)
                    .await
                    .map_err(|e| failed(operation, e))?;
                if mappings.is_empty() {
                    return Ok(CollectedData::default());
                }
                // The related programs themselves, not just their codes
                let codes: Vec<String> = mappings.iter().map(|m| m.cip_code.clone()).collect();
                let rows = repo
                    .college_programs_by_code(&codes)
                    .await
                    .map_err(|e| failed(operation, e))?;
                Ok(CollectedData {
                    cip_mappings: mappings,
                    ..college_fragment(rows)
                })
            }
            ToolCall::GetCareers(scope) => {
                let codes = match scope {
                    CareerScope::All => career_codes,
                    CareerScope::Codes(codes) => codes.as_slice(),
                };
                if codes.is_empty() {
                    debug!("No codes to resolve careers against");
                    return Ok(CollectedData::default());
                }
                let careers = repo
                    .careers_for_codes(codes)
                    .await
                    .map_err(|e| failed(operation, e))?;
                Ok(CollectedData {
                    careers,
                    ..Default::default()
                })
            }
            ToolCall::ComprehensiveTrace(keywords) => self.trace(keywords, tier).await,
        }
    }

    /// School search (when the tier allows it), college search, then the
    /// careers linked to every code found.
    async fn trace(&self, keywords: &[String], tier: Tier) -> Result<CollectedData, ToolError> {
        let operation = ToolOperation::ComprehensiveTrace;
        let repo = &self.repository;
        let mut data = CollectedData::default();

        if tier.includes_school() {
            let programs = repo
                .search_school_programs(keywords)
                .await
                .map_err(|e| failed(operation, e))?;
            data.merge(self.with_institutions(programs).await);
        }

        let rows = repo
            .search_college_programs(keywords)
            .await
            .map_err(|e| failed(operation, e))?;
        data.merge(college_fragment(rows));

        let codes = data.codes();
        if !codes.is_empty() {
            data.careers = repo
                .careers_for_codes(&codes)
                .await
                .map_err(|e| failed(operation, e))?;
        }
        Ok(data)
    }

    /// Expand each school program into one row per institution offering
    /// it. Institution lookups run concurrently; a failed lookup keeps the
    /// program row without institutions.
    async fn with_institutions(&self, programs: Vec<SchoolProgram>) -> CollectedData {
        let lookups = programs
            .iter()
            .map(|p| self.repository.school_institutions(&p.name));
        let results = join_all(lookups).await;

        let mut data = CollectedData::default();
        for (program, result) in programs.into_iter().zip(results) {
            let institutions = match result {
                Ok(list) => list,
                Err(e) => {
                    warn!(program = %program.name, error = %e, "Institution lookup failed");
                    Vec::new()
                }
            };

            if institutions.is_empty() {
                if let Some(institution) = &program.institution {
                    data.institutions.insert(institution.clone());
                }
                data.school_programs.push(program);
                continue;
            }

            for institution in institutions {
                data.institutions.insert(institution.clone());
                data.school_programs.push(SchoolProgram {
                    institution: Some(institution),
                    ..program.clone()
                });
            }
        }
        data
    }
}

fn college_fragment(rows: Vec<CollegeProgram>) -> CollectedData {
    CollectedData {
        campuses: rows.iter().map(|r| r.campus.clone()).collect(),
        college_programs: rows,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::StaticRepository;
    use async_trait::async_trait;
    use pathwise_cache::CacheSettings;
    use pathwise_core::catalog::{CareerGoalMapping, Career, CipMapping, CourseDetail};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(Arc::new(StaticRepository::sample().unwrap()))
    }

    /// Delegates to the sample dataset, failing college keyword search and
    /// counting college reads.
    struct FlakyRepository {
        inner: StaticRepository,
        college_reads: AtomicUsize,
        fail_college_search: bool,
    }

    impl FlakyRepository {
        fn new(fail_college_search: bool) -> Self {
            Self {
                inner: StaticRepository::sample().unwrap(),
                college_reads: AtomicUsize::new(0),
                fail_college_search,
            }
        }
    }

    #[async_trait]
    impl ProgramRepository for FlakyRepository {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn search_school_programs(&self, k: &[String]) -> Result<Vec<SchoolProgram>, RepositoryError> {
            self.inner.search_school_programs(k).await
        }
        async fn school_institutions(&self, p: &str) -> Result<Vec<String>, RepositoryError> {
            if p.contains("Health") {
                return Err(RepositoryError::QueryFailed {
                    operation: "school_institutions".into(),
                    reason: "timeout".into(),
                });
            }
            self.inner.school_institutions(p).await
        }
        async fn course_detail(&self, p: &str) -> Result<Option<CourseDetail>, RepositoryError> {
            self.inner.course_detail(p).await
        }
        async fn search_college_programs(&self, k: &[String]) -> Result<Vec<CollegeProgram>, RepositoryError> {
            self.college_reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_college_search {
                return Err(RepositoryError::QueryFailed {
                    operation: "search_college_programs".into(),
                    reason: "connection reset".into(),
                });
            }
            self.inner.search_college_programs(k).await
        }
        async fn college_programs_by_code(&self, c: &[String]) -> Result<Vec<CollegeProgram>, RepositoryError> {
            self.inner.college_programs_by_code(c).await
        }
        async fn expand_code_family(&self, p: &str) -> Result<Vec<CipMapping>, RepositoryError> {
            self.inner.expand_code_family(p).await
        }
        async fn careers_for_codes(&self, c: &[String]) -> Result<Vec<Career>, RepositoryError> {
            self.inner.careers_for_codes(c).await
        }
        async fn codes_for_career_goal(&self, g: &str) -> Result<Option<CareerGoalMapping>, RepositoryError> {
            self.inner.codes_for_career_goal(g).await
        }
        async fn list_school_programs(&self) -> Result<Vec<SchoolProgram>, RepositoryError> {
            self.inner.list_school_programs().await
        }
        async fn list_college_programs(&self) -> Result<Vec<CollegeProgram>, RepositoryError> {
            self.inner.list_college_programs().await
        }
    }

    #[tokio::test]
    async fn trace_collects_all_buckets() {
        let outcome = executor()
            .execute(&[ToolCall::ComprehensiveTrace(kw(&["computer", "science"]))], &[], Tier::Any)
            .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.tools_used, vec!["comprehensive_trace"]);
        let data = &outcome.data;
        assert!(data.college_programs.iter().any(|p| p.cip_code == "11.0701"));
        // One row per institution offering the academy
        assert_eq!(
            data.school_programs
                .iter()
                .filter(|p| p.name == "Computer Science Academy")
                .count(),
            2
        );
        assert!(data.institutions.contains("Lincoln High School"));
        assert!(data.campuses.contains("North Campus"));
        assert!(data.careers.iter().any(|c| c.title == "Software Developers"));
    }

    #[tokio::test]
    async fn college_tier_trace_skips_school_search() {
        let outcome = executor()
            .execute(&[ToolCall::ComprehensiveTrace(kw(&["computer"]))], &[], Tier::College)
            .await;
        assert!(outcome.data.school_programs.is_empty());
        assert!(!outcome.data.college_programs.is_empty());
    }

    #[tokio::test]
    async fn school_only_call_is_refused_for_college_tier() {
        let outcome = executor()
            .execute(&[ToolCall::SearchSchoolPrograms(kw(&["nursing"]))], &[], Tier::College)
            .await;
        assert!(outcome.tools_used.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].operation, ToolOperation::SearchSchoolPrograms);
    }

    #[tokio::test]
    async fn get_careers_all_uses_collected_and_context_codes() {
        let calls = vec![
            ToolCall::SearchByCipCode(kw(&["26.0101"])),
            ToolCall::GetCareers(CareerScope::All),
        ];
        let outcome = executor().execute(&calls, &kw(&["51.3801"]), Tier::Any).await;

        let titles: Vec<&str> = outcome.data.careers.iter().map(|c| c.title.as_str()).collect();
        assert!(titles.contains(&"Zoologists and Wildlife Biologists"));
        assert!(titles.contains(&"Registered Nurses"));
        assert_eq!(outcome.tools_used, vec!["search_by_cip_code", "get_careers"]);
    }

    #[tokio::test]
    async fn get_careers_with_nothing_collected_is_empty() {
        let outcome = executor()
            .execute(&[ToolCall::GetCareers(CareerScope::All)], &[], Tier::Any)
            .await;
        assert!(outcome.errors.is_empty());
        assert!(outcome.data.careers.is_empty());
    }

    #[tokio::test]
    async fn failures_are_recorded_and_execution_continues() {
        let executor = ToolExecutor::new(Arc::new(FlakyRepository::new(true)));
        let calls = vec![
            ToolCall::SearchCollegePrograms(kw(&["nursing"])),
            ToolCall::ExpandCipFamily("51".into()),
        ];
        let outcome = executor.execute(&calls, &[], Tier::Any).await;

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].operation, ToolOperation::SearchCollegePrograms);
        assert_eq!(outcome.errors[0].args, serde_json::json!({"keywords": ["nursing"]}));
        assert!(outcome.errors[0].message.contains("connection reset"));
        assert_eq!(outcome.tools_used, vec!["expand_cip_family"]);
        assert_eq!(outcome.data.cip_mappings.len(), 2);
    }

    #[tokio::test]
    async fn family_expansion_fetches_related_programs() {
        let calls = vec![
            ToolCall::SearchByCipCode(kw(&["51.3801"])),
            ToolCall::ExpandCipFamily("51".into()),
            ToolCall::GetCareers(CareerScope::All),
        ];
        let outcome = executor().execute(&calls, &[], Tier::Any).await;

        assert!(outcome.errors.is_empty());
        assert!(outcome.data.college_programs.iter().any(|p| p.cip_code == "51.3901"));
        assert!(outcome.data.campuses.contains("East Campus"));
        assert!(outcome.data.careers.iter().any(|c| c.soc_code == "29-2061"));
    }

    #[tokio::test]
    async fn unknown_family_is_empty() {
        let outcome = executor()
            .execute(&[ToolCall::ExpandCipFamily("99".into())], &[], Tier::Any)
            .await;
        assert!(outcome.errors.is_empty());
        assert!(outcome.data.is_empty());
        assert!(outcome.data.cip_mappings.is_empty());
    }

    #[tokio::test]
    async fn failed_institution_lookup_keeps_program() {
        let executor = ToolExecutor::new(Arc::new(FlakyRepository::new(false)));
        let outcome = executor
            .execute(&[ToolCall::SearchSchoolPrograms(kw(&["nursing"]))], &[], Tier::School)
            .await;
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.data.school_programs.len(), 1);
        assert!(outcome.data.school_programs[0].institution.is_none());
    }

    #[tokio::test]
    async fn cached_calls_skip_the_repository() {
        let repo = Arc::new(FlakyRepository::new(false));
        let cache = Arc::new(CacheClient::in_memory(CacheSettings::default()));
        let executor = ToolExecutor::new(repo.clone()).with_cache(cache.clone());
        let calls = vec![ToolCall::SearchCollegePrograms(kw(&["biology"]))];

        let first = executor.execute(&calls, &[], Tier::Any).await;
        let second = executor.execute(&calls, &[], Tier::Any).await;

        assert_eq!(repo.college_reads.load(Ordering::SeqCst), 1);
        assert_eq!(first.data, second.data);

        assert_eq!(cache.invalidate_by_tags(&["college"]).await, 1);
        executor.execute(&calls, &[], Tier::Any).await;
        assert_eq!(repo.college_reads.load(Ordering::SeqCst), 2);
    }
}
