//! The Pathwise query pipeline.
//!
//! A request flows through a fixed sequence of stages, retried under a
//! reflection loop:
//!
//! 1. **Classify**: does the message need retrieval at all?
//! 2. **Extract** keywords, taxonomy codes and the conversational mode
//! 3. **Plan** tool calls with the planning assistant, then repair the plan
//! 4. **Execute** the calls in order against the program repository
//! 5. **Verify** each result bucket for relevance
//! 6. **Aggregate** programs into families and consolidate careers
//! 7. **Reflect**: accept, or retry with a new strategy (at most 3 attempts)
//! 8. **Format** the answer
//!
//! [`Orchestrator`] wires the stages together; each stage is usable alone.
//! It also serves full program listings ([`ListingKind`]) and cache warming.

pub mod aggregator;
pub mod context;
pub mod listing;
pub mod orchestrator;
pub mod planner;
pub mod reflection;
pub mod services;
pub mod state;
pub mod verify;
pub mod warmup;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod test_helpers;

pub use aggregator::{Aggregator, CollegeLedger, consolidate_careers, select_representative_name};
pub use context::{ContextExtractor, ExtractedContext, QueryMode};
pub use listing::{ListingKind, ProgramListing};
pub use orchestrator::{OrchestrationResult, Orchestrator, OrchestratorBuilder, ServiceSet};
pub use planner::{PlanOutcome, ToolPlanner};
pub use reflection::{ReflectionController, ReflectionDecision, ReflectionOutcome};
pub use services::{CountReflector, KeywordClassifier, LexicalVerifier, LlmServices, RuleBasedPlanner, TemplateFormatter};
pub use state::QueryState;
pub use verify::{VerificationOutcome, VerifierAdapter};
pub use warmup::{WarmItemStatus, WarmKind, WarmReport};
