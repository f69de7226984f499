//! # Pathwise Core
//!
//! Domain types, traits, and error definitions for the Pathwise pathway
//! query engine. This crate has **no framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`ProgramRepository`] for the program/campus/career datasets
//! - the service traits in [`services`] for classification, planning
//!   assistance, verification, reflection and formatting
//! - [`Provider`] for the LLM backend those services may sit on
//!
//! Implementations live in their respective crates, so every stage of the
//! pipeline can be exercised with scripted stand-ins.

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod message;
pub mod profile;
pub mod provider;
pub mod services;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use aggregate::{AggregatedCollegeProgram, AggregatedData, AggregatedSchoolProgram};
pub use catalog::{
    CareerGoalMapping, Career, CipMapping, CollectedData, CollegeProgram, CourseDetail,
    ProgramRepository, SchoolProgram,
};
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use profile::{EducationLevel, Tier, UserProfile};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use services::{Bucket, QualityAssessment, SearchStrategy};
pub use tool::{CareerScope, ToolCall, ToolOperation};
