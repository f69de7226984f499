//! Data access and tool execution for Pathwise.
//!
//! - [`StaticRepository`]: the program/campus/career datasets, loaded from
//!   JSON (or the built-in sample)
//! - [`ToolExecutor`]: runs a validated [`ToolCall`](pathwise_core::ToolCall)
//!   plan against a repository, with optional per-call caching

pub mod dataset;
pub mod executor;

pub use dataset::{Dataset, StaticRepository};
pub use executor::{ExecutionError, ExecutionOutcome, ToolExecutor};
