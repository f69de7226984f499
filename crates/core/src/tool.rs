//! The fixed retrieval-operation catalog.
//!
//! Planning-assist output is untyped text; it crosses into the engine only
//! through [`ToolCall::parse`], which rejects anything outside the catalog.
//! Nothing past the planner boundary ever handles an operation by string.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::ToolError;
use crate::profile::Tier;

/// Names of the operations in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOperation {
    SearchSchoolPrograms,
    SearchCollegePrograms,
    SearchByCipCode,
    ExpandCipFamily,
    GetCareers,
    ComprehensiveTrace,
}

impl ToolOperation {
    pub const ALL: [ToolOperation; 6] = [
        ToolOperation::SearchSchoolPrograms,
        ToolOperation::SearchCollegePrograms,
        ToolOperation::SearchByCipCode,
        ToolOperation::ExpandCipFamily,
        ToolOperation::GetCareers,
        ToolOperation::ComprehensiveTrace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolOperation::SearchSchoolPrograms => "search_school_programs",
            ToolOperation::SearchCollegePrograms => "search_college_programs",
            ToolOperation::SearchByCipCode => "search_by_cip_code",
            ToolOperation::ExpandCipFamily => "expand_cip_family",
            ToolOperation::GetCareers => "get_careers",
            ToolOperation::ComprehensiveTrace => "comprehensive_trace",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Description and argument shape, rendered into planning prompts.
    pub fn description(&self) -> &'static str {
        match self {
            ToolOperation::SearchSchoolPrograms => {
                "Search school-level programs by keyword. args: list of keywords"
            }
            ToolOperation::SearchCollegePrograms => {
                "Search college programs by keyword. args: list of keywords"
            }
            ToolOperation::SearchByCipCode => {
                "Look up college programs by exact taxonomy code. args: list of codes like \"11.0701\""
            }
            ToolOperation::ExpandCipFamily => {
                "List every taxonomy code in a family. args: {\"prefix\": \"11\"}"
            }
            ToolOperation::GetCareers => {
                "Find occupations linked to program codes. args: \"all\" (codes found so far) or list of codes"
            }
            ToolOperation::ComprehensiveTrace => {
                "Search school and college programs by keyword and trace their careers. args: list of keywords"
            }
        }
    }

    /// Whether the operation reads school-tier datasets only.
    pub fn is_school_only(&self) -> bool {
        matches!(self, ToolOperation::SearchSchoolPrograms)
    }

    pub fn allowed_for(&self, tier: Tier) -> bool {
        !self.is_school_only() || tier.includes_school()
    }
}

impl std::fmt::Display for ToolOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which codes `get_careers` resolves against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareerScope {
    /// Every code collected so far in the attempt, plus context codes.
    All,
    Codes(Vec<String>),
}

/// A validated retrieval operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "operation", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    SearchSchoolPrograms(Vec<String>),
    SearchCollegePrograms(Vec<String>),
    SearchByCipCode(Vec<String>),
    ExpandCipFamily(String),
    GetCareers(CareerScope),
    ComprehensiveTrace(Vec<String>),
}

impl ToolCall {
    pub fn operation(&self) -> ToolOperation {
        match self {
            ToolCall::SearchSchoolPrograms(_) => ToolOperation::SearchSchoolPrograms,
            ToolCall::SearchCollegePrograms(_) => ToolOperation::SearchCollegePrograms,
            ToolCall::SearchByCipCode(_) => ToolOperation::SearchByCipCode,
            ToolCall::ExpandCipFamily(_) => ToolOperation::ExpandCipFamily,
            ToolCall::GetCareers(_) => ToolOperation::GetCareers,
            ToolCall::ComprehensiveTrace(_) => ToolOperation::ComprehensiveTrace,
        }
    }

    /// Parse and validate an untyped `(name, args)` pair against the catalog.
    ///
    /// `args` may be a string list, a single string, or a record whose
    /// values carry the list (`{"keywords": [...]}`, `{"codes": [...]}`,
    /// `{"prefix": "11"}`, `{"scope": "all"}`).
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolError> {
        let operation = ToolOperation::from_name(name)
            .ok_or_else(|| ToolError::UnknownOperation(name.to_string()))?;

        let invalid = |reason: &str| ToolError::InvalidArguments {
            operation: operation.as_str().to_string(),
            reason: reason.to_string(),
        };

        match operation {
            ToolOperation::SearchSchoolPrograms
            | ToolOperation::SearchCollegePrograms
            | ToolOperation::ComprehensiveTrace => {
                let keywords = normalize_keywords(string_list(args, &["keywords", "query", "terms"]));
                if keywords.is_empty() {
                    return Err(invalid("expected at least one keyword"));
                }
                Ok(match operation {
                    ToolOperation::SearchSchoolPrograms => ToolCall::SearchSchoolPrograms(keywords),
                    ToolOperation::SearchCollegePrograms => ToolCall::SearchCollegePrograms(keywords),
                    _ => ToolCall::ComprehensiveTrace(keywords),
                })
            }
            ToolOperation::SearchByCipCode => {
                let codes = string_list(args, &["codes", "cip_codes", "code"]);
                if codes.is_empty() {
                    return Err(invalid("expected at least one code"));
                }
                if let Some(bad) = codes.iter().find(|c| !is_code(c)) {
                    return Err(invalid(&format!("malformed code '{bad}'")));
                }
                Ok(ToolCall::SearchByCipCode(dedup(codes)))
            }
            ToolOperation::ExpandCipFamily => {
                let prefix = string_list(args, &["prefix", "family", "code"])
                    .into_iter()
                    .next()
                    .ok_or_else(|| invalid("expected a family prefix"))?;
                if !is_code(&prefix) {
                    return Err(invalid(&format!("malformed prefix '{prefix}'")));
                }
                Ok(ToolCall::ExpandCipFamily(prefix))
            }
            ToolOperation::GetCareers => {
                let values = string_list(args, &["scope", "codes", "cip_codes"]);
                if values.is_empty() || values.iter().any(|v| v.eq_ignore_ascii_case("all")) {
                    return Ok(ToolCall::GetCareers(CareerScope::All));
                }
                if let Some(bad) = values.iter().find(|c| !is_code(c)) {
                    return Err(invalid(&format!("malformed code '{bad}'")));
                }
                Ok(ToolCall::GetCareers(CareerScope::Codes(dedup(values))))
            }
        }
    }

    /// Arguments rendered back to JSON, for cache keys and error records.
    pub fn args_value(&self) -> Value {
        match self {
            ToolCall::SearchSchoolPrograms(k)
            | ToolCall::SearchCollegePrograms(k)
            | ToolCall::ComprehensiveTrace(k) => serde_json::json!({ "keywords": k }),
            ToolCall::SearchByCipCode(codes) => serde_json::json!({ "codes": codes }),
            ToolCall::ExpandCipFamily(prefix) => serde_json::json!({ "prefix": prefix }),
            ToolCall::GetCareers(CareerScope::All) => serde_json::json!({ "scope": "all" }),
            ToolCall::GetCareers(CareerScope::Codes(codes)) => serde_json::json!({ "codes": codes }),
        }
    }

    /// Whether this call yields careers (directly or as part of a trace).
    pub fn covers_careers(&self) -> bool {
        matches!(self, ToolCall::GetCareers(_) | ToolCall::ComprehensiveTrace(_))
    }
}

impl std::fmt::Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.operation(), self.args_value())
    }
}

/// Taxonomy codes and prefixes: digits with optional dots, e.g. "11", "51.38", "51.3801".
fn is_code(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
        && s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && !s.ends_with('.')
}

fn string_list(args: &Value, record_keys: &[&str]) -> Vec<String> {
    match args {
        Value::String(s) => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Object(map) => record_keys
            .iter()
            .find_map(|k| map.get(*k))
            .map(|v| string_list(v, &[]))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    dedup(
        keywords
            .into_iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect(),
    )
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
