//! Dataset records and the repository trait over them.
//!
//! Two program tiers are linked through taxonomy (CIP) codes:
//! - school-tier rows are keyed by program **name**
//! - college-tier rows are keyed by **code**, one row per (program, campus)
//!
//! Occupations (SOC codes) hang off the college codes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::error::RepositoryError;

/// A school-tier program row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolProgram {
    pub name: String,

    /// The school offering it, when the row came from an institution lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,

    /// Taxonomy code of the college family this program feeds into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cip_code: Option<String>,
}

/// A college-tier program row (one per program variant per campus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollegeProgram {
    pub cip_code: String,
    pub name: String,
    pub campus: String,
}

/// An occupation linked to a program code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Career {
    pub soc_code: String,
    pub title: String,

    /// Parent taxonomy code this occupation is mapped from
    pub cip_code: String,
}

/// A taxonomy code with its title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipMapping {
    pub cip_code: String,
    pub title: String,
}

/// Auxiliary course-sequence detail for a school program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDetail {
    /// Grade (e.g. "9") → course names
    #[serde(default)]
    pub by_grade: BTreeMap<String, Vec<String>>,

    /// Proficiency level (e.g. "introductory") → course names
    #[serde(default)]
    pub by_level: BTreeMap<String, Vec<String>>,
}

impl CourseDetail {
    pub fn is_empty(&self) -> bool {
        self.by_grade.is_empty() && self.by_level.is_empty()
    }
}

/// Taxonomy codes and search keywords derived from a career goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareerGoalMapping {
    pub codes: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Results accumulated by executing a plan.
///
/// Populated incrementally by merging per-call fragments. It is never reset
/// within an attempt; each attempt starts from a fresh value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedData {
    #[serde(default)]
    pub school_programs: Vec<SchoolProgram>,
    #[serde(default)]
    pub college_programs: Vec<CollegeProgram>,
    #[serde(default)]
    pub careers: Vec<Career>,
    #[serde(default)]
    pub institutions: BTreeSet<String>,
    #[serde(default)]
    pub campuses: BTreeSet<String>,
    #[serde(default)]
    pub cip_mappings: Vec<CipMapping>,
}

impl CollectedData {
    /// Append a fragment, keeping first-seen order of the ordered buckets.
    pub fn merge(&mut self, fragment: CollectedData) {
        self.school_programs.extend(fragment.school_programs);
        self.college_programs.extend(fragment.college_programs);
        self.careers.extend(fragment.careers);
        self.institutions.extend(fragment.institutions);
        self.campuses.extend(fragment.campuses);
        for mapping in fragment.cip_mappings {
            if !self.cip_mappings.iter().any(|m| m.cip_code == mapping.cip_code) {
                self.cip_mappings.push(mapping);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.school_programs.is_empty() && self.college_programs.is_empty() && self.careers.is_empty()
    }

    /// Every taxonomy code seen in the program buckets and mappings, first-seen order.
    pub fn codes(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let candidates = self
            .college_programs
            .iter()
            .map(|p| p.cip_code.as_str())
            .chain(self.school_programs.iter().filter_map(|p| p.cip_code.as_deref()))
            .chain(self.cip_mappings.iter().map(|m| m.cip_code.as_str()));
        for code in candidates {
            if seen.insert(code.to_string()) {
                out.push(code.to_string());
            }
        }
        out
    }
}

/// Read-only access to the program, campus and career datasets.
///
/// Implementations: static JSON dataset (built-in sample or file).
#[async_trait]
pub trait ProgramRepository: Send + Sync {
    /// The repository name (e.g., "static").
    fn name(&self) -> &str;

    /// School programs whose name matches any keyword.
    async fn search_school_programs(&self, keywords: &[String]) -> Result<Vec<SchoolProgram>, RepositoryError>;

    /// Schools offering the named program.
    async fn school_institutions(&self, program: &str) -> Result<Vec<String>, RepositoryError>;

    /// Course-sequence detail for the named school program.
    async fn course_detail(&self, program: &str) -> Result<Option<CourseDetail>, RepositoryError>;

    /// College program rows whose name matches any keyword.
    async fn search_college_programs(&self, keywords: &[String]) -> Result<Vec<CollegeProgram>, RepositoryError>;

    /// College program rows with exactly the given codes.
    async fn college_programs_by_code(&self, codes: &[String]) -> Result<Vec<CollegeProgram>, RepositoryError>;

    /// Every taxonomy code under a family prefix (e.g. "51" or "51.38").
    async fn expand_code_family(&self, prefix: &str) -> Result<Vec<CipMapping>, RepositoryError>;

    /// Occupations linked to any of the given codes.
    async fn careers_for_codes(&self, codes: &[String]) -> Result<Vec<Career>, RepositoryError>;

    /// Resolve a free-text career goal to taxonomy codes.
    async fn codes_for_career_goal(&self, goal: &str) -> Result<Option<CareerGoalMapping>, RepositoryError>;

    /// Full school program listing.
    async fn list_school_programs(&self) -> Result<Vec<SchoolProgram>, RepositoryError>;

    /// Full college program listing.
    async fn list_college_programs(&self) -> Result<Vec<CollegeProgram>, RepositoryError>;

    /// Campuses that have detailed course data. Empty when the dataset
    /// does not say, which disables campus filtering.
    async fn course_data_institutions(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(Vec::new())
    }
}
