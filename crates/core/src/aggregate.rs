//! Canonical, deduplicated result shapes produced by aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::catalog::{Career, CourseDetail};

/// One logical college program per taxonomy code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedCollegeProgram {
    pub code: String,

    /// Representative display name, chosen once from `name_variants`
    pub family_name: String,

    pub name_variants: BTreeSet<String>,

    pub campuses: BTreeSet<String>,
}

/// One school program per distinct name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSchoolProgram {
    pub name: String,

    pub institutions: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_detail: Option<CourseDetail>,
}

/// The consolidated output of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedData {
    #[serde(default)]
    pub college_programs: Vec<AggregatedCollegeProgram>,
    #[serde(default)]
    pub school_programs: Vec<AggregatedSchoolProgram>,
    #[serde(default)]
    pub careers: Vec<Career>,
}

impl AggregatedData {
    pub fn is_empty(&self) -> bool {
        self.college_programs.is_empty() && self.school_programs.is_empty() && self.careers.is_empty()
    }

    pub fn program_count(&self) -> usize {
        self.college_programs.len() + self.school_programs.len()
    }

    /// Short one-line summary for logs and prompts.
    pub fn summary(&self) -> String {
        format!(
            "{} college programs, {} school programs, {} careers",
            self.college_programs.len(),
            self.school_programs.len(),
            self.careers.len()
        )
    }
}
