//! Static, read-only program repository over a JSON dataset.
//!
//! The dataset file holds the linked tables the pipeline reads: school
//! program offerings (one row per program per institution), college
//! program offerings (one row per program variant per campus), occupation
//! mappings, taxonomy titles, school course sequences and career-goal
//! mappings. A small built-in sample ships with the crate.

use async_trait::async_trait;
use pathwise_core::catalog::{
    CareerGoalMapping, Career, CipMapping, CollegeProgram, CourseDetail, ProgramRepository,
    SchoolProgram,
};
use pathwise_core::error::RepositoryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

const SAMPLE_DATASET: &str = include_str!("../data/sample_dataset.json");

/// The on-disk dataset layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub school_programs: Vec<SchoolProgram>,

    #[serde(default)]
    pub college_programs: Vec<CollegeProgram>,

    #[serde(default)]
    pub careers: Vec<Career>,

    #[serde(default)]
    pub cip_codes: Vec<CipMapping>,

    /// Campuses with detailed course data
    #[serde(default)]
    pub course_data_institutions: Vec<String>,

    /// Keyed by exact school program name
    #[serde(default)]
    pub course_details: BTreeMap<String, CourseDetail>,

    /// Keyed by lowercase career goal
    #[serde(default)]
    pub career_goals: BTreeMap<String, CareerGoalMapping>,
}

pub struct StaticRepository {
    name: String,
    dataset: Dataset,
}

impl StaticRepository {
    pub fn new(name: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            name: name.into(),
            dataset,
        }
    }

    /// The built-in sample dataset.
    pub fn sample() -> Result<Self, RepositoryError> {
        Self::from_json("sample", SAMPLE_DATASET)
    }

    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, RepositoryError> {
        let dataset: Dataset =
            serde_json::from_str(json).map_err(|e| RepositoryError::InvalidDataset(e.to_string()))?;
        Ok(Self::new(name, dataset))
    }

    /// Load a dataset file.
    pub fn from_path(path: &Path) -> Result<Self, RepositoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RepositoryError::NotLoaded(format!("{}: {e}", path.display())))?;
        let repo = Self::from_json(path.display().to_string(), &content)?;
        info!(
            path = %path.display(),
            school_rows = repo.dataset.school_programs.len(),
            college_rows = repo.dataset.college_programs.len(),
            careers = repo.dataset.careers.len(),
            "Loaded dataset"
        );
        Ok(repo)
    }

    /// Load `path` if given, otherwise the built-in sample.
    pub fn from_optional_path(path: Option<&Path>) -> Result<Self, RepositoryError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::sample(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

/// Number of keywords contained in `text`, case-insensitively.
fn match_count(text: &str, keywords: &[String]) -> usize {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
        .count()
}

/// Rows matching at least one keyword, best matches first. Ties keep
/// dataset order.
fn rank<'a, T>(rows: &'a [T], keywords: &[String], text: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let mut scored: Vec<(usize, &T)> = rows
        .iter()
        .map(|row| (match_count(text(row), keywords), row))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, row)| row).collect()
}

#[async_trait]
impl ProgramRepository for StaticRepository {
    fn name(&self) -> &str {
        &self.name
    }

    /// One row per distinct program name, institution left to
    /// [`school_institutions`](Self::school_institutions).
    async fn search_school_programs(
        &self,
        keywords: &[String],
    ) -> Result<Vec<SchoolProgram>, RepositoryError> {
        let mut seen = HashSet::new();
        let programs: Vec<SchoolProgram> = rank(&self.dataset.school_programs, keywords, |p| p.name.as_str())
            .into_iter()
            .filter(|p| seen.insert(p.name.clone()))
            .map(|p| SchoolProgram {
                name: p.name.clone(),
                institution: None,
                cip_code: p.cip_code.clone(),
            })
            .collect();
        debug!(?keywords, found = programs.len(), "School program search");
        Ok(programs)
    }

    async fn school_institutions(&self, program: &str) -> Result<Vec<String>, RepositoryError> {
        let mut seen = HashSet::new();
        Ok(self
            .dataset
            .school_programs
            .iter()
            .filter(|p| p.name == program)
            .filter_map(|p| p.institution.clone())
            .filter(|i| seen.insert(i.clone()))
            .collect())
    }

    async fn course_detail(&self, program: &str) -> Result<Option<CourseDetail>, RepositoryError> {
        Ok(self
            .dataset
            .course_details
            .get(program)
            .filter(|d| !d.is_empty())
            .cloned())
    }

    async fn search_college_programs(
        &self,
        keywords: &[String],
    ) -> Result<Vec<CollegeProgram>, RepositoryError> {
        let programs: Vec<CollegeProgram> = rank(&self.dataset.college_programs, keywords, |p| p.name.as_str())
            .into_iter()
            .cloned()
            .collect();
        debug!(?keywords, found = programs.len(), "College program search");
        Ok(programs)
    }

    async fn college_programs_by_code(
        &self,
        codes: &[String],
    ) -> Result<Vec<CollegeProgram>, RepositoryError> {
        Ok(self
            .dataset
            .college_programs
            .iter()
            .filter(|p| codes.contains(&p.cip_code))
            .cloned()
            .collect())
    }

    /// Every taxonomy entry equal to `prefix` or nested under it.
    async fn expand_code_family(&self, prefix: &str) -> Result<Vec<CipMapping>, RepositoryError> {
        let prefix = prefix.trim().trim_end_matches('.');
        let nested = format!("{prefix}.");
        Ok(self
            .dataset
            .cip_codes
            .iter()
            .filter(|m| m.cip_code == prefix || m.cip_code.starts_with(&nested))
            .cloned()
            .collect())
    }

    async fn careers_for_codes(&self, codes: &[String]) -> Result<Vec<Career>, RepositoryError> {
        Ok(self
            .dataset
            .careers
            .iter()
            .filter(|c| codes.contains(&c.cip_code))
            .cloned()
            .collect())
    }

    /// Exact goal first, then any known goal contained in the stated one
    /// ("registered nurse" → "nurse").
    async fn codes_for_career_goal(
        &self,
        goal: &str,
    ) -> Result<Option<CareerGoalMapping>, RepositoryError> {
        let goal = goal.trim().to_lowercase();
        if let Some(mapping) = self.dataset.career_goals.get(&goal) {
            return Ok(Some(mapping.clone()));
        }
        Ok(self
            .dataset
            .career_goals
            .iter()
            .find(|(known, _)| goal.contains(known.as_str()))
            .map(|(_, mapping)| mapping.clone()))
    }

    async fn list_school_programs(&self) -> Result<Vec<SchoolProgram>, RepositoryError> {
        Ok(self.dataset.school_programs.clone())
    }

    async fn list_college_programs(&self) -> Result<Vec<CollegeProgram>, RepositoryError> {
        Ok(self.dataset.college_programs.clone())
    }

    async fn course_data_institutions(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.dataset.course_data_institutions.clone())
    }
}
