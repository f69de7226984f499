//! User profile snapshot and education-level tiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The user's current stage of education.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    MiddleSchool,
    HighSchool,
    College,
    Graduate,
    Adult,
}

/// Which program datasets a user is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// School-level students see school programs and the college programs they feed into.
    School,
    /// College-level and adult learners see college programs only.
    College,
    /// No stated level: both datasets.
    Any,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::School => "school",
            Tier::College => "college",
            Tier::Any => "any",
        }
    }

    /// Whether school-tier datasets may be queried.
    pub fn includes_school(&self) -> bool {
        !matches!(self, Tier::College)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only snapshot of the user's profile for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education_level: Option<EducationLevel>,

    /// Free-text interests (e.g. "engineering", "marine biology")
    #[serde(default)]
    pub interests: Vec<String>,

    /// Free-text career goals, mapped to taxonomy codes by the repository
    #[serde(default)]
    pub career_goals: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl UserProfile {
    pub fn tier(&self) -> Tier {
        match self.education_level {
            Some(EducationLevel::MiddleSchool | EducationLevel::HighSchool) => Tier::School,
            Some(_) => Tier::College,
            None => Tier::Any,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.education_level.is_none()
            && self.interests.is_empty()
            && self.career_goals.is_empty()
            && self.location.is_none()
    }

    /// Deterministic digest of the profile, insensitive to list order and case.
    ///
    /// Used to scope cache keys to a profile without storing the profile itself.
    pub fn fingerprint(&self) -> String {
        fn normalized(items: &[String]) -> Vec<String> {
            let mut out: Vec<String> = items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            out.sort();
            out.dedup();
            out
        }

        let canonical = serde_json::json!({
            "tier": self.tier().as_str(),
            "interests": normalized(&self.interests),
            "career_goals": normalized(&self.career_goals),
            "location": self.location.as_ref().map(|l| l.trim().to_lowercase()),
        });

        let digest = Sha256::digest(canonical.to_string().as_bytes());
        format!("{:x}", digest)[..16].to_string()
    }
}
