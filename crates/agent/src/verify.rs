//! Runs the verification service over each collected bucket.
//!
//! A bucket the service cannot handle passes through unfiltered.

use pathwise_core::catalog::CollectedData;
use pathwise_core::message::Message;
use pathwise_core::profile::UserProfile;
use pathwise_core::services::{Bucket, ResultVerifier, VerificationRequest};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    pub data: CollectedData,
    pub errors: Vec<String>,
}

pub struct VerifierAdapter {
    verifier: Arc<dyn ResultVerifier>,
}

impl VerifierAdapter {
    pub fn new(verifier: Arc<dyn ResultVerifier>) -> Self {
        Self { verifier }
    }

    /// Verify the school, college and career buckets of `data` in turn.
    ///
    /// `keywords[0]` is passed as the primary intent; the profile only
    /// when it carries something.
    pub async fn verify(
        &self,
        query: &str,
        history: &[Message],
        keywords: &[String],
        profile: &UserProfile,
        data: CollectedData,
    ) -> VerificationOutcome {
        let request = VerificationRequest {
            query,
            history,
            primary_intent: keywords.first().map(String::as_str),
            profile: (!profile.is_empty()).then_some(profile),
        };

        let CollectedData {
            school_programs,
            college_programs,
            careers,
            cip_mappings,
            ..
        } = data;
        let mut errors = Vec::new();

        let school_programs = match self.check(request, Bucket::School(school_programs.clone()), &mut errors).await {
            Some(Bucket::School(rows)) => rows,
            _ => school_programs,
        };
        let college_programs = match self.check(request, Bucket::College(college_programs.clone()), &mut errors).await {
            Some(Bucket::College(rows)) => rows,
            _ => college_programs,
        };
        let careers = match self.check(request, Bucket::Careers(careers.clone()), &mut errors).await {
            Some(Bucket::Careers(rows)) => rows,
            _ => careers,
        };

        let data = CollectedData {
            institutions: school_programs.iter().filter_map(|p| p.institution.clone()).collect(),
            campuses: college_programs.iter().map(|p| p.campus.clone()).collect(),
            school_programs,
            college_programs,
            careers,
            cip_mappings,
        };
        VerificationOutcome { data, errors }
    }

    /// The verified bucket, or `None` when the rows should pass through
    /// unchanged.
    async fn check(&self, request: VerificationRequest<'_>, bucket: Bucket, errors: &mut Vec<String>) -> Option<Bucket> {
        if bucket.is_empty() {
            return None;
        }
        let kind = bucket.kind();
        let before = bucket.len();

        match self.verifier.verify(request, bucket).await {
            Ok(verified) if verified.kind() == kind => {
                debug!(bucket = kind, before, after = verified.len(), "Bucket verified");
                Some(verified)
            }
            Ok(other) => {
                warn!(bucket = kind, returned = other.kind(), "Verifier returned the wrong bucket kind");
                errors.push(format!("verification of {kind} returned {} rows", other.kind()));
                None
            }
            Err(e) => {
                warn!(bucket = kind, error = %e, "Verification failed, keeping rows unfiltered");
                errors.push(format!("verification of {kind} failed: {e}"));
                None
            }
        }
    }
}
