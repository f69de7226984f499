//! Full program listings.
//!
//! A listing is every program of one tier, grouped the same way a search
//! result is. Rows are read from the cache when a listing was warmed (or
//! listed before) and from the repository otherwise.

use crate::orchestrator::Orchestrator;
use pathwise_cache::CacheKey;
use pathwise_core::aggregate::AggregatedData;
use pathwise_core::catalog::CollectedData;
use pathwise_core::error::RepositoryError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    School,
    College,
}

impl ListingKind {
    pub const ALL: [ListingKind; 2] = [ListingKind::School, ListingKind::College];

    pub fn as_str(self) -> &'static str {
        match self {
            ListingKind::School => "school",
            ListingKind::College => "college",
        }
    }

    pub(crate) fn cache_key(self) -> CacheKey {
        CacheKey::new(format!("list_{}_programs", self.as_str()))
    }
}

impl FromStr for ListingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "school" | "schools" => Ok(ListingKind::School),
            "college" | "colleges" => Ok(ListingKind::College),
            other => Err(format!("unknown listing '{other}' (expected school or college)")),
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramListing {
    pub kind: ListingKind,
    pub aggregated: AggregatedData,
    /// Rows came from the cache
    pub cached: bool,
}

impl Orchestrator {
    /// Every program of `kind`, aggregated.
    pub async fn list_programs(&self, kind: ListingKind) -> Result<ProgramListing, RepositoryError> {
        let key = self.cache.key(&kind.cache_key());
        let (rows, cached) = match self.cache.get_as::<CollectedData>(&key).await {
            Some(rows) => {
                debug!(listing = %kind, "Listing served from cache");
                (rows, true)
            }
            None => {
                let rows = self.fetch_listing(kind).await?;
                self.cache.set(&key, &rows, None, &["listing", kind.as_str()]).await;
                (rows, false)
            }
        };

        let aggregated = self.aggregator.aggregate(&rows).await;
        info!(listing = %kind, cached, programs = aggregated.program_count(), "Listed programs");
        Ok(ProgramListing {
            kind,
            aggregated,
            cached,
        })
    }

    /// Fetch `kind` and cache it. Returns the row count and whether the
    /// write went through.
    pub(crate) async fn store_listing(&self, kind: ListingKind) -> Result<(usize, bool), RepositoryError> {
        let rows = self.fetch_listing(kind).await?;
        let count = rows.school_programs.len() + rows.college_programs.len();
        let key = self.cache.key(&kind.cache_key());
        let stored = self.cache.set(&key, &rows, None, &["listing", kind.as_str()]).await;
        Ok((count, stored))
    }

    async fn fetch_listing(&self, kind: ListingKind) -> Result<CollectedData, RepositoryError> {
        match kind {
            ListingKind::School => {
                let rows = self.repository.list_school_programs().await?;
                Ok(CollectedData {
                    institutions: rows.iter().filter_map(|r| r.institution.clone()).collect(),
                    school_programs: rows,
                    ..Default::default()
                })
            }
            ListingKind::College => {
                let rows = self.repository.list_college_programs().await?;
                Ok(CollectedData {
                    campuses: rows.iter().map(|r| r.campus.clone()).collect(),
                    college_programs: rows,
                    ..Default::default()
                })
            }
        }
    }
}
