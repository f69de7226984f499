//! Cache warming.
//!
//! Runs the configured common queries through the full pipeline and stores
//! the bulk program listings, so the first real requests hit the cache.

use crate::listing::ListingKind;
use crate::orchestrator::Orchestrator;
use pathwise_core::profile::UserProfile;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmKind {
    CommonQueries,
    Listings,
    All,
}

impl WarmKind {
    fn includes_queries(self) -> bool {
        matches!(self, WarmKind::CommonQueries | WarmKind::All)
    }

    fn includes_listings(self) -> bool {
        matches!(self, WarmKind::Listings | WarmKind::All)
    }
}

impl FromStr for WarmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queries" | "common" | "common_queries" => Ok(WarmKind::CommonQueries),
            "listings" => Ok(WarmKind::Listings),
            "all" => Ok(WarmKind::All),
            other => Err(format!("unknown warm target '{other}' (expected queries, listings or all)")),
        }
    }
}

impl fmt::Display for WarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarmKind::CommonQueries => "queries",
            WarmKind::Listings => "listings",
            WarmKind::All => "all",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmItemStatus {
    pub item: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmReport {
    pub warmed_count: usize,
    pub items: Vec<WarmItemStatus>,
}

impl WarmReport {
    fn record(&mut self, item: impl Into<String>, ok: bool, detail: impl Into<String>) {
        if ok {
            self.warmed_count += 1;
        }
        self.items.push(WarmItemStatus {
            item: item.into(),
            ok,
            detail: detail.into(),
        });
    }
}

impl Orchestrator {
    /// Populate the cache. Items fail individually; a disabled cache fails all.
    pub async fn warm(&self, kind: WarmKind) -> WarmReport {
        let mut report = WarmReport::default();

        if kind.includes_queries() {
            let profile = UserProfile::default();
            for query in &self.warmup.common_queries {
                if !self.cache.is_enabled() {
                    report.record(query.as_str(), false, "cache disabled");
                    continue;
                }
                let result = self.orchestrate(query, &profile, &[]).await;
                let ok = result.needs_retrieval && !result.aggregated.is_empty();
                let detail = if ok {
                    result.aggregated.summary()
                } else {
                    "no results to cache".to_string()
                };
                report.record(query.as_str(), ok, detail);
            }
        }

        if kind.includes_listings() {
            for listing in ListingKind::ALL {
                self.warm_listing(&mut report, listing).await;
            }
        }

        info!(kind = %kind, warmed = report.warmed_count, total = report.items.len(), "Cache warmed");
        report
    }

    async fn warm_listing(&self, report: &mut WarmReport, kind: ListingKind) {
        let item = format!("{kind} listing");
        if !self.cache.is_enabled() {
            report.record(item, false, "cache disabled");
            return;
        }

        match self.store_listing(kind).await {
            Ok((count, true)) => report.record(item, true, format!("{count} programs")),
            Ok((_, false)) => report.record(item, false, "cache write failed"),
            Err(e) => {
                warn!(listing = %kind, error = %e, "Listing fetch failed during warmup");
                report.record(item, false, e.to_string());
            }
        }
    }
}
