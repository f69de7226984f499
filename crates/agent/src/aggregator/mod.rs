//! Aggregator: consolidates raw rows into one record per logical program.
//!
//! - College rows are grouped by taxonomy code. Each code gets a record on
//!   first sight whose display name is chosen once (see [`naming`]) and
//!   never revised; later rows only add name variants and campuses.
//! - School rows are grouped by exact name, with course-sequence detail
//!   fetched on first sight.
//! - Careers are kept only when linked to an aggregated college code.
//!
//! Campuses are filtered against the configured institutions with course
//! data, or the repository's own list when none are configured.

pub mod naming;

use futures::future::join_all;
use pathwise_config::AggregationConfig;
use pathwise_core::aggregate::{AggregatedCollegeProgram, AggregatedData, AggregatedSchoolProgram};
use pathwise_core::catalog::{Career, CollectedData, CollegeProgram, ProgramRepository, SchoolProgram};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub use naming::select_representative_name;

/// Accumulates college records across any number of ingests.
#[derive(Debug, Clone, Default)]
pub struct CollegeLedger {
    order: Vec<String>,
    records: HashMap<String, AggregatedCollegeProgram>,
    /// Lowercased; `None` means every campus is kept
    allow_list: Option<HashSet<String>>,
}

impl CollegeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep campuses named in `institutions` (case-insensitive).
    /// An empty list disables filtering.
    pub fn with_allow_list(mut self, institutions: &[String]) -> Self {
        let set: HashSet<String> = institutions
            .iter()
            .map(|i| i.trim().to_lowercase())
            .filter(|i| !i.is_empty())
            .collect();
        self.allow_list = (!set.is_empty()).then_some(set);
        self
    }

    fn keeps(&self, campus: &str) -> bool {
        if campus.trim().is_empty() {
            return false;
        }
        match &self.allow_list {
            Some(allowed) => allowed.contains(&campus.trim().to_lowercase()),
            None => true,
        }
    }

    /// Fold a batch of rows into the ledger.
    pub fn ingest(&mut self, rows: &[CollegeProgram]) {
        let mut batch_order: Vec<&str> = Vec::new();
        let mut batch: HashMap<&str, Vec<&CollegeProgram>> = HashMap::new();
        for row in rows {
            let group = batch.entry(row.cip_code.as_str()).or_default();
            if group.is_empty() {
                batch_order.push(row.cip_code.as_str());
            }
            group.push(row);
        }

        for code in batch_order {
            let group = &batch[code];
            let campuses: BTreeSet<String> = group
                .iter()
                .filter(|r| self.keeps(&r.campus))
                .map(|r| r.campus.trim().to_string())
                .collect();

            match self.records.get_mut(code) {
                Some(record) => {
                    record.name_variants.extend(group.iter().map(|r| r.name.clone()));
                    record.campuses.extend(campuses);
                }
                None => {
                    let variants: Vec<String> = group.iter().map(|r| r.name.clone()).collect();
                    let Some(family_name) = select_representative_name(&variants) else {
                        continue;
                    };
                    self.order.push(code.to_string());
                    self.records.insert(
                        code.to_string(),
                        AggregatedCollegeProgram {
                            code: code.to_string(),
                            family_name,
                            name_variants: variants.into_iter().collect(),
                            campuses,
                        },
                    );
                }
            }
        }
    }

    /// Records in first-seen order. Under an allow-list, codes left with
    /// no campus are dropped.
    pub fn programs(&self) -> Vec<AggregatedCollegeProgram> {
        self.order
            .iter()
            .filter_map(|code| self.records.get(code))
            .filter(|record| self.allow_list.is_none() || !record.campuses.is_empty())
            .cloned()
            .collect()
    }
}

/// Keep careers linked to `college_codes`, deduplicated by occupation code
/// and capped. Falls back to the first deduplicated raw careers when the
/// filter leaves nothing.
pub fn consolidate_careers(careers: &[Career], college_codes: &HashSet<&str>, cap: usize) -> Vec<Career> {
    fn dedup_capped<'a>(careers: impl Iterator<Item = &'a Career>, cap: usize) -> Vec<Career> {
        let mut seen = HashSet::new();
        careers
            .filter(|c| seen.insert(c.soc_code.as_str()))
            .take(cap)
            .cloned()
            .collect()
    }

    let linked = dedup_capped(
        careers.iter().filter(|c| college_codes.contains(c.cip_code.as_str())),
        cap,
    );
    if linked.is_empty() && !careers.is_empty() {
        debug!(raw = careers.len(), "No careers linked to shown programs, using raw careers");
        return dedup_capped(careers.iter(), cap);
    }
    linked
}

pub struct Aggregator {
    repository: Arc<dyn ProgramRepository>,
    career_cap: usize,
    course_data_institutions: Vec<String>,
}

impl Aggregator {
    pub fn new(repository: Arc<dyn ProgramRepository>, config: &AggregationConfig) -> Self {
        Self {
            repository,
            career_cap: config.career_cap,
            course_data_institutions: config.course_data_institutions.clone(),
        }
    }

    pub async fn aggregate(&self, data: &CollectedData) -> AggregatedData {
        let allow_list = self.allow_list().await;
        let mut ledger = CollegeLedger::new().with_allow_list(&allow_list);
        ledger.ingest(&data.college_programs);
        let college_programs = ledger.programs();

        let school_programs = self.aggregate_school(&data.school_programs).await;

        let codes: HashSet<&str> = college_programs.iter().map(|p| p.code.as_str()).collect();
        let careers = consolidate_careers(&data.careers, &codes, self.career_cap);

        debug!(
            college = college_programs.len(),
            school = school_programs.len(),
            careers = careers.len(),
            "Aggregated results"
        );
        AggregatedData {
            college_programs,
            school_programs,
            careers,
        }
    }

    async fn allow_list(&self) -> Vec<String> {
        if !self.course_data_institutions.is_empty() {
            return self.course_data_institutions.clone();
        }
        match self.repository.course_data_institutions().await {
            Ok(institutions) => institutions,
            Err(e) => {
                warn!(error = %e, "Course data institutions unavailable, keeping every campus");
                Vec::new()
            }
        }
    }

    async fn aggregate_school(&self, rows: &[SchoolProgram]) -> Vec<AggregatedSchoolProgram> {
        let mut order: Vec<&str> = Vec::new();
        let mut institutions: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let entry = institutions.entry(row.name.as_str()).or_insert_with(|| {
                order.push(row.name.as_str());
                BTreeSet::new()
            });
            if let Some(institution) = &row.institution {
                entry.insert(institution.clone());
            }
        }

        let details = join_all(order.iter().map(|name| self.repository.course_detail(name))).await;

        order
            .into_iter()
            .zip(details)
            .map(|(name, detail)| {
                let course_detail = match detail {
                    Ok(detail) => detail,
                    Err(e) => {
                        warn!(program = name, error = %e, "Course detail lookup failed");
                        None
                    }
                };
                AggregatedSchoolProgram {
                    name: name.to_string(),
                    institutions: institutions.remove(name).unwrap_or_default(),
                    course_detail,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn college(code: &str, name: &str, campus: &str) -> CollegeProgram {
        CollegeProgram {
            cip_code: code.into(),
            name: name.into(),
            campus: campus.into(),
        }
    }

    fn career(soc: &str, cip: &str) -> Career {
        Career {
            soc_code: soc.into(),
            title: format!("Occupation {soc}"),
            cip_code: cip.into(),
        }
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(sample_repository(), &AggregationConfig::default())
    }

    #[test]
    fn one_record_per_code() {
        let mut ledger = CollegeLedger::new();
        ledger.ingest(&[
            college("26.0101", "Biology (Bachelor of Science)", "North"),
            college("51.3801", "Nursing (Associate in Science)", "South"),
            college("26.0101", "Biology (Bachelor of Science - Marine)", "Coastal"),
            college("26.0101", "Biology (Bachelor of Science)", "South"),
        ]);
        let programs = ledger.programs();
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].code, "26.0101");
        assert_eq!(programs[0].family_name, "Biology (Bachelor of Science)");
        assert_eq!(programs[0].name_variants.len(), 2);
        assert_eq!(programs[0].campuses.len(), 3);
    }

    #[test]
    fn family_name_never_changes_after_creation() {
        let mut ledger = CollegeLedger::new();
        ledger.ingest(&[college("26.0101", "Biology (Associate in Arts)", "South")]);
        ledger.ingest(&[college("26.0101", "Biology (Bachelor of Science)", "North")]);

        let programs = ledger.programs();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].family_name, "Biology (Associate in Arts)");
        assert!(programs[0].name_variants.contains("Biology (Bachelor of Science)"));
    }

    #[test]
    fn allow_list_filters_campuses_and_drops_empty_codes() {
        let mut ledger =
            CollegeLedger::new().with_allow_list(&["north campus".to_string(), "Coastal Campus".to_string()]);
        ledger.ingest(&[
            college("26.0101", "Biology (Bachelor of Science)", "North Campus"),
            college("26.0101", "Biology (Associate in Arts)", "South Campus"),
            college("51.3801", "Nursing (Associate in Science)", "South Campus"),
        ]);
        let programs = ledger.programs();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].campuses, BTreeSet::from(["North Campus".to_string()]));
    }

    #[test]
    fn careers_filtered_to_shown_codes() {
        let careers = vec![
            career("29-1141", "51.3801"),
            career("19-3094", "45.1001"),
            career("29-1141", "51.3801"),
        ];
        let codes = HashSet::from(["51.3801"]);
        let kept = consolidate_careers(&careers, &codes, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].soc_code, "29-1141");
    }

    #[test]
    fn careers_fall_back_to_raw_when_nothing_links() {
        let careers: Vec<Career> = (0..15)
            .map(|i| career(&format!("11-{i:04}"), "99.9999"))
            .chain(std::iter::once(career("11-0000", "99.9999")))
            .collect();
        let kept = consolidate_careers(&careers, &HashSet::from(["26.0101"]), 10);
        assert_eq!(kept.len(), 10);
        assert_eq!(kept[0].soc_code, "11-0000");
        let unique: HashSet<&str> = kept.iter().map(|c| c.soc_code.as_str()).collect();
        assert_eq!(unique.len(), 10);

        assert!(consolidate_careers(&[], &HashSet::new(), 10).is_empty());
    }

    #[tokio::test]
    async fn school_programs_grouped_by_name_with_detail() {
        let data = CollectedData {
            school_programs: vec![
                SchoolProgram {
                    name: "Computer Science Academy".into(),
                    institution: Some("Lincoln High School".into()),
                    cip_code: Some("11.0701".into()),
                },
                SchoolProgram {
                    name: "Computer Science Academy".into(),
                    institution: Some("Roosevelt High School".into()),
                    cip_code: Some("11.0701".into()),
                },
                SchoolProgram {
                    name: "Welding Career Academy".into(),
                    institution: None,
                    cip_code: None,
                },
            ],
            ..Default::default()
        };
        let aggregated = aggregator().aggregate(&data).await;
        assert_eq!(aggregated.school_programs.len(), 2);
        let cs = &aggregated.school_programs[0];
        assert_eq!(cs.institutions.len(), 2);
        assert!(cs.course_detail.is_some());
        assert!(aggregated.school_programs[1].course_detail.is_none());
    }

    #[tokio::test]
    async fn failed_course_detail_keeps_the_record() {
        let aggregator = Aggregator::new(failing_repository(), &AggregationConfig::default());
        let data = CollectedData {
            school_programs: vec![SchoolProgram {
                name: "Engineering Magnet".into(),
                institution: Some("Roosevelt High School".into()),
                cip_code: None,
            }],
            ..Default::default()
        };
        let aggregated = aggregator.aggregate(&data).await;
        assert_eq!(aggregated.school_programs.len(), 1);
        assert!(aggregated.school_programs[0].course_detail.is_none());
    }

    #[tokio::test]
    async fn related_family_codes_reach_the_aggregate() {
        use pathwise_core::profile::Tier;
        use pathwise_core::tool::{CareerScope, ToolCall};
        use pathwise_tools::ToolExecutor;

        let calls = vec![
            ToolCall::SearchByCipCode(vec!["51.3801".into()]),
            ToolCall::ExpandCipFamily("51".into()),
            ToolCall::GetCareers(CareerScope::All),
        ];
        let outcome = ToolExecutor::new(sample_repository()).execute(&calls, &[], Tier::Any).await;
        let aggregated = aggregator().aggregate(&outcome.data).await;

        let codes: Vec<&str> = aggregated.college_programs.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["51.3801", "51.3901"]);
        let socs: Vec<&str> = aggregated.careers.iter().map(|c| c.soc_code.as_str()).collect();
        assert!(socs.contains(&"29-1141"));
        assert!(socs.contains(&"29-2061"));
    }

    #[tokio::test]
    async fn dataset_allow_list_applies_by_default() {
        let rows = sample_repository()
            .college_programs_by_code(&["45.1001".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let aggregated = aggregator()
            .aggregate(&CollectedData {
                college_programs: rows.clone(),
                ..Default::default()
            })
            .await;
        assert_eq!(aggregated.college_programs.len(), 1);
        assert_eq!(
            aggregated.college_programs[0].campuses,
            BTreeSet::from(["South Campus".to_string()])
        );

        // A configured list takes precedence
        let config = AggregationConfig {
            course_data_institutions: vec!["Online Campus".into()],
            ..Default::default()
        };
        let aggregated = Aggregator::new(sample_repository(), &config)
            .aggregate(&CollectedData {
                college_programs: rows,
                ..Default::default()
            })
            .await;
        assert_eq!(
            aggregated.college_programs[0].campuses,
            BTreeSet::from(["Online Campus".to_string()])
        );
    }

    #[tokio::test]
    async fn aggregation_is_idempotent() {
        let data = CollectedData {
            college_programs: vec![
                college("11.0701", "Computer Science (Associate in Science)", "South Campus"),
                college("11.0701", "Computer Science (Bachelor of Science)", "North Campus"),
                college("48.0508", "Welding Technology (Certificate)", "East Campus"),
                college("48.0508", "Welding Technology (Diploma)", "East Campus"),
            ],
            careers: vec![career("15-1252", "11.0701"), career("51-4121", "48.0508")],
            ..Default::default()
        };
        let aggregator = aggregator();
        let first = aggregator.aggregate(&data).await;
        let second = aggregator.aggregate(&data).await;
        assert_eq!(first, second);
        assert_eq!(first.college_programs[0].family_name, "Computer Science (Bachelor of Science)");
        assert_eq!(first.college_programs[1].family_name, "Welding Technology (Diploma)");
        assert_eq!(first.careers.len(), 2);
    }
}
