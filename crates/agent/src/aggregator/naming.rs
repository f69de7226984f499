//! Program-name rules for picking one display name per taxonomy code.
//!
//! All functions here are pure.

use std::collections::HashMap;

const SPECIALIZATION_MARKERS: [&str; 4] = [" - ", " – ", "—", ":"];
const SPECIALIZATION_WORDS: [&str; 6] = [
    "concentration",
    "specialization",
    "specialisation",
    "emphasis",
    "track",
    "option",
];
const BACHELOR_ABBREVIATIONS: [&str; 6] = ["bs", "ba", "bsn", "bas", "bfa", "bba"];
const ASSOCIATE_ABBREVIATIONS: [&str; 5] = ["as", "aa", "aas", "aat", "aos"];

/// Strip parenthetical groups, turn `&` into "and" and collapse whitespace.
///
/// `"Nursing & Health (Associate in Science)"` → `"Nursing and Health"`.
pub fn normalize_base_name(name: &str) -> String {
    let mut stripped = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '&' if depth == 0 => stripped.push_str(" and "),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase word tokens inside parentheses, with periods removed
/// ("B.S." → "bs").
fn parenthetical_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth > 0 && c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if c != '.' && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn words(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

pub fn is_bachelor(name: &str) -> bool {
    name.to_lowercase().contains("bachelor")
        || parenthetical_tokens(name)
            .iter()
            .any(|t| BACHELOR_ABBREVIATIONS.contains(&t.as_str()))
}

pub fn is_associate(name: &str) -> bool {
    name.to_lowercase().contains("associate")
        || parenthetical_tokens(name)
            .iter()
            .any(|t| ASSOCIATE_ABBREVIATIONS.contains(&t.as_str()))
}

pub fn is_certificate(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("certificate")
        || lower.contains("certification")
        || parenthetical_tokens(name).iter().any(|t| t == "cert")
}

/// Whether the name carries a specialization suffix such as
/// "(Bachelor of Science - Marine)" or "Business: Finance Track".
pub fn has_specialization(name: &str) -> bool {
    SPECIALIZATION_MARKERS.iter().any(|m| name.contains(m))
        || words(name).any(|w| SPECIALIZATION_WORDS.contains(&w.as_str()))
}

/// Pick the representative display name among `variants`.
///
/// Checked in order, each against the first qualifying variant:
/// 1. a bachelor's name without a specialization
/// 2. a bachelor's name with one
/// 3. an associate name without a specialization
/// 4. the most frequent base name (ties go to the longer base); within
///    it, a non-certificate variant, then the shortest, then the first
///    in lexicographic order
///
/// Duplicated variants count once per occurrence in step 4.
pub fn select_representative_name(variants: &[String]) -> Option<String> {
    if let Some(name) = variants
        .iter()
        .find(|v| is_bachelor(v) && !has_specialization(v))
    {
        return Some(name.clone());
    }
    if let Some(name) = variants.iter().find(|v| is_bachelor(v)) {
        return Some(name.clone());
    }
    if let Some(name) = variants
        .iter()
        .find(|v| is_associate(v) && !has_specialization(v))
    {
        return Some(name.clone());
    }
    most_frequent_base(variants)
}

fn most_frequent_base(variants: &[String]) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    for variant in variants {
        let base = normalize_base_name(variant).to_lowercase();
        let count = counts.entry(base.clone()).or_insert(0);
        if *count == 0 {
            first_seen.push(base);
        }
        *count += 1;
    }

    let best_base = first_seen.iter().max_by(|a, b| {
        counts[a.as_str()]
            .cmp(&counts[b.as_str()])
            .then_with(|| a.chars().count().cmp(&b.chars().count()))
            // equal count and length: lexicographically smallest
            .then_with(|| b.cmp(a))
    })?;

    variants
        .iter()
        .filter(|v| normalize_base_name(v).to_lowercase() == *best_base)
        .min_by(|a, b| {
            is_certificate(a)
                .cmp(&is_certificate(b))
                .then_with(|| a.chars().count().cmp(&b.chars().count()))
                .then_with(|| a.cmp(b))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn base_name_normalization() {
        assert_eq!(
            normalize_base_name("Nursing  &  Health (Associate in Science)"),
            "Nursing and Health"
        );
        assert_eq!(normalize_base_name("Art (Studio (2D)) Foundations"), "Art Foundations");
        assert_eq!(normalize_base_name("Biology"), "Biology");
    }

    #[test]
    fn degree_level_detection() {
        assert!(is_bachelor("Biology (Bachelor of Science)"));
        assert!(is_bachelor("Biology (B.S.)"));
        assert!(!is_bachelor("Biology (Associate in Arts)"));
        assert!(is_associate("Nursing (A.A.S.)"));
        assert!(is_associate("Nursing (Associate in Science)"));
        assert!(!is_associate("Nursing as a Second Career (Certificate)"));
        assert!(is_certificate("Welding Technology (Certificate)"));
        assert!(!is_certificate("Welding Technology (Diploma)"));
    }

    #[test]
    fn specialization_detection() {
        assert!(has_specialization("Biology (Bachelor of Science - Marine)"));
        assert!(has_specialization("Business: Finance"));
        assert!(has_specialization("Engineering (BS, Civil Track)"));
        assert!(!has_specialization("Biology (Bachelor of Science)"));
    }

    #[test]
    fn bachelor_without_specialization_wins() {
        let variants = names(&[
            "Biology (Bachelor of Science - Marine)",
            "Biology (Associate in Arts)",
            "Biology (Bachelor of Science)",
        ]);
        assert_eq!(
            select_representative_name(&variants).as_deref(),
            Some("Biology (Bachelor of Science)")
        );
    }

    #[test]
    fn bachelor_with_specialization_beats_associate() {
        let variants = names(&["Biology (Associate in Arts)", "Biology (Bachelor of Science - Marine)"]);
        assert_eq!(
            select_representative_name(&variants).as_deref(),
            Some("Biology (Bachelor of Science - Marine)")
        );
    }

    #[test]
    fn associate_without_specialization_is_third() {
        let variants = names(&[
            "X (Certificate)",
            "X and Y (Associate in Science)",
            "X and Y (Associate in Science)",
        ]);
        assert_eq!(
            select_representative_name(&variants).as_deref(),
            Some("X and Y (Associate in Science)")
        );
    }

    #[test]
    fn most_frequent_base_wins_without_degree_names() {
        let variants = names(&["X (Certificate)", "X & Y (Certificate)", "X and Y (Diploma)"]);
        assert_eq!(select_representative_name(&variants).as_deref(), Some("X and Y (Diploma)"));
    }

    #[test]
    fn certificate_loses_within_a_base() {
        let variants = names(&["Welding Technology (Certificate)", "Welding Technology (Diploma)"]);
        assert_eq!(
            select_representative_name(&variants).as_deref(),
            Some("Welding Technology (Diploma)")
        );
    }

    #[test]
    fn frequency_tie_goes_to_longer_base() {
        let variants = names(&["Art (Diploma)", "Art History (Diploma)"]);
        assert_eq!(
            select_representative_name(&variants).as_deref(),
            Some("Art History (Diploma)")
        );
    }

    #[test]
    fn shortest_name_within_a_base() {
        let variants = names(&["Drafting (Diploma II)", "Drafting (Diploma)", "Drafting (Award)"]);
        assert_eq!(select_representative_name(&variants).as_deref(), Some("Drafting (Award)"));
    }

    #[test]
    fn empty_variants() {
        assert!(select_representative_name(&[]).is_none());
    }
}
