//! Translation of parsed techniques into catalog-ready records.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::enrichment::MappingTable;
use crate::entities::catalog::{AttackVector, ComponentType, ThreatCategory, TrustZone};
use crate::stix::ParsedTechnique;

/// Category assigned by the technique's primary tactic phase. Phases outside
/// the table default to tampering, the broadest category.
pub fn tactic_category(phase: &str) -> ThreatCategory {
    match phase {
        "reconnaissance" | "discovery" | "collection" | "credential-access" | "exfiltration" => {
            ThreatCategory::InformationDisclosure
        }
        "initial-access" => ThreatCategory::Spoofing,
        "privilege-escalation" | "lateral-movement" => ThreatCategory::ElevationOfPrivilege,
        "defense-evasion" => ThreatCategory::Repudiation,
        "impact" => ThreatCategory::DenialOfService,
        "execution" | "persistence" | "command-and-control" => ThreatCategory::Tampering,
        _ => ThreatCategory::Tampering,
    }
}

/// A technique carrying its domain attributes, ready for catalog sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTechnique {
    pub technique_id: String,
    pub name: String,
    pub description: String,
    pub category: ThreatCategory,
    pub component_types: Vec<ComponentType>,
    pub trust_zones: Vec<TrustZone>,
    pub attack_vectors: Vec<AttackVector>,
    pub likelihood: i64,
    pub severity: i64,
    pub mitigations: Vec<String>,
    pub cross_refs: Vec<String>,
    pub examples: Option<String>,
    pub relevance: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentReport {
    pub enriched: Vec<EnrichedTechnique>,
    /// Techniques without a mapping entry or without an external identifier.
    pub dropped: usize,
}

/// Enrich a single technique. `None` means the technique is out of scope for
/// the domain, a deliberate filter rather than an error. Identical
/// (technique, mapping) inputs always produce identical output.
pub fn enrich_technique(
    technique: &ParsedTechnique,
    mapping: &MappingTable,
) -> Option<EnrichedTechnique> {
    if technique.external_id.is_empty() {
        debug!("Dropping technique '{}' without external id", technique.name);
        return None;
    }
    let attributes = mapping.entries.get(&technique.external_id)?;

    let category = technique
        .tactics
        .first()
        .map(|phase| tactic_category(phase))
        .unwrap_or(ThreatCategory::Tampering);

    let description = if attributes.context.is_empty() {
        technique.description.clone()
    } else if technique.description.is_empty() {
        attributes.context.clone()
    } else {
        format!("{} {}", attributes.context, technique.description)
    };

    // Curated strategies first, then mitigations the feed resolved for this
    // technique, without duplicates.
    let mut mitigations = attributes.mitigations.clone();
    for parsed in &technique.mitigations {
        if !parsed.name.is_empty() && !mitigations.iter().any(|m| m == &parsed.name) {
            mitigations.push(parsed.name.clone());
        }
    }

    Some(EnrichedTechnique {
        technique_id: technique.external_id.clone(),
        name: technique.name.clone(),
        description,
        category,
        component_types: attributes.component_types.clone(),
        trust_zones: attributes.trust_zones.clone(),
        attack_vectors: attributes.attack_vectors.clone(),
        likelihood: attributes.likelihood,
        severity: attributes.severity,
        mitigations,
        cross_refs: attributes.cross_refs.clone(),
        examples: attributes.examples.clone(),
        relevance: attributes.relevance,
    })
}

/// Enrich a whole parsed set, reporting how many techniques were dropped.
#[instrument(skip(techniques, mapping), fields(techniques = techniques.len(), mapping_version = %mapping.version))]
pub fn enrich_all_techniques(
    techniques: &[ParsedTechnique],
    mapping: &MappingTable,
) -> EnrichmentReport {
    let enriched: Vec<EnrichedTechnique> = techniques
        .iter()
        .filter_map(|technique| enrich_technique(technique, mapping))
        .collect();
    let dropped = techniques.len() - enriched.len();
    info!(
        "Enriched {} technique(s), dropped {} without domain mapping",
        enriched.len(),
        dropped
    );
    EnrichmentReport { enriched, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stix::{ParsedMitigation, StixBundle, parser};

    fn technique(external_id: &str, tactics: &[&str]) -> ParsedTechnique {
        ParsedTechnique {
            external_id: external_id.to_string(),
            name: format!("Technique {external_id}"),
            description: "Adversaries do things.".to_string(),
            tactics: tactics.iter().map(|t| t.to_string()).collect(),
            mitigations: Vec::new(),
        }
    }

    #[test]
    fn test_tactic_category_table() {
        assert_eq!(
            tactic_category("credential-access"),
            ThreatCategory::InformationDisclosure
        );
        assert_eq!(tactic_category("initial-access"), ThreatCategory::Spoofing);
        assert_eq!(
            tactic_category("privilege-escalation"),
            ThreatCategory::ElevationOfPrivilege
        );
        assert_eq!(tactic_category("defense-evasion"), ThreatCategory::Repudiation);
        assert_eq!(tactic_category("impact"), ThreatCategory::DenialOfService);
        assert_eq!(tactic_category("persistence"), ThreatCategory::Tampering);
        assert_eq!(tactic_category("no-such-phase"), ThreatCategory::Tampering);
    }

    #[test]
    fn test_unmapped_technique_is_dropped() {
        let mapping = MappingTable::builtin();
        assert!(enrich_technique(&technique("T9999", &["impact"]), &mapping).is_none());
        assert!(enrich_technique(&technique("", &["impact"]), &mapping).is_none());
    }

    #[test]
    fn test_enrich_copies_domain_attributes() {
        let mapping = MappingTable::builtin();
        let enriched = enrich_technique(&technique("T1040", &["credential-access"]), &mapping)
            .expect("T1040 should be mapped");

        assert_eq!(enriched.technique_id, "T1040");
        assert_eq!(enriched.category, ThreatCategory::InformationDisclosure);
        assert_eq!(enriched.likelihood, 4);
        assert_eq!(enriched.severity, 3);
        assert_eq!(enriched.relevance, 4);
        assert!(!enriched.component_types.is_empty());
        // Curated context is prepended to the feed description
        assert!(enriched.description.ends_with("Adversaries do things."));
        assert!(enriched.description.len() > "Adversaries do things.".len());
    }

    #[test]
    fn test_category_uses_primary_tactic() {
        let mapping = MappingTable::builtin();
        let enriched = enrich_technique(&technique("T1499", &["impact", "execution"]), &mapping)
            .expect("T1499 should be mapped");
        assert_eq!(enriched.category, ThreatCategory::DenialOfService);

        let no_tactics = enrich_technique(&technique("T1499", &[]), &mapping)
            .expect("T1499 should be mapped");
        assert_eq!(no_tactics.category, ThreatCategory::Tampering);
    }

    #[test]
    fn test_feed_mitigations_are_merged_without_duplicates() {
        let mapping = MappingTable::builtin();
        let mut parsed = technique("T1040", &["credential-access"]);
        parsed.mitigations = vec![
            ParsedMitigation {
                external_id: "M1041".to_string(),
                name: "Encrypt Sensitive Information".to_string(),
                description: String::new(),
            },
            ParsedMitigation {
                external_id: "M1041".to_string(),
                name: "Encrypt sensitive traffic".to_string(),
                description: String::new(),
            },
        ];

        let enriched = enrich_technique(&parsed, &mapping).expect("T1040 should be mapped");
        // The curated list already contains "Encrypt sensitive traffic"
        assert_eq!(
            enriched
                .mitigations
                .iter()
                .filter(|m| *m == "Encrypt sensitive traffic")
                .count(),
            1
        );
        assert!(
            enriched
                .mitigations
                .contains(&"Encrypt Sensitive Information".to_string())
        );
    }

    #[test]
    fn test_enrich_all_reports_drop_count() {
        let mapping = MappingTable::builtin();
        let bundle = StixBundle::from_json_str(crate::fixtures::ATTACK_BUNDLE);
        let techniques = parser::parse_full_bundle(&bundle);
        let report = enrich_all_techniques(&techniques, &mapping);

        // T1557 and T1040 are mapped, T9999 is not
        assert_eq!(report.enriched.len(), 2);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn test_enrichment_is_deterministic() {
        let mapping = MappingTable::builtin();
        let parsed = technique("T1557", &["credential-access", "collection"]);
        let first = enrich_technique(&parsed, &mapping);
        let second = enrich_technique(&parsed, &mapping);
        assert_eq!(first, second);
    }
}
