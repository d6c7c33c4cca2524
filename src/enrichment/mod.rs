//! Curated mapping from external technique identifiers to domain attributes.
//!
//! The mapping decides which techniques from the feed matter for embedded
//! products at all, and what they mean once inside: applicable component
//! types and trust zones, baseline ratings, mitigation strategies. It is a
//! versioned value object, loaded once and passed by reference.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::entities::catalog::{AttackVector, ComponentType, TrustZone};
use crate::error::Result;

pub mod enricher;

/// Domain attributes assigned to one external technique identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueMapping {
    /// Curated relevance to the product domain, 1-5.
    pub relevance: i64,
    /// Why this technique matters here; prepended to the catalog description.
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub component_types: Vec<ComponentType>,
    #[serde(default)]
    pub trust_zones: Vec<TrustZone>,
    #[serde(default)]
    pub attack_vectors: Vec<AttackVector>,
    /// Baseline likelihood, 1-5.
    pub likelihood: i64,
    /// Baseline severity, 1-5.
    pub severity: i64,
    #[serde(default)]
    pub mitigations: Vec<String>,
    #[serde(default)]
    pub cross_refs: Vec<String>,
    #[serde(default)]
    pub examples: Option<String>,
}

/// The whole mapping configuration. Techniques absent from `entries` are
/// out of scope for the domain and dropped during enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    pub version: String,
    pub entries: HashMap<String, TechniqueMapping>,
}

impl MappingTable {
    /// Strict decode for callers that manage their own configuration.
    pub fn from_json_str(raw: &str) -> Result<MappingTable> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a mapping file. An absent or malformed file is recovered as an
    /// empty table with a logged warning: enrichment then drops every
    /// technique, which is visible in the report counters.
    pub fn load(path: impl AsRef<Path>) -> MappingTable {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Failed to read mapping table from {}, using empty table: {e}",
                    path.display()
                );
                return MappingTable::empty();
            }
        };
        match MappingTable::from_json_str(&raw) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    "Failed to decode mapping table from {}, using empty table: {e}",
                    path.display()
                );
                MappingTable::empty()
            }
        }
    }

    pub fn empty() -> MappingTable {
        MappingTable {
            version: "empty".to_string(),
            entries: HashMap::new(),
        }
    }

    /// The curated table shipped with the crate, covering the techniques
    /// that recur in embedded and vehicle security assessments.
    pub fn builtin() -> MappingTable {
        fn entry(
            relevance: i64,
            likelihood: i64,
            severity: i64,
            context: &str,
            component_types: &[ComponentType],
            trust_zones: &[TrustZone],
            attack_vectors: &[AttackVector],
            mitigations: &[&str],
            cross_refs: &[&str],
        ) -> TechniqueMapping {
            TechniqueMapping {
                relevance,
                context: context.to_string(),
                component_types: component_types.to_vec(),
                trust_zones: trust_zones.to_vec(),
                attack_vectors: attack_vectors.to_vec(),
                likelihood,
                severity,
                mitigations: mitigations.iter().map(|m| m.to_string()).collect(),
                cross_refs: cross_refs.iter().map(|c| c.to_string()).collect(),
                examples: None,
            }
        }

        let mut entries = HashMap::new();

        entries.insert(
            "T1557".to_string(),
            entry(
                5,
                3,
                4,
                "In-vehicle buses and diagnostic links carry unauthenticated frames an \
                 interposed device can rewrite.",
                &[ComponentType::Network, ComponentType::Gateway],
                &[TrustZone::Untrusted, TrustZone::External],
                &[AttackVector::Adjacent, AttackVector::Physical],
                &["Authenticate bus messages", "Segment diagnostic interfaces"],
                &["CAPEC-94"],
            ),
        );
        entries.insert(
            "T1040".to_string(),
            entry(
                4,
                4,
                3,
                "Broadcast bus traffic is readable by any node on the segment.",
                &[ComponentType::Network, ComponentType::Interface],
                &[TrustZone::Untrusted, TrustZone::External],
                &[AttackVector::Adjacent, AttackVector::Physical],
                &["Encrypt sensitive traffic", "Restrict physical port access"],
                &["CAPEC-158"],
            ),
        );
        entries.insert(
            "T1078".to_string(),
            entry(
                4,
                3,
                4,
                "Default and shared service credentials survive for years in fielded units.",
                &[ComponentType::Application, ComponentType::Interface],
                &[TrustZone::External, TrustZone::Untrusted],
                &[AttackVector::Network, AttackVector::Local],
                &["Per-device credentials", "Disable default accounts before shipment"],
                &["CWE-798"],
            ),
        );
        entries.insert(
            "T1498".to_string(),
            entry(
                3,
                3,
                3,
                "Connected services and telematics links can be saturated from outside.",
                &[ComponentType::Network, ComponentType::Gateway],
                &[TrustZone::External],
                &[AttackVector::Network],
                &["Rate limiting", "Degraded-mode operation without connectivity"],
                &["CAPEC-125"],
            ),
        );
        entries.insert(
            "T1542".to_string(),
            entry(
                5,
                2,
                5,
                "Unverified boot chains let persistent implants survive reflashing.",
                &[ComponentType::Controller, ComponentType::Storage],
                &[TrustZone::Secure, TrustZone::Trusted],
                &[AttackVector::Physical, AttackVector::Local],
                &["Secure boot with hardware root of trust", "Signed firmware updates"],
                &["CWE-1326"],
            ),
        );
        entries.insert(
            "T1068".to_string(),
            entry(
                4,
                3,
                5,
                "A compromised low-privilege process can pivot into safety-relevant \
                 partitions through kernel or hypervisor flaws.",
                &[ComponentType::Controller, ComponentType::Application],
                &[TrustZone::Trusted, TrustZone::Secure],
                &[AttackVector::Local],
                &["Least-privilege partitioning", "Patch management for the runtime"],
                &["CWE-269"],
            ),
        );
        entries.insert(
            "T1195".to_string(),
            entry(
                4,
                2,
                5,
                "Third-party libraries and tier supplier images enter the build unreviewed.",
                &[],
                &[],
                &[AttackVector::Network],
                &["Software bill of materials", "Verify supplier artifacts"],
                &["CWE-1357"],
            ),
        );
        entries.insert(
            "T1203".to_string(),
            entry(
                3,
                3,
                4,
                "Media parsers and protocol stacks in head units process attacker data.",
                &[ComponentType::Application, ComponentType::Interface],
                &[TrustZone::Untrusted, TrustZone::External],
                &[AttackVector::Network, AttackVector::Adjacent],
                &["Fuzz exposed parsers", "Memory-safe parsing components"],
                &["CWE-787"],
            ),
        );
        entries.insert(
            "T1499".to_string(),
            entry(
                3,
                3,
                3,
                "Resource exhaustion on a controller stalls its control loop.",
                &[ComponentType::Controller, ComponentType::Application],
                &[TrustZone::Untrusted, TrustZone::Trusted],
                &[AttackVector::Network, AttackVector::Adjacent],
                &["Watchdog supervision", "Bound request queues"],
                &["CWE-400"],
            ),
        );
        entries.insert(
            "T1552".to_string(),
            entry(
                4,
                4,
                4,
                "Keys and tokens end up in flash images, logs and calibration files.",
                &[ComponentType::Storage, ComponentType::Controller],
                &[TrustZone::Trusted, TrustZone::Secure],
                &[AttackVector::Local, AttackVector::Physical],
                &["Hardware-backed key storage", "Scrub secrets from images and logs"],
                &["CWE-312", "CWE-522"],
            ),
        );
        entries.insert(
            "T1071".to_string(),
            entry(
                3,
                3,
                3,
                "Implants blend command traffic into the telematics channels the \
                 product already uses.",
                &[ComponentType::Gateway, ComponentType::Application],
                &[TrustZone::External],
                &[AttackVector::Network],
                &["Egress allow-lists", "Anomaly detection on backend links"],
                &["CAPEC-216"],
            ),
        );
        entries.insert(
            "T1200".to_string(),
            entry(
                4,
                2,
                4,
                "Workshop and debug connectors accept any device that is plugged in.",
                &[ComponentType::Interface, ComponentType::Network, ComponentType::Actuator],
                &[TrustZone::Untrusted],
                &[AttackVector::Physical],
                &["Disable debug interfaces in production", "Authenticate diagnostic sessions"],
                &["CAPEC-440"],
            ),
        );

        let mut table = MappingTable {
            version: "builtin-2025.2".to_string(),
            entries,
        };
        if let Some(aitm) = table.entries.get_mut("T1557") {
            aitm.examples =
                Some("Interposer on the OBD-II connector rewriting calibration reads".to_string());
        }
        if let Some(hardware) = table.entries.get_mut("T1200") {
            hardware.examples = Some(
                "Dongle left in the diagnostic port injecting frames after service".to_string(),
            );
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_well_formed() {
        let table = MappingTable::builtin();
        assert!(table.entries.len() >= 10);
        for (technique_id, mapping) in &table.entries {
            assert!(technique_id.starts_with('T'), "bad key {technique_id}");
            assert!((1..=5).contains(&mapping.relevance));
            assert!((1..=5).contains(&mapping.likelihood));
            assert!((1..=5).contains(&mapping.severity));
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let table = MappingTable::builtin();
        let raw = serde_json::to_string(&table).expect("Failed to serialize mapping table");
        let decoded = MappingTable::from_json_str(&raw).expect("Failed to decode mapping table");
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_from_json_str_rejects_malformed() {
        assert!(MappingTable::from_json_str("{\"version\": 3}").is_err());
    }

    #[test]
    fn test_load_recovers_from_missing_file() {
        let table = MappingTable::load("/nonexistent/mapping.json");
        assert!(table.entries.is_empty());
    }
}
