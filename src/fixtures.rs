//! Shared builders and canned feed data for tests.

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::entities::assets::{Asset, CiaDimension, SafetyClass, SecurityLevel};
use crate::entities::catalog::{ComponentType, ThreatCatalogEntry, ThreatCategory, TrustZone};
use crate::entities::damage_scenarios::{DamageScenario, ImpactLevel};
use crate::entities::generation_runs::GenerationRun;
use crate::entities::products::Product;
use crate::entities::threat_scenarios::{RiskLevel, ThreatScenario};

pub(crate) fn asset(
    product_id: Uuid,
    name: &str,
    asset_type: &str,
    confidentiality: SecurityLevel,
    integrity: SecurityLevel,
    availability: SecurityLevel,
) -> Asset {
    let now = Utc::now();
    Asset {
        id: Uuid::new_v4(),
        product_id,
        name: name.to_string(),
        asset_type: asset_type.to_string(),
        confidentiality,
        integrity,
        availability,
        safety_class: SafetyClass::Qm,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn catalog_entry(
    technique_id: &str,
    category: ThreatCategory,
    component_types: Vec<ComponentType>,
    trust_zones: Vec<TrustZone>,
) -> ThreatCatalogEntry {
    let now = Utc::now();
    ThreatCatalogEntry {
        id: Uuid::new_v4(),
        technique_id: technique_id.to_string(),
        name: format!("Technique {technique_id}"),
        description: format!("Feed description of {technique_id}."),
        category,
        component_types: Json(component_types),
        trust_zones: Json(trust_zones),
        attack_vectors: Json(Vec::new()),
        likelihood: 3,
        severity: 4,
        mitigations: Json(Vec::new()),
        cross_refs: Json(Vec::new()),
        examples: None,
        relevance: 3,
        source: "external-feed".to_string(),
        source_version: None,
        user_modified: false,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn damage_scenario(
    product_id: Uuid,
    run_id: Uuid,
    name: &str,
    dimension: CiaDimension,
) -> DamageScenario {
    let now = Utc::now();
    DamageScenario {
        id: Uuid::new_v4(),
        product_id,
        run_id,
        name: name.to_string(),
        description: format!("{name} affecting day-to-day operation."),
        category: dimension,
        severity: ImpactLevel::Medium,
        violates_confidentiality: dimension == CiaDimension::Confidentiality,
        violates_integrity: dimension == CiaDimension::Integrity,
        violates_availability: dimension == CiaDimension::Availability,
        safety_impact: ImpactLevel::None,
        financial_impact: ImpactLevel::Medium,
        operational_impact: ImpactLevel::Low,
        privacy_impact: ImpactLevel::Low,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn threat_scenario(
    product: &Product,
    run: &GenerationRun,
    asset: &Asset,
    entry: &ThreatCatalogEntry,
) -> ThreatScenario {
    let now = Utc::now();
    ThreatScenario {
        id: Uuid::new_v4(),
        product_id: product.id,
        run_id: run.id,
        asset_id: asset.id,
        catalog_entry_id: entry.id,
        technique_id: entry.technique_id.clone(),
        name: format!("{} against {}", entry.name, asset.name),
        description: entry.description.clone(),
        category: entry.category,
        confidence: 0.6,
        likelihood: 3,
        severity: 4,
        risk_score: 12,
        risk_level: RiskLevel::Medium,
        source: entry.source.clone(),
        source_version: entry.source_version.clone(),
        created_at: now,
        updated_at: now,
    }
}

/// Small hand-written feed covering active, revoked and deprecated
/// techniques, one mitigation relationship and one tactic definition.
pub(crate) const ATTACK_BUNDLE: &str = r#"{
  "type": "bundle",
  "id": "bundle--0d9b2678-96c4-4b9c-9a1e-3f7e45bc0a11",
  "objects": [
    {
      "type": "attack-pattern",
      "id": "attack-pattern--b636eb92-8065-4e34-b0e6-f65e2b9c0c7c",
      "name": "Adversary-in-the-Middle",
      "description": "Adversaries may position themselves between networked devices to intercept traffic. (Citation: Rapid7 MiTM Basics)",
      "external_references": [
        {
          "source_name": "mitre-attack",
          "external_id": "T1557",
          "url": "https://attack.mitre.org/techniques/T1557"
        }
      ],
      "kill_chain_phases": [
        {"kill_chain_name": "mitre-attack", "phase_name": "credential-access"},
        {"kill_chain_name": "mitre-attack", "phase_name": "collection"}
      ]
    },
    {
      "type": "attack-pattern",
      "id": "attack-pattern--3257eb21-f9a7-4430-8de1-d8b6e288f529",
      "name": "Network Sniffing",
      "description": "Adversaries may passively sniff network traffic. (Citation: Libpcap Docs)",
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "T1040"}
      ],
      "kill_chain_phases": [
        {"kill_chain_name": "mitre-attack", "phase_name": "credential-access"}
      ]
    },
    {
      "type": "attack-pattern",
      "id": "attack-pattern--9a9bf394-5264-4b03-8811-61ba81a21b6c",
      "name": "Unmapped Technique",
      "description": "A technique outside the curated domain mapping.",
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "T9999"}
      ]
    },
    {
      "type": "attack-pattern",
      "id": "attack-pattern--2e34237d-8574-43f6-aace-ae2915de8597",
      "name": "Old Revoked Technique",
      "revoked": true,
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "T1111"}
      ]
    },
    {
      "type": "attack-pattern",
      "id": "attack-pattern--46944654-fcc1-4f63-9dad-628102376586",
      "name": "Deprecated Technique",
      "x_mitre_deprecated": true,
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "T2222"}
      ]
    },
    {
      "type": "course-of-action",
      "id": "course-of-action--fcbe8424-eb3e-4794-b76d-e743f5e49b8b",
      "name": "Encrypt Sensitive Information",
      "description": "Use strong encryption for session traffic.",
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "M1041"}
      ]
    },
    {
      "type": "relationship",
      "id": "relationship--e04f9e76-9d4c-4a86-9a5e-0c9ae7e56091",
      "relationship_type": "mitigates",
      "source_ref": "course-of-action--fcbe8424-eb3e-4794-b76d-e743f5e49b8b",
      "target_ref": "attack-pattern--b636eb92-8065-4e34-b0e6-f65e2b9c0c7c"
    },
    {
      "type": "x-mitre-tactic",
      "id": "x-mitre-tactic--ta0006",
      "name": "Credential Access",
      "x_mitre_shortname": "credential-access"
    }
  ]
}"#;
