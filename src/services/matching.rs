//! Matching and risk scoring.
//!
//! Decides how well a catalog entry fits a concrete component, and what the
//! resulting risk is. Everything here is a pure function over value types;
//! persistence stays with the scenario generator.

use serde::{Deserialize, Serialize};

use crate::entities::assets::{Asset, SafetyClass};
use crate::entities::catalog::{ComponentType, ThreatCatalogEntry, TrustZone};
use crate::entities::products::Product;
use crate::entities::threat_scenarios::RiskLevel;
use crate::error::{AppError, Result};

/// Pairs scoring below this confidence are excluded from scenario
/// generation entirely.
pub const MIN_MATCH_CONFIDENCE: f32 = 0.3;

/// The matcher's view of one asset: a canonical component type, the trust
/// zone it operates in, and its safety classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentProfile {
    pub component_type: ComponentType,
    pub trust_zone: TrustZone,
    pub safety_class: SafetyClass,
}

impl ComponentProfile {
    /// Derive a profile from an asset and its product. Free-text tags fold
    /// into canonical values; unknown tags fall back to `Other` in a
    /// `Trusted` zone.
    pub fn for_asset(asset: &Asset, product: &Product) -> ComponentProfile {
        let component_type = map_asset_type(&asset.asset_type)
            .first()
            .copied()
            .unwrap_or(ComponentType::Other);
        let trust_zone = map_product_zone(&product.trust_zone)
            .first()
            .copied()
            .unwrap_or(TrustZone::Trusted);
        ComponentProfile {
            component_type,
            trust_zone,
            safety_class: asset.safety_class,
        }
    }
}

/// Canonical component types for a free-text asset type tag. The first entry
/// is the primary type; unknown tags map to nothing.
pub fn map_asset_type(tag: &str) -> Vec<ComponentType> {
    match tag.trim().to_ascii_lowercase().as_str() {
        "controller" | "ecu" | "mcu" => vec![ComponentType::Controller],
        "gateway" => vec![ComponentType::Gateway, ComponentType::Network],
        "sensor" => vec![ComponentType::Sensor],
        "actuator" => vec![ComponentType::Actuator],
        "network" | "bus" | "can" | "ethernet" => {
            vec![ComponentType::Network, ComponentType::Interface]
        }
        "storage" | "memory" | "flash" | "data" => vec![ComponentType::Storage],
        "interface" | "port" | "diagnostic" => vec![ComponentType::Interface],
        "application" | "software" | "service" => vec![ComponentType::Application],
        "firmware" => vec![ComponentType::Application, ComponentType::Controller],
        _ => Vec::new(),
    }
}

/// Canonical trust zones for a free-text product zone tag. The first entry
/// is the primary zone; unknown tags map to nothing.
pub fn map_product_zone(tag: &str) -> Vec<TrustZone> {
    match tag.trim().to_ascii_lowercase().as_str() {
        "critical" | "secure" => vec![TrustZone::Secure, TrustZone::Trusted],
        "internal" | "trusted" => vec![TrustZone::Trusted],
        "exposed" | "external" | "public" | "remote" => {
            vec![TrustZone::External, TrustZone::Untrusted]
        }
        "untrusted" | "hostile" => vec![TrustZone::Untrusted],
        _ => Vec::new(),
    }
}

/// Whether a catalog entry applies to an asset at all: its component types
/// must intersect the asset's mapped types and its trust zones must
/// intersect the product's mapped zones. An empty applicability list on the
/// entry matches everything.
pub fn applicable_to_asset(
    entry: &ThreatCatalogEntry,
    asset_types: &[ComponentType],
    product_zones: &[TrustZone],
) -> bool {
    let types_match = entry.component_types.0.is_empty()
        || entry
            .component_types
            .0
            .iter()
            .any(|t| asset_types.contains(t));
    let zones_match = entry.trust_zones.0.is_empty()
        || entry.trust_zones.0.iter().any(|z| product_zones.contains(z));
    types_match && zones_match
}

/// Confidence that an entry applies to a component: 0.6 for a component
/// type hit plus 0.4 for a trust zone hit, capped at 1.0. An empty
/// applicability list on the entry counts as a hit.
pub fn match_confidence(profile: &ComponentProfile, entry: &ThreatCatalogEntry) -> f32 {
    let mut confidence = 0.0_f32;
    if entry.component_types.0.is_empty()
        || entry.component_types.0.contains(&profile.component_type)
    {
        confidence += 0.6;
    }
    if entry.trust_zones.0.is_empty() || entry.trust_zones.0.contains(&profile.trust_zone) {
        confidence += 0.4;
    }
    confidence.min(1.0)
}

/// Likelihood for a concrete pairing: the catalog baseline, lowered for a
/// weak match or a secure zone, raised in an untrusted zone, clamped to 1-5.
pub fn derive_likelihood(base: i64, confidence: f32, trust_zone: TrustZone) -> i64 {
    let mut likelihood = base;
    if confidence < 0.5 {
        likelihood -= 1;
    }
    match trust_zone {
        TrustZone::Untrusted => likelihood += 1,
        TrustZone::Secure => likelihood -= 1,
        TrustZone::Trusted | TrustZone::External => {}
    }
    likelihood.clamp(1, 5)
}

/// Severity for a concrete pairing: the catalog baseline, raised by one for
/// assets in the two highest safety classes, clamped to 1-5.
pub fn derive_severity(base: i64, safety_class: SafetyClass) -> i64 {
    let mut severity = base;
    if safety_class.is_safety_critical() {
        severity += 1;
    }
    severity.clamp(1, 5)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThreshold {
    pub max_score: i64,
    pub level: RiskLevel,
}

/// An ordered set of score thresholds mapping likelihood x severity to a
/// qualitative level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFramework {
    pub name: String,
    pub thresholds: Vec<RiskThreshold>,
}

impl RiskFramework {
    /// The fixed three-tier table used when no framework is configured.
    pub fn fallback() -> RiskFramework {
        RiskFramework {
            name: "default-three-tier".to_string(),
            thresholds: vec![
                RiskThreshold {
                    max_score: 8,
                    level: RiskLevel::Low,
                },
                RiskThreshold {
                    max_score: 16,
                    level: RiskLevel::Medium,
                },
                RiskThreshold {
                    max_score: 25,
                    level: RiskLevel::High,
                },
            ],
        }
    }

    /// Strict decode; a framework without thresholds is rejected.
    pub fn from_json_str(raw: &str) -> Result<RiskFramework> {
        let framework: RiskFramework = serde_json::from_str(raw)?;
        if framework.thresholds.is_empty() {
            return Err(AppError::configuration(format!(
                "Risk framework '{}' has no thresholds",
                framework.name
            )));
        }
        Ok(framework)
    }

    /// Level of the lowest threshold whose bound covers the score. Scores
    /// above every bound take the highest configured level.
    pub fn classify(&self, score: i64) -> RiskLevel {
        let mut chosen: Option<RiskThreshold> = None;
        let mut highest: Option<RiskThreshold> = None;
        for threshold in &self.thresholds {
            if highest.map_or(true, |h| threshold.max_score > h.max_score) {
                highest = Some(*threshold);
            }
            if score <= threshold.max_score
                && chosen.map_or(true, |c| threshold.max_score < c.max_score)
            {
                chosen = Some(*threshold);
            }
        }
        chosen
            .or(highest)
            .map(|t| t.level)
            .unwrap_or(RiskLevel::High)
    }
}

/// The scores the generator persists for one accepted pairing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub confidence: f32,
    pub likelihood: i64,
    pub severity: i64,
    pub risk_score: i64,
    pub risk_level: RiskLevel,
}

/// Score one entry/component pairing, or `None` if the confidence is too
/// low to keep.
pub fn assess(
    entry: &ThreatCatalogEntry,
    profile: &ComponentProfile,
    framework: &RiskFramework,
) -> Option<RiskAssessment> {
    let confidence = match_confidence(profile, entry);
    if confidence < MIN_MATCH_CONFIDENCE {
        return None;
    }
    let likelihood = derive_likelihood(entry.likelihood, confidence, profile.trust_zone);
    let severity = derive_severity(entry.severity, profile.safety_class);
    let risk_score = likelihood * severity;
    Some(RiskAssessment {
        confidence,
        likelihood,
        severity,
        risk_score,
        risk_level: framework.classify(risk_score),
    })
}
