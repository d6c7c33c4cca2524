//! Damage-scenario templates.
//!
//! Templates are the vocabulary of harm: for each security property there is
//! a small set of texts describing what its violation costs, with suggested
//! sub-impact ratings. Like the enrichment mapping they are a versioned value
//! object, loaded once and passed by reference.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::entities::assets::CiaDimension;
use crate::entities::damage_scenarios::ImpactLevel;
use crate::error::Result;

/// Ratings on the four sub-impact axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubImpactRatings {
    pub safety: ImpactLevel,
    pub financial: ImpactLevel,
    pub operational: ImpactLevel,
    pub privacy: ImpactLevel,
}

impl SubImpactRatings {
    /// Worst rating across the four axes; used as the scenario severity.
    pub fn max_level(&self) -> ImpactLevel {
        self.safety
            .max(self.financial)
            .max(self.operational)
            .max(self.privacy)
    }

    /// Cap every axis at `cap`. Ratings are never raised.
    pub fn capped_at(&self, cap: ImpactLevel) -> SubImpactRatings {
        SubImpactRatings {
            safety: self.safety.min(cap),
            financial: self.financial.min(cap),
            operational: self.operational.min(cap),
            privacy: self.privacy.min(cap),
        }
    }
}

/// One damage-scenario template. `name` and `description` may contain
/// `{asset}` and `{product}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageTemplate {
    pub key: String,
    pub dimension: CiaDimension,
    pub name: String,
    pub description: String,
    pub suggested: SubImpactRatings,
}

impl DamageTemplate {
    /// Substitute asset and product names into the template text.
    pub fn render(text: &str, asset_name: &str, product_name: &str) -> String {
        text.replace("{asset}", asset_name)
            .replace("{product}", product_name)
    }

    /// Suggested ratings scaled down to the asset's own level. The asset
    /// rating caps each axis; a template never rates harm higher than the
    /// asset's declared protection need supports.
    pub fn scaled_ratings(&self, asset_level: ImpactLevel) -> SubImpactRatings {
        self.suggested.capped_at(asset_level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageTemplateSet {
    pub version: String,
    pub templates: Vec<DamageTemplate>,
}

impl DamageTemplateSet {
    pub fn for_dimension(&self, dimension: CiaDimension) -> Vec<&DamageTemplate> {
        self.templates
            .iter()
            .filter(|t| t.dimension == dimension)
            .collect()
    }

    /// Strict decode for callers that manage their own template files.
    pub fn from_json_str(raw: &str) -> Result<DamageTemplateSet> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a template file. An absent or malformed file is recovered as an
    /// empty set with a logged warning; generation then produces no damage
    /// scenarios, which is visible in the run counters.
    pub fn load(path: impl AsRef<Path>) -> DamageTemplateSet {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Failed to read damage templates from {}, using empty set: {e}",
                    path.display()
                );
                return DamageTemplateSet::empty();
            }
        };
        match DamageTemplateSet::from_json_str(&raw) {
            Ok(set) => set,
            Err(e) => {
                warn!(
                    "Failed to decode damage templates from {}, using empty set: {e}",
                    path.display()
                );
                DamageTemplateSet::empty()
            }
        }
    }

    pub fn empty() -> DamageTemplateSet {
        DamageTemplateSet {
            version: "empty".to_string(),
            templates: Vec::new(),
        }
    }

    /// The template set shipped with the crate: two templates per security
    /// property.
    pub fn builtin() -> DamageTemplateSet {
        fn template(
            key: &str,
            dimension: CiaDimension,
            name: &str,
            description: &str,
            safety: ImpactLevel,
            financial: ImpactLevel,
            operational: ImpactLevel,
            privacy: ImpactLevel,
        ) -> DamageTemplate {
            DamageTemplate {
                key: key.to_string(),
                dimension,
                name: name.to_string(),
                description: description.to_string(),
                suggested: SubImpactRatings {
                    safety,
                    financial,
                    operational,
                    privacy,
                },
            }
        }

        DamageTemplateSet {
            version: "builtin-2025.2".to_string(),
            templates: vec![
                template(
                    "data-disclosure",
                    CiaDimension::Confidentiality,
                    "Disclosure of {asset} data",
                    "Information held in or transported by {asset} becomes readable to \
                     unauthorized parties outside {product}.",
                    ImpactLevel::None,
                    ImpactLevel::Medium,
                    ImpactLevel::Low,
                    ImpactLevel::High,
                ),
                template(
                    "credential-exposure",
                    CiaDimension::Confidentiality,
                    "Exposure of {asset} secrets",
                    "Keys or credentials protecting {asset} leak, enabling follow-on access \
                     across {product}.",
                    ImpactLevel::Low,
                    ImpactLevel::High,
                    ImpactLevel::Medium,
                    ImpactLevel::Medium,
                ),
                template(
                    "unintended-behavior",
                    CiaDimension::Integrity,
                    "Manipulation of {asset}",
                    "Tampered content in {asset} drives {product} into unintended behavior.",
                    ImpactLevel::High,
                    ImpactLevel::Medium,
                    ImpactLevel::High,
                    ImpactLevel::None,
                ),
                template(
                    "corrupted-records",
                    CiaDimension::Integrity,
                    "Corruption of {asset} records",
                    "Data stored in or reported by {asset} can no longer be trusted for \
                     decisions about {product}.",
                    ImpactLevel::Low,
                    ImpactLevel::Medium,
                    ImpactLevel::Medium,
                    ImpactLevel::Low,
                ),
                template(
                    "loss-of-function",
                    CiaDimension::Availability,
                    "Loss of {asset}",
                    "{asset} stops serving {product}, removing the function it provides.",
                    ImpactLevel::High,
                    ImpactLevel::Medium,
                    ImpactLevel::High,
                    ImpactLevel::None,
                ),
                template(
                    "degraded-service",
                    CiaDimension::Availability,
                    "Degraded {asset} service",
                    "{asset} responds late or intermittently, degrading the operation of \
                     {product}.",
                    ImpactLevel::Low,
                    ImpactLevel::Low,
                    ImpactLevel::Medium,
                    ImpactLevel::None,
                ),
            ],
        }
    }
}
