//! Threat-intel bundle decoding.
//!
//! Bundles arrive as one JSON document holding a flat list of typed objects:
//! attack techniques, mitigations, tactic definitions and the relationships
//! between them. Feeds evolve and occasionally omit whole object kinds, so
//! every field here is optional at the serde level and absence is handled by
//! the parser, not by deserialization failure.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub mod parser;

/// Identifier scheme the stable external ids are tagged with inside
/// `external_references`.
pub const ATTACK_SOURCE: &str = "mitre-attack";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StixBundle {
    #[serde(default)]
    pub objects: Vec<StixObject>,
}

impl StixBundle {
    /// Decode a bundle from a JSON string. A malformed document is recovered
    /// as an empty bundle with a logged warning; feeds are external input and
    /// must never take the pipeline down.
    pub fn from_json_str(raw: &str) -> StixBundle {
        match serde_json::from_str(raw) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Failed to decode threat-intel bundle, treating as empty: {e}");
                StixBundle::default()
            }
        }
    }

    /// Read and decode a bundle file. Same recovery policy as
    /// [`StixBundle::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> StixBundle {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => StixBundle::from_json_str(&raw),
            Err(e) => {
                warn!(
                    "Failed to read threat-intel bundle from {}: {e}",
                    path.display()
                );
                StixBundle::default()
            }
        }
    }
}

/// One object of the bundle, decoded loosely: only the fields the pipeline
/// reads are kept, everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StixObject {
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub x_mitre_deprecated: bool,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
    #[serde(default)]
    pub kill_chain_phases: Vec<KillChainPhase>,
    #[serde(default)]
    pub x_mitre_shortname: Option<String>,
    #[serde(default)]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub target_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalReference {
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KillChainPhase {
    #[serde(default)]
    pub kill_chain_name: String,
    #[serde(default)]
    pub phase_name: String,
}

/// A technique normalized out of the bundle. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedTechnique {
    /// Stable external identifier; empty if the bundle carried none. Such
    /// records survive parsing and are dropped later by the enricher.
    pub external_id: String,
    pub name: String,
    pub description: String,
    /// Tactic phase short-names, in bundle order.
    pub tactics: Vec<String>,
    pub mitigations: Vec<ParsedMitigation>,
}

/// A mitigation normalized out of the bundle. Shared between techniques.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedMitigation {
    pub external_id: String,
    pub name: String,
    pub description: String,
}
