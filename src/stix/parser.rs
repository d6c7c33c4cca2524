//! Operations over a decoded bundle. [`parse_full_bundle`] is the entry
//! point the rest of the pipeline consumes; the `extract_*` functions are
//! the individual passes it composes.

use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use crate::stix::{
    ATTACK_SOURCE, KillChainPhase, ParsedMitigation, ParsedTechnique, StixBundle, StixObject,
};

const TECHNIQUE_TYPE: &str = "attack-pattern";
const MITIGATION_TYPE: &str = "course-of-action";
const TACTIC_TYPE: &str = "x-mitre-tactic";
const RELATIONSHIP_TYPE: &str = "relationship";
const MITIGATES: &str = "mitigates";

/// Stable external identifier of an object, read from the reference tagged
/// with the feed's source name. Objects can carry references to blogs and
/// advisories under other source names; those never hold the identifier.
fn external_id(object: &StixObject) -> Option<String> {
    object
        .external_references
        .iter()
        .find(|r| r.source_name == ATTACK_SOURCE)
        .and_then(|r| r.external_id.clone())
}

fn is_active(object: &StixObject, object_type: &str) -> bool {
    object.object_type == object_type && !object.revoked && !object.x_mitre_deprecated
}

fn tactic_phases(phases: &[KillChainPhase]) -> Vec<String> {
    phases
        .iter()
        .filter(|p| p.kill_chain_name == ATTACK_SOURCE)
        .map(|p| p.phase_name.clone())
        .collect()
}

/// Strip `(Citation: ...)` markers and collapse runs of whitespace.
pub(crate) fn normalize_description(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("(Citation:") {
        stripped.push_str(&rest[..start]);
        match rest[start..].find(')') {
            Some(end) => rest = &rest[start + end + 1..],
            // Unterminated marker swallows the remainder.
            None => rest = "",
        }
    }
    stripped.push_str(rest);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_technique(object: &StixObject) -> ParsedTechnique {
    ParsedTechnique {
        external_id: external_id(object).unwrap_or_default(),
        name: object.name.clone().unwrap_or_default(),
        description: normalize_description(object.description.as_deref().unwrap_or_default()),
        tactics: tactic_phases(&object.kill_chain_phases),
        mitigations: Vec::new(),
    }
}

/// Non-revoked, non-deprecated techniques, normalized. Techniques without a
/// recoverable external identifier are still emitted (identifier empty) so
/// the caller can count them; the enricher drops them.
pub fn extract_techniques(bundle: &StixBundle) -> Vec<ParsedTechnique> {
    bundle
        .objects
        .iter()
        .filter(|o| is_active(o, TECHNIQUE_TYPE))
        .map(normalize_technique)
        .collect()
}

/// Mitigations keyed by their internal object id. Relationships reference
/// internal ids, never external ones.
pub fn extract_mitigations(bundle: &StixBundle) -> HashMap<String, ParsedMitigation> {
    bundle
        .objects
        .iter()
        .filter(|o| is_active(o, MITIGATION_TYPE))
        .map(|o| {
            (
                o.id.clone(),
                ParsedMitigation {
                    external_id: external_id(o).unwrap_or_default(),
                    name: o.name.clone().unwrap_or_default(),
                    description: normalize_description(
                        o.description.as_deref().unwrap_or_default(),
                    ),
                },
            )
        })
        .collect()
}

/// Tactic definitions as an internal-id → short-name lookup.
pub fn extract_tactics(bundle: &StixBundle) -> HashMap<String, String> {
    bundle
        .objects
        .iter()
        .filter(|o| o.object_type == TACTIC_TYPE)
        .filter_map(|o| {
            o.x_mitre_shortname
                .as_ref()
                .map(|short| (o.id.clone(), short.clone()))
        })
        .collect()
}

/// Technique internal id → internal ids of the mitigations addressing it,
/// built from "mitigates"-typed relationship objects.
pub fn build_technique_mitigation_map(bundle: &StixBundle) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for object in &bundle.objects {
        if object.object_type != RELATIONSHIP_TYPE
            || object.relationship_type.as_deref() != Some(MITIGATES)
        {
            continue;
        }
        if let (Some(mitigation_id), Some(technique_id)) =
            (object.source_ref.as_ref(), object.target_ref.as_ref())
        {
            map.entry(technique_id.clone())
                .or_default()
                .push(mitigation_id.clone());
        }
    }
    map
}

/// Decode the whole bundle into techniques with resolved tactic names and
/// mitigations. A bundle missing whole object collections yields whatever
/// can be assembled from what is present, down to an empty list.
#[instrument(skip(bundle), fields(objects = bundle.objects.len()))]
pub fn parse_full_bundle(bundle: &StixBundle) -> Vec<ParsedTechnique> {
    let mitigations = extract_mitigations(bundle);
    let tactics = extract_tactics(bundle);
    let mitigation_map = build_technique_mitigation_map(bundle);

    let mut unknown_phases = 0usize;
    let techniques: Vec<ParsedTechnique> = bundle
        .objects
        .iter()
        .filter(|o| is_active(o, TECHNIQUE_TYPE))
        .map(|object| {
            let mut technique = normalize_technique(object);
            unknown_phases += technique
                .tactics
                .iter()
                .filter(|phase| !tactics.is_empty() && !tactics.values().any(|s| s == *phase))
                .count();
            if let Some(mitigation_ids) = mitigation_map.get(&object.id) {
                technique.mitigations = mitigation_ids
                    .iter()
                    .filter_map(|id| mitigations.get(id).cloned())
                    .collect();
            }
            technique
        })
        .collect();

    if unknown_phases > 0 {
        debug!(
            "{} tactic phase reference(s) had no matching tactic definition",
            unknown_phases
        );
    }
    if techniques.is_empty() && !bundle.objects.is_empty() {
        warn!("Bundle contained no usable attack-pattern objects");
    }
    debug!(
        "Parsed {} technique(s), {} mitigation(s), {} tactic(s) from bundle",
        techniques.len(),
        mitigations.len(),
        tactics.len()
    );
    techniques
}
