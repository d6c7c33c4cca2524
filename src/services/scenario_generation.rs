//! Scenario generation.
//!
//! Walks a product's assets and, for every security property the asset
//! actually cares about, instantiates damage scenarios from templates, then
//! pairs the asset against the threat catalog to derive risk-scored threat
//! scenarios. Each batch is tagged with a generation run so later runs can
//! replace it wholesale without touching anything a different run produced.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::entities::assets::{Asset, CiaDimension, assets_for_product};
use crate::entities::catalog::{ThreatCatalogEntry, all_catalog_entries};
use crate::entities::damage_scenarios::{
    DamageScenario, ImpactLevel, delete_damage_scenarios_for_run, insert_damage_scenario,
    link_damage_scenario_asset,
};
use crate::entities::generation_runs::{
    GenerationRun, active_runs_for_product, complete_generation_run, insert_generation_run,
    mark_run_superseded,
};
use crate::entities::products::{Product, product_by_id};
use crate::entities::threat_scenarios::{
    ThreatScenario, delete_threat_scenarios_for_run, insert_threat_damage_link,
    insert_threat_scenario,
};
use crate::error::{AppError, Result};
use crate::services::matching::{
    ComponentProfile, RiskAssessment, RiskFramework, applicable_to_asset, assess, map_asset_type,
    map_product_zone,
};
use crate::storage::db::DatabaseManager;
use crate::templates::{DamageTemplate, DamageTemplateSet};

/// How to treat scenarios left over from earlier runs for the same product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// Replace earlier generated scenarios and mark their runs superseded.
    #[default]
    Supersede,
    /// Refuse to generate while an earlier run is still active.
    RejectIfGenerated,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub mode: GenerationMode,
    /// Classification table; the fixed three-tier table applies when unset.
    pub risk_framework: Option<RiskFramework>,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub run_id: Uuid,
    pub assets_processed: usize,
    pub damage_scenarios_created: usize,
    pub threat_scenarios_created: usize,
}

pub struct ScenarioGenerationService {
    db: DatabaseManager,
    templates: DamageTemplateSet,
}

impl ScenarioGenerationService {
    pub fn new(db: DatabaseManager) -> Self {
        Self {
            db,
            templates: DamageTemplateSet::builtin(),
        }
    }

    pub fn with_templates(db: DatabaseManager, templates: DamageTemplateSet) -> Self {
        Self { db, templates }
    }

    /// Generate damage and threat scenarios for every asset of a product.
    /// The whole batch commits in one transaction; a failure leaves earlier
    /// runs untouched.
    #[instrument(skip(self, options))]
    pub async fn generate_for_product(
        &self,
        product_id: &Uuid,
        options: &GenerationOptions,
    ) -> Result<GenerationReport> {
        let mut tx = self.db.pool.begin().await?;

        let product = product_by_id(&mut tx, product_id)
            .await?
            .ok_or_else(|| AppError::not_found("Product", product_id))?;

        let prior_runs = active_runs_for_product(&mut tx, product_id).await?;
        if !prior_runs.is_empty() {
            match options.mode {
                GenerationMode::RejectIfGenerated => {
                    return Err(AppError::validation(format!(
                        "Product {} already has {} active generation run(s)",
                        product_id,
                        prior_runs.len()
                    )));
                }
                GenerationMode::Supersede => {
                    for run in &prior_runs {
                        let threats = delete_threat_scenarios_for_run(&mut tx, &run.id).await?;
                        let damages = delete_damage_scenarios_for_run(&mut tx, &run.id).await?;
                        mark_run_superseded(&mut tx, &run.id).await?;
                        debug!(
                            "Superseded run {}: removed {} threat and {} damage scenarios",
                            run.id, threats, damages
                        );
                    }
                }
            }
        }

        let run = insert_generation_run(&mut tx, product_id).await?;
        let assets = assets_for_product(&mut tx, product_id).await?;
        let catalog = all_catalog_entries(&mut tx).await?;
        let framework = options
            .risk_framework
            .clone()
            .unwrap_or_else(RiskFramework::fallback);

        let mut damage_total = 0usize;
        let mut threat_total = 0usize;
        for asset in &assets {
            let damage_ids = self
                .create_damage_scenarios(&mut tx, &product, &run, asset)
                .await?;
            damage_total += damage_ids.values().map(Vec::len).sum::<usize>();
            threat_total += create_threat_scenarios(
                &mut tx, &product, &run, asset, &catalog, &framework, &damage_ids,
            )
            .await?;
        }

        complete_generation_run(
            &mut tx,
            &run.id,
            assets.len() as i64,
            damage_total as i64,
            threat_total as i64,
        )
        .await?;
        tx.commit().await?;

        info!(
            "Generation run {} for product '{}': {} assets, {} damage and {} threat scenarios",
            run.id,
            product.name,
            assets.len(),
            damage_total,
            threat_total
        );
        Ok(GenerationReport {
            run_id: run.id,
            assets_processed: assets.len(),
            damage_scenarios_created: damage_total,
            threat_scenarios_created: threat_total,
        })
    }

    /// Instantiate damage templates for every active security dimension of
    /// one asset, returning the created scenario ids grouped by dimension.
    async fn create_damage_scenarios(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        product: &Product,
        run: &GenerationRun,
        asset: &Asset,
    ) -> Result<HashMap<CiaDimension, Vec<Uuid>>> {
        let mut damage_ids: HashMap<CiaDimension, Vec<Uuid>> = HashMap::new();
        for dimension in asset.active_dimensions() {
            let asset_level = ImpactLevel::from(asset.rating_for(dimension));
            for template in self.templates.for_dimension(dimension) {
                let scenario =
                    damage_scenario_from_template(product, run, asset, template, asset_level);
                let inserted = insert_damage_scenario(&mut *tx, &scenario).await?;
                link_damage_scenario_asset(&mut *tx, &inserted.id, &asset.id).await?;
                damage_ids.entry(dimension).or_default().push(inserted.id);
            }
        }
        Ok(damage_ids)
    }
}

fn damage_scenario_from_template(
    product: &Product,
    run: &GenerationRun,
    asset: &Asset,
    template: &DamageTemplate,
    asset_level: ImpactLevel,
) -> DamageScenario {
    let scaled = template.scaled_ratings(asset_level);
    let now = Utc::now();
    DamageScenario {
        id: Uuid::new_v4(),
        product_id: product.id,
        run_id: run.id,
        name: DamageTemplate::render(&template.name, &asset.name, &product.name),
        description: DamageTemplate::render(&template.description, &asset.name, &product.name),
        category: template.dimension,
        severity: scaled.max_level(),
        violates_confidentiality: template.dimension == CiaDimension::Confidentiality,
        violates_integrity: template.dimension == CiaDimension::Integrity,
        violates_availability: template.dimension == CiaDimension::Availability,
        safety_impact: scaled.safety,
        financial_impact: scaled.financial,
        operational_impact: scaled.operational,
        privacy_impact: scaled.privacy,
        created_at: now,
        updated_at: now,
    }
}

/// Pair one asset against the catalog. Entries that do not apply, score
/// below the confidence floor, or would link to no damage scenario are
/// discarded.
async fn create_threat_scenarios(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product: &Product,
    run: &GenerationRun,
    asset: &Asset,
    catalog: &[ThreatCatalogEntry],
    framework: &RiskFramework,
    damage_ids: &HashMap<CiaDimension, Vec<Uuid>>,
) -> Result<usize> {
    let asset_types = map_asset_type(&asset.asset_type);
    let product_zones = map_product_zone(&product.trust_zone);
    let profile = ComponentProfile::for_asset(asset, product);

    let mut created = 0usize;
    for entry in catalog {
        if !applicable_to_asset(entry, &asset_types, &product_zones) {
            continue;
        }
        let Some(assessment) = assess(entry, &profile, framework) else {
            continue;
        };

        let mut links: Vec<(Uuid, CiaDimension)> = Vec::new();
        for dimension in entry.category.violated_dimensions() {
            if let Some(ids) = damage_ids.get(dimension) {
                links.extend(ids.iter().map(|id| (*id, *dimension)));
            }
        }
        if links.is_empty() {
            debug!(
                "Discarding '{}' for asset '{}': no damage scenario to link",
                entry.technique_id, asset.name
            );
            continue;
        }

        let scenario = threat_scenario_from_entry(product, run, asset, entry, &assessment);
        let inserted = insert_threat_scenario(&mut *tx, &scenario).await?;
        for (damage_id, dimension) in &links {
            insert_threat_damage_link(&mut *tx, &inserted.id, damage_id, *dimension).await?;
        }
        created += 1;
    }
    Ok(created)
}

fn threat_scenario_from_entry(
    product: &Product,
    run: &GenerationRun,
    asset: &Asset,
    entry: &ThreatCatalogEntry,
    assessment: &RiskAssessment,
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
        confidence: f64::from(assessment.confidence),
        likelihood: assessment.likelihood,
        severity: assessment.severity,
        risk_score: assessment.risk_score,
        risk_level: assessment.risk_level,
        source: entry.source.clone(),
        source_version: entry.source_version.clone(),
        created_at: now,
        updated_at: now,
    }
}
