//! Batch enrichment orchestrator.
//!
//! Walks the catalog in input order, skips products already in the
//! checkpoint, and for every other product extracts its specification,
//! requests marketing copy and records the merged result. The checkpoint is
//! flushed every `checkpoint_interval` newly processed products and once
//! more at the end, after which the output artifact is written.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use enricher_checkpoint::CheckpointStore;
use enricher_generation::GenerationClient;
use enricher_shared::{
    Catalog, EnrichedProduct, OutputArtifact, PipelineConfig, RecordId, Result,
};

use crate::catalog::{build_output, write_output};
use crate::prompt::build_prompt;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// How a single product came out of the generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOutcome {
    /// Copy was generated and merged.
    Generated,
    /// Generation gave up; fallback copy was used.
    Fallback,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Products processed during this run.
    pub processed: usize,
    /// Products skipped because they were already processed.
    pub skipped: usize,
    pub generated: usize,
    pub fallback: usize,
    pub elapsed: Duration,
}

/// Output of [`run_enrichment`].
#[derive(Debug, Clone)]
pub struct EnrichmentRun {
    /// The artifact that was written to `config.output`.
    pub artifact: OutputArtifact,
    pub stats: RunStats,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Run the enrichment pipeline over `catalog`.
///
/// 1. Load the checkpoint (a broken one means a fresh start)
/// 2. Enrich every product not yet processed, flushing periodically
/// 3. Flush the checkpoint
/// 4. Write the output artifact
///
/// Generation failures never abort the run. Failing to save the checkpoint
/// or the output does, leaving the previous snapshot on disk.
#[instrument(skip_all, fields(products = catalog.products.len(), checkpoint = %store.path().display()))]
pub async fn run_enrichment(
    config: &PipelineConfig,
    catalog: &Catalog,
    client: &mut GenerationClient,
    store: &CheckpointStore,
    progress: &dyn EnrichmentProgress,
) -> Result<EnrichmentRun> {
    let started = Instant::now();
    let mut stats = RunStats::default();

    progress.phase("Loading checkpoint");
    let mut state = store.load();

    let categories: HashMap<&RecordId, &str> = catalog
        .categories
        .iter()
        .map(|category| (&category.id, category.name.as_str()))
        .collect();

    progress.phase("Enriching products");
    let total = catalog.products.len();
    let mut unsaved = 0;

    for (index, product) in catalog.products.iter().enumerate() {
        if state.contains(&product.id) {
            debug!(id = %product.id, "already processed, skipping");
            stats.skipped += 1;
            continue;
        }

        let name = product.name.as_deref().unwrap_or_default();
        progress.product_started(index + 1, total, name);

        let spec = enricher_specs::extract(product.notes_text());
        let category = product
            .category_id
            .as_ref()
            .and_then(|id| categories.get(id).copied())
            .unwrap_or(config.default_category.as_str());
        let prompt = build_prompt(product, category);

        let copy = client.generate(&prompt).await;
        let outcome = if copy.is_some() {
            stats.generated += 1;
            ProductOutcome::Generated
        } else {
            stats.fallback += 1;
            ProductOutcome::Fallback
        };

        state.record(EnrichedProduct::merge(product.clone(), spec, copy))?;
        stats.processed += 1;
        progress.product_finished(&product.id, name, outcome);

        unsaved += 1;
        if unsaved >= config.checkpoint_interval {
            store.save(&mut state)?;
            progress.checkpoint_saved(state.len());
            unsaved = 0;
        }

        if !config.item_delay.is_zero() {
            tokio::time::sleep(config.item_delay).await;
        }
    }

    progress.phase("Saving checkpoint");
    store.save(&mut state)?;
    progress.checkpoint_saved(state.len());

    progress.phase("Writing output");
    let artifact = build_output(&catalog.categories, state.into_enriched_products());
    write_output(&config.output, &artifact)?;

    stats.elapsed = started.elapsed();
    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        generated = stats.generated,
        fallback = stats.fallback,
        total = artifact.stats.total_products,
        elapsed_secs = stats.elapsed.as_secs(),
        "enrichment complete"
    );

    Ok(EnrichmentRun { artifact, stats })
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for enrichment runs.
pub trait EnrichmentProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// A product is about to be enriched. `current` is its 1-based input position.
    fn product_started(&self, current: usize, total: usize, name: &str);
    fn product_finished(&self, id: &RecordId, name: &str, outcome: ProductOutcome);
    /// The checkpoint was flushed with `processed` products.
    fn checkpoint_saved(&self, processed: usize);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn phase(&self, _name: &str) {}
    fn product_started(&self, _current: usize, _total: usize, _name: &str) {}
    fn product_finished(&self, _id: &RecordId, _name: &str, _outcome: ProductOutcome) {}
    fn checkpoint_saved(&self, _processed: usize) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
