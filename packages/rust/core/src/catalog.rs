//! Reading the input catalog and writing the enriched output artifact.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, instrument};

use enricher_checkpoint::write_atomic;
use enricher_shared::{
    Catalog, Category, EnrichedProduct, EnricherError, OutputArtifact, OutputStats, Result,
};

/// Load the input catalog (`categories` + `products`).
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path).map_err(|e| EnricherError::io(path, e))?;
    let catalog: Catalog = serde_json::from_str(&content)
        .map_err(|e| EnricherError::parse(format!("invalid catalog {}: {e}", path.display())))?;

    info!(
        products = catalog.products.len(),
        categories = catalog.categories.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Assemble the output artifact, stamped with the current time.
pub fn build_output(categories: &[Category], products: Vec<EnrichedProduct>) -> OutputArtifact {
    OutputArtifact {
        categories: categories.to_vec(),
        stats: OutputStats {
            total_products: products.len(),
            enriched_at: Utc::now(),
        },
        products,
    }
}

/// Write the output artifact as pretty JSON (temp file + rename).
#[instrument(skip_all, fields(path = %path.display(), products = artifact.products.len()))]
pub fn write_output(path: &Path, artifact: &OutputArtifact) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact).map_err(|e| {
        EnricherError::validation(format!("JSON serialization failed: {e}"))
    })?;
    write_atomic(path, json.as_bytes())?;
    debug!("wrote output artifact");
    Ok(())
}
