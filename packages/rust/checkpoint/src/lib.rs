//! Durable progress snapshots for the enrichment pipeline.
//!
//! A checkpoint is a single JSON document:
//!
//! ```text
//! {
//!   "processed_ids": [...],        // processing order, no duplicates
//!   "enriched_products": [...],    // enriched_products[i] belongs to processed_ids[i]
//!   "timestamp": "..."
//! }
//! ```
//!
//! Snapshots are rewritten whole through a temp file and a rename, so a crash
//! leaves either the previous snapshot or the new one on disk. Nothing here
//! ever deletes a checkpoint.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use enricher_shared::{EnrichedProduct, EnricherError, RecordId, Result};

// ---------------------------------------------------------------------------
// CheckpointState
// ---------------------------------------------------------------------------

/// In-memory pipeline progress.
///
/// The processed-id list and the result list only grow together through
/// [`CheckpointState::record`], so they are always the same length and
/// index-aligned.
#[derive(Debug, Clone, Default)]
pub struct CheckpointState {
    processed_ids: Vec<RecordId>,
    enriched_products: Vec<EnrichedProduct>,
    seen: HashSet<RecordId>,
    saved_at: Option<DateTime<Utc>>,
}

impl CheckpointState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processed products.
    pub fn len(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_ids.is_empty()
    }

    /// Whether `id` has already been processed.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.seen.contains(id)
    }

    /// Append one enriched product and its id.
    pub fn record(&mut self, enriched: EnrichedProduct) -> Result<()> {
        let id = enriched.id().clone();
        if !self.seen.insert(id.clone()) {
            return Err(EnricherError::validation(format!(
                "product {id} is already recorded in the checkpoint"
            )));
        }
        self.processed_ids.push(id);
        self.enriched_products.push(enriched);
        Ok(())
    }

    pub fn processed_ids(&self) -> &[RecordId] {
        &self.processed_ids
    }

    pub fn enriched_products(&self) -> &[EnrichedProduct] {
        &self.enriched_products
    }

    /// When this state was last written or read from disk.
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    /// Consume the state, keeping the results in processing order.
    pub fn into_enriched_products(self) -> Vec<EnrichedProduct> {
        self.enriched_products
    }

    /// Rebuild a state from a decoded snapshot, checking the alignment invariant.
    fn from_snapshot(snapshot: OwnedSnapshot) -> Result<Self> {
        let OwnedSnapshot {
            processed_ids,
            enriched_products,
            timestamp,
        } = snapshot;

        if processed_ids.len() != enriched_products.len() {
            return Err(EnricherError::validation(format!(
                "processed_ids has {} entries, enriched_products has {}",
                processed_ids.len(),
                enriched_products.len()
            )));
        }

        let mut seen = HashSet::with_capacity(processed_ids.len());
        for (index, (id, enriched)) in processed_ids.iter().zip(&enriched_products).enumerate() {
            if enriched.id() != id {
                return Err(EnricherError::validation(format!(
                    "entry {index}: processed id {id} does not match enriched product {}",
                    enriched.id()
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(EnricherError::validation(format!(
                    "entry {index}: duplicate processed id {id}"
                )));
            }
        }

        Ok(Self {
            processed_ids,
            enriched_products,
            seen,
            saved_at: timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// On-disk format
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SnapshotRef<'a> {
    processed_ids: &'a [RecordId],
    enriched_products: &'a [EnrichedProduct],
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct OwnedSnapshot {
    #[serde(default)]
    processed_ids: Vec<RecordId>,
    #[serde(default)]
    enriched_products: Vec<EnrichedProduct>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// CheckpointStore
// ---------------------------------------------------------------------------

/// Reads and writes checkpoint snapshots at a fixed path.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot, or an empty state.
    ///
    /// A missing file is a fresh start. An unreadable, corrupt, or
    /// misaligned snapshot is logged and also treated as a fresh start.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> CheckpointState {
        match self.try_load() {
            Ok(Some(state)) => {
                info!(processed = state.len(), "resuming from checkpoint");
                state
            }
            Ok(None) => {
                debug!("no checkpoint found, starting fresh");
                CheckpointState::new()
            }
            Err(e) => {
                warn!(error = %e, "could not load checkpoint, starting fresh");
                CheckpointState::new()
            }
        }
    }

    /// Strict load: `Ok(None)` when no snapshot exists, an error when one
    /// exists but cannot be used.
    pub fn try_load(&self) -> Result<Option<CheckpointState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&self.path).map_err(|e| EnricherError::io(&self.path, e))?;
        let snapshot: OwnedSnapshot = serde_json::from_str(&content).map_err(|e| {
            EnricherError::Checkpoint(format!("invalid snapshot {}: {e}", self.path.display()))
        })?;

        CheckpointState::from_snapshot(snapshot).map(Some)
    }

    /// Persist `state` atomically and stamp it with the save time.
    #[instrument(skip_all, fields(path = %self.path.display(), processed = state.len()))]
    pub fn save(&self, state: &mut CheckpointState) -> Result<()> {
        let timestamp = Utc::now();
        let snapshot = SnapshotRef {
            processed_ids: &state.processed_ids,
            enriched_products: &state.enriched_products,
            timestamp,
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EnricherError::Checkpoint(format!("failed to encode snapshot: {e}")))?;

        write_atomic(&self.path, json.as_bytes())?;
        state.saved_at = Some(timestamp);

        debug!("checkpoint saved");
        Ok(())
    }
}

/// Write `bytes` to a sibling temp file, sync it, then rename over `path`.
///
/// The temp file is removed if any step fails. The parent directory is not
/// fsynced after the rename, so a power loss right after a save may still
/// surface the previous snapshot.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| EnricherError::io(&dir, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| EnricherError::validation(format!("not a file path: {}", path.display())))?;
    let temp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let written = File::create(&temp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        discard_temp(&temp);
        return Err(EnricherError::io(&temp, e));
    }

    if let Err(e) = std::fs::rename(&temp, path) {
        discard_temp(&temp);
        return Err(EnricherError::io(path, e));
    }
    Ok(())
}

fn discard_temp(temp: &Path) {
    if let Err(e) = std::fs::remove_file(temp) {
        debug!(path = %temp.display(), error = %e, "could not remove temp file");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
