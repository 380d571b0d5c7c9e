//! Core domain types for catalog enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label stored in [`Specification::print_method`] when nothing is known.
pub const PRINT_METHOD_NOT_APPLICABLE: &str = "NÃO APLICÁVEL";

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// Identifier of a product or category as it appears in the catalog JSON.
///
/// Catalog exports use both integer and string ids, so both are accepted and
/// written back in their original form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Catalog input
// ---------------------------------------------------------------------------

/// A category record. Unknown fields pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A product record from the input catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Stable across runs; used as the checkpoint key.
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category_id: Option<RecordId>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-text vendor notes. See [`Product::notes_text`] for older exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Every other field of the record, carried through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Passthrough key older catalog exports use for the vendor notes.
pub const LEGACY_NOTES_KEY: &str = "_notes";

impl Product {
    /// Notes to extract from and prompt with.
    ///
    /// `notes` wins; otherwise a string under the legacy `_notes` key is used.
    /// The legacy key itself stays in `extra` and is written back unchanged.
    pub fn notes_text(&self) -> Option<&str> {
        self.notes
            .as_deref()
            .or_else(|| self.extra.get(LEGACY_NOTES_KEY).and_then(Value::as_str))
    }
}

/// The input artifact: categories plus products.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub products: Vec<Product>,
}

// ---------------------------------------------------------------------------
// Specification
// ---------------------------------------------------------------------------

/// Paper formats recognised from graphic-area dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperFormat {
    A4,
    A5,
    A6,
    #[serde(rename = "DL")]
    Dl,
    #[serde(rename = "1/3 A4")]
    ThirdA4,
}

impl PaperFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::A6 => "A6",
            Self::Dl => "DL",
            Self::ThirdA4 => "1/3 A4",
        }
    }
}

impl std::fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outer dimensions of the product, in millimetres.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDimensions {
    pub width_mm: Option<u32>,
    pub height_mm: Option<u32>,
    pub depth_mm: Option<u32>,
}

/// Printable/insertable area, in millimetres.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicArea {
    pub width_mm: Option<u32>,
    pub height_mm: Option<u32>,
    pub format: Option<PaperFormat>,
}

/// Technical specification parsed from vendor notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub product: ProductDimensions,
    pub graphic_area: GraphicArea,
    pub print_method: String,
    pub color_count: u32,
}

impl Default for Specification {
    fn default() -> Self {
        Self {
            product: ProductDimensions::default(),
            graphic_area: GraphicArea::default(),
            print_method: PRINT_METHOD_NOT_APPLICABLE.to_string(),
            color_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Generated copy and enriched output
// ---------------------------------------------------------------------------

/// Marketing copy returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCopy {
    pub summary: String,
    pub full_description: String,
    pub advantages: String,
}

/// Keys owned by [`EnrichedProduct`]; a passthrough field with the same name
/// is replaced rather than duplicated.
const ENRICHED_KEYS: [&str; 4] = [
    "summary",
    "full_description",
    "advantages",
    "technical_specifications",
];

/// A product merged with its specification and generated copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProduct {
    /// All original fields, including the raw notes.
    #[serde(flatten)]
    pub product: Product,
    pub summary: String,
    pub full_description: String,
    pub advantages: String,
    pub technical_specifications: Specification,
}

impl EnrichedProduct {
    /// Merge a product with its specification and optional generated copy.
    ///
    /// Without copy, `summary` and `advantages` are empty and
    /// `full_description` falls back to the original description.
    pub fn merge(mut product: Product, spec: Specification, copy: Option<GeneratedCopy>) -> Self {
        for key in ENRICHED_KEYS {
            product.extra.remove(key);
        }

        let (summary, full_description, advantages) = match copy {
            Some(copy) => (copy.summary, copy.full_description, copy.advantages),
            None => (
                String::new(),
                product.description.clone().unwrap_or_default(),
                String::new(),
            ),
        };

        Self {
            product,
            summary,
            full_description,
            advantages,
            technical_specifications: spec,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.product.id
    }

    /// True when no generated copy was merged in.
    ///
    /// Heuristic: it only checks that `summary` and `advantages` are empty, so
    /// a model that returned empty strings for both is counted as a fallback too.
    pub fn is_fallback(&self) -> bool {
        self.summary.is_empty() && self.advantages.is_empty()
    }
}

/// Summary statistics in the output artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStats {
    pub total_products: usize,
    pub enriched_at: DateTime<Utc>,
}

/// The final enriched catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub categories: Vec<Category>,
    pub products: Vec<EnrichedProduct>,
    pub stats: OutputStats,
}
