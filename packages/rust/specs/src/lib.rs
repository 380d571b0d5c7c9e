//! Technical specification extraction from vendor notes.
//!
//! Vendor notes are free text such as:
//!
//! ```text
//! Produto: Largura: 210mm Altura: 297mm
//! Área Gráfica:
//! Largura: 99mm
//! Altura: 210mm
//! ```
//!
//! [`extract`] pulls product and graphic-area dimensions out of that text and
//! infers a paper format for the graphic area. It never fails: anything it
//! cannot read is left at its default.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use enricher_shared::{PaperFormat, Specification};

/// Allowed deviation, in mm, when matching a paper format.
const FORMAT_TOLERANCE_MM: u32 = 5;

/// Known formats as `(width, height)`, portrait and landscape.
/// Order matters: the first entry within tolerance wins.
const FORMAT_TABLE: &[((u32, u32), PaperFormat)] = &[
    ((210, 297), PaperFormat::A4),
    ((297, 210), PaperFormat::A4),
    ((148, 210), PaperFormat::A5),
    ((210, 148), PaperFormat::A5),
    ((105, 148), PaperFormat::A6),
    ((148, 105), PaperFormat::A6),
    ((99, 210), PaperFormat::Dl),
    ((210, 99), PaperFormat::Dl),
    ((100, 210), PaperFormat::Dl),
    ((210, 100), PaperFormat::Dl),
    ((99, 297), PaperFormat::ThirdA4),
    ((297, 99), PaperFormat::ThirdA4),
    ((100, 297), PaperFormat::ThirdA4),
];

static GRAPHIC_AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[áa]rea\s*gr[áa]fica|graphic\s*area").expect("valid regex")
});

static PRODUCT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:produto|product)[:\s]*(.*?)(?:[áa]rea|material|$)").expect("valid regex")
});

static WIDTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:largura|width)[:\s]*(\d+)\s*(?:mm)?").expect("valid regex")
});

static HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:altura|height)[:\s]*(\d+)\s*(?:mm)?").expect("valid regex")
});

static DEPTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:profundidade|depth)[:\s]*(\d+)\s*(?:mm)?").expect("valid regex")
});

/// Extract a [`Specification`] from vendor notes.
pub fn extract(notes: Option<&str>) -> Specification {
    let mut spec = Specification::default();

    let Some(notes) = notes.filter(|n| !n.is_empty()) else {
        return spec;
    };

    let text = notes.replace("\r\n", "\n").replace('\r', "\n");

    let mut sections = GRAPHIC_AREA_RE.split(&text);
    let product_section = sections.next().unwrap_or_default();
    let area_section = sections.next().unwrap_or_default();

    let product_text = PRODUCT_LABEL_RE
        .captures(product_section)
        .and_then(|caps| caps.get(1))
        .map_or(product_section, |m| m.as_str());

    spec.product.width_mm = first_dimension(&WIDTH_RE, product_text);
    spec.product.height_mm = first_dimension(&HEIGHT_RE, product_text);
    spec.product.depth_mm = first_dimension(&DEPTH_RE, product_text);

    if !area_section.is_empty() {
        spec.graphic_area.width_mm = first_dimension(&WIDTH_RE, area_section);
        spec.graphic_area.height_mm = first_dimension(&HEIGHT_RE, area_section);
    }

    if let (Some(width), Some(height)) = (spec.graphic_area.width_mm, spec.graphic_area.height_mm) {
        spec.graphic_area.format = infer_format(width, height);
    }

    spec
}

/// Match graphic-area dimensions against the known paper formats.
pub fn infer_format(width_mm: u32, height_mm: u32) -> Option<PaperFormat> {
    FORMAT_TABLE
        .iter()
        .find(|((w, h), _)| {
            width_mm.abs_diff(*w) <= FORMAT_TOLERANCE_MM
                && height_mm.abs_diff(*h) <= FORMAT_TOLERANCE_MM
        })
        .map(|(_, format)| *format)
}

/// Value of the first labelled match. A token that does not parse leaves the
/// field empty; later matches are not consulted.
fn first_dimension(re: &Regex, text: &str) -> Option<u32> {
    let digits = re.captures(text)?.get(1)?.as_str();
    match digits.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(token = digits, error = %e, "ignoring unparseable dimension");
            None
        }
    }
}
