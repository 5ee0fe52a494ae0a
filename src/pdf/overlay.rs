use anyhow::{Context, Result, anyhow};
use printpdf::{Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, Point, Rgb};
use std::io::{BufWriter, Cursor, Write};
use tracing::debug;

use crate::proof::{FontSource, LayoutResult, MarkerRegion, PageGeometry, ResolvedFonts, Weight};

pub struct OverlayStyle {
    pub text_color: [f32; 3],
    /// Stroke color for an outline around the placement region; `None` draws no outline.
    pub border_color: Option<[f32; 3]>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            text_color: [0.0, 0.0, 0.0],
            border_color: None,
        }
    }
}

/// Builds a single transparent page, the size of the template page, holding
/// only the laid-out text. Coordinates are relative to the page box origin.
pub fn render_overlay(
    geometry: PageGeometry,
    region: &MarkerRegion,
    layout: &LayoutResult,
    fonts: &ResolvedFonts,
    style: &OverlayStyle,
) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        "proof overlay",
        pt_to_mm(geometry.width),
        pt_to_mm(geometry.height),
        "Overlay",
    );
    let regular = add_font(&doc, &fonts.regular)?;
    let bold = add_font(&doc, &fonts.bold)?;
    let layer = doc.get_page(page).get_layer(layer);

    if let Some(color) = style.border_color {
        layer.set_outline_color(rgb(color));
        layer.set_outline_thickness(1.0);
        let corners = [
            (region.x0, region.y0),
            (region.x1, region.y0),
            (region.x1, region.y1),
            (region.x0, region.y1),
        ];
        layer.add_line(Line {
            points: corners
                .iter()
                .map(|(x, y)| (Point::new(pt_to_mm(*x), pt_to_mm(*y)), false))
                .collect(),
            is_closed: true,
        });
    }

    layer.set_fill_color(rgb(style.text_color));
    for instruction in &layout.instructions {
        let font = match instruction.weight {
            Weight::Bold => &bold,
            Weight::Regular => &regular,
        };
        layer.use_text(
            instruction.text.clone(),
            layout.font_size,
            pt_to_mm(instruction.x),
            pt_to_mm(instruction.y),
            font,
        );
    }
    debug!(
        lines = layout.instructions.len(),
        font_size = layout.font_size,
        "overlay page drawn"
    );

    save(doc)
}

fn add_font(doc: &PdfDocumentReference, source: &FontSource) -> Result<IndirectFontRef> {
    match source {
        FontSource::Embedded { metrics, origin } => doc
            .add_external_font(Cursor::new(metrics.data().to_vec()))
            .with_context(|| format!("failed to embed font: {}", origin)),
        FontSource::Builtin(font) => doc
            .add_builtin_font(font.to_printpdf())
            .with_context(|| format!("failed to add base font: {}", font.name())),
    }
}

fn save(doc: PdfDocumentReference) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buffer);
        doc.save(&mut writer)
            .with_context(|| "failed to write overlay pdf")?;
        writer.flush().with_context(|| "failed to flush overlay pdf")?;
    }
    Ok(buffer)
}

fn rgb([r, g, b]: [f32; 3]) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn pt_to_mm(points: f32) -> Mm {
    Mm(points / 72.0 * 25.4)
}

/// Parses `#rrggbb` (leading `#` optional) into 0..1 components.
pub fn parse_hex_color(value: &str) -> Result<[f32; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid color '{}' (expected #rrggbb)", value));
    }
    let mut components = [0.0f32; 3];
    for (idx, slot) in components.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16)
            .with_context(|| format!("invalid color '{}'", value))?;
        *slot = byte as f32 / 255.0;
    }
    Ok(components)
}
