use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod error;
pub mod logging;
pub mod pdf;
pub mod preview;
pub mod proof;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use error::{ProofError, ProofResult};
pub use proof::{
    Alignment, DrawInstruction, FitConfig, LayoutResult, LocatorConfig, MarkerRegion,
    PageGeometry, RasterImage, fit, locate,
};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub template: PathBuf,
    pub lines: Vec<String>,
    pub output_dir: Option<PathBuf>,
    /// Stem for generated files; defaults to the template's file stem.
    pub output_name: Option<String>,
    /// One-based page number; defaults to the first page.
    pub page: Option<usize>,
    /// Pre-rendered page image used instead of rasterizing the template.
    pub raster: Option<PathBuf>,
    pub zoom: Option<f32>,
    pub alignment: Option<Alignment>,
    pub padding: Option<f32>,
    pub overlay: bool,
    pub no_preview: bool,
    pub debug_border: bool,
    pub settings_path: Option<String>,
}

/// What a proof run produced, printed as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ProofReport {
    pub detected_marker: bool,
    pub region: MarkerRegion,
    pub font_size: f32,
    pub line_height: f32,
    pub fits: bool,
    pub font_regular: String,
    pub font_bold: String,
    pub final_pdf: PathBuf,
    pub overlay_pdf: Option<PathBuf>,
    pub preview_png: Option<PathBuf>,
    pub notes: Vec<String>,
}

pub fn run(config: Config) -> Result<ProofReport> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(alignment) = config.alignment {
        settings.fit.alignment = alignment;
    }
    if let Some(padding) = config.padding {
        settings.fit.padding = padding;
    }
    let zoom = config.zoom.unwrap_or(settings.zoom);
    let write_overlay = config.overlay || settings.output.overlay;
    let write_preview = settings.output.preview && !config.no_preview;
    let debug_border = config.debug_border || settings.output.debug_border;

    if config.lines.is_empty() {
        return Err(anyhow!("no text lines given (use --line or pipe lines on stdin)"));
    }
    let page_index = match config.page {
        Some(0) => return Err(anyhow!("page numbers start at 1")),
        Some(page) => page - 1,
        None => 0,
    };

    let template = fs::read(&config.template)
        .with_context(|| format!("failed to read template: {}", config.template.display()))?;
    let geometry = pdf::page_geometry(&template, page_index)?;
    let raster = match &config.raster {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read raster: {}", path.display()))?;
            pdf::decode_raster(&bytes)?
        }
        None => pdf::rasterize_page(&template, page_index, zoom)?,
    };
    check_raster_aspect(&raster, geometry)?;
    let raster = pdf::upright_raster(raster, geometry.rotation);

    let region = locate(&raster, geometry, &settings.locator)?;
    let fonts = proof::resolve_fonts(&settings.fonts);
    let layout = fit(&region, config.lines.as_slice(), &fonts, &settings.fit)?;

    let mut notes = fonts.fallback_notes();
    if !region.detected {
        notes.push(
            "no marker found; text placed in a fallback region centered on the page".to_string(),
        );
    }
    if !layout.fits {
        notes.push(format!(
            "text does not fit at the minimum font size {}; lines may overflow the region",
            layout.font_size
        ));
    }
    for note in &notes {
        warn!("{}", note);
    }

    let style = pdf::OverlayStyle {
        text_color: pdf::parse_hex_color(&settings.output.text_color)?,
        border_color: if debug_border {
            Some(pdf::parse_hex_color(&settings.output.border_color)?)
        } else {
            None
        },
    };
    let overlay = pdf::render_overlay(geometry, &region, &layout, &fonts, &style)?;

    let output_dir = config
        .output_dir
        .clone()
        .or_else(|| settings.output.dir.as_ref().map(PathBuf::from))
        .or_else(|| config.template.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    fs::create_dir_all(&output_dir).with_context(|| {
        format!("failed to create output directory: {}", output_dir.display())
    })?;
    let stem = output_stem(&config)?;
    let final_path = output_dir.join(format!("{}_with_text.pdf", stem));
    let overlay_path = output_dir.join(format!("{}_overlay.pdf", stem));
    let preview_path = output_dir.join(format!("{}_preview.png", stem));

    if write_overlay {
        write_file(&overlay_path, &overlay)?;
    }
    let merged = match pdf::merge_overlay(&template, &overlay, page_index) {
        Ok(bytes) => bytes,
        Err(err) => {
            // Keep the overlay around so the text can still be placed by hand.
            if !write_overlay {
                write_file(&overlay_path, &overlay)?;
            }
            return Err(err.context(format!(
                "failed to merge overlay into template (overlay kept at {})",
                overlay_path.display()
            )));
        }
    };
    write_file(&final_path, &merged)?;
    info!(path = %final_path.display(), "proof written");

    let preview_png = if write_preview {
        let png = preview::render_preview(&raster, geometry, &region, &layout, &fonts, &style)?;
        write_file(&preview_path, &png)?;
        Some(preview_path)
    } else {
        None
    };

    Ok(ProofReport {
        detected_marker: region.detected,
        region,
        font_size: layout.font_size,
        line_height: layout.line_height,
        fits: layout.fits,
        font_regular: fonts.regular.name(),
        font_bold: fonts.bold.name(),
        final_pdf: final_path,
        overlay_pdf: write_overlay.then_some(overlay_path),
        preview_png,
        notes,
    })
}

// Allowed relative difference between the raster's and the page's aspect ratio.
const ASPECT_TOLERANCE: f32 = 0.01;

/// The raster must show the page as displayed (rotation applied); otherwise
/// marker pixels would be scaled unevenly onto the page box.
fn check_raster_aspect(raster: &RasterImage, geometry: PageGeometry) -> Result<()> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("page raster is empty"));
    }
    let raster_aspect = width as f32 / height as f32;
    let page_aspect = geometry.displayed_aspect();
    if (raster_aspect / page_aspect - 1.0).abs() > ASPECT_TOLERANCE {
        return Err(anyhow!(
            "page raster is {}x{} px (aspect {:.3}) but the page displays at aspect {:.3}; render the same page and page box",
            width,
            height,
            raster_aspect,
            page_aspect
        ));
    }
    Ok(())
}

fn output_stem(config: &Config) -> Result<String> {
    if let Some(name) = config.output_name.as_deref() {
        let name = name.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }
    config
        .template
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("template path has no file name: {}", config.template.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
