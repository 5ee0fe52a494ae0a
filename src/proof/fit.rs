use serde::Serialize;

use super::{Alignment, FontMetric, MarkerRegion, Weight};
use crate::error::{ProofError, ProofResult};

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Inset in points applied on every side of the region.
    pub padding: f32,
    pub min_font_size: u32,
    pub start_font_size: u32,
    pub line_height_multiplier: f32,
    pub alignment: Alignment,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            padding: 6.0,
            min_font_size: 8,
            start_font_size: 24,
            line_height_multiplier: 1.2,
            alignment: Alignment::Left,
        }
    }
}

impl FitConfig {
    fn validate(&self) -> ProofResult<()> {
        if !self.padding.is_finite() || self.padding < 0.0 {
            return Err(ProofError::invalid(format!(
                "padding must be a non-negative number (got {})",
                self.padding
            )));
        }
        if self.min_font_size == 0 {
            return Err(ProofError::invalid("min font size must be at least 1"));
        }
        if self.start_font_size < self.min_font_size {
            return Err(ProofError::invalid(format!(
                "start font size {} is below min font size {}",
                self.start_font_size, self.min_font_size
            )));
        }
        if !self.line_height_multiplier.is_finite() || self.line_height_multiplier <= 0.0 {
            return Err(ProofError::invalid(format!(
                "line height multiplier must be positive (got {})",
                self.line_height_multiplier
            )));
        }
        Ok(())
    }
}

/// One line of text placed at its baseline origin, in page points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawInstruction {
    pub text: String,
    pub weight: Weight,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutResult {
    pub font_size: f32,
    pub line_height: f32,
    /// False when even the minimum size overflows the padded region.
    pub fits: bool,
    pub instructions: Vec<DrawInstruction>,
}

/// Picks the largest integer font size, searching down from `start_font_size`,
/// at which every line fits inside the padded region, then lays the lines out
/// top to bottom. Falls back to `min_font_size` when nothing fits.
pub fn fit<S, M>(
    region: &MarkerRegion,
    lines: &[S],
    metrics: &M,
    config: &FitConfig,
) -> ProofResult<LayoutResult>
where
    S: AsRef<str>,
    M: FontMetric + ?Sized,
{
    config.validate()?;
    region.validate()?;
    if lines.is_empty() {
        return Err(ProofError::invalid("at least one text line is required"));
    }
    if let Some(index) = lines.iter().position(|line| line.as_ref().is_empty()) {
        return Err(ProofError::invalid(format!("text line {} is empty", index + 1)));
    }

    let inner_w = region.width() - 2.0 * config.padding;
    let inner_h = region.height() - 2.0 * config.padding;
    let widest = |size: f32| {
        lines
            .iter()
            .enumerate()
            .map(|(idx, line)| metrics.text_width(line.as_ref(), Weight::for_line(idx), size))
            .fold(0.0, f32::max)
    };

    let mut chosen = None;
    for size in (config.min_font_size..=config.start_font_size).rev() {
        let size = size as f32;
        let total_height = lines.len() as f32 * size * config.line_height_multiplier;
        if total_height <= inner_h && widest(size) <= inner_w {
            chosen = Some(size);
            break;
        }
    }
    let (font_size, fits) = match chosen {
        Some(size) => (size, true),
        None => (config.min_font_size as f32, false),
    };
    let line_height = font_size * config.line_height_multiplier;

    let first_baseline = region.y1 - config.padding - font_size;
    let instructions = lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let text = line.as_ref();
            let weight = Weight::for_line(idx);
            let width = metrics.text_width(text, weight, font_size);
            let x = match config.alignment {
                Alignment::Left => region.x0 + config.padding,
                Alignment::Center => region.x0 + (region.width() - width) / 2.0,
            };
            DrawInstruction {
                text: text.to_string(),
                weight,
                x,
                y: first_baseline - idx as f32 * line_height,
                width,
            }
        })
        .collect();

    Ok(LayoutResult {
        font_size,
        line_height,
        fits,
        instructions,
    })
}
