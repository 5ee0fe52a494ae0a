use image::RgbImage;
use tracing::debug;

use super::{MarkerRegion, POINTS_PER_INCH, PageGeometry};
use crate::error::{ProofError, ProofResult};

/// Page raster handed to the locator; row 0 is the top of the page.
pub type RasterImage = RgbImage;

/// Red-dominance test: `r > min_red && r > g + margin && r > b + margin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerThresholds {
    pub min_red: u8,
    pub margin: u8,
}

impl MarkerThresholds {
    pub const STRICT: Self = Self {
        min_red: 150,
        margin: 60,
    };
    pub const RELAXED: Self = Self {
        min_red: 120,
        margin: 40,
    };

    fn matches(&self, [r, g, b]: [u8; 3]) -> bool {
        let (r, g, b) = (r as i16, g as i16, b as i16);
        let margin = self.margin as i16;
        r > self.min_red as i16 && r > g + margin && r > b + margin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatorConfig {
    pub strict: MarkerThresholds,
    pub relaxed: MarkerThresholds,
    /// Below this many strict matches the relaxed mask is used instead.
    pub min_strict_pixels: usize,
    /// Width and height in points of the centered region used when no marker is found.
    pub fallback_size: (f32, f32),
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            strict: MarkerThresholds::STRICT,
            relaxed: MarkerThresholds::RELAXED,
            min_strict_pixels: 50,
            fallback_size: (4.0 * POINTS_PER_INCH, 2.0 * POINTS_PER_INCH),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PixelBounds {
    count: usize,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl PixelBounds {
    fn empty() -> Self {
        Self {
            count: 0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.count += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Finds the marker rectangle on a rendered page and maps it to page points.
///
/// Never fails for a missing marker: the result then carries `detected = false`
/// and a fixed-size region centered on the page.
pub fn locate(
    image: &RasterImage,
    geometry: PageGeometry,
    config: &LocatorConfig,
) -> ProofResult<MarkerRegion> {
    geometry.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ProofError::invalid("raster image is empty"));
    }

    let mut strict = PixelBounds::empty();
    let mut relaxed = PixelBounds::empty();
    for (x, y, pixel) in image.enumerate_pixels() {
        if config.strict.matches(pixel.0) {
            strict.include(x, y);
        }
        if config.relaxed.matches(pixel.0) {
            relaxed.include(x, y);
        }
    }
    debug!(
        strict = strict.count,
        relaxed = relaxed.count,
        "marker pixel scan finished"
    );

    let bounds = if strict.count >= config.min_strict_pixels {
        strict
    } else {
        relaxed
    };
    if bounds.count == 0 {
        debug!("no marker pixels found, using fallback region");
        return fallback_region(geometry, config.fallback_size);
    }

    let scale_x = geometry.width / width as f32;
    let scale_y = geometry.height / height as f32;
    let x0 = bounds.min_x as f32 * scale_x;
    let x1 = bounds.max_x as f32 * scale_x;
    let y0 = geometry.height - bounds.max_y as f32 * scale_y;
    let y1 = geometry.height - bounds.min_y as f32 * scale_y;

    if x1 <= x0 || y1 <= y0 {
        debug!(
            min_x = bounds.min_x,
            max_x = bounds.max_x,
            min_y = bounds.min_y,
            max_y = bounds.max_y,
            "marker pixels span a single row or column, using fallback region"
        );
        return fallback_region(geometry, config.fallback_size);
    }

    Ok(MarkerRegion::new(x0, y0, x1, y1, true))
}

fn fallback_region(geometry: PageGeometry, size: (f32, f32)) -> ProofResult<MarkerRegion> {
    let (box_w, box_h) = size;
    if !(box_w.is_finite() && box_h.is_finite()) || box_w <= 0.0 || box_h <= 0.0 {
        return Err(ProofError::invalid(format!(
            "fallback size must be positive (got {}x{})",
            box_w, box_h
        )));
    }
    let box_w = box_w.min(geometry.width);
    let box_h = box_h.min(geometry.height);
    let x0 = (geometry.width - box_w) / 2.0;
    let y0 = (geometry.height - box_h) / 2.0;
    Ok(MarkerRegion::new(x0, y0, x0 + box_w, y0 + box_h, false))
}
