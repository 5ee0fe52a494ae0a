mod builtin;
mod fit;
mod font;
mod locate;

use serde::{Deserialize, Serialize};

use crate::error::{ProofError, ProofResult};

pub use builtin::BuiltinFont;
pub use fit::{DrawInstruction, FitConfig, LayoutResult, fit};
pub use font::{
    FontMetric, FontMetrics, FontSource, ResolvedFonts, load_font_metrics, resolve_fonts,
};
pub use locate::{LocatorConfig, MarkerThresholds, RasterImage, locate};

pub const POINTS_PER_INCH: f32 = 72.0;

/// Unrotated page size in points, plus the lower-left corner of the visible
/// page box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    /// Clockwise display rotation (`/Rotate`), one of 0, 90, 180 or 270.
    pub rotation: u16,
}

impl PageGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            origin_x: 0.0,
            origin_y: 0.0,
            rotation: 0,
        }
    }

    pub fn with_origin(mut self, origin_x: f32, origin_y: f32) -> Self {
        self.origin_x = origin_x;
        self.origin_y = origin_y;
        self
    }

    pub fn with_rotation(mut self, rotation: u16) -> Self {
        self.rotation = rotation;
        self
    }

    /// Width over height of the page as it is displayed, rotation applied.
    pub fn displayed_aspect(&self) -> f32 {
        if self.rotation % 180 == 90 {
            self.height / self.width
        } else {
            self.width / self.height
        }
    }

    pub(crate) fn validate(&self) -> ProofResult<()> {
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(ProofError::invalid(format!(
                "page dimensions must be positive (got {}x{})",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Rectangle in page points (origin bottom-left) where the text block goes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerRegion {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub detected: bool,
}

impl MarkerRegion {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32, detected: bool) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            detected,
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub(crate) fn validate(&self) -> ProofResult<()> {
        let finite = [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|value| value.is_finite());
        if !finite || self.x1 <= self.x0 || self.y1 <= self.y0 {
            return Err(ProofError::invalid(format!(
                "region ({}, {})-({}, {}) has no area",
                self.x0, self.y0, self.x1, self.y1
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    Bold,
    Regular,
}

impl Weight {
    /// The first line of a block is set bold, the rest regular.
    pub fn for_line(index: usize) -> Self {
        if index == 0 {
            Weight::Bold
        } else {
            Weight::Regular
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
}

impl std::str::FromStr for Alignment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" | "centre" => Ok(Alignment::Center),
            other => Err(format!("unknown alignment '{}' (expected left or center)", other)),
        }
    }
}
