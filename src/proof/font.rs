use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::{BuiltinFont, Weight};
use crate::settings::FontSettings;

/// Width of `text` in points when set at `size` with the given weight.
pub trait FontMetric: Send + Sync {
    fn text_width(&self, text: &str, weight: Weight, size: f32) -> f32;
}

impl<F> FontMetric for F
where
    F: Fn(&str, Weight, f32) -> f32 + Send + Sync,
{
    fn text_width(&self, text: &str, weight: Weight, size: f32) -> f32 {
        self(text, weight, size)
    }
}

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
    face_index: u32,
}

impl fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return BuiltinFont::Helvetica.text_width(text, size);
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        let units = self.units_per_em.max(1) as f32;
        advance as f32 * (size / units)
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(data, 0)
        .with_context(|| format!("failed to parse font: {}", path.display()))
}

fn load_font_metrics_from_data(data: Vec<u8>, face_index: u32) -> Result<FontMetrics> {
    if ttf_parser::fonts_in_collection(&data).is_some() {
        return Err(anyhow!("font collections cannot be embedded"));
    }
    let face = Face::parse(&data, face_index).map_err(|err| anyhow!("{}", err))?;
    let family = extract_family_name(&face);
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    Ok(FontMetrics {
        data: Arc::new(data),
        units_per_em,
        space_advance,
        family,
        face_index,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

/// Where the face for one weight came from.
#[derive(Debug, Clone)]
pub enum FontSource {
    Embedded { metrics: FontMetrics, origin: String },
    Builtin(BuiltinFont),
}

impl FontSource {
    pub fn name(&self) -> String {
        match self {
            FontSource::Embedded { metrics, origin } => metrics
                .family()
                .map(|family| family.to_string())
                .unwrap_or_else(|| origin.clone()),
            FontSource::Builtin(font) => font.name().to_string(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, FontSource::Builtin(_))
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        match self {
            FontSource::Embedded { metrics, .. } => metrics.text_width(text, size),
            FontSource::Builtin(font) => font.text_width(text, size),
        }
    }
}

/// Regular and bold faces used for one proof.
#[derive(Debug, Clone)]
pub struct ResolvedFonts {
    pub regular: FontSource,
    pub bold: FontSource,
}

impl ResolvedFonts {
    pub fn builtin() -> Self {
        Self {
            regular: FontSource::Builtin(BuiltinFont::Helvetica),
            bold: FontSource::Builtin(BuiltinFont::HelveticaBold),
        }
    }

    pub fn face(&self, weight: Weight) -> &FontSource {
        match weight {
            Weight::Bold => &self.bold,
            Weight::Regular => &self.regular,
        }
    }

    /// Human readable notes for every weight that fell back to a base font.
    pub fn fallback_notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        for (label, source) in [("regular", &self.regular), ("bold", &self.bold)] {
            if let FontSource::Builtin(font) = source {
                notes.push(format!(
                    "no configured {} font was found; {} fallback used",
                    label,
                    font.name()
                ));
            }
        }
        notes
    }
}

impl FontMetric for ResolvedFonts {
    fn text_width(&self, text: &str, weight: Weight, size: f32) -> f32 {
        self.face(weight).text_width(text, size)
    }
}

/// Walks the configured fallback chain for each weight: font files first, then
/// system families, then the Helvetica base fonts.
pub fn resolve_fonts(settings: &FontSettings) -> ResolvedFonts {
    let mut db = None;
    let regular = resolve_face(
        Weight::Regular,
        &settings.regular_paths,
        &settings.regular_families,
        &mut db,
    );
    let bold = resolve_face(
        Weight::Bold,
        &settings.bold_paths,
        &settings.bold_families,
        &mut db,
    );
    ResolvedFonts { regular, bold }
}

fn resolve_face(
    weight: Weight,
    paths: &[String],
    families: &[String],
    db: &mut Option<fontdb::Database>,
) -> FontSource {
    for path in paths {
        let path = Path::new(path);
        if !path.exists() {
            continue;
        }
        match load_font_metrics(path) {
            Ok(metrics) => {
                debug!(?weight, path = %path.display(), "using font file");
                return FontSource::Embedded {
                    metrics,
                    origin: path.display().to_string(),
                };
            }
            Err(err) => warn!(path = %path.display(), "skipping font: {:#}", err),
        }
    }

    if !families.is_empty() {
        let db = db.get_or_insert_with(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            db
        });
        for family in families {
            match load_system_face(db, family, weight) {
                Ok(metrics) => {
                    debug!(?weight, family = family.as_str(), "using system font");
                    return FontSource::Embedded {
                        metrics,
                        origin: family.clone(),
                    };
                }
                Err(err) => debug!(family = family.as_str(), "system font unavailable: {:#}", err),
            }
        }
    }

    let builtin = BuiltinFont::for_weight(weight);
    debug!(?weight, font = builtin.name(), "falling back to base font");
    FontSource::Builtin(builtin)
}

fn load_system_face(db: &fontdb::Database, family: &str, weight: Weight) -> Result<FontMetrics> {
    let wanted = match weight {
        Weight::Bold => fontdb::Weight::BOLD,
        Weight::Regular => fontdb::Weight::NORMAL,
    };
    let families = [fontdb::Family::Name(family)];
    let query = fontdb::Query {
        families: &families,
        weight: wanted,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let matched = db
        .face(id)
        .map(|info| info.weight.0)
        .ok_or_else(|| anyhow!("font face vanished: {}", family))?;
    // fontdb returns the closest weight; a regular face is not a bold one.
    if (matched >= 600) != (weight == Weight::Bold) {
        return Err(anyhow!("no {:?} face for {}", weight, family));
    }
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(data, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_chain_falls_back_to_helvetica() {
        let fonts = resolve_fonts(&FontSettings::default());
        assert!(fonts.regular.is_builtin());
        assert!(fonts.bold.is_builtin());
        assert_eq!(fonts.regular.name(), "Helvetica");
        assert_eq!(fonts.bold.name(), "Helvetica-Bold");
        assert_eq!(fonts.fallback_notes().len(), 2);
    }

    #[test]
    fn unreadable_font_files_are_skipped() {
        let dir = tempdir().expect("tempdir");
        let broken = dir.path().join("broken.ttf");
        std::fs::write(&broken, b"not a font").expect("write font");
        let settings = FontSettings {
            regular_paths: vec![
                dir.path().join("missing.ttf").display().to_string(),
                broken.display().to_string(),
            ],
            ..FontSettings::default()
        };
        let fonts = resolve_fonts(&settings);
        assert!(fonts.regular.is_builtin());
    }

    #[test]
    fn load_font_metrics_reports_bad_data() {
        let dir = tempdir().expect("tempdir");
        let broken = dir.path().join("broken.ttf");
        std::fs::write(&broken, b"garbage").expect("write font");
        let err = load_font_metrics(&broken).expect_err("garbage font");
        assert!(err.to_string().contains("failed to parse font"));
    }

    #[test]
    fn resolved_fonts_measure_by_weight() {
        let fonts = ResolvedFonts::builtin();
        let regular = fonts.text_width("Proof", Weight::Regular, 12.0);
        let bold = fonts.text_width("Proof", Weight::Bold, 12.0);
        assert_eq!(regular, BuiltinFont::Helvetica.text_width("Proof", 12.0));
        assert_eq!(bold, BuiltinFont::HelveticaBold.text_width("Proof", 12.0));
    }
}
