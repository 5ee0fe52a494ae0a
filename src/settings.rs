use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::proof::{Alignment, FitConfig, LocatorConfig};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub locator: LocatorConfig,
    pub fit: FitConfig,
    pub fonts: FontSettings,
    /// Oversampling factor used when rasterizing the template page.
    pub zoom: f32,
    pub output: OutputSettings,
}

/// Fallback chain per weight: font files are tried before system families.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontSettings {
    pub regular_paths: Vec<String>,
    pub bold_paths: Vec<String>,
    pub regular_families: Vec<String>,
    pub bold_families: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: Option<String>,
    pub text_color: String,
    pub border_color: String,
    pub debug_border: bool,
    pub preview: bool,
    pub overlay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locator: LocatorConfig::default(),
            fit: FitConfig::default(),
            fonts: FontSettings::default(),
            zoom: 2.0,
            output: OutputSettings {
                dir: None,
                text_color: "#000000".to_string(),
                border_color: "#ff0000".to_string(),
                debug_border: false,
                preview: true,
                overlay: false,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    marker: Option<MarkerSection>,
    layout: Option<LayoutSection>,
    font: Option<FontSection>,
    output: Option<OutputSection>,
}

#[derive(Debug, Default, Deserialize)]
struct MarkerSection {
    strict_min_red: Option<u8>,
    strict_margin: Option<u8>,
    relaxed_min_red: Option<u8>,
    relaxed_margin: Option<u8>,
    min_strict_pixels: Option<usize>,
    fallback_width: Option<f32>,
    fallback_height: Option<f32>,
    zoom: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSection {
    padding: Option<f32>,
    min_font_size: Option<u32>,
    start_font_size: Option<u32>,
    line_height: Option<f32>,
    alignment: Option<Alignment>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSection {
    regular_paths: Option<Vec<String>>,
    bold_paths: Option<Vec<String>>,
    regular_families: Option<Vec<String>>,
    bold_families: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSection {
    dir: Option<String>,
    text_color: Option<String>,
    border_color: Option<String>,
    debug_border: Option<bool>,
    preview: Option<bool>,
    overlay: Option<bool>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(marker) = incoming.marker {
            let locator = &mut self.locator;
            if let Some(value) = marker.strict_min_red {
                locator.strict.min_red = value;
            }
            if let Some(value) = marker.strict_margin {
                locator.strict.margin = value;
            }
            if let Some(value) = marker.relaxed_min_red {
                locator.relaxed.min_red = value;
            }
            if let Some(value) = marker.relaxed_margin {
                locator.relaxed.margin = value;
            }
            if let Some(value) = marker.min_strict_pixels {
                locator.min_strict_pixels = value;
            }
            if let Some(width) = marker.fallback_width {
                if width > 0.0 {
                    locator.fallback_size.0 = width;
                }
            }
            if let Some(height) = marker.fallback_height {
                if height > 0.0 {
                    locator.fallback_size.1 = height;
                }
            }
            if let Some(zoom) = marker.zoom {
                if zoom > 0.0 {
                    self.zoom = zoom;
                }
            }
        }
        if let Some(layout) = incoming.layout {
            if let Some(padding) = layout.padding {
                if padding >= 0.0 {
                    self.fit.padding = padding;
                }
            }
            if let Some(size) = layout.min_font_size {
                if size > 0 {
                    self.fit.min_font_size = size;
                }
            }
            if let Some(size) = layout.start_font_size {
                if size > 0 {
                    self.fit.start_font_size = size;
                }
            }
            if let Some(multiplier) = layout.line_height {
                if multiplier > 0.0 {
                    self.fit.line_height_multiplier = multiplier;
                }
            }
            if let Some(alignment) = layout.alignment {
                self.fit.alignment = alignment;
            }
        }
        if let Some(font) = incoming.font {
            if let Some(paths) = font.regular_paths {
                self.fonts.regular_paths = non_blank(paths);
            }
            if let Some(paths) = font.bold_paths {
                self.fonts.bold_paths = non_blank(paths);
            }
            if let Some(families) = font.regular_families {
                self.fonts.regular_families = non_blank(families);
            }
            if let Some(families) = font.bold_families {
                self.fonts.bold_families = non_blank(families);
            }
        }
        if let Some(output) = incoming.output {
            if let Some(dir) = output.dir {
                if !dir.trim().is_empty() {
                    self.output.dir = Some(dir);
                }
            }
            if let Some(color) = output.text_color {
                if !color.trim().is_empty() {
                    self.output.text_color = color;
                }
            }
            if let Some(color) = output.border_color {
                if !color.trim().is_empty() {
                    self.output.border_color = color;
                }
            }
            if let Some(flag) = output.debug_border {
                self.output.debug_border = flag;
            }
            if let Some(flag) = output.preview {
                self.output.preview = flag;
            }
            if let Some(flag) = output.overlay {
                self.output.overlay = flag;
            }
        }
    }
}

fn non_blank(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter(|value| !value.trim().is_empty())
        .collect()
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".pdf-proof-rust"))
        }
    })
}
