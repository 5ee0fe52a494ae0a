use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::pdf::OverlayStyle;
use crate::proof::{
    FontSource, LayoutResult, MarkerRegion, PageGeometry, RasterImage, ResolvedFonts, Weight,
};

const BASE_FONT_FAMILIES: &str = "Helvetica, Arial, sans-serif";

/// Draws the laid-out text over the rendered page so the proof can be
/// eyeballed without a PDF viewer.
pub fn render_preview(
    raster: &RasterImage,
    geometry: PageGeometry,
    region: &MarkerRegion,
    layout: &LayoutResult,
    fonts: &ResolvedFonts,
    style: &OverlayStyle,
) -> Result<Vec<u8>> {
    let svg = build_preview_svg(raster, geometry, region, layout, fonts, style)?;
    let font_data: Vec<&[u8]> = [&fonts.regular, &fonts.bold]
        .into_iter()
        .filter_map(|source| match source {
            FontSource::Embedded { metrics, .. } => Some(metrics.data()),
            FontSource::Builtin(_) => None,
        })
        .collect();
    render_svg_bytes(&svg, &font_data)
}

pub(crate) fn build_preview_svg(
    raster: &RasterImage,
    geometry: PageGeometry,
    region: &MarkerRegion,
    layout: &LayoutResult,
    fonts: &ResolvedFonts,
    style: &OverlayStyle,
) -> Result<String> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("page raster is empty"));
    }
    let scale_x = width as f32 / geometry.width;
    let scale_y = height as f32 / geometry.height;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(raster.clone())
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .with_context(|| "failed to encode page raster")?;
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&png));

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    if let Some(color) = style.border_color {
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{color}" stroke-width="2"/>"#,
            x = region.x0 * scale_x,
            y = (geometry.height - region.y1) * scale_y,
            w = region.width() * scale_x,
            h = region.height() * scale_y,
            color = css_color(color)
        ));
    }

    let fill = css_color(style.text_color);
    for instruction in &layout.instructions {
        let family = match fonts.face(instruction.weight) {
            FontSource::Embedded { metrics, .. } => metrics
                .family()
                .map(escape_xml)
                .unwrap_or_else(|| BASE_FONT_FAMILIES.to_string()),
            FontSource::Builtin(_) => BASE_FONT_FAMILIES.to_string(),
        };
        let weight = match instruction.weight {
            Weight::Bold => "bold",
            Weight::Regular => "normal",
        };
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" font-weight="{weight}" fill="{fill}" xml:space="preserve">{text}</text>"#,
            x = instruction.x * scale_x,
            y = (geometry.height - instruction.y) * scale_y,
            size = layout.font_size * scale_y,
            family = family,
            weight = weight,
            fill = fill,
            text = escape_xml(&instruction.text)
        ));
    }

    svg.push_str("</svg>");
    Ok(svg)
}

pub(crate) fn render_svg_bytes(svg: &str, font_data: &[&[u8]]) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for data in font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode preview png")?;
    Ok(bytes)
}

fn css_color([r, g, b]: [f32; 3]) -> String {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("rgb({},{},{})", channel(r), channel(g), channel(b))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::{FitConfig, fit};
    use image::Rgb;

    fn white_page() -> RasterImage {
        RasterImage::from_pixel(200, 200, Rgb([255, 255, 255]))
    }

    fn layout_for(region: &MarkerRegion, lines: &[&str]) -> LayoutResult {
        fit(region, lines, &ResolvedFonts::builtin(), &FitConfig::default()).expect("fit")
    }

    #[test]
    fn text_is_placed_in_pixel_space() {
        let geometry = PageGeometry::new(100.0, 100.0);
        let region = MarkerRegion::new(10.0, 10.0, 90.0, 90.0, true);
        let layout = layout_for(&region, &["Fish & Chips", "<b>"]);
        let svg = build_preview_svg(
            &white_page(),
            geometry,
            &region,
            &layout,
            &ResolvedFonts::builtin(),
            &OverlayStyle::default(),
        )
        .expect("svg");

        assert!(svg.contains("Fish &amp; Chips"));
        assert!(svg.contains("&lt;b&gt;"));
        assert!(svg.contains(r#"font-weight="bold""#));
        assert!(svg.contains(r#"font-weight="normal""#));
        assert!(!svg.contains("<rect"));
        let first = &layout.instructions[0];
        let expected_y = (100.0 - first.y) * 2.0;
        assert!(svg.contains(&format!(r#"y="{}""#, expected_y)));
    }

    #[test]
    fn border_is_drawn_around_region() {
        let geometry = PageGeometry::new(100.0, 100.0);
        let region = MarkerRegion::new(10.0, 10.0, 90.0, 60.0, true);
        let layout = layout_for(&region, &["Proof"]);
        let style = OverlayStyle {
            border_color: Some([1.0, 0.0, 0.0]),
            ..OverlayStyle::default()
        };
        let svg = build_preview_svg(
            &white_page(),
            geometry,
            &region,
            &layout,
            &ResolvedFonts::builtin(),
            &style,
        )
        .expect("svg");
        assert!(svg.contains(
            r#"<rect x="20" y="80" width="160" height="100" fill="none" stroke="rgb(255,0,0)""#
        ));
    }

    #[test]
    fn rendered_preview_keeps_raster_size() {
        let geometry = PageGeometry::new(100.0, 100.0);
        let region = MarkerRegion::new(10.0, 10.0, 90.0, 90.0, true);
        let layout = layout_for(&region, &["Proof"]);
        let style = OverlayStyle {
            border_color: Some([1.0, 0.0, 0.0]),
            ..OverlayStyle::default()
        };
        let png = render_preview(
            &white_page(),
            geometry,
            &region,
            &layout,
            &ResolvedFonts::builtin(),
            &style,
        )
        .expect("preview");
        let decoded = image::load_from_memory(&png).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (200, 200));
        let border = decoded.get_pixel(20, 100).0;
        assert!(border[0] > 200 && border[1] < 80, "{:?}", border);
        assert_eq!(decoded.get_pixel(5, 5).0, [255, 255, 255]);
    }

    #[test]
    fn empty_raster_is_rejected() {
        let raster = RasterImage::new(0, 0);
        let region = MarkerRegion::new(10.0, 10.0, 90.0, 90.0, true);
        let layout = layout_for(&region, &["Proof"]);
        let err = build_preview_svg(
            &raster,
            PageGeometry::new(100.0, 100.0),
            &region,
            &layout,
            &ResolvedFonts::builtin(),
            &OverlayStyle::default(),
        )
        .expect_err("empty raster");
        assert!(err.to_string().contains("empty"));
    }
}
