use anyhow::{Context, Result, anyhow};
use image::imageops;
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use tracing::debug;

use crate::proof::{POINTS_PER_INCH, RasterImage};

/// Renders one zero-based page at `zoom` times its point size with mutool or pdftoppm.
pub fn rasterize_page(pdf_bytes: &[u8], page_index: usize, zoom: f32) -> Result<RasterImage> {
    if !(zoom.is_finite() && zoom > 0.0) {
        return Err(anyhow!("zoom must be positive (got {})", zoom));
    }
    let dpi = ((POINTS_PER_INCH * zoom).round() as u32).max(1).to_string();
    let page_number = (page_index + 1).to_string();

    let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
    let input_path = dir.path().join("input.pdf");
    fs::write(&input_path, pdf_bytes).with_context(|| "failed to write temp pdf")?;
    let output_path = dir.path().join("page.png");

    if command_exists("mutool") {
        debug!(dpi = dpi.as_str(), page = page_number.as_str(), "rendering with mutool");
        let output = mutool_command(&input_path, &output_path, &dpi, &page_number)
            .output()
            .with_context(|| "failed to run mutool")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("mutool failed: {}", stderr.trim()));
        }
    } else if command_exists("pdftoppm") {
        debug!(dpi = dpi.as_str(), page = page_number.as_str(), "rendering with pdftoppm");
        let output = pdftoppm_command(&input_path, &dir.path().join("page"), &dpi, &page_number)
            .output()
            .with_context(|| "failed to run pdftoppm")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("pdftoppm failed: {}", stderr.trim()));
        }
    } else {
        return Err(anyhow!(
            "pdf rendering requires mutool or pdftoppm (install mupdf or poppler), or pass --raster"
        ));
    }

    let bytes = fs::read(&output_path).with_context(|| "failed to read rendered pdf page")?;
    decode_raster(&bytes)
}

// mutool draws the CropBox and applies /Rotate.
fn mutool_command(input: &Path, output: &Path, dpi: &str, page: &str) -> Command {
    let mut command = Command::new("mutool");
    command
        .arg("draw")
        .arg("-q")
        .arg("-c")
        .arg("rgb")
        .arg("-r")
        .arg(dpi)
        .arg("-o")
        .arg(output)
        .arg(input)
        .arg(page);
    command
}

// pdftoppm applies /Rotate but draws the MediaBox unless told to crop.
fn pdftoppm_command(input: &Path, prefix: &Path, dpi: &str, page: &str) -> Command {
    let mut command = Command::new("pdftoppm");
    command
        .arg("-png")
        .arg("-cropbox")
        .arg("-r")
        .arg(dpi)
        .arg("-f")
        .arg(page)
        .arg("-l")
        .arg(page)
        .arg("-singlefile")
        .arg(input)
        .arg(prefix);
    command
}

/// Turns a raster rendered with the page's `/Rotate` applied back into
/// unrotated page orientation, so it lines up with the page box axes.
pub fn upright_raster(raster: RasterImage, rotation: u16) -> RasterImage {
    match rotation {
        90 => imageops::rotate270(&raster),
        180 => imageops::rotate180(&raster),
        270 => imageops::rotate90(&raster),
        _ => raster,
    }
}

/// Decodes an already rendered page (PNG, JPEG, ...) into RGB.
pub fn decode_raster(bytes: &[u8]) -> Result<RasterImage> {
    let image = image::load_from_memory(bytes).with_context(|| "failed to decode page raster")?;
    Ok(image.to_rgb8())
}

pub(crate) fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }

    let path_var = match env::var_os("PATH") {
        Some(value) => value,
        None => return false,
    };

    #[cfg(windows)]
    let candidates = windows_command_candidates(cmd);
    #[cfg(not(windows))]
    let candidates = vec![cmd.to_string()];

    for dir in env::split_paths(&path_var) {
        for candidate in &candidates {
            if is_executable(&dir.join(candidate)) {
                return true;
            }
        }
    }
    false
}

fn is_executable(path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(value) => value,
        Err(_) => return false,
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(windows)]
fn windows_command_candidates(cmd: &str) -> Vec<String> {
    let path = Path::new(cmd);
    if path.extension().is_some() {
        return vec![cmd.to_string()];
    }
    let pathext = env::var_os("PATHEXT").unwrap_or_else(|| ".EXE;.CMD;.BAT;.COM".into());
    pathext
        .to_string_lossy()
        .split(';')
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("{}{}", cmd, ext.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn decodes_png_into_rgb() {
        let source = RgbaImage::from_pixel(4, 3, Rgba([200, 10, 20, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(source)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        let raster = decode_raster(&bytes).expect("decode");
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.get_pixel(0, 0).0, [200, 10, 20]);
    }

    #[test]
    fn rejects_non_image_bytes() {
        assert!(decode_raster(b"%PDF-1.5").is_err());
    }

    #[test]
    fn rejects_bad_zoom() {
        let err = rasterize_page(b"", 0, 0.0).expect_err("zero zoom");
        assert!(err.to_string().contains("zoom"));
    }

    fn args_of(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn pdftoppm_renders_the_crop_box() {
        let command = pdftoppm_command(Path::new("in.pdf"), Path::new("page"), "144", "2");
        let args = args_of(&command);
        assert!(args.iter().any(|arg| arg == "-cropbox"));
        assert_eq!(&args[args.len() - 2..], ["in.pdf", "page"]);
        let first = args.iter().position(|arg| arg == "-f").expect("-f");
        assert_eq!(args[first + 1], "2");
    }

    #[test]
    fn mutool_renders_requested_page() {
        let command = mutool_command(Path::new("in.pdf"), Path::new("page.png"), "144", "3");
        let args = args_of(&command);
        assert_eq!(&args[..2], ["draw", "-q"]);
        assert_eq!(&args[args.len() - 2..], ["in.pdf", "3"]);
    }

    #[test]
    fn rotated_renders_are_turned_upright() {
        let mut page = RasterImage::from_pixel(4, 3, image::Rgb([255, 255, 255]));
        page.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        page.put_pixel(3, 2, image::Rgb([0, 0, 255]));
        for (rotation, shown) in [
            (0, page.clone()),
            (90, imageops::rotate90(&page)),
            (180, imageops::rotate180(&page)),
            (270, imageops::rotate270(&page)),
        ] {
            assert_eq!(upright_raster(shown, rotation), page, "rotation {}", rotation);
        }
    }

    #[test]
    fn missing_commands_are_not_found() {
        assert!(!command_exists("definitely-not-a-real-command-4821"));
        assert!(!command_exists("/nonexistent/dir/tool"));
    }
}
