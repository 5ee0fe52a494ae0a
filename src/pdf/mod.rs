mod document;
mod merge;
mod overlay;
mod raster;

pub use document::{page_count, page_geometry};
pub use merge::merge_overlay;
pub use overlay::{OverlayStyle, parse_hex_color, render_overlay};
pub use raster::{decode_raster, rasterize_page, upright_raster};
