use crate::error::{Error, Result};
use crate::render::RenderConfig;
use resvg::usvg;
use std::path::Path;
use tiny_skia::{Pixmap, Transform};

/// Output kinds, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
    Pdf,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::UnsupportedFormat(format!("{} has no extension", path.display())))?
            .to_ascii_lowercase();
        match ext.as_str() {
            "svg" => Ok(OutputFormat::Svg),
            "png" => Ok(OutputFormat::Png),
            "pdf" => Ok(OutputFormat::Pdf),
            _ => Err(Error::UnsupportedFormat(format!(
                ".{ext} (use .svg, .png or .pdf)"
            ))),
        }
    }
}

/// How a rendered map is turned into file bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Raster pixels per plot pixel.
    pub png_scale: f32,
    /// Plot pixels per inch; a 1600 px wide map at 100 dpi is a 16 inch page.
    pub dpi: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            png_scale: 1.0,
            dpi: 100.0,
        }
    }
}

impl ExportOptions {
    pub fn for_map(render: &RenderConfig, png_scale: f32) -> Self {
        Self {
            png_scale,
            dpi: render.dpi,
        }
    }
}

/// Writes `svg` to `path`, converting according to the extension.
pub fn export(svg: &str, path: &Path, options: &ExportOptions) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    let bytes = match format {
        OutputFormat::Svg => svg.as_bytes().to_vec(),
        OutputFormat::Png => svg_to_png(svg, options.png_scale)?,
        OutputFormat::Pdf => svg_to_pdf(svg, options.dpi)?,
    };
    std::fs::write(path, &bytes).map_err(|e| Error::io(path, e))?;
    tracing::info!(path = %path.display(), ?format, bytes = bytes.len(), "map saved");
    Ok(())
}

pub fn svg_to_png(svg: &str, scale: f32) -> Result<Vec<u8>> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::Render(format!("invalid PNG scale {scale}")));
    }

    let opts = usvg::Options {
        fontdb: std::sync::Arc::new(map_fonts()),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| Error::Render(format!("failed to parse SVG: {e}")))?;

    let width = (tree.size().width() * scale).ceil() as u32;
    let height = (tree.size().height() * scale).ceil() as u32;
    tracing::debug!(width, height, "rasterizing map");

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| Error::Render(format!("cannot allocate a {width}x{height} pixmap")))?;
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| Error::Render(format!("failed to encode PNG: {e}")))
}

/// Converts the map to a single-page PDF whose size follows `dpi`.
pub fn svg_to_pdf(svg: &str, dpi: f32) -> Result<Vec<u8>> {
    if !dpi.is_finite() || dpi <= 0.0 {
        return Err(Error::Render(format!("invalid PDF dpi {dpi}")));
    }

    let opts = svg2pdf::usvg::Options {
        fontdb: std::sync::Arc::new(map_fonts_svg2pdf()),
        ..Default::default()
    };
    let tree = svg2pdf::usvg::Tree::from_str(svg, &opts)
        .map_err(|e| Error::Render(format!("failed to parse SVG: {e}")))?;

    // Text as paths, so labels survive viewers without the font.
    let options = svg2pdf::ConversionOptions {
        embed_text: false,
        ..Default::default()
    };

    svg2pdf::to_pdf(&tree, options, svg2pdf::PageOptions { dpi })
        .map_err(|e| Error::Render(format!("failed to convert SVG to PDF: {e}")))
}

// resvg and svg2pdf may pin different usvg releases, so the fontdb types differ.
macro_rules! map_fonts {
    ($name:ident, $db:ty) => {
        /// System fonts plus `./fonts`, with a sans family standing in for
        /// the generic names labels fall back to.
        fn $name() -> $db {
            let mut fontdb = <$db>::new();
            fontdb.load_system_fonts();

            let local_fonts = Path::new("fonts");
            if local_fonts.is_dir() {
                fontdb.load_fonts_dir(local_fonts);
            }

            let mut sans_family: Option<String> = None;
            let mut first_family: Option<String> = None;
            for face in fontdb.faces() {
                for (family, _) in &face.families {
                    if first_family.is_none() {
                        first_family = Some(family.clone());
                    }
                    if sans_family.is_none() && family.to_ascii_lowercase().contains("sans") {
                        sans_family = Some(family.clone());
                    }
                }
            }

            match sans_family.or(first_family) {
                Some(family) => {
                    fontdb.set_sans_serif_family(family.as_str());
                    fontdb.set_serif_family(family.as_str());
                }
                None => tracing::warn!("no fonts found; map labels will not be drawn"),
            }
            fontdb
        }
    };
}

map_fonts!(map_fonts, usvg::fontdb::Database);
map_fonts!(map_fonts_svg2pdf, svg2pdf::usvg::fontdb::Database);
