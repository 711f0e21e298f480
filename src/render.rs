use base64::Engine as _;
use crate::error::{Error, Result};
use crate::placement::{DrawDirective, MarkerGlyph};
use crate::record::GeoPoint;
use crate::xml::escape_xml;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

const MARKER_OPACITY: f32 = 0.8;
const TICK_LENGTH: f64 = 5.0;
const SCALE_HEAD_LENGTH: f64 = 10.0;
const SCALE_HEAD_HALF_WIDTH: f64 = 4.0;

/// WGS84 extent `[min_lon, min_lat, max_lon, max_lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        let values = [min_lon, min_lat, max_lon, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config("bounding box must be finite".to_string()));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(Error::Config(format!(
                "bounding box [{min_lon}, {min_lat}, {max_lon}, {max_lat}] is empty or inverted"
            )));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Smallest box holding every point, grown by `margin` degrees.
    pub fn around(points: impl IntoIterator<Item = GeoPoint>, margin: f64) -> Result<Self> {
        let mut bounds: Option<[f64; 4]> = None;
        for p in points {
            let b = bounds.get_or_insert([p.lon, p.lat, p.lon, p.lat]);
            b[0] = b[0].min(p.lon);
            b[1] = b[1].min(p.lat);
            b[2] = b[2].max(p.lon);
            b[3] = b[3].max(p.lat);
        }
        let [min_lon, min_lat, max_lon, max_lat] =
            bounds.ok_or_else(|| Error::Config("no points to derive a bounding box from".to_string()))?;
        Self::new(
            min_lon - margin,
            min_lat - margin,
            max_lon + margin,
            max_lat + margin,
        )
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        (self.min_lon..=self.max_lon).contains(&p.lon) && (self.min_lat..=self.max_lat).contains(&p.lat)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = Error;

    fn try_from(v: [f64; 4]) -> Result<Self> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_lon, b.min_lat, b.max_lon, b.max_lat]
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("bounding box '{s}': {e}")))?;
        let values: [f64; 4] = values.try_into().map_err(|_| {
            Error::Config(format!(
                "bounding box '{s}' needs MINLON,MINLAT,MAXLON,MAXLAT"
            ))
        })?;
        Self::try_from(values)
    }
}

/// Double-headed distance arrow with a caption, in map coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleBar {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub label: String,
    pub label_at: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Plot width in pixels; the height follows the bounding box aspect.
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_marker_size")]
    pub marker_size: f64,
    #[serde(default = "default_grid")]
    pub grid: bool,
    /// Grid and tick spacing in degrees.
    #[serde(default = "default_grid_spacing")]
    pub grid_spacing: f64,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_frame_color")]
    pub frame_color: String,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub scale_bar: Option<ScaleBar>,
    /// Plot pixels per inch, which sets the PDF page size.
    #[serde(default = "default_dpi")]
    pub dpi: f32,
}

fn default_width() -> f64 {
    1600.0
}
fn default_padding() -> f64 {
    60.0
}
fn default_font_family() -> String {
    "sans-serif".to_string()
}
fn default_font_size() -> f64 {
    14.0
}
fn default_marker_size() -> f64 {
    8.0
}
fn default_grid() -> bool {
    true
}
fn default_grid_spacing() -> f64 {
    0.05
}
fn default_background() -> String {
    "#ffffff".to_string()
}
fn default_frame_color() -> String {
    "#333333".to_string()
}
fn default_dpi() -> f32 {
    100.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            padding: default_padding(),
            font_family: default_font_family(),
            font_size: default_font_size(),
            marker_size: default_marker_size(),
            grid: default_grid(),
            grid_spacing: default_grid_spacing(),
            background: default_background(),
            frame_color: default_frame_color(),
            x_label: None,
            scale_bar: None,
            dpi: default_dpi(),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("width", self.width),
            ("font_size", self.font_size),
            ("marker_size", self.marker_size),
            ("grid_spacing", self.grid_spacing),
            ("dpi", f64::from(self.dpi)),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("render.{field} must be positive, got {value}")));
            }
        }
        if !self.padding.is_finite() || self.padding < 0.0 {
            return Err(Error::Config(format!(
                "render.padding must not be negative, got {}",
                self.padding
            )));
        }
        Ok(())
    }
}

/// Raster bytes ready to embed, with their pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct Basemap {
    pub mime: &'static str,
    pub width: usize,
    pub height: usize,
    data: Vec<u8>,
}

impl Basemap {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mime = match imagesize::image_type(&data) {
            Ok(imagesize::ImageType::Png) => "image/png",
            Ok(imagesize::ImageType::Jpeg) => "image/jpeg",
            Ok(imagesize::ImageType::Gif) => "image/gif",
            Ok(imagesize::ImageType::Webp) => "image/webp",
            Ok(other) => {
                return Err(Error::UnsupportedFormat(format!(
                    "basemap image type {other:?} (use PNG, JPEG, GIF or WebP)"
                )));
            }
            Err(e) => return Err(Error::UnsupportedFormat(format!("basemap: {e}"))),
        };
        let size = imagesize::blob_size(&data)
            .map_err(|e| Error::UnsupportedFormat(format!("basemap: {e}")))?;
        Ok(Self {
            mime,
            width: size.width,
            height: size.height,
            data,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let basemap = Self::from_bytes(data)?;
        tracing::info!(
            path = %path.display(),
            width = basemap.width,
            height = basemap.height,
            "basemap loaded"
        );
        Ok(basemap)
    }

    fn data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime, encoded)
    }
}

/// What the directives are drawn over.
#[derive(Debug, Clone)]
pub struct MapFrame {
    pub bbox: BoundingBox,
    pub basemap: Option<Basemap>,
    pub title: Option<String>,
}

/// Linear lon/lat -> pixel mapping over the plot area.
struct Projection {
    bbox: BoundingBox,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Projection {
    fn x(&self, lon: f64) -> f64 {
        self.left + (lon - self.bbox.min_lon) / self.bbox.lon_span() * self.width
    }

    fn y(&self, lat: f64) -> f64 {
        self.top + (self.bbox.max_lat - lat) / self.bbox.lat_span() * self.height
    }

    fn point(&self, p: GeoPoint) -> (f64, f64) {
        (self.x(p.lon), self.y(p.lat))
    }
}

const MAX_TICKS: f64 = 1000.0;

/// Multiples of `spacing` inside `[min, max]`; empty when there would be
/// more than [`MAX_TICKS`] of them.
fn ticks(min: f64, max: f64, spacing: f64) -> Vec<f64> {
    let first = (min / spacing - 1e-9).ceil();
    let last = (max / spacing + 1e-9).floor();
    // Also catches NaN from a degenerate spacing.
    if !(last >= first && last - first <= MAX_TICKS) {
        return Vec::new();
    }
    let (first, last) = (first as i64, last as i64);
    (first..=last).map(|k| k as f64 * spacing).collect()
}

fn tick_decimals(spacing: f64) -> usize {
    (-spacing.log10()).ceil().max(0.0) as usize
}

fn triangle(x: f64, y: f64, size: f64, glyph: MarkerGlyph) -> String {
    let dir = match glyph {
        MarkerGlyph::Up => 1.0,
        MarkerGlyph::Down => -1.0,
    };
    let tip = y - dir * size;
    let base = y + dir * size * 0.6;
    format!(
        "{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}",
        x,
        tip,
        x - size * 0.8,
        base,
        x + size * 0.8,
        base
    )
}

fn arrow_head(tip: (f64, f64), tail: (f64, f64)) -> String {
    let (dx, dy) = (tip.0 - tail.0, tip.1 - tail.1);
    let len = (dx * dx + dy * dy).sqrt().max(f64::EPSILON);
    let (ux, uy) = (dx / len, dy / len);
    let (bx, by) = (tip.0 - ux * SCALE_HEAD_LENGTH, tip.1 - uy * SCALE_HEAD_LENGTH);
    format!(
        "{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}",
        tip.0,
        tip.1,
        bx - uy * SCALE_HEAD_HALF_WIDTH,
        by + ux * SCALE_HEAD_HALF_WIDTH,
        bx + uy * SCALE_HEAD_HALF_WIDTH,
        by - ux * SCALE_HEAD_HALF_WIDTH
    )
}

/// Renders directives over the frame into a standalone SVG document.
///
/// Markers are drawn first, then labels, both in directive order; the
/// plot keeps one degree of longitude as wide as one degree of latitude.
pub fn render_map(directives: &[DrawDirective], frame: &MapFrame, config: &RenderConfig) -> Result<String> {
    config.validate()?;

    let bbox = frame.bbox;
    let pad = config.padding;
    let title_space = if frame.title.is_some() { config.font_size * 2.5 } else { 0.0 };
    let label_space = config.font_size * 1.6;
    let plot_w = config.width;
    let plot_h = plot_w * bbox.lat_span() / bbox.lon_span();
    let proj = Projection {
        bbox,
        left: pad + label_space * 2.5,
        top: pad + title_space,
        width: plot_w,
        height: plot_h,
    };
    let total_w = proj.left + plot_w + pad;
    let x_label_space = if config.x_label.is_some() { config.font_size * 2.0 } else { 0.0 };
    let total_h = proj.top + plot_h + label_space * 1.5 + x_label_space + pad;

    let outside = directives
        .iter()
        .filter(|d| !bbox.contains(d.marker_anchor))
        .count();
    if outside > 0 {
        tracing::warn!(outside, "points fall outside the bounding box");
    }

    let mut svg = String::new();
    let font = escape_xml(&config.font_family);
    let tick_size = config.font_size * 0.8;

    if let Some(basemap) = &frame.basemap {
        let image_aspect = basemap.width as f64 / basemap.height.max(1) as f64;
        let plot_aspect = plot_w / plot_h;
        if (image_aspect / plot_aspect - 1.0).abs() > 0.05 {
            tracing::warn!(
                image_aspect,
                plot_aspect,
                "basemap is stretched to fit the bounding box"
            );
        }
        let _ = write!(
            svg,
            r#"<image x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" preserveAspectRatio="none" xlink:href="{}" />"#,
            proj.left,
            proj.top,
            plot_w,
            plot_h,
            basemap.data_uri(),
        );
    }

    let decimals = tick_decimals(config.grid_spacing);
    let lon_ticks = ticks(bbox.min_lon, bbox.max_lon, config.grid_spacing);
    let lat_ticks = ticks(bbox.min_lat, bbox.max_lat, config.grid_spacing);

    if config.grid {
        svg.push_str(r##"<g class="grid" stroke="#b0b0b0" stroke-width="0.8" stroke-opacity="0.7">"##);
        for lon in &lon_ticks {
            let x = proj.x(*lon);
            let _ = write!(
                svg,
                r#"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" />"#,
                proj.top,
                proj.top + plot_h,
            );
        }
        for lat in &lat_ticks {
            let y = proj.y(*lat);
            let _ = write!(
                svg,
                r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" />"#,
                proj.left,
                proj.left + plot_w,
            );
        }
        svg.push_str("</g>");
    }

    let _ = write!(
        svg,
        r#"<rect class="frame" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="{}" stroke-width="1" />"#,
        proj.left,
        proj.top,
        plot_w,
        plot_h,
        escape_xml(&config.frame_color),
    );

    let frame_color = escape_xml(&config.frame_color);
    svg.push_str(r#"<g class="ticks">"#);
    for lon in &lon_ticks {
        let x = proj.x(*lon);
        let bottom = proj.top + plot_h;
        let _ = write!(
            svg,
            r#"<line x1="{x:.2}" y1="{bottom:.2}" x2="{x:.2}" y2="{:.2}" stroke="{frame_color}" /><text x="{x:.2}" y="{:.2}" font-family="{font}" font-size="{tick_size:.2}" fill="{frame_color}" text-anchor="middle">{lon:.decimals$}</text>"#,
            bottom + TICK_LENGTH,
            bottom + TICK_LENGTH + tick_size * 1.2,
        );
    }
    for lat in &lat_ticks {
        let y = proj.y(*lat);
        let _ = write!(
            svg,
            r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{frame_color}" /><text x="{:.2}" y="{:.2}" font-family="{font}" font-size="{tick_size:.2}" fill="{frame_color}" text-anchor="end">{lat:.decimals$}</text>"#,
            proj.left - TICK_LENGTH,
            proj.left,
            proj.left - TICK_LENGTH - 2.0,
            y + tick_size * 0.35,
        );
    }
    svg.push_str("</g>");

    svg.push_str(r#"<g class="markers">"#);
    for d in directives {
        let (x, y) = proj.point(d.marker_anchor);
        let _ = write!(
            svg,
            r#"<polygon class="marker {}" points="{}" fill="{}" fill-opacity="{}" />"#,
            d.category,
            triangle(x, y, config.marker_size, d.glyph),
            escape_xml(&d.marker_color),
            MARKER_OPACITY,
        );
    }
    svg.push_str("</g>");

    svg.push_str(r#"<g class="labels">"#);
    for d in directives {
        let (x, y) = proj.point(d.text_anchor);
        let _ = write!(
            svg,
            r#"<text class="label {}" x="{x:.2}" y="{y:.2}" font-family="{font}" font-size="{:.2}" fill="{}">{}</text>"#,
            d.category,
            config.font_size,
            escape_xml(&d.color),
            escape_xml(&d.name),
        );
    }
    svg.push_str("</g>");

    if let Some(bar) = &config.scale_bar {
        let from = proj.point(bar.from);
        let to = proj.point(bar.to);
        let (lx, ly) = proj.point(bar.label_at);
        let _ = write!(
            svg,
            r#"<g class="scale-bar" fill="{frame_color}" stroke="{frame_color}"><line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke-width="1.2" /><polygon points="{}" stroke="none" /><polygon points="{}" stroke="none" /><text x="{lx:.2}" y="{ly:.2}" font-family="{font}" font-size="{:.2}" stroke="none">{}</text></g>"#,
            from.0,
            from.1,
            to.0,
            to.1,
            arrow_head(from, to),
            arrow_head(to, from),
            config.font_size,
            escape_xml(&bar.label),
        );
    }

    if let Some(title) = &frame.title {
        let _ = write!(
            svg,
            r#"<text class="title" x="{:.2}" y="{:.2}" font-family="{font}" font-size="{:.2}" fill="{frame_color}" text-anchor="middle">{}</text>"#,
            proj.left + plot_w / 2.0,
            pad + config.font_size * 1.4,
            config.font_size * 1.5,
            escape_xml(title),
        );
    }
    if let Some(label) = &config.x_label {
        let _ = write!(
            svg,
            r#"<text class="x-label" x="{:.2}" y="{:.2}" font-family="{font}" font-size="{:.2}" fill="{frame_color}" text-anchor="middle">{}</text>"#,
            proj.left + plot_w / 2.0,
            proj.top + plot_h + label_space * 1.5 + config.font_size * 1.2,
            config.font_size,
            escape_xml(label),
        );
    }

    tracing::debug!(
        directives = directives.len(),
        width = total_w,
        height = total_h,
        "map rendered"
    );

    Ok(format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.2} {h:.2}"><rect width="100%" height="100%" fill="{bg}" />{svg}</svg>"#,
        w = total_w,
        h = total_h,
        bg = escape_xml(&config.background),
    ))
}
