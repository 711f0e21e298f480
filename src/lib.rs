//! Plot KML/CSV placemarks as labeled markers over a raster basemap.
//!
//! The pipeline is `kml`/`table` -> [`RecordStore`] -> [`placement::place`]
//! -> [`render::render_map`] -> [`export::export`].

pub mod config;
pub mod error;
pub mod export;
pub mod kml;
pub mod placement;
pub mod record;
pub mod render;
pub mod source;
pub mod table;
mod xml;

pub use config::Config;
pub use error::{Error, Result};
pub use placement::{Category, DrawDirective, MarkerGlyph, Placement, PlacementConfig, place};
pub use record::{GeoPoint, Placemark, RecordStore};

use tracing_subscriber::EnvFilter;

/// Installs the stderr logger; `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
