use anyhow::Context;
use clap::Parser;
use placemap::config::Config;
use placemap::render::{Basemap, BoundingBox, MapFrame, render_map};
use placemap::{export, place, source, table};
use std::path::PathBuf;

/// Margin in degrees around the points when no extent is given.
const AUTO_BBOX_MARGIN: f64 = 0.05;

/// Plot KML/CSV placemarks as labeled markers over a basemap
#[derive(Parser, Debug)]
#[command(name = "placemap")]
#[command(version)]
#[command(about = "Render KML or CSV placemarks to an annotated SVG, PNG or PDF map", long_about = None)]
struct Args {
    /// Input .kml or .csv file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (extension determines format: .svg, .png or .pdf)
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Configuration file (TOML or YAML)
    #[arg(short, long, value_name = "CONFIG", conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Built-in configuration preset
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Basemap raster (PNG/JPEG), overrides the configured one
    #[arg(long, value_name = "IMAGE")]
    basemap: Option<PathBuf>,

    /// Map extent as MINLON,MINLAT,MAXLON,MAXLAT
    #[arg(long, value_name = "BBOX", allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Figure title (defaults to the KML folder name)
    #[arg(long)]
    title: Option<String>,

    /// Also write the normalized records to this CSV file
    #[arg(long, value_name = "CSV")]
    csv_out: Option<PathBuf>,

    /// Raster scale multiplier for PNG output
    #[arg(long, default_value_t = 1.0)]
    png_scale: f32,

    /// Fail on unknown or conflicting override names instead of warning
    #[arg(long)]
    strict: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    placemap::init_logging(args.verbose);

    let config = match (&args.config, &args.preset) {
        (Some(path), _) => Config::load(path)?,
        (None, Some(name)) => Config::from_builtin(name)?,
        (None, None) => Config::default(),
    };

    let store = source::load_records(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    if let Some(csv_path) = &args.csv_out {
        table::save_csv(&store, csv_path)?;
        eprintln!("CSV saved to: {}", csv_path.display());
    }

    let placement = place(&store, &config.placement);
    let directives = if args.strict {
        placement.into_strict()?
    } else {
        placement.directives
    };

    let bbox = match args.bbox.or(config.basemap.bbox) {
        Some(bbox) => bbox,
        None => BoundingBox::around(store.iter().map(|p| p.position()), AUTO_BBOX_MARGIN)
            .context("no --bbox given and no records to fit the map to")?,
    };
    let basemap = match args.basemap.as_ref().or(config.basemap.image.as_ref()) {
        Some(path) => Some(Basemap::load(path)?),
        None => None,
    };
    let title = args.title.or(config.title).or(store.title);

    let frame = MapFrame {
        bbox,
        basemap,
        title,
    };
    let svg = render_map(&directives, &frame, &config.render)?;

    let options = export::ExportOptions::for_map(&config.render, args.png_scale);
    export::export(&svg, &args.output, &options)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    eprintln!("Map saved to: {}", args.output.display());

    Ok(())
}
