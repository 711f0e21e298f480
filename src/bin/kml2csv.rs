use anyhow::Context;
use clap::Parser;
use placemap::kml;
use placemap::table;
use std::path::PathBuf;

/// Standalone KML to CSV converter
#[derive(Parser, Debug)]
#[command(name = "kml2csv")]
#[command(version)]
#[command(about = "Convert KML placemarks to a Name,Longitude,Latitude,Altitude CSV", long_about = None)]
struct Args {
    /// Input .kml file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output .csv path (use "-" for stdout; defaults to <title>.csv beside the input)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    placemap::init_logging(args.verbose);

    let doc = kml::load_kml(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    for warning in &doc.warnings {
        eprintln!("skipped {warning}");
    }

    let output = match args.output {
        Some(path) => path,
        None => {
            let stem = doc
                .title
                .as_deref()
                .and_then(file_stem_from_title)
                .or_else(|| {
                    args.input
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| "placemarks".to_string());
            args.input.with_file_name(format!("{stem}.csv"))
        }
    };

    let store = doc.into_store();
    if output.to_str() == Some("-") {
        table::write_csv(&store, std::io::stdout().lock())?;
    } else {
        table::save_csv(&store, &output)?;
        eprintln!("CSV saved to: {} ({} rows)", output.display(), store.len());
    }

    Ok(())
}

/// A document title made safe to use as a single file name.
fn file_stem_from_title(title: &str) -> Option<String> {
    let stem: String = title
        .chars()
        .map(|c| {
            if std::path::is_separator(c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let stem = stem.trim();
    match stem {
        "" | "." | ".." => None,
        _ => Some(stem.to_string()),
    }
}
