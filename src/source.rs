use crate::error::{Error, Result};
use crate::kml;
use crate::record::RecordStore;
use crate::table;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Kml,
    Csv,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("kml") => Ok(InputFormat::Kml),
            Some("csv") => Ok(InputFormat::Csv),
            _ => Err(Error::UnsupportedFormat(format!(
                "input {} (use .kml or .csv)",
                path.display()
            ))),
        }
    }
}

/// Loads records from a KML or CSV file.
///
/// CSV files have no title of their own, so the file stem stands in.
/// Skipped placemarks and rows have already been logged.
pub fn load_records(path: &Path) -> Result<RecordStore> {
    let store = match InputFormat::from_path(path)? {
        InputFormat::Kml => {
            let doc = kml::load_kml(path)?;
            if !doc.warnings.is_empty() {
                tracing::warn!(skipped = doc.warnings.len(), "some placemarks were skipped");
            }
            doc.into_store()
        }
        InputFormat::Csv => {
            let (store, warnings) = table::load_csv(path)?;
            if !warnings.is_empty() {
                tracing::warn!(skipped = warnings.len(), "some rows were skipped");
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
            store.with_title(stem)
        }
    };
    tracing::info!(records = store.len(), "records loaded");
    Ok(store)
}
