use crate::error::{Error, Result};
use crate::record::{Placemark, RecordStore, check_coordinates};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

pub const HEADER: [&str; 4] = ["Name", "Longitude", "Latitude", "Altitude"];

/// A header row plus string cells, the shape CSV files take on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A data row that did not yield a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWarning {
    /// 1-based, header excluded.
    pub row: usize,
    pub reason: String,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Lon,
    Lat,
    Alt,
}

impl Column {
    fn from_header(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Column::Name),
            "lon" | "longitude" | "lng" => Some(Column::Lon),
            "lat" | "latitude" => Some(Column::Lat),
            "alt" | "altitude" | "elevation" => Some(Column::Alt),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Lon => "lon",
            Column::Lat => "lat",
            Column::Alt => "alt",
        }
    }
}

struct ColumnMap {
    name: usize,
    lon: usize,
    lat: usize,
    alt: Option<usize>,
}

impl ColumnMap {
    fn resolve(header: &[String]) -> Result<Self> {
        let find = |col: Column| header.iter().position(|h| Column::from_header(h) == Some(col));

        let name = find(Column::Name);
        let lon = find(Column::Lon);
        let lat = find(Column::Lat);

        match (name, lon, lat) {
            (Some(name), Some(lon), Some(lat)) => Ok(Self {
                name,
                lon,
                lat,
                alt: find(Column::Alt),
            }),
            _ => {
                let missing = [(Column::Name, name), (Column::Lon, lon), (Column::Lat, lat)]
                    .into_iter()
                    .filter(|(_, idx)| idx.is_none())
                    .map(|(col, _)| col.key().to_string())
                    .collect();
                Err(Error::Schema { missing })
            }
        }
    }

    fn placemark(&self, row: &[String]) -> std::result::Result<Placemark, String> {
        let cell = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");
        let number = |idx: usize, label: &str| {
            let raw = cell(idx);
            raw.parse::<f64>()
                .map_err(|_| format!("{label} '{raw}' is not a number"))
        };

        // Names are kept verbatim so a record round-trips unchanged.
        let name = row.get(self.name).map(String::as_str).unwrap_or("");
        if name.trim().is_empty() {
            return Err("empty name".to_string());
        }
        let lon = number(self.lon, "longitude")?;
        let lat = number(self.lat, "latitude")?;
        let alt = match self.alt.map(cell) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<f64>()
                .map_err(|_| format!("altitude '{raw}' is not a number"))?,
            _ => 0.0,
        };
        check_coordinates(lon, lat, alt)?;
        Ok(Placemark::new(name, lon, lat, alt))
    }
}

/// Lays records out under the `Name,Longitude,Latitude,Altitude` header.
pub fn to_table<'a>(records: impl IntoIterator<Item = &'a Placemark>) -> Table {
    Table {
        header: HEADER.iter().map(|h| h.to_string()).collect(),
        rows: records
            .into_iter()
            .map(|p| {
                vec![
                    p.name.clone(),
                    p.longitude.to_string(),
                    p.latitude.to_string(),
                    p.altitude.to_string(),
                ]
            })
            .collect(),
    }
}

/// Builds a store from rows under either the legacy or the short header.
///
/// Missing `name`/`lon`/`lat` columns abort with [`Error::Schema`]; rows
/// that cannot be read are skipped and returned as warnings.
pub fn from_table(table: &Table) -> Result<(RecordStore, Vec<RowWarning>)> {
    let columns = ColumnMap::resolve(&table.header)?;
    let mut store = RecordStore::default();
    let mut warnings = Vec::new();

    for (idx, row) in table.rows.iter().enumerate() {
        match columns.placemark(row) {
            Ok(placemark) => store.push(placemark),
            Err(reason) => {
                let warning = RowWarning {
                    row: idx + 1,
                    reason,
                };
                tracing::warn!("skipping {}", warning);
                warnings.push(warning);
            }
        }
    }

    Ok((store, warnings))
}

pub fn read_csv<R: Read>(reader: R) -> Result<(RecordStore, Vec<RowWarning>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let header = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let rows = csv_reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;

    from_table(&Table { header, rows })
}

pub fn write_csv<'a, W: Write>(
    records: impl IntoIterator<Item = &'a Placemark>,
    writer: W,
) -> Result<()> {
    let table = to_table(records);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&table.header)?;
    for row in &table.rows {
        csv_writer.write_record(row)?;
    }
    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn load_csv(path: &Path) -> Result<(RecordStore, Vec<RowWarning>)> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    tracing::info!(path = %path.display(), "reading CSV");
    read_csv(file)
}

pub fn save_csv(records: &RecordStore, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
    write_csv(records, file)?;
    tracing::info!(path = %path.display(), rows = records.len(), "CSV written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(header: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_to_table_uses_legacy_header_in_order() {
        let records = vec![
            Placemark::new("SOUM", -16.4, 13.66, 0.0),
            Placemark::new("Bassar", -16.45, 13.7, 2.5),
        ];
        let t = to_table(&records);
        assert_eq!(t.header, HEADER);
        assert_eq!(t.rows[0], ["SOUM", "-16.4", "13.66", "0"]);
        assert_eq!(t.rows[1], ["Bassar", "-16.45", "13.7", "2.5"]);
    }

    #[test]
    fn test_from_table_accepts_lowercase_short_header() {
        let t = table(&["name", "lat", "lon"], &[&["Soum", "13.66", "-16.4"]]);
        let (store, warnings) = from_table(&t).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(store.records(), [Placemark::new("Soum", -16.4, 13.66, 0.0)]);
    }

    #[test]
    fn test_from_table_missing_columns_is_schema_error() {
        let t = table(&["Name", "Altitude"], &[]);
        match from_table(&t) {
            Err(Error::Schema { missing }) => assert_eq!(missing, ["lon", "lat"]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_table_skips_bad_rows_with_index() {
        let t = table(
            &["Name", "Longitude", "Latitude", "Altitude"],
            &[
                &["Soum", "-16.4", "13.66", ""],
                &["", "-16.4", "13.66", "0"],
                &["Bassar", "west", "13.7", "0"],
                &["Fayako", "-16.5", "13.9", "3"],
            ],
        );
        let (store, warnings) = from_table(&t).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].altitude, 0.0);
        assert_eq!(store.records()[1].name, "Fayako");
        assert_eq!(
            warnings.iter().map(|w| w.row).collect::<Vec<_>>(),
            [2, 3]
        );
    }

    #[test]
    fn test_csv_reader_handles_bom_and_quotes() {
        let data = "\u{feff}Name,Longitude,Latitude,Altitude\n\"Mar, Lodj\",-16.6,14.0,0\n";
        let (store, _) = read_csv(data.as_bytes()).unwrap();
        assert_eq!(store.records()[0].name, "Mar, Lodj");
    }

    #[test]
    fn test_csv_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        let store: RecordStore = vec![
            Placemark::new("Joal-Fadiout", -16.35, 13.65, 0.0),
            Placemark::new("Palmarin Ngethé", -16.75, 14.0, 1.25),
        ]
        .into_iter()
        .collect();

        save_csv(&store, &path).unwrap();
        let (loaded, warnings) = load_csv(&path).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded.records(), store.records());
    }

    #[test]
    fn test_round_trip_keeps_name_padding_and_far_longitudes() {
        let records = vec![
            Placemark::new(" Soum ", -16.4, 13.66, 0.0),
            Placemark::new("Far", 200.0, 13.6, 0.0),
        ];
        let (store, warnings) = from_table(&to_table(&records)).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(store.records(), records.as_slice());

        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();
        let (store, warnings) = read_csv(buf.as_slice()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(store.records(), records.as_slice());
    }

    #[test]
    fn test_numeric_cells_tolerate_padding() {
        let data = "Name, Longitude ,Latitude\nSoum, -16.4 , 13.66\n";
        let (store, warnings) = read_csv(data.as_bytes()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(store.records(), [Placemark::new("Soum", -16.4, 13.66, 0.0)]);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = load_csv(Path::new("nope/points.csv")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    fn placemark_strategy() -> impl Strategy<Value = Placemark> {
        (
            "[ ]{0,2}[A-Za-z][A-Za-z ,'-]{0,20}[ ]{0,2}",
            -360.0f64..=360.0,
            -90.0f64..=90.0,
            -500.0f64..9000.0,
        )
            .prop_map(|(name, lon, lat, alt)| Placemark::new(name, lon, lat, alt))
    }

    proptest! {
        #[test]
        fn table_round_trip_is_lossless(records in prop::collection::vec(placemark_strategy(), 1..40)) {
            let (store, warnings) = from_table(&to_table(&records)).unwrap();
            prop_assert!(warnings.is_empty());
            prop_assert_eq!(store.records(), records.as_slice());
        }

        #[test]
        fn csv_round_trip_is_lossless(records in prop::collection::vec(placemark_strategy(), 1..20)) {
            let mut buf = Vec::new();
            write_csv(&records, &mut buf).unwrap();
            let (store, _) = read_csv(buf.as_slice()).unwrap();
            prop_assert_eq!(store.records(), records.as_slice());
        }
    }
}
