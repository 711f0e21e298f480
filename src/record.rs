use serde::{Deserialize, Serialize};

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// One named point, as read from KML or CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl Placemark {
    pub fn new(name: impl Into<String>, longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            name: name.into(),
            longitude,
            latitude,
            altitude,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

/// Why a longitude/latitude/altitude value was refused.
///
/// Only non-finite values are refused; degrees outside the WGS84 ranges are
/// kept and logged so that a source round-trips unchanged.
pub fn check_coordinates(lon: f64, lat: f64, alt: f64) -> Result<(), String> {
    if !lon.is_finite() || !lat.is_finite() || !alt.is_finite() {
        return Err("non-finite coordinate".to_string());
    }
    if !in_wgs84_range(lon, lat) {
        tracing::warn!(lon, lat, "coordinates outside WGS84 range");
    }
    Ok(())
}

pub fn in_wgs84_range(lon: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

/// Ordered set of placemarks; order is the source document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    pub title: Option<String>,
    records: Vec<Placemark>,
}

impl RecordStore {
    pub fn new(records: Vec<Placemark>) -> Self {
        Self {
            title: None,
            records,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn push(&mut self, placemark: Placemark) {
        self.records.push(placemark);
    }

    pub fn records(&self) -> &[Placemark] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Placemark> {
        self.records.iter()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.records.iter().any(|p| p.name == name)
    }
}

impl<'a> IntoIterator for &'a RecordStore {
    type Item = &'a Placemark;
    type IntoIter = std::slice::Iter<'a, Placemark>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<Placemark> for RecordStore {
    fn from_iter<I: IntoIterator<Item = Placemark>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_only_non_finite_coordinates() {
        assert!(check_coordinates(-16.4, 13.6, 0.0).is_ok());
        assert!(check_coordinates(181.0, 0.0, 0.0).is_ok());
        assert!(check_coordinates(0.0, -90.5, 0.0).is_ok());
        assert!(!in_wgs84_range(181.0, 0.0));
        assert!(in_wgs84_range(-180.0, 90.0));
        assert!(check_coordinates(f64::NAN, 0.0, 0.0).is_err());
        assert!(check_coordinates(0.0, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn store_keeps_insertion_order_and_duplicates() {
        let mut store = RecordStore::default();
        store.push(Placemark::new("Soum", -16.4, 13.66, 0.0));
        store.push(Placemark::new("Bassar", -16.5, 13.7, 0.0));
        store.push(Placemark::new("Soum", -16.41, 13.67, 0.0));

        let names: Vec<&str> = store.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Soum", "Bassar", "Soum"]);
        assert!(store.contains_name("Bassar"));
        assert!(!store.contains_name("bassar"));
    }
}
