use crate::error::{Error, Result};
use crate::record::{GeoPoint, Placemark};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Label placement class, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Name is written in capitals.
    Upper,
    /// Listed in `down_names`; drawn in the second pass.
    Downward,
    /// Listed in `up_names`.
    Upward,
    Normal,
}

impl Category {
    pub fn glyph(self) -> MarkerGlyph {
        match self {
            Category::Downward => MarkerGlyph::Down,
            _ => MarkerGlyph::Up,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Upper => "upper",
            Category::Downward => "downward",
            Category::Upward => "upward",
            Category::Normal => "normal",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerGlyph {
    Up,
    Down,
}

/// Which override list a name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideList {
    Up,
    Down,
}

impl fmt::Display for OverrideList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverrideList::Up => "upward",
            OverrideList::Down => "downward",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStyle {
    #[serde(default)]
    pub lon_offset: f64,
    #[serde(default)]
    pub lat_offset: f64,
    #[serde(default = "default_label_color")]
    pub color: String,
}

impl CategoryStyle {
    pub fn new(lon_offset: f64, lat_offset: f64, color: &str) -> Self {
        Self {
            lon_offset,
            lat_offset,
            color: color.to_string(),
        }
    }
}

fn default_label_color() -> String {
    "black".to_string()
}
fn default_upper() -> CategoryStyle {
    CategoryStyle::new(-0.0005, 0.001, "red")
}
fn default_upward() -> CategoryStyle {
    CategoryStyle::new(-0.01, 0.001, "black")
}
fn default_downward() -> CategoryStyle {
    CategoryStyle::new(-0.013, -0.004, "black")
}
fn default_normal() -> CategoryStyle {
    CategoryStyle::new(0.0, 0.001, "black")
}
fn default_arrow_color() -> String {
    "blue".to_string()
}

/// Override lists plus per-category label offsets (degrees) and colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    #[serde(default)]
    pub up_names: BTreeSet<String>,
    #[serde(default)]
    pub down_names: BTreeSet<String>,
    #[serde(default = "default_upper")]
    pub upper: CategoryStyle,
    #[serde(default = "default_upward")]
    pub upward: CategoryStyle,
    #[serde(default = "default_downward")]
    pub downward: CategoryStyle,
    #[serde(default = "default_normal")]
    pub normal: CategoryStyle,
    #[serde(default = "default_arrow_color")]
    pub arrow_color: String,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            up_names: BTreeSet::new(),
            down_names: BTreeSet::new(),
            upper: default_upper(),
            upward: default_upward(),
            downward: default_downward(),
            normal: default_normal(),
            arrow_color: default_arrow_color(),
        }
    }
}

impl PlacementConfig {
    pub fn style(&self, category: Category) -> &CategoryStyle {
        match category {
            Category::Upper => &self.upper,
            Category::Downward => &self.downward,
            Category::Upward => &self.upward,
            Category::Normal => &self.normal,
        }
    }

    /// Applies the precedence chain: upper-case, then downward, then upward.
    pub fn categorize(&self, name: &str) -> Category {
        if is_upper(name) {
            Category::Upper
        } else if self.down_names.contains(name) {
            Category::Downward
        } else if self.up_names.contains(name) {
            Category::Upward
        } else {
            Category::Normal
        }
    }

    pub fn validate(&self) -> Result<()> {
        for category in [
            Category::Upper,
            Category::Upward,
            Category::Downward,
            Category::Normal,
        ] {
            let style = self.style(category);
            if !style.lon_offset.is_finite() || !style.lat_offset.is_finite() {
                return Err(Error::Config(format!(
                    "{category} offsets must be finite numbers"
                )));
            }
            if style.color.trim().is_empty() {
                return Err(Error::Config(format!("{category} color is empty")));
            }
        }
        if self.arrow_color.trim().is_empty() {
            return Err(Error::Config("arrow color is empty".to_string()));
        }
        if self
            .up_names
            .iter()
            .chain(&self.down_names)
            .any(|n| n.trim().is_empty())
        {
            return Err(Error::Config("override lists contain an empty name".to_string()));
        }
        Ok(())
    }
}

/// True when the name has at least one cased letter and no lower-case one.
pub fn is_upper(name: &str) -> bool {
    let mut cased = false;
    for c in name.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

/// Where and how one record is drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawDirective {
    pub name: String,
    pub category: Category,
    pub text_anchor: GeoPoint,
    pub marker_anchor: GeoPoint,
    pub color: String,
    pub marker_color: String,
    pub glyph: MarkerGlyph,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementWarning {
    UnknownRecord { name: String, list: OverrideList },
    ConflictingOverride { name: String },
}

impl fmt::Display for PlacementWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementWarning::UnknownRecord { name, list } => {
                write!(f, "{list} override '{name}' does not match any record")
            }
            PlacementWarning::ConflictingOverride { name } => {
                write!(f, "'{name}' is in both override lists; downward wins")
            }
        }
    }
}

impl From<PlacementWarning> for Error {
    fn from(warning: PlacementWarning) -> Self {
        match warning {
            PlacementWarning::UnknownRecord { name, list } => Error::UnknownRecord { name, list },
            PlacementWarning::ConflictingOverride { name } => Error::ConflictingOverride { name },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    pub directives: Vec<DrawDirective>,
    pub warnings: Vec<PlacementWarning>,
}

impl Placement {
    /// Fails on the first warning instead of carrying it.
    pub fn into_strict(self) -> Result<Vec<DrawDirective>> {
        match self.warnings.into_iter().next() {
            Some(warning) => Err(warning.into()),
            None => Ok(self.directives),
        }
    }
}

fn directive(placemark: &Placemark, category: Category, config: &PlacementConfig) -> DrawDirective {
    let style = config.style(category);
    DrawDirective {
        name: placemark.name.clone(),
        category,
        text_anchor: GeoPoint::new(
            placemark.longitude + style.lon_offset,
            placemark.latitude + style.lat_offset,
        ),
        marker_anchor: placemark.position(),
        color: style.color.clone(),
        marker_color: config.arrow_color.clone(),
        glyph: category.glyph(),
    }
}

fn config_warnings<'a>(
    records: impl IntoIterator<Item = &'a Placemark>,
    config: &PlacementConfig,
) -> Vec<PlacementWarning> {
    let known: BTreeSet<&str> = records.into_iter().map(|p| p.name.as_str()).collect();
    let mut warnings: Vec<PlacementWarning> = config
        .down_names
        .intersection(&config.up_names)
        .map(|name| PlacementWarning::ConflictingOverride { name: name.clone() })
        .collect();

    for (list, names) in [
        (OverrideList::Up, &config.up_names),
        (OverrideList::Down, &config.down_names),
    ] {
        warnings.extend(
            names
                .iter()
                .filter(|name| !known.contains(name.as_str()))
                .map(|name| PlacementWarning::UnknownRecord {
                    name: name.clone(),
                    list,
                }),
        );
    }
    warnings
}

/// Computes one draw directive per record.
///
/// Non-downward records keep their input order; downward records follow,
/// also in input order, so their labels are drawn on top.
pub fn place<'a>(
    records: impl IntoIterator<Item = &'a Placemark> + Clone,
    config: &PlacementConfig,
) -> Placement {
    let warnings = config_warnings(records.clone(), config);
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    let mut directives = Vec::new();
    let mut deferred = Vec::new();
    for placemark in records {
        let category = config.categorize(&placemark.name);
        let d = directive(placemark, category, config);
        if category == Category::Downward {
            deferred.push(d);
        } else {
            directives.push(d);
        }
    }
    tracing::debug!(
        first_pass = directives.len(),
        second_pass = deferred.len(),
        "placement computed"
    );
    directives.extend(deferred);

    Placement {
        directives,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn config(up: &[&str], down: &[&str]) -> PlacementConfig {
        PlacementConfig {
            up_names: names(up),
            down_names: names(down),
            ..PlacementConfig::default()
        }
    }

    #[test]
    fn test_is_upper_follows_cased_letters() {
        assert!(is_upper("MAR LODJ"));
        assert!(is_upper("SOUM-2"));
        assert!(is_upper("NGETHÉ"));
        assert!(!is_upper("Mar Lodj"));
        assert!(!is_upper("1234 - 56"));
        assert!(!is_upper(""));
    }

    #[test]
    fn test_upper_case_beats_list_membership() {
        let cfg = config(&["MAR LODJ"], &["MAR LODJ"]);
        assert_eq!(cfg.categorize("MAR LODJ"), Category::Upper);
    }

    #[test]
    fn test_membership_is_case_sensitive() {
        let cfg = config(&["Soum"], &["Bassar"]);
        assert_eq!(cfg.categorize("Soum"), Category::Upward);
        assert_eq!(cfg.categorize("soum"), Category::Normal);
        assert_eq!(cfg.categorize("Bassar"), Category::Downward);
        assert_eq!(cfg.categorize("Fayako"), Category::Normal);
    }

    #[test]
    fn test_downward_records_are_drawn_last() {
        let records = vec![
            Placemark::new("Joal-Fadiout", -16.35, 13.65, 0.0),
            Placemark::new("Soum", -16.40, 13.66, 0.0),
            Placemark::new("Bassar", -16.5, 13.7, 0.0),
            Placemark::new("Fimela", -16.6, 14.1, 0.0),
        ];
        let cfg = config(&["Soum"], &["Joal-Fadiout", "Bassar"]);
        let placement = place(&records, &cfg);

        let order: Vec<(&str, Category, MarkerGlyph)> = placement
            .directives
            .iter()
            .map(|d| (d.name.as_str(), d.category, d.glyph))
            .collect();
        assert_eq!(
            order,
            [
                ("Soum", Category::Upward, MarkerGlyph::Up),
                ("Fimela", Category::Normal, MarkerGlyph::Up),
                ("Joal-Fadiout", Category::Downward, MarkerGlyph::Down),
                ("Bassar", Category::Downward, MarkerGlyph::Down),
            ]
        );
        assert!(placement.warnings.is_empty());
    }

    #[test]
    fn test_offsets_move_text_only() {
        let records = [Placemark::new("Fimela", -16.6, 14.1, 0.0)];
        let cfg = PlacementConfig {
            normal: CategoryStyle::new(0.5, -0.25, "green"),
            arrow_color: "orange".to_string(),
            ..PlacementConfig::default()
        };
        let d = &place(&records, &cfg).directives[0];
        assert_eq!(d.marker_anchor, GeoPoint::new(-16.6, 14.1));
        assert_eq!(d.text_anchor, GeoPoint::new(-16.6 + 0.5, 14.1 - 0.25));
        assert_eq!(d.color, "green");
        assert_eq!(d.marker_color, "orange");
    }

    #[test]
    fn test_duplicate_names_are_placed_independently() {
        let records = [
            Placemark::new("Soum", 1.0, 1.0, 0.0),
            Placemark::new("Soum", 2.0, 2.0, 0.0),
        ];
        let placement = place(&records, &config(&[], &["Soum"]));
        assert_eq!(placement.directives.len(), 2);
        assert_eq!(placement.directives[0].marker_anchor.lon, 1.0);
        assert_eq!(placement.directives[1].marker_anchor.lon, 2.0);
    }

    #[test]
    fn test_conflicting_and_unknown_overrides_are_reported() {
        let records = [Placemark::new("Diathanor", -16.7, 13.8, 0.0)];
        let cfg = config(&["Diathanor", "Biogane"], &["Diathanor", "Velingara"]);
        let placement = place(&records, &cfg);

        assert_eq!(placement.directives[0].category, Category::Downward);
        assert_eq!(
            placement.warnings,
            [
                PlacementWarning::ConflictingOverride {
                    name: "Diathanor".to_string()
                },
                PlacementWarning::UnknownRecord {
                    name: "Biogane".to_string(),
                    list: OverrideList::Up
                },
                PlacementWarning::UnknownRecord {
                    name: "Velingara".to_string(),
                    list: OverrideList::Down
                },
            ]
        );
    }

    #[test]
    fn test_strict_mode_turns_warning_into_error() {
        let records = [Placemark::new("Soum", 0.0, 0.0, 0.0)];
        let err = place(&records, &config(&[], &["Velingara"]))
            .into_strict()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRecord { ref name, .. } if name == "Velingara"));

        let ok = place(&records, &config(&["Soum"], &[])).into_strict().unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_styles() {
        assert!(PlacementConfig::default().validate().is_ok());

        let mut cfg = PlacementConfig::default();
        cfg.upper.lat_offset = f64::NAN;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = PlacementConfig::default();
        cfg.downward.color = " ".to_string();
        assert!(cfg.validate().is_err());

        let cfg = config(&[""], &[]);
        assert!(cfg.validate().is_err());
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("SOUM".to_string()),
            Just("Soum".to_string()),
            Just("Bassar".to_string()),
            Just("Joal-Fadiout".to_string()),
            "[A-Za-z]{1,8}",
        ]
    }

    proptest! {
        #[test]
        fn downward_partition_is_stable(
            raw in prop::collection::vec((name_strategy(), -10.0f64..10.0, -10.0f64..10.0), 0..30)
        ) {
            let records: Vec<Placemark> = raw
                .into_iter()
                .map(|(n, lon, lat)| Placemark::new(n, lon, lat, 0.0))
                .collect();
            let cfg = config(&["Soum", "Bassar"], &["Joal-Fadiout", "Bassar"]);
            let first = place(&records, &cfg);
            let second = place(&records, &cfg);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.directives.len(), records.len());

            let split = first
                .directives
                .iter()
                .position(|d| d.category == Category::Downward)
                .unwrap_or(first.directives.len());
            prop_assert!(first.directives[split..].iter().all(|d| d.glyph == MarkerGlyph::Down));

            let expected_head: Vec<&str> = records
                .iter()
                .filter(|p| cfg.categorize(&p.name) != Category::Downward)
                .map(|p| p.name.as_str())
                .collect();
            let head: Vec<&str> = first.directives[..split].iter().map(|d| d.name.as_str()).collect();
            prop_assert_eq!(head, expected_head);
        }
    }
}
