use placemap::kml;
use placemap::render::{BoundingBox, MapFrame, RenderConfig, render_map};
use placemap::table;
use placemap::{Category, Config, MarkerGlyph, PlacementConfig, RecordStore, place};
use std::collections::BTreeSet;
use std::path::Path;

fn fixture() -> RecordStore {
    kml::load_kml(Path::new("tests/data/sine_saloum.kml"))
        .unwrap()
        .into_store()
}

#[test]
fn test_sine_saloum_scenario() {
    let store = fixture();
    assert_eq!(store.title.as_deref(), Some("Le Sine Saloum"));
    assert_eq!(store.len(), 2);

    let config = PlacementConfig {
        down_names: BTreeSet::from(["Joal-Fadiout".to_string()]),
        ..PlacementConfig::default()
    };
    let placement = place(&store, &config);
    assert!(placement.warnings.is_empty());

    let directives = placement.directives;
    assert_eq!(directives.len(), 2);

    assert_eq!(directives[0].name, "SOUM");
    assert_eq!(directives[0].category, Category::Upper);
    assert_eq!(directives[0].glyph, MarkerGlyph::Up);
    assert_eq!(directives[0].color, config.upper.color);

    let joal = &directives[1];
    assert_eq!(joal.name, "Joal-Fadiout");
    assert_eq!(joal.category, Category::Downward);
    assert_eq!(joal.glyph, MarkerGlyph::Down);
    assert_eq!(joal.marker_anchor.lon, -16.35);
    assert_eq!(joal.marker_anchor.lat, 13.65);
    assert_eq!(joal.text_anchor.lon, -16.35 + config.downward.lon_offset);
    assert_eq!(joal.text_anchor.lat, 13.65 + config.downward.lat_offset);
}

#[test]
fn test_preset_reports_unknown_list_names() {
    let store = fixture();
    let config = Config::from_builtin("sine_saloum").unwrap();
    let placement = place(&store, &config.placement);

    // Only Joal-Fadiout of the 14 listed villages is in the fixture.
    assert_eq!(placement.warnings.len(), 13);
    assert!(placement.clone().into_strict().is_err());
    assert_eq!(placement.directives[1].category, Category::Downward);
}

#[test]
fn test_kml_to_csv_and_back_preserves_records() {
    let store = fixture();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Le Sine Saloum.csv");

    table::save_csv(&store, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Name,Longitude,Latitude,Altitude\n"));
    assert!(text.contains("SOUM,-16.4,13.66,0\n"));

    let (loaded, warnings) = table::load_csv(&path).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(loaded.records(), store.records());
}

#[test]
fn test_full_pipeline_renders_svg() {
    let store = fixture();
    let config = Config::from_builtin("sine_saloum").unwrap();
    let directives = place(&store, &config.placement).directives;

    let frame = MapFrame {
        bbox: config
            .basemap
            .bbox
            .unwrap_or_else(|| BoundingBox::new(-16.9, 13.6, -16.3, 14.2).unwrap()),
        basemap: None,
        title: store.title.clone(),
    };
    let svg = render_map(&directives, &frame, &config.render).unwrap();
    assert!(svg.starts_with("<svg "));
    assert!(svg.ends_with("</svg>"));
    assert!(svg.contains(">Le Sine Saloum</text>"));
    assert!(svg.contains(">05/08/2022</text>"));

    let plain = render_map(&directives, &frame, &RenderConfig::default()).unwrap();
    assert!(!plain.contains("scale-bar"));
}
